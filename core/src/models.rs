use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{Local, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, non_blank, non_negative, non_negative_int};

/// Milliseconds in one diary day.
pub const DAY_MS: i64 = 86_400_000;

const SAMPLE_NAMES: &[&str] = &[
    "Apple", "Orange", "Banana", "Egg", "Potato", "Bread", "Cheese",
];
const SAMPLE_SERVING_UNITS: &[&str] = &["grams", "cups", "oz", "mL", "lbs"];

/// Draw a fresh random identifier. Uniqueness is not checked; a collision
/// surfaces as a constraint error on insert.
#[must_use]
pub fn generate_id() -> i64 {
    rand::rng().random()
}

#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of `date` in the local timezone, as milliseconds since the epoch.
#[must_use]
pub fn day_start_millis(date: NaiveDate) -> i64 {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    midnight
        .and_local_timezone(Local)
        .earliest()
        .map_or_else(|| midnight.and_utc().timestamp_millis(), |dt| dt.timestamp_millis())
}

// --- Nutrients ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Calories = 0,
    FatCalories = 1,
    TotalFat = 2,
    SaturatedFat = 3,
    TransFat = 4,
    Cholesterol = 5,
    Sodium = 6,
    TotalCarbs = 7,
    DietaryFiber = 8,
    TotalSugars = 9,
    AddedSugars = 10,
    Protein = 11,
    VitaminD = 12,
    Calcium = 13,
    Iron = 14,
    Potassium = 15,
}

impl Nutrient {
    pub const COUNT: usize = 16;

    pub const ALL: [Nutrient; Self::COUNT] = [
        Nutrient::Calories,
        Nutrient::FatCalories,
        Nutrient::TotalFat,
        Nutrient::SaturatedFat,
        Nutrient::TransFat,
        Nutrient::Cholesterol,
        Nutrient::Sodium,
        Nutrient::TotalCarbs,
        Nutrient::DietaryFiber,
        Nutrient::TotalSugars,
        Nutrient::AddedSugars,
        Nutrient::Protein,
        Nutrient::VitaminD,
        Nutrient::Calcium,
        Nutrient::Iron,
        Nutrient::Potassium,
    ];

    /// Stable integer code stored in `nutrition_goal.nutrient`.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, ValidationError> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(ValidationError::UnknownNutrient(code))
    }

    /// Column suffix; the `food` table stores it as `nutrition_<key>`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::FatCalories => "fat_calories",
            Nutrient::TotalFat => "total_fat",
            Nutrient::SaturatedFat => "saturated_fat",
            Nutrient::TransFat => "trans_fat",
            Nutrient::Cholesterol => "cholesterol",
            Nutrient::Sodium => "sodium",
            Nutrient::TotalCarbs => "total_carbs",
            Nutrient::DietaryFiber => "dietary_fiber",
            Nutrient::TotalSugars => "total_sugars",
            Nutrient::AddedSugars => "added_sugars",
            Nutrient::Protein => "protein",
            Nutrient::VitaminD => "vitamin_d",
            Nutrient::Calcium => "calcium",
            Nutrient::Iron => "iron",
            Nutrient::Potassium => "potassium",
        }
    }

    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Nutrient::Calories | Nutrient::FatCalories => "kcal",
            Nutrient::Cholesterol
            | Nutrient::Sodium
            | Nutrient::Calcium
            | Nutrient::Iron
            | Nutrient::Potassium => "mg",
            Nutrient::VitaminD => "µg",
            _ => "g",
        }
    }

    /// Exclusive upper bound used by the sample-data generators.
    fn sample_ceiling(self) -> i32 {
        match self {
            Nutrient::Calories | Nutrient::FatCalories => 1000,
            Nutrient::Sodium => 2500,
            _ => 500,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Nutrient {
    type Err = ValidationError;

    /// Accepts the column key in any case, with `-` or `_` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|n| n.key() == normalized)
            .ok_or_else(|| ValidationError::UnknownNutrientName(s.to_string()))
    }
}

// --- NutritionInfo ---

/// Nutrition facts for one serving, one non-negative integer per [`Nutrient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "BTreeMap<Nutrient, i32>")]
pub struct NutritionInfo {
    values: [i32; Nutrient::COUNT],
}

impl From<NutritionInfo> for BTreeMap<Nutrient, i32> {
    fn from(info: NutritionInfo) -> Self {
        Nutrient::ALL.iter().map(|n| (*n, info.get(*n))).collect()
    }
}

impl NutritionInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, nutrient: Nutrient) -> i32 {
        self.values[nutrient.index()]
    }

    pub fn set(&mut self, nutrient: Nutrient, amount: i32) -> Result<(), ValidationError> {
        self.values[nutrient.index()] = non_negative_int(nutrient.key(), amount)?;
        Ok(())
    }

    #[must_use]
    pub fn calories(&self) -> i32 {
        self.get(Nutrient::Calories)
    }

    #[must_use]
    pub fn protein(&self) -> i32 {
        self.get(Nutrient::Protein)
    }

    #[must_use]
    pub fn total_fat(&self) -> i32 {
        self.get(Nutrient::TotalFat)
    }

    #[must_use]
    pub fn total_carbs(&self) -> i32 {
        self.get(Nutrient::TotalCarbs)
    }

    /// Pointwise in-place addition. Saturates at `i32::MAX`.
    pub fn add(&mut self, other: &NutritionInfo) {
        for (value, extra) in self.values.iter_mut().zip(other.values) {
            *value = value.saturating_add(extra);
        }
    }

    #[must_use]
    pub fn plus(&self, other: &NutritionInfo) -> NutritionInfo {
        let mut out = self.clone();
        out.add(other);
        out
    }

    /// In-place scaling; each value is truncated toward zero.
    pub fn mul(&mut self, scalar: f64) -> Result<(), ValidationError> {
        let scalar = non_negative("scalar", scalar)?;
        for value in &mut self.values {
            *value = (f64::from(*value) * scalar) as i32;
        }
        Ok(())
    }

    pub fn times(&self, scalar: f64) -> Result<NutritionInfo, ValidationError> {
        let mut out = self.clone();
        out.mul(scalar)?;
        Ok(out)
    }

    pub fn sum<'a, I>(items: I) -> NutritionInfo
    where
        I: IntoIterator<Item = &'a NutritionInfo>,
    {
        let mut out = NutritionInfo::new();
        for item in items {
            out.add(item);
        }
        out
    }

    #[must_use]
    pub fn make_random() -> Self {
        Self::random_with(&mut rand::rng())
    }

    #[must_use]
    pub fn make_random_seeded(seed: u64) -> Self {
        Self::random_with(&mut StdRng::seed_from_u64(seed))
    }

    fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut values = [0; Nutrient::COUNT];
        for nutrient in Nutrient::ALL {
            values[nutrient.index()] = rng.random_range(0..nutrient.sample_ceiling());
        }
        Self { values }
    }
}

// --- Food ---

/// A named food with a serving definition and per-serving nutrition.
#[derive(Debug, Clone, Serialize)]
pub struct Food {
    id: i64,
    name: String,
    serving_size: f64,
    serving_unit: String,
    nutrition: NutritionInfo,
}

impl Food {
    /// New food with a random id and empty nutrition facts.
    pub fn new(
        name: impl Into<String>,
        serving_unit: impl Into<String>,
        serving_size: f64,
    ) -> Result<Self, ValidationError> {
        Self::with_id(
            generate_id(),
            name,
            serving_unit,
            serving_size,
            NutritionInfo::new(),
        )
    }

    pub fn with_id(
        id: i64,
        name: impl Into<String>,
        serving_unit: impl Into<String>,
        serving_size: f64,
        nutrition: NutritionInfo,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            name: non_blank("name", name.into())?,
            serving_size: non_negative("serving_size", serving_size)?,
            serving_unit: serving_unit.into(),
            nutrition,
        })
    }

    #[must_use]
    pub fn make_random() -> Self {
        Self::random_with(&mut rand::rng())
    }

    #[must_use]
    pub fn make_random_seeded(seed: u64) -> Self {
        Self::random_with(&mut StdRng::seed_from_u64(seed))
    }

    fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let name = SAMPLE_NAMES[rng.random_range(0..SAMPLE_NAMES.len())];
        let unit = SAMPLE_SERVING_UNITS[rng.random_range(0..SAMPLE_SERVING_UNITS.len())];
        let serving_size = f64::from(rng.random_range(0..1000_i32)) * rng.random::<f64>();
        Self {
            id: rng.random(),
            name: name.to_string(),
            serving_size,
            serving_unit: unit.to_string(),
            nutrition: NutritionInfo::random_with(rng),
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ValidationError> {
        self.name = non_blank("name", name.into())?;
        Ok(())
    }

    #[must_use]
    pub fn serving_size(&self) -> f64 {
        self.serving_size
    }

    pub fn set_serving_size(&mut self, serving_size: f64) -> Result<(), ValidationError> {
        self.serving_size = non_negative("serving_size", serving_size)?;
        Ok(())
    }

    #[must_use]
    pub fn serving_unit(&self) -> &str {
        &self.serving_unit
    }

    pub fn set_serving_unit(&mut self, serving_unit: impl Into<String>) {
        self.serving_unit = serving_unit.into();
    }

    #[must_use]
    pub fn nutrition(&self) -> &NutritionInfo {
        &self.nutrition
    }

    /// Mutable access; [`NutritionInfo::set`] still validates each value.
    pub fn nutrition_mut(&mut self) -> &mut NutritionInfo {
        &mut self.nutrition
    }

    pub fn set_nutrition(&mut self, nutrition: NutritionInfo) {
        self.nutrition = nutrition;
    }
}

// Reals compare with `total_cmp` so equality agrees with the bitwise hash.
impl PartialEq for Food {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.serving_size.total_cmp(&other.serving_size) == Ordering::Equal
            && self.name == other.name
            && self.serving_unit == other.serving_unit
            && self.nutrition == other.nutrition
    }
}

impl Eq for Food {}

impl Hash for Food {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
        self.serving_size.to_bits().hash(state);
        self.serving_unit.hash(state);
        self.nutrition.hash(state);
    }
}

// --- Diary entries ---

/// A record that some servings of a food were eaten at `time` (ms since epoch).
#[derive(Debug, Clone, Serialize)]
pub struct FoodDiaryEntry {
    id: i64,
    food_id: i64,
    num_servings: f64,
    time: i64,
}

impl FoodDiaryEntry {
    pub fn new(food_id: i64, num_servings: f64, time: i64) -> Result<Self, ValidationError> {
        Self::with_id(generate_id(), food_id, num_servings, time)
    }

    pub fn for_food(food: &Food, num_servings: f64, time: i64) -> Result<Self, ValidationError> {
        Self::new(food.id(), num_servings, time)
    }

    pub fn with_id(
        id: i64,
        food_id: i64,
        num_servings: f64,
        time: i64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            food_id,
            num_servings: non_negative("num_servings", num_servings)?,
            time,
        })
    }

    /// Deterministic fixture entry referencing one of `foods`.
    ///
    /// # Panics
    ///
    /// Panics if `foods` is empty.
    #[must_use]
    pub fn make_random_seeded(seed: u64, foods: &[Food]) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let food = &foods[rng.random_range(0..foods.len())];
        Self {
            id: rng.random(),
            food_id: food.id(),
            num_servings: f64::from(rng.random_range(0..100_i32)),
            time: rng.random_range(0..i64::MAX),
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn food_id(&self) -> i64 {
        self.food_id
    }

    pub fn set_food_id(&mut self, food_id: i64) {
        self.food_id = food_id;
    }

    #[must_use]
    pub fn num_servings(&self) -> f64 {
        self.num_servings
    }

    pub fn set_num_servings(&mut self, num_servings: f64) -> Result<(), ValidationError> {
        self.num_servings = non_negative("num_servings", num_servings)?;
        Ok(())
    }

    #[must_use]
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn set_time(&mut self, time: i64) {
        self.time = time;
    }
}

impl PartialEq for FoodDiaryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.food_id == other.food_id
            && self.num_servings.total_cmp(&other.num_servings) == Ordering::Equal
            && self.time == other.time
    }
}

impl Eq for FoodDiaryEntry {}

impl Hash for FoodDiaryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.food_id.hash(state);
        self.num_servings.to_bits().hash(state);
        self.time.hash(state);
    }
}

// --- Meals ---

/// A diary entry paired with the food it references. Edits change the entry only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Meal {
    entry: FoodDiaryEntry,
    food: Food,
}

impl Meal {
    /// Log `num_servings` of `food` at `time` as a new, not yet persisted meal.
    pub fn new(food: Food, num_servings: f64, time: i64) -> Result<Self, ValidationError> {
        let entry = FoodDiaryEntry::for_food(&food, num_servings, time)?;
        Ok(Self { entry, food })
    }

    /// Pair an existing entry with the food it refers to.
    pub fn from_parts(entry: FoodDiaryEntry, food: Food) -> Result<Self, ValidationError> {
        if entry.food_id() != food.id() {
            return Err(ValidationError::FoodMismatch {
                entry_food_id: entry.food_id(),
                food_id: food.id(),
            });
        }
        Ok(Self { entry, food })
    }

    /// Callers guarantee `entry.food_id() == food.id()`.
    pub(crate) fn joined(entry: FoodDiaryEntry, food: Food) -> Self {
        debug_assert_eq!(entry.food_id(), food.id());
        Self { entry, food }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.entry.id()
    }

    #[must_use]
    pub fn entry(&self) -> &FoodDiaryEntry {
        &self.entry
    }

    #[must_use]
    pub fn food(&self) -> &Food {
        &self.food
    }

    #[must_use]
    pub fn num_servings(&self) -> f64 {
        self.entry.num_servings()
    }

    #[must_use]
    pub fn time(&self) -> i64 {
        self.entry.time()
    }

    pub fn set_num_servings(&mut self, num_servings: f64) -> Result<(), ValidationError> {
        self.entry.set_num_servings(num_servings)
    }

    pub fn set_time(&mut self, time: i64) {
        self.entry.set_time(time);
    }

    /// Nutrition for the logged number of servings.
    pub fn nutrition(&self) -> Result<NutritionInfo, ValidationError> {
        self.food.nutrition().times(self.num_servings())
    }

    pub fn total_nutrition(meals: &[Meal]) -> Result<NutritionInfo, ValidationError> {
        let per_meal = meals
            .iter()
            .map(Meal::nutrition)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NutritionInfo::sum(&per_meal))
    }

    #[must_use]
    pub fn into_parts(self) -> (FoodDiaryEntry, Food) {
        (self.entry, self.food)
    }
}

// --- Goals ---

/// Daily target for one nutrient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NutritionGoal {
    nutrient: Nutrient,
    amount: i32,
}

impl NutritionGoal {
    pub fn new(nutrient: Nutrient, amount: i32) -> Result<Self, ValidationError> {
        Ok(Self {
            nutrient,
            amount: non_negative_int("amount", amount)?,
        })
    }

    #[must_use]
    pub fn nutrient(&self) -> Nutrient {
        self.nutrient
    }

    #[must_use]
    pub fn amount(&self) -> i32 {
        self.amount
    }

    pub fn set_amount(&mut self, amount: i32) -> Result<(), ValidationError> {
        self.amount = non_negative_int("amount", amount)?;
        Ok(())
    }

    /// Fraction of the goal reached by `eaten`; `None` when the goal is zero.
    #[must_use]
    pub fn progress(&self, eaten: &NutritionInfo) -> Option<f64> {
        (self.amount > 0).then(|| f64::from(eaten.get(self.nutrient)) / f64::from(self.amount))
    }
}

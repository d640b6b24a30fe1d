//! Single access point for front ends.
//!
//! Writes and one-shot reads are scheduled on the [`WorkerPool`] and return a
//! [`Pending`]. Reads that should stay current are returned as [`Live`]
//! values, filtered by the view-model's search, day and selection state.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::db::{Dao, Database, Table};
use crate::error::ValidationError;
use crate::executor::{Pending, WorkerPool};
use crate::live::{Live, spawn_live};
use crate::models::{
    DAY_MS, Food, FoodDiaryEntry, Meal, Nutrient, NutritionGoal, NutritionInfo, day_start_millis,
    now_millis,
};

const FOOD_TABLES: &[Table] = &[Table::Food];
const DIARY_TABLES: &[Table] = &[Table::DiaryFood];
const MEAL_TABLES: &[Table] = &[Table::Food, Table::DiaryFood];
const GOAL_TABLES: &[Table] = &[Table::NutritionGoal];

pub struct FitnessViewModel {
    db: Arc<Database>,
    pool: WorkerPool,
    food_search: watch::Sender<String>,
    diary_day: watch::Sender<Option<i64>>,
    selected_entry: watch::Sender<Option<i64>>,
}

impl FitnessViewModel {
    pub fn new(db: Arc<Database>, pool: WorkerPool) -> Self {
        debug!(workers = pool.size(), "view-model ready");
        FitnessViewModel {
            db,
            pool,
            food_search: watch::channel(String::new()).0,
            diary_day: watch::channel(None).0,
            selected_entry: watch::channel(None).0,
        }
    }

    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // --- Filters ---

    /// Substring filter for [`FitnessViewModel::foods`]; empty shows every food.
    pub fn set_food_search(&self, text: impl Into<String>) {
        self.food_search.send_replace(text.into());
    }

    /// Restrict diary queries to the day starting at `day_start` (ms), or show
    /// every entry with `None`.
    pub fn set_diary_day(&self, day_start: Option<i64>) {
        self.diary_day.send_replace(day_start);
    }

    pub fn select_date(&self, date: NaiveDate) {
        self.set_diary_day(Some(day_start_millis(date)));
    }

    pub fn select_entry(&self, id: Option<i64>) {
        self.selected_entry.send_replace(id);
    }

    // --- Live queries ---

    pub fn foods(&self) -> Live<Vec<Food>> {
        self.live(
            "foods",
            self.food_search.subscribe(),
            FOOD_TABLES,
            |db, text: &String| {
                if text.is_empty() {
                    db.food_dao().get_all()
                } else {
                    db.food_dao().search(text)
                }
            },
        )
    }

    pub fn food_count(&self) -> Live<i64> {
        self.live("food_count", fixed(()), FOOD_TABLES, |db, ()| {
            db.food_dao().count()
        })
    }

    pub fn diary_entries(&self) -> Live<Vec<FoodDiaryEntry>> {
        self.live(
            "diary_entries",
            self.diary_day.subscribe(),
            DIARY_TABLES,
            |db, day: &Option<i64>| match *day {
                Some(start) => db.diary_dao().get_range(start, start.saturating_add(DAY_MS)),
                None => db.diary_dao().get_all(),
            },
        )
    }

    pub fn meals(&self) -> Live<Vec<Meal>> {
        self.live(
            "meals",
            self.diary_day.subscribe(),
            MEAL_TABLES,
            |db, day: &Option<i64>| meals_for_day(db, *day),
        )
    }

    pub fn selected_meal(&self) -> Live<Option<Meal>> {
        self.live(
            "selected_meal",
            self.selected_entry.subscribe(),
            MEAL_TABLES,
            |db, id: &Option<i64>| match *id {
                Some(id) => db.diary_dao().get_meal(id),
                None => Ok(None),
            },
        )
    }

    pub fn goals(&self) -> Live<Vec<NutritionGoal>> {
        self.live("goals", fixed(()), GOAL_TABLES, |db, ()| {
            db.goal_dao().get_all()
        })
    }

    /// Nutrition eaten on the selected day (or overall with no day selected).
    pub fn daily_totals(&self) -> Live<NutritionInfo> {
        self.live(
            "daily_totals",
            self.diary_day.subscribe(),
            MEAL_TABLES,
            |db, day: &Option<i64>| {
                let meals = meals_for_day(db, *day)?;
                Ok(Meal::total_nutrition(&meals)?)
            },
        )
    }

    pub fn food(&self, id: i64) -> Live<Option<Food>> {
        self.live("food", fixed(id), FOOD_TABLES, |db, id: &i64| {
            db.food_dao().get(*id)
        })
    }

    /// Foods whose name matches the SQL `LIKE` pattern.
    pub fn foods_by_name(&self, pattern: impl Into<String>) -> Live<Vec<Food>> {
        self.live(
            "foods_by_name",
            fixed(pattern.into()),
            FOOD_TABLES,
            |db, pattern: &String| db.food_dao().find_by_name(pattern),
        )
    }

    pub fn diary_entry(&self, id: i64) -> Live<Option<FoodDiaryEntry>> {
        self.live("diary_entry", fixed(id), DIARY_TABLES, |db, id: &i64| {
            db.diary_dao().get(*id)
        })
    }

    pub fn meal(&self, id: i64) -> Live<Option<Meal>> {
        self.live("meal", fixed(id), MEAL_TABLES, |db, id: &i64| {
            db.diary_dao().get_meal(*id)
        })
    }

    pub fn goal(&self, nutrient: Nutrient) -> Live<Option<NutritionGoal>> {
        self.live("goal", fixed(nutrient), GOAL_TABLES, |db, nutrient: &Nutrient| {
            db.goal_dao().get(*nutrient)
        })
    }

    fn live<K, T, Q>(
        &self,
        label: &'static str,
        key: watch::Receiver<K>,
        tables: &'static [Table],
        query: Q,
    ) -> Live<T>
    where
        K: Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        Q: Fn(&Database, &K) -> Result<T> + Send + Sync + 'static,
    {
        spawn_live(&self.pool, Arc::clone(&self.db), label, key, tables, query)
    }

    // --- One-shot reads ---

    pub fn get_food(&self, id: i64) -> Pending<Option<Food>> {
        self.run("get_food", move |db| db.food_dao().get(id))
    }

    pub fn find_foods_by_name(&self, pattern: impl Into<String>) -> Pending<Vec<Food>> {
        let pattern = pattern.into();
        self.run("find_foods_by_name", move |db| {
            db.food_dao().find_by_name(&pattern)
        })
    }

    pub fn get_diary_entry(&self, id: i64) -> Pending<Option<FoodDiaryEntry>> {
        self.run("get_diary_entry", move |db| db.diary_dao().get(id))
    }

    pub fn get_meal(&self, id: i64) -> Pending<Option<Meal>> {
        self.run("get_meal", move |db| db.diary_dao().get_meal(id))
    }

    /// Meals in `[start, end)`, newest first.
    pub fn get_meals(&self, start: i64, end: i64) -> Pending<Vec<Meal>> {
        self.run("get_meals", move |db| db.diary_dao().get_meals(start, end))
    }

    pub fn get_goal(&self, nutrient: Nutrient) -> Pending<Option<NutritionGoal>> {
        self.run("get_goal", move |db| db.goal_dao().get(nutrient))
    }

    // --- Writes ---

    pub fn insert_foods(&self, foods: Vec<Food>) -> Pending<()> {
        self.run("insert_foods", move |db| db.food_dao().insert(&foods))
    }

    pub fn update_foods(&self, foods: Vec<Food>) -> Pending<usize> {
        self.run("update_foods", move |db| db.food_dao().update(&foods))
    }

    /// Also removes every diary entry that references the deleted foods.
    pub fn delete_foods(&self, foods: Vec<Food>) -> Pending<usize> {
        self.run("delete_foods", move |db| db.food_dao().delete(&foods))
    }

    pub fn insert_diary_entries(&self, entries: Vec<FoodDiaryEntry>) -> Pending<()> {
        self.run("insert_diary_entries", move |db| {
            db.diary_dao().insert(&entries)
        })
    }

    pub fn update_diary_entries(&self, entries: Vec<FoodDiaryEntry>) -> Pending<usize> {
        self.run("update_diary_entries", move |db| {
            db.diary_dao().update(&entries)
        })
    }

    pub fn delete_diary_entries(&self, entries: Vec<FoodDiaryEntry>) -> Pending<usize> {
        self.run("delete_diary_entries", move |db| {
            db.diary_dao().delete(&entries)
        })
    }

    pub fn update_meals(&self, meals: Vec<Meal>) -> Pending<usize> {
        self.run("update_meals", move |db| db.diary_dao().update_meals(&meals))
    }

    pub fn insert_goals(&self, goals: Vec<NutritionGoal>) -> Pending<()> {
        self.run("insert_goals", move |db| db.goal_dao().insert(&goals))
    }

    pub fn update_goals(&self, goals: Vec<NutritionGoal>) -> Pending<usize> {
        self.run("update_goals", move |db| db.goal_dao().update(&goals))
    }

    pub fn delete_goals(&self, goals: Vec<NutritionGoal>) -> Pending<usize> {
        self.run("delete_goals", move |db| db.goal_dao().delete(&goals))
    }

    pub fn upsert_goals(&self, goals: Vec<NutritionGoal>) -> Pending<()> {
        self.run("upsert_goals", move |db| db.goal_dao().upsert(&goals))
    }

    pub fn clear_all_tables(&self) -> Pending<()> {
        self.run("clear_all_tables", Database::clear_all_tables)
    }

    /// Record `num_servings` of an already stored food at `time`.
    pub fn log_meal(
        &self,
        food_id: i64,
        num_servings: f64,
        time: i64,
    ) -> Result<Pending<FoodDiaryEntry>, ValidationError> {
        let entry = FoodDiaryEntry::new(food_id, num_servings, time)?;
        Ok(self.run("log_meal", move |db| {
            db.diary_dao().insert_one(&entry)?;
            Ok(entry)
        }))
    }

    /// Store a random food and one serving of it eaten now.
    ///
    /// Both rows are written by the same job, food first, so the diary entry
    /// never references a food that is not there yet.
    pub fn log_sample_meal(&self) -> Pending<Meal> {
        self.run("log_sample_meal", |db| {
            let food = Food::make_random();
            db.food_dao().insert_one(&food)?;
            let entry = FoodDiaryEntry::for_food(&food, 1.0, now_millis())?;
            db.diary_dao().insert_one(&entry)?;
            info!(food = food.name(), entry = entry.id(), "logged sample meal");
            Ok(Meal::joined(entry, food))
        })
    }

    fn run<T, F>(&self, label: &'static str, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        self.pool.submit(label, move || work(db.as_ref()))
    }
}

fn meals_for_day(db: &Database, day: Option<i64>) -> Result<Vec<Meal>> {
    match day {
        Some(start) => db.diary_dao().get_meals(start, start.saturating_add(DAY_MS)),
        None => db.diary_dao().get_all_meals(),
    }
}

// A key that never changes; the query re-runs on table writes only.
fn fixed<K>(key: K) -> watch::Receiver<K> {
    watch::channel(key).1
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn view_model() -> FitnessViewModel {
        let db = Arc::new(Database::open_in_memory().unwrap());
        FitnessViewModel::new(db, WorkerPool::new(4).unwrap())
    }

    async fn within<F: std::future::IntoFuture>(fut: F) -> F::Output {
        tokio::time::timeout(TIMEOUT, fut.into_future()).await.unwrap()
    }

    fn food(name: &str, calories: i32) -> Food {
        let mut food = Food::new(name, "grams", 100.0).unwrap();
        food.nutrition_mut().set(Nutrient::Calories, calories).unwrap();
        food
    }

    #[tokio::test]
    async fn test_pending_returns_counts() {
        let vm = view_model();
        let apple = food("Apple", 52);
        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();

        let mut renamed = apple.clone();
        renamed.set_name("Green Apple").unwrap();
        assert_eq!(within(vm.update_foods(vec![renamed.clone()])).await.unwrap(), 1);
        assert_eq!(
            within(vm.get_food(apple.id())).await.unwrap(),
            Some(renamed.clone())
        );
        assert_eq!(within(vm.delete_foods(vec![renamed.clone()])).await.unwrap(), 1);
        assert_eq!(within(vm.delete_foods(vec![renamed])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_error_reaches_caller() {
        let vm = view_model();
        let apple = food("Apple", 52);
        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();
        assert!(within(vm.insert_foods(vec![apple])).await.is_err());
    }

    #[tokio::test]
    async fn test_foods_follow_search_key() {
        let vm = view_model();
        within(vm.insert_foods(vec![food("Apple", 52), food("Banana", 89)]))
            .await
            .unwrap();

        let foods = vm.foods();
        assert_eq!(within(foods.wait_for(|f| f.len() == 2)).await.unwrap().len(), 2);

        vm.set_food_search("APP");
        let filtered = within(foods.wait_for(|f| f.len() == 1)).await.unwrap();
        assert_eq!(filtered[0].name(), "Apple");

        vm.set_food_search("");
        within(foods.wait_for(|f| f.len() == 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_food_count_follows_writes() {
        let vm = view_model();
        let count = vm.food_count();
        assert_eq!(within(count.first()).await.unwrap(), 0);

        within(vm.insert_foods(vec![food("Apple", 52), food("Egg", 78)]))
            .await
            .unwrap();
        assert_eq!(within(count.wait_for(|n| *n == 2)).await.unwrap(), 2);

        within(vm.clear_all_tables()).await.unwrap();
        assert_eq!(within(count.wait_for(|n| *n == 0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_meals_follow_day_filter() {
        let vm = view_model();
        let apple = food("Apple", 52);
        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let start = day_start_millis(day);
        within(vm.log_meal(apple.id(), 2.0, start + 1_000).unwrap())
            .await
            .unwrap();
        within(vm.log_meal(apple.id(), 1.0, start - 1).unwrap())
            .await
            .unwrap();

        let meals = vm.meals();
        within(meals.wait_for(|m| m.len() == 2)).await.unwrap();

        vm.select_date(day);
        let today = within(meals.wait_for(|m| m.len() == 1)).await.unwrap();
        assert_eq!(today[0].num_servings(), 2.0);
        assert_eq!(today[0].food().name(), "Apple");

        let totals = vm.daily_totals();
        assert_eq!(
            within(totals.wait_for(|t| t.calories() == 104)).await.unwrap().calories(),
            104
        );

        vm.set_diary_day(None);
        within(meals.wait_for(|m| m.len() == 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_meals_republish_on_food_rename() {
        let vm = view_model();
        let mut apple = food("Apple", 52);
        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();
        let entry = within(vm.log_meal(apple.id(), 1.0, 10).unwrap()).await.unwrap();

        vm.select_entry(Some(entry.id()));
        let selected = vm.selected_meal();
        within(selected.wait_for(Option::is_some)).await.unwrap();

        apple.set_name("Fuji").unwrap();
        within(vm.update_foods(vec![apple])).await.unwrap();
        let meal = within(selected.wait_for(|m| {
            m.as_ref().is_some_and(|m| m.food().name() == "Fuji")
        }))
        .await
        .unwrap();
        assert_eq!(meal.map(|m| m.id()), Some(entry.id()));

        vm.select_entry(None);
        within(selected.wait_for(Option::is_none)).await.unwrap();
    }

    #[tokio::test]
    async fn test_log_meal_validates_before_scheduling() {
        let vm = view_model();
        assert!(matches!(
            vm.log_meal(1, -1.0, 0),
            Err(ValidationError::InvalidArgument {
                field: "num_servings",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_log_meal_for_missing_food_fails() {
        let vm = view_model();
        assert!(within(vm.log_meal(999, 1.0, 0).unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn test_log_sample_meal_never_breaks_foreign_key() {
        let vm = view_model();
        let jobs: Vec<_> = (0..20).map(|_| vm.log_sample_meal()).collect();
        for job in jobs {
            let meal = within(job).await.unwrap();
            assert_eq!(meal.entry().food_id(), meal.food().id());
            assert_eq!(meal.num_servings(), 1.0);
        }

        let meals = within(vm.get_meals(0, i64::MAX)).await.unwrap();
        assert_eq!(meals.len(), 20);
    }

    #[tokio::test]
    async fn test_goals_live_and_upsert() {
        let vm = view_model();
        let goals = vm.goals();
        assert!(within(goals.first()).await.unwrap().is_empty());

        within(vm.upsert_goals(vec![NutritionGoal::new(Nutrient::Calories, 2000).unwrap()]))
            .await
            .unwrap();
        let current = within(goals.wait_for(|g| g.len() == 1)).await.unwrap();
        assert_eq!(current[0].amount(), 2000);

        assert_eq!(
            within(vm.get_goal(Nutrient::Calories)).await.unwrap().map(|g| g.amount()),
            Some(2000)
        );
        assert_eq!(within(vm.get_goal(Nutrient::Protein)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_meals_changes_entries() {
        let vm = view_model();
        let apple = food("Apple", 52);
        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();
        let entry = within(vm.log_meal(apple.id(), 1.0, 10).unwrap()).await.unwrap();

        let mut meal = within(vm.get_meal(entry.id())).await.unwrap().unwrap();
        meal.set_num_servings(3.0).unwrap();
        let changed = within(vm.update_meals(vec![meal])).await.unwrap();
        assert_eq!(changed, 1);

        let stored = within(vm.get_diary_entry(entry.id())).await.unwrap().unwrap();
        assert_eq!(stored.num_servings(), 3.0);
    }

    #[tokio::test]
    async fn test_diary_entries_live_after_delete() {
        let vm = view_model();
        let apple = food("Apple", 52);
        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();
        let entry = within(vm.log_meal(apple.id(), 1.0, 10).unwrap()).await.unwrap();

        let entries = vm.diary_entries();
        within(entries.wait_for(|e| e.len() == 1)).await.unwrap();

        assert_eq!(within(vm.delete_diary_entries(vec![entry])).await.unwrap(), 1);
        within(entries.wait_for(Vec::is_empty)).await.unwrap();
    }

    #[tokio::test]
    async fn test_keyed_live_reads_follow_writes() {
        let vm = view_model();
        let mut apple = food("Apple", 52);
        let live_food = vm.food(apple.id());
        assert_eq!(within(live_food.first()).await.unwrap(), None);
        let named = vm.foods_by_name("fuji");
        assert!(within(named.first()).await.unwrap().is_empty());

        within(vm.insert_foods(vec![apple.clone()])).await.unwrap();
        within(live_food.wait_for(Option::is_some)).await.unwrap();

        apple.set_name("Fuji").unwrap();
        within(vm.update_foods(vec![apple.clone()])).await.unwrap();
        let found = within(named.wait_for(|f| f.len() == 1)).await.unwrap();
        assert_eq!(found[0].id(), apple.id());

        let entry = within(vm.log_meal(apple.id(), 1.0, 10).unwrap()).await.unwrap();
        let live_entry = vm.diary_entry(entry.id());
        let live_meal = vm.meal(entry.id());
        within(live_entry.wait_for(Option::is_some)).await.unwrap();
        within(live_meal.wait_for(Option::is_some)).await.unwrap();

        within(vm.delete_foods(vec![apple])).await.unwrap();
        within(live_entry.wait_for(Option::is_none)).await.unwrap();
        within(live_meal.wait_for(Option::is_none)).await.unwrap();
        within(live_food.wait_for(Option::is_none)).await.unwrap();

        let live_goal = vm.goal(Nutrient::Iron);
        assert_eq!(within(live_goal.first()).await.unwrap(), None);
        within(vm.upsert_goals(vec![NutritionGoal::new(Nutrient::Iron, 18).unwrap()]))
            .await
            .unwrap();
        let goal = within(live_goal.wait_for(Option::is_some)).await.unwrap();
        assert_eq!(goal.map(|g| g.amount()), Some(18));
    }

    #[tokio::test]
    async fn test_live_read_surfaces_corrupt_row() {
        let vm = view_model();
        vm.database()
            .conn()
            .execute("INSERT INTO nutrition_goal (nutrient, amount) VALUES (99, 1)", [])
            .unwrap();

        let err = within(vm.goals().first()).await.unwrap_err();
        assert!(format!("{err:#}").contains("goals failed"));
        assert!(within(vm.goal(Nutrient::Calories).first()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_live_reads_from_plain_thread() {
        let vm = Arc::new(view_model());
        let count = {
            let vm = Arc::clone(&vm);
            std::thread::spawn(move || {
                drop(vm.insert_foods(vec![food("Apple", 52)]));
                vm.food_count()
            })
            .join()
            .unwrap()
        };
        assert_eq!(within(count.wait_for(|n| *n == 1)).await.unwrap(), 1);
    }
}

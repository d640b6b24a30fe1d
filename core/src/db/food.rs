use anyhow::{Context, Result};
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use super::{Dao, Database, Table, escape_like, invalid_column};
use crate::models::{Food, Nutrient, NutritionInfo};

// Column order matches `food_values` and `food_from_row`.
const INSERT_FOOD: &str = "INSERT INTO food (
        id, name, serving_size, serving_unit,
        nutrition_calories, nutrition_fat_calories, nutrition_total_fat,
        nutrition_saturated_fat, nutrition_trans_fat, nutrition_cholesterol,
        nutrition_sodium, nutrition_total_carbs, nutrition_dietary_fiber,
        nutrition_total_sugars, nutrition_added_sugars, nutrition_protein,
        nutrition_vitamin_d, nutrition_calcium, nutrition_iron, nutrition_potassium
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)";

const UPDATE_FOOD: &str = "UPDATE food SET
        name = ?2, serving_size = ?3, serving_unit = ?4,
        nutrition_calories = ?5, nutrition_fat_calories = ?6, nutrition_total_fat = ?7,
        nutrition_saturated_fat = ?8, nutrition_trans_fat = ?9, nutrition_cholesterol = ?10,
        nutrition_sodium = ?11, nutrition_total_carbs = ?12, nutrition_dietary_fiber = ?13,
        nutrition_total_sugars = ?14, nutrition_added_sugars = ?15, nutrition_protein = ?16,
        nutrition_vitamin_d = ?17, nutrition_calcium = ?18, nutrition_iron = ?19,
        nutrition_potassium = ?20
    WHERE id = ?1";

pub(crate) const FOOD_COLUMNS: &str = "f.id, f.name, f.serving_size, f.serving_unit,
        f.nutrition_calories, f.nutrition_fat_calories, f.nutrition_total_fat,
        f.nutrition_saturated_fat, f.nutrition_trans_fat, f.nutrition_cholesterol,
        f.nutrition_sodium, f.nutrition_total_carbs, f.nutrition_dietary_fiber,
        f.nutrition_total_sugars, f.nutrition_added_sugars, f.nutrition_protein,
        f.nutrition_vitamin_d, f.nutrition_calcium, f.nutrition_iron, f.nutrition_potassium";

/// Number of columns in [`FOOD_COLUMNS`].
pub(crate) const FOOD_COLUMN_COUNT: usize = 4 + Nutrient::COUNT;

pub struct FoodDao<'db> {
    db: &'db Database,
}

impl<'db> FoodDao<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        FoodDao { db }
    }

    /// Foods whose name matches a SQL `LIKE` pattern; `%` and `_` are wildcards.
    pub fn find_by_name(&self, pattern: &str) -> Result<Vec<Food>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {FOOD_COLUMNS} FROM food f WHERE f.name LIKE ?1 ORDER BY f.name, f.id"
        ))?;
        let foods = stmt
            .query_map(params![pattern], |row| food_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    /// Foods whose name contains `text` literally, case-insensitive for ASCII.
    pub fn search(&self, text: &str) -> Result<Vec<Food>> {
        let pattern = format!("%{}%", escape_like(text));
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {FOOD_COLUMNS} FROM food f
             WHERE f.name LIKE ?1 ESCAPE '\\'
             ORDER BY f.name, f.id"
        ))?;
        let foods = stmt
            .query_map(params![pattern], |row| food_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM food", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl Dao for FoodDao<'_> {
    type Entity = Food;
    type Key = i64;

    fn insert(&self, items: &[Food]) -> Result<()> {
        self.db
            .transaction(|tx| {
                let mut stmt = tx.prepare_cached(INSERT_FOOD)?;
                for food in items {
                    stmt.execute(params_from_iter(food_values(food)))
                        .with_context(|| format!("Failed to insert food {}", food.id()))?;
                }
                Ok(())
            })?;
        debug!(rows = items.len(), "inserted foods");
        if !items.is_empty() {
            self.db.notify(Table::Food);
        }
        Ok(())
    }

    fn update(&self, items: &[Food]) -> Result<usize> {
        let changed = self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached(UPDATE_FOOD)?;
            let mut changed = 0;
            for food in items {
                changed += stmt.execute(params_from_iter(food_values(food)))?;
            }
            Ok(changed)
        })?;
        debug!(rows = changed, "updated foods");
        if changed > 0 {
            self.db.notify(Table::Food);
        }
        Ok(changed)
    }

    fn delete(&self, items: &[Food]) -> Result<usize> {
        let removed = self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached("DELETE FROM food WHERE id = ?1")?;
            let mut removed = 0;
            for food in items {
                removed += stmt.execute(params![food.id()])?;
            }
            Ok(removed)
        })?;
        debug!(rows = removed, "deleted foods");
        if removed > 0 {
            self.db.notify(Table::Food);
            // ON DELETE CASCADE took the diary rows with them
            self.db.notify(Table::DiaryFood);
        }
        Ok(removed)
    }

    fn get(&self, id: i64) -> Result<Option<Food>> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {FOOD_COLUMNS} FROM food f WHERE f.id = ?1"))?;
        let food = stmt
            .query_row(params![id], |row| food_from_row(row, 0))
            .optional()?;
        Ok(food)
    }

    fn get_all(&self) -> Result<Vec<Food>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {FOOD_COLUMNS} FROM food f ORDER BY f.name, f.id"
        ))?;
        let foods = stmt
            .query_map([], |row| food_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }
}

fn food_values(food: &Food) -> Vec<Value> {
    let mut values = Vec::with_capacity(FOOD_COLUMN_COUNT);
    values.push(Value::Integer(food.id()));
    values.push(Value::Text(food.name().to_string()));
    values.push(Value::Real(food.serving_size()));
    values.push(Value::Text(food.serving_unit().to_string()));
    for nutrient in Nutrient::ALL {
        values.push(Value::Integer(i64::from(food.nutrition().get(nutrient))));
    }
    values
}

// Reads FOOD_COLUMNS starting at column `offset`.
pub(crate) fn food_from_row(row: &Row, offset: usize) -> rusqlite::Result<Food> {
    let mut nutrition = NutritionInfo::new();
    for (i, nutrient) in Nutrient::ALL.into_iter().enumerate() {
        let idx = offset + 4 + i;
        nutrition
            .set(nutrient, row.get(idx)?)
            .map_err(|e| invalid_column(idx, Type::Integer, e))?;
    }
    Food::with_id(
        row.get(offset)?,
        row.get::<_, String>(offset + 1)?,
        row.get::<_, String>(offset + 3)?,
        row.get(offset + 2)?,
        nutrition,
    )
    .map_err(|e| invalid_column(offset + 1, Type::Text, e))
}

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use super::food::{FOOD_COLUMNS, food_from_row};
use super::{Dao, Database, Table, invalid_column};
use crate::models::{FoodDiaryEntry, Meal};

const ENTRY_COLUMNS: &str = "d.id, d.food_id, d.num_servings, d.time";
const ENTRY_COLUMN_COUNT: usize = 4;

pub struct FoodDiaryEntryDao<'db> {
    db: &'db Database,
}

impl<'db> FoodDiaryEntryDao<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        FoodDiaryEntryDao { db }
    }

    /// Entries with `start <= time < end`, newest first.
    pub fn get_range(&self, start: i64, end: i64) -> Result<Vec<FoodDiaryEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM diary_food d
             WHERE d.time >= ?1 AND d.time < ?2
             ORDER BY d.time DESC, d.id DESC"
        ))?;
        let entries = stmt
            .query_map(params![start, end], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_meal(&self, id: i64) -> Result<Option<Meal>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS}, {FOOD_COLUMNS}
             FROM diary_food d
             JOIN food f ON f.id = d.food_id
             WHERE d.id = ?1"
        ))?;
        let meal = stmt.query_row(params![id], meal_from_row).optional()?;
        Ok(meal)
    }

    pub fn get_all_meals(&self) -> Result<Vec<Meal>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS}, {FOOD_COLUMNS}
             FROM diary_food d
             JOIN food f ON f.id = d.food_id
             ORDER BY d.time DESC, d.id DESC"
        ))?;
        let meals = stmt
            .query_map([], meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Meals with `start <= time < end`, newest first.
    pub fn get_meals(&self, start: i64, end: i64) -> Result<Vec<Meal>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS}, {FOOD_COLUMNS}
             FROM diary_food d
             JOIN food f ON f.id = d.food_id
             WHERE d.time >= ?1 AND d.time < ?2
             ORDER BY d.time DESC, d.id DESC"
        ))?;
        let meals = stmt
            .query_map(params![start, end], meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Persist the diary half of each meal. The joined food is not written.
    pub fn update_meals(&self, meals: &[Meal]) -> Result<usize> {
        let entries: Vec<FoodDiaryEntry> = meals.iter().map(|m| m.entry().clone()).collect();
        self.update(&entries)
    }

    /// Entries referencing `food_id`, newest first.
    pub fn get_for_food(&self, food_id: i64) -> Result<Vec<FoodDiaryEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM diary_food d
             WHERE d.food_id = ?1
             ORDER BY d.time DESC, d.id DESC"
        ))?;
        let entries = stmt
            .query_map(params![food_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl Dao for FoodDiaryEntryDao<'_> {
    type Entity = FoodDiaryEntry;
    type Key = i64;

    fn insert(&self, items: &[FoodDiaryEntry]) -> Result<()> {
        self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO diary_food (id, food_id, num_servings, time)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in items {
                stmt.execute(params![
                    entry.id(),
                    entry.food_id(),
                    entry.num_servings(),
                    entry.time()
                ])
                .with_context(|| {
                    format!(
                        "Failed to insert diary entry {} for food {}",
                        entry.id(),
                        entry.food_id()
                    )
                })?;
            }
            Ok(())
        })?;
        debug!(rows = items.len(), "inserted diary entries");
        if !items.is_empty() {
            self.db.notify(Table::DiaryFood);
        }
        Ok(())
    }

    fn update(&self, items: &[FoodDiaryEntry]) -> Result<usize> {
        let changed = self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "UPDATE diary_food SET food_id = ?2, num_servings = ?3, time = ?4
                 WHERE id = ?1",
            )?;
            let mut changed = 0;
            for entry in items {
                changed += stmt.execute(params![
                    entry.id(),
                    entry.food_id(),
                    entry.num_servings(),
                    entry.time()
                ])?;
            }
            Ok(changed)
        })?;
        debug!(rows = changed, "updated diary entries");
        if changed > 0 {
            self.db.notify(Table::DiaryFood);
        }
        Ok(changed)
    }

    fn delete(&self, items: &[FoodDiaryEntry]) -> Result<usize> {
        let removed = self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached("DELETE FROM diary_food WHERE id = ?1")?;
            let mut removed = 0;
            for entry in items {
                removed += stmt.execute(params![entry.id()])?;
            }
            Ok(removed)
        })?;
        debug!(rows = removed, "deleted diary entries");
        if removed > 0 {
            self.db.notify(Table::DiaryFood);
        }
        Ok(removed)
    }

    fn get(&self, id: i64) -> Result<Option<FoodDiaryEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM diary_food d WHERE d.id = ?1"
        ))?;
        let entry = stmt.query_row(params![id], entry_from_row).optional()?;
        Ok(entry)
    }

    fn get_all(&self) -> Result<Vec<FoodDiaryEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM diary_food d ORDER BY d.time DESC, d.id DESC"
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn entry_from_row(row: &Row) -> rusqlite::Result<FoodDiaryEntry> {
    FoodDiaryEntry::with_id(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)
        .map_err(|e| invalid_column(2, Type::Real, e))
}

// Expects ENTRY_COLUMNS followed by FOOD_COLUMNS.
fn meal_from_row(row: &Row) -> rusqlite::Result<Meal> {
    let entry = entry_from_row(row)?;
    let food = food_from_row(row, ENTRY_COLUMN_COUNT)?;
    Ok(Meal::joined(entry, food))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Food, Nutrient};

    fn setup() -> (Database, Food) {
        let db = Database::open_in_memory().unwrap();
        let mut food = Food::new("Apple", "grams", 100.0).unwrap();
        food.nutrition_mut().set(Nutrient::Calories, 52).unwrap();
        db.food_dao().insert_one(&food).unwrap();
        (db, food)
    }

    #[test]
    fn test_insert_and_get_entry() {
        let (db, food) = setup();
        let entry = FoodDiaryEntry::for_food(&food, 1.5, 1_700_000_000_000).unwrap();
        db.diary_dao().insert_one(&entry).unwrap();

        assert_eq!(db.diary_dao().get(entry.id()).unwrap(), Some(entry));
        assert_eq!(db.diary_dao().get(-1).unwrap(), None);
    }

    #[test]
    fn test_insert_entry_for_missing_food_fails() {
        let (db, _) = setup();
        let orphan = FoodDiaryEntry::new(12345, 1.0, 0).unwrap();
        assert!(db.diary_dao().insert_one(&orphan).is_err());
        assert!(db.diary_dao().get_all().unwrap().is_empty());
    }

    #[test]
    fn test_get_all_orders_newest_first() {
        let (db, food) = setup();
        let entries: Vec<_> = [300, 100, 500, 200, 400]
            .into_iter()
            .map(|t| FoodDiaryEntry::for_food(&food, 1.0, t).unwrap())
            .collect();
        db.diary_dao().insert(&entries).unwrap();

        let times: Vec<i64> = db
            .diary_dao()
            .get_all()
            .unwrap()
            .iter()
            .map(FoodDiaryEntry::time)
            .collect();
        assert_eq!(times, vec![500, 400, 300, 200, 100]);
    }

    #[test]
    fn test_range_is_half_open() {
        let (db, food) = setup();
        let entries: Vec<_> = [99, 100, 150, 199, 200]
            .into_iter()
            .map(|t| FoodDiaryEntry::for_food(&food, 1.0, t).unwrap())
            .collect();
        db.diary_dao().insert(&entries).unwrap();

        let times: Vec<i64> = db
            .diary_dao()
            .get_range(100, 200)
            .unwrap()
            .iter()
            .map(FoodDiaryEntry::time)
            .collect();
        assert_eq!(times, vec![199, 150, 100]);

        assert!(db.diary_dao().get_range(200, 200).unwrap().is_empty());
    }

    #[test]
    fn test_single_meal_in_window() {
        let (db, food) = setup();
        let t = 1_700_000_000_000;
        let entry = FoodDiaryEntry::for_food(&food, 2.0, t).unwrap();
        db.diary_dao().insert_one(&entry).unwrap();

        let meals = db.diary_dao().get_meals(t, t + 1).unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].food(), &food);
        assert_eq!(meals[0].food().name(), "Apple");
        assert_eq!(meals[0].num_servings(), 2.0);
        assert_eq!(meals[0].nutrition().unwrap().calories(), 104);

        assert!(db.diary_dao().get_meals(t + 1, t + 2).unwrap().is_empty());
    }

    #[test]
    fn test_meals_join_and_order() {
        let (db, apple) = setup();
        let egg = Food::new("Egg", "units", 1.0).unwrap();
        db.food_dao().insert_one(&egg).unwrap();
        db.diary_dao()
            .insert(&[
                FoodDiaryEntry::for_food(&apple, 1.0, 10).unwrap(),
                FoodDiaryEntry::for_food(&egg, 2.0, 30).unwrap(),
                FoodDiaryEntry::for_food(&apple, 3.0, 20).unwrap(),
            ])
            .unwrap();

        let meals = db.diary_dao().get_all_meals().unwrap();
        let summary: Vec<(&str, i64)> = meals.iter().map(|m| (m.food().name(), m.time())).collect();
        assert_eq!(summary, vec![("Egg", 30), ("Apple", 20), ("Apple", 10)]);

        let one = db.diary_dao().get_meal(meals[1].id()).unwrap().unwrap();
        assert_eq!(one, meals[1]);
        assert_eq!(db.diary_dao().get_meal(0).unwrap(), None);
    }

    #[test]
    fn test_update_meals_writes_entries() {
        let (db, food) = setup();
        let entry = FoodDiaryEntry::for_food(&food, 1.0, 10).unwrap();
        db.diary_dao().insert_one(&entry).unwrap();

        let meal = db.diary_dao().get_meal(entry.id()).unwrap().unwrap();
        let (mut edited, food) = meal.into_parts();
        edited.set_num_servings(4.0).unwrap();
        edited.set_time(50);
        let changed = db
            .diary_dao()
            .update_meals(&[Meal::from_parts(edited.clone(), food).unwrap()])
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(db.diary_dao().get(entry.id()).unwrap(), Some(edited));
    }

    #[test]
    fn test_update_and_delete_counts() {
        let (db, food) = setup();
        let mut entry = FoodDiaryEntry::for_food(&food, 1.0, 10).unwrap();
        db.diary_dao().insert_one(&entry).unwrap();

        entry.set_num_servings(0.5).unwrap();
        assert!(db.diary_dao().update_one(&entry).unwrap());
        assert_eq!(
            db.diary_dao().get(entry.id()).unwrap().unwrap().num_servings(),
            0.5
        );

        let stranger = FoodDiaryEntry::for_food(&food, 1.0, 10).unwrap();
        assert_eq!(db.diary_dao().delete(&[entry.clone(), stranger]).unwrap(), 1);
        assert_eq!(db.diary_dao().delete(&[entry]).unwrap(), 0);
    }

    #[test]
    fn test_get_for_food() {
        let (db, apple) = setup();
        let egg = Food::new("Egg", "units", 1.0).unwrap();
        db.food_dao().insert_one(&egg).unwrap();
        db.diary_dao()
            .insert(&[
                FoodDiaryEntry::for_food(&apple, 1.0, 10).unwrap(),
                FoodDiaryEntry::for_food(&egg, 1.0, 20).unwrap(),
            ])
            .unwrap();

        let entries = db.diary_dao().get_for_food(egg.id()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].food_id(), egg.id());
    }

    #[test]
    fn test_seeded_fixtures_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let foods: Vec<Food> = (0..4).map(Food::make_random_seeded).collect();
        db.food_dao().insert(&foods).unwrap();
        let entries: Vec<_> = (0..10)
            .map(|seed| FoodDiaryEntry::make_random_seeded(seed, &foods))
            .collect();
        db.diary_dao().insert(&entries).unwrap();

        let stored = db.diary_dao().get_all().unwrap();
        assert_eq!(stored.len(), entries.len());
        assert!(stored.windows(2).all(|w| w[0].time() >= w[1].time()));
    }
}

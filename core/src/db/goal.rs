use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use super::{Dao, Database, Table, invalid_column};
use crate::models::{Nutrient, NutritionGoal};

pub struct NutritionGoalDao<'db> {
    db: &'db Database,
}

impl<'db> NutritionGoalDao<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        NutritionGoalDao { db }
    }

    /// Insert or replace the goal for each nutrient.
    pub fn upsert(&self, goals: &[NutritionGoal]) -> Result<()> {
        self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO nutrition_goal (nutrient, amount) VALUES (?1, ?2)
                 ON CONFLICT(nutrient) DO UPDATE SET amount = excluded.amount",
            )?;
            for goal in goals {
                stmt.execute(params![goal.nutrient().code(), goal.amount()])?;
            }
            Ok(())
        })?;
        debug!(rows = goals.len(), "upserted nutrition goals");
        if !goals.is_empty() {
            self.db.notify(Table::NutritionGoal);
        }
        Ok(())
    }
}

impl Dao for NutritionGoalDao<'_> {
    type Entity = NutritionGoal;
    type Key = Nutrient;

    fn insert(&self, items: &[NutritionGoal]) -> Result<()> {
        self.db.transaction(|tx| {
            let mut stmt =
                tx.prepare_cached("INSERT INTO nutrition_goal (nutrient, amount) VALUES (?1, ?2)")?;
            for goal in items {
                stmt.execute(params![goal.nutrient().code(), goal.amount()])?;
            }
            Ok(())
        })?;
        debug!(rows = items.len(), "inserted nutrition goals");
        if !items.is_empty() {
            self.db.notify(Table::NutritionGoal);
        }
        Ok(())
    }

    fn update(&self, items: &[NutritionGoal]) -> Result<usize> {
        let changed = self.db.transaction(|tx| {
            let mut stmt =
                tx.prepare_cached("UPDATE nutrition_goal SET amount = ?2 WHERE nutrient = ?1")?;
            let mut changed = 0;
            for goal in items {
                changed += stmt.execute(params![goal.nutrient().code(), goal.amount()])?;
            }
            Ok(changed)
        })?;
        debug!(rows = changed, "updated nutrition goals");
        if changed > 0 {
            self.db.notify(Table::NutritionGoal);
        }
        Ok(changed)
    }

    fn delete(&self, items: &[NutritionGoal]) -> Result<usize> {
        let removed = self.db.transaction(|tx| {
            let mut stmt = tx.prepare_cached("DELETE FROM nutrition_goal WHERE nutrient = ?1")?;
            let mut removed = 0;
            for goal in items {
                removed += stmt.execute(params![goal.nutrient().code()])?;
            }
            Ok(removed)
        })?;
        debug!(rows = removed, "deleted nutrition goals");
        if removed > 0 {
            self.db.notify(Table::NutritionGoal);
        }
        Ok(removed)
    }

    fn get(&self, nutrient: Nutrient) -> Result<Option<NutritionGoal>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare_cached("SELECT nutrient, amount FROM nutrition_goal WHERE nutrient = ?1")?;
        let goal = stmt
            .query_row(params![nutrient.code()], goal_from_row)
            .optional()?;
        Ok(goal)
    }

    fn get_all(&self) -> Result<Vec<NutritionGoal>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare_cached("SELECT nutrient, amount FROM nutrition_goal ORDER BY nutrient DESC")?;
        let goals = stmt
            .query_map([], goal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }
}

fn goal_from_row(row: &Row) -> rusqlite::Result<NutritionGoal> {
    let nutrient = Nutrient::from_code(row.get(0)?).map_err(|e| invalid_column(0, Type::Integer, e))?;
    NutritionGoal::new(nutrient, row.get(1)?).map_err(|e| invalid_column(1, Type::Integer, e))
}

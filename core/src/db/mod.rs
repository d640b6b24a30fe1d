mod dao;
mod diary;
mod food;
mod goal;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use tokio::sync::broadcast;
use tracing::{debug, info};

pub use dao::Dao;
pub use diary::FoodDiaryEntryDao;
pub use food::FoodDao;
pub use goal::NutritionGoalDao;

const SCHEMA_VERSION: i64 = 1;
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A table whose contents changed. Sent on [`Database::subscribe`] after
/// every committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Food,
    DiaryFood,
    NutritionGoal,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Food, Table::DiaryFood, Table::NutritionGoal];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Table::Food => "food",
            Table::DiaryFood => "diary_food",
            Table::NutritionGoal => "nutrition_goal",
        }
    }
}

/// Owns the SQLite connection and the table-change channel.
///
/// Built once by the caller and shared as `Arc<Database>`; the DAOs are cheap
/// borrowed views over it.
pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Table>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Self::from_connection(conn)?;
        info!(path = %path.display(), "opened database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;
        migrate(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Database {
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Close the connection, reporting any error SQLite raises on the way out.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")?;
        debug!("closed database");
        Ok(())
    }

    #[must_use]
    pub fn food_dao(&self) -> FoodDao<'_> {
        FoodDao::new(self)
    }

    #[must_use]
    pub fn diary_dao(&self) -> FoodDiaryEntryDao<'_> {
        FoodDiaryEntryDao::new(self)
    }

    #[must_use]
    pub fn goal_dao(&self) -> NutritionGoalDao<'_> {
        NutritionGoalDao::new(self)
    }

    /// Receive a [`Table`] event for every committed write.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.changes.subscribe()
    }

    pub fn clear_all_tables(&self) -> Result<()> {
        self.transaction(|tx| {
            tx.execute_batch(
                "DELETE FROM diary_food;
                 DELETE FROM food;
                 DELETE FROM nutrition_goal;",
            )?;
            Ok(())
        })
        .context("Failed to clear tables")?;
        info!("cleared all tables");
        for table in Table::ALL {
            self.notify(table);
        }
        Ok(())
    }

    // A panic while holding the lock leaves SQLite consistent; the open
    // transaction is rolled back when its guard drops.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` in one transaction; rolled back if `f` fails.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub(crate) fn notify(&self, table: Table) {
        debug!(table = table.name(), "table changed");
        // No receivers is fine; nobody is watching yet.
        let _ = self.changes.send(table);
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS food (
                id INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                serving_size REAL NOT NULL,
                serving_unit TEXT NOT NULL,
                nutrition_calories INTEGER NOT NULL DEFAULT 0,
                nutrition_fat_calories INTEGER NOT NULL DEFAULT 0,
                nutrition_total_fat INTEGER NOT NULL DEFAULT 0,
                nutrition_saturated_fat INTEGER NOT NULL DEFAULT 0,
                nutrition_trans_fat INTEGER NOT NULL DEFAULT 0,
                nutrition_cholesterol INTEGER NOT NULL DEFAULT 0,
                nutrition_sodium INTEGER NOT NULL DEFAULT 0,
                nutrition_total_carbs INTEGER NOT NULL DEFAULT 0,
                nutrition_dietary_fiber INTEGER NOT NULL DEFAULT 0,
                nutrition_total_sugars INTEGER NOT NULL DEFAULT 0,
                nutrition_added_sugars INTEGER NOT NULL DEFAULT 0,
                nutrition_protein INTEGER NOT NULL DEFAULT 0,
                nutrition_vitamin_d INTEGER NOT NULL DEFAULT 0,
                nutrition_calcium INTEGER NOT NULL DEFAULT 0,
                nutrition_iron INTEGER NOT NULL DEFAULT 0,
                nutrition_potassium INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS diary_food (
                id INTEGER PRIMARY KEY NOT NULL,
                food_id INTEGER NOT NULL REFERENCES food(id) ON DELETE CASCADE,
                num_servings REAL NOT NULL,
                time INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_diary_food_food_id ON diary_food(food_id);
            CREATE INDEX IF NOT EXISTS idx_diary_food_time ON diary_food(time);

            CREATE TABLE IF NOT EXISTS nutrition_goal (
                nutrient INTEGER PRIMARY KEY NOT NULL,
                amount INTEGER NOT NULL
            );

            PRAGMA user_version = 1;",
        )
        .context("Failed to create schema")?;
        info!(from = version, to = SCHEMA_VERSION, "migrated database schema");
    }

    Ok(())
}

/// Escape `\`, `%` and `_` for use with `LIKE ... ESCAPE '\'`.
pub(crate) fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Surface an entity validation failure from inside a row mapper.
pub(crate) fn invalid_column(
    idx: usize,
    ty: rusqlite::types::Type,
    err: crate::error::ValidationError,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

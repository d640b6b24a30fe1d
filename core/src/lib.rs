pub mod db;
pub mod error;
pub mod executor;
pub mod live;
pub mod models;
pub mod view_model;

pub use db::{Dao, Database, Table};
pub use error::ValidationError;
pub use executor::{DEFAULT_POOL_SIZE, Pending, WorkerPool};
pub use live::Live;
pub use models::{Food, FoodDiaryEntry, Meal, Nutrient, NutritionGoal, NutritionInfo};
pub use view_model::FitnessViewModel;

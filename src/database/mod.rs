//! PostgreSQL implementations of the store traits.

pub mod manager;
pub mod models;
pub mod nutrition;
pub mod recipes;
pub mod usage;
pub mod users;

pub use manager::{DatabaseError, DatabaseManager};
pub use nutrition::PgNutritionStore;
pub use recipes::PgRecipeStore;
pub use usage::PgUsageCounters;
pub use users::PgUserDirectory;

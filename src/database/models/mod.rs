pub mod nutrition;
pub mod recipe;
pub mod user;

pub use nutrition::{NutritionEntry, NutritionInput};
pub use recipe::{NewRecipe, Recipe};
pub use user::{NewUser, SubscriptionStatus, TierChange, UserRecord};

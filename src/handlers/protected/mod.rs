// Protected handlers: a valid session is required. Routes that also need a
// feature are wrapped by the gate in `server.rs`.
pub mod account;
pub mod nutrition;
pub mod recipes;
pub mod shopping_list;

/// Flags and resources the routes are gated on.
pub mod features {
    pub const UPLOAD_RECIPES: &str = "upload_recipes";
    pub const PRIVATE_RECIPES: &str = "private_recipes";
    pub const SHOPPING_LIST_GENERATION: &str = "shopping_list_generation";
    pub const NUTRITION_TRACKING: &str = "nutrition_tracking";
    pub const NUTRITION_ANALYSIS: &str = "nutrition_analysis";
    pub const HISTORY_DAYS: &str = "history_days";
}

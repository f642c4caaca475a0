// Public handlers: no session required.
pub mod billing;
pub mod root;
pub mod tiers;

pub mod catalog;
pub mod token;
pub mod usage;
pub mod user;

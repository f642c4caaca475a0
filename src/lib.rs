pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod entitlements;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod services;
pub mod state;
pub mod store;

pub use server::app;
pub use state::AppState;

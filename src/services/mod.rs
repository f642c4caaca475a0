pub mod accounts;
pub mod billing;

pub use accounts::{AccountError, AccountService, SAVED_RECIPES};
pub use billing::{BillingError, BillingOutcome, BillingService, WebhookEvent};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub billing: BillingConfig,
    pub entitlements: EntitlementsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// Taken from `DATABASE_URL`; required for the postgres backend.
    #[serde(skip_serializing)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    /// History window used when the caller does not ask for one.
    pub default_history_days: u32,
    /// Hard ceiling applied on top of the tier's own `history_days` limit.
    pub max_history_days: u32,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Shared secret expected in `X-Webhook-Secret`. Webhooks are refused when unset.
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    /// Billing provider price id -> tier id.
    pub price_tiers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementsConfig {
    /// Alternate catalog document; the embedded default is used when unset.
    pub catalog_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("STORAGE_BACKEND") {
            self.database.backend = parse_backend(&v).unwrap_or(self.database.backend);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // API overrides
        if let Ok(v) = env::var("HOMEGRUB_API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_DEFAULT_HISTORY_DAYS") {
            self.api.default_history_days = v.parse().unwrap_or(self.api.default_history_days);
        }
        if let Ok(v) = env::var("API_MAX_HISTORY_DAYS") {
            self.api.max_history_days = v.parse().unwrap_or(self.api.max_history_days);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Billing overrides
        if let Ok(v) = env::var("BILLING_WEBHOOK_SECRET") {
            self.billing.webhook_secret = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("BILLING_PRICE_TIERS") {
            self.billing.price_tiers = parse_price_tiers(&v);
        }

        if let Ok(v) = env::var("ENTITLEMENTS_CATALOG_PATH") {
            self.entitlements.catalog_path = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 9001,
                default_history_days: 30,
                max_history_days: 365,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "homegrub-development-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            billing: BillingConfig {
                webhook_secret: None,
                price_tiers: HashMap::new(),
            },
            entitlements: EntitlementsConfig { catalog_path: None },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 9001,
                default_history_days: 30,
                max_history_days: 365,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                enable_cors: true,
                cors_origins: vec!["https://staging.homegrub.app".to_string()],
            },
            billing: BillingConfig {
                webhook_secret: None,
                price_tiers: HashMap::new(),
            },
            entitlements: EntitlementsConfig { catalog_path: None },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                run_migrations: false,
            },
            api: ApiConfig {
                port: 9001,
                default_history_days: 30,
                max_history_days: 365,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                enable_cors: true,
                cors_origins: vec!["https://homegrub.app".to_string()],
            },
            billing: BillingConfig {
                webhook_secret: None,
                price_tiers: HashMap::new(),
            },
            entitlements: EntitlementsConfig { catalog_path: None },
        }
    }

    /// Preset used by tests and the in-process test server.
    pub fn for_tests() -> Self {
        let mut config = Self::development();
        config.security.jwt_secret = "homegrub-test-secret".to_string();
        config.billing.webhook_secret = Some("whsec_test".to_string());
        config
    }
}

fn parse_backend(raw: &str) -> Option<StorageBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Some(StorageBackend::Postgres),
        "memory" | "mem" => Some(StorageBackend::Memory),
        _ => None,
    }
}

/// Parses `price_a=home,price_b=family`. Malformed pairs are skipped.
pub fn parse_price_tiers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (price, tier) = pair.split_once('=')?;
            let (price, tier) = (price.trim(), tier.trim());
            if price.is_empty() || tier.is_empty() {
                return None;
            }
            Some((price.to_string(), tier.to_ascii_lowercase()))
        })
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

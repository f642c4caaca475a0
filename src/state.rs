use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, StorageBackend};
use crate::database::{
    DatabaseError, DatabaseManager, PgNutritionStore, PgRecipeStore, PgUsageCounters, PgUserDirectory,
};
use crate::entitlements::{
    CatalogError, EntitlementResolver, MemoryUsageCounters, TierCatalog, UsageCounters,
};
use crate::middleware::RequestGate;
use crate::services::{AccountService, BillingService};
use crate::store::memory::{MemoryNutritionStore, MemoryRecipeStore, MemoryUserDirectory};
use crate::store::{NutritionStore, RecipeStore, UserDirectory};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to load entitlement catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Database startup failed: {0}")]
    Database(#[from] DatabaseError),
}

/// The four persistence seams, chosen once at startup.
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub usage: Arc<dyn UsageCounters>,
    pub recipes: Arc<dyn RecipeStore>,
    pub nutrition: Arc<dyn NutritionStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserDirectory::new()),
            usage: Arc::new(MemoryUsageCounters::new()),
            recipes: Arc::new(MemoryRecipeStore::new()),
            nutrition: Arc::new(MemoryNutritionStore::new()),
        }
    }

    pub fn postgres(database: &DatabaseManager) -> Self {
        let pool = database.pool().clone();
        Self {
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            usage: Arc::new(PgUsageCounters::new(pool.clone())),
            recipes: Arc::new(PgRecipeStore::new(pool.clone())),
            nutrition: Arc::new(PgNutritionStore::new(pool)),
        }
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<TierCatalog>,
    pub resolver: Arc<EntitlementResolver>,
    pub gate: RequestGate,
    pub accounts: AccountService,
    pub billing: BillingService,
    pub recipes: Arc<dyn RecipeStore>,
    pub nutrition: Arc<dyn NutritionStore>,
    pub database: Option<DatabaseManager>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        catalog: TierCatalog,
        stores: Stores,
        database: Option<DatabaseManager>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let resolver = Arc::new(EntitlementResolver::new(
            catalog.clone(),
            stores.users.clone(),
            stores.usage.clone(),
        ));
        let accounts = AccountService::new(
            catalog.clone(),
            stores.users,
            stores.usage,
            stores.recipes.clone(),
        );
        let billing = BillingService::new(
            accounts.clone(),
            &config.billing.price_tiers,
            config.billing.webhook_secret.as_deref(),
        );

        Self {
            config: Arc::new(config),
            catalog,
            gate: RequestGate::new(resolver.clone()),
            resolver,
            accounts,
            billing,
            recipes: stores.recipes,
            nutrition: stores.nutrition,
            database,
        }
    }

    /// Load the catalog and open whichever storage backend `config` selects.
    pub async fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        let catalog = TierCatalog::load(config.entitlements.catalog_path.as_deref())?;
        tracing::info!(
            version = catalog.version(),
            tiers = catalog.tiers().len(),
            "entitlement catalog loaded"
        );

        match config.database.backend {
            StorageBackend::Postgres => {
                let database = DatabaseManager::connect(&config.database).await?;
                let stores = Stores::postgres(&database);
                Ok(Self::new(config, catalog, stores, Some(database)))
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage; all data is lost on shutdown");
                Ok(Self::new(config, catalog, Stores::in_memory(), None))
            }
        }
    }

    /// Memory-backed state with the built-in catalog.
    pub fn in_memory(config: AppConfig) -> Result<Self, StartupError> {
        let catalog = TierCatalog::load(config.entitlements.catalog_path.as_deref())?;
        Ok(Self::new(config, catalog, Stores::in_memory(), None))
    }
}

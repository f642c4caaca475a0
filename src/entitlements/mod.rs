//! Tier catalog, usage counters and the resolver that combines them.

pub mod catalog;
pub mod resolver;
pub mod usage;

pub use catalog::{
    CatalogError, FeatureFlag, Limit, ResourceKind, Tier, TierCatalog, TierId, UnknownTierError,
};
pub use resolver::{
    Access, Admission, Denial, DenialReason, EntitlementError, EntitlementResolver,
    EntitlementSummary, Reservation, ResourceUsage,
};
pub use usage::{MemoryUsageCounters, UsageCounters};

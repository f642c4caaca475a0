use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catalog compiled into the binary; used when no override path is configured.
const BUILTIN_CATALOG: &str = include_str!("default_catalog.yaml");

/// Subscription tier identifier. Case-insensitive, stored lowercase so that
/// legacy values such as `"Free"` and `"free"` name the same tier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TierId(String);

impl TierId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TierId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for TierId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<TierId> for String {
    fn from(id: TierId) -> Self {
        id.0
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named capability that routes are gated on. Matched exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlag(String);

impl FeatureFlag {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FeatureFlag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Countable resource a quota applies to (e.g. `saved_recipes`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKind {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric ceiling for a resource on a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Max(u64),
}

impl Limit {
    /// Whether one more unit fits on top of `current`.
    pub fn permits(&self, current: u64) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Max(max) => current < *max,
        }
    }

    pub fn as_max(&self) -> Option<u64> {
        match self {
            Limit::Unlimited => None,
            Limit::Max(max) => Some(*max),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Unlimited => serializer.serialize_str("unlimited"),
            Limit::Max(max) => serializer.serialize_u64(*max),
        }
    }
}

/// A fully resolved tier: inherited features and limits already folded in.
#[derive(Debug, Clone, Serialize)]
pub struct Tier {
    pub id: TierId,
    pub rank: u32,
    pub display_name: String,
    pub features: BTreeSet<FeatureFlag>,
    pub limits: BTreeMap<ResourceKind, Limit>,
}

impl Tier {
    pub fn has_feature(&self, feature: &FeatureFlag) -> bool {
        self.features.contains(feature)
    }

    pub fn limit_for(&self, resource: &ResourceKind) -> Limit {
        self.limits.get(resource).copied().unwrap_or(Limit::Unlimited)
    }
}

/// A user references a tier the catalog does not define. Configuration fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tier '{tier}' is not defined in entitlement catalog {catalog_version}")]
pub struct UnknownTierError {
    pub tier: String,
    pub catalog_version: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Catalog defines no tiers")]
    Empty,

    #[error("Tier '{0}' is defined more than once")]
    DuplicateTier(String),

    #[error("Tier '{tier}' inherits from undefined tier '{parent}'")]
    UnknownParent { tier: String, parent: String },

    #[error("Tier inheritance cycle: {0}")]
    InheritanceCycle(String),

    #[error("Default tier '{0}' is not defined")]
    UnknownDefaultTier(String),

    #[error("Quota on feature '{0}' which no tier grants")]
    QuotaForUnknownFeature(String),

    #[error("Tier '{tier}' has invalid limit '{value}' for '{resource}'")]
    InvalidLimit {
        tier: String,
        resource: String,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    version: String,
    default_tier: String,
    tiers: BTreeMap<String, RawTier>,
    #[serde(default)]
    quotas: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTier {
    rank: u32,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    inherits: Option<String>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    limits: BTreeMap<String, RawLimit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Count(u64),
    Keyword(String),
}

/// Immutable tier → features/limits table. Built once at startup and shared
/// behind an `Arc`; nothing mutates it while requests are being served.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    version: String,
    default_tier: TierId,
    tiers: BTreeMap<TierId, Tier>,
    quotas: BTreeMap<FeatureFlag, ResourceKind>,
    known_features: BTreeSet<FeatureFlag>,
}

impl TierCatalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Load from `path` when given, otherwise fall back to the builtin catalog.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_yaml::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawCatalog) -> Result<Self, CatalogError> {
        if raw.tiers.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut raw_tiers: BTreeMap<TierId, RawTier> = BTreeMap::new();
        for (name, tier) in raw.tiers {
            let id = TierId::new(&name);
            if raw_tiers.insert(id, tier).is_some() {
                return Err(CatalogError::DuplicateTier(name));
            }
        }

        let mut resolved = BTreeMap::new();
        let ids: Vec<TierId> = raw_tiers.keys().cloned().collect();
        for id in &ids {
            let mut chain = Vec::new();
            resolve_tier(id, &raw_tiers, &mut resolved, &mut chain)?;
        }

        let default_tier = TierId::new(&raw.default_tier);
        if !resolved.contains_key(&default_tier) {
            return Err(CatalogError::UnknownDefaultTier(raw.default_tier));
        }

        let known_features: BTreeSet<FeatureFlag> = resolved
            .values()
            .flat_map(|tier: &Tier| tier.features.iter().cloned())
            .collect();

        let mut quotas = BTreeMap::new();
        for (feature, resource) in raw.quotas {
            let feature = FeatureFlag::new(&feature);
            if !known_features.contains(&feature) {
                return Err(CatalogError::QuotaForUnknownFeature(feature.to_string()));
            }
            quotas.insert(feature, ResourceKind::new(&resource));
        }

        Ok(Self {
            version: raw.version,
            default_tier,
            tiers: resolved,
            quotas,
            known_features,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Tier assigned to new accounts and to cancelled subscriptions.
    pub fn default_tier(&self) -> &TierId {
        &self.default_tier
    }

    pub fn tier(&self, id: &TierId) -> Result<&Tier, UnknownTierError> {
        self.tiers.get(id).ok_or_else(|| UnknownTierError {
            tier: id.to_string(),
            catalog_version: self.version.clone(),
        })
    }

    pub fn contains(&self, id: &TierId) -> bool {
        self.tiers.contains_key(id)
    }

    pub fn features_for(&self, id: &TierId) -> Result<&BTreeSet<FeatureFlag>, UnknownTierError> {
        Ok(&self.tier(id)?.features)
    }

    pub fn limit_for(&self, id: &TierId, resource: &ResourceKind) -> Result<Limit, UnknownTierError> {
        Ok(self.tier(id)?.limit_for(resource))
    }

    /// Resource counted against when `feature` is exercised, if it is count-limited.
    pub fn quota_for(&self, feature: &FeatureFlag) -> Option<&ResourceKind> {
        self.quotas.get(feature)
    }

    /// Every resource some feature is counted against.
    pub fn counted_resources(&self) -> BTreeSet<&ResourceKind> {
        self.quotas.values().collect()
    }

    /// Whether any tier grants `feature`.
    pub fn is_known(&self, feature: &FeatureFlag) -> bool {
        self.known_features.contains(feature)
    }

    /// Cheapest tier granting `feature`; ties on rank break by identifier.
    pub fn minimum_tier_for(&self, feature: &FeatureFlag) -> Option<&TierId> {
        self.tiers()
            .into_iter()
            .find(|tier| tier.has_feature(feature))
            .map(|tier| &tier.id)
    }

    /// Cheapest tier that grants `feature` and has room for one more
    /// `resource` on top of `current`.
    pub fn minimum_tier_with_room(
        &self,
        feature: &FeatureFlag,
        resource: &ResourceKind,
        current: u64,
    ) -> Option<&TierId> {
        self.tiers()
            .into_iter()
            .find(|tier| tier.has_feature(feature) && tier.limit_for(resource).permits(current))
            .map(|tier| &tier.id)
    }

    /// Cheapest tier ranked strictly above `id`.
    pub fn next_tier_above(&self, id: &TierId) -> Option<&TierId> {
        let rank = self.tiers.get(id)?.rank;
        self.tiers()
            .into_iter()
            .find(|tier| tier.rank > rank)
            .map(|tier| &tier.id)
    }

    /// All tiers ordered by rank, then identifier.
    pub fn tiers(&self) -> Vec<&Tier> {
        let mut tiers: Vec<&Tier> = self.tiers.values().collect();
        tiers.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        tiers
    }
}

fn resolve_tier(
    id: &TierId,
    raw_tiers: &BTreeMap<TierId, RawTier>,
    resolved: &mut BTreeMap<TierId, Tier>,
    chain: &mut Vec<TierId>,
) -> Result<(), CatalogError> {
    if resolved.contains_key(id) {
        return Ok(());
    }
    if chain.contains(id) {
        chain.push(id.clone());
        let path: Vec<&str> = chain.iter().map(TierId::as_str).collect();
        return Err(CatalogError::InheritanceCycle(path.join(" -> ")));
    }

    // Callers only pass ids taken from `raw_tiers` or checked against it.
    let Some(raw) = raw_tiers.get(id) else {
        return Ok(());
    };

    chain.push(id.clone());
    let (mut features, mut limits) = match &raw.inherits {
        Some(parent) => {
            let parent_id = TierId::new(parent);
            if !raw_tiers.contains_key(&parent_id) {
                return Err(CatalogError::UnknownParent {
                    tier: id.to_string(),
                    parent: parent.clone(),
                });
            }
            resolve_tier(&parent_id, raw_tiers, resolved, chain)?;
            let parent = &resolved[&parent_id];
            (parent.features.clone(), parent.limits.clone())
        }
        None => (BTreeSet::new(), BTreeMap::new()),
    };
    chain.pop();

    features.extend(raw.features.iter().map(FeatureFlag::new));
    for (resource, value) in &raw.limits {
        let limit = match value {
            RawLimit::Count(max) => Limit::Max(*max),
            RawLimit::Keyword(word) if word.eq_ignore_ascii_case("unlimited") => Limit::Unlimited,
            RawLimit::Keyword(word) => {
                return Err(CatalogError::InvalidLimit {
                    tier: id.to_string(),
                    resource: resource.clone(),
                    value: word.clone(),
                })
            }
        };
        limits.insert(ResourceKind::new(resource), limit);
    }

    let display_name = raw.display_name.clone().unwrap_or_else(|| id.to_string());
    resolved.insert(
        id.clone(),
        Tier {
            id: id.clone(),
            rank: raw.rank,
            display_name,
            features,
            limits,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> TierCatalog {
        TierCatalog::builtin().expect("builtin catalog parses")
    }

    #[test]
    fn builtin_catalog_defines_all_tiers() {
        let catalog = builtin();
        let ids: Vec<&str> = catalog.tiers().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["free", "home", "student", "family", "pro"]);
        assert_eq!(catalog.default_tier().as_str(), "free");
    }

    #[test]
    fn features_are_cumulative_along_inheritance() {
        let catalog = builtin();
        let free = catalog.features_for(&"free".into()).unwrap();
        let home = catalog.features_for(&"home".into()).unwrap();
        let pro = catalog.features_for(&"pro".into()).unwrap();

        assert!(free.is_subset(home));
        assert!(home.is_subset(pro));
        assert!(!free.contains(&"private_recipes".into()));
        assert!(home.contains(&"private_recipes".into()));
        assert!(pro.contains(&"upload_recipes".into()));
    }

    #[test]
    fn student_matches_home_features() {
        let catalog = builtin();
        assert_eq!(
            catalog.features_for(&"student".into()).unwrap(),
            catalog.features_for(&"home".into()).unwrap()
        );
    }

    #[test]
    fn tier_ids_are_case_insensitive() {
        let catalog = builtin();
        assert!(catalog.contains(&TierId::new("Home")));
        assert_eq!(TierId::new(" PRO "), TierId::new("pro"));
    }

    #[test]
    fn limits_inherit_and_override() {
        let catalog = builtin();
        let recipes = ResourceKind::new("saved_recipes");
        let members = ResourceKind::new("family_members");

        assert_eq!(catalog.limit_for(&"free".into(), &recipes).unwrap(), Limit::Max(10));
        assert_eq!(catalog.limit_for(&"home".into(), &recipes).unwrap(), Limit::Unlimited);
        assert_eq!(catalog.limit_for(&"pro".into(), &members).unwrap(), Limit::Max(5));
        assert_eq!(catalog.limit_for(&"free".into(), &members).unwrap(), Limit::Unlimited);
    }

    #[test]
    fn unknown_tier_is_an_error() {
        let catalog = builtin();
        let err = catalog.features_for(&"platinum".into()).unwrap_err();
        assert_eq!(err.tier, "platinum");
        assert!(catalog.limit_for(&"platinum".into(), &"saved_recipes".into()).is_err());
    }

    #[test]
    fn lookups_are_stable_across_calls() {
        let catalog = builtin();
        for tier in catalog.tiers() {
            let first = catalog.features_for(&tier.id).unwrap().clone();
            let second = catalog.features_for(&tier.id).unwrap().clone();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn minimum_tier_prefers_lowest_rank() {
        let catalog = builtin();
        assert_eq!(catalog.minimum_tier_for(&"upload_recipes".into()).unwrap().as_str(), "free");
        assert_eq!(catalog.minimum_tier_for(&"private_recipes".into()).unwrap().as_str(), "home");
        assert_eq!(catalog.minimum_tier_for(&"barcode_scanning".into()).unwrap().as_str(), "pro");
        assert!(catalog.minimum_tier_for(&"upload_recipez".into()).is_none());
    }

    #[test]
    fn room_for_one_more_skips_capped_tiers() {
        let catalog = builtin();
        let upload = FeatureFlag::new("upload_recipes");
        let recipes = ResourceKind::new("saved_recipes");

        assert_eq!(catalog.minimum_tier_with_room(&upload, &recipes, 3).unwrap().as_str(), "free");
        assert_eq!(catalog.minimum_tier_with_room(&upload, &recipes, 10).unwrap().as_str(), "home");
        assert!(catalog.minimum_tier_with_room(&"upload_recipez".into(), &recipes, 0).is_none());
    }

    #[test]
    fn next_tier_above_follows_rank() {
        let catalog = builtin();
        assert_eq!(catalog.next_tier_above(&"free".into()).unwrap().as_str(), "home");
        assert_eq!(catalog.next_tier_above(&"family".into()).unwrap().as_str(), "pro");
        assert!(catalog.next_tier_above(&"pro".into()).is_none());
        assert!(catalog.next_tier_above(&"platinum".into()).is_none());
    }

    #[test]
    fn quota_mapping_is_loaded() {
        let catalog = builtin();
        assert_eq!(catalog.quota_for(&"upload_recipes".into()).unwrap().as_str(), "saved_recipes");
        assert!(catalog.quota_for(&"search".into()).is_none());
    }

    #[test]
    fn rejects_inheritance_cycle() {
        let yaml = r#"
version: "t"
default_tier: a
tiers:
  a: { rank: 0, inherits: b }
  b: { rank: 1, inherits: a }
"#;
        let err = TierCatalog::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::InheritanceCycle(_)), "{err}");
    }

    #[test]
    fn rejects_unknown_parent_and_default() {
        let yaml = r#"
version: "t"
default_tier: a
tiers:
  a: { rank: 0, inherits: ghost }
"#;
        assert!(matches!(
            TierCatalog::from_yaml_str(yaml).unwrap_err(),
            CatalogError::UnknownParent { .. }
        ));

        let yaml = r#"
version: "t"
default_tier: ghost
tiers:
  a: { rank: 0 }
"#;
        assert!(matches!(
            TierCatalog::from_yaml_str(yaml).unwrap_err(),
            CatalogError::UnknownDefaultTier(_)
        ));
    }

    #[test]
    fn rejects_quota_on_ungranted_feature() {
        let yaml = r#"
version: "t"
default_tier: a
tiers:
  a: { rank: 0, features: [search] }
quotas:
  upload_recipes: saved_recipes
"#;
        assert!(matches!(
            TierCatalog::from_yaml_str(yaml).unwrap_err(),
            CatalogError::QuotaForUnknownFeature(_)
        ));
    }

    #[test]
    fn rejects_bad_limit_keyword() {
        let yaml = r#"
version: "t"
default_tier: a
tiers:
  a:
    rank: 0
    limits:
      saved_recipes: lots
"#;
        assert!(matches!(
            TierCatalog::from_yaml_str(yaml).unwrap_err(),
            CatalogError::InvalidLimit { .. }
        ));
    }

    #[test]
    fn rejects_duplicate_tiers_differing_in_case() {
        let yaml = r#"
version: "t"
default_tier: free
tiers:
  free: { rank: 0 }
  Free: { rank: 0 }
"#;
        assert!(matches!(
            TierCatalog::from_yaml_str(yaml).unwrap_err(),
            CatalogError::DuplicateTier(_)
        ));
    }

    #[test]
    fn limit_permits_below_max_only() {
        assert!(Limit::Max(5).permits(4));
        assert!(!Limit::Max(5).permits(5));
        assert!(!Limit::Max(0).permits(0));
        assert!(Limit::Unlimited.permits(u64::MAX));
    }
}

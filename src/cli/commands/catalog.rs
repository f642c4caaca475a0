use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::entitlements::{FeatureFlag, Limit, TierCatalog, TierId};

#[derive(Subcommand)]
pub enum CatalogCommands {
    #[command(about = "List tiers with their features and limits")]
    Show,

    #[command(about = "Does a tier grant a feature?")]
    Check {
        #[arg(help = "Tier id")]
        tier: String,
        #[arg(help = "Feature flag")]
        feature: String,
    },

    #[command(about = "Validate a catalog document without loading it into the server")]
    Validate {
        #[arg(help = "Path to catalog YAML")]
        path: PathBuf,
    },
}

pub fn handle(cmd: CatalogCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        CatalogCommands::Show => {
            let catalog = TierCatalog::load(config.entitlements.catalog_path.as_deref())?;
            match output_format {
                OutputFormat::Json => print_json(&json!({
                    "version": catalog.version(),
                    "default_tier": catalog.default_tier(),
                    "tiers": catalog.tiers(),
                })),
                OutputFormat::Text => {
                    println!("Catalog {} (default tier: {})", catalog.version(), catalog.default_tier());
                    for tier in catalog.tiers() {
                        println!();
                        println!("{} [rank {}] {}", tier.id, tier.rank, tier.display_name);
                        for (resource, limit) in &tier.limits {
                            println!("  limit {:<16} {}", resource.as_str(), describe_limit(limit));
                        }
                        let features: Vec<&str> = tier.features.iter().map(FeatureFlag::as_str).collect();
                        println!("  features: {}", features.join(", "));
                    }
                    Ok(())
                }
            }
        }
        CatalogCommands::Check { tier, feature } => {
            let catalog = TierCatalog::load(config.entitlements.catalog_path.as_deref())?;
            let tier = catalog.tier(&TierId::new(&tier))?;
            let feature = FeatureFlag::new(&feature);
            let granted = tier.has_feature(&feature);
            let cheapest = catalog.minimum_tier_for(&feature);

            match output_format {
                OutputFormat::Json => print_json(&json!({
                    "tier": tier.id,
                    "feature": feature,
                    "granted": granted,
                    "known": catalog.is_known(&feature),
                    "minimum_tier": cheapest,
                })),
                OutputFormat::Text => {
                    match (granted, cheapest) {
                        (true, _) => println!("{} grants {}", tier.id, feature),
                        (false, Some(min)) => println!("{} does not grant {} (needs {} or higher)", tier.id, feature, min),
                        (false, None) => println!("{} is not granted by any tier", feature),
                    }
                    Ok(())
                }
            }
        }
        CatalogCommands::Validate { path } => {
            let catalog = TierCatalog::from_path(&path)?;
            output_success(
                output_format,
                &format!("{} is valid: version {}, {} tiers", path.display(), catalog.version(), catalog.tiers().len()),
                Some(json!({ "version": catalog.version(), "tiers": catalog.tiers().len() })),
            )
        }
    }
}

fn describe_limit(limit: &Limit) -> String {
    match limit {
        Limit::Unlimited => "unlimited".to_string(),
        Limit::Max(max) => max.to_string(),
    }
}

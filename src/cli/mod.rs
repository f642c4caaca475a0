pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "homegrub")]
#[command(about = "HomeGrub admin CLI - tiers, accounts and usage counters")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Inspect and validate the entitlement catalog")]
    Catalog {
        #[command(subcommand)]
        cmd: commands::catalog::CatalogCommands,
    },

    #[command(about = "Account management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Usage counters")]
    Usage {
        #[command(subcommand)]
        cmd: commands::usage::UsageCommands,
    },

    #[command(about = "Session tokens for development")]
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = crate::config::config().clone();

    match cli.command {
        Commands::Catalog { cmd } => commands::catalog::handle(cmd, &config, output_format),
        Commands::User { cmd } => commands::user::handle(cmd, open_state(config).await?, output_format).await,
        Commands::Usage { cmd } => commands::usage::handle(cmd, open_state(config).await?, output_format).await,
        Commands::Token { cmd } => commands::token::handle(cmd, open_state(config).await?, output_format).await,
    }
}

async fn open_state(config: AppConfig) -> anyhow::Result<AppState> {
    if matches!(config.database.backend, crate::config::StorageBackend::Memory) {
        tracing::warn!("STORAGE_BACKEND=memory: changes made by this command are not persisted");
    }
    Ok(AppState::from_config(config).await?)
}

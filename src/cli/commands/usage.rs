use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum UsageCommands {
    #[command(about = "Show counted usage against limits")]
    Show {
        #[arg(help = "User id")]
        id: String,
    },

    #[command(about = "Recompute counters from stored rows")]
    Reconcile {
        #[arg(help = "User id")]
        id: String,
    },
}

pub async fn handle(cmd: UsageCommands, state: AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UsageCommands::Show { id } => {
            let id = parse_user_id(&id)?;
            let summary = state.resolver.summary(id).await?;
            let counted: Vec<_> = summary.resources.iter().filter(|r| r.used.is_some()).collect();

            match output_format {
                OutputFormat::Json => print_json(&json!({ "user": id, "tier": summary.tier, "usage": counted })),
                OutputFormat::Text => {
                    println!("{} on {}", id, summary.tier);
                    for row in counted {
                        let limit = row.limit.as_max().map(|m| m.to_string()).unwrap_or_else(|| "unlimited".into());
                        println!("  {:<16} {} / {}", row.resource.as_str(), row.used.unwrap_or(0), limit);
                    }
                    Ok(())
                }
            }
        }
        UsageCommands::Reconcile { id } => {
            let id = parse_user_id(&id)?;
            let (before, after) = state.accounts.reconcile_usage(id).await?;
            let message = if before == after {
                format!("Counters for {} already match ({})", id, after)
            } else {
                format!("Counters for {} reset from {} to {}", id, before, after)
            };
            output_success(output_format, &message, Some(json!({ "before": before, "after": after })))
        }
    }
}

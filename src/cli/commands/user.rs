use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::TierChange;
use crate::entitlements::TierId;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an account on the default tier")]
    Create {
        #[arg(help = "Email address")]
        email: String,
        #[arg(long, help = "Display name")]
        name: Option<String>,
    },

    #[command(about = "Show an account with its entitlements")]
    Show {
        #[arg(help = "User id")]
        id: String,
    },

    #[command(about = "List all accounts")]
    List,

    #[command(about = "Assign a tier manually")]
    SetTier {
        #[arg(help = "User id")]
        id: String,
        #[arg(help = "Tier id")]
        tier: String,
    },
}

pub async fn handle(cmd: UserCommands, state: AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create { email, name } => {
            let user = state.accounts.sign_up(&email, name).await?;
            output_success(
                output_format,
                &format!("Created {} ({}) on tier {}", user.email, user.id, user.tier),
                Some(json!({ "user": user })),
            )
        }
        UserCommands::Show { id } => {
            let id = parse_user_id(&id)?;
            let user = state.accounts.find(id).await?;
            let summary = state.resolver.summary(id).await?;

            match output_format {
                OutputFormat::Json => print_json(&json!({ "user": user, "entitlements": summary })),
                OutputFormat::Text => {
                    println!("{} <{}>", user.id, user.email);
                    println!("tier:         {} ({})", summary.tier, summary.tier_name);
                    println!("subscription: {}", user.subscription_status);
                    for row in &summary.resources {
                        let used = row.used.map(|u| u.to_string()).unwrap_or_else(|| "-".into());
                        let limit = row.limit.as_max().map(|m| m.to_string()).unwrap_or_else(|| "unlimited".into());
                        println!("  {:<16} {} / {}", row.resource.as_str(), used, limit);
                    }
                    Ok(())
                }
            }
        }
        UserCommands::List => {
            let users = state.accounts.list().await?;
            if users.is_empty() {
                return output_empty_collection(output_format, "users", "No accounts");
            }

            match output_format {
                OutputFormat::Json => print_json(&json!({ "users": users })),
                OutputFormat::Text => {
                    println!("{:<38} {:<10} {:<10} {}", "ID", "TIER", "STATUS", "EMAIL");
                    println!("{}", "-".repeat(90));
                    for user in &users {
                        println!(
                            "{:<38} {:<10} {:<10} {}",
                            user.id, user.tier.as_str(), user.subscription_status.as_str(), user.email
                        );
                    }
                    Ok(())
                }
            }
        }
        UserCommands::SetTier { id, tier } => {
            let id = parse_user_id(&id)?;
            let user = state
                .accounts
                .change_tier(id, TierChange::manual(TierId::new(&tier)))
                .await?;
            output_success(
                output_format,
                &format!("{} is now on tier {}", user.email, user.tier),
                Some(json!({ "user": user })),
            )
        }
    }
}

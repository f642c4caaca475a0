use clap::Subcommand;
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Issue a session token for an existing user")]
    Issue {
        #[arg(help = "User id")]
        id: String,
        #[arg(long, help = "Lifetime in hours (defaults to SECURITY_JWT_EXPIRY_HOURS)")]
        hours: Option<u64>,
    },
}

pub async fn handle(cmd: TokenCommands, state: AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Issue { id, hours } => {
            let id = parse_user_id(&id)?;
            let user = state.accounts.find(id).await?;
            let security = &state.config.security;

            let hours = hours.unwrap_or(security.jwt_expiry_hours);
            let token = generate_jwt(&Claims::new(user.id, &user.email, hours), &security.jwt_secret)?;

            match output_format {
                OutputFormat::Json => print_json(&json!({ "user": user.id, "token": token, "expires_in_hours": hours })),
                OutputFormat::Text => {
                    println!("{}", token);
                    Ok(())
                }
            }
        }
    }
}

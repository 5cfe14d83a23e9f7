use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{OutputFormat, Runtime};
use crate::types::{ChangePassword, Credentials, RegisterData};

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login to the tenant")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
        #[arg(long, help = "Keep the session across restarts")]
        remember: bool,
    },

    #[command(about = "Logout")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Refresh authentication token")]
    Refresh,

    #[command(about = "Show current user information")]
    Whoami,

    #[command(about = "Register new user")]
    Register {
        #[arg(help = "Display name")]
        name: String,
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Change the current user's password")]
    ChangePassword {
        #[arg(long, help = "Current password")]
        current: String,
        #[arg(long, help = "New password")]
        new: String,
    },
}

pub async fn handle(cmd: AuthCommands, runtime: &Runtime, output_format: OutputFormat) -> anyhow::Result<()> {
    // Auth always runs in a tenant context.
    runtime.ctx.tenant().resolve_tenant(&runtime.location).await;
    let session = runtime.ctx.session();

    match cmd {
        AuthCommands::Login { email, password, remember } => {
            let credentials = Credentials {
                email,
                password: read_password(password)?,
                remember,
            };
            session.login(&credentials).await?;
            let user = session.session().user;
            output_success(&output_format, "Logged in", Some(json!({ "user": user })))
        }
        AuthCommands::Logout => {
            session.logout().await;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            let state = session.session();
            match (&state.user, state.is_authenticated()) {
                (Some(user), true) => {
                    output_current_item(&output_format, "user", &user.email, json!({ "name": user.name, "role": user.role }))
                }
                _ if state.token.is_some() => output_success(
                    &output_format,
                    "Token present, user not loaded (run `auth whoami`)",
                    Some(json!({ "authenticated": false })),
                ),
                _ => output_no_current_item(&output_format, "user"),
            }
        }
        AuthCommands::Refresh => {
            session.refresh_token().await?;
            output_success(&output_format, "Token refreshed", None)
        }
        AuthCommands::Whoami => {
            let user = session.get_user().await?;
            let details = serde_json::to_value(&user)?;
            output_current_item(&output_format, "user", &user.email, details)
        }
        AuthCommands::Register { name, email, password } => {
            let password = read_password(password)?;
            let data = RegisterData {
                name,
                email,
                password_confirmation: password.clone(),
                password,
            };
            session.register(&data).await?;
            output_success(&output_format, "Registered and logged in", None)
        }
        AuthCommands::ChangePassword { current, new } => {
            let change = ChangePassword {
                current_password: current,
                new_password_confirmation: new.clone(),
                new_password: new,
            };
            session.change_password(&change).await?;
            output_success(&output_format, "Password changed", None)
        }
    }
}

pub mod commands;
pub mod utils;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;
use crate::config::AppConfig;
use crate::storage::FileStorage;
use crate::tenant::Location;
use crate::theme::{StyleSurface, SystemPreference};
use crate::transport::MemoryNavigator;

#[derive(Parser)]
#[command(name = "lms-admin")]
#[command(about = "LMS admin CLI - tenant, session and theme tooling for the admin dashboard")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "LMS_APP_URL",
        default_value = "http://localhost/",
        help = "Address the dashboard is opened at; tenant signals are read from it"
    )]
    pub location: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Tenant resolution")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Authentication and token management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Tenant themes, palettes and color mode")]
    Theme {
        #[command(subcommand)]
        cmd: commands::theme::ThemeCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Everything a command handler needs
pub struct Runtime {
    pub ctx: AppContext,
    pub location: Location,
    pub surface: StyleSurface,
    pub navigator: Arc<MemoryNavigator>,
}

impl Runtime {
    pub fn new(config: AppConfig, location: &str) -> anyhow::Result<Self> {
        let location = Location::parse(location).with_context(|| format!("Invalid location '{}'", location))?;
        let storage = FileStorage::open_default().context("Failed to open client state")?;
        let navigator = Arc::new(MemoryNavigator::new(location.path.clone()));
        let surface = StyleSurface::new();
        let ctx = AppContext::with_presentation(
            config,
            Arc::new(storage),
            navigator.clone(),
            Box::new(surface.clone()),
            SystemPreference::from_env(),
        )?;
        Ok(Self {
            ctx,
            location,
            surface,
            navigator,
        })
    }

    /// True when the transport gave up on the session during this run
    pub fn sent_to_sign_in(&self) -> bool {
        !self.navigator.redirects().is_empty()
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let runtime = Runtime::new(AppConfig::from_env(), &cli.location)?;

    let result = match cli.command {
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, &runtime, output_format.clone()).await,
        Commands::Auth { cmd } => commands::auth::handle(cmd, &runtime, output_format.clone()).await,
        Commands::Theme { cmd } => commands::theme::handle(cmd, &runtime, output_format.clone()).await,
    };

    if runtime.sent_to_sign_in() {
        utils::output_error(
            &output_format,
            "Session expired. Sign in again with `lms-admin auth login`.",
            Some("SESSION_EXPIRED"),
        )?;
    }
    runtime.ctx.teardown();
    result
}

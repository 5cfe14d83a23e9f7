use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{OutputFormat, Runtime};
use crate::tenant::{Freshness, TenantState};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Resolve the tenant for the current location")]
    Resolve,

    #[command(about = "Show the persisted tenant")]
    Current,

    #[command(about = "Forget the persisted tenant")]
    Clear,
}

pub async fn handle(cmd: TenantCommands, runtime: &Runtime, output_format: OutputFormat) -> anyhow::Result<()> {
    let resolver = runtime.ctx.tenant();
    match cmd {
        TenantCommands::Resolve => {
            let state = resolver.resolve_tenant(&runtime.location).await;
            output_state(&output_format, &state)
        }
        TenantCommands::Current => match resolver.persisted_identifier() {
            Some(identifier) => {
                let details = json!({ "identifier": identifier.clone() });
                output_current_item(&output_format, "tenant", &identifier, details)
            }
            None => output_no_current_item(&output_format, "tenant"),
        },
        TenantCommands::Clear => {
            resolver.clear_tenant();
            output_success(&output_format, "Tenant cleared", None)
        }
    }
}

fn output_state(output_format: &OutputFormat, state: &TenantState) -> anyhow::Result<()> {
    match state {
        TenantState::Resolved { config, signal, freshness } => {
            let stale_reason = match freshness {
                Freshness::Fresh => None,
                Freshness::Stale { reason } => Some(reason.clone()),
            };
            let details = json!({
                "id": config.id,
                "domain": config.domain,
                "name": config.display_name(),
                "signal": signal,
                "stale": stale_reason.is_some(),
                "stale_reason": stale_reason,
            });
            output_current_item(output_format, "tenant", config.display_name(), details)
        }
        other => {
            let message = other
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Tenant not resolved".to_string());
            output_error(output_format, &message, Some("TENANT_UNRESOLVED"))?;
            if matches!(output_format, OutputFormat::Text) {
                for hint in other.guidance() {
                    eprintln!("  - {}", hint);
                }
            }
            Ok(())
        }
    }
}

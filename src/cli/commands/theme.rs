use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::{OutputFormat, Runtime};
use crate::theme::{AppliedTheme, ThemeConfig, ThemeMode};

#[derive(Subcommand)]
pub enum ThemeCommands {
    #[command(about = "Apply the tenant theme and print the resulting stylesheet")]
    Show,

    #[command(about = "Set the color mode (light, dark, system)")]
    Mode {
        #[arg(help = "light | dark | system")]
        mode: ThemeMode,
    },

    #[command(about = "List available color palettes")]
    Palettes,

    #[command(about = "Generate a palette from a base color")]
    Generate {
        #[arg(help = "Base color, e.g. #2563eb")]
        base: String,
    },

    #[command(about = "Render a theme file without saving it")]
    Preview {
        #[arg(help = "Theme JSON file")]
        file: PathBuf,
        #[arg(long, help = "Mode to preview in")]
        mode: Option<ThemeMode>,
    },

    #[command(about = "Save a theme file for the current tenant")]
    Set {
        #[arg(help = "Theme JSON file")]
        file: PathBuf,
    },
}

pub async fn handle(cmd: ThemeCommands, runtime: &Runtime, output_format: OutputFormat) -> anyhow::Result<()> {
    let ctx = &runtime.ctx;
    match cmd {
        ThemeCommands::Show => {
            let report = ctx.boot(&runtime.location).await;
            if let Some(e) = &report.theme_error {
                output_error(&output_format, e, Some("THEME_INVALID"))?;
            }
            output_theme(&output_format, runtime, ctx.engine().current())
        }
        ThemeCommands::Mode { mode } => {
            ctx.boot(&runtime.location).await;
            let applied = ctx.set_theme_mode(mode)?;
            output_success(
                &output_format,
                &format!("Theme mode set to {} ({})", mode.as_str(), applied.effective.as_str()),
                Some(json!({ "mode": mode, "effective": applied.effective })),
            )
        }
        ThemeCommands::Palettes => {
            let palettes = ctx.themes().palettes().await?;
            if palettes.is_empty() {
                return output_empty_collection(&output_format, "palettes", "No palettes available");
            }
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "palettes": palettes }))?),
                OutputFormat::Text => {
                    println!("{:<12} {:<12} {:<10} {:<10} {}", "ID", "NAME", "50", "500", "900");
                    println!("{}", "-".repeat(56));
                    for palette in &palettes {
                        let shade = |s: &str| palette.colors.get(s).map(String::as_str).unwrap_or("-");
                        println!(
                            "{:<12} {:<12} {:<10} {:<10} {}",
                            palette.id,
                            palette.name,
                            shade("50"),
                            shade("500"),
                            shade("900")
                        );
                    }
                }
            }
            Ok(())
        }
        ThemeCommands::Generate { base } => {
            let palette = ctx.themes().generate_palette(&base).await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&palette)?),
                OutputFormat::Text => {
                    for (shade, hex) in &palette.colors {
                        println!("{:>4}  {}", shade, hex);
                    }
                }
            }
            Ok(())
        }
        ThemeCommands::Preview { file, mode } => {
            let theme = read_theme(&file)?;
            ctx.boot(&runtime.location).await;
            let tenant_id = ctx.tenant().state().config().map(|c| c.id.clone());
            let mode = mode.unwrap_or_else(|| ctx.themes().mode());
            let applied = ctx.engine().preview_config(tenant_id, theme, mode)?;
            output_theme(&output_format, runtime, Some(applied))
        }
        ThemeCommands::Set { file } => {
            let theme = read_theme(&file)?;
            ctx.boot(&runtime.location).await;
            let applied = ctx.save_theme(theme).await?;
            output_success(
                &output_format,
                &format!("Theme saved for tenant '{}'", applied.tenant_id.as_deref().unwrap_or("-")),
                None,
            )
        }
    }
}

fn read_theme(file: &PathBuf) -> anyhow::Result<ThemeConfig> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let theme: ThemeConfig =
        serde_json::from_str(&content).with_context(|| format!("{} is not a valid theme", file.display()))?;
    theme.validate()?;
    Ok(theme)
}

fn output_theme(output_format: &OutputFormat, runtime: &Runtime, applied: Option<AppliedTheme>) -> anyhow::Result<()> {
    let Some(applied) = applied else {
        return output_no_current_item(output_format, "theme");
    };
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&applied)?),
        OutputFormat::Text => print!("{}", runtime.surface.to_css()),
    }
    Ok(())
}

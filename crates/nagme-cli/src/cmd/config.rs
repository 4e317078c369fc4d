use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use serde::Serialize;

use nagme_core::config::{AccessMode, AppConfig, default_config_path};

use crate::context::AppContext;
use crate::output::{pretty_kv, pretty_section, render_mode, render_success};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the effective configuration (API key redacted)
    Show,
    /// Print the config file path that would be read
    Path,
    /// Write a starter config file
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Backend base URL.
    #[arg(long)]
    endpoint: String,

    /// Public API key sent with every request.
    #[arg(long)]
    api_key: String,

    /// Allow add/edit/delete/push/complete.
    #[arg(long)]
    read_write: bool,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    path: Option<PathBuf>,
    #[serde(flatten)]
    config: AppConfig,
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(default_config_path)
}

/// # Errors
///
/// Fails when the config file cannot be written or stdout is closed.
pub fn run_config(args: &ConfigArgs, explicit: Option<&Path>, ctx: &AppContext) -> Result<()> {
    match &args.command {
        ConfigCommand::Show => run_show(explicit, ctx),
        ConfigCommand::Path => {
            let path = config_path(explicit)
                .ok_or_else(|| anyhow!("no config directory on this platform"))?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Init(init) => run_init(init, explicit, ctx),
    }
}

fn run_show(explicit: Option<&Path>, ctx: &AppContext) -> Result<()> {
    let mut config = ctx.config.clone();
    config.gateway.api_key = config.gateway.redacted_api_key();
    let view = ConfigView {
        path: config_path(explicit),
        config,
    };
    render_mode(ctx.output, &view, write_text, write_pretty)
}

fn write_text(view: &ConfigView, w: &mut dyn Write) -> io::Result<()> {
    let body = toml::to_string(&view.config).map_err(io::Error::other)?;
    w.write_all(body.as_bytes())
}

fn write_pretty(view: &ConfigView, w: &mut dyn Write) -> io::Result<()> {
    let config = &view.config;
    let path = view
        .path
        .as_ref()
        .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
    pretty_section(w, "Config")?;
    pretty_kv(w, "File", path)?;
    pretty_kv(w, "Output", config.output.as_deref().unwrap_or("(auto)"))?;
    writeln!(w)?;
    pretty_section(w, "Gateway")?;
    pretty_kv(w, "Endpoint", &config.gateway.endpoint)?;
    pretty_kv(w, "API key", &config.gateway.api_key)?;
    pretty_kv(w, "Mode", config.gateway.mode.as_str())?;
    pretty_kv(w, "Timeout", format!("{}s", config.gateway.timeout_secs))?;
    pretty_kv(w, "Direct", &config.gateway.tables.direct)?;
    pretty_kv(w, "Events", config.gateway.tables.events.join(", "))?;
    writeln!(w)?;
    pretty_section(w, "Display")?;
    pretty_kv(w, "Due soon", format!("{}d", config.display.due_soon_days))?;
    pretty_kv(w, "Horizon", format!("{}d", config.display.horizon_days))?;
    let offset = config
        .display
        .utc_offset_minutes
        .map_or_else(|| "(local)".to_string(), |m| format!("{m:+}m"));
    pretty_kv(w, "UTC offset", offset)?;
    let reload = match config.display.auto_reload_minutes {
        0 => "off".to_string(),
        m => format!("{m}m"),
    };
    pretty_kv(w, "Auto reload", reload)
}

fn run_init(args: &InitArgs, explicit: Option<&Path>, ctx: &AppContext) -> Result<()> {
    let path =
        config_path(explicit).ok_or_else(|| anyhow!("no config directory on this platform"))?;
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = AppConfig::default();
    config.gateway.endpoint = args.endpoint.trim().to_string();
    config.gateway.api_key = args.api_key.trim().to_string();
    if args.read_write {
        config.gateway.mode = AccessMode::ReadWrite;
    }
    config.gateway.require_remote()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    render_success(ctx.output, &format!("wrote {}", path.display()))
}

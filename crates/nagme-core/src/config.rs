use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::classify::DUE_SOON_DAYS;
use crate::error::NagError;

/// Whether the app may write back to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "read-only" | "readonly" | "ro" | "view-only" => Ok(Self::ReadOnly),
            "read-write" | "readwrite" | "rw" => Ok(Self::ReadWrite),
            other => Err(format!(
                "unknown access mode '{other}': expected read-only or read-write"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablesConfig {
    /// Collection holding one current-state row per nag.
    #[serde(default = "default_direct_table")]
    pub direct: String,
    /// Event collections, tried in order.
    #[serde(default = "default_event_tables")]
    pub events: Vec<String>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            direct: default_direct_table(),
            events: default_event_tables(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub mode: AccessMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub tables: TablesConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            mode: AccessMode::default(),
            timeout_secs: default_timeout_secs(),
            tables: TablesConfig::default(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.redacted_api_key())
            .field("mode", &self.mode)
            .field("timeout_secs", &self.timeout_secs)
            .field("tables", &self.tables)
            .finish()
    }
}

impl GatewayConfig {
    /// The endpoint without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }

    /// # Errors
    ///
    /// [`NagError::Config`] when endpoint or API key is missing.
    pub fn require_remote(&self) -> std::result::Result<(), NagError> {
        if self.base_url().is_empty() {
            return Err(NagError::Config("gateway.endpoint is not set".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(NagError::Config("gateway.api_key is not set".into()));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`NagError::Permission`] in read-only mode.
    pub fn require_write(&self) -> std::result::Result<(), NagError> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(NagError::Permission(
                "writes are disabled in read-only mode".into(),
            )),
        }
    }

    /// First and last four characters of the key.
    #[must_use]
    pub fn redacted_api_key(&self) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return String::new();
        }
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_due_soon_days")]
    pub due_soon_days: u32,
    /// Recurring horizon in days: 30 or 365.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    /// Wall clock for calendar recurrences and date input. Defaults to the
    /// machine's local offset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    /// Background reload interval for the terminal view; 0 disables it.
    #[serde(default = "default_auto_reload_minutes")]
    pub auto_reload_minutes: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            due_soon_days: default_due_soon_days(),
            horizon_days: default_horizon_days(),
            utc_offset_minutes: None,
            auto_reload_minutes: default_auto_reload_minutes(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Environment overrides, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub mode: Option<String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            endpoint: read("NAGME_ENDPOINT"),
            api_key: read("NAGME_API_KEY"),
            mode: read("NAGME_MODE"),
        }
    }
}

/// `~/.config/nagme/config.toml` (platform equivalent elsewhere).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nagme/config.toml"))
}

/// Parse one config file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<AppConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Effective config: defaults, then the user file (or `explicit`), then
/// environment overrides.
///
/// # Errors
///
/// Returns an error if `explicit` does not exist, a file fails to parse, or
/// `NAGME_MODE` holds an unknown mode.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let config = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            load_config_file(path)?
        }
        None => match default_config_path() {
            Some(path) => load_config_file(&path)?,
            None => AppConfig::default(),
        },
    };
    apply_env(config, &EnvOverrides::from_env())
}

/// Layer environment overrides over a loaded config.
///
/// # Errors
///
/// Returns an error for an unparseable mode override.
pub fn apply_env(mut config: AppConfig, overrides: &EnvOverrides) -> Result<AppConfig> {
    if let Some(endpoint) = &overrides.endpoint {
        config.gateway.endpoint.clone_from(endpoint);
    }
    if let Some(key) = &overrides.api_key {
        config.gateway.api_key.clone_from(key);
    }
    if let Some(mode) = &overrides.mode {
        config.gateway.mode = mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Invalid NAGME_MODE: {e}"))?;
    }
    Ok(config)
}

/// Pick the output mode: `--json`, then `FORMAT`, then the config file, then
/// pretty on a terminal and text otherwise.
#[must_use]
pub fn resolve_output(cli_json: bool, config_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }
    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }
    if let Some(mode) = config_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }
    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_direct_table() -> String {
    "nag_state".to_string()
}

fn default_event_tables() -> Vec<String> {
    vec!["nag".to_string(), "events".to_string()]
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_due_soon_days() -> u32 {
    DUE_SOON_DAYS
}

const fn default_horizon_days() -> u32 {
    30
}

const fn default_auto_reload_minutes() -> u64 {
    60
}

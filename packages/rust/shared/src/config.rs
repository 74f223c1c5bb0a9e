//! Application configuration for mdenrich.
//!
//! User config lives at `~/.mdenrich/mdenrich.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EnrichError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mdenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mdenrich";

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// How an attempt's rendered output is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaMode {
    /// Reviewer when available, structural validation otherwise.
    #[default]
    Auto,
    /// Reviewer required.
    Ai,
    /// Structural validation only.
    Fallback,
}

impl FromStr for QaMode {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "ai" => Ok(Self::Ai),
            "fallback" => Ok(Self::Fallback),
            other => Err(EnrichError::config(format!(
                "unknown qa mode '{other}' (expected auto, ai or fallback)"
            ))),
        }
    }
}

impl fmt::Display for QaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Ai => "ai",
            Self::Fallback => "fallback",
        })
    }
}

/// How much article text the selector prompt carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Full article and per-section paragraphs.
    #[default]
    Both,
    /// Per-section paragraphs only.
    Paragraphs,
    /// Full article only.
    Full,
}

impl FromStr for PromptMode {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "both" => Ok(Self::Both),
            "paragraphs" => Ok(Self::Paragraphs),
            "full" => Ok(Self::Full),
            other => Err(EnrichError::config(format!(
                "unknown prompt mode '{other}' (expected both, paragraphs or full)"
            ))),
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Both => "both",
            Self::Paragraphs => "paragraphs",
            Self::Full => "full",
        })
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching mdenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub availability: AvailabilityConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub journal: JournalConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory for enriched output when `--out` is not given.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default)]
    pub qa_mode: QaMode,

    /// Attempts before the run fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Reviewer rating needed to accept (0..=10).
    #[serde(default = "default_qa_threshold")]
    pub qa_threshold: u8,

    /// Minimum summed anchor heuristic score across both links.
    #[serde(default = "default_prevalidation_min_score")]
    pub prevalidation_min_score: u32,

    /// Structural validation also requires a keyword inside every anchor.
    #[serde(default)]
    pub require_keyword_in_anchor: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            qa_mode: QaMode::default(),
            max_attempts: default_max_attempts(),
            qa_threshold: default_qa_threshold(),
            prevalidation_min_score: default_prevalidation_min_score(),
            require_keyword_in_anchor: false,
        }
    }
}

fn default_output_dir() -> String {
    "out".into()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_qa_threshold() -> u8 {
    7
}
fn default_prevalidation_min_score() -> u32 {
    6
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub prompt_mode: PromptMode,

    /// Repair banned or keyword-less anchors returned by the model.
    #[serde(default = "default_true")]
    pub anchor_sanitize: bool,

    /// Log raw prompts and responses.
    #[serde(default)]
    pub debug: bool,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            prompt_mode: PromptMode::default(),
            anchor_sanitize: true,
            debug: false,
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// libSQL database holding `images` and `videos`.
    #[serde(default = "default_media_db")]
    pub media_db: String,

    /// libSQL database holding `resources`.
    #[serde(default = "default_links_db")]
    pub links_db: String,

    /// Optional brand/style rules file passed to the selector and reviewer.
    #[serde(default)]
    pub brand_rules: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            media_db: default_media_db(),
            links_db: default_links_db(),
            brand_rules: None,
        }
    }
}

fn default_media_db() -> String {
    "data/media.db".into()
}
fn default_links_db() -> String {
    "data/links.db".into()
}

/// `[availability]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum in-flight probes.
    #[serde(default = "default_probe_concurrency")]
    pub concurrency: usize,

    /// Per-probe timeout in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_probe_concurrency(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_probe_concurrency() -> usize {
    20
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}

/// `[selection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Ordered heading fragments the fallback selector targets for links.
    #[serde(default = "default_section_hints")]
    pub section_hints: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            section_hints: default_section_hints(),
        }
    }
}

fn default_section_hints() -> Vec<String> {
    [
        "infrastructure",
        "storage",
        "how co2 is captured",
        "moving the molecule",
        "why commuters are switching",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[journal]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Journal database path; defaults to `~/.mdenrich/journal.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.max_attempts == 0 {
            return Err(EnrichError::config("defaults.max_attempts must be at least 1"));
        }
        if self.defaults.qa_threshold > 10 {
            return Err(EnrichError::config(format!(
                "defaults.qa_threshold must be within 0..=10, got {}",
                self.defaults.qa_threshold
            )));
        }
        if self.defaults.prevalidation_min_score > 8 {
            return Err(EnrichError::config(format!(
                "defaults.prevalidation_min_score must be within 0..=8, got {}",
                self.defaults.prevalidation_min_score
            )));
        }
        if self.availability.concurrency == 0 {
            return Err(EnrichError::config("availability.concurrency must be at least 1"));
        }
        if self.availability.timeout_ms == 0 {
            return Err(EnrichError::config("availability.timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mdenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| EnrichError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mdenrich/mdenrich.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| EnrichError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| EnrichError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(EnrichError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

use crate::config::error::{ConfigError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "plankit.toml";

/// Root engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lock-file acquisition knobs
    #[serde(default)]
    pub lock: LockConfig,

    /// Advisory session marker
    #[serde(default)]
    pub session: SessionConfig,

    /// Context-budget tiering
    #[serde(default)]
    pub context: ContextConfig,

    /// File and directory names under the project root
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Lock acquisition configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Maximum acquisition attempts
    #[serde(default = "default_lock_retries")]
    pub retries: u32,

    /// Base delay between attempts in milliseconds (multiplied by attempt number)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lock files older than this many milliseconds are reclaimed
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

/// Session marker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A foreign marker younger than this is reported as a conflict
    #[serde(default = "default_session_stale_minutes")]
    pub stale_after_minutes: u64,
}

/// Context-budget configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Samples between repeated warnings at the same tier
    #[serde(default = "default_debounce_interval")]
    pub debounce_interval: u32,

    /// A bridge file older than this is ignored
    #[serde(default = "default_bridge_freshness_secs")]
    pub bridge_freshness_secs: u64,

    /// Characters that make up a full context window for the heuristic
    #[serde(default = "default_context_window_chars")]
    pub context_window_chars: u64,

    /// Retained warning history entries
    #[serde(default = "default_warning_history_cap")]
    pub warning_history_cap: usize,
}

/// Planning directory layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_planning_dir")]
    pub planning_dir: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_roadmap_file")]
    pub roadmap_file: String,
    #[serde(default = "default_phases_dir")]
    pub phases_dir: String,
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
    #[serde(default = "default_context_state_file")]
    pub context_state_file: String,
    #[serde(default = "default_bridge_file")]
    pub bridge_file: String,
    #[serde(default = "default_session_marker_file")]
    pub session_marker_file: String,
}

// Default value functions
fn default_lock_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    100
}
fn default_lock_timeout_ms() -> u64 {
    5000
}
fn default_session_stale_minutes() -> u64 {
    30
}
fn default_debounce_interval() -> u32 {
    5
}
fn default_bridge_freshness_secs() -> u64 {
    60
}
fn default_context_window_chars() -> u64 {
    800_000
}
fn default_warning_history_cap() -> usize {
    20
}
fn default_planning_dir() -> String {
    ".planning".to_string()
}
fn default_state_file() -> String {
    "STATE.md".to_string()
}
fn default_roadmap_file() -> String {
    "ROADMAP.md".to_string()
}
fn default_phases_dir() -> String {
    "phases".to_string()
}
fn default_checkpoint_file() -> String {
    "CHECKPOINT.json".to_string()
}
fn default_context_state_file() -> String {
    "context-budget.json".to_string()
}
fn default_bridge_file() -> String {
    "context-bridge.json".to_string()
}
fn default_session_marker_file() -> String {
    ".active-session".to_string()
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: default_lock_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_session_stale_minutes(),
        }
    }
}

impl SessionConfig {
    pub fn stale_after(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stale_after_minutes * 60)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            debounce_interval: default_debounce_interval(),
            bridge_freshness_secs: default_bridge_freshness_secs(),
            context_window_chars: default_context_window_chars(),
            warning_history_cap: default_warning_history_cap(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            planning_dir: default_planning_dir(),
            state_file: default_state_file(),
            roadmap_file: default_roadmap_file(),
            phases_dir: default_phases_dir(),
            checkpoint_file: default_checkpoint_file(),
            context_state_file: default_context_state_file(),
            bridge_file: default_bridge_file(),
            session_marker_file: default_session_marker_file(),
        }
    }
}

/// Configuration loader with layered merging support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this file; it must exist.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Look for `plankit.toml` in this directory before the user-level locations.
    pub fn with_project_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.project_root = Some(root.as_ref().to_path_buf());
        self
    }

    /// The file [`load`](Self::load) would read, if any.
    pub fn resolved_file(&self) -> Option<PathBuf> {
        self.config_path
            .clone()
            .or_else(|| Self::find_config_file(self.project_root.as_deref()))
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge the config file if one was given or found
    /// 3. Override with environment variables (PLANKIT_ prefix)
    pub fn load(&self) -> Result<EngineConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&EngineConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(path) = self.resolved_file() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            tracing::debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(File::from(path.as_path()));
        }

        // Example: PLANKIT_LOCK__RETRIES=5
        builder = builder.add_source(
            Environment::with_prefix("PLANKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;

        let validator = crate::config::validator::SchemaValidator::new()?;
        validator.validate(&config)?;

        Ok(config)
    }

    /// Locate a config file:
    /// 1. `<project_root>/plankit.toml`
    /// 2. XDG config: `~/.config/plankit/config.toml`
    /// 3. Home directory: `~/.plankit.toml`
    pub fn find_config_file(project_root: Option<&Path>) -> Option<PathBuf> {
        if let Some(root) = project_root {
            let project_config = root.join(CONFIG_FILE_NAME);
            if project_config.exists() {
                return Some(project_config);
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("plankit").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".plankit.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }
}

//! Engine configuration
//!
//! Layered, last one wins:
//! 1. Defaults (from code)
//! 2. Config file (`plankit.toml`)
//! 3. Environment variables (`PLANKIT_*` prefix, `__` for nesting)
//!
//! # Example
//!
//! ```no_run
//! use plankit_state::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_project_root("/path/to/project")
//!     .load()
//!     .expect("Failed to load config");
//! assert_eq!(config.lock.retries, 3);
//! ```
pub mod cache;
pub mod error;
pub mod loader;
pub mod validator;

pub use cache::ConfigCache;
pub use error::{ConfigError, Result};
pub use loader::{
    CONFIG_FILE_NAME, ConfigLoader, ContextConfig, EngineConfig, LayoutConfig, LockConfig,
    SessionConfig,
};
pub use validator::SchemaValidator;

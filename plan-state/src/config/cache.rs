//! Process-local config cache keyed by the config file's modification time.
//!
//! Short-lived processes load once; long-lived embedders call
//! [`ConfigCache::load`] freely and only pay for a reload after the file
//! changed on disk or [`ConfigCache::invalidate`] was called. Environment
//! overrides are read at reload time only.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::config::error::Result;
use crate::config::loader::{ConfigLoader, EngineConfig};

#[derive(Debug)]
struct CacheEntry {
    file: Option<PathBuf>,
    mtime: Option<SystemTime>,
    config: Arc<EngineConfig>,
}

/// Memoized [`ConfigLoader`] for one project root.
#[derive(Debug)]
pub struct ConfigCache {
    project_root: PathBuf,
    explicit_file: Option<PathBuf>,
    entry: Mutex<Option<CacheEntry>>,
}

impl ConfigCache {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            explicit_file: None,
            entry: Mutex::new(None),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    fn loader(&self) -> ConfigLoader {
        let loader = ConfigLoader::new().with_project_root(&self.project_root);
        match &self.explicit_file {
            Some(path) => loader.with_file(path),
            None => loader,
        }
    }

    /// Cached config, reloaded when the backing file or its mtime changed.
    pub fn load(&self) -> Result<Arc<EngineConfig>> {
        let loader = self.loader();
        let file = loader.resolved_file();
        let mtime = file.as_deref().and_then(modified);

        let mut guard = self.entry.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = guard.as_ref()
            && entry.file == file
            && entry.mtime == mtime
        {
            return Ok(Arc::clone(&entry.config));
        }

        tracing::debug!(file = ?file, "Config cache miss, reloading");
        let config = Arc::new(loader.load()?);
        *guard = Some(CacheEntry {
            file,
            mtime,
            config: Arc::clone(&config),
        });
        Ok(config)
    }

    /// Drop the cached value; the next [`load`](Self::load) rereads everything.
    pub fn invalidate(&self) {
        let mut guard = self.entry.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

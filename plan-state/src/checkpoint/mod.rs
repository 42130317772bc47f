//! Per-phase execution ledger (`CHECKPOINT.json`).
//!
//! Created when a wave loop starts, mutated once per wave or resolution
//! event. After a crash the orchestrator reads `last_good_commit` and
//! `checkpoints_resolved` to know what is already safely committed.
//!
//! ```json
//! {
//!   "plans": ["02-02"],
//!   "checkpoints_resolved": ["02-01"],
//!   "checkpoints_pending": [],
//!   "wave": 2,
//!   "deferred": [],
//!   "commit_log": [{ "plan": "02-01", "sha": "deadbeef", "timestamp": "..." }],
//!   "last_good_commit": "deadbeef"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::PlanningLayout;
use crate::persist::{AtomicWriteError, FileLock, LockError, LockOptions, write_atomic};

/// Errors reading or persisting a manifest. Always fatal: a corrupt ledger
/// is never silently recreated.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Checkpoint manifest not found: {path}")]
    Missing { path: PathBuf },

    #[error("Checkpoint manifest {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to read checkpoint manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode checkpoint manifest {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub plan: Option<String>,
    pub sha: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    /// Plans not yet resolved or deferred.
    pub plans: Vec<String>,
    #[serde(default)]
    pub checkpoints_resolved: Vec<String>,
    #[serde(default)]
    pub checkpoints_pending: Vec<String>,
    pub wave: u32,
    #[serde(default)]
    pub deferred: Vec<String>,
    #[serde(default)]
    pub commit_log: Vec<CommitEntry>,
    #[serde(default)]
    pub last_good_commit: Option<String>,
}

impl CheckpointManifest {
    /// Fresh ledger at wave 1.
    pub fn new(plans: Vec<String>) -> Self {
        Self {
            plans,
            checkpoints_resolved: Vec::new(),
            checkpoints_pending: Vec::new(),
            wave: 1,
            deferred: Vec::new(),
            commit_log: Vec::new(),
            last_good_commit: None,
        }
    }

    /// Apply one event. Resolving or deferring an id twice is a no-op.
    pub fn apply(&mut self, update: &ManifestUpdate) {
        if let Some(id) = &update.pending
            && !self.checkpoints_pending.contains(id)
            && !self.checkpoints_resolved.contains(id)
        {
            self.checkpoints_pending.push(id.clone());
        }

        if let Some(id) = &update.resolved {
            self.plans.retain(|p| p != id);
            self.checkpoints_pending.retain(|p| p != id);
            if !self.checkpoints_resolved.contains(id) {
                self.checkpoints_resolved.push(id.clone());
            }
        }

        if let Some(id) = &update.deferred {
            self.plans.retain(|p| p != id);
            if !self.deferred.contains(id) {
                self.deferred.push(id.clone());
            }
        }

        if let Some(wave) = update.wave {
            self.wave = wave;
        }

        if let Some(sha) = &update.sha {
            self.commit_log.push(CommitEntry {
                plan: update.resolved.clone(),
                sha: sha.clone(),
                timestamp: Utc::now(),
            });
            self.last_good_commit = Some(sha.clone());
        }
    }

    fn write_to(&self, path: &Path) -> std::result::Result<(), ManifestError> {
        let mut json = serde_json::to_string_pretty(self).map_err(|source| ManifestError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        json.push('\n');
        write_atomic(path, &json)?;
        Ok(())
    }
}

/// One wave or resolution event. Unset fields leave the manifest alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestUpdate {
    /// New wave number; caller-driven, never auto-incremented.
    pub wave: Option<u32>,
    pub resolved: Option<String>,
    pub sha: Option<String>,
    pub pending: Option<String>,
    pub deferred: Option<String>,
}

/// Where to resume after an interruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumePoint {
    pub wave: u32,
    pub last_good_commit: Option<String>,
    pub resolved: Vec<String>,
    pub remaining: Vec<String>,
    pub pending: Vec<String>,
    pub deferred: Vec<String>,
}

pub fn resume_point(manifest: &CheckpointManifest) -> ResumePoint {
    ResumePoint {
        wave: manifest.wave,
        last_good_commit: manifest.last_good_commit.clone(),
        resolved: manifest.checkpoints_resolved.clone(),
        remaining: manifest.plans.clone(),
        pending: manifest.checkpoints_pending.clone(),
        deferred: manifest.deferred.clone(),
    }
}

/// Create (or overwrite) the manifest at `path`.
pub fn init_manifest(
    path: &Path,
    plans: Vec<String>,
) -> std::result::Result<CheckpointManifest, ManifestError> {
    let manifest = CheckpointManifest::new(plans);
    manifest.write_to(path)?;
    tracing::debug!(path = %path.display(), plans = manifest.plans.len(), "Checkpoint manifest initialized");
    Ok(manifest)
}

/// Load the manifest at `path`.
pub fn read_manifest(path: &Path) -> std::result::Result<CheckpointManifest, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ManifestError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ManifestError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&content).map_err(|source| ManifestError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `update` to the manifest at `path` under its lock file.
pub fn update_manifest(
    path: &Path,
    update: &ManifestUpdate,
    options: &LockOptions,
) -> std::result::Result<CheckpointManifest, ManifestError> {
    let manifest = crate::measure_time!("checkpoint.update_manifest", {
        let _lock = FileLock::acquire(path, options)?;
        let mut manifest = read_manifest(path)?;
        let before = manifest.clone();
        manifest.apply(update);
        if manifest != before {
            manifest.write_to(path)?;
        }
        manifest
    });
    tracing::debug!(path = %path.display(), wave = manifest.wave, "Checkpoint manifest updated");
    Ok(manifest)
}

/// Manifest operations addressed by phase token.
#[derive(Debug, Clone)]
pub struct CheckpointLedger {
    layout: PlanningLayout,
    lock: LockOptions,
}

impl CheckpointLedger {
    pub fn new(layout: PlanningLayout, lock: LockOptions) -> Self {
        Self { layout, lock }
    }

    /// Manifest path inside the phase directory `phase` resolves to.
    pub fn manifest_path(&self, phase: &str) -> Result<PathBuf> {
        let dir = self.layout.resolver().require(phase)?;
        Ok(self.layout.checkpoint_path(&dir.path))
    }

    pub fn init(&self, phase: &str, plans: Vec<String>) -> Result<CheckpointManifest> {
        Ok(init_manifest(&self.manifest_path(phase)?, plans)?)
    }

    pub fn update(&self, phase: &str, update: &ManifestUpdate) -> Result<CheckpointManifest> {
        Ok(update_manifest(&self.manifest_path(phase)?, update, &self.lock)?)
    }

    pub fn read(&self, phase: &str) -> Result<CheckpointManifest> {
        Ok(read_manifest(&self.manifest_path(phase)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanStateError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn ledger() -> (TempDir, CheckpointLedger) {
        let tmp = TempDir::new().expect("temp dir");
        let layout = PlanningLayout::with_defaults(tmp.path());
        std::fs::create_dir_all(layout.phases_dir().join("02-auth")).expect("mkdir");
        (tmp, CheckpointLedger::new(layout, LockOptions::default()))
    }

    #[test]
    fn init_writes_wave_one() {
        let (_tmp, ledger) = ledger();

        let manifest = ledger.init("2", ids(&["a", "b"])).expect("init");

        assert_eq!(manifest.wave, 1);
        assert_eq!(manifest.last_good_commit, None);
        assert_eq!(ledger.read("2").expect("read"), manifest);
    }

    #[test]
    fn resolve_with_sha_records_commit() {
        let (_tmp, ledger) = ledger();
        ledger.init("2", ids(&["a", "b", "c"])).expect("init");

        let manifest = ledger
            .update(
                "2",
                &ManifestUpdate {
                    resolved: Some("b".into()),
                    sha: Some("deadbeef".into()),
                    ..Default::default()
                },
            )
            .expect("update");

        assert_eq!(manifest.plans, ids(&["a", "c"]));
        assert_eq!(manifest.checkpoints_resolved, ids(&["b"]));
        assert_eq!(manifest.last_good_commit.as_deref(), Some("deadbeef"));
        assert_eq!(manifest.commit_log.len(), 1);
        assert_eq!(manifest.commit_log[0].plan.as_deref(), Some("b"));
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let mut manifest = CheckpointManifest::new(ids(&["a", "b"]));
        let update = ManifestUpdate {
            resolved: Some("a".into()),
            ..Default::default()
        };

        manifest.apply(&update);
        let once = manifest.clone();
        manifest.apply(&update);

        assert_eq!(manifest, once);
        assert_eq!(manifest.checkpoints_resolved, ids(&["a"]));
    }

    #[test]
    fn wave_is_caller_driven() {
        let mut manifest = CheckpointManifest::new(ids(&["a"]));
        manifest.apply(&ManifestUpdate {
            wave: Some(4),
            ..Default::default()
        });
        manifest.apply(&ManifestUpdate {
            wave: Some(2),
            ..Default::default()
        });
        assert_eq!(manifest.wave, 2);
    }

    #[test]
    fn pending_then_resolved_and_deferred() {
        let mut manifest = CheckpointManifest::new(ids(&["a", "b", "c"]));
        let pending = ManifestUpdate {
            pending: Some("a".into()),
            ..Default::default()
        };
        manifest.apply(&pending);
        manifest.apply(&pending);
        assert_eq!(manifest.checkpoints_pending, ids(&["a"]));

        manifest.apply(&ManifestUpdate {
            resolved: Some("a".into()),
            ..Default::default()
        });
        manifest.apply(&ManifestUpdate {
            deferred: Some("c".into()),
            ..Default::default()
        });

        assert!(manifest.checkpoints_pending.is_empty());
        assert_eq!(manifest.plans, ids(&["b"]));
        assert_eq!(manifest.deferred, ids(&["c"]));
        let resume = resume_point(&manifest);
        assert_eq!(resume.remaining, ids(&["b"]));
        assert_eq!(resume.resolved, ids(&["a"]));
    }

    #[test]
    fn sha_without_resolved_logs_null_plan() {
        let mut manifest = CheckpointManifest::new(ids(&["a"]));
        manifest.apply(&ManifestUpdate {
            sha: Some("cafe".into()),
            ..Default::default()
        });
        assert_eq!(manifest.commit_log[0].plan, None);
        assert_eq!(manifest.plans, ids(&["a"]));
    }

    #[test]
    fn corrupt_manifest_is_fatal_and_untouched() {
        let (_tmp, ledger) = ledger();
        let path = ledger.manifest_path("2").expect("path");
        std::fs::write(&path, "{ not json").expect("seed");

        let err = ledger
            .update(
                "2",
                &ManifestUpdate {
                    wave: Some(2),
                    ..Default::default()
                },
            )
            .unwrap_err();

        assert!(matches!(
            err,
            PlanStateError::Manifest(ManifestError::Corrupt { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{ not json");
    }

    #[test]
    fn missing_manifest_is_not_recreated() {
        let (_tmp, ledger) = ledger();

        let err = ledger.read("2").unwrap_err();

        assert!(matches!(
            err,
            PlanStateError::Manifest(ManifestError::Missing { .. })
        ));
        assert!(!ledger.manifest_path("2").expect("path").exists());
    }

    #[test]
    fn encode_failure_is_fatal_and_names_the_manifest() {
        let source = serde_json::from_str::<u32>("x").unwrap_err();
        let err = PlanStateError::from(ManifestError::Encode {
            path: PathBuf::from("/p/CHECKPOINT.json"),
            source,
        });

        assert!(!err.is_transient());
        assert!(err.to_string().contains("/p/CHECKPOINT.json"));
    }
}

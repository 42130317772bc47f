//! `{path, size, mtime}` snapshots of upstream inputs.
//!
//! Recorded into a plan's metadata at planning time and only ever compared
//! afterwards. `mtime` is integer epoch milliseconds; `path` is relative to
//! the project root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PlanStateError, Result};
use crate::frontmatter::{Frontmatter, Value};

/// Metadata key holding the fingerprint list.
pub const FINGERPRINTS_KEY: &str = "fingerprints";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub path: String,
    pub size: u64,
    pub mtime: i64,
}

/// Result of re-statting one fingerprinted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintCheck {
    Unchanged,
    Missing,
    Changed { size: u64, mtime: i64 },
}

impl Fingerprint {
    /// Snapshot `root/path` as it is now.
    pub fn capture(root: &Path, path: &str) -> std::io::Result<Self> {
        let (size, mtime) = stat(&root.join(path))?;
        Ok(Self {
            path: path.to_string(),
            size,
            mtime,
        })
    }

    /// Compare the recording against the file under `root`.
    pub fn check(&self, root: &Path) -> FingerprintCheck {
        match stat(&root.join(&self.path)) {
            Err(_) => FingerprintCheck::Missing,
            Ok((size, mtime)) if size == self.size && mtime == self.mtime => {
                FingerprintCheck::Unchanged
            }
            Ok((size, mtime)) => FingerprintCheck::Changed { size, mtime },
        }
    }

    /// Read one entry of the metadata list; entries missing a field are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            path: value.get("path")?.as_str()?.to_string(),
            size: value.get("size")?.as_u64()?,
            mtime: value.get("mtime")?.as_i64()?,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Map(vec![
            ("path".to_string(), Value::Scalar(self.path.clone())),
            ("size".to_string(), Value::Scalar(self.size.to_string())),
            ("mtime".to_string(), Value::Scalar(self.mtime.to_string())),
        ])
    }
}

fn stat(path: &Path) -> std::io::Result<(u64, i64)> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    let mtime = DateTime::<Utc>::from(meta.modified()?).timestamp_millis();
    Ok((meta.len(), mtime))
}

/// Fingerprint every path (relative to `root`). Any missing input fails the
/// whole call.
pub fn record_fingerprints<S: AsRef<str>>(root: &Path, paths: &[S]) -> Result<Vec<Fingerprint>> {
    paths
        .iter()
        .map(|p| {
            Fingerprint::capture(root, p.as_ref()).map_err(|source| PlanStateError::FileRead {
                path: root.join(p.as_ref()),
                source,
            })
        })
        .collect()
}

/// The `fingerprints:` metadata block for `entries`.
pub fn render_fingerprint_block(entries: &[Fingerprint]) -> String {
    let mut fm = Frontmatter::default();
    fm.set(
        FINGERPRINTS_KEY,
        Value::List(entries.iter().map(Fingerprint::to_value).collect()),
    );
    fm.render()
}

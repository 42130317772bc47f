//! Advisory "active session" marker.
//!
//! Unlike [`super::FileLock`] this marker never blocks. It exists so a second
//! session can be told that another one may be working in the same planning
//! directory. Claims always succeed; a live marker owned by someone else
//! turns the claim into [`SessionClaim::Conflict`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::atomic::{AtomicWriteError, remove_quietly, write_atomic};

/// Marker file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMarker {
    pub holder: String,
    pub pid: u32,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to encode session marker {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Write(#[from] AtomicWriteError),
}

/// Outcome of [`claim_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionClaim {
    /// No live marker from anyone else.
    Claimed,
    /// Another holder claimed the directory recently. The marker was still
    /// overwritten.
    Conflict { holder: String, age_secs: u64 },
}

impl SessionClaim {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionClaim::Conflict { .. })
    }
}

/// Claim the marker at `marker_path` for `holder`.
pub fn claim_session(
    marker_path: &Path,
    holder: &str,
    stale_after: Duration,
) -> Result<SessionClaim, SessionError> {
    let now = Utc::now();
    let claim = match read_marker(marker_path) {
        Some(existing) if existing.holder != holder => {
            let age = now
                .signed_duration_since(existing.claimed_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age < stale_after {
                tracing::warn!(
                    holder = %existing.holder,
                    pid = existing.pid,
                    age_secs = age.as_secs(),
                    "Another session may be active in this planning directory"
                );
                SessionClaim::Conflict {
                    holder: existing.holder,
                    age_secs: age.as_secs(),
                }
            } else {
                tracing::debug!(holder = %existing.holder, "Replacing stale session marker");
                SessionClaim::Claimed
            }
        }
        _ => SessionClaim::Claimed,
    };

    let marker = SessionMarker {
        holder: holder.to_string(),
        pid: std::process::id(),
        claimed_at: now,
    };
    let json = serde_json::to_string_pretty(&marker).map_err(|source| SessionError::Encode {
        path: marker_path.to_path_buf(),
        source,
    })?;
    write_atomic(marker_path, &json)?;
    Ok(claim)
}

/// Remove the marker if it still names `holder`. Returns whether it was removed.
pub fn release_session(marker_path: &Path, holder: &str) -> bool {
    match read_marker(marker_path) {
        Some(marker) if marker.holder == holder => {
            remove_quietly(marker_path);
            true
        }
        _ => false,
    }
}

/// Read the current marker; unreadable or malformed markers count as absent.
pub fn read_marker(marker_path: &Path) -> Option<SessionMarker> {
    let content = std::fs::read_to_string(marker_path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WINDOW: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn first_claim_succeeds() {
        let dir = TempDir::new().expect("temp dir");
        let marker = dir.path().join(".active-session");

        let claim = claim_session(&marker, "plan-phase", WINDOW).expect("claim");

        assert_eq!(claim, SessionClaim::Claimed);
        assert_eq!(read_marker(&marker).expect("marker").holder, "plan-phase");
    }

    #[test]
    fn live_foreign_marker_warns_but_still_claims() {
        let dir = TempDir::new().expect("temp dir");
        let marker = dir.path().join(".active-session");
        claim_session(&marker, "execute-phase", WINDOW).expect("first");

        let claim = claim_session(&marker, "plan-phase", WINDOW).expect("second");

        assert!(claim.is_conflict());
        assert_eq!(read_marker(&marker).expect("marker").holder, "plan-phase");
    }

    #[test]
    fn stale_foreign_marker_is_replaced_quietly() {
        let dir = TempDir::new().expect("temp dir");
        let marker_path = dir.path().join(".active-session");
        let old = SessionMarker {
            holder: "execute-phase".into(),
            pid: 1,
            claimed_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(&marker_path, serde_json::to_string(&old).expect("json")).expect("seed");

        let claim = claim_session(&marker_path, "plan-phase", WINDOW).expect("claim");

        assert_eq!(claim, SessionClaim::Claimed);
    }

    #[test]
    fn release_only_removes_own_marker() {
        let dir = TempDir::new().expect("temp dir");
        let marker = dir.path().join(".active-session");
        claim_session(&marker, "plan-phase", WINDOW).expect("claim");

        assert!(!release_session(&marker, "someone-else"));
        assert!(marker.exists());
        assert!(release_session(&marker, "plan-phase"));
        assert!(!marker.exists());
    }
}

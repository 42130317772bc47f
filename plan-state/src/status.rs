//! Phase status state machine.
//!
//! ```text
//! pending     -> planned | skipped
//! planned     -> building | skipped
//! building    -> built | partial | needs_fixes
//! built       -> verified | needs_fixes
//! partial     -> verified | needs_fixes
//! needs_fixes -> planned | building
//! verified    -> building
//! skipped     -> pending
//! ```
//!
//! Transitions are advisory: an edge outside the table yields
//! [`TransitionVerdict::Warn`], never an error. Nothing here touches disk.

use serde::{Deserialize, Serialize};

/// Lifecycle status of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Planned,
    Building,
    Built,
    Partial,
    NeedsFixes,
    Verified,
    Skipped,
}

impl PhaseStatus {
    pub fn all() -> [Self; 8] {
        [
            Self::Pending,
            Self::Planned,
            Self::Building,
            Self::Built,
            Self::Partial,
            Self::NeedsFixes,
            Self::Verified,
            Self::Skipped,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planned => "planned",
            Self::Building => "building",
            Self::Built => "built",
            Self::Partial => "partial",
            Self::NeedsFixes => "needs_fixes",
            Self::Verified => "verified",
            Self::Skipped => "skipped",
        }
    }

    /// Parse `needs-fixes`, `Needs Fixes`, `NEEDS_FIXES` and the like.
    pub fn parse(value: &str) -> Option<Self> {
        let key = normalize_status(value);
        Self::all().into_iter().find(|s| s.as_str() == key)
    }

    /// Statuses reachable in one step.
    pub fn successors(self) -> &'static [PhaseStatus] {
        use PhaseStatus::*;
        match self {
            Pending => &[Planned, Skipped],
            Planned => &[Building, Skipped],
            Building => &[Built, Partial, NeedsFixes],
            Built | Partial => &[Verified, NeedsFixes],
            NeedsFixes => &[Planned, Building],
            Verified => &[Building],
            Skipped => &[Pending],
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, with `-` and spaces folded to `_`.
pub fn normalize_status(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Result of [`validate_transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum TransitionVerdict {
    Allow,
    Warn { reason: String },
}

impl TransitionVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TransitionVerdict::Allow)
    }
}

/// Check `from → to` against the transition table.
pub fn validate_transition(from: PhaseStatus, to: PhaseStatus) -> TransitionVerdict {
    if from == to || from.successors().contains(&to) {
        return TransitionVerdict::Allow;
    }
    let expected: Vec<&str> = from.successors().iter().copied().map(PhaseStatus::as_str).collect();
    TransitionVerdict::Warn {
        reason: format!(
            "unexpected transition {from} -> {to}; expected one of: {}",
            expected.join(", ")
        ),
    }
}

//! Context-budget tiering.
//!
//! Turns a context-usage percentage into escalating, debounced advisories.
//! The percentage comes from an external bridge file when that is fresh and
//! from a characters-read heuristic otherwise. State lives in one JSON file
//! per project, created on the first sample and reset at session start.
//!
//! Warning rules per sample:
//! - never for PEAK or GOOD
//! - immediately when the tier is more severe than the last warned tier
//! - otherwise once `calls_since_warn` reaches the debounce interval

mod monitor;
mod tier;

pub use monitor::{BridgeReading, ContextMonitor};
pub use tier::{Tier, classify_tier};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::persist::{AtomicWriteError, LockError};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Context budget state {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to read context budget state {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode context budget state {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Where a percentage came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentSource {
    Bridge,
    #[default]
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub tier: Tier,
    pub percent: u32,
    pub timestamp: DateTime<Utc>,
}

/// Last known bridge value, kept after the bridge went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeHint {
    pub percent: u32,
    pub tier: Tier,
}

/// Persisted tiering state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudgetState {
    pub estimated_percent: u32,
    pub source: PercentSource,
    pub tier: Tier,
    pub last_warned_tier: Tier,
    pub calls_since_warn: u32,
    /// Most recent last; capped.
    pub warnings_issued: Vec<WarningRecord>,
    pub tool_calls: u64,
    /// Characters read this session, for the heuristic.
    pub chars_read: u64,
    pub bridge_hint: Option<BridgeHint>,
}

/// Tuning for [`ContextBudgetState::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRules {
    pub debounce_interval: u32,
    pub history_cap: usize,
}

impl Default for SampleRules {
    fn default() -> Self {
        Self {
            debounce_interval: 5,
            history_cap: 20,
        }
    }
}

impl From<&crate::config::ContextConfig> for SampleRules {
    fn from(config: &crate::config::ContextConfig) -> Self {
        Self {
            debounce_interval: config.debounce_interval,
            history_cap: config.warning_history_cap,
        }
    }
}

/// Result of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleOutcome {
    pub percent: u32,
    pub source: PercentSource,
    pub tier: Tier,
    pub should_warn: bool,
    pub calls_since_warn: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_hint: Option<BridgeHint>,
}

impl SampleOutcome {
    /// The tier's advisory text, only when this sample warns.
    pub fn message(&self) -> Option<String> {
        self.should_warn.then(|| self.tier.advisory(self.percent))
    }
}

impl ContextBudgetState {
    /// Record one sample at `percent` and decide whether to warn.
    pub fn sample(
        &mut self,
        percent: u32,
        source: PercentSource,
        rules: SampleRules,
        now: DateTime<Utc>,
    ) -> SampleOutcome {
        let percent = percent.min(100);
        let tier = classify_tier(percent);

        self.tool_calls += 1;
        self.calls_since_warn += 1;
        self.estimated_percent = percent;
        self.source = source;
        self.tier = tier;

        let should_warn = tier.is_warning()
            && (tier > self.last_warned_tier || self.calls_since_warn >= rules.debounce_interval);

        if should_warn {
            self.calls_since_warn = 0;
            self.last_warned_tier = tier;
            self.warnings_issued.push(WarningRecord {
                tier,
                percent,
                timestamp: now,
            });
            if self.warnings_issued.len() > rules.history_cap {
                let excess = self.warnings_issued.len() - rules.history_cap;
                self.warnings_issued.drain(..excess);
            }
        }

        SampleOutcome {
            percent,
            source,
            tier,
            should_warn,
            calls_since_warn: self.calls_since_warn,
            bridge_hint: self.bridge_hint,
        }
    }
}

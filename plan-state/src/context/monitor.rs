use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    BridgeHint, ContextBudgetState, ContextError, PercentSource, SampleOutcome, SampleRules,
    classify_tier,
};
use crate::config::ContextConfig;
use crate::layout::PlanningLayout;
use crate::persist::{FileLock, LockOptions, write_atomic};

/// Contents of the bridge file written by whatever can see real usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReading {
    pub percent: f64,
    /// When the reading was taken; the file mtime is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BridgeReading {
    fn percent_u32(&self) -> u32 {
        // Clamped to [0, 100] first, so the cast cannot truncate.
        self.percent.round().clamp(0.0, 100.0) as u32
    }
}

/// Reads and updates the context-budget state of one project.
#[derive(Debug, Clone)]
pub struct ContextMonitor {
    state_path: PathBuf,
    bridge_path: PathBuf,
    rules: SampleRules,
    bridge_freshness: Duration,
    window_chars: u64,
    lock: LockOptions,
}

impl ContextMonitor {
    pub fn new(layout: &PlanningLayout, config: &ContextConfig, lock: LockOptions) -> Self {
        Self {
            state_path: layout.context_state_path(),
            bridge_path: layout.bridge_path(),
            rules: SampleRules::from(config),
            bridge_freshness: Duration::from_secs(config.bridge_freshness_secs),
            window_chars: config.context_window_chars.max(1),
            lock,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Current state; a missing file reads as the default state.
    pub fn load_state(&self) -> Result<ContextBudgetState, ContextError> {
        match std::fs::read_to_string(&self.state_path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| ContextError::Corrupt {
                path: self.state_path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ContextBudgetState::default()),
            Err(source) => Err(ContextError::Read {
                path: self.state_path.clone(),
                source,
            }),
        }
    }

    /// Session start: replace whatever is there with a fresh state.
    pub fn reset(&self) -> Result<ContextBudgetState, ContextError> {
        let _lock = FileLock::acquire(&self.state_path, &self.lock)?;
        let state = ContextBudgetState::default();
        self.persist(&state)?;
        tracing::debug!(path = %self.state_path.display(), "Context budget state reset");
        Ok(state)
    }

    /// Add `chars` to the characters read this session.
    pub fn record_read(&self, chars: u64) -> Result<ContextBudgetState, ContextError> {
        let (state, ()) = self.mutate(|state| {
            state.chars_read = state.chars_read.saturating_add(chars);
        })?;
        Ok(state)
    }

    /// Heuristic percentage from characters read.
    pub fn heuristic_percent(&self, chars_read: u64) -> u32 {
        let percent = chars_read.saturating_mul(100) / self.window_chars;
        percent.min(100) as u32
    }

    /// The bridge reading and its age, if the file exists and parses.
    pub fn read_bridge(&self, now: DateTime<Utc>) -> Option<(BridgeReading, Duration)> {
        let content = std::fs::read_to_string(&self.bridge_path).ok()?;
        let reading: BridgeReading = match serde_json::from_str(&content) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(path = %self.bridge_path.display(), error = %e, "Ignoring unreadable context bridge");
                return None;
            }
        };
        let taken_at = match reading.timestamp {
            Some(ts) => ts,
            None => DateTime::<Utc>::from(std::fs::metadata(&self.bridge_path).ok()?.modified().ok()?),
        };
        let age = now.signed_duration_since(taken_at).to_std().unwrap_or(Duration::ZERO);
        Some((reading, age))
    }

    /// Resolve the percentage (fresh bridge, else heuristic) and sample it.
    pub fn observe(&self, now: DateTime<Utc>) -> Result<SampleOutcome, ContextError> {
        let bridge = self.read_bridge(now);
        let (_, outcome) = self.mutate(|state| {
            let (percent, source) = match &bridge {
                Some((reading, age)) if *age < self.bridge_freshness => {
                    state.bridge_hint = None;
                    (reading.percent_u32(), PercentSource::Bridge)
                }
                stale => {
                    if let Some((reading, age)) = stale {
                        tracing::debug!(age_secs = age.as_secs(), "Context bridge is stale, using heuristic");
                        let percent = reading.percent_u32();
                        state.bridge_hint = Some(BridgeHint {
                            percent,
                            tier: classify_tier(percent),
                        });
                    }
                    (self.heuristic_percent(state.chars_read), PercentSource::Heuristic)
                }
            };
            state.sample(percent, source, self.rules, now)
        })?;
        Ok(outcome)
    }

    /// Sample an explicitly supplied percentage.
    pub fn sample(
        &self,
        percent: u32,
        source: PercentSource,
        now: DateTime<Utc>,
    ) -> Result<SampleOutcome, ContextError> {
        let (_, outcome) = self.mutate(|state| state.sample(percent, source, self.rules, now))?;
        Ok(outcome)
    }

    /// Locked read → change → atomic write of the state file.
    fn mutate<T, F>(&self, change: F) -> Result<(ContextBudgetState, T), ContextError>
    where
        F: FnOnce(&mut ContextBudgetState) -> T,
    {
        let _lock = FileLock::acquire(&self.state_path, &self.lock)?;
        let mut state = self.load_state()?;
        let output = change(&mut state);
        self.persist(&state)?;
        Ok((state, output))
    }

    fn persist(&self, state: &ContextBudgetState) -> Result<(), ContextError> {
        let mut json = serde_json::to_string_pretty(state).map_err(|source| ContextError::Encode {
            path: self.state_path.clone(),
            source,
        })?;
        json.push('\n');
        write_atomic(&self.state_path, &json)?;
        Ok(())
    }
}

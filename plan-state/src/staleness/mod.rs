//! Has a plan's upstream input changed since it was planned?
//!
//! Each plan is judged in exactly one mode:
//! - fingerprint mode when its metadata carries `fingerprints`
//! - timestamp mode when it only declares `depends_on`
//! - otherwise it cannot go stale
//!
//! Read-only. Staleness is a result value, not an error.

mod fingerprint;

pub use fingerprint::{
    FINGERPRINTS_KEY, Fingerprint, FingerprintCheck, record_fingerprints, render_fingerprint_block,
};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{PlanStateError, Result};
use crate::layout::{PhaseDir, PlanArtifact, PlanIndex, PlanningLayout, resolve_in};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessMode {
    Fingerprint,
    Timestamp,
    None,
}

/// Verdict for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStaleness {
    pub plan: String,
    pub path: PathBuf,
    pub stale: bool,
    pub mode: StalenessMode,
    pub reason: String,
}

/// Verdict for a whole phase: stale if any plan is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStaleness {
    pub phase: String,
    pub phase_dir: PathBuf,
    pub stale: bool,
    pub plans: Vec<PlanStaleness>,
}

impl PhaseStaleness {
    pub fn stale_plans(&self) -> impl Iterator<Item = &PlanStaleness> {
        self.plans.iter().filter(|p| p.stale)
    }
}

/// Check every plan of the phase `token` resolves to.
pub fn check_phase(layout: &PlanningLayout, token: &str) -> Result<PhaseStaleness> {
    let _timer = crate::timing::Timer::new("staleness.check_phase");
    let phases = layout.resolver().list()?;
    let phase = resolve_in(&phases, token)
        .ok_or_else(|| PlanStateError::PhaseNotFound(token.to_string()))?;

    let mut plans = Vec::new();
    for plan in PlanIndex::for_phase(&phase.path)? {
        plans.push(check_plan(layout.project_root(), &phases, &plan)?);
    }
    let stale = plans.iter().any(|p| p.stale);
    tracing::debug!(phase = %phase.name, plans = plans.len(), stale, "Staleness check complete");

    Ok(PhaseStaleness {
        phase: phase.name.clone(),
        phase_dir: phase.path.clone(),
        stale,
        plans,
    })
}

/// Judge one plan. Fingerprint paths resolve against `project_root`,
/// dependency tokens against `phases`.
pub fn check_plan(
    project_root: &Path,
    phases: &[PhaseDir],
    plan: &PlanArtifact,
) -> Result<PlanStaleness> {
    let verdict = |stale: bool, mode: StalenessMode, reason: String| PlanStaleness {
        plan: plan.id.clone(),
        path: plan.path.clone(),
        stale,
        mode,
        reason,
    };

    if !plan.fingerprints.is_empty() {
        for fp in &plan.fingerprints {
            match fp.check(project_root) {
                FingerprintCheck::Unchanged => {}
                FingerprintCheck::Missing => {
                    return Ok(verdict(
                        true,
                        StalenessMode::Fingerprint,
                        format!("{} is missing", fp.path),
                    ));
                }
                FingerprintCheck::Changed { size, mtime } => {
                    return Ok(verdict(
                        true,
                        StalenessMode::Fingerprint,
                        format!(
                            "{} changed (size {} -> {size}, mtime {} -> {mtime})",
                            fp.path, fp.size, fp.mtime
                        ),
                    ));
                }
            }
        }
        return Ok(verdict(
            false,
            StalenessMode::Fingerprint,
            "fingerprints match".to_string(),
        ));
    }

    if plan.depends_on.is_empty() {
        return Ok(verdict(
            false,
            StalenessMode::None,
            "no fingerprints or dependencies".to_string(),
        ));
    }

    let plan_mtime = modified(&plan.path)?;
    let mut unresolved = Vec::new();
    for token in &plan.depends_on {
        let Some(dep) = resolve_in(phases, token) else {
            unresolved.push(token.as_str());
            continue;
        };
        for artifact in PlanIndex::completion_artifacts(&dep.path)? {
            if modified(&artifact)? > plan_mtime {
                let name = artifact
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                return Ok(verdict(
                    true,
                    StalenessMode::Timestamp,
                    format!("dependency {token} ({}) has newer {name}", dep.name),
                ));
            }
        }
    }

    let reason = if unresolved.is_empty() {
        "dependencies unchanged since planning".to_string()
    } else {
        tracing::warn!(plan = %plan.id, unresolved = ?unresolved, "Unresolved plan dependencies");
        format!("unresolved dependencies: {}", unresolved.join(", "))
    };
    Ok(verdict(false, StalenessMode::Timestamp, reason))
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| PlanStateError::FileRead {
            path: path.to_path_buf(),
            source,
        })
}

//! Registry vs disk: every phase slug the roadmap mentions should have a
//! directory, and every phase directory should be mentioned.

use regex_lite::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::{PlanStateError, Result};
use crate::layout::{PhaseDir, PlanningLayout};

#[allow(clippy::expect_used)]
fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d+(?:\.\d+)?-[A-Za-z][A-Za-z0-9_-]*").expect("valid phase slug regex")
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilesystemDrift {
    pub ok: bool,
    /// Referenced in the registry, absent on disk.
    pub missing_dirs: Vec<String>,
    /// On disk, referenced nowhere in the registry.
    pub orphaned_dirs: Vec<String>,
}

/// Phase slugs (`03-auth`, `3.1-hotfix`) mentioned anywhere in `registry`.
pub fn referenced_slugs(registry: &str) -> BTreeSet<String> {
    slug_re()
        .find_iter(registry)
        .map(|m| m.as_str().trim_end_matches(['-', '_']).to_string())
        .collect()
}

/// Compare registry references against the phase directories on disk.
pub fn compare_registry_to_dirs(registry: &str, dirs: &[PhaseDir]) -> FilesystemDrift {
    let referenced = referenced_slugs(registry);
    let on_disk: BTreeSet<&str> = dirs.iter().map(|d| d.name.as_str()).collect();

    let missing_dirs: Vec<String> = referenced
        .iter()
        .filter(|slug| !on_disk.contains(slug.as_str()))
        .cloned()
        .collect();
    let orphaned_dirs: Vec<String> = dirs
        .iter()
        .filter(|d| d.number.is_some() && !referenced.contains(&d.name))
        .map(|d| d.name.clone())
        .collect();

    FilesystemDrift {
        ok: missing_dirs.is_empty() && orphaned_dirs.is_empty(),
        missing_dirs,
        orphaned_dirs,
    }
}

/// Check the roadmap against `phases/`.
pub fn check_filesystem(layout: &PlanningLayout) -> Result<FilesystemDrift> {
    let registry_path = layout.roadmap_path();
    let registry =
        std::fs::read_to_string(&registry_path).map_err(|source| PlanStateError::FileRead {
            path: registry_path,
            source,
        })?;
    let dirs = layout.resolver().list()?;
    let result = compare_registry_to_dirs(&registry, &dirs);
    if !result.ok {
        tracing::warn!(
            missing = ?result.missing_dirs,
            orphaned = ?result.orphaned_dirs,
            "Phase directories disagree with the roadmap"
        );
    }
    Ok(result)
}

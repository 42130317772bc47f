//! Where planning documents live on disk.
//!
//! ```text
//! <project>/.planning/
//!   STATE.md
//!   ROADMAP.md
//!   context-budget.json
//!   context-bridge.json
//!   .active-session
//!   phases/
//!     02-setup/
//!       02-01-PLAN.md
//!       02-01-SUMMARY.md
//!       CHECKPOINT.json
//!     03.1-auth-hotfix/
//! ```
//!
//! Phase directories are named `<number>-<slug>`; the number may carry a
//! decimal sub-phase (`03.1`). Numbers compare after stripping leading zeros.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LayoutConfig;
use crate::error::{PlanStateError, Result};
use crate::frontmatter::Document;
use crate::staleness::Fingerprint;

/// Resolved paths for one project.
#[derive(Debug, Clone)]
pub struct PlanningLayout {
    project_root: PathBuf,
    config: LayoutConfig,
}

impl PlanningLayout {
    pub fn new(project_root: impl Into<PathBuf>, config: &LayoutConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config: config.clone(),
        }
    }

    pub fn with_defaults(project_root: impl Into<PathBuf>) -> Self {
        Self::new(project_root, &LayoutConfig::default())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn planning_dir(&self) -> PathBuf {
        self.project_root.join(&self.config.planning_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.planning_dir().join(&self.config.state_file)
    }

    pub fn roadmap_path(&self) -> PathBuf {
        self.planning_dir().join(&self.config.roadmap_file)
    }

    pub fn phases_dir(&self) -> PathBuf {
        self.planning_dir().join(&self.config.phases_dir)
    }

    pub fn context_state_path(&self) -> PathBuf {
        self.planning_dir().join(&self.config.context_state_file)
    }

    pub fn bridge_path(&self) -> PathBuf {
        self.planning_dir().join(&self.config.bridge_file)
    }

    pub fn session_marker_path(&self) -> PathBuf {
        self.planning_dir().join(&self.config.session_marker_file)
    }

    pub fn checkpoint_path(&self, phase_dir: &Path) -> PathBuf {
        phase_dir.join(&self.config.checkpoint_file)
    }

    pub fn resolver(&self) -> PhaseResolver {
        PhaseResolver::new(self.phases_dir())
    }
}

/// Canonical phase number: leading `\d+(\.\d+)*` token with leading zeros
/// stripped from the integer part. `"03.1"` → `"3.1"`, `"02-auth"` → `"2"`.
pub fn normalize_phase_number(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let token_len = raw
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*c == '.' && *i > 0))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    let token = raw[..token_len].trim_end_matches('.');
    let (int_part, rest) = match token.split_once('.') {
        Some((int_part, rest)) => (int_part, Some(rest)),
        None => (token, None),
    };
    if int_part.is_empty() {
        return None;
    }
    let trimmed = int_part.trim_start_matches('0');
    let int_part = if trimmed.is_empty() { "0" } else { trimmed };
    Some(match rest {
        Some(rest) if !rest.is_empty() => format!("{int_part}.{rest}"),
        _ => int_part.to_string(),
    })
}

/// One on-disk phase directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDir {
    /// Directory name, e.g. `03-auth`.
    pub name: String,
    /// Normalized phase number when the name has a numeric prefix.
    pub number: Option<String>,
    pub path: PathBuf,
}

impl PhaseDir {
    fn from_path(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let number = name
            .starts_with(|c: char| c.is_ascii_digit())
            .then(|| normalize_phase_number(&name))
            .flatten();
        Some(Self { name, number, path })
    }
}

/// Maps phase tokens (numbers, slugs, names) to phase directories.
#[derive(Debug, Clone)]
pub struct PhaseResolver {
    phases_dir: PathBuf,
}

impl PhaseResolver {
    pub fn new(phases_dir: impl Into<PathBuf>) -> Self {
        Self {
            phases_dir: phases_dir.into(),
        }
    }

    pub fn phases_dir(&self) -> &Path {
        &self.phases_dir
    }

    /// All phase directories, sorted by name.
    pub fn list(&self) -> Result<Vec<PhaseDir>> {
        if !self.phases_dir.is_dir() {
            return Err(PlanStateError::DirectoryMissing(self.phases_dir.clone()));
        }
        let mut dirs = Vec::new();
        for entry in WalkDir::new(&self.phases_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| PlanStateError::DirectoryRead {
                path: self.phases_dir.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_dir()
                && let Some(dir) = PhaseDir::from_path(entry.into_path())
            {
                dirs.push(dir);
            }
        }
        Ok(dirs)
    }

    /// Resolve `token`: numeric prefix first, then exact name, then substring.
    pub fn resolve(&self, token: &str) -> Result<Option<PhaseDir>> {
        let dirs = self.list()?;
        Ok(resolve_in(&dirs, token).cloned())
    }

    /// Like [`resolve`](Self::resolve) but a miss is an error.
    pub fn require(&self, token: &str) -> Result<PhaseDir> {
        self.resolve(token)?
            .ok_or_else(|| PlanStateError::PhaseNotFound(token.to_string()))
    }
}

pub(crate) fn resolve_in<'a>(dirs: &'a [PhaseDir], token: &str) -> Option<&'a PhaseDir> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.starts_with(|c: char| c.is_ascii_digit())
        && let Some(number) = normalize_phase_number(token)
        && let Some(dir) = dirs.iter().find(|d| d.number.as_deref() == Some(number.as_str()))
    {
        return Some(dir);
    }
    dirs.iter()
        .find(|d| d.name == token)
        .or_else(|| dirs.iter().find(|d| d.name.contains(token)))
}

/// A plan artifact inside a phase directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanArtifact {
    /// `plan` metadata field, else the file stem without `-PLAN`.
    pub id: String,
    pub path: PathBuf,
    /// Declared dependency tokens (`depends_on`).
    pub depends_on: Vec<String>,
    /// Input snapshots recorded at planning time.
    pub fingerprints: Vec<Fingerprint>,
}

/// Lists plan artifacts and completion artifacts of a phase directory.
pub struct PlanIndex;

impl PlanIndex {
    /// Every `*-PLAN.md` (or `PLAN.md`) in `phase_dir`, sorted by file name.
    pub fn for_phase(phase_dir: &Path) -> Result<Vec<PlanArtifact>> {
        let mut plans = Vec::new();
        for path in files_in(phase_dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name != "PLAN.md" && !name.ends_with("-PLAN.md") {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|source| PlanStateError::FileRead {
                path: path.clone(),
                source,
            })?;
            let doc = Document::parse(&text)?;
            let fm = doc.frontmatter();
            let id = fm.get_str("plan").map_or_else(
                || name.trim_end_matches(".md").trim_end_matches("PLAN").trim_end_matches('-').to_string(),
                str::to_string,
            );
            let fingerprints = fm
                .get("fingerprints")
                .and_then(|v| v.as_list())
                .map(|items| items.iter().filter_map(Fingerprint::from_value).collect())
                .unwrap_or_default();
            plans.push(PlanArtifact {
                id,
                depends_on: fm.get_list("depends_on"),
                fingerprints,
                path,
            });
        }
        Ok(plans)
    }

    /// Completion artifacts (`*SUMMARY.md`) of a phase directory.
    pub fn completion_artifacts(phase_dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(files_in(phase_dir)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("SUMMARY.md"))
            })
            .collect())
    }
}

fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PlanStateError::DirectoryMissing(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| PlanStateError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

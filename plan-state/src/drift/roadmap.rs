//! STATE vs ROADMAP: does the roadmap table agree on the current phase's status?
//!
//! Read-only. A mismatch is reported for a human or agent to reconcile;
//! the roadmap is never rewritten automatically.

use serde::Serialize;
use std::path::Path;

use crate::error::{PlanStateError, Result};
use crate::frontmatter::{Document, FrontmatterError};
use crate::layout::normalize_phase_number;
use crate::status::normalize_status;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RoadmapDrift {
    InSync {
        phase: String,
        status: String,
    },
    OutOfSync {
        phase: String,
        state_status: String,
        roadmap_status: String,
        message: String,
    },
    /// The current phase has no roadmap row at all.
    PhaseNotFound { phase: String, message: String },
    /// STATE carries no phase or status to compare.
    Skipped { reason: String },
}

impl RoadmapDrift {
    pub fn is_drift(&self) -> bool {
        matches!(
            self,
            RoadmapDrift::OutOfSync { .. } | RoadmapDrift::PhaseNotFound { .. }
        )
    }
}

/// One data row of a roadmap table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadmapRow {
    /// Normalized phase number.
    pub phase: String,
    pub status: String,
}

/// Rows of every markdown table whose header names both a phase and a
/// status column.
pub fn roadmap_rows(text: &str) -> Vec<RoadmapRow> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut rows = Vec::new();
    let mut columns: Option<(usize, usize)> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if !line.starts_with('|') {
            columns = None;
            i += 1;
            continue;
        }
        let cells = table_cells(line);

        if lines.get(i + 1).is_some_and(|next| is_separator(next)) {
            columns = header_columns(&cells);
            i += 2;
            continue;
        }

        if let Some((phase_col, status_col)) = columns
            && let (Some(phase_cell), Some(status_cell)) = (cells.get(phase_col), cells.get(status_col))
            && let Some(phase) = phase_from_cell(phase_cell)
        {
            rows.push(RoadmapRow {
                phase,
                status: clean_cell(status_cell).to_string(),
            });
        }
        i += 1;
    }
    rows
}

fn table_cells(line: &str) -> Vec<&str> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(str::trim).collect()
}

fn is_separator(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn header_columns(cells: &[&str]) -> Option<(usize, usize)> {
    let find = |name: &str| {
        cells
            .iter()
            .position(|c| clean_cell(c).to_lowercase().contains(name))
    };
    Some((find("phase")?, find("status")?))
}

/// Strip markdown emphasis, code ticks and decoration around a cell value.
fn clean_cell(cell: &str) -> &str {
    cell.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
}

fn phase_from_cell(cell: &str) -> Option<String> {
    let start = cell.find(|c: char| c.is_ascii_digit())?;
    normalize_phase_number(&cell[start..])
}

/// Compare the STATE metadata against the roadmap table.
pub fn compare_state_to_roadmap(
    state_text: &str,
    roadmap_text: &str,
) -> std::result::Result<RoadmapDrift, FrontmatterError> {
    let doc = Document::parse(state_text)?;
    let fm = doc.frontmatter();
    let Some(phase) = fm.get_str("current_phase").and_then(normalize_phase_number) else {
        return Ok(RoadmapDrift::Skipped {
            reason: "state has no current_phase".to_string(),
        });
    };
    let Some(state_status) = fm.get_str("status") else {
        return Ok(RoadmapDrift::Skipped {
            reason: "state has no status".to_string(),
        });
    };

    let rows = roadmap_rows(roadmap_text);
    let Some(row) = rows.iter().find(|r| r.phase == phase) else {
        return Ok(RoadmapDrift::PhaseNotFound {
            message: format!("Phase {phase} is not listed in the roadmap table"),
            phase,
        });
    };

    if normalize_status(state_status) == normalize_status(&row.status) {
        return Ok(RoadmapDrift::InSync {
            phase,
            status: state_status.to_string(),
        });
    }

    Ok(RoadmapDrift::OutOfSync {
        message: format!(
            "Phase {phase}: state says '{state_status}' but roadmap says '{}'",
            row.status
        ),
        phase,
        state_status: state_status.to_string(),
        roadmap_status: row.status.clone(),
    })
}

/// Read both files and compare them. Neither file is modified.
pub fn check_roadmap_files(state_path: &Path, roadmap_path: &Path) -> Result<RoadmapDrift> {
    let read = |path: &Path| {
        std::fs::read_to_string(path).map_err(|source| PlanStateError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    };
    let result = compare_state_to_roadmap(&read(state_path)?, &read(roadmap_path)?)?;
    if result.is_drift() {
        tracing::warn!(?result, "State and roadmap disagree");
    }
    Ok(result)
}

//! Metadata vs body drift inside STATE.md.
//!
//! Metadata is authoritative. The body carries a derived `Phase: X of Y`
//! line and a `Status: ...` line; when the phase line disagrees it is
//! rewritten in place, and the status line is re-derived in the same pass.
//! Everything else in the document, the metadata block included, is left
//! byte-for-byte intact.

use regex_lite::{Captures, Regex};
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{PlanStateError, Result};
use crate::frontmatter::{Document, FrontmatterError};
use crate::layout::normalize_phase_number;
use crate::persist::{LockOptions, locked_update};
use crate::status::normalize_status;

#[allow(clippy::expect_used)]
fn phase_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<lead>\s*(?:[-*]\s+)?\**Phase:\**\s*)(?P<num>\d+(?:\.\d+)*)(?P<of>\s+of\s+(?P<total>\d+))?(?P<rest>.*)$",
        )
        .expect("valid phase line regex")
    })
}

#[allow(clippy::expect_used)]
fn status_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<lead>\s*(?:[-*]\s+)?\**Status:\**\s*)(?P<value>.*?)\s*$")
            .expect("valid status line regex")
    })
}

/// One rewritten body line (1-based within the whole document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineChange {
    pub line: usize,
    pub before: String,
    pub after: String,
}

/// Outcome of reconciling one STATE document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDrift {
    pub drift: bool,
    pub metadata_phase: Option<String>,
    pub body_phase: Option<String>,
    pub changes: Vec<LineChange>,
}

/// `in-progress` → `In Progress`
pub fn display_status(status: &str) -> String {
    status
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Bring the derived body lines of `text` in line with its metadata.
///
/// Returns the (possibly identical) new text and what changed. Running it
/// on its own output changes nothing.
pub fn reconcile_state(text: &str) -> std::result::Result<(String, StateDrift), FrontmatterError> {
    let doc = Document::parse(text)?;
    let fm = doc.frontmatter();
    let mut report = StateDrift::default();

    let Some(meta_phase) = fm.get_str("current_phase").and_then(normalize_phase_number) else {
        return Ok((text.to_string(), report));
    };
    report.metadata_phase = Some(meta_phase.clone());
    let meta_total = fm.get_str("total_phases").map(str::trim).map(str::to_string);
    let meta_status = fm.get_str("status");

    let header_lines = text.len() - doc.body().len();
    let first_body_line = text[..header_lines].matches('\n').count() + 1;

    let mut lines: Vec<String> = doc.body().split_inclusive('\n').map(str::to_string).collect();
    let mut phase_rewritten = false;

    let phase_match = lines.iter().enumerate().find_map(|(idx, segment)| {
        let caps = phase_line_re().captures(split_ending(segment).0)?;
        let body_num = normalize_phase_number(&caps["num"]);
        let body_total = caps.name("total").map(|m| m.as_str());
        let total_ok = meta_total.as_deref().is_none_or(|t| Some(t) == body_total);
        let disagrees = body_num.as_deref() != Some(meta_phase.as_str()) || !total_ok;
        let after = disagrees.then(|| rewrite_phase_line(&caps, &meta_phase, meta_total.as_deref()));
        Some((idx, body_num, after))
    });
    if let Some((idx, body_num, after)) = phase_match {
        report.body_phase = body_num;
        if let Some(after) = after {
            report
                .changes
                .push(replace_line(&mut lines[idx], after, first_body_line + idx));
            phase_rewritten = true;
        }
    }

    // The status line is re-derived only alongside a phase repair, wherever
    // it sits relative to the phase line.
    if phase_rewritten && let Some(status) = meta_status {
        let status_match = lines.iter().enumerate().find_map(|(idx, segment)| {
            let caps = status_line_re().captures(split_ending(segment).0)?;
            let disagrees = normalize_status(&caps["value"]) != normalize_status(status);
            let after = disagrees.then(|| format!("{}{}", &caps["lead"], display_status(status)));
            Some((idx, after))
        });
        if let Some((idx, Some(after))) = status_match {
            report
                .changes
                .push(replace_line(&mut lines[idx], after, first_body_line + idx));
        }
    }
    report.changes.sort_by_key(|change| change.line);

    report.drift = !report.changes.is_empty();
    if !report.drift {
        return Ok((text.to_string(), report));
    }
    Ok((doc.with_body(&lines.concat()), report))
}

fn rewrite_phase_line(caps: &Captures<'_>, phase: &str, total: Option<&str>) -> String {
    let of = match (total, caps.name("of")) {
        (Some(total), _) => format!(" of {total}"),
        (None, Some(existing)) => existing.as_str().to_string(),
        (None, None) => String::new(),
    };
    format!("{}{phase}{of}{}", &caps["lead"], &caps["rest"])
}

/// Swap the content of `segment` for `after`, keeping its line ending.
fn replace_line(segment: &mut String, after: String, line: usize) -> LineChange {
    let (content, ending) = split_ending(segment);
    let before = content.to_string();
    let next = format!("{after}{ending}");
    *segment = next;
    LineChange { line, before, after }
}

fn split_ending(segment: &str) -> (&str, &str) {
    if let Some(content) = segment.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = segment.strip_suffix('\n') {
        (content, "\n")
    } else {
        (segment, "")
    }
}

/// Reconcile the STATE file at `path` under its lock, persisting any repair.
pub fn repair_state_file(path: &Path, options: &LockOptions) -> Result<StateDrift> {
    if !path.is_file() {
        return Err(PlanStateError::FileRead {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }

    let mut outcome: std::result::Result<StateDrift, FrontmatterError> = Ok(StateDrift::default());
    crate::measure_time!("drift.repair_state_file", {
        locked_update(path, options, |current| match reconcile_state(current) {
            Ok((next, report)) => {
                outcome = Ok(report);
                next
            }
            Err(e) => {
                outcome = Err(e);
                current.to_string()
            }
        })
    })?;
    let report = outcome?;

    if report.drift {
        tracing::info!(
            path = %path.display(),
            lines = report.changes.len(),
            "Repaired derived lines in state document"
        );
    }
    Ok(report)
}

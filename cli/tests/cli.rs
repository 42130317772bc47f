//! plankit CLI integration tests
//!
//! ## Exit Codes
//! - 0: Nothing to act on
//! - 1: Advisory
//! - 3: Error

use std::fs;
use std::path::Path;

use anyhow::Result;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

/// A fresh project with an empty `.planning/phases/`.
fn project() -> Result<TempDir> {
    let root = TempDir::new()?;
    fs::create_dir_all(root.path().join(".planning/phases"))?;
    Ok(root)
}

fn plankit(root: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("plankit")?;
    cmd.arg("-C").arg(root);
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

/// Run and return (exit code, parsed stdout).
fn run(root: &Path, args: &[&str]) -> Result<(i32, JsonValue)> {
    let output = plankit(root)?.args(args).output()?;
    let json: JsonValue = serde_json::from_slice(&output.stdout)?;
    Ok((output.status.code().unwrap_or(-1), json))
}

#[test]
fn drift_state_repairs_then_reports_clean() -> Result<()> {
    let root = project()?;
    let state = root.path().join(".planning/STATE.md");
    fs::write(&state, "---\ncurrent_phase: 3\nstatus: built\n---\nPhase: 2 of 5\n")?;

    let (code, json) = run(root.path(), &["drift", "state"])?;
    assert_eq!(code, 1);
    assert_eq!(json["drift"], true);
    assert_eq!(fs::read_to_string(&state)?, "---\ncurrent_phase: 3\nstatus: built\n---\nPhase: 3 of 5\n");

    let (code, json) = run(root.path(), &["drift", "state"])?;
    assert_eq!(code, 0);
    assert_eq!(json["drift"], false);
    Ok(())
}

#[test]
fn missing_state_file_is_an_error() -> Result<()> {
    let root = project()?;
    plankit(root.path())?
        .args(["drift", "state"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"error\""));
    Ok(())
}

#[test]
fn filesystem_drift_without_phases_dir_is_an_error() -> Result<()> {
    let root = TempDir::new()?;
    fs::create_dir_all(root.path().join(".planning"))?;
    fs::write(root.path().join(".planning/ROADMAP.md"), "- 01-setup\n")?;

    let (code, json) = run(root.path(), &["drift", "fs"])?;
    assert_eq!(code, 3);
    assert!(json["error"].is_string());
    Ok(())
}

#[test]
fn roadmap_mismatch_is_advisory() -> Result<()> {
    let root = project()?;
    fs::write(
        root.path().join(".planning/STATE.md"),
        "---\ncurrent_phase: 1\nstatus: verified\n---\n",
    )?;
    fs::write(
        root.path().join(".planning/ROADMAP.md"),
        "| Phase | Status |\n|---|---|\n| 01 | built |\n",
    )?;

    let (code, json) = run(root.path(), &["drift", "roadmap"])?;
    assert_eq!(code, 1);
    assert_eq!(json["result"], "out_of_sync");
    assert_eq!(json["roadmap_status"], "built");
    Ok(())
}

#[test]
fn checkpoint_lifecycle() -> Result<()> {
    let root = project()?;
    fs::create_dir_all(root.path().join(".planning/phases/02-api"))?;

    let (code, _) = run(root.path(), &["checkpoint", "init", "2", "02-01", "02-02"])?;
    assert_eq!(code, 0);

    let (code, json) = run(
        root.path(),
        &["checkpoint", "update", "2", "--resolved", "02-01", "--sha", "abc123"],
    )?;
    assert_eq!(code, 0);
    assert_eq!(json["manifest"]["plans"], serde_json::json!(["02-02"]));
    assert_eq!(json["manifest"]["last_good_commit"], "abc123");

    let (code, json) = run(root.path(), &["checkpoint", "show", "02-api"])?;
    assert_eq!(code, 0);
    assert_eq!(json["manifest"]["checkpoints_resolved"], serde_json::json!(["02-01"]));
    Ok(())
}

#[test]
fn checkpoint_update_without_fields_is_rejected() -> Result<()> {
    let root = project()?;
    fs::create_dir_all(root.path().join(".planning/phases/01-setup"))?;
    run(root.path(), &["checkpoint", "init", "1", "01-01"])?;

    let (code, json) = run(root.path(), &["checkpoint", "update", "1"])?;
    assert_eq!(code, 3);
    assert!(json["error"].as_str().is_some_and(|e| e.contains("--wave")));
    Ok(())
}

#[test]
fn context_sample_warns_once_per_tier() -> Result<()> {
    let root = project()?;

    let (code, json) = run(root.path(), &["context", "sample", "--percent", "60"])?;
    assert_eq!(code, 1);
    assert_eq!(json["tier"], "DEGRADING");
    assert!(json["message"].is_string());

    let (code, json) = run(root.path(), &["context", "sample", "--percent", "62"])?;
    assert_eq!(code, 0);
    assert_eq!(json["should_warn"], false);
    Ok(())
}

#[test]
fn context_reset_clears_counters() -> Result<()> {
    let root = project()?;
    run(root.path(), &["context", "read", "4000"])?;

    let (code, json) = run(root.path(), &["context", "reset"])?;
    assert_eq!(code, 0);
    assert_eq!(json["chars_read"], 0);
    Ok(())
}

#[test]
fn second_session_holder_conflicts() -> Result<()> {
    let root = project()?;

    let (code, _) = run(root.path(), &["session", "claim", "alpha"])?;
    assert_eq!(code, 0);
    let (code, _) = run(root.path(), &["session", "claim", "beta"])?;
    assert_eq!(code, 1);

    // The conflicting claim still took the marker over.
    let (_, json) = run(root.path(), &["session", "release", "alpha"])?;
    assert_eq!(json["released"], false);
    let (_, json) = run(root.path(), &["session", "release", "beta"])?;
    assert_eq!(json["released"], true);
    let (code, _) = run(root.path(), &["session", "claim", "gamma"])?;
    assert_eq!(code, 0);
    Ok(())
}

#[test]
fn stale_reports_changed_fingerprint() -> Result<()> {
    let root = project()?;
    fs::write(root.path().join("input.txt"), "v1")?;
    let (code, json) = run(root.path(), &["fingerprint", "input.txt"])?;
    assert_eq!(code, 0);
    let block = json["block"].as_str().unwrap_or_default().to_string();

    let phase = root.path().join(".planning/phases/01-setup");
    fs::create_dir_all(&phase)?;
    fs::write(phase.join("01-01-PLAN.md"), format!("---\n{block}---\n# Plan\n"))?;

    let (code, _) = run(root.path(), &["stale", "1"])?;
    assert_eq!(code, 0);

    fs::write(root.path().join("input.txt"), "version two")?;
    let (code, json) = run(root.path(), &["stale", "1"])?;
    assert_eq!(code, 1);
    assert_eq!(json["stale"], true);
    Ok(())
}

#[test]
fn unknown_status_is_an_error() -> Result<()> {
    let root = project()?;
    plankit(root.path())?
        .args(["status", "check", "planned", "shipped"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("unknown phase status"));
    Ok(())
}

//! End-to-end behaviour of the planning state engine against a real
//! planning directory on disk.

use chrono::Utc;
use filetime::FileTime;
use plankit_state::checkpoint::{CheckpointLedger, ManifestUpdate};
use plankit_state::config::ContextConfig;
use plankit_state::context::{ContextMonitor, PercentSource, Tier};
use plankit_state::drift::{RoadmapDrift, check_filesystem, check_roadmap_files, repair_state_file};
use plankit_state::persist::{LockOptions, lock_path_for, locked_update};
use plankit_state::staleness::{StalenessMode, check_phase, record_fingerprints, render_fingerprint_block};
use plankit_state::PlanningLayout;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn project() -> (TempDir, PlanningLayout) {
    let tmp = TempDir::new().expect("temp dir");
    let layout = PlanningLayout::with_defaults(tmp.path());
    std::fs::create_dir_all(layout.phases_dir()).expect("mkdir phases");
    (tmp, layout)
}

fn write_at(path: &Path, content: &str, secs: i64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, content).expect("write");
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).expect("mtime");
}

#[test]
fn concurrent_locked_updates_keep_every_marker() {
    let (_tmp, layout) = project();
    let path = Arc::new(layout.state_path());
    let options = LockOptions {
        retries: 200,
        retry_delay: Duration::from_millis(2),
        stale_after: Duration::from_secs(60),
    };

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let path = Arc::clone(&path);
            std::thread::spawn(move || {
                locked_update(&path, &options, |current| format!("{current}marker-{i}\n"))
                    .expect("locked update");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let content = std::fs::read_to_string(path.as_ref()).expect("read");
    for i in 0..12 {
        let marker = format!("marker-{i}\n");
        assert_eq!(content.matches(&marker).count(), 1, "marker {i} in:\n{content}");
    }
    assert!(!lock_path_for(&path).exists());
}

#[test]
fn abandoned_lock_is_reclaimed() {
    let (_tmp, layout) = project();
    let path = layout.state_path();
    std::fs::write(&path, "old").expect("seed");
    let lock = lock_path_for(&path);
    std::fs::write(&lock, "99999").expect("seed lock");
    let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
    filetime::set_file_mtime(&lock, FileTime::from_system_time(an_hour_ago)).expect("age lock");

    let next = locked_update(&path, &LockOptions::default(), |_| "new".to_string()).expect("update");

    assert_eq!(next, "new");
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "new");
    assert!(!lock.exists());
}

#[test]
fn state_repair_is_idempotent_on_disk() {
    let (_tmp, layout) = project();
    let path = layout.state_path();
    std::fs::write(
        &path,
        "---\ncurrent_phase: 5\nstatus: needs-fixes\n---\nPhase: 4 of 7\nStatus: Built\n",
    )
    .expect("seed");

    let first = repair_state_file(&path, &LockOptions::default()).expect("first repair");
    let after_first = std::fs::read_to_string(&path).expect("read");
    let second = repair_state_file(&path, &LockOptions::default()).expect("second repair");

    assert!(first.drift);
    assert!(!second.drift);
    assert_eq!(
        after_first,
        "---\ncurrent_phase: 5\nstatus: needs-fixes\n---\nPhase: 5 of 7\nStatus: Needs Fixes\n"
    );
    assert_eq!(std::fs::read_to_string(&path).expect("read"), after_first);
}

#[test]
fn fingerprint_staleness_names_the_file() {
    let (tmp, layout) = project();
    let input = tmp.path().join("src/api.rs");
    write_at(&input, &"x".repeat(100), 1_700_000_000);
    let fps = record_fingerprints(tmp.path(), &["src/api.rs"]).expect("record");
    write_at(
        &layout.phases_dir().join("02-api/02-01-PLAN.md"),
        &format!("---\n{}---\n# Plan\n", render_fingerprint_block(&fps)),
        1_700_000_100,
    );

    let fresh = check_phase(&layout, "2").expect("check");
    assert!(!fresh.stale);

    write_at(&input, &"y".repeat(120), 1_700_000_200);
    let changed = check_phase(&layout, "2").expect("check");
    assert!(changed.stale);
    assert_eq!(changed.plans[0].mode, StalenessMode::Fingerprint);
    assert!(changed.plans[0].reason.contains("src/api.rs"));

    std::fs::remove_file(&input).expect("remove");
    let missing = check_phase(&layout, "2").expect("check");
    assert!(missing.stale);
    assert!(missing.plans[0].reason.contains("missing"));
}

#[test]
fn timestamp_staleness_compares_summary_to_plan() {
    let (_tmp, layout) = project();
    let phases = layout.phases_dir();
    let summary = phases.join("01-db/01-01-SUMMARY.md");
    write_at(&summary, "done", 1_000);
    write_at(&phases.join("02-api/02-01-PLAN.md"), "---\ndepends_on: [01]\n---\n", 2_000);
    write_at(&phases.join("02-api/02-02-PLAN.md"), "# no deps\n", 2_000);

    let before = check_phase(&layout, "02-api").expect("check");
    assert!(!before.stale);

    filetime::set_file_mtime(&summary, FileTime::from_unix_time(3_000, 0)).expect("mtime");
    let after = check_phase(&layout, "02-api").expect("check");

    assert!(after.stale);
    assert_eq!(after.stale_plans().count(), 1);
    assert_eq!(after.plans[0].plan, "02-01");
    assert!(!after.plans[1].stale);
}

#[test]
fn six_degrading_samples_warn_twice() {
    let (_tmp, layout) = project();
    let monitor = ContextMonitor::new(&layout, &ContextConfig::default(), LockOptions::default());

    let warns: Vec<bool> = (0..6)
        .map(|_| {
            monitor
                .sample(60, PercentSource::Bridge, Utc::now())
                .expect("sample")
                .should_warn
        })
        .collect();

    assert_eq!(warns, vec![true, false, false, false, false, true]);
    let state = monitor.load_state().expect("state");
    assert_eq!(state.last_warned_tier, Tier::Degrading);
    assert_eq!(state.warnings_issued.len(), 2);
}

#[test]
fn context_state_is_created_on_a_bare_project() {
    let tmp = TempDir::new().expect("temp dir");
    let layout = PlanningLayout::with_defaults(tmp.path());
    assert!(!layout.planning_dir().exists());
    let monitor = ContextMonitor::new(&layout, &ContextConfig::default(), LockOptions::default());

    let outcome = monitor
        .sample(20, PercentSource::Bridge, Utc::now())
        .expect("sample");

    assert_eq!(outcome.tier, Tier::Peak);
    assert!(layout.context_state_path().exists());
    assert_eq!(monitor.load_state().expect("state").tool_calls, 1);
}

#[test]
fn checkpoint_resolve_and_commit() {
    let (_tmp, layout) = project();
    std::fs::create_dir_all(layout.phases_dir().join("03-auth")).expect("mkdir");
    let ledger = CheckpointLedger::new(layout, LockOptions::default());
    ledger
        .init("3", vec!["a".into(), "b".into(), "c".into()])
        .expect("init");

    let manifest = ledger
        .update(
            "3",
            &ManifestUpdate {
                resolved: Some("b".into()),
                sha: Some("deadbeef".into()),
                ..Default::default()
            },
        )
        .expect("update");

    assert_eq!(manifest.plans, vec!["a", "c"]);
    assert_eq!(manifest.checkpoints_resolved, vec!["b"]);
    assert_eq!(manifest.last_good_commit.as_deref(), Some("deadbeef"));
    assert_eq!(manifest.commit_log.len(), 1);
    assert_eq!(ledger.read("3").expect("read"), manifest);
}

#[test]
fn roadmap_mismatch_is_reported_without_writes() {
    let (_tmp, layout) = project();
    let state = "---\ncurrent_phase: 2\nstatus: planned\n---\n# State\n";
    let roadmap = "| Phase | Status |\n|---|---|\n| 02 | built |\n";
    std::fs::write(layout.state_path(), state).expect("state");
    std::fs::write(layout.roadmap_path(), roadmap).expect("roadmap");

    let result = check_roadmap_files(&layout.state_path(), &layout.roadmap_path()).expect("check");

    assert!(matches!(result, RoadmapDrift::OutOfSync { .. }));
    assert_eq!(std::fs::read_to_string(layout.state_path()).expect("read"), state);
    assert_eq!(std::fs::read_to_string(layout.roadmap_path()).expect("read"), roadmap);
}

#[test]
fn filesystem_drift_lists_missing_and_orphaned() {
    let (_tmp, layout) = project();
    std::fs::write(
        layout.roadmap_path(),
        "## Phases\n- [x] 01-setup\n- [ ] 03-auth\n",
    )
    .expect("roadmap");
    std::fs::create_dir_all(layout.phases_dir().join("01-setup")).expect("mkdir");
    std::fs::create_dir_all(layout.phases_dir().join("04-extra")).expect("mkdir");

    let result = check_filesystem(&layout).expect("check");

    assert!(!result.ok);
    assert_eq!(result.missing_dirs, vec!["03-auth"]);
    assert_eq!(result.orphaned_dirs, vec!["04-extra"]);
}

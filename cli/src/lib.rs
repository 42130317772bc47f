//! `plankit` command line
//!
//! Every subcommand prints exactly one JSON document on stdout. Logs go to
//! stderr.
//!
//! ## Commands
//!
//! - `plankit drift state|roadmap|fs`
//! - `plankit stale <PHASE>`
//! - `plankit checkpoint init|update|show <PHASE> ...`
//! - `plankit context sample|read|reset`
//! - `plankit session claim|release <HOLDER>`
//! - `plankit status check <FROM> <TO>`
//! - `plankit fingerprint <PATH>...`
//!
//! ## Exit Codes
//!
//! - 0: Nothing to act on
//! - 1: Advisory (drift found, plan stale, context warning, session conflict)
//! - 3: Error (unreadable or corrupt state, missing directories, bad input)

use anyhow::{Context as _, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use plankit_state::checkpoint::{CheckpointLedger, ManifestUpdate, resume_point};
use plankit_state::config::{ConfigLoader, EngineConfig};
use plankit_state::context::{ContextMonitor, PercentSource};
use plankit_state::persist::{LockOptions, claim_session, release_session};
use plankit_state::staleness::{record_fingerprints, render_fingerprint_block};
use plankit_state::{PhaseStatus, PlanningLayout, TransitionVerdict, drift, staleness, validate_transition};
use serde_json::{Value, json};
use std::path::PathBuf;

pub const EXIT_OK: u8 = 0;
pub const EXIT_ADVISORY: u8 = 1;
pub const EXIT_ERROR: u8 = 3;

/// Planning state consistency checks and ledgers
#[derive(Debug, Parser)]
#[command(name = "plankit", version)]
pub struct PlankitCli {
    /// Project root (defaults to current directory)
    #[arg(short = 'C', long = "cwd", value_name = "DIR", global = true)]
    pub cwd: Option<PathBuf>,

    /// Config file (defaults to <DIR>/plankit.toml, then user config)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detect (and for STATE.md, repair) drift
    #[command(subcommand)]
    Drift(DriftCommand),

    /// Check whether a phase's plans are stale
    Stale {
        /// Phase number, directory name or name fragment
        phase: String,
    },

    /// Checkpoint manifest of a phase
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),

    /// Context budget tiering
    #[command(subcommand)]
    Context(ContextCommand),

    /// Advisory active-session marker
    #[command(subcommand)]
    Session(SessionCommand),

    /// Phase status state machine
    #[command(subcommand)]
    Status(StatusCommand),

    /// Record fingerprints for files (relative to the project root)
    Fingerprint {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum DriftCommand {
    /// Sync derived STATE.md body lines with its metadata
    State,
    /// Compare STATE.md against the ROADMAP.md table (read-only)
    Roadmap,
    /// Compare roadmap phase slugs against phase directories (read-only)
    Fs,
}

#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    /// Create or overwrite the manifest
    Init {
        phase: String,
        #[arg(required = true)]
        plans: Vec<String>,
    },
    /// Record a wave or resolution event
    Update {
        phase: String,
        #[arg(long)]
        wave: Option<u32>,
        #[arg(long)]
        resolved: Option<String>,
        #[arg(long)]
        sha: Option<String>,
        #[arg(long)]
        pending: Option<String>,
        #[arg(long)]
        deferred: Option<String>,
    },
    /// Print the manifest and resume point
    Show { phase: String },
}

#[derive(Debug, Subcommand)]
pub enum ContextCommand {
    /// Take one sample; without --percent the bridge or heuristic is used
    Sample {
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        percent: Option<u32>,
    },
    /// Add characters read to the heuristic
    Read { chars: u64 },
    /// Start a new session
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    Claim { holder: String },
    Release { holder: String },
}

#[derive(Debug, Subcommand)]
pub enum StatusCommand {
    /// Validate a status transition
    Check { from: String, to: String },
}

/// A JSON document plus the exit code that goes with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub json: Value,
    pub exit_code: u8,
}

impl CommandOutput {
    fn ok(json: Value) -> Self {
        Self {
            json,
            exit_code: EXIT_OK,
        }
    }

    fn advisory_if(json: Value, advisory: bool) -> Self {
        Self {
            json,
            exit_code: if advisory { EXIT_ADVISORY } else { EXIT_OK },
        }
    }
}

/// Resolved project context shared by all subcommands.
struct Project {
    layout: PlanningLayout,
    config: EngineConfig,
}

impl Project {
    fn load(cwd: Option<PathBuf>, config_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let root = match cwd {
            Some(dir) => dir,
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        let mut loader = ConfigLoader::new().with_project_root(&root);
        if let Some(file) = config_file {
            loader = loader.with_file(file);
        }
        let config = loader.load()?;
        tracing::debug!(root = %root.display(), "Project resolved");
        Ok(Self {
            layout: PlanningLayout::new(root, &config.layout),
            config,
        })
    }

    fn lock(&self) -> LockOptions {
        LockOptions::from(&self.config.lock)
    }
}

impl PlankitCli {
    /// Run the command and produce its JSON result.
    pub fn execute(self) -> anyhow::Result<CommandOutput> {
        let project = Project::load(self.cwd, self.config)?;
        match self.command {
            Command::Drift(cmd) => run_drift(&project, cmd),
            Command::Stale { phase } => {
                let result = staleness::check_phase(&project.layout, &phase)?;
                let stale = result.stale;
                Ok(CommandOutput::advisory_if(serde_json::to_value(result)?, stale))
            }
            Command::Checkpoint(cmd) => run_checkpoint(&project, cmd),
            Command::Context(cmd) => run_context(&project, cmd),
            Command::Session(cmd) => run_session(&project, cmd),
            Command::Status(StatusCommand::Check { from, to }) => run_status_check(&from, &to),
            Command::Fingerprint { paths } => {
                let fingerprints = record_fingerprints(project.layout.project_root(), &paths)?;
                Ok(CommandOutput::ok(json!({
                    "block": render_fingerprint_block(&fingerprints),
                    "fingerprints": fingerprints,
                })))
            }
        }
    }
}

fn run_drift(project: &Project, cmd: DriftCommand) -> anyhow::Result<CommandOutput> {
    let layout = &project.layout;
    match cmd {
        DriftCommand::State => {
            let report = drift::repair_state_file(&layout.state_path(), &project.lock())?;
            let found = report.drift;
            Ok(CommandOutput::advisory_if(serde_json::to_value(report)?, found))
        }
        DriftCommand::Roadmap => {
            let result = drift::check_roadmap_files(&layout.state_path(), &layout.roadmap_path())?;
            let found = result.is_drift();
            Ok(CommandOutput::advisory_if(serde_json::to_value(result)?, found))
        }
        DriftCommand::Fs => {
            let result = drift::check_filesystem(layout)?;
            let found = !result.ok;
            Ok(CommandOutput::advisory_if(serde_json::to_value(result)?, found))
        }
    }
}

fn run_checkpoint(project: &Project, cmd: CheckpointCommand) -> anyhow::Result<CommandOutput> {
    let ledger = CheckpointLedger::new(project.layout.clone(), project.lock());
    let manifest = match cmd {
        CheckpointCommand::Init { phase, plans } => ledger.init(&phase, plans)?,
        CheckpointCommand::Update {
            phase,
            wave,
            resolved,
            sha,
            pending,
            deferred,
        } => {
            let update = ManifestUpdate {
                wave,
                resolved,
                sha,
                pending,
                deferred,
            };
            if update == ManifestUpdate::default() {
                bail!("checkpoint update needs at least one of --wave, --resolved, --sha, --pending, --deferred");
            }
            ledger.update(&phase, &update)?
        }
        CheckpointCommand::Show { phase } => ledger.read(&phase)?,
    };
    Ok(CommandOutput::ok(json!({
        "resume": resume_point(&manifest),
        "manifest": manifest,
    })))
}

fn run_context(project: &Project, cmd: ContextCommand) -> anyhow::Result<CommandOutput> {
    let monitor = ContextMonitor::new(&project.layout, &project.config.context, project.lock());
    match cmd {
        ContextCommand::Sample { percent } => {
            let now = Utc::now();
            let outcome = match percent {
                Some(percent) => monitor.sample(percent, PercentSource::Bridge, now)?,
                None => monitor.observe(now)?,
            };
            let mut json = serde_json::to_value(&outcome)?;
            if let Value::Object(map) = &mut json {
                map.insert("message".to_string(), json!(outcome.message()));
            }
            Ok(CommandOutput::advisory_if(json, outcome.should_warn))
        }
        ContextCommand::Read { chars } => {
            let state = monitor.record_read(chars)?;
            Ok(CommandOutput::ok(serde_json::to_value(state)?))
        }
        ContextCommand::Reset => {
            let state = monitor.reset()?;
            Ok(CommandOutput::ok(serde_json::to_value(state)?))
        }
    }
}

fn run_session(project: &Project, cmd: SessionCommand) -> anyhow::Result<CommandOutput> {
    let marker = project.layout.session_marker_path();
    match cmd {
        SessionCommand::Claim { holder } => {
            let claim = claim_session(&marker, &holder, project.config.session.stale_after())?;
            let conflict = claim.is_conflict();
            Ok(CommandOutput::advisory_if(serde_json::to_value(claim)?, conflict))
        }
        SessionCommand::Release { holder } => {
            let released = release_session(&marker, &holder);
            Ok(CommandOutput::ok(json!({ "released": released })))
        }
    }
}

fn run_status_check(from: &str, to: &str) -> anyhow::Result<CommandOutput> {
    let parse = |value: &str| {
        PhaseStatus::parse(value).with_context(|| format!("unknown phase status '{value}'"))
    };
    let (from, to) = (parse(from)?, parse(to)?);
    let verdict = validate_transition(from, to);
    let warn = matches!(verdict, TransitionVerdict::Warn { .. });
    let mut json = serde_json::to_value(&verdict)?;
    if let Value::Object(map) = &mut json {
        map.insert("from".to_string(), json!(from));
        map.insert("to".to_string(), json!(to));
    }
    Ok(CommandOutput::advisory_if(json, warn))
}

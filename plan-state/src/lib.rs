//! Planning state consistency engine
//!
//! Keeps a small set of planning documents (STATE.md, ROADMAP.md, per-plan
//! artifacts, checkpoint manifests, context-budget state) consistent while
//! many short-lived processes read and mutate them with nothing but the
//! filesystem to coordinate through.
//!
//! Layers, leaf first:
//! - [`persist`]: atomic single-file replace, lock-file coordinated
//!   read-modify-write, advisory session marker
//! - [`drift`]: frontmatter vs body, STATE vs ROADMAP, registry vs disk
//! - [`staleness`]: has a plan's upstream input changed since planning?
//! - [`checkpoint`]: per-phase wave/commit ledger
//! - [`context`]: context-usage tiering with debounced warnings
//!
//! Every invocation is synchronous; "concurrency" means separate OS
//! processes racing on the same files.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod drift;
pub mod error;
pub mod frontmatter;
pub mod layout;
pub mod persist;
pub mod staleness;
pub mod status;
pub mod timing;

pub use error::{PlanStateError, Result};
pub use layout::PlanningLayout;
pub use status::{PhaseStatus, TransitionVerdict, validate_transition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

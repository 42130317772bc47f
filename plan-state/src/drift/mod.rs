//! Drift detection and repair.
//!
//! - [`state_body`]: metadata vs derived body lines in STATE.md; repaired
//!   in place under the document lock
//! - [`roadmap`]: STATE vs the ROADMAP table; advisory only
//! - [`filesystem`]: roadmap phase slugs vs phase directories; advisory only

pub mod filesystem;
pub mod roadmap;
pub mod state_body;

pub use filesystem::{FilesystemDrift, check_filesystem, compare_registry_to_dirs};
pub use roadmap::{RoadmapDrift, check_roadmap_files, compare_state_to_roadmap};
pub use state_body::{LineChange, StateDrift, reconcile_state, repair_state_file};

//! Filesystem persistence primitives.
//!
//! Every tracked document, checkpoint manifest and context-budget state file
//! is mutated only through this module:
//!
//! - [`write_atomic`]: temp file + fsync + rename, with a `.bak` safety copy
//! - [`locked_update`]: `<path>.lock` exclusive-create mutex around a
//!   read → pure transform → atomic write cycle
//! - [`claim_session`]: long-lived advisory marker that warns, never blocks
//!
//! Lock files rely on atomic create-if-absent (`O_CREAT | O_EXCL`). That
//! holds for local POSIX filesystems and NTFS; it is not guaranteed on every
//! network filesystem, so planning directories must live on local storage.

pub mod atomic;
pub mod lock;
pub mod session;

pub use atomic::{AtomicWriteError, backup_path_for, write_atomic};
pub use lock::{FileLock, LockError, LockOptions, lock_path_for, locked_update};
pub use session::{SessionClaim, SessionError, SessionMarker, claim_session, release_session};

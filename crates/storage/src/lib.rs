//! File-backed project storage (spec §4.2).
//!
//! Every write in this crate is atomic (temp file + fsync + rename) and
//! every mutating operation on a shared path goes through a per-path async
//! lock, so concurrent agents never observe a torn read or clobber each
//! other's write. [`Store`] is the entry point; everything else is
//! internal plumbing it composes.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod atomic;
pub mod format;
pub mod lock;
pub mod paths;
pub mod store;

pub use atomic::{atomic_write, rotate_into_history, DEFAULT_HISTORY_KEEP};
pub use lock::FileLockMap;
pub use paths::ProjectPaths;
pub use store::{Store, StorageStats};

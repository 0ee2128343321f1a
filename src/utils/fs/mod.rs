//! Filesystem helpers used by the swapper and report writers.

pub mod atomic;
pub mod dirs;
pub mod temp;

pub use atomic::atomic_write;
pub use dirs::{copy_dir, copy_entry, ensure_dir, remove_dir_all, remove_entry};
pub use temp::TempDir;

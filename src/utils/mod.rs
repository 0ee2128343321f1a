//! Cross-cutting helpers: filesystem, platform and progress output.

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, copy_dir, ensure_dir};
pub use platform::{get_git_command, is_windows, resolve_path};
pub use progress::ProgressBar;

//! Utility modules for the updater
//!
//! - [`fs`]: directory creation and atomic writes (used by the pending-install ledger)
//! - [`progress`]: terminal download progress for the CLI

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, ensure_dir};
pub use progress::DownloadBar;

//! Configuration for the updater.
//!
//! - [`UpdaterConfig`]: the settings the orchestrator runs with, built in code
//!   through [`UpdaterConfig::builder`] or loaded from disk
//! - [`GlobalConfig`]: the TOML file that stores them for the CLI host

mod global;
mod updater;

pub use global::GlobalConfig;
pub use updater::{UpdaterConfig, UpdaterConfigBuilder};

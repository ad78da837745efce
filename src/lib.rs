//! app-updater - client-side self-update orchestration
//!
//! Asks a remote update service whether a newer build of the host application
//! exists, downloads the package in the background while reporting progress,
//! and hands it to the platform installer. When the platform refuses installs
//! from this application, the package path is remembered so the install can be
//! resumed once the user grants permission.
//!
//! # Modules
//!
//! ## Workflow
//! - [`check`] - Version-check client for the update service
//! - [`download`] - Download tracker: background transfer, polling, progress events
//! - [`install`] - Permission gate, install launcher and pending-install ledger
//! - [`orchestrator`] - [`Updater`](orchestrator::Updater), the session that ties the workflow together
//! - [`sdk`] - Process-wide [`AppUpdater`](sdk::AppUpdater) facade
//!
//! ## Supporting Modules
//! - [`cli`] - The `app-updater` command-line interface
//! - [`config`] - Global (`~/.app-updater/config.toml`) and updater configuration
//! - [`core`] - Error types and user-facing error formatting
//! - [`dispatch`] - Callback executors (serialized delivery of events)
//! - [`models`] - Wire and domain types shared across the workflow
//! - [`utils`] - File system helpers and progress bars
//!
//! # Example
//!
//! ```rust,no_run
//! use app_updater::config::UpdaterConfig;
//! use app_updater::orchestrator::Updater;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::builder()
//!     .base_url("https://updates.example.com/")
//!     .app_id("com.example.app")
//!     .current_version_code(100)
//!     .build()?;
//!
//! let updater = Updater::new(config)?;
//! let info = updater.check().await?;
//! if info.has_update {
//!     updater.start_download(&info, None)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns [`UpdateError`](core::UpdateError), which
//! carries a stable numeric code (see [`UpdateError::code`](core::UpdateError::code)).
//! The CLI converts errors into [`ErrorContext`](core::ErrorContext) for display.

pub mod check;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod dispatch;
pub mod download;
pub mod install;
pub mod models;
pub mod orchestrator;
pub mod sdk;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

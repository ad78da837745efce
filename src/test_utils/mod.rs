//! Test utilities for the updater
//!
//! Fakes for every collaborator the orchestrator talks to, an [`EventLog`]
//! that records callbacks, and a [`StubServer`] that plays the update
//! service over real HTTP. Available to unit tests and, through the
//! `test-utils` feature, to integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use app_updater::test_utils::{EventLog, FakeTransferBackend, StubServer};
//!
//! # async fn example() {
//! let server = StubServer::start().await;
//! let backend = FakeTransferBackend::new();
//! let log = EventLog::new();
//! # }
//! ```

pub mod events;
pub mod fakes;
pub mod server;

pub use events::{EventLog, InstallRecord, PromptPolicy};
pub use fakes::{FakePermissions, FakeTransferBackend, FakeVersionCheck, RecordingLauncher};
pub use server::{RecordedRequest, StubResponse, StubServer};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=app_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

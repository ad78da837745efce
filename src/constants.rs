//! Timing and naming constants shared across the updater.

use std::time::Duration;

/// Default cadence at which the download tracker polls the transfer backend.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default connect timeout for the version check request.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default read timeout for the version check request.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Business code the update server uses for a successful check.
pub const SERVER_SUCCESS_CODE: i32 = 200;

/// Channel reported when none is configured.
pub const DEFAULT_CHANNEL: &str = "default";

/// Path segment of the check endpoint, relative to the base URL.
pub const CHECK_UPDATE_ENDPOINT: &str = "check-update";

/// Extension used for downloaded packages whose URL has none.
pub const DEFAULT_PACKAGE_EXTENSION: &str = "pkg";

/// Environment variable that disables progress bars.
pub const NO_PROGRESS_ENV: &str = "APP_UPDATER_NO_PROGRESS";

/// Environment variable that overrides the global config path.
pub const CONFIG_PATH_ENV: &str = "APP_UPDATER_CONFIG";

/// User agent sent with every request.
pub fn user_agent() -> String {
    format!("app-updater/{}", env!("CARGO_PKG_VERSION"))
}

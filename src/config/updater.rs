use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHANNEL, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_POLL_INTERVAL, DEFAULT_READ_TIMEOUT_MS,
};
use crate::core::UpdateError;

/// Settings that control how the updater checks, downloads and installs.
///
/// `base_url` and `app_id` are required; everything else has a default. The
/// struct is stored under the `[updater]` table of the global config file:
///
/// ```toml
/// [updater]
/// base_url = "https://updates.example.com/api/"
/// app_id = "com.example.app"
/// current_version_code = 12
/// auto_install = true
/// verify_checksum = true
/// ```
///
/// Use [`UpdaterConfig::builder`] in code; it validates and normalizes the
/// values the same way [`UpdaterConfig::validate`] does for loaded files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Base URL of the update service. Always ends with `/` once validated.
    #[serde(default)]
    pub base_url: String,

    /// Identity of the application as known by the update service.
    #[serde(default)]
    pub app_id: String,

    /// Version code of the running application.
    #[serde(default)]
    pub current_version_code: i64,

    /// Release channel reported with each check.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Whether to attach a device description to check requests.
    #[serde(default)]
    pub send_device_info: bool,

    /// Connect timeout of the check request, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read timeout of the check request, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// How often the download tracker polls the transfer, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Where packages are downloaded to. Supports `~`.
    ///
    /// Defaults to `<cache dir>/app-updater/downloads`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,

    /// Whether a successful check hands an [`UpdateOffer`](crate::orchestrator::UpdateOffer)
    /// to the registered offer handler.
    ///
    /// The offer only starts a download when the user accepts it.
    #[serde(default = "default_true")]
    pub auto_offer: bool,

    /// Whether a completed download proceeds straight into the install step.
    #[serde(default = "default_true")]
    pub auto_install: bool,

    /// Whether to verify the package against the checksum the server advertises.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,

    /// Directory the installer writes into; install permission means write access here.
    ///
    /// Defaults to the directory of the running executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,

    /// Command used to open a package. The package path is appended as the last argument.
    ///
    /// Empty means the package is itself executable and is run directly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installer_command: Vec<String>,

    /// Location of the pending-install ledger. Supports `~`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<String>,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

const fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

const fn default_true() -> bool {
    true
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_id: String::new(),
            current_version_code: 0,
            channel: default_channel(),
            send_device_info: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            download_dir: None,
            auto_offer: true,
            auto_install: true,
            verify_checksum: true,
            install_dir: None,
            installer_command: Vec::new(),
            ledger_path: None,
        }
    }
}

impl UpdaterConfig {
    /// Start building a config.
    #[must_use]
    pub fn builder() -> UpdaterConfigBuilder {
        UpdaterConfigBuilder::default()
    }

    /// Check required fields and normalize the base URL.
    ///
    /// # Errors
    ///
    /// [`UpdateError::InvalidConfig`] when `base_url` or `app_id` is blank, the
    /// base URL is not http(s), or the poll interval is zero.
    pub fn validate(mut self) -> Result<Self, UpdateError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(invalid("base_url cannot be empty"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid(format!("base_url must be an http(s) URL, got '{base_url}'")));
        }
        if self.app_id.trim().is_empty() {
            return Err(invalid("app_id cannot be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than zero"));
        }

        self.base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        self.app_id = self.app_id.trim().to_string();
        Ok(self)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolved download directory.
    pub fn download_dir(&self) -> PathBuf {
        match &self.download_dir {
            Some(dir) => expand(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("app-updater")
                .join("downloads"),
        }
    }

    /// Resolved install directory.
    pub fn install_dir(&self) -> PathBuf {
        match &self.install_dir {
            Some(dir) => expand(dir),
            None => std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Resolved ledger path.
    pub fn ledger_path(&self) -> PathBuf {
        match &self.ledger_path {
            Some(path) => expand(path),
            None => super::GlobalConfig::data_dir()
                .unwrap_or_else(|_| std::env::temp_dir().join("app-updater"))
                .join("pending_install.json"),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn invalid(message: impl Into<String>) -> UpdateError {
    UpdateError::InvalidConfig {
        message: message.into(),
    }
}

/// Fluent builder for [`UpdaterConfig`].
#[derive(Debug, Default)]
pub struct UpdaterConfigBuilder {
    config: UpdaterConfig,
}

impl UpdaterConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.app_id = app_id.into();
        self
    }

    pub fn current_version_code(mut self, code: i64) -> Self {
        self.config.current_version_code = code;
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.config.channel = channel.into();
        self
    }

    pub fn send_device_info(mut self, enabled: bool) -> Self {
        self.config.send_device_info = enabled;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = Some(dir.into().to_string_lossy().into_owned());
        self
    }

    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.install_dir = Some(dir.into().to_string_lossy().into_owned());
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ledger_path = Some(path.into().to_string_lossy().into_owned());
        self
    }

    pub fn installer_command(mut self, command: Vec<String>) -> Self {
        self.config.installer_command = command;
        self
    }

    pub fn auto_offer(mut self, enabled: bool) -> Self {
        self.config.auto_offer = enabled;
        self
    }

    pub fn auto_install(mut self, enabled: bool) -> Self {
        self.config.auto_install = enabled;
        self
    }

    pub fn verify_checksum(mut self, enabled: bool) -> Self {
        self.config.verify_checksum = enabled;
        self
    }

    /// Validate and return the config.
    ///
    /// # Errors
    ///
    /// See [`UpdaterConfig::validate`].
    pub fn build(self) -> Result<UpdaterConfig, UpdateError> {
        self.config.validate()
    }
}

//! Global configuration file management.
//!
//! The global config lives at `~/.app-updater/config.toml` (or
//! `%LOCALAPPDATA%\app-updater\config.toml` on Windows) and can be relocated
//! with the `APP_UPDATER_CONFIG` environment variable. On Unix it is written
//! with `0600` permissions.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::UpdaterConfig;
use crate::constants::CONFIG_PATH_ENV;

/// Contents of the global config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Updater settings (`[updater]` table).
    #[serde(default)]
    pub updater: UpdaterConfig,
}

impl GlobalConfig {
    /// Load from the default location, falling back to defaults when the file is absent.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, else from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set secure permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// Directory holding the config file and the pending-install ledger.
    pub fn data_dir() -> Result<PathBuf> {
        if cfg!(target_os = "windows") {
            Ok(dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("app-updater"))
        } else {
            Ok(dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".app-updater"))
        }
    }

    /// Config file path, honoring `APP_UPDATER_CONFIG`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::data_dir()?.join("config.toml"))
    }

    /// Set one `[updater]` key from its string form.
    ///
    /// The value is interpreted as a boolean, then an integer, then a
    /// comma-separated list for `installer_command`, and finally as a string.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut table = toml::Table::try_from(&self.updater)
            .context("Failed to convert updater config to a table")?;

        let parsed = if key == "installer_command" {
            toml::Value::Array(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| toml::Value::String(part.to_string()))
                    .collect(),
            )
        } else if let Ok(flag) = value.parse::<bool>() {
            toml::Value::Boolean(flag)
        } else if let Ok(number) = value.parse::<i64>() {
            toml::Value::Integer(number)
        } else {
            toml::Value::String(value.to_string())
        };

        let known = toml::Table::try_from(UpdaterConfig::default())
            .context("Failed to convert default config to a table")?;
        let optional = ["download_dir", "install_dir", "installer_command", "ledger_path"];
        if !known.contains_key(key) && !optional.contains(&key) {
            bail!("Unknown config key: updater.{key}");
        }

        table.insert(key.to_string(), parsed);
        self.updater = table
            .try_into()
            .with_context(|| format!("Invalid value '{value}' for updater.{key}"))?;
        Ok(())
    }

    /// An example config written by `app-updater config init`.
    #[must_use]
    pub fn init_example() -> Self {
        Self {
            updater: UpdaterConfig {
                base_url: "https://updates.example.com/api/".to_string(),
                app_id: "com.example.app".to_string(),
                current_version_code: 1,
                ..UpdaterConfig::default()
            },
        }
    }
}

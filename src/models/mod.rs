//! Data model shared by the updater components.
//!
//! [`UpdateInfo`] is the normalized result of a version check and the input to
//! a download. [`DownloadProgress`] is produced repeatedly by the download
//! tracker. The `CheckUpdate*` types mirror the update server's JSON wire
//! format, where every field of the response payload except `hasUpdate` may be
//! null.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::DEFAULT_CHANNEL;

/// A normalized update offer.
///
/// When `has_update` is `false` every other field holds its default and must
/// not be interpreted as a real offer. When `force_update` is `true` the
/// caller-facing workflow must not offer a way to skip the update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Whether the server offers a newer version.
    pub has_update: bool,
    /// Monotonic version code of the offered build.
    pub new_version_code: i64,
    /// Display name of the offered version, e.g. `"1.1.0"`.
    pub new_version_name: String,
    /// Release notes.
    pub description: String,
    /// Whether the update must not be skipped.
    pub force_update: bool,
    /// Where the package can be downloaded from.
    pub download_url: String,
    /// Package size in bytes as advertised by the server.
    pub file_size: i64,
    /// Optional checksum of the package (empty when the server sent none).
    pub checksum: String,
}

impl UpdateInfo {
    /// The "no update" value.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a caller may offer a "skip" or "later" path for this update.
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        !self.force_update
    }
}

/// Lifecycle status of a transfer as seen by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    /// Queued, no bytes transferred yet.
    Pending,
    /// Bytes are flowing.
    Running,
    /// Temporarily stalled (e.g. waiting for network).
    Paused,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Removed by the caller.
    Canceled,
}

impl DownloadStatus {
    /// Whether no further progress can follow this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(label)
    }
}

/// A single progress report for the active download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Cumulative bytes written so far.
    pub downloaded_bytes: i64,
    /// Expected total; 0 when unknown.
    pub total_bytes: i64,
    /// `floor(downloaded * 100 / total)`, 0 when the total is unknown.
    pub percent: u8,
    /// Throughput since the previous report.
    pub bytes_per_second: i64,
    /// Transfer status at the time of the report.
    pub status: DownloadStatus,
}

/// Device description optionally attached to a check request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub model: String,
    pub brand: String,
    pub os_version: String,
    pub api_level: i32,
}

impl DeviceInfo {
    /// Describe the machine this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self {
            model: std::env::consts::ARCH.to_string(),
            brand: std::env::consts::FAMILY.to_string(),
            os_version: std::env::consts::OS.to_string(),
            api_level: 0,
        }
    }
}

/// Body of `POST {base_url}check-update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUpdateRequest {
    pub app_id: String,
    pub current_version_code: i64,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
}

impl CheckUpdateRequest {
    pub fn new(app_id: impl Into<String>, current_version_code: i64) -> Self {
        Self {
            app_id: app_id.into(),
            current_version_code,
            channel: DEFAULT_CHANNEL.to_string(),
            device_info: None,
        }
    }
}

/// Envelope returned by the update server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUpdateResponse {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<UpdateResponseData>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Server-side source fields of [`UpdateInfo`]; each may be null independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponseData {
    #[serde(default)]
    pub has_update: bool,
    #[serde(default)]
    pub new_version_code: Option<i64>,
    #[serde(default)]
    pub new_version_name: Option<String>,
    #[serde(default)]
    pub update_description: Option<String>,
    #[serde(default)]
    pub force_update: Option<bool>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub md5: Option<String>,
}

impl From<UpdateResponseData> for UpdateInfo {
    fn from(data: UpdateResponseData) -> Self {
        if !data.has_update {
            return Self::none();
        }

        Self {
            has_update: true,
            new_version_code: data.new_version_code.unwrap_or_default(),
            new_version_name: data.new_version_name.unwrap_or_default(),
            description: data.update_description.unwrap_or_default(),
            force_update: data.force_update.unwrap_or_default(),
            download_url: data.download_url.unwrap_or_default(),
            file_size: data.file_size.unwrap_or_default(),
            checksum: data.md5.unwrap_or_default(),
        }
    }
}

/// Format a byte count the way progress and log lines show it.
#[must_use]
pub fn format_file_size(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;

    let value = bytes as f64;
    if value >= MIB {
        format!("{:.1} MB", value / MIB)
    } else if value >= KIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

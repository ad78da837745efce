//! Progress arithmetic for the download tracker.

use std::time::Instant;

use super::transfer::TransferSnapshot;
use crate::models::{DownloadProgress, DownloadStatus};

/// `floor(downloaded * 100 / total)` clamped to 100; 0 when the total is unknown.
#[must_use]
pub fn percent(downloaded: i64, total: i64) -> u8 {
    if total <= 0 || downloaded <= 0 {
        return 0;
    }
    let value = (i128::from(downloaded) * 100) / i128::from(total);
    value.min(100) as u8
}

/// Turns successive transfer snapshots into [`DownloadProgress`] reports.
///
/// Reported bytes never go backwards, and throughput is measured between
/// consecutive samples (the first sample reports 0).
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    fallback_total: i64,
    last_bytes: i64,
    last_sample: Option<Instant>,
    last_speed: i64,
}

impl ProgressMeter {
    /// `fallback_total` is used while the transfer does not know its size.
    #[must_use]
    pub const fn new(fallback_total: i64) -> Self {
        Self {
            fallback_total,
            last_bytes: 0,
            last_sample: None,
            last_speed: 0,
        }
    }

    pub fn sample(&mut self, snapshot: &TransferSnapshot, now: Instant) -> DownloadProgress {
        let downloaded = snapshot.downloaded_bytes.max(self.last_bytes);
        let total = if snapshot.total_bytes > 0 {
            snapshot.total_bytes
        } else {
            self.fallback_total.max(0)
        };

        let speed = match self.last_sample {
            Some(previous) => {
                let elapsed_ms = now.saturating_duration_since(previous).as_millis() as i64;
                if elapsed_ms > 0 {
                    (downloaded - self.last_bytes) * 1000 / elapsed_ms
                } else {
                    self.last_speed
                }
            }
            None => 0,
        };

        self.last_bytes = downloaded;
        self.last_sample = Some(now);
        self.last_speed = speed;

        DownloadProgress {
            downloaded_bytes: downloaded,
            total_bytes: total,
            percent: percent(downloaded, total),
            bytes_per_second: speed,
            status: snapshot.status,
        }
    }

    /// The closing report of a successful transfer, pinned at 100%.
    #[must_use]
    pub const fn complete(&self, file_len: i64) -> DownloadProgress {
        DownloadProgress {
            downloaded_bytes: file_len,
            total_bytes: file_len,
            percent: 100,
            bytes_per_second: self.last_speed,
            status: DownloadStatus::Succeeded,
        }
    }
}

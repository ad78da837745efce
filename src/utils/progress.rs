//! Terminal progress display for downloads.
//!
//! Bars are hidden when `APP_UPDATER_NO_PROGRESS` is set or when the caller
//! asks for no progress, so scripted runs get clean output.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::constants::NO_PROGRESS_ENV;
use crate::models::{DownloadProgress, format_file_size};

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

/// Progress bar fed from [`DownloadProgress`] reports.
#[derive(Clone)]
pub struct DownloadBar {
    inner: ProgressBar,
}

impl DownloadBar {
    /// A bar for a download of roughly `expected_bytes` (0 if unknown).
    pub fn new(expected_bytes: i64, enabled: bool) -> Self {
        let bar = if !enabled || is_progress_disabled() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(expected_bytes.max(0) as u64);
            bar.set_style(download_style());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        Self {
            inner: bar,
        }
    }

    pub fn update(&self, progress: &DownloadProgress) {
        if progress.total_bytes > 0 {
            self.inner.set_length(progress.total_bytes as u64);
        }
        self.inner.set_position(progress.downloaded_bytes.max(0) as u64);
        self.inner.set_message(format!("{}/s", format_file_size(progress.bytes_per_second)));
    }

    pub fn finish_with_message(&self, message: impl Into<String>) {
        self.inner.finish_with_message(message.into());
    }

    pub fn abandon_with_message(&self, message: impl Into<String>) {
        self.inner.abandon_with_message(message.into());
    }

    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

//! Recording updater callbacks.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::core::UpdateError;
use crate::download::{DownloadEvent, DownloadHandler};
use crate::install::{InstallEvent, InstallHandler, PermissionPrompt};

/// Comparable form of an [`InstallEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallRecord {
    Started(PathBuf),
    PermissionRequired(PathBuf),
    Failed(UpdateError),
}

/// What the recording install handler does with a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPolicy {
    /// Store it; see [`EventLog::take_prompts`].
    Keep,
    Confirm,
    Cancel,
}

#[derive(Default)]
struct Recorded {
    download: Vec<DownloadEvent>,
    install: Vec<InstallRecord>,
    prompts: Vec<PermissionPrompt>,
}

/// Collects download and install events for assertions.
#[derive(Clone, Default)]
pub struct EventLog {
    recorded: Arc<Mutex<Recorded>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn download_handler(&self) -> DownloadHandler {
        let log = self.clone();
        Arc::new(move |event| log.recorded().download.push(event))
    }

    pub fn install_handler(&self, policy: PromptPolicy) -> InstallHandler {
        let log = self.clone();
        Arc::new(move |event| match event {
            InstallEvent::Started(path) => log.recorded().install.push(InstallRecord::Started(path)),
            InstallEvent::Failed(e) => log.recorded().install.push(InstallRecord::Failed(e)),
            InstallEvent::PermissionRequired(prompt) => {
                let path = prompt.package_path().to_path_buf();
                if policy == PromptPolicy::Keep {
                    let mut recorded = log.recorded();
                    recorded.install.push(InstallRecord::PermissionRequired(path));
                    recorded.prompts.push(prompt);
                    return;
                }

                log.recorded().install.push(InstallRecord::PermissionRequired(path));
                // Not under the lock: resolving may deliver another event.
                if policy == PromptPolicy::Confirm {
                    prompt.confirm();
                } else {
                    prompt.cancel();
                }
            }
        })
    }

    pub fn download_events(&self) -> Vec<DownloadEvent> {
        self.recorded().download.clone()
    }

    pub fn install_events(&self) -> Vec<InstallRecord> {
        self.recorded().install.clone()
    }

    /// Percentages of every recorded progress event, in order.
    pub fn percents(&self) -> Vec<u8> {
        self.recorded()
            .download
            .iter()
            .filter_map(|event| match event {
                DownloadEvent::Progress(progress) => Some(progress.percent),
                _ => None,
            })
            .collect()
    }

    /// Prompts stored under [`PromptPolicy::Keep`].
    pub fn take_prompts(&self) -> Vec<PermissionPrompt> {
        std::mem::take(&mut self.recorded().prompts)
    }

    /// Poll until `condition` holds or `timeout` passes; returns whether it held.
    pub async fn wait_until(&self, timeout: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait for a terminal download event.
    pub async fn wait_for_download_end(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| log.download_events().iter().any(DownloadEvent::is_terminal))
            .await
    }
}

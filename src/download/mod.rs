//! Download tracking.
//!
//! [`DownloadTracker`] owns at most one active download. It queues the
//! package with a [`TransferBackend`], polls the backend on a background task,
//! and reports [`DownloadEvent`]s through the updater's
//! [`CallbackExecutor`]. Every download ends with exactly one terminal event:
//! `Completed`, `Failed` or `Canceled`.
//!
//! Cancellation and terminal success race for the same slot under one mutex;
//! whichever takes the slot first decides the outcome. Once [`DownloadTracker::cancel`]
//! returns, no progress or completion callback for that download is running
//! or will run: queued ones are suppressed and one already running is waited
//! for. A handler may itself call `cancel`; that call does not wait for the
//! handler it is made from.

pub mod progress;
pub mod transfer;
pub mod verification;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::UpdaterConfig;
use crate::constants::DEFAULT_PACKAGE_EXTENSION;
use crate::core::UpdateError;
use crate::dispatch::CallbackExecutor;
use crate::models::{DownloadProgress, DownloadStatus, UpdateInfo, format_file_size};

pub use progress::ProgressMeter;
pub use transfer::{
    HttpTransferBackend, TransferBackend, TransferFailure, TransferId, TransferRequest,
    TransferSnapshot,
};
pub use verification::ChecksumVerifier;

/// Something that happened to the active download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// The transfer was queued.
    Started,
    Progress(DownloadProgress),
    /// The package is on disk (and verified, when a checksum was checked).
    Completed(PathBuf),
    Failed(UpdateError),
    Canceled,
}

impl DownloadEvent {
    /// Whether this event ends the download.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_) | Self::Canceled)
    }
}

/// Receives the events of one download.
pub type DownloadHandler = Arc<dyn Fn(DownloadEvent) + Send + Sync>;

/// Tracker settings taken from [`UpdaterConfig`].
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub download_dir: PathBuf,
    pub poll_interval: Duration,
    pub verify_checksum: bool,
}

impl From<&UpdaterConfig> for TrackerSettings {
    fn from(config: &UpdaterConfig) -> Self {
        Self {
            download_dir: config.download_dir(),
            poll_interval: config.poll_interval(),
            verify_checksum: config.verify_checksum,
        }
    }
}

struct ActiveDownload {
    task_id: u64,
    transfer_id: TransferId,
    poll: Option<JoinHandle<()>>,
    gate: Arc<EmissionGate>,
    handler: DownloadHandler,
}

/// Orders a download's callbacks against its cancellation.
#[derive(Default)]
struct EmissionGate {
    canceled: AtomicBool,
    /// Held while a gated callback runs.
    delivery: Mutex<()>,
    delivering_on: Mutex<Option<ThreadId>>,
}

impl EmissionGate {
    fn is_closed(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Run `callback` unless the gate is closed.
    fn deliver(&self, callback: impl FnOnce()) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return;
        }
        self.set_delivering_on(Some(thread::current().id()));
        callback();
        self.set_delivering_on(None);
    }

    /// Close the gate and wait out a callback that is already running,
    /// unless that callback is the caller.
    fn close(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        let reentrant = *self.delivering_on.lock().unwrap_or_else(PoisonError::into_inner)
            == Some(thread::current().id());
        if !reentrant {
            drop(self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    fn set_delivering_on(&self, thread: Option<ThreadId>) {
        *self.delivering_on.lock().unwrap_or_else(PoisonError::into_inner) = thread;
    }
}

struct Shared {
    backend: Arc<dyn TransferBackend>,
    executor: Arc<dyn CallbackExecutor>,
    active: Mutex<Option<ActiveDownload>>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<ActiveDownload>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the slot if it still belongs to `task_id`.
    fn take_if_current(&self, task_id: u64) -> Option<ActiveDownload> {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|active| active.task_id == task_id) {
            slot.take()
        } else {
            None
        }
    }

    fn emit(&self, handler: &DownloadHandler, gate: Option<&Arc<EmissionGate>>, event: DownloadEvent) {
        let handler = Arc::clone(handler);
        let gate = gate.map(Arc::clone);
        self.executor.execute(Box::new(move || match gate {
            Some(gate) => gate.deliver(|| handler(event)),
            None => handler(event),
        }));
    }
}

/// Drives a single package download at a time.
pub struct DownloadTracker {
    shared: Arc<Shared>,
    settings: TrackerSettings,
    runtime: Handle,
    next_task_id: AtomicU64,
}

impl DownloadTracker {
    /// Create a tracker bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Unknown`] when called outside a tokio runtime.
    pub fn new(
        backend: Arc<dyn TransferBackend>,
        executor: Arc<dyn CallbackExecutor>,
        settings: TrackerSettings,
    ) -> Result<Self, UpdateError> {
        let runtime = Handle::try_current().map_err(|_| UpdateError::Unknown {
            message: "the updater must be created inside a tokio runtime".to_string(),
        })?;

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                executor,
                active: Mutex::new(None),
            }),
            settings,
            runtime,
            next_task_id: AtomicU64::new(1),
        })
    }

    /// Start downloading `info`; `false` when refused (see [`Self::try_start`]).
    pub fn start(&self, info: &UpdateInfo, handler: DownloadHandler) -> bool {
        self.try_start(info, handler).is_ok()
    }

    /// Start downloading `info`, reporting every event to `handler`.
    ///
    /// A refused start emits no events.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::DownloadAlreadyActive`] while another download is running
    /// - [`UpdateError::Storage`] when the download directory cannot be prepared
    /// - [`UpdateError::DownloadTransportFailure`] when the backend refuses the transfer
    pub fn try_start(&self, info: &UpdateInfo, handler: DownloadHandler) -> Result<(), UpdateError> {
        let destination = self.destination_for(info);
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(EmissionGate::default());

        let transfer_id = {
            let mut slot = self.shared.slot();
            if slot.is_some() {
                warn!("Download requested while another one is active");
                return Err(UpdateError::DownloadAlreadyActive);
            }

            prepare_destination(&destination)?;
            let transfer_id = self.shared.backend.enqueue(TransferRequest {
                url: info.download_url.clone(),
                destination: destination.clone(),
                title: info.new_version_name.clone(),
            })?;

            *slot = Some(ActiveDownload {
                task_id,
                transfer_id,
                poll: None,
                gate: Arc::clone(&gate),
                handler: Arc::clone(&handler),
            });
            transfer_id
        };

        info!(
            "Downloading {} ({}) to {}",
            info.new_version_name,
            format_file_size(info.file_size),
            destination.display()
        );
        self.shared.emit(&handler, None, DownloadEvent::Started);

        let poll = self.runtime.spawn(poll_transfer(PollContext {
            shared: Arc::clone(&self.shared),
            task_id,
            transfer_id,
            destination,
            checksum: info.checksum.clone(),
            fallback_total: info.file_size,
            poll_interval: self.settings.poll_interval,
            verify_checksum: self.settings.verify_checksum,
            gate,
            handler,
        }));

        let mut slot = self.shared.slot();
        match slot.as_mut() {
            Some(active) if active.task_id == task_id => active.poll = Some(poll),
            // Canceled from the Started callback before polling began.
            _ => poll.abort(),
        }
        Ok(())
    }

    /// Cancel the active download.
    ///
    /// Returns `true` if a download was canceled. Idempotent: without an
    /// active download this does nothing and returns `false`. When this
    /// returns `true`, `Canceled` has been submitted and is the last event
    /// the download's handler receives.
    pub fn cancel(&self) -> bool {
        let Some(active) = self.shared.slot().take() else {
            debug!("Cancel requested without an active download");
            return false;
        };

        active.gate.close();
        if let Some(poll) = active.poll {
            poll.abort();
        }
        self.shared.backend.remove(active.transfer_id);

        info!("Download canceled");
        self.shared.emit(&active.handler, None, DownloadEvent::Canceled);
        true
    }

    /// Whether a download is in flight.
    pub fn is_active(&self) -> bool {
        self.shared.slot().is_some()
    }

    /// Where the package for `info` is written: `update_<name>_<code>.<ext>`.
    pub fn destination_for(&self, info: &UpdateInfo) -> PathBuf {
        let name: String = info
            .new_version_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        let extension = package_extension(&info.download_url);
        self.settings
            .download_dir
            .join(format!("update_{name}_{}.{extension}", info.new_version_code))
    }
}

impl Drop for DownloadTracker {
    fn drop(&mut self) {
        if let Some(active) = self.shared.slot().as_mut()
            && let Some(poll) = active.poll.take()
        {
            poll.abort();
        }
    }
}

fn prepare_destination(destination: &Path) -> Result<(), UpdateError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            UpdateError::storage(format!(
                "Failed to create download directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    if destination.exists() {
        debug!("Removing previous download at {}", destination.display());
        std::fs::remove_file(destination).map_err(|e| {
            UpdateError::storage(format!(
                "Failed to remove existing file {}: {e}",
                destination.display()
            ))
        })?;
    }
    Ok(())
}

/// Extension of the last URL path segment, or the default package extension.
fn package_extension(download_url: &str) -> String {
    reqwest::Url::parse(download_url)
        .ok()
        .and_then(|url| {
            let segment = url.path_segments()?.next_back()?.to_string();
            let (_, ext) = segment.rsplit_once('.')?;
            (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_PACKAGE_EXTENSION.to_string())
}

struct PollContext {
    shared: Arc<Shared>,
    task_id: u64,
    transfer_id: TransferId,
    destination: PathBuf,
    checksum: String,
    fallback_total: i64,
    poll_interval: Duration,
    verify_checksum: bool,
    gate: Arc<EmissionGate>,
    handler: DownloadHandler,
}

async fn poll_transfer(ctx: PollContext) {
    let mut meter = ProgressMeter::new(ctx.fallback_total);

    loop {
        tokio::time::sleep(ctx.poll_interval).await;
        if ctx.gate.is_closed() {
            return;
        }

        let Some(snapshot) = ctx.shared.backend.query(ctx.transfer_id) else {
            fail(&ctx, TransferFailure::Unknown("transfer is no longer known".to_string()).to_error());
            return;
        };

        match snapshot.status {
            DownloadStatus::Succeeded => {
                finish(&ctx, &meter).await;
                return;
            }
            DownloadStatus::Failed => {
                let failure = snapshot
                    .failure
                    .unwrap_or_else(|| TransferFailure::Unknown(String::new()));
                fail(&ctx, failure.to_error());
                return;
            }
            DownloadStatus::Canceled => {
                if let Some(active) = ctx.shared.take_if_current(ctx.task_id) {
                    info!("Transfer was canceled outside the updater");
                    ctx.shared.backend.remove(active.transfer_id);
                    ctx.shared.emit(&ctx.handler, None, DownloadEvent::Canceled);
                }
                return;
            }
            DownloadStatus::Pending | DownloadStatus::Running | DownloadStatus::Paused => {
                let progress = meter.sample(&snapshot, Instant::now());
                debug!(
                    "Download progress: {}% ({} / {})",
                    progress.percent,
                    format_file_size(progress.downloaded_bytes),
                    format_file_size(progress.total_bytes)
                );
                ctx.shared.emit(&ctx.handler, Some(&ctx.gate), DownloadEvent::Progress(progress));
            }
        }
    }
}

async fn finish(ctx: &PollContext, meter: &ProgressMeter) {
    let file_len = match tokio::fs::metadata(&ctx.destination).await {
        Ok(metadata) if metadata.len() > 0 => metadata.len() as i64,
        _ => {
            fail(
                ctx,
                TransferFailure::FileError(format!(
                    "{} is missing or empty",
                    ctx.destination.display()
                ))
                .to_error(),
            );
            return;
        }
    };

    if ctx.verify_checksum
        && !ctx.checksum.trim().is_empty()
        && let Err(e) = ChecksumVerifier::verify(&ctx.destination, &ctx.checksum).await
    {
        fail(ctx, e);
        return;
    }

    let Some(active) = ctx.shared.take_if_current(ctx.task_id) else {
        return;
    };
    ctx.shared.backend.remove(active.transfer_id);

    info!("Download complete: {} ({})", ctx.destination.display(), format_file_size(file_len));
    ctx.shared.emit(
        &ctx.handler,
        Some(&ctx.gate),
        DownloadEvent::Progress(meter.complete(file_len)),
    );
    ctx.shared.emit(
        &ctx.handler,
        Some(&ctx.gate),
        DownloadEvent::Completed(ctx.destination.clone()),
    );
}

fn fail(ctx: &PollContext, error: UpdateError) {
    let Some(active) = ctx.shared.take_if_current(ctx.task_id) else {
        return;
    };
    ctx.shared.backend.remove(active.transfer_id);

    error!("Download failed: {error}");
    ctx.shared.emit(&ctx.handler, Some(&ctx.gate), DownloadEvent::Failed(error));
}

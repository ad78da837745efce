//! In-memory stand-ins for the updater's collaborators.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::check::VersionCheck;
use crate::core::UpdateError;
use crate::download::{TransferBackend, TransferFailure, TransferId, TransferRequest, TransferSnapshot};
use crate::install::{InstallLauncher, PlatformPermissions, SettingsSurface};
use crate::models::{DownloadStatus, UpdateInfo};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Version check that answers with a fixed result.
pub struct FakeVersionCheck {
    result: Mutex<Result<UpdateInfo, UpdateError>>,
    calls: AtomicUsize,
}

impl FakeVersionCheck {
    pub fn returning(result: Result<UpdateInfo, UpdateError>) -> Self {
        Self {
            result: Mutex::new(result),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_result(&self, result: Result<UpdateInfo, UpdateError>) {
        *lock(&self.result) = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VersionCheck for FakeVersionCheck {
    fn check<'a>(
        &'a self,
        _current_version_code: i64,
        _app_id: &'a str,
    ) -> BoxFuture<'a, Result<UpdateInfo, UpdateError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = lock(&self.result).clone();
        Box::pin(async move { result })
    }
}

#[derive(Default)]
struct BackendState {
    transfers: HashMap<TransferId, (TransferRequest, TransferSnapshot)>,
    order: Vec<(TransferId, TransferRequest)>,
    removed: Vec<TransferId>,
    refusal: Option<TransferFailure>,
}

/// Transfer backend whose transfers are advanced by the test.
///
/// The `set_*`, `complete` and `fail` methods act on the most recently
/// enqueued transfer.
#[derive(Default)]
pub struct FakeTransferBackend {
    state: Mutex<BackendState>,
}

impl FakeTransferBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next enqueue calls fail with `failure`.
    pub fn refuse_enqueue(&self, failure: TransferFailure) {
        lock(&self.state).refusal = Some(failure);
    }

    pub fn enqueued(&self) -> Vec<TransferRequest> {
        lock(&self.state).order.iter().map(|(_, request)| request.clone()).collect()
    }

    pub fn removed(&self) -> Vec<TransferId> {
        lock(&self.state).removed.clone()
    }

    pub fn latest(&self) -> Option<TransferId> {
        lock(&self.state).order.last().map(|(id, _)| *id)
    }

    fn update(&self, apply: impl FnOnce(&TransferRequest, &mut TransferSnapshot)) {
        let mut state = lock(&self.state);
        let Some((id, _)) = state.order.last().cloned() else {
            return;
        };
        if let Some((request, snapshot)) = state.transfers.get_mut(&id) {
            apply(request, snapshot);
        }
    }

    pub fn set_progress(&self, downloaded: i64, total: i64) {
        self.update(|_, snapshot| {
            snapshot.status = DownloadStatus::Running;
            snapshot.downloaded_bytes = downloaded;
            snapshot.total_bytes = total;
        });
    }

    pub fn set_status(&self, status: DownloadStatus) {
        self.update(|_, snapshot| snapshot.status = status);
    }

    /// Write `content` to the destination and report success.
    pub fn complete(&self, content: &[u8]) {
        self.update(|request, snapshot| {
            if let Some(parent) = request.destination.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&request.destination, content).unwrap();
            snapshot.status = DownloadStatus::Succeeded;
            snapshot.downloaded_bytes = content.len() as i64;
            snapshot.total_bytes = content.len() as i64;
        });
    }

    pub fn fail(&self, failure: TransferFailure) {
        self.update(|_, snapshot| {
            snapshot.status = DownloadStatus::Failed;
            snapshot.failure = Some(failure);
        });
    }
}

impl TransferBackend for FakeTransferBackend {
    fn enqueue(&self, request: TransferRequest) -> Result<TransferId, UpdateError> {
        let mut state = lock(&self.state);
        if let Some(failure) = &state.refusal {
            return Err(failure.to_error());
        }
        let id = TransferId::new_v4();
        state.transfers.insert(id, (request.clone(), TransferSnapshot::pending()));
        state.order.push((id, request));
        Ok(id)
    }

    fn query(&self, id: TransferId) -> Option<TransferSnapshot> {
        lock(&self.state).transfers.get(&id).map(|(_, snapshot)| snapshot.clone())
    }

    fn remove(&self, id: TransferId) {
        let mut state = lock(&self.state);
        state.transfers.remove(&id);
        state.removed.push(id);
    }
}

/// Permission state toggled by the test.
pub struct FakePermissions {
    granted: AtomicBool,
    openable: Mutex<Vec<SettingsSurface>>,
    opened: Mutex<Vec<SettingsSurface>>,
    checks: AtomicUsize,
}

impl FakePermissions {
    fn with_grant(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            openable: Mutex::new(SettingsSurface::FALLBACK_ORDER.to_vec()),
            opened: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::with_grant(true)
    }

    pub fn denied() -> Self {
        Self::with_grant(false)
    }

    pub fn grant(&self) {
        self.granted.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }

    /// Surfaces that open successfully; all of them by default.
    pub fn set_openable(&self, surfaces: &[SettingsSurface]) {
        *lock(&self.openable) = surfaces.to_vec();
    }

    /// Every surface an open was attempted on, in order.
    pub fn opened(&self) -> Vec<SettingsSurface> {
        lock(&self.opened).clone()
    }

    /// How many times the permission state was queried.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl PlatformPermissions for FakePermissions {
    fn can_install(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.granted.load(Ordering::SeqCst)
    }

    fn open_settings(&self, surface: SettingsSurface) -> bool {
        lock(&self.opened).push(surface);
        lock(&self.openable).contains(&surface)
    }
}

/// Launcher that records packages instead of running them.
#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<PathBuf>>,
    failure: Mutex<Option<String>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: &str) {
        *lock(&self.failure) = Some(reason.to_string());
    }

    pub fn launched(&self) -> Vec<PathBuf> {
        lock(&self.launched).clone()
    }
}

impl InstallLauncher for RecordingLauncher {
    fn launch(&self, package_path: &Path) -> Result<(), UpdateError> {
        if let Some(reason) = lock(&self.failure).clone() {
            return Err(UpdateError::InstallLaunchFailed {
                reason,
            });
        }
        lock(&self.launched).push(package_path.to_path_buf());
        Ok(())
    }
}

//! The update workflow: check, download, permission gate, install.
//!
//! [`Updater`] wires the components together and owns the session. It
//! allows at most one download and one pending install at a time, chains a
//! completed download into the install step when `auto_install` is enabled,
//! and recovers an install that was parked while the user granted permission
//! ([`Updater::resume_pending_install`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use app_updater::config::UpdaterConfig;
//! use app_updater::orchestrator::Updater;
//!
//! # async fn example() -> Result<(), app_updater::core::UpdateError> {
//! let config = UpdaterConfig::builder()
//!     .base_url("https://updates.example.com/api")
//!     .app_id("com.example.app")
//!     .current_version_code(12)
//!     .build()?;
//!
//! let updater = Updater::builder(config)
//!     .offer_handler(|offer| {
//!         let _ = offer.accept(None);
//!     })
//!     .build()?;
//!
//! // Pick up an install that was waiting for permission.
//! updater.resume_pending_install()?;
//!
//! updater.check_update(|result| match result {
//!     Ok(info) if info.has_update => println!("update {}", info.new_version_name),
//!     Ok(_) => println!("up to date"),
//!     Err(e) => eprintln!("check failed: {e}"),
//! });
//! # Ok(())
//! # }
//! ```

mod offer;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::check::{UpdateClient, VersionCheck};
use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::dispatch::{CallbackExecutor, SerialExecutor};
use crate::download::{
    DownloadEvent, DownloadHandler, DownloadTracker, HttpTransferBackend, TrackerSettings,
    TransferBackend,
};
use crate::install::{
    CommandLauncher, DirectoryPermissions, FileLedger, InstallEvent, InstallHandler,
    InstallInvoker, InstallLauncher, PendingInstall, PendingInstallStore, PermissionGate,
    PermissionSummary, PlatformPermissions,
};
use crate::models::UpdateInfo;

pub use offer::{OfferHandler, UpdateOffer};

/// What the updater is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Checking,
    Downloading,
    /// An install is parked in the ledger waiting for permission.
    AwaitingPermission,
}

#[derive(Default)]
struct Hooks {
    offer: Option<OfferHandler>,
    install: Option<InstallHandler>,
    download: Option<DownloadHandler>,
}

struct Inner {
    config: UpdaterConfig,
    version_check: Arc<dyn VersionCheck>,
    tracker: DownloadTracker,
    invoker: InstallInvoker,
    executor: Arc<dyn CallbackExecutor>,
    hooks: RwLock<Hooks>,
    checks_in_flight: AtomicUsize,
    runtime: Handle,
}

impl Inner {
    fn hooks(&self) -> RwLockReadGuard<'_, Hooks> {
        self.hooks.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn hooks_mut(&self) -> RwLockWriteGuard<'_, Hooks> {
        self.hooks.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn default_install_handler(&self) -> InstallHandler {
        self.hooks().install.clone().unwrap_or_else(|| Arc::new(log_install_event))
    }
}

/// Drives the update workflow. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Updater {
    inner: Arc<Inner>,
}

impl Updater {
    /// Updater with the production collaborators for `config`.
    ///
    /// # Errors
    ///
    /// See [`UpdaterBuilder::build`].
    pub fn new(config: UpdaterConfig) -> Result<Self, UpdateError> {
        Self::builder(config).build()
    }

    pub fn builder(config: UpdaterConfig) -> UpdaterBuilder {
        UpdaterBuilder::new(config)
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.inner.config
    }

    /// Check for an update in the background and deliver the result to `callback`.
    ///
    /// When an update is available, `auto_offer` is enabled and an offer
    /// handler is registered, the handler receives an [`UpdateOffer`] after
    /// the callback has run.
    pub fn check_update<F>(&self, callback: F)
    where
        F: FnOnce(Result<UpdateInfo, UpdateError>) + Send + 'static,
    {
        let updater = self.clone();
        self.inner.runtime.spawn(async move {
            let result = updater.check().await;

            let offer = match &result {
                Ok(info) if info.has_update && updater.inner.config.auto_offer => {
                    updater.inner.hooks().offer.clone().map(|handler| (handler, info.clone()))
                }
                _ => None,
            };

            updater.inner.executor.execute(Box::new(move || callback(result)));

            if let Some((handler, info)) = offer {
                debug!("Offering update {}", info.new_version_name);
                let offer = UpdateOffer::new(info, updater.clone());
                updater.inner.executor.execute(Box::new(move || handler(offer)));
            }
        });
    }

    /// Check for an update and return the result directly.
    pub async fn check(&self) -> Result<UpdateInfo, UpdateError> {
        let inner = &self.inner;
        inner.checks_in_flight.fetch_add(1, Ordering::SeqCst);
        let result =
            inner.version_check.check(inner.config.current_version_code, &inner.config.app_id).await;
        inner.checks_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Err(e) = &result {
            warn!("Update check failed: {e}");
        }
        result
    }

    /// Download `info`, reporting to `handler` (or the registered download handler).
    ///
    /// On completion the download chains into [`install`](Self::install) with
    /// the registered install handler when `auto_install` is enabled.
    ///
    /// # Errors
    ///
    /// [`UpdateError::DownloadAlreadyActive`] while another download runs; the
    /// running one is not disturbed. Otherwise see [`DownloadTracker::try_start`].
    pub fn start_download(
        &self,
        info: &UpdateInfo,
        handler: Option<DownloadHandler>,
    ) -> Result<(), UpdateError> {
        let user_handler = handler
            .or_else(|| self.inner.hooks().download.clone())
            .unwrap_or_else(|| Arc::new(|_| {}));

        let handler: DownloadHandler = if self.inner.config.auto_install {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            Arc::new(move |event: DownloadEvent| {
                let completed = match &event {
                    DownloadEvent::Completed(path) => Some(path.clone()),
                    _ => None,
                };
                user_handler(event);

                if let Some(path) = completed
                    && let Some(inner) = weak.upgrade()
                {
                    info!("Download finished, installing {}", path.display());
                    let handler = inner.default_install_handler();
                    inner.invoker.install(&path, handler);
                }
            })
        } else {
            user_handler
        };

        self.inner.tracker.try_start(info, handler)
    }

    /// Cancel the active download; `false` when there was none.
    pub fn cancel_download(&self) -> bool {
        self.inner.tracker.cancel()
    }

    /// Install a package, reporting to `handler` (or the registered install handler).
    pub fn install(&self, package_path: &Path, handler: Option<InstallHandler>) {
        let handler = handler.unwrap_or_else(|| self.inner.default_install_handler());
        self.inner.invoker.install(package_path, handler);
    }

    /// Continue an install that was parked waiting for permission.
    ///
    /// Call this when the application returns to the foreground. Returns
    /// `false` when nothing was pending. Otherwise the ledger is cleared and
    /// the install either runs again on the same package (permission granted)
    /// or the install handler receives [`UpdateError::InstallPermissionDenied`].
    ///
    /// # Errors
    ///
    /// [`UpdateError::Storage`] when the ledger cannot be cleared.
    pub fn resume_pending_install(&self) -> Result<bool, UpdateError> {
        let handler = self.inner.default_install_handler();
        self.resume_pending_install_with(handler)
    }

    /// [`resume_pending_install`](Self::resume_pending_install) with an explicit handler.
    pub fn resume_pending_install_with(&self, handler: InstallHandler) -> Result<bool, UpdateError> {
        let invoker = &self.inner.invoker;
        let Some(pending) = invoker.ledger().get() else {
            debug!("No pending install to resume");
            return Ok(false);
        };

        invoker.ledger().clear()?;
        if invoker.gate().has_install_permission() {
            info!("Install permission granted, resuming {}", pending.package_path.display());
            invoker.install(&pending.package_path, handler);
        } else {
            info!("Install permission still missing, dropping pending install");
            self.inner
                .executor
                .execute(Box::new(move || handler(InstallEvent::Failed(UpdateError::InstallPermissionDenied))));
        }
        Ok(true)
    }

    pub fn pending_install(&self) -> Option<PendingInstall> {
        self.inner.invoker.ledger().get()
    }

    pub fn state(&self) -> SessionState {
        if self.inner.checks_in_flight.load(Ordering::SeqCst) > 0 {
            SessionState::Checking
        } else if self.inner.tracker.is_active() {
            SessionState::Downloading
        } else if self.pending_install().is_some() {
            SessionState::AwaitingPermission
        } else {
            SessionState::Idle
        }
    }

    pub fn has_install_permission(&self) -> bool {
        self.inner.invoker.gate().has_install_permission()
    }

    pub fn request_install_permission(&self) -> bool {
        self.inner.invoker.gate().request_install_permission()
    }

    pub fn permission_summary(&self) -> PermissionSummary {
        self.inner.invoker.gate().summary()
    }

    pub fn set_offer_handler(&self, handler: Option<OfferHandler>) {
        self.inner.hooks_mut().offer = handler;
    }

    pub fn set_install_handler(&self, handler: Option<InstallHandler>) {
        self.inner.hooks_mut().install = handler;
    }

    pub fn set_download_handler(&self, handler: Option<DownloadHandler>) {
        self.inner.hooks_mut().download = handler;
    }

    /// Drop all registered handlers. An in-flight download keeps running.
    pub fn release(&self) {
        *self.inner.hooks_mut() = Hooks::default();
        debug!("Updater handlers released");
    }
}

fn log_install_event(event: InstallEvent) {
    match event {
        InstallEvent::Started(path) => info!("Installer started for {}", path.display()),
        InstallEvent::PermissionRequired(prompt) => {
            // Nobody to ask; the parked install is picked up again by resume.
            info!("Install permission required for {}", prompt.package_path().display());
            let _ = prompt.confirm();
        }
        InstallEvent::Failed(e) => warn!("Install failed: {e}"),
    }
}

/// Assembles an [`Updater`], with production collaborators for anything not supplied.
pub struct UpdaterBuilder {
    config: UpdaterConfig,
    version_check: Option<Arc<dyn VersionCheck>>,
    transfer_backend: Option<Arc<dyn TransferBackend>>,
    permissions: Option<Arc<dyn PlatformPermissions>>,
    launcher: Option<Arc<dyn InstallLauncher>>,
    ledger: Option<Arc<dyn PendingInstallStore>>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    hooks: Hooks,
}

impl UpdaterBuilder {
    pub fn new(config: UpdaterConfig) -> Self {
        Self {
            config,
            version_check: None,
            transfer_backend: None,
            permissions: None,
            launcher: None,
            ledger: None,
            executor: None,
            hooks: Hooks::default(),
        }
    }

    pub fn version_check(mut self, version_check: Arc<dyn VersionCheck>) -> Self {
        self.version_check = Some(version_check);
        self
    }

    pub fn transfer_backend(mut self, backend: Arc<dyn TransferBackend>) -> Self {
        self.transfer_backend = Some(backend);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PlatformPermissions>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn InstallLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn PendingInstallStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn offer_handler(mut self, handler: impl Fn(UpdateOffer) + Send + Sync + 'static) -> Self {
        self.hooks.offer = Some(Arc::new(handler));
        self
    }

    pub fn install_handler(mut self, handler: impl Fn(InstallEvent) + Send + Sync + 'static) -> Self {
        self.hooks.install = Some(Arc::new(handler));
        self
    }

    pub fn download_handler(
        mut self,
        handler: impl Fn(DownloadEvent) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.download = Some(Arc::new(handler));
        self
    }

    /// Validate the config and build the updater.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`UpdateError::InvalidConfig`] for an invalid config, and
    /// [`UpdateError::Unknown`] outside a tokio runtime.
    pub fn build(self) -> Result<Updater, UpdateError> {
        let config = self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| UpdateError::Unknown {
            message: "the updater must be created inside a tokio runtime".to_string(),
        })?;

        let executor: Arc<dyn CallbackExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(SerialExecutor::with_handle(&runtime)),
        };
        let version_check: Arc<dyn VersionCheck> = match self.version_check {
            Some(version_check) => version_check,
            None => Arc::new(UpdateClient::new(&config)?),
        };
        let transfer_backend: Arc<dyn TransferBackend> = match self.transfer_backend {
            Some(backend) => backend,
            None => Arc::new(HttpTransferBackend::new()?),
        };
        let permissions = self
            .permissions
            .unwrap_or_else(|| Arc::new(DirectoryPermissions::new(config.install_dir())));
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(CommandLauncher::new(config.installer_command.clone())));
        let ledger = self.ledger.unwrap_or_else(|| Arc::new(FileLedger::new(config.ledger_path())));

        let tracker = DownloadTracker::new(
            transfer_backend,
            Arc::clone(&executor),
            TrackerSettings::from(&config),
        )?;
        let gate = PermissionGate::new(permissions);
        info!("Updater ready for {} ({})", config.app_id, gate.summary());
        let invoker = InstallInvoker::new(gate, launcher, ledger, Arc::clone(&executor));

        Ok(Updater {
            inner: Arc::new(Inner {
                config,
                version_check,
                tracker,
                invoker,
                executor,
                hooks: RwLock::new(self.hooks),
                checks_in_flight: AtomicUsize::new(0),
                runtime,
            }),
        })
    }
}

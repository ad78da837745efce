//! Process-wide updater.
//!
//! [`AppUpdater`] holds one [`Updater`] for the whole process, for hosts that
//! prefer a global entry point over passing an `Updater` around. Every
//! operation fails with [`UpdateError::NotInitialized`] until
//! [`AppUpdater::init`] has run, and that check comes before anything else.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::download::DownloadHandler;
use crate::install::InstallHandler;
use crate::models::UpdateInfo;
use crate::orchestrator::{SessionState, Updater, UpdaterBuilder};

static INSTANCE: RwLock<Option<Updater>> = RwLock::new(None);

fn instance() -> RwLockReadGuard<'static, Option<Updater>> {
    INSTANCE.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn instance_mut() -> RwLockWriteGuard<'static, Option<Updater>> {
    INSTANCE.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Entry points on the process-wide updater.
pub struct AppUpdater;

impl AppUpdater {
    /// Initialize with production collaborators. Re-initializing replaces the
    /// previous instance.
    ///
    /// # Errors
    ///
    /// See [`UpdaterBuilder::build`].
    pub fn init(config: UpdaterConfig) -> Result<(), UpdateError> {
        Self::init_with(Updater::builder(config))
    }

    /// Initialize from a prepared builder (custom collaborators or handlers).
    pub fn init_with(builder: UpdaterBuilder) -> Result<(), UpdateError> {
        let updater = builder.build()?;
        let mut slot = instance_mut();
        if slot.is_some() {
            warn!("Updater was already initialized; replacing it");
        }
        *slot = Some(updater);
        info!("Updater initialized");
        Ok(())
    }

    pub fn is_initialized() -> bool {
        instance().is_some()
    }

    /// A handle to the process-wide updater.
    ///
    /// # Errors
    ///
    /// [`UpdateError::NotInitialized`] before [`init`](Self::init).
    pub fn get() -> Result<Updater, UpdateError> {
        instance().clone().ok_or(UpdateError::NotInitialized)
    }

    /// Drop the process-wide updater. Handlers are released; an in-flight
    /// download is left running.
    pub fn release() {
        if let Some(updater) = instance_mut().take() {
            updater.release();
            info!("Updater released");
        }
    }

    pub fn check_update<F>(callback: F) -> Result<(), UpdateError>
    where
        F: FnOnce(Result<UpdateInfo, UpdateError>) + Send + 'static,
    {
        Self::get()?.check_update(callback);
        Ok(())
    }

    pub fn start_download(
        info: &UpdateInfo,
        handler: Option<DownloadHandler>,
    ) -> Result<(), UpdateError> {
        Self::get()?.start_download(info, handler)
    }

    pub fn cancel_download() -> Result<bool, UpdateError> {
        Ok(Self::get()?.cancel_download())
    }

    pub fn install(package_path: &Path, handler: Option<InstallHandler>) -> Result<(), UpdateError> {
        Self::get()?.install(package_path, handler);
        Ok(())
    }

    pub fn resume_pending_install() -> Result<bool, UpdateError> {
        Self::get()?.resume_pending_install()
    }

    pub fn has_install_permission() -> Result<bool, UpdateError> {
        Ok(Self::get()?.has_install_permission())
    }

    pub fn request_install_permission() -> Result<bool, UpdateError> {
        Ok(Self::get()?.request_install_permission())
    }

    pub fn state() -> Result<SessionState, UpdateError> {
        Ok(Self::get()?.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::MemoryLedger;
    use crate::test_utils::{FakeTransferBackend, FakeVersionCheck};
    use serial_test::serial;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_operations_require_init() {
        AppUpdater::release();

        assert!(!AppUpdater::is_initialized());
        assert_eq!(AppUpdater::cancel_download(), Err(UpdateError::NotInitialized));
        assert_eq!(AppUpdater::resume_pending_install(), Err(UpdateError::NotInitialized));
        assert_eq!(
            AppUpdater::install(Path::new("/does/not/exist.pkg"), None),
            Err(UpdateError::NotInitialized)
        );
        assert_eq!(
            AppUpdater::start_download(&UpdateInfo::none(), None),
            Err(UpdateError::NotInitialized)
        );
        assert!(AppUpdater::check_update(|_| {}).is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_init_and_release() {
        let temp = TempDir::new().unwrap();
        let config = UpdaterConfig::builder()
            .base_url("http://127.0.0.1:9")
            .app_id("com.example.app")
            .download_dir(temp.path())
            .build()
            .unwrap();

        AppUpdater::init_with(
            Updater::builder(config)
                .version_check(Arc::new(FakeVersionCheck::returning(Ok(UpdateInfo::none()))))
                .transfer_backend(Arc::new(FakeTransferBackend::new()))
                .ledger(Arc::new(MemoryLedger::new())),
        )
        .unwrap();

        assert!(AppUpdater::is_initialized());
        assert_eq!(AppUpdater::state(), Ok(SessionState::Idle));
        assert_eq!(AppUpdater::cancel_download(), Ok(false));
        assert_eq!(AppUpdater::resume_pending_install(), Ok(false));

        AppUpdater::release();
        assert!(!AppUpdater::is_initialized());
    }
}

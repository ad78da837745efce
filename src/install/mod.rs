//! Installing a downloaded package.
//!
//! [`InstallInvoker::install`] validates the package, checks install
//! permission, and either hands the package to the [`InstallLauncher`] or
//! parks it in the [`PendingInstallStore`] and asks the caller, through a
//! [`PermissionPrompt`], whether to send the user to the permission settings.
//!
//! The ledger entry is written *before* the prompt is shown, so an install
//! that is interrupted while the user is in the settings is recovered by
//! [`Updater::resume_pending_install`](crate::orchestrator::Updater::resume_pending_install).

pub mod launcher;
pub mod ledger;
pub mod permission;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::UpdateError;
use crate::dispatch::CallbackExecutor;

pub use launcher::{CommandLauncher, InstallLauncher};
pub use ledger::{FileLedger, MemoryLedger, PendingInstall, PendingInstallStore};
pub use permission::{
    DirectoryPermissions, PermissionGate, PermissionSummary, PlatformPermissions, SettingsSurface,
};

/// Something that happened to an install request.
#[derive(Debug)]
pub enum InstallEvent {
    /// The installer was started for this package.
    Started(PathBuf),
    /// Install permission is missing; resolve the prompt to continue.
    PermissionRequired(PermissionPrompt),
    Failed(UpdateError),
}

/// Receives the events of install requests.
pub type InstallHandler = Arc<dyn Fn(InstallEvent) + Send + Sync>;

/// The caller's decision point when install permission is missing.
///
/// Exactly one of [`confirm`](Self::confirm) or [`cancel`](Self::cancel) can
/// be called, since both consume the prompt. Dropping an unresolved prompt
/// counts as cancel.
///
/// The prompt owns the ledger entry written for it. Once that entry has been
/// consumed elsewhere (by a resume), the prompt is inert: `confirm` returns
/// `false` and neither call reports anything further.
pub struct PermissionPrompt {
    context: Option<PromptContext>,
}

struct PromptContext {
    package_path: PathBuf,
    entry: PendingInstall,
    gate: PermissionGate,
    ledger: Arc<dyn PendingInstallStore>,
    executor: Arc<dyn CallbackExecutor>,
    handler: InstallHandler,
}

impl PromptContext {
    /// Whether the ledger still holds the entry recorded for this prompt.
    fn owns_entry(&self) -> bool {
        self.ledger.get().is_some_and(|current| current == self.entry)
    }

    fn abandon(self, error: UpdateError) {
        if !self.owns_entry() {
            debug!("Pending install of {} was already consumed", self.package_path.display());
            return;
        }

        if let Err(e) = self.ledger.clear() {
            warn!("Failed to clear pending install: {e}");
        }
        let handler = self.handler;
        self.executor.execute(Box::new(move || handler(InstallEvent::Failed(error))));
    }
}

impl PermissionPrompt {
    /// Package waiting for permission.
    pub fn package_path(&self) -> &Path {
        self.context.as_ref().map_or_else(|| Path::new(""), |ctx| ctx.package_path.as_path())
    }

    /// Send the user to the permission settings.
    ///
    /// Returns `true` when a settings surface opened; the install continues
    /// when the application resumes. When nothing opens, the pending install
    /// is cleared and the handler receives
    /// [`UpdateError::PermissionSettingsUnavailable`]. Returns `false`
    /// without opening anything when the pending install was already
    /// consumed by a resume.
    pub fn confirm(mut self) -> bool {
        let Some(context) = self.context.take() else {
            return false;
        };
        if !context.owns_entry() {
            debug!(
                "Pending install of {} was already consumed; not opening settings",
                context.package_path.display()
            );
            return false;
        }

        if context.gate.request_install_permission() {
            info!(
                "Waiting for install permission; {} stays pending",
                context.package_path.display()
            );
            true
        } else {
            context.abandon(UpdateError::PermissionSettingsUnavailable);
            false
        }
    }

    /// Decline: the pending install is cleared and the handler receives
    /// [`UpdateError::InstallPermissionDenied`].
    pub fn cancel(mut self) {
        if let Some(context) = self.context.take() {
            info!("Install permission request declined");
            context.abandon(UpdateError::InstallPermissionDenied);
        }
    }
}

impl Drop for PermissionPrompt {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            debug!("Permission prompt dropped without a decision");
            context.abandon(UpdateError::InstallPermissionDenied);
        }
    }
}

impl fmt::Debug for PermissionPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionPrompt").field("package_path", &self.package_path()).finish()
    }
}

/// Runs the validate, gate, invoke sequence for a package.
pub struct InstallInvoker {
    gate: PermissionGate,
    launcher: Arc<dyn InstallLauncher>,
    ledger: Arc<dyn PendingInstallStore>,
    executor: Arc<dyn CallbackExecutor>,
}

impl InstallInvoker {
    pub fn new(
        gate: PermissionGate,
        launcher: Arc<dyn InstallLauncher>,
        ledger: Arc<dyn PendingInstallStore>,
        executor: Arc<dyn CallbackExecutor>,
    ) -> Self {
        Self {
            gate,
            launcher,
            ledger,
            executor,
        }
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn ledger(&self) -> &Arc<dyn PendingInstallStore> {
        &self.ledger
    }

    /// Install `package_path`, reporting the outcome to `handler`.
    pub fn install(&self, package_path: &Path, handler: InstallHandler) {
        let event = match self.prepare(package_path, &handler) {
            Ok(event) => event,
            Err(e) => {
                warn!("Install of {} failed: {e}", package_path.display());
                InstallEvent::Failed(e)
            }
        };
        self.executor.execute(Box::new(move || handler(event)));
    }

    fn prepare(
        &self,
        package_path: &Path,
        handler: &InstallHandler,
    ) -> Result<InstallEvent, UpdateError> {
        if !package_path.is_file() {
            return Err(UpdateError::PackageFileMissing {
                path: package_path.to_path_buf(),
            });
        }

        if let Some(pending) = self.ledger.get() {
            return Err(UpdateError::InstallAlreadyPending {
                path: pending.package_path,
            });
        }

        if !self.gate.has_install_permission() {
            self.ledger.set(package_path)?;
            let entry = self
                .ledger
                .get()
                .ok_or_else(|| UpdateError::storage("Pending install was not recorded"))?;
            info!("Install permission required for {}", package_path.display());
            return Ok(InstallEvent::PermissionRequired(PermissionPrompt {
                context: Some(PromptContext {
                    package_path: package_path.to_path_buf(),
                    entry,
                    gate: self.gate.clone(),
                    ledger: Arc::clone(&self.ledger),
                    executor: Arc::clone(&self.executor),
                    handler: Arc::clone(handler),
                }),
            }));
        }

        self.launcher.launch(package_path)?;
        Ok(InstallEvent::Started(package_path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InlineExecutor;
    use crate::test_utils::{EventLog, FakePermissions, InstallRecord, PromptPolicy, RecordingLauncher};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        package: PathBuf,
        platform: Arc<FakePermissions>,
        launcher: Arc<RecordingLauncher>,
        ledger: Arc<MemoryLedger>,
        invoker: InstallInvoker,
    }

    fn fixture(granted: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("update_1.1.0_2.pkg");
        std::fs::write(&package, b"payload").unwrap();

        let platform = Arc::new(if granted { FakePermissions::granted() } else { FakePermissions::denied() });
        let launcher = Arc::new(RecordingLauncher::new());
        let ledger = Arc::new(MemoryLedger::new());
        let invoker = InstallInvoker::new(
            PermissionGate::new(platform.clone()),
            launcher.clone(),
            ledger.clone(),
            Arc::new(InlineExecutor),
        );

        Fixture {
            _temp: temp,
            package,
            platform,
            launcher,
            ledger,
            invoker,
        }
    }

    #[test]
    fn test_missing_package_never_checks_permission() {
        let fx = fixture(false);
        let log = EventLog::new();
        let missing = fx.package.with_file_name("nope.pkg");

        fx.invoker.install(&missing, log.install_handler(PromptPolicy::Keep));

        assert_eq!(
            log.install_events(),
            vec![InstallRecord::Failed(UpdateError::PackageFileMissing {
                path: missing
            })]
        );
        assert_eq!(fx.platform.checks(), 0);
        assert!(fx.ledger.get().is_none());
    }

    #[test]
    fn test_granted_launches() {
        let fx = fixture(true);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Keep));

        assert_eq!(log.install_events(), vec![InstallRecord::Started(fx.package.clone())]);
        assert_eq!(fx.launcher.launched(), vec![fx.package.clone()]);
    }

    #[test]
    fn test_launch_failure_is_reported() {
        let fx = fixture(true);
        fx.launcher.fail_with("no installer");
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Keep));

        assert!(matches!(
            log.install_events().as_slice(),
            [InstallRecord::Failed(UpdateError::InstallLaunchFailed { .. })]
        ));
    }

    #[test]
    fn test_denied_records_ledger_before_prompt() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Keep));

        assert_eq!(log.install_events(), vec![InstallRecord::PermissionRequired(fx.package.clone())]);
        assert_eq!(fx.ledger.get().unwrap().package_path, fx.package);
        assert!(fx.launcher.launched().is_empty());
    }

    #[test]
    fn test_cancel_clears_ledger() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Cancel));

        assert_eq!(
            log.install_events(),
            vec![
                InstallRecord::PermissionRequired(fx.package.clone()),
                InstallRecord::Failed(UpdateError::InstallPermissionDenied),
            ]
        );
        assert!(fx.ledger.get().is_none());
    }

    #[test]
    fn test_dropped_prompt_counts_as_cancel() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Keep));
        drop(log.take_prompts());

        assert_eq!(
            log.install_events().last(),
            Some(&InstallRecord::Failed(UpdateError::InstallPermissionDenied))
        );
        assert!(fx.ledger.get().is_none());
    }

    #[test]
    fn test_confirm_without_settings_surface() {
        let fx = fixture(false);
        fx.platform.set_openable(&[]);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Confirm));

        assert_eq!(
            log.install_events().last(),
            Some(&InstallRecord::Failed(UpdateError::PermissionSettingsUnavailable))
        );
        assert!(fx.ledger.get().is_none());
    }

    #[test]
    fn test_confirm_keeps_ledger() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Confirm));

        assert_eq!(log.install_events(), vec![InstallRecord::PermissionRequired(fx.package.clone())]);
        assert_eq!(fx.ledger.get().unwrap().package_path, fx.package);
        assert_eq!(fx.platform.opened(), vec![SettingsSurface::InstallSources]);
    }

    #[test]
    fn test_second_install_while_pending() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Confirm));
        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Confirm));

        assert_eq!(
            log.install_events().last(),
            Some(&InstallRecord::Failed(UpdateError::InstallAlreadyPending {
                path: fx.package.clone()
            }))
        );
    }

    #[test]
    fn test_prompt_is_inert_once_entry_is_consumed() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Keep));
        let prompt = log.take_prompts().pop().unwrap();
        fx.ledger.clear().unwrap();

        assert!(!prompt.confirm());
        assert!(fx.platform.opened().is_empty());
        assert_eq!(log.install_events(), vec![InstallRecord::PermissionRequired(fx.package.clone())]);
    }

    #[test]
    fn test_stale_prompt_leaves_newer_entry_alone() {
        let fx = fixture(false);
        let log = EventLog::new();

        fx.invoker.install(&fx.package, log.install_handler(PromptPolicy::Keep));
        let prompt = log.take_prompts().pop().unwrap();
        let newer = fx.package.with_file_name("update_1.2.0_3.pkg");
        fx.ledger.set(&newer).unwrap();

        prompt.cancel();

        assert_eq!(fx.ledger.get().unwrap().package_path, newer);
        assert_eq!(log.install_events(), vec![InstallRecord::PermissionRequired(fx.package.clone())]);
    }
}

//! End-to-end tests of the update session: download, install, permission
//! round trip and resume, with every platform collaborator faked.

use anyhow::Result;
use app_updater::config::UpdaterConfig;
use app_updater::core::UpdateError;
use app_updater::download::{ChecksumVerifier, DownloadEvent, TransferFailure};
use app_updater::install::{FileLedger, MemoryLedger, PendingInstallStore, SettingsSurface};
use app_updater::models::UpdateInfo;
use app_updater::orchestrator::{SessionState, Updater};
use app_updater::test_utils::{
    EventLog, FakePermissions, FakeTransferBackend, FakeVersionCheck, InstallRecord,
    PromptPolicy, RecordingLauncher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);
const PAYLOAD: &[u8] = b"payload";

struct Session {
    temp: TempDir,
    updater: Updater,
    backend: Arc<FakeTransferBackend>,
    permissions: Arc<FakePermissions>,
    launcher: Arc<RecordingLauncher>,
    ledger: Arc<dyn PendingInstallStore>,
    log: EventLog,
}

struct SessionOptions {
    granted: bool,
    auto_install: bool,
    policy: PromptPolicy,
    durable_ledger: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            granted: true,
            auto_install: true,
            policy: PromptPolicy::Keep,
            durable_ledger: false,
        }
    }
}

impl Session {
    fn start(options: SessionOptions) -> Self {
        app_updater::test_utils::init_test_logging(None);
        let temp = TempDir::new().unwrap();
        let config = UpdaterConfig::builder()
            .base_url("http://127.0.0.1:9")
            .app_id("com.example.app")
            .current_version_code(1)
            .download_dir(temp.path().join("downloads"))
            .poll_interval(Duration::from_millis(10))
            .auto_install(options.auto_install)
            .build()
            .unwrap();

        let backend = Arc::new(FakeTransferBackend::new());
        let permissions = Arc::new(if options.granted {
            FakePermissions::granted()
        } else {
            FakePermissions::denied()
        });
        let launcher = Arc::new(RecordingLauncher::new());
        let ledger: Arc<dyn PendingInstallStore> = if options.durable_ledger {
            Arc::new(FileLedger::new(temp.path().join("pending-install.json")))
        } else {
            Arc::new(MemoryLedger::new())
        };
        let log = EventLog::new();
        let install = log.install_handler(options.policy);

        let updater = Updater::builder(config)
            .version_check(Arc::new(FakeVersionCheck::returning(Ok(offer(false)))))
            .transfer_backend(backend.clone())
            .permissions(permissions.clone())
            .launcher(launcher.clone())
            .ledger(ledger.clone())
            .install_handler(move |event| install(event))
            .build()
            .unwrap();

        Self {
            temp,
            updater,
            backend,
            permissions,
            launcher,
            ledger,
            log,
        }
    }

    fn package(&self) -> PathBuf {
        let path = self.temp.path().join("update.pkg");
        std::fs::write(&path, PAYLOAD).unwrap();
        path
    }

    async fn wait_for_percent(&self, percent: u8) {
        assert!(
            self.log.wait_until(WAIT, |log| log.percents().last() == Some(&percent)).await,
            "never saw {percent}%: {:?}",
            self.log.download_events()
        );
    }

    async fn wait_for_install_events(&self, count: usize) {
        assert!(
            self.log.wait_until(WAIT, |log| log.install_events().len() >= count).await,
            "expected {count} install events, got {:?}",
            self.log.install_events()
        );
    }
}

fn offer(forced: bool) -> UpdateInfo {
    UpdateInfo {
        has_update: true,
        new_version_code: 2,
        new_version_name: "1.1.0".to_string(),
        description: "Bug fixes".to_string(),
        force_update: forced,
        download_url: "https://cdn.example.com/app-1.1.0.pkg".to_string(),
        file_size: PAYLOAD.len() as i64,
        checksum: String::new(),
    }
}

/// Full happy path: progress climbs to 100, the package lands on disk and the
/// installer is launched on it.
#[tokio::test]
async fn test_download_then_auto_install() -> Result<()> {
    let session = Session::start(SessionOptions::default());

    session.updater.start_download(&offer(false), Some(session.log.download_handler()))?;
    assert_eq!(session.updater.state(), SessionState::Downloading);

    session.backend.set_progress(2, 7);
    session.wait_for_percent(28).await;
    session.backend.set_progress(5, 7);
    session.wait_for_percent(71).await;
    session.backend.complete(PAYLOAD);
    assert!(session.log.wait_for_download_end(WAIT).await);

    let events = session.log.download_events();
    assert_eq!(events.first(), Some(&DownloadEvent::Started));
    let Some(DownloadEvent::Completed(path)) = events.last() else {
        panic!("download did not complete: {events:?}");
    };
    assert_eq!(std::fs::read(path)?, PAYLOAD);
    assert_eq!(path.file_name().unwrap(), "update_1.1.0_2.pkg");

    let percents = session.log.percents();
    assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]), "not monotonic: {percents:?}");
    assert_eq!(percents.last(), Some(&100));

    session.wait_for_install_events(1).await;
    assert_eq!(session.log.install_events(), vec![InstallRecord::Started(path.clone())]);
    assert_eq!(session.launcher.launched(), vec![path.clone()]);
    assert_eq!(session.updater.state(), SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_download_without_auto_install_stops_at_completion() -> Result<()> {
    let session = Session::start(SessionOptions {
        auto_install: false,
        ..Default::default()
    });

    session.updater.start_download(&offer(false), Some(session.log.download_handler()))?;
    session.backend.complete(PAYLOAD);
    assert!(session.log.wait_for_download_end(WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(session.log.download_events().last(), Some(DownloadEvent::Completed(_))));
    assert!(session.log.install_events().is_empty());
    assert!(session.launcher.launched().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_before_first_progress() -> Result<()> {
    let session = Session::start(SessionOptions::default());

    session.updater.start_download(&offer(false), Some(session.log.download_handler()))?;
    assert!(session.updater.cancel_download());
    assert!(!session.updater.cancel_download());
    assert!(session.log.wait_for_download_end(WAIT).await);

    // Give a stray poll the chance to misbehave.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        session.log.download_events(),
        vec![DownloadEvent::Started, DownloadEvent::Canceled]
    );
    assert_eq!(session.backend.removed().len(), 1);
    assert_eq!(session.updater.state(), SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_second_download_is_refused() -> Result<()> {
    let session = Session::start(SessionOptions::default());
    let other = EventLog::new();

    session.updater.start_download(&offer(false), Some(session.log.download_handler()))?;
    let err = session
        .updater
        .start_download(&offer(false), Some(other.download_handler()))
        .unwrap_err();
    assert_eq!(err, UpdateError::DownloadAlreadyActive);
    assert_eq!(session.backend.enqueued().len(), 1);

    // The first download is unaffected.
    session.backend.complete(PAYLOAD);
    assert!(session.log.wait_for_download_end(WAIT).await);
    assert!(matches!(session.log.download_events().last(), Some(DownloadEvent::Completed(_))));
    assert!(other.download_events().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_transport_failure_maps_reason_code() -> Result<()> {
    let session = Session::start(SessionOptions::default());

    session.updater.start_download(&offer(false), Some(session.log.download_handler()))?;
    session.backend.set_progress(3, 7);
    session.wait_for_percent(42).await;
    session.backend.fail(TransferFailure::InsufficientSpace);
    assert!(session.log.wait_for_download_end(WAIT).await);

    let Some(DownloadEvent::Failed(error)) = session.log.download_events().last().cloned() else {
        panic!("expected a failure: {:?}", session.log.download_events());
    };
    assert_eq!(error.code(), 1006);
    assert!(session.log.install_events().is_empty());
    assert_eq!(session.updater.state(), SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_checksum_mismatch_fails_download() -> Result<()> {
    let session = Session::start(SessionOptions::default());
    let mut info = offer(false);
    info.checksum = format!("sha256:{}", "0".repeat(64));

    session.updater.start_download(&info, Some(session.log.download_handler()))?;
    session.backend.complete(PAYLOAD);
    assert!(session.log.wait_for_download_end(WAIT).await);

    let events = session.log.download_events();
    assert!(
        matches!(events.last(), Some(DownloadEvent::Failed(UpdateError::ChecksumMismatch { .. }))),
        "{events:?}"
    );
    assert!(!events.iter().any(|event| matches!(event, DownloadEvent::Completed(_))));
    assert!(session.launcher.launched().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_matching_checksum_completes() -> Result<()> {
    let session = Session::start(SessionOptions {
        auto_install: false,
        ..Default::default()
    });
    let reference = session.package();
    let mut info = offer(false);
    info.checksum = ChecksumVerifier::compute_sha256(&reference).await?.to_uppercase();

    session.updater.start_download(&info, Some(session.log.download_handler()))?;
    session.backend.complete(PAYLOAD);
    assert!(session.log.wait_for_download_end(WAIT).await);
    assert!(matches!(session.log.download_events().last(), Some(DownloadEvent::Completed(_))));
    Ok(())
}

#[tokio::test]
async fn test_install_missing_package_skips_permission_check() {
    let session = Session::start(SessionOptions::default());
    let missing = session.temp.path().join("nope.pkg");

    session.updater.install(&missing, None);
    session.wait_for_install_events(1).await;

    assert!(matches!(
        session.log.install_events().as_slice(),
        [InstallRecord::Failed(UpdateError::PackageFileMissing { .. })]
    ));
    assert_eq!(session.permissions.checks(), 0);
    assert!(session.ledger.get().is_none());
}

#[tokio::test]
async fn test_permission_declined() {
    let session = Session::start(SessionOptions {
        granted: false,
        policy: PromptPolicy::Cancel,
        ..Default::default()
    });
    let package = session.package();

    session.updater.install(&package, None);
    session.wait_for_install_events(2).await;

    assert_eq!(
        session.log.install_events(),
        vec![
            InstallRecord::PermissionRequired(package),
            InstallRecord::Failed(UpdateError::InstallPermissionDenied),
        ]
    );
    assert!(session.ledger.get().is_none());
    assert!(session.launcher.launched().is_empty());
    assert_eq!(session.updater.state(), SessionState::Idle);
}

/// The user leaves to grant the permission and comes back: the parked
/// package is installed exactly once and the ledger is empty afterwards.
#[tokio::test]
async fn test_permission_round_trip_and_resume() {
    let session = Session::start(SessionOptions {
        granted: false,
        durable_ledger: true,
        ..Default::default()
    });
    session.permissions.set_openable(&[SettingsSurface::Security]);
    let package = session.package();

    session.updater.install(&package, None);
    session.wait_for_install_events(1).await;
    assert_eq!(session.ledger.get().unwrap().package_path, package);

    let prompt = session.log.take_prompts().pop().unwrap();
    assert!(prompt.confirm());
    assert_eq!(
        session.permissions.opened(),
        vec![SettingsSurface::InstallSources, SettingsSurface::Security]
    );
    assert_eq!(session.updater.state(), SessionState::AwaitingPermission);

    // Back from the settings screen with the permission granted.
    session.permissions.grant();
    assert!(session.updater.resume_pending_install().unwrap());
    session.wait_for_install_events(2).await;

    assert_eq!(
        session.log.install_events(),
        vec![
            InstallRecord::PermissionRequired(package.clone()),
            InstallRecord::Started(package.clone()),
        ]
    );
    assert_eq!(session.launcher.launched(), vec![package]);
    assert!(session.ledger.get().is_none());
    assert!(!session.updater.resume_pending_install().unwrap());
    assert_eq!(session.updater.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_resume_while_still_denied() {
    let session = Session::start(SessionOptions {
        granted: false,
        ..Default::default()
    });
    let package = session.package();

    session.updater.install(&package, None);
    session.wait_for_install_events(1).await;
    assert!(session.log.take_prompts().pop().unwrap().confirm());

    assert!(session.updater.resume_pending_install().unwrap());
    session.wait_for_install_events(2).await;
    assert_eq!(
        session.log.install_events().last(),
        Some(&InstallRecord::Failed(UpdateError::InstallPermissionDenied))
    );
    assert!(session.ledger.get().is_none());
    assert!(session.launcher.launched().is_empty());
    assert!(!session.updater.resume_pending_install().unwrap());
}

/// A resume that runs while the prompt is still open takes over the pending
/// install; the prompt must not report a second outcome afterwards.
#[tokio::test]
async fn test_resume_while_prompt_open_keeps_single_outcome() {
    let session = Session::start(SessionOptions {
        granted: false,
        ..Default::default()
    });
    let package = session.package();

    session.updater.install(&package, None);
    session.wait_for_install_events(1).await;
    let prompt = session.log.take_prompts().pop().unwrap();

    assert!(session.updater.resume_pending_install().unwrap());
    session.wait_for_install_events(2).await;
    assert_eq!(
        session.log.install_events().last(),
        Some(&InstallRecord::Failed(UpdateError::InstallPermissionDenied))
    );

    assert!(!prompt.confirm());
    assert!(session.permissions.opened().is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.log.install_events().len(), 2);
    assert!(session.ledger.get().is_none());

    // The user can still start over with a fresh install request.
    session.permissions.grant();
    session.updater.install(&package, None);
    session.wait_for_install_events(3).await;
    assert_eq!(session.launcher.launched(), vec![package]);
}

#[tokio::test]
async fn test_second_install_while_pending_fails_fast() {
    let session = Session::start(SessionOptions {
        granted: false,
        ..Default::default()
    });
    let package = session.package();

    session.updater.install(&package, None);
    session.wait_for_install_events(1).await;
    let _prompt = session.log.take_prompts();

    session.updater.install(&package, None);
    session.wait_for_install_events(2).await;
    assert!(matches!(
        session.log.install_events().last(),
        Some(InstallRecord::Failed(UpdateError::InstallAlreadyPending { .. }))
    ));
    assert_eq!(session.ledger.get().unwrap().package_path, package);
}

#[tokio::test]
async fn test_launch_failure_is_reported() {
    let session = Session::start(SessionOptions::default());
    session.launcher.fail_with("installer crashed");
    let package = session.package();

    session.updater.install(&package, None);
    session.wait_for_install_events(1).await;
    assert!(matches!(
        session.log.install_events().as_slice(),
        [InstallRecord::Failed(UpdateError::InstallLaunchFailed { .. })]
    ));
}

#[tokio::test]
async fn test_accepted_offer_starts_download() -> Result<()> {
    let session = Session::start(SessionOptions {
        auto_install: false,
        ..Default::default()
    });
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    session.updater.set_offer_handler(Some(Arc::new(move |offer| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(offer);
        }
    })));

    session.updater.check_update(|result| assert!(result.unwrap().has_update));
    let offer = tokio::time::timeout(WAIT, rx).await??;
    assert!(!offer.is_forced());
    offer.accept(Some(session.log.download_handler()))?;

    assert_eq!(session.backend.enqueued().len(), 1);
    assert_eq!(session.backend.enqueued()[0].url, "https://cdn.example.com/app-1.1.0.pkg");
    Ok(())
}

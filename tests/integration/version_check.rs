//! The version check and the package download over real HTTP, against a
//! local stub of the update service.

use anyhow::Result;
use app_updater::check::{UpdateClient, VersionCheck};
use app_updater::config::UpdaterConfig;
use app_updater::core::UpdateError;
use app_updater::download::DownloadEvent;
use app_updater::install::MemoryLedger;
use app_updater::orchestrator::Updater;
use app_updater::test_utils::{
    EventLog, FakePermissions, InstallRecord, PromptPolicy, RecordingLauncher, StubResponse,
    StubServer,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

fn config(base_url: &str) -> UpdaterConfig {
    UpdaterConfig::builder()
        .base_url(base_url)
        .app_id("com.example.app")
        .current_version_code(100)
        .channel("beta")
        .build()
        .unwrap()
}

fn update_body(download_url: &str, md5: Option<&str>) -> serde_json::Value {
    json!({
        "code": 200,
        "message": "success",
        "timestamp": 1_700_000_000_000_i64,
        "data": {
            "hasUpdate": true,
            "newVersionCode": 101,
            "newVersionName": "1.1.0",
            "updateDescription": "Faster startup",
            "forceUpdate": false,
            "downloadUrl": download_url,
            "fileSize": 25_600_000,
            "md5": md5
        }
    })
}

#[tokio::test]
async fn test_check_round_trip() -> Result<()> {
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(200, &update_body("https://cdn.example.com/app.pkg", None)),
    );

    let client = UpdateClient::new(&config(server.url()))?;
    let info = client.check(100, "com.example.app").await?;

    assert!(info.has_update);
    assert_eq!(info.new_version_code, 101);
    assert_eq!(info.new_version_name, "1.1.0");
    assert_eq!(info.description, "Faster startup");
    assert!(!info.force_update);
    assert_eq!(info.file_size, 25_600_000);
    assert_eq!(info.checksum, "");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/check-update");
    assert_eq!(
        requests[0].json(),
        json!({"appId": "com.example.app", "currentVersionCode": 100, "channel": "beta"})
    );
    assert!(
        requests[0]
            .headers
            .get("user-agent")
            .is_some_and(|agent| agent.starts_with("app-updater/"))
    );
    Ok(())
}

#[tokio::test]
async fn test_no_update_defaults_every_field() -> Result<()> {
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(
            200,
            &json!({"code": 200, "message": "ok", "data": {"hasUpdate": false, "newVersionName": "9.9"}}),
        ),
    );

    let info = UpdateClient::new(&config(server.url()))?.check(100, "com.example.app").await?;
    assert_eq!(info, app_updater::models::UpdateInfo::none());
    Ok(())
}

#[tokio::test]
async fn test_business_error_keeps_server_text() -> Result<()> {
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(200, &json!({"code": 4001, "message": "Unknown application", "data": null})),
    );

    let err = UpdateClient::new(&config(server.url()))?.check(100, "com.example.app").await.unwrap_err();
    assert_eq!(
        err,
        UpdateError::ServerBusinessError {
            code: 4001,
            message: "Unknown application".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_success_code_without_data_is_malformed() -> Result<()> {
    let server = StubServer::start().await;
    server.route("check-update", StubResponse::json(200, &json!({"code": 200, "message": "ok"})));

    let err = UpdateClient::new(&config(server.url()))?.check(100, "com.example.app").await.unwrap_err();
    assert!(matches!(err, UpdateError::MalformedServerResponse { .. }));
    assert_eq!(err.code(), -1003);
    Ok(())
}

#[tokio::test]
async fn test_garbage_body_is_malformed() -> Result<()> {
    let server = StubServer::start().await;
    server.route("check-update", StubResponse::text(200, "<html>maintenance</html>"));

    let err = UpdateClient::new(&config(server.url()))?.check(100, "com.example.app").await.unwrap_err();
    assert!(matches!(err, UpdateError::MalformedServerResponse { .. }));
    Ok(())
}

#[tokio::test]
async fn test_http_error_status_is_synthesized() -> Result<()> {
    let server = StubServer::start().await;
    server.route("check-update", StubResponse::text(503, "busy"));

    let err = UpdateClient::new(&config(server.url()))?.check(100, "com.example.app").await.unwrap_err();
    assert_eq!(
        err,
        UpdateError::ServerBusinessError {
            code: 503,
            message: "HTTP error: Service Unavailable".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_slow_server_times_out() -> Result<()> {
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(200, &update_body("https://cdn.example.com/app.pkg", None))
            .delayed(Duration::from_secs(2)),
    );

    let config = UpdaterConfig::builder()
        .base_url(server.url())
        .app_id("com.example.app")
        .read_timeout(Duration::from_millis(200))
        .build()?;
    let err = UpdateClient::new(&config)?.check(100, "com.example.app").await.unwrap_err();
    assert_eq!(err, UpdateError::NetworkTimeout);
    assert_eq!(err.code(), -1001);
    Ok(())
}

/// The read timeout bounds each wait for data, not the whole exchange.
#[tokio::test]
async fn test_slow_but_steady_body_is_not_a_timeout() -> Result<()> {
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(200, &update_body("https://cdn.example.com/app.pkg", None))
            .trickled(Duration::from_millis(100)),
    );

    let config = UpdaterConfig::builder()
        .base_url(server.url())
        .app_id("com.example.app")
        .read_timeout(Duration::from_millis(300))
        .build()?;
    let info = UpdateClient::new(&config)?.check(100, "com.example.app").await?;
    assert!(info.has_update);
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() -> Result<()> {
    // Grab a free port and release it so nothing listens there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let client = UpdateClient::new(&config(&format!("http://127.0.0.1:{port}/")))?;
    let err = client.check(100, "com.example.app").await.unwrap_err();
    assert!(matches!(err, UpdateError::NetworkUnreachable { .. }), "{err:?}");
    assert_eq!(err.code(), -1002);
    Ok(())
}

/// Check, download over HTTP with checksum verification, then install.
#[tokio::test]
async fn test_check_download_install_over_http() -> Result<()> {
    let temp = TempDir::new()?;
    let server = StubServer::start().await;
    let package = vec![7_u8; 64 * 1024];
    let checksum = format!("sha256:{}", hex::encode(Sha256::digest(&package)));
    server.route("files/app-1.1.0.pkg", StubResponse::bytes(&package));
    server.route(
        "check-update",
        StubResponse::json(200, &update_body(&server.url_for("files/app-1.1.0.pkg"), Some(&checksum))),
    );

    let log = EventLog::new();
    let install = log.install_handler(PromptPolicy::Keep);
    let launcher = Arc::new(RecordingLauncher::new());
    let config = UpdaterConfig::builder()
        .base_url(server.url())
        .app_id("com.example.app")
        .current_version_code(100)
        .download_dir(temp.path().join("downloads"))
        .poll_interval(Duration::from_millis(20))
        .build()?;
    let updater = Updater::builder(config)
        .permissions(Arc::new(FakePermissions::granted()))
        .launcher(launcher.clone())
        .ledger(Arc::new(MemoryLedger::new()))
        .install_handler(move |event| install(event))
        .build()?;

    let info = updater.check().await?;
    assert_eq!(info.checksum, checksum);
    updater.start_download(&info, Some(log.download_handler()))?;
    assert!(log.wait_for_download_end(WAIT).await);

    let events = log.download_events();
    let Some(DownloadEvent::Completed(path)) = events.last() else {
        panic!("download did not complete: {events:?}");
    };
    assert_eq!(std::fs::read(path)?, package);
    assert_eq!(log.percents().last(), Some(&100));

    assert!(log.wait_until(WAIT, |log| !log.install_events().is_empty()).await);
    assert_eq!(log.install_events(), vec![InstallRecord::Started(path.clone())]);
    assert_eq!(launcher.launched(), vec![path.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_missing_package_on_server_fails_download() -> Result<()> {
    let temp = TempDir::new()?;
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(200, &update_body(&server.url_for("files/gone.pkg"), None)),
    );

    let log = EventLog::new();
    let config = UpdaterConfig::builder()
        .base_url(server.url())
        .app_id("com.example.app")
        .download_dir(temp.path().join("downloads"))
        .poll_interval(Duration::from_millis(20))
        .build()?;
    let updater = Updater::builder(config)
        .permissions(Arc::new(FakePermissions::granted()))
        .launcher(Arc::new(RecordingLauncher::new()))
        .ledger(Arc::new(MemoryLedger::new()))
        .build()?;

    let info = updater.check().await?;
    updater.start_download(&info, Some(log.download_handler()))?;
    assert!(log.wait_for_download_end(WAIT).await);

    let Some(DownloadEvent::Failed(err)) = log.download_events().last().cloned() else {
        panic!("expected failure: {:?}", log.download_events());
    };
    assert_eq!(err.code(), 1002);
    assert!(!temp.path().join("downloads").join("update_1.1.0_101.pkg").exists());
    Ok(())
}

//! Tests of the `app-updater` binary.

use anyhow::Result;
use app_updater::config::{GlobalConfig, UpdaterConfig};
use app_updater::test_utils::{StubResponse, StubServer};
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch home with its own config file.
struct CliEnv {
    home: TempDir,
}

impl CliEnv {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.home.path().join("config.toml")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("app-updater").unwrap();
        cmd.env("HOME", self.home.path())
            .env("APP_UPDATER_CONFIG", self.config_path())
            .env("APP_UPDATER_NO_PROGRESS", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Write a config pointing at `base_url`, with every path inside the scratch home.
    async fn write_config(&self, base_url: &str) -> Result<()> {
        let root = self.home.path();
        let config = GlobalConfig {
            updater: UpdaterConfig {
                base_url: base_url.to_string(),
                app_id: "com.example.app".to_string(),
                current_version_code: 100,
                download_dir: Some(path_string(&root.join("downloads"))),
                install_dir: Some(path_string(root)),
                ledger_path: Some(path_string(&root.join("pending-install.json"))),
                ..UpdaterConfig::default()
            },
        };
        config.save_to(&self.config_path()).await
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_config_init_set_and_show() -> Result<()> {
    let env = CliEnv::new();

    env.command()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config"));
    assert!(env.config_path().exists());

    // A second init leaves the file alone.
    env.command()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));

    env.command().args(["config", "set", "current_version_code", "42"]).assert().success();
    env.command().args(["config", "set", "auto_install", "false"]).assert().success();

    let config = GlobalConfig::load_from(&env.config_path()).await?;
    assert_eq!(config.updater.current_version_code, 42);
    assert!(!config.updater.auto_install);
    assert_eq!(config.updater.app_id, "com.example.app");

    env.command()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("current_version_code = 42"));
    Ok(())
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let env = CliEnv::new();
    env.command()
        .args(["config", "set", "colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_config_path_honors_flag() {
    let env = CliEnv::new();
    let custom = env.home.path().join("elsewhere.toml");

    env.command()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path_string(&env.config_path())));
    env.command()
        .args(["--config", &path_string(&custom), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path_string(&custom)));
}

#[test]
fn test_unconfigured_updater_fails() {
    let env = CliEnv::new();
    env.command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("config init"));
}

#[tokio::test]
async fn test_status_and_resume_with_nothing_pending() -> Result<()> {
    let env = CliEnv::new();
    env.write_config("http://127.0.0.1:9/").await?;

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("com.example.app"))
        .stdout(predicate::str::contains("Idle"))
        .stdout(predicate::str::contains("Pending:     none"));

    env.command()
        .arg("resume")
        .assert()
        .success()
        .stdout(predicate::str::contains("No install is waiting"));
    Ok(())
}

#[tokio::test]
async fn test_install_missing_package_fails() -> Result<()> {
    let env = CliEnv::new();
    env.write_config("http://127.0.0.1:9/").await?;
    let missing = env.home.path().join("missing.pkg");

    env.command()
        .args(["install", &path_string(&missing)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("-3001"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_reports_update() -> Result<()> {
    let server = StubServer::start().await;
    server.route(
        "check-update",
        StubResponse::json(
            200,
            &json!({
                "code": 200,
                "message": "success",
                "data": {
                    "hasUpdate": true,
                    "newVersionCode": 101,
                    "newVersionName": "1.1.0",
                    "updateDescription": "Faster startup",
                    "forceUpdate": true,
                    "downloadUrl": server.url_for("files/app.pkg"),
                    "fileSize": 25_600_000
                }
            }),
        ),
    );

    let env = CliEnv::new();
    env.write_config(server.url()).await?;

    let mut cmd = env.command();
    let assert = tokio::task::spawn_blocking(move || cmd.arg("check").assert()).await?;
    assert
        .success()
        .stdout(predicate::str::contains("Update available: 1.1.0"))
        .stdout(predicate::str::contains("Faster startup"))
        .stdout(predicate::str::contains("required"));

    let mut cmd = env.command();
    let assert = tokio::task::spawn_blocking(move || cmd.args(["check", "--json"]).assert()).await?;
    let output = assert.success().get_output().stdout.clone();
    let info: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(info["has_update"], true);
    assert_eq!(info["new_version_code"], 101);
    assert_eq!(info["file_size"], 25_600_000);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_against_unreachable_service_fails() -> Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let env = CliEnv::new();
    env.write_config(&format!("http://127.0.0.1:{port}/")).await?;

    let mut cmd = env.command();
    let assert = tokio::task::spawn_blocking(move || cmd.arg("check").assert()).await?;
    assert.failure().stderr(predicate::str::contains("-1002"));
    Ok(())
}

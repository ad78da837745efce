//! Plumbing shared by the CLI commands.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::CliConfig;
use crate::config::{GlobalConfig, UpdaterConfig};
use crate::core::UpdateError;
use crate::download::{DownloadEvent, DownloadHandler};
use crate::install::{InstallEvent, InstallHandler};
use crate::orchestrator::Updater;

/// An updater callback forwarded to the command's task.
#[derive(Debug)]
pub enum CliEvent {
    Download(DownloadEvent),
    Install(InstallEvent),
}

/// Channel that turns updater callbacks into awaitable events.
pub struct EventChannel {
    sender: mpsc::UnboundedSender<CliEvent>,
    receiver: mpsc::UnboundedReceiver<CliEvent>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
        }
    }

    pub fn download_handler(&self) -> DownloadHandler {
        let sender = self.sender.clone();
        Arc::new(move |event| {
            let _ = sender.send(CliEvent::Download(event));
        })
    }

    pub fn install_handler(&self) -> InstallHandler {
        let sender = self.sender.clone();
        Arc::new(move |event| {
            let _ = sender.send(CliEvent::Install(event));
        })
    }

    pub async fn recv(&mut self) -> Option<CliEvent> {
        self.receiver.recv().await
    }
}

/// Load the updater settings from the global config file.
pub async fn load_updater_config(cli: &CliConfig) -> Result<UpdaterConfig> {
    let path = cli.config_path.clone().map(PathBuf::from);
    let global = GlobalConfig::load_with_optional(path).await?;
    global
        .updater
        .validate()
        .context("The updater is not configured; run 'app-updater config init' and edit the result")
}

/// Build an updater whose install events arrive on `events`.
pub fn build_updater(config: UpdaterConfig, events: &EventChannel) -> Result<Updater, UpdateError> {
    let install = events.install_handler();
    Updater::builder(config).install_handler(move |event| install(event)).build()
}

/// Ask a yes/no question on the terminal; `default` when stdin is not interactive.
pub async fn confirm(question: String, default: bool) -> bool {
    if !std::io::stdin().is_terminal() {
        return default;
    }

    let hint = if default { "[Y/n]" } else { "[y/N]" };
    tokio::task::spawn_blocking(move || {
        print!("{question} {hint} ");
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return default;
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        }
    })
    .await
    .unwrap_or(default)
}

/// Wait for the outcome of an install request and report it.
///
/// A permission prompt is resolved by asking the user (or by `assume_yes`).
pub async fn await_install(events: &mut EventChannel, assume_yes: bool) -> Result<()> {
    while let Some(event) = events.recv().await {
        let CliEvent::Install(event) = event else {
            continue;
        };

        match event {
            InstallEvent::Started(path) => {
                println!("{}", format!("Installer started for {}", path.display()).green());
                return Ok(());
            }
            InstallEvent::PermissionRequired(prompt) => {
                println!("{}", "Install permission is required.".yellow());
                let open = assume_yes
                    || confirm("Open the permission settings now?".to_string(), false).await;
                if open {
                    if prompt.confirm() {
                        println!(
                            "Grant the permission, then run {} to continue the install.",
                            "app-updater resume".bold()
                        );
                        return Ok(());
                    }
                } else {
                    prompt.cancel();
                }
            }
            InstallEvent::Failed(e) => return Err(e.into()),
        }
    }
    Ok(())
}

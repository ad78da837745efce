//! Handing a package to the OS installer.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

use crate::core::UpdateError;

/// Starts installation of a package.
///
/// `launch` returns once the installer has been started; it does not wait
/// for the installation to finish.
pub trait InstallLauncher: Send + Sync {
    /// # Errors
    ///
    /// [`UpdateError::InstallLaunchFailed`] when the installer cannot be started.
    fn launch(&self, package_path: &Path) -> Result<(), UpdateError>;
}

/// Launches a configured installer command, or the package itself.
///
/// With an empty command the package is run directly (made executable first
/// on Unix). Otherwise the package path is appended to the command.
#[derive(Debug, Clone, Default)]
pub struct CommandLauncher {
    command: Vec<String>,
}

impl CommandLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
        }
    }

    fn build(&self, package_path: &Path) -> Result<Command, UpdateError> {
        match self.command.split_first() {
            Some((program, args)) => {
                let program = resolve_program(program)?;
                let mut command = Command::new(program);
                command.args(args).arg(package_path);
                Ok(command)
            }
            None => {
                make_executable(package_path)?;
                Ok(Command::new(package_path))
            }
        }
    }
}

impl InstallLauncher for CommandLauncher {
    fn launch(&self, package_path: &Path) -> Result<(), UpdateError> {
        let mut command = self.build(package_path)?;
        debug!("Launching installer: {command:?}");

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| UpdateError::InstallLaunchFailed {
                reason: format!("{e}"),
            })?;

        info!("Installer started (pid {}) for {}", child.id(), package_path.display());
        reap(child);
        Ok(())
    }
}

/// Wait for the installer on a background thread so it is not left as a zombie.
fn reap(mut child: Child) {
    let pid = child.id();
    let watcher = thread::Builder::new()
        .name(format!("installer-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => debug!("Installer (pid {pid}) exited with {status}"),
            Err(e) => warn!("Failed to wait for installer (pid {pid}): {e}"),
        });
    if let Err(e) = watcher {
        warn!("Installer (pid {pid}) will not be reaped: {e}");
    }
}

fn resolve_program(program: &str) -> Result<PathBuf, UpdateError> {
    let expanded = shellexpand::tilde(program).into_owned();
    if Path::new(&expanded).is_absolute() {
        return Ok(PathBuf::from(expanded));
    }
    which::which(&expanded).map_err(|e| UpdateError::InstallLaunchFailed {
        reason: format!("installer '{program}' not found: {e}"),
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| UpdateError::InstallLaunchFailed {
            reason: format!("cannot read {}: {e}", path.display()),
        })?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|e| UpdateError::InstallLaunchFailed {
        reason: format!("cannot make {} executable: {e}", path.display()),
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), UpdateError> {
    Ok(())
}

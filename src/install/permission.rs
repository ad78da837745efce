//! Install permission checks.
//!
//! [`PermissionGate`] answers whether installing is currently allowed and can
//! send the user to a place where the permission is granted. It never decides
//! whether to install; that is the invoker's job.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Places where the user can grant install permission, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsSurface {
    /// The per-application "install unknown packages" setting.
    InstallSources,
    /// General security settings.
    Security,
    /// The application's own details page.
    ApplicationDetails,
}

impl SettingsSurface {
    /// Order in which surfaces are tried.
    pub const FALLBACK_ORDER: [Self; 3] = [Self::InstallSources, Self::Security, Self::ApplicationDetails];
}

impl fmt::Display for SettingsSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InstallSources => "install sources",
            Self::Security => "security settings",
            Self::ApplicationDetails => "application details",
        })
    }
}

/// OS-level permission state and settings navigation.
pub trait PlatformPermissions: Send + Sync {
    /// Whether installing is allowed right now. Must be evaluated live.
    fn can_install(&self) -> bool;

    /// Whether this platform gates installs behind a grant at all.
    fn requires_grant(&self) -> bool {
        true
    }

    /// Try to open `surface`; `true` if it was shown to the user.
    fn open_settings(&self, surface: SettingsSurface) -> bool;
}

/// Snapshot of the permission state, for logging at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSummary {
    pub has_install_permission: bool,
    pub needs_install_permission: bool,
}

impl fmt::Display for PermissionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "install permission: {} (required: {})",
            if self.has_install_permission { "granted" } else { "not granted" },
            if self.needs_install_permission { "yes" } else { "no" }
        )
    }
}

/// Queries and requests install permission through a [`PlatformPermissions`].
#[derive(Clone)]
pub struct PermissionGate {
    platform: Arc<dyn PlatformPermissions>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn PlatformPermissions>) -> Self {
        Self {
            platform,
        }
    }

    /// Live check; never cached.
    pub fn has_install_permission(&self) -> bool {
        self.platform.can_install()
    }

    /// Open the first settings surface that can be shown.
    ///
    /// Returns `false` only when none of them opens.
    pub fn request_install_permission(&self) -> bool {
        for surface in SettingsSurface::FALLBACK_ORDER {
            if self.platform.open_settings(surface) {
                info!("Opened {surface} for install permission");
                return true;
            }
            debug!("Could not open {surface}, trying next");
        }
        warn!("No settings surface could be opened for install permission");
        false
    }

    pub fn summary(&self) -> PermissionSummary {
        PermissionSummary {
            has_install_permission: self.has_install_permission(),
            needs_install_permission: self.platform.requires_grant(),
        }
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate").finish_non_exhaustive()
    }
}

/// Desktop permissions: installing means being able to write the install directory.
///
/// Settings surfaces are opened with the desktop's file opener
/// (`xdg-open`, `open` or `explorer`), pointed at the install directory, its
/// parent, and the updater's data directory respectively.
#[derive(Debug, Clone)]
pub struct DirectoryPermissions {
    install_dir: PathBuf,
    details_dir: Option<PathBuf>,
    opener: Option<PathBuf>,
}

impl DirectoryPermissions {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            details_dir: crate::config::GlobalConfig::data_dir().ok(),
            opener: find_opener(),
        }
    }

    /// Override the directory shown for [`SettingsSurface::ApplicationDetails`].
    #[must_use]
    pub fn with_details_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.details_dir = Some(dir.into());
        self
    }

    /// Override the opener program; `None` disables settings navigation.
    #[must_use]
    pub fn with_opener(mut self, opener: Option<PathBuf>) -> Self {
        self.opener = opener;
        self
    }

    fn target(&self, surface: SettingsSurface) -> Option<PathBuf> {
        match surface {
            SettingsSurface::InstallSources => Some(self.install_dir.clone()),
            SettingsSurface::Security => self.install_dir.parent().map(PathBuf::from),
            SettingsSurface::ApplicationDetails => self.details_dir.clone(),
        }
    }
}

impl PlatformPermissions for DirectoryPermissions {
    fn can_install(&self) -> bool {
        match tempfile::Builder::new().prefix(".app-updater-write-check").tempfile_in(&self.install_dir) {
            Ok(_) => true,
            Err(e) => {
                debug!("Install directory {} is not writable: {e}", self.install_dir.display());
                false
            }
        }
    }

    fn open_settings(&self, surface: SettingsSurface) -> bool {
        let Some(opener) = &self.opener else {
            return false;
        };
        let Some(target) = self.target(surface).filter(|path| path.exists()) else {
            return false;
        };

        match Command::new(opener)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to run {}: {e}", opener.display());
                false
            }
        }
    }
}

fn find_opener() -> Option<PathBuf> {
    let candidate = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    which::which(candidate).ok()
}

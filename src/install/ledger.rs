//! Durable record of an install that is waiting for permission.
//!
//! The ledger holds at most one entry. It is written before the user is sent
//! to the permission settings, so an install survives the application being
//! left (or killed) while the user is away, and is picked up again by
//! [`Updater::resume_pending_install`](crate::orchestrator::Updater::resume_pending_install).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::core::UpdateError;
use crate::utils::fs::atomic_write;

/// A package parked while install permission is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInstall {
    pub package_path: PathBuf,
    pub recorded_at: DateTime<Utc>,
}

impl PendingInstall {
    pub fn new(package_path: impl Into<PathBuf>) -> Self {
        Self {
            package_path: package_path.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Single-slot storage for a [`PendingInstall`].
///
/// `set` overwrites any previous entry. The store never decides anything on
/// its own; it only remembers.
pub trait PendingInstallStore: Send + Sync {
    fn set(&self, package_path: &Path) -> Result<(), UpdateError>;
    fn get(&self) -> Option<PendingInstall>;
    fn clear(&self) -> Result<(), UpdateError>;
}

/// Ledger persisted as a JSON file.
///
/// An unreadable or corrupt file reads as empty so it can never wedge the
/// updater.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    // Serializes read-modify-write from concurrent callers in this process.
    lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PendingInstallStore for FileLedger {
    fn set(&self, package_path: &Path) -> Result<(), UpdateError> {
        let _guard = self.guard();
        let entry = PendingInstall::new(package_path);
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| UpdateError::storage(format!("Failed to encode pending install: {e}")))?;

        atomic_write(&self.path, &json).map_err(|e| UpdateError::storage(format!("{e:#}")))?;
        debug!("Recorded pending install of {}", package_path.display());
        Ok(())
    }

    fn get(&self) -> Option<PendingInstall> {
        let _guard = self.guard();
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read pending-install ledger {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    "Ignoring corrupt pending-install ledger {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    fn clear(&self) -> Result<(), UpdateError> {
        let _guard = self.guard();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared pending install");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::storage(format!(
                "Failed to clear pending-install ledger {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory ledger for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entry: Mutex<Option<PendingInstall>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self) -> MutexGuard<'_, Option<PendingInstall>> {
        self.entry.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PendingInstallStore for MemoryLedger {
    fn set(&self, package_path: &Path) -> Result<(), UpdateError> {
        *self.entry() = Some(PendingInstall::new(package_path));
        Ok(())
    }

    fn get(&self) -> Option<PendingInstall> {
        self.entry().clone()
    }

    fn clear(&self) -> Result<(), UpdateError> {
        *self.entry() = None;
        Ok(())
    }
}

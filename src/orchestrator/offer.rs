use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::Updater;
use crate::core::UpdateError;
use crate::download::DownloadHandler;
use crate::models::UpdateInfo;

/// Receives update offers after a successful check.
pub type OfferHandler = Arc<dyn Fn(UpdateOffer) + Send + Sync>;

/// An available update waiting for the user's decision.
///
/// Nothing is downloaded until [`accept`](Self::accept) is called. A forced
/// update cannot be dismissed.
pub struct UpdateOffer {
    info: UpdateInfo,
    updater: Updater,
}

impl UpdateOffer {
    pub(crate) const fn new(info: UpdateInfo, updater: Updater) -> Self {
        Self {
            info,
            updater,
        }
    }

    pub const fn info(&self) -> &UpdateInfo {
        &self.info
    }

    pub const fn is_forced(&self) -> bool {
        self.info.force_update
    }

    /// Start downloading the offered update.
    ///
    /// # Errors
    ///
    /// See [`Updater::start_download`].
    pub fn accept(self, handler: Option<DownloadHandler>) -> Result<(), UpdateError> {
        info!("Update {} accepted", self.info.new_version_name);
        self.updater.start_download(&self.info, handler)
    }

    /// Skip this update. A forced update hands the offer back in `Err`.
    pub fn dismiss(self) -> Result<(), Self> {
        if self.is_forced() {
            return Err(self);
        }
        info!("Update {} dismissed", self.info.new_version_name);
        Ok(())
    }
}

impl fmt::Debug for UpdateOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOffer").field("info", &self.info).finish_non_exhaustive()
    }
}

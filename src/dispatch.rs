//! Where updater callbacks run.
//!
//! Every event the updater delivers (check results, download progress,
//! install outcomes, offers) is handed to a [`CallbackExecutor`] instead of
//! being invoked on whatever task produced it. Hosts with a UI thread plug in
//! an executor that posts to it; the default [`SerialExecutor`] runs
//! callbacks one at a time, in submission order, on a dedicated tokio task.

use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::UpdateError;

/// A unit of work submitted to an executor.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs updater callbacks.
///
/// Implementations must run callbacks in the order they were submitted.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, callback: Callback);
}

/// Runs callbacks FIFO on a single background tokio task.
///
/// Callbacks run inside the runtime, so they may themselves call back into
/// the updater (for example to start a download from an offer).
pub struct SerialExecutor {
    sender: mpsc::UnboundedSender<Callback>,
}

impl SerialExecutor {
    /// Spawn the executor task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Unknown`] when called outside a tokio runtime.
    pub fn new() -> Result<Self, UpdateError> {
        let handle = Handle::try_current().map_err(|_| UpdateError::Unknown {
            message: "the updater must be created inside a tokio runtime".to_string(),
        })?;
        Ok(Self::with_handle(&handle))
    }

    pub fn with_handle(handle: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Callback>();
        handle.spawn(async move {
            while let Some(callback) = receiver.recv().await {
                callback();
            }
            debug!("Callback executor stopped");
        });
        Self {
            sender,
        }
    }
}

impl CallbackExecutor for SerialExecutor {
    fn execute(&self, callback: Callback) {
        if self.sender.send(callback).is_err() {
            debug!("Callback executor is gone; dropping callback");
        }
    }
}

impl fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialExecutor").finish_non_exhaustive()
    }
}

/// Runs each callback immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn execute(&self, callback: Callback) {
        callback();
    }
}

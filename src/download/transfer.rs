//! The mechanism that actually moves package bytes.
//!
//! The tracker never streams data itself. It hands a [`TransferRequest`] to a
//! [`TransferBackend`] and then polls [`TransferBackend::query`] for
//! snapshots, the way a platform download manager is driven.
//! [`HttpTransferBackend`] is the production backend: it streams the URL into
//! the destination file on a background tokio task.

use futures::StreamExt;
use reqwest::{Client, Url};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::user_agent;
use crate::core::UpdateError;
use crate::models::{DownloadStatus, format_file_size};

/// Identifier the backend assigns to a transfer.
pub type TransferId = uuid::Uuid;

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Human-readable label, e.g. `"1.1.0"`.
    pub title: String,
}

/// Point-in-time view of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub status: DownloadStatus,
    pub downloaded_bytes: i64,
    /// 0 while unknown.
    pub total_bytes: i64,
    /// Set when `status` is [`DownloadStatus::Failed`].
    pub failure: Option<TransferFailure>,
}

impl TransferSnapshot {
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: DownloadStatus::Pending,
            downloaded_bytes: 0,
            total_bytes: 0,
            failure: None,
        }
    }
}

/// Why a transfer failed.
///
/// Codes follow the reason codes platform download managers report, so they
/// stay stable across backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFailure {
    Unknown(String),
    FileError(String),
    /// The server answered with a status the transfer cannot handle.
    UnhandledHttpCode(u16),
    HttpDataError(String),
    TooManyRedirects,
    InsufficientSpace,
    DeviceNotFound,
    CannotResume,
    FileAlreadyExists,
}

impl TransferFailure {
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Unknown(_) => 1000,
            Self::FileError(_) => 1001,
            Self::UnhandledHttpCode(_) => 1002,
            Self::HttpDataError(_) => 1004,
            Self::TooManyRedirects => 1005,
            Self::InsufficientSpace => 1006,
            Self::DeviceNotFound => 1007,
            Self::CannotResume => 1008,
            Self::FileAlreadyExists => 1009,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Unknown(detail) if detail.is_empty() => "Unknown error".to_string(),
            Self::Unknown(detail) => format!("Unknown error: {detail}"),
            Self::FileError(detail) => format!("File error: {detail}"),
            Self::UnhandledHttpCode(status) => format!("Unhandled HTTP status {status}"),
            Self::HttpDataError(detail) => format!("HTTP data error: {detail}"),
            Self::TooManyRedirects => "Too many redirects".to_string(),
            Self::InsufficientSpace => "Insufficient storage space".to_string(),
            Self::DeviceNotFound => "Storage device not found".to_string(),
            Self::CannotResume => "Download cannot be resumed".to_string(),
            Self::FileAlreadyExists => "File already exists".to_string(),
        }
    }

    #[must_use]
    pub fn to_error(&self) -> UpdateError {
        UpdateError::DownloadTransportFailure {
            code: self.code(),
            reason: self.message(),
        }
    }

    fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::StorageFull => Self::InsufficientSpace,
            std::io::ErrorKind::NotFound => Self::DeviceNotFound,
            std::io::ErrorKind::AlreadyExists => Self::FileAlreadyExists,
            _ => Self::FileError(error.to_string()),
        }
    }

    fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_redirect() {
            Self::TooManyRedirects
        } else if let Some(status) = error.status() {
            Self::UnhandledHttpCode(status.as_u16())
        } else {
            Self::HttpDataError(error.to_string())
        }
    }
}

/// A download mechanism the tracker can drive.
pub trait TransferBackend: Send + Sync {
    /// Queue a transfer.
    ///
    /// # Errors
    ///
    /// [`UpdateError::DownloadTransportFailure`] when the request cannot be queued.
    fn enqueue(&self, request: TransferRequest) -> Result<TransferId, UpdateError>;

    /// Current state of a transfer; `None` once it is unknown to the backend.
    fn query(&self, id: TransferId) -> Option<TransferSnapshot>;

    /// Stop a transfer and forget it.
    ///
    /// A transfer that has not succeeded also loses its partial file.
    fn remove(&self, id: TransferId);
}

struct HttpTransfer {
    snapshot: Arc<Mutex<TransferSnapshot>>,
    destination: PathBuf,
    task: JoinHandle<()>,
}

/// Streams packages over HTTP(S) with `reqwest`.
pub struct HttpTransferBackend {
    client: Client,
    runtime: Handle,
    transfers: Mutex<HashMap<TransferId, HttpTransfer>>,
}

impl HttpTransferBackend {
    /// Build a backend bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Unknown`] outside a runtime or when the HTTP client
    /// cannot be constructed.
    pub fn new() -> Result<Self, UpdateError> {
        let runtime = Handle::try_current().map_err(|_| UpdateError::Unknown {
            message: "the updater must be created inside a tokio runtime".to_string(),
        })?;
        let client = Client::builder().user_agent(user_agent()).build().map_err(|e| {
            UpdateError::Unknown {
                message: format!("Failed to build HTTP client: {e}"),
            }
        })?;

        Ok(Self {
            client,
            runtime,
            transfers: Mutex::new(HashMap::new()),
        })
    }

    fn transfers(&self) -> MutexGuard<'_, HashMap<TransferId, HttpTransfer>> {
        self.transfers.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TransferBackend for HttpTransferBackend {
    fn enqueue(&self, request: TransferRequest) -> Result<TransferId, UpdateError> {
        let url = Url::parse(&request.url).map_err(|e| {
            TransferFailure::Unknown(format!("invalid download URL '{}': {e}", request.url))
                .to_error()
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransferFailure::Unknown(format!(
                "unsupported download URL scheme '{}'",
                url.scheme()
            ))
            .to_error());
        }

        let id = TransferId::new_v4();
        let snapshot = Arc::new(Mutex::new(TransferSnapshot::pending()));
        let task = self.runtime.spawn(run_transfer(
            self.client.clone(),
            url,
            request.destination.clone(),
            Arc::clone(&snapshot),
        ));

        debug!("Queued transfer {id} for {}", request.title);
        self.transfers().insert(
            id,
            HttpTransfer {
                snapshot,
                destination: request.destination,
                task,
            },
        );
        Ok(id)
    }

    fn query(&self, id: TransferId) -> Option<TransferSnapshot> {
        self.transfers().get(&id).map(|transfer| lock(&transfer.snapshot).clone())
    }

    fn remove(&self, id: TransferId) {
        let Some(transfer) = self.transfers().remove(&id) else {
            return;
        };
        transfer.task.abort();

        let succeeded = lock(&transfer.snapshot).status == DownloadStatus::Succeeded;
        if !succeeded
            && transfer.destination.exists()
            && let Err(e) = std::fs::remove_file(&transfer.destination)
        {
            warn!("Failed to remove partial download {}: {e}", transfer.destination.display());
        }
    }
}

fn lock(snapshot: &Mutex<TransferSnapshot>) -> MutexGuard<'_, TransferSnapshot> {
    snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn run_transfer(
    client: Client,
    url: Url,
    destination: PathBuf,
    snapshot: Arc<Mutex<TransferSnapshot>>,
) {
    match stream_to_file(&client, url.clone(), &destination, &snapshot).await {
        Ok(bytes) => {
            info!("Downloaded {} from {url}", format_file_size(bytes));
            lock(&snapshot).status = DownloadStatus::Succeeded;
        }
        Err(failure) => {
            warn!("Transfer from {url} failed: {}", failure.message());
            let mut state = lock(&snapshot);
            state.status = DownloadStatus::Failed;
            state.failure = Some(failure);
        }
    }
}

async fn stream_to_file(
    client: &Client,
    url: Url,
    destination: &std::path::Path,
    snapshot: &Mutex<TransferSnapshot>,
) -> Result<i64, TransferFailure> {
    let response = client.get(url).send().await.map_err(|e| TransferFailure::from_reqwest(&e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransferFailure::UnhandledHttpCode(status.as_u16()));
    }

    let total = response.content_length().map_or(0, |len| len as i64);
    {
        let mut state = lock(snapshot);
        state.status = DownloadStatus::Running;
        state.total_bytes = total;
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await.map_err(|e| TransferFailure::from_io(&e))?;
    }
    let mut file = File::create(destination).await.map_err(|e| TransferFailure::from_io(&e))?;

    let mut downloaded: i64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransferFailure::HttpDataError(e.to_string()))?;
        file.write_all(&chunk).await.map_err(|e| TransferFailure::from_io(&e))?;
        downloaded += chunk.len() as i64;
        lock(snapshot).downloaded_bytes = downloaded;
    }

    file.flush().await.map_err(|e| TransferFailure::from_io(&e))?;
    file.sync_all().await.map_err(|e| TransferFailure::from_io(&e))?;

    if total > 0 && downloaded < total {
        return Err(TransferFailure::HttpDataError(format!(
            "stream ended after {downloaded} of {total} bytes"
        )));
    }
    Ok(downloaded)
}

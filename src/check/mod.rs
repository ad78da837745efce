//! Version check against the update service.
//!
//! [`UpdateClient`] POSTs a [`CheckUpdateRequest`] to `{base_url}check-update`
//! and turns the server envelope into an [`UpdateInfo`]. Transport failures are
//! classified into the network variants of [`UpdateError`]; a business code
//! other than 200 surfaces verbatim as [`UpdateError::ServerBusinessError`].
//! Nothing is retried.

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::constants::{CHECK_UPDATE_ENDPOINT, SERVER_SUCCESS_CODE, user_agent};
use crate::core::UpdateError;
use crate::models::{CheckUpdateRequest, CheckUpdateResponse, DeviceInfo, UpdateInfo};

/// Something that can ask whether a newer version exists.
///
/// The orchestrator only talks to this trait, so tests and hosts with their
/// own transport can substitute it.
pub trait VersionCheck: Send + Sync {
    fn check<'a>(
        &'a self,
        current_version_code: i64,
        app_id: &'a str,
    ) -> BoxFuture<'a, Result<UpdateInfo, UpdateError>>;
}

/// HTTP client for the `check-update` endpoint.
#[derive(Debug, Clone)]
pub struct UpdateClient {
    client: Client,
    endpoint: String,
    channel: String,
    send_device_info: bool,
}

impl UpdateClient {
    /// Build a client from a validated config.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Unknown`] if the underlying HTTP client cannot be constructed.
    pub fn new(config: &UpdaterConfig) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(|e| UpdateError::Unknown {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint_url(&config.base_url),
            channel: config.channel.clone(),
            send_device_info: config.send_device_info,
        })
    }

    /// Full URL the check is sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(
        &self,
        current_version_code: i64,
        app_id: &str,
    ) -> Result<UpdateInfo, UpdateError> {
        let mut request = CheckUpdateRequest::new(app_id, current_version_code);
        request.channel.clone_from(&self.channel);
        if self.send_device_info {
            request.device_info = Some(DeviceInfo::current());
        }

        debug!(
            "Checking for updates at {} (app {}, version code {})",
            self.endpoint, app_id, current_version_code
        );

        let response =
            self.client.post(&self.endpoint).json(&request).send().await.map_err(classify)?;

        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        let envelope = if status.is_success() {
            serde_json::from_str::<CheckUpdateResponse>(&body).map_err(|e| {
                UpdateError::MalformedServerResponse {
                    reason: e.to_string(),
                }
            })?
        } else {
            warn!("Update server answered HTTP {status}");
            serde_json::from_str::<CheckUpdateResponse>(&body).unwrap_or_else(|_| {
                CheckUpdateResponse {
                    code: i32::from(status.as_u16()),
                    message: format!(
                        "HTTP error: {}",
                        status.canonical_reason().unwrap_or("unexpected status")
                    ),
                    data: None,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                }
            })
        };

        let info = interpret_response(envelope)?;
        if info.has_update {
            info!(
                "Update available: {} ({})",
                info.new_version_name, info.new_version_code
            );
        } else {
            debug!("No update available");
        }
        Ok(info)
    }
}

impl VersionCheck for UpdateClient {
    fn check<'a>(
        &'a self,
        current_version_code: i64,
        app_id: &'a str,
    ) -> BoxFuture<'a, Result<UpdateInfo, UpdateError>> {
        Box::pin(self.fetch(current_version_code, app_id))
    }
}

/// Turn a decoded server envelope into the check result.
///
/// # Errors
///
/// - [`UpdateError::MalformedServerResponse`] when the code is 200 but `data` is null
/// - [`UpdateError::ServerBusinessError`] for any other code
pub fn interpret_response(response: CheckUpdateResponse) -> Result<UpdateInfo, UpdateError> {
    if response.code != SERVER_SUCCESS_CODE {
        return Err(UpdateError::ServerBusinessError {
            code: response.code,
            message: response.message,
        });
    }

    match response.data {
        Some(data) => Ok(UpdateInfo::from(data)),
        None => Err(UpdateError::MalformedServerResponse {
            reason: "response data is null".to_string(),
        }),
    }
}

fn endpoint_url(base_url: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{CHECK_UPDATE_ENDPOINT}")
    } else {
        format!("{base_url}/{CHECK_UPDATE_ENDPOINT}")
    }
}

/// Map a transport error to the updater's network taxonomy.
fn classify(error: reqwest::Error) -> UpdateError {
    if error.is_timeout() {
        UpdateError::NetworkTimeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        UpdateError::NetworkUnreachable {
            reason: error.to_string(),
        }
    } else if error.is_decode() {
        UpdateError::MalformedServerResponse {
            reason: error.to_string(),
        }
    } else {
        UpdateError::Unknown {
            message: error.to_string(),
        }
    }
}

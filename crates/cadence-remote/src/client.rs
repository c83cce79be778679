//! Sync API HTTP client
//!
//! Wraps `reqwest::Client` with the base URL, bearer authentication taken
//! from the current session, and the mapping from HTTP outcomes onto
//! [`ProtocolError`].
//!
//! ## Status mapping
//!
//! | Outcome                         | Error                 |
//! |---------------------------------|-----------------------|
//! | connect failure, timeout        | `Unreachable`         |
//! | 401, 403, no session            | `Unauthorized`        |
//! | 429                             | `Throttled`           |
//! | 5xx                             | `Server`              |
//! | any other non-2xx               | `Rejected`            |
//! | body that is not the expected JSON | `Malformed`        |

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use cadence_core::config::RemoteConfig;
use cadence_core::ports::{ProtocolError, SessionProvider};

use crate::retry_after::parse_retry_after;
use crate::RemoteError;

/// Used when a 429 carries an unparseable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest error body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 256;

/// HTTP client for the sync API
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl ApiClient {
    /// Creates a client from the `remote` configuration section
    pub fn new(config: &RemoteConfig, session: Arc<dyn SessionProvider>) -> Result<Self, RemoteError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RemoteError::InvalidBaseUrl(config.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    /// Creates a client with default settings and a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>, session: Arc<dyn SessionProvider>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for `path` under the base URL
    ///
    /// Fails with `Unauthorized` when no session is active.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ProtocolError> {
        let session = self
            .session
            .current()
            .ok_or_else(|| ProtocolError::Unauthorized("no active session".to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(session.access_token))
    }

    /// Sends a request and decodes a JSON body from a 2xx response
    pub async fn send_json<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<R, ProtocolError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let response = check_status(response).await?;

        let body = response.bytes().await.map_err(map_transport_error)?;
        serde_json::from_slice(&body).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Whether the API host answers at all
    ///
    /// Any HTTP response counts as reachable, including error statuses.
    /// Sent without credentials.
    pub async fn ping(&self) -> bool {
        match self.client.head(&self.base_url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Connectivity probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_transport_error(e: reqwest::Error) -> ProtocolError {
    if e.is_decode() {
        ProtocolError::Malformed(e.to_string())
    } else {
        ProtocolError::Unreachable(e.to_string())
    }
}

/// Passes 2xx responses through and classifies everything else
async fn check_status(response: Response) -> Result<Response, ProtocolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_header(response.headers());
    let message = error_excerpt(response).await;
    let error = classify_status(status, retry_after, message);

    warn!(status = status.as_u16(), error = %error, "Sync API request failed");
    Err(error)
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
}

async fn error_excerpt(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    let mut excerpt: String = text.chars().take(MAX_ERROR_BODY).collect();
    if excerpt.is_empty() {
        excerpt.push_str("<empty body>");
    }
    excerpt
}

pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    message: String,
) -> ProtocolError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProtocolError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => ProtocolError::Throttled { retry_after },
        s if s.is_server_error() => ProtocolError::Server {
            status: s.as_u16(),
            message,
        },
        s => ProtocolError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

//! Blocking HTTP transport used by the worker pool.

use super::types::{
    CommunicationError, ErrorCategory, HttpMethod, TransportRequest, TransportResponse,
};
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Performs one blocking HTTP(S) call.
///
/// Implementations must be shareable between worker threads. Tests inject
/// mock transports through this trait.
pub trait Transport: Send + Sync {
    /// Executes the request and returns the raw response.
    ///
    /// Non-2xx statuses are reported as [`CommunicationError`] with
    /// [`ErrorCategory::Http`] and the status code attached.
    fn execute(&self, request: &TransportRequest) -> Result<TransportResponse, CommunicationError>;
}

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Default User-Agent string for HTTP requests.
const DEFAULT_USER_AGENT: &str = concat!("maprest/", env!("CARGO_PKG_VERSION"));

/// Transport backed by a shared `reqwest` blocking client.
///
/// One client is built up front and reused by every worker; rustls handles
/// concurrent connections without a process-wide lock.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default 20s timeout.
    pub fn new() -> Result<Self, CommunicationError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS), None)
    }

    /// Creates a transport with a custom timeout and optional User-Agent.
    pub fn with_timeout(
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, CommunicationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                CommunicationError::new(
                    ErrorCategory::Transfer,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &TransportRequest) -> Result<TransportResponse, CommunicationError> {
        trace!(url = %request.url, method = %request.method, "HTTP request starting");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => {
                let body = request.body.clone().unwrap_or_default();
                self.client.post(&request.url).body(body)
            }
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().map_err(|e| {
            warn!(
                url = %request.url,
                error = %e,
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "HTTP request failed"
            );
            classify(&e)
        })?;

        let status = response.status();
        debug!(url = %request.url, status = status.as_u16(), "HTTP response received");

        if !status.is_success() {
            return Err(CommunicationError::http_status(
                status.as_u16(),
                format!("HTTP {} from {} {}", status, request.method, request.url),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().map_err(|e| {
            warn!(url = %request.url, error = %e, "Failed to read response body");
            CommunicationError::new(
                ErrorCategory::Transfer,
                format!("Failed to read response: {}", e),
            )
        })?;

        trace!(url = %request.url, bytes = body.len(), "HTTP response body read");

        Ok(TransportResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Maps a reqwest error onto the communication error taxonomy.
fn classify(error: &reqwest::Error) -> CommunicationError {
    let category = if error.is_timeout() {
        ErrorCategory::Timeout
    } else if is_tls_failure(error) {
        ErrorCategory::Tls
    } else if error.is_connect() {
        ErrorCategory::Connect
    } else {
        ErrorCategory::Transfer
    };

    CommunicationError::new(category, format!("Request failed: {}", error))
}

/// reqwest does not flag TLS failures, so look through the source chain.
fn is_tls_failure(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        let text = inner.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = inner.source();
    }
    false
}

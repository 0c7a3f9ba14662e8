//! Transport request/response types and the communication error.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// HTTP method supported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// One fully-formed request handed to a [`Transport`](super::Transport).
///
/// URLs are passed through untouched; the engine never builds or validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Target URL including host, path and query string
    pub url: String,
    /// GET or POST
    pub method: HttpMethod,
    /// Body sent with POST requests
    pub body: Option<Bytes>,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Per-request timeout override
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            body: None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    /// Creates a POST request with the given body.
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            body: Some(body.into()),
            headers: Vec::new(),
            timeout: None,
        }
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the client timeout for this request only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw result of a successful (2xx) transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Bytes,
}

impl TransportResponse {
    /// Creates a 200 response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content_type: None,
            body: body.into(),
        }
    }
}

/// Broad class of a communication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Server answered with a non-2xx status
    Http,
    /// Host name could not be resolved or connection refused
    Connect,
    /// TLS handshake or certificate failure
    Tls,
    /// Request exceeded its timeout
    Timeout,
    /// Body could not be read or request could not be built
    Transfer,
    /// The request was aborted while waiting to retry
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Http => "http",
            ErrorCategory::Connect => "connect",
            ErrorCategory::Tls => "tls",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Transfer => "transfer",
            ErrorCategory::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Failure talking to the remote server.
///
/// Carries the `(category, code, description)` triple. `code` is the HTTP
/// status for [`ErrorCategory::Http`] and `None` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category} error{}: {description}", .code.map(|c| format!(" ({})", c)).unwrap_or_default())]
pub struct CommunicationError {
    pub category: ErrorCategory,
    pub code: Option<u16>,
    pub description: String,
}

impl CommunicationError {
    /// Creates an error of the given category without a status code.
    pub fn new(category: ErrorCategory, description: impl Into<String>) -> Self {
        Self {
            category,
            code: None,
            description: description.into(),
        }
    }

    /// Creates an error for a non-2xx HTTP status.
    pub fn http_status(status: u16, description: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Http,
            code: Some(status),
            description: description.into(),
        }
    }

    /// HTTP status code, when the server answered.
    pub fn http_status_code(&self) -> Option<u16> {
        match self.category {
            ErrorCategory::Http => self.code,
            _ => None,
        }
    }

    /// Returns true for failures that a retry might fix.
    pub fn is_transient(&self) -> bool {
        match self.category {
            ErrorCategory::Timeout | ErrorCategory::Connect => true,
            ErrorCategory::Http => matches!(self.code, Some(429) | Some(500..=599)),
            _ => false,
        }
    }
}

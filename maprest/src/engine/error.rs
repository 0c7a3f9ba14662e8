//! Engine and reply error types.

use crate::fetcher::TileFetcherError;
use crate::transport::CommunicationError;
use thiserror::Error;

/// Errors reported synchronously by the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine was shut down; no further requests are accepted
    #[error("Engine is in an invalid state: {0}")]
    InvalidState(&'static str),

    /// The registry already holds the maximum number of pending requests
    #[error("Too many pending requests (limit {limit})")]
    MaxRequestsExceeded { limit: usize },

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] CommunicationError),

    /// A worker or dispatcher thread could not be started
    #[error("Failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Malformed response body, raised by a reply parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parser error: {message}")]
pub struct ParserError {
    pub message: String,
}

impl ParserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error attached to a [`Reply`](super::Reply) delivered to a listener.
///
/// Listeners are expected to treat every variant the same way on the
/// failure path; the variant only tells them where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// Transport-level failure
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    /// The reply sink could not make sense of the body
    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Tile cache or tile decode failure
    #[error(transparent)]
    TileFetcher(#[from] TileFetcherError),
}

impl ReplyError {
    /// HTTP status code if the failure came from a non-2xx response.
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            ReplyError::Communication(e) => e.http_status_code(),
            _ => None,
        }
    }
}

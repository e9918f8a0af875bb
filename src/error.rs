//! Typed error hierarchy for minnow
//!
//! Every error carries enough context to decide whether the failing
//! operation can be retried or the offending peer must be dropped.

use thiserror::Error;

/// Main error type for the leecher.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bencode decoding failed.
    #[error("bencode error: {0}")]
    Decode(String),

    /// A `.torrent` file was structurally valid bencode but not a usable
    /// metainfo dictionary.
    #[error("invalid metainfo: {0}")]
    Metainfo(String),

    /// Announce request parameters failed validation before being sent.
    #[error("invalid announce parameter '{field}': {message}")]
    InvalidAnnounce {
        field: &'static str,
        message: String,
    },

    /// The tracker interaction failed (HTTP error, malformed response).
    #[error("tracker error: {message}")]
    Tracker { message: String, retryable: bool },

    /// The tracker answered with an explicit `failure reason`.
    #[error("tracker failure: {0}")]
    TrackerFailure(String),

    /// The remote peer violated the wire protocol.
    #[error("peer protocol violation: {0}")]
    PeerProtocol(String),

    /// Connection-level error talking to a peer.
    #[error("network error: {0}")]
    Network(String),

    /// The piece store could not persist or load data.
    #[error("storage error: {0}")]
    Storage(String),

    /// `work_on` was called twice for the same info-hash.
    #[error("torrent already tracked: {0}")]
    AlreadyTracked(String),

    /// The torrent id is unknown to this client.
    #[error("torrent not found: {0}")]
    NotFound(String),

    /// The client is shutting down.
    #[error("client is shutting down")]
    Shutdown,
}

impl ClientError {
    /// Check whether retrying the failed operation makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Tracker { retryable, .. } => *retryable,
            Self::Network(_) => true,
            _ => false,
        }
    }

    /// Create a bencode decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a metainfo error.
    pub fn metainfo(message: impl Into<String>) -> Self {
        Self::Metainfo(message.into())
    }

    /// Create a retryable tracker error.
    pub fn tracker_transient(message: impl Into<String>) -> Self {
        Self::Tracker {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable tracker error.
    pub fn tracker_fatal(message: impl Into<String>) -> Self {
        Self::Tracker {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a peer protocol error.
    pub fn peer(message: impl Into<String>) -> Self {
        Self::PeerProtocol(message.into())
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// Result type alias for leecher operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect() || err.is_request();
        Self::Tracker {
            message: err.to_string(),
            retryable,
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::Tracker {
            message: format!("invalid announce url: {}", err),
            retryable: false,
        }
    }
}

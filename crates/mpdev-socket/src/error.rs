//! Error types for the socket transport

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised while opening the socket
///
/// Mid-transfer failures are reported as [`mpdev_core::Error`] directly.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The endpoint cannot be reached through a websocket
    #[error("{0} is not a socket endpoint")]
    NotASocket(String),

    /// The handshake did not complete within the connect timeout
    #[error("connecting to {url} timed out after {secs} seconds")]
    Timeout {
        /// URL being opened
        url: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// The handshake failed
    #[error("connecting to {url} failed: {source}")]
    Handshake {
        /// URL being opened
        url: String,
        /// Underlying websocket error
        #[source]
        source: tungstenite::Error,
    },
}

/// Result type alias for socket operations
pub type Result<T> = std::result::Result<T, SocketError>;

impl From<SocketError> for mpdev_core::Error {
    fn from(e: SocketError) -> Self {
        match e {
            SocketError::NotASocket(endpoint) => mpdev_core::Error::InvalidEndpoint(endpoint),
            SocketError::Timeout { url, secs } => mpdev_core::Error::ConnectTimeout {
                endpoint: url,
                secs,
            },
            SocketError::Handshake { url, source } => mpdev_core::Error::Connection {
                endpoint: url,
                reason: source.to_string(),
            },
        }
    }
}

//! Error types for mpdev-core
//!
//! Every failure carries both a human-readable message (`Display`) and a
//! machine-readable class ([`ErrorKind`]) that callers use to decide whether
//! to retry, skip the entry, offer a fallback, or abort the run.

use thiserror::Error;

/// Failure classes of the transport and synchronization engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transport could not be opened. Never retried; the caller may offer
    /// to repeat the job over another transport.
    Connection,
    /// A single operation failed. Eligible for retry, then surfaced.
    Transient,
    /// The device rejected a request for one entry (e.g. listing a leaf).
    /// Logged and skipped, never fatal to the batch.
    DeviceState,
    /// The whole run must stop.
    Fatal,
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Opening the transport failed
    #[error("could not connect to {endpoint}: {reason}")]
    Connection {
        /// Endpoint that was being opened
        endpoint: String,
        /// Underlying reason
        reason: String,
    },

    /// Opening the transport did not finish in time
    #[error("connection to {endpoint} timed out after {secs} seconds")]
    ConnectTimeout {
        /// Endpoint that was being opened
        endpoint: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// An external tool exited with a non-zero status
    #[error("`{command}` failed ({status}): {diagnostic}")]
    CommandFailed {
        /// Command line that was run
        command: String,
        /// Exit status description
        status: String,
        /// Error stream of the process (stdout if stderr was empty)
        diagnostic: String,
    },

    /// An external tool could not be started at all
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// The device answered with an explicit failure
    #[error("device rejected {subject}: {message}")]
    Remote {
        /// Path or operation the failure refers to
        subject: String,
        /// Message sent by the device
        message: String,
    },

    /// Listing a remote path failed
    #[error("listing '{path}' failed: {reason}")]
    Listing {
        /// Remote path that was listed
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// The connection dropped in the middle of an exchange
    #[error("connection closed before {0} completed")]
    Disconnected(String),

    /// The device sent something that does not follow the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport does not implement this capability
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),

    /// The local root folder cannot be used
    #[error("root folder not usable: {0}")]
    InvalidRoot(String),

    /// An endpoint string could not be parsed
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A retried operation ran out of attempts
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        /// Operation description
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::ConnectTimeout { .. } => ErrorKind::Connection,
            Self::Listing { .. } => ErrorKind::DeviceState,
            Self::Spawn { .. }
            | Self::Unsupported(_)
            | Self::InvalidRoot(_)
            | Self::InvalidEndpoint(_) => ErrorKind::Fatal,
            Self::RetriesExhausted { last, .. } => match last.kind() {
                ErrorKind::DeviceState => ErrorKind::Transient,
                kind => kind,
            },
            Self::CommandFailed { .. }
            | Self::Remote { .. }
            | Self::Disconnected(_)
            | Self::Protocol(_)
            | Self::Io(_) => ErrorKind::Transient,
        }
    }

    /// Whether the retry controller may try this operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::DeviceState)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_not_retryable() {
        let err = Error::ConnectTimeout {
            endpoint: "192.168.4.1:8080".into(),
            secs: 20,
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exhausted_keeps_cause_class() {
        let err = Error::RetriesExhausted {
            operation: "upload main.py".into(),
            attempts: 3,
            last: Box::new(Error::Disconnected("upload".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_spawn_failure_is_fatal() {
        let err = Error::Spawn {
            program: "ampy".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}

//! Error types for the session manager

use thiserror::Error;

/// Errors that can occur while managing sessions
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session process could not be started
    #[error("failed to start session on {endpoint}: {source}")]
    Launch {
        /// Endpoint the session was for
        endpoint: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// A command was sent but no session is open
    #[error("no active session")]
    NoActiveSession,

    /// A command needs a target but several sessions are open
    #[error("several sessions are active ({}); pick one", .0.join(", "))]
    Ambiguous(Vec<String>),

    /// The named endpoint has no active session
    #[error("no active session on {0}")]
    NotFound(String),

    /// Writing to the session failed
    #[error("failed to write to session on {endpoint}: {source}")]
    Write {
        /// Endpoint of the session
        endpoint: String,
        /// Write error
        #[source]
        source: std::io::Error,
    },

    /// The session takes no input
    #[error("session on {0} has no input channel")]
    NoInput(String),

    /// Unknown `:` command in the attach loop
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Terminal I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

//! mpdev-repl - Interactive sessions, one per endpoint
//!
//! A session is an external REPL process (`mpremote` by default) bound to
//! one device endpoint. The [`SessionManager`] guarantees there is never more
//! than one per endpoint, routes control commands to the right one and tears
//! them down when they exit or are closed.
//!
//! # Example Session
//!
//! ```text
//! $ mpdev repl /dev/ttyUSB0
//! Attached to /dev/ttyUSB0
//! >>> print(1 + 1)
//! 2
//! >>> :mem
//! Free memory: 8144384 bytes
//! >>> :close
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod attach;
pub mod command;
mod error;
pub mod highlight;
pub mod launcher;
pub mod manager;

pub use attach::attach;
pub use command::ControlCommand;
pub use error::{Result, SessionError};
pub use launcher::{MpremoteLauncher, SessionLauncher};
pub use manager::{SessionHandle, SessionManager, SessionState, Target};

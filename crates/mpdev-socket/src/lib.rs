//! mpdev-socket - Persistent websocket transport
//!
//! Devices running the upload agent accept files over a websocket at
//! `ws://<host>:<port>/ws`. This crate implements [`mpdev_core::Transport`]
//! over that connection:
//!
//! - `{"action":"start_upload","filename":..,"filesize":..}`, binary chunks,
//!   then `{"action":"end_upload","filename":..}`
//! - `progress:<done>/<total>` updates from the device
//! - `[Remote]✅` / `[Remote]❌` terminal confirmations
//! - `{"action":"list"}` and `{"action":"delete","filename":..}`
//!
//! Opening the connection is bounded by a timeout (20 seconds by default)
//! and reported as a connection error, which callers do not retry.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod protocol;
mod transport;

pub use error::SocketError;
pub use protocol::{ControlFrame, ListReply, StatusFrame};
pub use transport::{socket_url, SocketConfig, SocketTransport};

//! mpdev-command - Process-per-operation transport
//!
//! This crate implements [`mpdev_core::Transport`] by running external tools:
//!
//! - the file tool (`ampy` by default) for listing, deleting, creating
//!   directories and uploading files over a serial line
//! - the flash tool (`esptool` by default) for chip identification, erase,
//!   write and verify, over serial or over the air
//!
//! It also carries the serial helpers the CLI needs before handing the line to
//! a tool: port enumeration and interrupting a running program.
//!
//! # Example
//!
//! ```ignore
//! use mpdev_command::{CommandTransport, ToolPaths};
//! use mpdev_core::{Endpoint, Transport};
//!
//! let mut transport = CommandTransport::new(Endpoint::parse("/dev/ttyUSB0")?, ToolPaths::default());
//! let entries = transport.list_entries("").await?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod process;
pub mod serial;
mod transport;

pub use process::{run_tool, ProgressParser, ToolOutput};
pub use serial::{available_ports, interrupt_program, interrupt_with_retry, PortInfo};
pub use transport::{CommandTransport, ToolPaths};

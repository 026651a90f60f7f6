//! mpdev-core - Core library for MicroPython device synchronization
//!
//! This crate holds everything that does not depend on how bytes reach the
//! device: the data model, the `Transport` capability trait, local and remote
//! enumeration, reconciliation, the deletion policy, the retry controller and
//! the synchronization pipeline that ties them together.
//!
//! # Architecture
//!
//! ```text
//!   local tree ──► local::enumerate ──┐
//!                                      ├──► reconcile::plan ──► delete ──► upload
//!   device ──► remote::list_remote ───┘                           (Transport + RetryPolicy)
//! ```
//!
//! Transport implementations live in their own crates (`mpdev-command`,
//! `mpdev-socket`, `mpdev-dummy`) and implement [`transport::Transport`].
//!
//! # Example
//!
//! ```ignore
//! use mpdev_core::{local, sync, Endpoint};
//!
//! let inventory = local::enumerate(root, &exclusions)?;
//! let outcome = sync::synchronize(&mut transport, &inventory, &inventory, &options, &confirm, &mut progress).await?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Transports are used through generics only, never as trait objects
#![allow(async_fn_in_trait)]

pub mod delete;
pub mod endpoint;
pub mod entry;
pub mod error;
pub mod local;
pub mod progress;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod sync;
pub mod transport;

pub use endpoint::Endpoint;
pub use entry::{EntryKind, LocalEntry, RemoteEntry};
pub use error::{Error, ErrorKind, Result};
pub use progress::{NoProgress, ProgressSink};
pub use retry::{Attempts, Retried, RetryError, RetryPolicy};
pub use transport::{FirmwareConnection, FirmwareOp, FirmwareVerb, TransferJob, Transport};

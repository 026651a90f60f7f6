//! CLI command implementations
//!
//! Each command opens the transport it needs through [`crate::transports`],
//! runs one pipeline from the library crates and prints the outcome.
//!
//! ## File commands
//!
//! `ls`, `rm` and `sync` go through the file transport of the endpoint
//! (command tool, websocket or dummy device).
//!
//! ## Firmware and sessions
//!
//! `flash` always goes through the flash tool (or the dummy device); `repl`
//! runs the session manager's attach loop.

mod flash;
mod ls;
mod ports;
mod repl;
mod rm;
mod sync;

pub use flash::{run_flash, FlashArgs};
pub use ls::run_ls;
pub use ports::run_ports;
pub use repl::run_repl;
pub use rm::run_rm;
pub use sync::{run_sync, SyncArgs};

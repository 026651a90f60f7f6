//! mpdev-flash - Firmware flash pipeline
//!
//! Runs chip identification, optional erase, write and optional verify over
//! any [`mpdev_core::Transport`], serial or over-the-air, and reduces the
//! outcome to one [`FlashResult`] or one [`FlashFailure`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod firmware;
pub mod machine;

pub use error::{FlashFailure, FlashStage};
pub use firmware::{extract_chip, extract_mac, find_latest_firmware};
pub use machine::{plan_operations, FlashJob, FlashMachine, FlashOptions, FlashResult, FlashState};

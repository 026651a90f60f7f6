//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use mpdev_core::reconcile::ReconcileMode;
use mpdev_core::Endpoint;
use std::path::PathBuf;

/// Parse an endpoint argument
fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    Endpoint::parse(s).map_err(|e| e.to_string())
}

const ENDPOINT_HELP: &str =
    "Device endpoint: serial port (/dev/ttyUSB0, COM3), socket address (192.168.4.1:8266), URL for OTA flashing (esp://192.168.4.1), or `dummy`";

#[derive(Parser)]
#[command(name = "mpdev")]
#[command(author, version, about = "MicroPython device sync, flash and REPL tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ./mpdev.toml, then the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// How `sync` treats files already on the device
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Delete everything on the device, then upload the selection
    #[default]
    Replace,
    /// Only overwrite files that are part of the selection
    Selective,
}

impl From<SyncMode> for ReconcileMode {
    fn from(mode: SyncMode) -> Self {
        match mode {
            SyncMode::Replace => ReconcileMode::FullReplace,
            SyncMode::Selective => ReconcileMode::SelectiveOverlap,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List serial ports and available transports
    Ports,

    /// List files on the device
    Ls {
        #[arg(help = ENDPOINT_HELP, value_parser = parse_endpoint)]
        endpoint: Endpoint,

        /// Remote directory to start from
        #[arg(long, default_value = "")]
        path: String,

        /// Show an indented tree instead of a flat list
        #[arg(long)]
        tree: bool,
    },

    /// Delete files on the device
    Rm {
        #[arg(help = ENDPOINT_HELP, value_parser = parse_endpoint)]
        endpoint: Endpoint,

        /// Remote paths to delete (default: every file on the device)
        paths: Vec<String>,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Synchronize a local folder to the device
    Sync {
        #[arg(help = ENDPOINT_HELP, value_parser = parse_endpoint)]
        endpoint: Endpoint,

        /// Local project root
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Reconciliation mode
        #[arg(long, value_enum, default_value_t = SyncMode::Replace)]
        mode: SyncMode,

        /// Upload only these files or folders (relative to the root, comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        select: Vec<String>,

        /// Additional exclusion patterns (comma-separated, e.g. `build,*.log`)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Serial port to fall back to if the socket cannot be reached
        #[arg(long)]
        serial: Option<String>,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Don't interrupt the running program before a serial sync
        #[arg(long)]
        no_interrupt: bool,

        /// Don't open a REPL session afterwards
        #[arg(long)]
        no_repl: bool,
    },

    /// Flash a firmware image
    Flash {
        #[arg(help = ENDPOINT_HELP, value_parser = parse_endpoint)]
        endpoint: Endpoint,

        /// Firmware image
        #[arg(short, long, conflicts_with = "firmware_dir", required_unless_present = "firmware_dir")]
        firmware: Option<PathBuf>,

        /// Use the newest *.bin in this directory
        #[arg(long)]
        firmware_dir: Option<PathBuf>,

        /// Erase the whole flash first
        #[arg(long)]
        erase: bool,

        /// Verify after writing
        #[arg(long)]
        verify: bool,

        /// Serial baud rate (overrides config)
        #[arg(long)]
        baud: Option<u32>,

        /// Chip family (overrides config)
        #[arg(long)]
        chip: Option<String>,

        /// Chunk size for over-the-air writes (overrides config)
        #[arg(long)]
        ota_chunk_size: Option<usize>,

        /// Print the flash tool invocations without running them
        #[arg(long)]
        dry_run: bool,

        /// Don't open a REPL session afterwards
        #[arg(long)]
        no_repl: bool,
    },

    /// Open an interactive REPL session
    Repl {
        #[arg(help = ENDPOINT_HELP, value_parser = parse_endpoint)]
        endpoint: Endpoint,

        /// Reset the board when connecting
        #[arg(long)]
        reset: bool,
    },
}

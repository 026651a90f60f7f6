//! mpdev - MicroPython device sync, flash and REPL tool
//!
//! Keeps a local project folder in sync with the filesystem of a MicroPython
//! board, flashes firmware images and opens interactive sessions.
//!
//! # Architecture
//!
//! mpdev uses one `Transport` abstraction that works with:
//! - **Command transport** - one external tool process per operation over a
//!   serial port (file tool for files, flash tool for firmware)
//! - **Socket transport** - a persistent websocket to firmware that accepts
//!   chunked uploads
//! - **Dummy device** - an in-memory board for testing
//!
//! The sync pipeline, the flash state machine and the session manager work
//! regardless of which transport the endpoint selects.

mod cli;
mod commands;
mod config;
mod progress;
mod prompt;
mod transports;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{FlashArgs, SyncArgs};
use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ports => commands::run_ports(),
        Commands::Ls {
            endpoint,
            path,
            tree,
        } => commands::run_ls(&config, &endpoint, &path, tree).await,
        Commands::Rm {
            endpoint,
            paths,
            yes,
        } => commands::run_rm(&config, &endpoint, &paths, yes).await,
        Commands::Sync {
            endpoint,
            root,
            mode,
            select,
            exclude,
            serial,
            yes,
            no_interrupt,
            no_repl,
        } => {
            let args = SyncArgs {
                endpoint,
                root,
                mode: mode.into(),
                select,
                exclude,
                serial,
                assume_yes: yes,
                interrupt: !no_interrupt,
                open_repl: !no_repl,
            };
            commands::run_sync(&config, args).await
        }
        Commands::Flash {
            endpoint,
            firmware,
            firmware_dir,
            erase,
            verify,
            baud,
            chip,
            ota_chunk_size,
            dry_run,
            no_repl,
        } => {
            let args = FlashArgs {
                endpoint,
                firmware,
                firmware_dir,
                erase,
                verify,
                baud,
                chip,
                ota_chunk_size,
                dry_run,
                open_repl: !no_repl,
            };
            commands::run_flash(&config, args).await
        }
        Commands::Repl { endpoint, reset } => commands::run_repl(&config, &endpoint, reset).await,
    }
}

//! Ls command implementation

use crate::config::Config;
use crate::transports;
use colored::Colorize;
use mpdev_core::remote::{list_remote, tree_lines};
use mpdev_core::{Endpoint, Transport};

/// Print the files below `path` on the device
pub async fn run_ls(
    config: &Config,
    endpoint: &Endpoint,
    path: &str,
    tree: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut transport = transports::open_files(endpoint, config).await?;
    let listed = list_remote(&mut transport, path).await;
    if let Err(e) = transport.close().await {
        log::debug!("Closing {}: {}", endpoint, e);
    }
    let inventory = listed?;

    let paths = inventory.paths();
    if tree {
        for line in tree_lines(&paths) {
            println!("{}", line);
        }
    } else {
        for path in &paths {
            println!("{}", path);
        }
    }
    println!();
    println!("{} file(s) on {}", inventory.len(), endpoint);

    for warning in inventory.warnings() {
        eprintln!(
            "{}: could not list {}: {}",
            "Warning".bright_yellow(),
            warning.path,
            warning.reason
        );
    }
    Ok(())
}

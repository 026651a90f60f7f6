//! Rm command implementation

use crate::config::Config;
use crate::progress::IndicatifProgress;
use crate::prompt::TerminalConfirm;
use crate::transports;
use colored::Colorize;
use mpdev_core::delete::delete_all;
use mpdev_core::entry::normalize_remote_path;
use mpdev_core::remote::list_remote;
use mpdev_core::sync::Confirm;
use mpdev_core::{Endpoint, Transport};

/// Delete `paths` (or every file) on the device after confirmation
pub async fn run_rm(
    config: &Config,
    endpoint: &Endpoint,
    paths: &[String],
    assume_yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut transport = transports::open_files(endpoint, config).await?;

    let targets: Vec<String> = if paths.is_empty() {
        list_remote(&mut transport, "").await?.paths()
    } else {
        paths.iter().map(|p| normalize_remote_path(p)).collect()
    };

    if targets.is_empty() {
        println!("Nothing to delete on {}", endpoint);
        return Ok(());
    }

    let confirm = TerminalConfirm::new(assume_yes);
    let prompt = format!("Delete {} path(s) from {}?", targets.len(), endpoint);
    if !confirm.confirm(&prompt) {
        println!("Cancelled, nothing was deleted");
        if let Err(e) = transport.close().await {
            log::debug!("Closing {}: {}", endpoint, e);
        }
        return Ok(());
    }

    let mut progress = IndicatifProgress::new();
    let report = delete_all(&mut transport, &targets, config.delete_throttle(), &mut progress).await;
    progress.finish(&format!(
        "Deleted {}/{} path(s)",
        report.deleted.len(),
        targets.len()
    ));
    if let Err(e) = transport.close().await {
        log::debug!("Closing {}: {}", endpoint, e);
    }

    for failure in &report.failed {
        eprintln!(
            "{}: {}: {}",
            "Failed".bright_red().bold(),
            failure.path,
            failure.error
        );
    }
    if !report.is_clean() {
        return Err(format!("{} path(s) could not be deleted", report.failed.len()).into());
    }
    Ok(())
}

//! Sync command implementation

use crate::commands::run_repl;
use crate::config::Config;
use crate::progress::IndicatifProgress;
use crate::prompt::{ask_with_default, ask_yes_no, TerminalConfirm};
use crate::transports::{self, DeviceTransport};
use colored::Colorize;
use mpdev_command::{available_ports, interrupt_with_retry};
use mpdev_core::local::enumerate;
use mpdev_core::reconcile::ReconcileMode;
use mpdev_core::sync::{synchronize, SyncOptions, SyncOutcome, SyncReport};
use mpdev_core::{Endpoint, ErrorKind, LocalEntry, RetryPolicy, Transport};
use std::path::PathBuf;
use std::time::Duration;

/// Arguments of `mpdev sync`
pub struct SyncArgs {
    pub endpoint: Endpoint,
    pub root: PathBuf,
    pub mode: ReconcileMode,
    pub select: Vec<String>,
    pub exclude: Vec<String>,
    pub serial: Option<String>,
    pub assume_yes: bool,
    pub interrupt: bool,
    pub open_repl: bool,
}

/// Run one synchronization
pub async fn run_sync(config: &Config, args: SyncArgs) -> Result<(), Box<dyn std::error::Error>> {
    let exclusions = config.exclusions(&args.exclude);
    let inventory = enumerate(&args.root, &exclusions)?;
    let selection = select_entries(&inventory, &args.select)?;
    log::info!(
        "{} local entries under {}, {} selected",
        inventory.len(),
        args.root.display(),
        selection.len()
    );

    let mut transport = match transports::open_files(&args.endpoint, config).await {
        Ok(transport) => transport,
        Err(e) if e.kind() == ErrorKind::Connection && args.endpoint.is_network() => {
            eprintln!("{}: {}", "Error".bright_red().bold(), e);
            match serial_fallback(config, &args) {
                Some(transport) => transport,
                None => {
                    println!("Cancelled, nothing was changed");
                    return Ok(());
                }
            }
        }
        Err(e) => return Err(e.into()),
    };

    if args.interrupt && matches!(transport, DeviceTransport::Command(_)) {
        if let Some(port) = transport.endpoint().serial_port() {
            let policy = RetryPolicy::new(5, Duration::from_secs(1));
            if let Err(e) = interrupt_with_retry(port, config.serial_baud, policy).await {
                log::warn!("Could not interrupt the running program on {}: {}", port, e);
            }
        }
    }

    let options = SyncOptions {
        mode: args.mode,
        put_policy: transport.upload_policy(),
        delete_throttle: config.delete_throttle(),
    };
    let mut progress = IndicatifProgress::new();
    let confirm = TerminalConfirm::new(args.assume_yes).with_bar(progress.bar());

    let outcome = synchronize(
        &mut transport,
        &selection,
        &inventory,
        &options,
        &confirm,
        &mut progress,
    )
    .await;

    let report = match outcome {
        Ok(SyncOutcome::Completed(report)) => {
            progress.finish(&format!(
                "Uploaded {}/{} file(s) to {}",
                report.uploaded.len(),
                report.total,
                transport.endpoint()
            ));
            report
        }
        Ok(SyncOutcome::Cancelled) => {
            progress.clear();
            println!("Cancelled, nothing was changed");
            return Ok(());
        }
        Err(e) => {
            progress.clear();
            return Err(e.into());
        }
    };

    print_report(&report);
    if let Err(e) = transport.close().await {
        log::debug!("Closing {}: {}", transport.endpoint(), e);
    }

    if args.open_repl && transport.supports_session() {
        run_repl(config, transport.endpoint(), true).await?;
    }

    if !report.is_clean() {
        return Err(format!(
            "{} upload(s) and {} deletion(s) failed",
            report.failed.len(),
            report.deleted.failed.len()
        )
        .into());
    }
    Ok(())
}

/// Map `--select` arguments to inventory entries; no arguments selects all
fn select_entries(
    inventory: &[LocalEntry],
    select: &[String],
) -> Result<Vec<LocalEntry>, Box<dyn std::error::Error>> {
    if select.is_empty() {
        return Ok(inventory.to_vec());
    }

    let mut selection = Vec::with_capacity(select.len());
    for wanted in select {
        let wanted = wanted.replace('\\', "/");
        let wanted = wanted.trim_start_matches("./").trim_matches('/');
        match inventory.iter().find(|e| e.relative_path == wanted) {
            Some(entry) => selection.push(entry.clone()),
            None => return Err(format!("'{}' is not in the project (or is excluded)", wanted).into()),
        }
    }
    Ok(selection)
}

/// Offer to repeat the job over a serial port
fn serial_fallback(config: &Config, args: &SyncArgs) -> Option<DeviceTransport> {
    if !args.assume_yes && !ask_yes_no("Retry over a serial port instead?") {
        return None;
    }

    let port = match &args.serial {
        Some(port) => port.clone(),
        None => {
            let first = available_ports()
                .ok()
                .and_then(|ports| ports.into_iter().next())
                .map(|p| p.name);
            match first {
                Some(first) if args.assume_yes => first,
                Some(first) => ask_with_default("Serial port", &first)?,
                None => {
                    eprintln!("No serial ports found");
                    return None;
                }
            }
        }
    };

    log::info!("Falling back to serial port {}", port);
    Some(transports::serial_fallback(&port, config))
}

fn print_report(report: &SyncReport) {
    if !report.deleted.deleted.is_empty() {
        println!("Deleted {} remote file(s)", report.deleted.deleted.len());
    }
    if report.skipped_listings > 0 {
        println!(
            "{}: {} remote folder(s) could not be listed",
            "Warning".bright_yellow(),
            report.skipped_listings
        );
    }
    for failure in &report.deleted.failed {
        eprintln!(
            "{}: delete {}: {}",
            "Failed".bright_red().bold(),
            failure.path,
            failure.error
        );
    }
    for failure in &report.failed {
        eprintln!(
            "{}: upload {}: {}",
            "Failed".bright_red().bold(),
            failure.path,
            failure.error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpdev_core::local::Exclusions;
    use std::fs;

    #[test]
    fn test_select_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), b"").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.py"), b"").unwrap();
        let inventory = enumerate(dir.path(), &Exclusions::default()).unwrap();

        assert_eq!(select_entries(&inventory, &[]).unwrap().len(), 3);

        let picked = select_entries(&inventory, &["./lib/".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].relative_path, "lib");

        assert!(select_entries(&inventory, &["missing.py".to_string()]).is_err());
    }
}

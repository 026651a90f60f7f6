//! Synchronization pipeline
//!
//! One sync run is: list the device, reconcile, ask for authorization if the
//! plan is destructive, delete, create missing directories, then upload every
//! file under the retry policy. The remote listing is always taken fresh at
//! the start of the run.
//!
//! Per-file failures are collected in the report and never stop the batch.
//! Connection and fatal errors end the run and close the transport.

use crate::delete::{delete_all, DeleteReport};
use crate::entry::LocalEntry;
use crate::error::{Error, ErrorKind, Result};
use crate::progress::ProgressSink;
use crate::reconcile::{plan, required_dirs, ReconcileMode};
use crate::remote::list_remote;
use crate::retry::RetryPolicy;
use crate::transport::{TransferJob, Transport};
use std::time::Duration;

/// Asks the user to approve a destructive step
pub trait Confirm {
    /// Return true to proceed
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Approves everything (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Parameters of one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Reconciliation mode
    pub mode: ReconcileMode,
    /// Retry policy for each file upload
    pub put_policy: RetryPolicy,
    /// Pause between deletions
    pub delete_throttle: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: ReconcileMode::FullReplace,
            put_policy: RetryPolicy::file_put(),
            delete_throttle: Duration::from_secs(1),
        }
    }
}

/// One file that could not be uploaded
#[derive(Debug)]
pub struct UploadFailure {
    /// Destination path
    pub path: String,
    /// Final error
    pub error: Error,
}

/// What a completed run did
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Uploaded destination paths
    pub uploaded: Vec<String>,
    /// Files the plan asked to upload
    pub total: usize,
    /// Deletion outcome
    pub deleted: DeleteReport,
    /// Files that failed after all attempts
    pub failed: Vec<UploadFailure>,
    /// Remote subtrees that could not be listed
    pub skipped_listings: usize,
}

impl SyncReport {
    /// Every delete and upload succeeded
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.deleted.is_clean()
    }
}

/// Result of [`synchronize`]
#[derive(Debug)]
pub enum SyncOutcome {
    /// The run went through; see the report for per-file failures
    Completed(SyncReport),
    /// The user declined; nothing was changed on the device
    Cancelled,
}

/// Reconcile the device with `selection`
///
/// `inventory` is the full local enumeration and is used to expand selected
/// folders. The transport is closed on cancellation and on job-level errors,
/// and left open after a completed run.
pub async fn synchronize<T, C>(
    transport: &mut T,
    selection: &[LocalEntry],
    inventory: &[LocalEntry],
    options: &SyncOptions,
    confirm: &C,
    progress: &mut dyn ProgressSink,
) -> Result<SyncOutcome>
where
    T: Transport + ?Sized,
    C: Confirm + ?Sized,
{
    let result = run(transport, selection, inventory, options, confirm, progress).await;
    if !matches!(result, Ok(SyncOutcome::Completed(_))) {
        if let Err(e) = transport.close().await {
            log::debug!("Closing transport after early exit: {}", e);
        }
    }
    result
}

async fn run<T, C>(
    transport: &mut T,
    selection: &[LocalEntry],
    inventory: &[LocalEntry],
    options: &SyncOptions,
    confirm: &C,
    progress: &mut dyn ProgressSink,
) -> Result<SyncOutcome>
where
    T: Transport + ?Sized,
    C: Confirm + ?Sized,
{
    progress.report("Listing device files", None);
    let remote = list_remote(transport, "").await?;
    let plan = plan(options.mode, selection, inventory, &remote);

    if plan.needs_authorization {
        let prompt = format!(
            "This will delete all {} file(s) on {}. Continue?",
            plan.delete.len(),
            transport.endpoint()
        );
        if !confirm.confirm(&prompt) {
            log::info!("Sync cancelled by user");
            return Ok(SyncOutcome::Cancelled);
        }
    }

    let mut report = SyncReport {
        total: plan.upload.len(),
        skipped_listings: remote.warnings().len(),
        ..Default::default()
    };

    if !plan.delete.is_empty() {
        log::info!("Deleting {} remote file(s)", plan.delete.len());
        report.deleted =
            delete_all(transport, &plan.delete, options.delete_throttle, progress).await;
    }

    if !transport.creates_parents() {
        for dir in required_dirs(&plan.upload) {
            // Existing directories make this fail; that is fine
            if let Err(e) = transport.make_dir(&dir).await {
                log::debug!("mkdir {}: {}", dir, e);
            }
        }
    }

    let total = plan.upload.len();
    for (i, entry) in plan.upload.iter().enumerate() {
        progress.report(
            &format!("Uploading {} ({}/{})", entry.relative_path, i + 1, total),
            None,
        );
        match upload_one(transport, entry, options.put_policy, progress).await {
            Ok(()) => {
                log::info!("Uploaded {}", entry.relative_path);
                report.uploaded.push(entry.relative_path.clone());
            }
            Err(e) if matches!(e.kind(), ErrorKind::Connection | ErrorKind::Fatal) => {
                return Err(e);
            }
            Err(error) => {
                log::error!("Upload of {} failed: {}", entry.relative_path, error);
                report.failed.push(UploadFailure {
                    path: entry.relative_path.clone(),
                    error,
                });
            }
        }
    }

    progress.report(
        &format!("Uploaded {}/{} file(s)", report.uploaded.len(), total),
        Some(100),
    );
    Ok(SyncOutcome::Completed(report))
}

async fn upload_one<T>(
    transport: &mut T,
    entry: &LocalEntry,
    policy: RetryPolicy,
    progress: &mut dyn ProgressSink,
) -> Result<()>
where
    T: Transport + ?Sized,
{
    let size = tokio::fs::metadata(&entry.absolute_path).await?.len();
    let mut job = TransferJob::new(
        entry.absolute_path.clone(),
        entry.relative_path.clone(),
        size,
    );
    let mut attempts = policy.attempts(format!("upload {}", entry.relative_path));

    loop {
        attempts.start();
        job.restart();
        match transport.put_file(&mut job, progress).await {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() => return Err(attempts.abort(e).into()),
            Err(e) => attempts.failed(e).await?,
        }
    }
}

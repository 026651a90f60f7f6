//! Remote deletion policy
//!
//! A path is first deleted as a file. If that fails and the path does not
//! look like a file, one directory delete is attempted. Batches are throttled
//! between items because small devices fall over when hammered with requests,
//! and one failing path never aborts the rest of the batch.

use crate::entry::looks_like_file;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::transport::Transport;
use std::time::Duration;

/// Delete a single remote path
pub async fn delete_path<T>(transport: &mut T, path: &str) -> Result<()>
where
    T: Transport + ?Sized,
{
    match transport.delete_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if looks_like_file(path) => Err(e),
        Err(e) => {
            log::debug!("File delete of '{}' failed ({}), trying as directory", path, e);
            transport.delete_dir(path).await
        }
    }
}

/// One path that could not be deleted
#[derive(Debug)]
pub struct DeleteFailure {
    /// Remote path
    pub path: String,
    /// Last error
    pub error: Error,
}

/// Outcome of a delete batch
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Paths that were deleted
    pub deleted: Vec<String>,
    /// Paths that survived
    pub failed: Vec<DeleteFailure>,
}

impl DeleteReport {
    /// True if every path was deleted
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete `paths` one by one, waiting `throttle` between items
pub async fn delete_all<T>(
    transport: &mut T,
    paths: &[String],
    throttle: Duration,
    progress: &mut dyn ProgressSink,
) -> DeleteReport
where
    T: Transport + ?Sized,
{
    let mut report = DeleteReport::default();
    let total = paths.len();

    for (i, path) in paths.iter().enumerate() {
        if i > 0 && !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }

        match delete_path(transport, path).await {
            Ok(()) => {
                log::info!("Deleted {}", path);
                progress.report(&format!("Deleted {} ({}/{})", path, i + 1, total), None);
                report.deleted.push(path.clone());
            }
            Err(error) => {
                log::warn!("Could not delete {}: {}", path, error);
                progress.report(&format!("Failed to delete {}: {}", path, error), None);
                report.failed.push(DeleteFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }
    report
}

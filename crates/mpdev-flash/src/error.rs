//! Flash pipeline failures
//!
//! Each variant renders as the single summary shown to the user, so the
//! three common cases read differently: the device was never found, the
//! erase failed, or the write failed after a number of attempts.

use std::path::PathBuf;
use thiserror::Error;

/// Stage at which a flash job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStage {
    /// Checking the firmware image
    Image,
    /// Chip identification
    Detect,
    /// Flash erase
    Erase,
    /// Image write
    Write,
    /// Read-back verification
    Verify,
}

/// Terminal failure of a flash job
#[derive(Debug, Error)]
pub enum FlashFailure {
    /// The image cannot be read
    #[error("firmware image {} not usable: {cause}", path.display())]
    Image {
        /// Image path
        path: PathBuf,
        /// Underlying error
        #[source]
        cause: mpdev_core::Error,
    },

    /// Chip identification never succeeded
    #[error("could not detect device on {endpoint} after {attempts} attempt(s): {cause}")]
    Detect {
        /// Endpoint probed
        endpoint: String,
        /// Attempts made
        attempts: u32,
        /// Last error
        #[source]
        cause: mpdev_core::Error,
    },

    /// Erasing the flash failed
    #[error("erase failed after {attempts} attempt(s): {cause}")]
    Erase {
        /// Attempts made
        attempts: u32,
        /// Last error
        #[source]
        cause: mpdev_core::Error,
    },

    /// Writing the image failed
    #[error("write failed after {attempts} attempt(s): {cause}")]
    Write {
        /// Attempts made
        attempts: u32,
        /// Last error
        #[source]
        cause: mpdev_core::Error,
    },

    /// The flash does not match the image
    #[error("verify failed: {cause}")]
    Verify {
        /// Underlying error
        #[source]
        cause: mpdev_core::Error,
    },
}

impl FlashFailure {
    /// Stage that failed
    pub fn stage(&self) -> FlashStage {
        match self {
            Self::Image { .. } => FlashStage::Image,
            Self::Detect { .. } => FlashStage::Detect,
            Self::Erase { .. } => FlashStage::Erase,
            Self::Write { .. } => FlashStage::Write,
            Self::Verify { .. } => FlashStage::Verify,
        }
    }

    /// Attempts made in the failing stage
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Image { .. } | Self::Verify { .. } => 1,
            Self::Detect { attempts, .. }
            | Self::Erase { attempts, .. }
            | Self::Write { attempts, .. } => *attempts,
        }
    }

    /// Error that ended the job
    pub fn cause(&self) -> &mpdev_core::Error {
        match self {
            Self::Image { cause, .. }
            | Self::Detect { cause, .. }
            | Self::Erase { cause, .. }
            | Self::Write { cause, .. }
            | Self::Verify { cause } => cause,
        }
    }
}

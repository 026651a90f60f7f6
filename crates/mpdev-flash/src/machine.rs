//! Flash state machine
//!
//! ```text
//! Idle → Detecting → [Erasing] → Writing → [Verifying] → Done
//!   └──────────┴──────────┴──────────┴───────────┴──────→ Failed
//! ```
//!
//! Chip identification runs first and its failure ends the job. Erase and
//! over-the-air writes are retried; a serial write is a single attempt because
//! a half-written image cannot be resumed. `Done` is followed by a settle
//! delay so the bootloader can hand over before anything else opens the port.

use crate::error::FlashFailure;
use crate::firmware::{extract_chip, extract_mac};
use mpdev_core::{
    Endpoint, Error, FirmwareConnection, FirmwareOp, FirmwareVerb, ProgressSink, RetryPolicy,
    Transport,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// One firmware flash request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashJob {
    /// Device endpoint; its shape selects serial or over-the-air flashing
    pub endpoint: Endpoint,
    /// Firmware image
    pub firmware: PathBuf,
    /// Serial baud rate
    pub baud: u32,
    /// Chip family for the flash tool
    pub chip: String,
    /// Erase the whole flash before writing
    pub erase_first: bool,
    /// Verify the image after writing
    pub verify: bool,
    /// Chunk size for over-the-air writes
    pub ota_chunk_size: usize,
}

impl FlashJob {
    /// Create a job with default serial settings
    pub fn new(endpoint: Endpoint, firmware: impl Into<PathBuf>) -> Self {
        Self {
            endpoint,
            firmware: firmware.into(),
            baud: 921_600,
            chip: "esp32s3".to_string(),
            erase_first: false,
            verify: false,
            ota_chunk_size: 1024,
        }
    }

    /// Connection parameters derived from the endpoint
    pub fn connection(&self) -> FirmwareConnection {
        FirmwareConnection::for_endpoint(&self.endpoint, &self.chip, self.baud)
    }

    fn op(&self, verb: FirmwareVerb) -> FirmwareOp {
        FirmwareOp::new(self.connection(), verb)
    }
}

/// Timing and retry settings of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashOptions {
    /// Pause after a successful write
    pub settle: Duration,
    /// Policy for chip identification
    pub detect_policy: RetryPolicy,
    /// Policy for erase over serial
    pub erase_policy: RetryPolicy,
    /// Policy for erase and write over the air
    pub ota_policy: RetryPolicy,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            detect_policy: RetryPolicy::chip_id(),
            erase_policy: RetryPolicy::erase(),
            ota_policy: RetryPolicy::ota(),
        }
    }
}

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    /// Not started
    Idle,
    /// Identifying the chip
    Detecting,
    /// Erasing the flash
    Erasing,
    /// Writing the image
    Writing,
    /// Verifying the image
    Verifying,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl FlashState {
    /// True for `Done` and `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, FlashState::Done | FlashState::Failed)
    }
}

/// Successful flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashResult {
    /// Flashed endpoint
    pub endpoint: Endpoint,
    /// Image written
    pub firmware: PathBuf,
    /// Chip description from identification, if printed
    pub chip: Option<String>,
    /// MAC address from identification, if printed
    pub mac: Option<String>,
    /// The flash was erased first
    pub erased: bool,
    /// The image was verified
    pub verified: bool,
    /// Attempts the write took
    pub write_attempts: u32,
    /// Wall time, settle delay included
    pub elapsed: Duration,
}

/// Operations a job will run, in order
///
/// Used for dry runs; nothing is executed.
pub fn plan_operations(job: &FlashJob) -> Vec<FirmwareOp> {
    let mut ops = vec![job.op(FirmwareVerb::ChipId)];
    if job.erase_first {
        ops.push(job.op(FirmwareVerb::EraseFlash));
    }
    ops.push(job.op(FirmwareVerb::WriteFlash {
        image: job.firmware.clone(),
        chunk_size: job.ota_chunk_size,
    }));
    if job.verify {
        ops.push(job.op(FirmwareVerb::VerifyFlash {
            image: job.firmware.clone(),
        }));
    }
    ops
}

/// Drives one job through the states over a transport
pub struct FlashMachine<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    options: FlashOptions,
    state: FlashState,
    history: Vec<FlashState>,
}

impl<'a, T: Transport + ?Sized> FlashMachine<'a, T> {
    /// Create an idle machine
    pub fn new(transport: &'a mut T, options: FlashOptions) -> Self {
        Self {
            transport,
            options,
            state: FlashState::Idle,
            history: vec![FlashState::Idle],
        }
    }

    /// Current state
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Every state entered so far
    pub fn history(&self) -> &[FlashState] {
        &self.history
    }

    fn enter(&mut self, next: FlashState) {
        log::debug!("Flash state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, failure: FlashFailure) -> FlashFailure {
        log::error!("{}", failure);
        self.enter(FlashState::Failed);
        failure
    }

    /// Run `job` to a terminal state
    pub async fn run(
        &mut self,
        job: &FlashJob,
        progress: &mut dyn ProgressSink,
    ) -> Result<FlashResult, FlashFailure> {
        let started = Instant::now();
        let ota = job.connection().is_ota();

        if let Err(e) = tokio::fs::metadata(&job.firmware).await {
            return Err(self.fail(FlashFailure::Image {
                path: job.firmware.clone(),
                cause: e.into(),
            }));
        }

        self.enter(FlashState::Detecting);
        progress.report("Detecting chip", None);
        let chip_output = match self
            .attempt(&job.op(FirmwareVerb::ChipId), self.options.detect_policy, progress)
            .await
        {
            Ok((out, _)) => out,
            Err((attempts, cause)) => {
                return Err(self.fail(FlashFailure::Detect {
                    endpoint: job.endpoint.to_string(),
                    attempts,
                    cause,
                }))
            }
        };
        let chip = extract_chip(&chip_output);
        let mac = extract_mac(&chip_output);
        if let Some(mac) = &mac {
            log::info!("Found device with MAC {}", mac);
        }

        if job.erase_first {
            self.enter(FlashState::Erasing);
            progress.report("Erasing flash", None);
            let policy = if ota {
                self.options.ota_policy
            } else {
                self.options.erase_policy
            };
            if let Err((attempts, cause)) = self
                .attempt(&job.op(FirmwareVerb::EraseFlash), policy, progress)
                .await
            {
                return Err(self.fail(FlashFailure::Erase { attempts, cause }));
            }
        }

        self.enter(FlashState::Writing);
        progress.report(&format!("Writing {}", job.firmware.display()), Some(0));
        let policy = if ota {
            self.options.ota_policy
        } else {
            RetryPolicy::once()
        };
        let write = job.op(FirmwareVerb::WriteFlash {
            image: job.firmware.clone(),
            chunk_size: job.ota_chunk_size,
        });
        let write_attempts = match self.attempt(&write, policy, progress).await {
            Ok((_, attempts)) => attempts,
            Err((attempts, cause)) => {
                return Err(self.fail(FlashFailure::Write { attempts, cause }))
            }
        };

        if job.verify {
            self.enter(FlashState::Verifying);
            progress.report("Verifying", None);
            let verify = job.op(FirmwareVerb::VerifyFlash {
                image: job.firmware.clone(),
            });
            if let Err((_, cause)) = self.attempt(&verify, RetryPolicy::once(), progress).await {
                return Err(self.fail(FlashFailure::Verify { cause }));
            }
        }

        self.enter(FlashState::Done);
        progress.report("Firmware written", Some(100));
        if !self.options.settle.is_zero() {
            log::debug!("Waiting {:?} for the device to boot", self.options.settle);
            tokio::time::sleep(self.options.settle).await;
        }

        Ok(FlashResult {
            endpoint: job.endpoint.clone(),
            firmware: job.firmware.clone(),
            chip,
            mac,
            erased: job.erase_first,
            verified: job.verify,
            write_attempts,
            elapsed: started.elapsed(),
        })
    }

    /// Run one operation under `policy`, returning output and attempts made
    async fn attempt(
        &mut self,
        op: &FirmwareOp,
        policy: RetryPolicy,
        progress: &mut dyn ProgressSink,
    ) -> Result<(String, u32), (u32, Error)> {
        let mut attempts = policy.attempts(op.name());
        loop {
            attempts.start();
            match self.transport.run_firmware_op(op, progress).await {
                Ok(out) => return Ok((out, attempts.made())),
                Err(e) if !e.is_retryable() => return Err((attempts.made(), e)),
                Err(e) => {
                    if let Err(exhausted) = attempts.failed(e).await {
                        return Err((exhausted.attempts(), exhausted.into_inner()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlashStage;
    use mpdev_core::NoProgress;
    use mpdev_dummy::{DummyConfig, DummyDevice, Op};

    fn quick() -> FlashOptions {
        let none = Duration::ZERO;
        FlashOptions {
            settle: none,
            detect_policy: RetryPolicy::chip_id().with_delay(none),
            erase_policy: RetryPolicy::erase().with_delay(none),
            ota_policy: RetryPolicy::ota().with_delay(none),
        }
    }

    fn image(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("firmware.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    fn ota_device() -> DummyDevice {
        DummyDevice::new(DummyConfig {
            endpoint: Endpoint::parse("esp://192.168.4.1").unwrap(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_full_serial_flash() {
        let dir = tempfile::tempdir().unwrap();
        let fw = image(&dir);
        let mut device = DummyDevice::new_default();
        let mut job = FlashJob::new(device.endpoint().clone(), &fw);
        job.erase_first = true;
        job.verify = true;

        let mut machine = FlashMachine::new(&mut device, quick());
        let result = machine.run(&job, &mut NoProgress).await.unwrap();
        assert_eq!(
            machine.history(),
            &[
                FlashState::Idle,
                FlashState::Detecting,
                FlashState::Erasing,
                FlashState::Writing,
                FlashState::Verifying,
                FlashState::Done
            ]
        );
        assert_eq!(result.mac.as_deref(), Some("7C:DF:A1:00:11:22"));
        assert_eq!(result.write_attempts, 1);
        assert_eq!(&device.flash()[..10_000], &std::fs::read(&fw).unwrap()[..]);
    }

    #[tokio::test]
    async fn test_detect_failure_stops_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = DummyDevice::new_default();
        device.fail_next(Op::ChipId, 100);
        let job = FlashJob::new(device.endpoint().clone(), image(&dir));

        let mut machine = FlashMachine::new(&mut device, quick());
        let failure = machine.run(&job, &mut NoProgress).await.unwrap_err();
        assert_eq!(machine.state(), FlashState::Failed);
        assert_eq!(failure.stage(), FlashStage::Detect);
        assert_eq!(failure.attempts(), 5);
        assert!(failure.to_string().starts_with("could not detect device"));
        assert_eq!(device.calls(Op::Write), 0);
    }

    #[tokio::test]
    async fn test_serial_write_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = DummyDevice::new_default();
        device.fail_next(Op::Write, 1);
        let job = FlashJob::new(device.endpoint().clone(), image(&dir));

        let failure = FlashMachine::new(&mut device, quick())
            .run(&job, &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(failure.stage(), FlashStage::Write);
        assert!(failure.to_string().starts_with("write failed after 1 attempt(s)"));
        assert_eq!(device.calls(Op::Write), 1);
    }

    #[tokio::test]
    async fn test_ota_write_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = ota_device();
        device.fail_next(Op::Write, 2);
        let job = FlashJob::new(device.endpoint().clone(), image(&dir));
        assert!(job.connection().is_ota());

        let result = FlashMachine::new(&mut device, quick())
            .run(&job, &mut NoProgress)
            .await
            .unwrap();
        assert_eq!(result.write_attempts, 3);
    }

    #[tokio::test]
    async fn test_erase_failure_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = ota_device();
        device.fail_next(Op::Erase, 100);
        let mut job = FlashJob::new(device.endpoint().clone(), image(&dir));
        job.erase_first = true;

        let failure = FlashMachine::new(&mut device, quick())
            .run(&job, &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(failure.stage(), FlashStage::Erase);
        assert_eq!(failure.attempts(), RetryPolicy::ota().max_attempts);
        assert!(failure.to_string().starts_with("erase failed"));
    }

    #[tokio::test]
    async fn test_missing_image_touches_nothing() {
        let mut device = DummyDevice::new_default();
        let job = FlashJob::new(device.endpoint().clone(), "/nonexistent/fw.bin");
        let failure = FlashMachine::new(&mut device, quick())
            .run(&job, &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(failure.stage(), FlashStage::Image);
        assert!(device.log().is_empty());
    }

    #[test]
    fn test_plan_operations() {
        let mut job = FlashJob::new(Endpoint::parse("/dev/ttyUSB0").unwrap(), "fw.bin");
        job.erase_first = true;
        let names: Vec<_> = plan_operations(&job).iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["chip_id", "erase_flash", "write_flash"]);
    }
}

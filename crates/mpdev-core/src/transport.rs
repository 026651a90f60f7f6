//! Transport capability trait and the jobs it executes
//!
//! A transport moves bytes to and from one device endpoint. Two production
//! implementations exist: the command transport (one external process per
//! operation) and the socket transport (one persistent chunked connection
//! per batch). A job picks one transport when it starts and never mixes them.
//!
//! Operations on one transport are strictly sequential: every method takes
//! `&mut self`, so a second operation cannot start before the first finished.

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::progress::{percent_of, ProgressSink};
use std::path::PathBuf;

/// One file transfer in flight
///
/// `sent_bytes` only grows during a transfer. Retrying a failed transfer
/// starts again from zero with [`TransferJob::restart`]; partial chunks are
/// never resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    /// Local file
    pub source: PathBuf,
    /// Path on the device, `/`-separated
    pub destination: String,
    /// Size of the file
    pub total_bytes: u64,
    sent_bytes: u64,
}

impl TransferJob {
    /// Create a job with nothing sent yet
    pub fn new(source: PathBuf, destination: impl Into<String>, total_bytes: u64) -> Self {
        Self {
            source,
            destination: destination.into(),
            total_bytes,
            sent_bytes: 0,
        }
    }

    /// Bytes handed to the transport so far
    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    /// Record `n` more bytes sent. Never moves backwards or past the total.
    pub fn advance(&mut self, n: u64) {
        self.sent_bytes = self.sent_bytes.saturating_add(n).min(self.total_bytes);
    }

    /// Reset the offset for a whole-file retry
    pub fn restart(&mut self) {
        self.sent_bytes = 0;
    }

    /// Local send progress
    pub fn percent(&self) -> u8 {
        percent_of(self.sent_bytes, self.total_bytes)
    }

    /// All bytes handed to the transport
    pub fn is_sent(&self) -> bool {
        self.sent_bytes == self.total_bytes
    }
}

/// How the flash tool reaches the chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareConnection {
    /// Serial bootloader
    Serial {
        /// Serial port
        port: String,
        /// Chip family passed to the flash tool
        chip: String,
        /// Baud rate
        baud: u32,
    },
    /// Over-the-air through a network URL
    Ota {
        /// URL understood by the flash tool (e.g. `esp://192.168.4.1`)
        url: String,
    },
}

impl FirmwareConnection {
    /// Select connection parameters from the endpoint's shape
    ///
    /// URLs are used as-is, bare socket addresses become `socket://host:port`,
    /// serial ports use chip and baud.
    pub fn for_endpoint(endpoint: &Endpoint, chip: &str, baud: u32) -> Self {
        match endpoint {
            Endpoint::Serial(port) => FirmwareConnection::Serial {
                port: port.clone(),
                chip: chip.to_string(),
                baud,
            },
            Endpoint::Socket { host, port } => FirmwareConnection::Ota {
                url: format!("socket://{}:{}", host, port),
            },
            Endpoint::Url { .. } => FirmwareConnection::Ota {
                url: endpoint.to_string(),
            },
        }
    }

    /// True for the over-the-air path
    pub fn is_ota(&self) -> bool {
        matches!(self, FirmwareConnection::Ota { .. })
    }

    /// Leading flash tool arguments
    fn args(&self) -> Vec<String> {
        match self {
            FirmwareConnection::Serial { port, chip, baud } => vec![
                "--chip".into(),
                chip.clone(),
                "--port".into(),
                port.clone(),
                "--baud".into(),
                baud.to_string(),
            ],
            FirmwareConnection::Ota { url } => vec!["--port".into(), url.clone()],
        }
    }
}

/// Firmware operation kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareVerb {
    /// Identify the chip
    ChipId,
    /// Erase the whole flash
    EraseFlash,
    /// Write an image at offset 0
    WriteFlash {
        /// Firmware image
        image: PathBuf,
        /// OTA chunk size, ignored on serial
        chunk_size: usize,
    },
    /// Compare flash contents against an image
    VerifyFlash {
        /// Firmware image
        image: PathBuf,
    },
}

/// One flash tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareOp {
    /// Connection parameters
    pub connection: FirmwareConnection,
    /// What to do
    pub verb: FirmwareVerb,
}

impl FirmwareOp {
    /// Create an operation
    pub fn new(connection: FirmwareConnection, verb: FirmwareVerb) -> Self {
        Self { connection, verb }
    }

    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self.verb {
            FirmwareVerb::ChipId => "chip_id",
            FirmwareVerb::EraseFlash => "erase_flash",
            FirmwareVerb::WriteFlash { .. } => "write_flash",
            FirmwareVerb::VerifyFlash { .. } => "verify_flash",
        }
    }

    /// Full flash tool argument list
    ///
    /// `--chip <id> --port <endpoint> --baud <rate> <verb> <verb-args>` on
    /// serial, `--port <url> <verb> <verb-args>` over the air.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.connection.args();
        args.push(self.name().to_string());
        match &self.verb {
            FirmwareVerb::ChipId | FirmwareVerb::EraseFlash => {}
            FirmwareVerb::WriteFlash { image, chunk_size } => {
                if self.connection.is_ota() {
                    args.extend([
                        "--compress".to_string(),
                        "--flash_size".to_string(),
                        "detect".to_string(),
                        "--chunk_size".to_string(),
                        chunk_size.to_string(),
                    ]);
                } else {
                    args.push("-z".to_string());
                }
                args.push("0x0".to_string());
                args.push(image.display().to_string());
            }
            FirmwareVerb::VerifyFlash { image } => {
                args.push("0x0".to_string());
                args.push(image.display().to_string());
            }
        }
        args
    }
}

/// Capability set of a device transport
pub trait Transport {
    /// Endpoint this transport talks to
    fn endpoint(&self) -> &Endpoint;

    /// List the entries directly below `path` (`""` is the root)
    ///
    /// Returns one path per entry, as reported by the device.
    async fn list_entries(&mut self, path: &str) -> Result<Vec<String>>;

    /// Delete a file
    async fn delete_file(&mut self, path: &str) -> Result<()>;

    /// Delete a directory and its contents
    async fn delete_dir(&mut self, path: &str) -> Result<()>;

    /// Create a directory. Fails if it already exists on most devices.
    async fn make_dir(&mut self, path: &str) -> Result<()>;

    /// Transfer one whole file
    ///
    /// Returns only once the device confirmed the file, not when the local
    /// buffers were flushed.
    async fn put_file(&mut self, job: &mut TransferJob, progress: &mut dyn ProgressSink)
        -> Result<()>;

    /// Run one flash tool operation and return its output
    async fn run_firmware_op(
        &mut self,
        op: &FirmwareOp,
        progress: &mut dyn ProgressSink,
    ) -> Result<String>;

    /// Whether `put_file` creates missing parent directories by itself
    fn creates_parents(&self) -> bool {
        false
    }

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_job_offsets() {
        let mut job = TransferJob::new(PathBuf::from("a.py"), "a.py", 2048);
        job.advance(1024);
        assert_eq!(job.percent(), 50);
        job.advance(4096);
        assert_eq!(job.sent_bytes(), 2048);
        assert!(job.is_sent());
        job.restart();
        assert_eq!(job.sent_bytes(), 0);
    }

    #[test]
    fn test_serial_write_args() {
        let ep = Endpoint::parse("/dev/ttyUSB0").unwrap();
        let conn = FirmwareConnection::for_endpoint(&ep, "esp32s3", 921600);
        let op = FirmwareOp::new(
            conn,
            FirmwareVerb::WriteFlash {
                image: PathBuf::from("fw.bin"),
                chunk_size: 1024,
            },
        );
        assert_eq!(
            op.args(),
            vec![
                "--chip", "esp32s3", "--port", "/dev/ttyUSB0", "--baud", "921600",
                "write_flash", "-z", "0x0", "fw.bin"
            ]
        );
    }

    #[test]
    fn test_ota_write_args() {
        let ep = Endpoint::parse("esp://192.168.4.1").unwrap();
        let conn = FirmwareConnection::for_endpoint(&ep, "esp32s3", 921600);
        assert!(conn.is_ota());
        let op = FirmwareOp::new(
            conn,
            FirmwareVerb::WriteFlash {
                image: PathBuf::from("fw.bin"),
                chunk_size: 2048,
            },
        );
        assert_eq!(
            op.args(),
            vec![
                "--port", "esp://192.168.4.1", "write_flash", "--compress", "--flash_size",
                "detect", "--chunk_size", "2048", "0x0", "fw.bin"
            ]
        );
    }

    #[test]
    fn test_socket_endpoint_becomes_socket_url() {
        let ep = Endpoint::parse("10.0.0.5:3333").unwrap();
        assert_eq!(
            FirmwareConnection::for_endpoint(&ep, "esp32", 115200),
            FirmwareConnection::Ota {
                url: "socket://10.0.0.5:3333".into()
            }
        );
    }
}

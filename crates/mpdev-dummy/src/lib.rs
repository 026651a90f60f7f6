//! mpdev-dummy - In-memory MicroPython device
//!
//! This crate provides a device that keeps its filesystem and flash in memory
//! and implements [`Transport`]. It behaves like a board reached through the
//! file tool: listings return absolute paths, listing a file is rejected,
//! `mkdir` fails on existing directories and uploads need their parent
//! directory. Failures can be injected per operation for testing retries.

#![warn(missing_docs)]

use mpdev_core::entry::normalize_remote_path;
use mpdev_core::error::{Error, Result};
use mpdev_core::progress::percent_of;
use mpdev_core::{Endpoint, FirmwareOp, FirmwareVerb, ProgressSink, TransferJob, Transport};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Operations that can be observed and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Directory listing
    List,
    /// File delete
    DeleteFile,
    /// Directory delete
    DeleteDir,
    /// Directory creation
    MakeDir,
    /// File upload
    Put,
    /// Chip identification
    ChipId,
    /// Flash erase
    Erase,
    /// Flash write
    Write,
    /// Flash verify
    Verify,
}

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Endpoint the device answers on
    pub endpoint: Endpoint,
    /// Text printed by chip identification
    pub chip_id_output: String,
    /// Flash size in bytes
    pub flash_size: usize,
    /// Uploads create missing parent directories
    pub creates_parents: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Serial("dummy".to_string()),
            chip_id_output: "Chip is ESP32-S3 (QFN56) (revision v0.2)\n\
                             MAC: 7c:df:a1:00:11:22\n"
                .to_string(),
            flash_size: 4 * 1024 * 1024,
            creates_parents: false,
        }
    }
}

/// In-memory device
#[derive(Debug)]
pub struct DummyDevice {
    config: DummyConfig,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    flash: Vec<u8>,
    failures: HashMap<Op, u32>,
    log: Vec<(Op, String)>,
}

impl DummyDevice {
    /// Create an empty device
    pub fn new(config: DummyConfig) -> Self {
        let flash = vec![0xFF; config.flash_size];
        Self {
            config,
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            flash,
            failures: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// Create an empty device with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a device holding `files`; parent directories are created
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let mut device = Self::new_default();
        for (path, data) in files {
            device.insert_file(path, data);
        }
        device
    }

    /// Place a file, creating its parents
    pub fn insert_file(&mut self, path: &str, data: &[u8]) {
        let path = normalize_remote_path(path);
        for dir in ancestors(&path) {
            self.dirs.insert(dir);
        }
        self.files.insert(path, data.to_vec());
    }

    /// Contents of a file
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files
            .get(&normalize_remote_path(path))
            .map(Vec::as_slice)
    }

    /// Every file path, sorted
    pub fn file_paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Every directory path, sorted
    pub fn dir_paths(&self) -> Vec<String> {
        self.dirs.iter().cloned().collect()
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Make the next `times` calls of `op` fail with a transient error
    pub fn fail_next(&mut self, op: Op, times: u32) {
        self.failures.insert(op, times);
    }

    /// Number of calls of `op` so far
    pub fn calls(&self, op: Op) -> usize {
        self.log.iter().filter(|(o, _)| *o == op).count()
    }

    /// Every call with its argument, in order
    pub fn log(&self) -> &[(Op, String)] {
        &self.log
    }

    fn record(&mut self, op: Op, arg: &str) -> Result<()> {
        self.log.push((op, arg.to_string()));
        match self.failures.get_mut(&op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                log::debug!("Injected failure for {:?} {}", op, arg);
                Err(Error::Disconnected(format!("{:?} {}", op, arg)))
            }
            _ => Ok(()),
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((parent, _)) => self.dirs.contains(parent),
            None => true,
        }
    }

    fn rejected(subject: &str, message: &str) -> Error {
        Error::Remote {
            subject: subject.to_string(),
            message: message.to_string(),
        }
    }

    async fn write_flash(
        &mut self,
        image: &std::path::Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<String> {
        let data = tokio::fs::read(image).await?;
        if data.len() > self.flash.len() {
            return Err(Self::rejected("write_flash", "image larger than flash"));
        }
        let total = data.len() as u64;
        for (i, chunk) in data.chunks(4096).enumerate() {
            let offset = i * 4096;
            self.flash[offset..offset + chunk.len()].copy_from_slice(chunk);
            let done = (offset + chunk.len()) as u64;
            let percent = percent_of(done, total);
            progress.report(
                &format!("Writing at {:#010x}... ({} %)", offset, percent),
                Some(percent),
            );
        }
        Ok(format!("Wrote {} bytes at 0x00000000\nHash of data verified.\n", total))
    }
}

/// Every ancestor directory of `path`, shallow first
fn ancestors(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').collect();
    (1..parts.len()).map(|n| parts[..n].join("/")).collect()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

impl Transport for DummyDevice {
    fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    async fn list_entries(&mut self, path: &str) -> Result<Vec<String>> {
        let dir = normalize_remote_path(path);
        self.record(Op::List, &dir)?;

        if !dir.is_empty() && !self.dirs.contains(&dir) {
            let reason = if self.files.contains_key(&dir) {
                "not a directory"
            } else {
                "no such directory"
            };
            return Err(Error::Listing {
                path: dir,
                reason: reason.to_string(),
            });
        }

        let mut entries: Vec<String> = self
            .dirs
            .iter()
            .chain(self.files.keys())
            .filter(|p| parent_of(p) == dir)
            .map(|p| format!("/{}", p))
            .collect();
        entries.sort();
        Ok(entries)
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        let path = normalize_remote_path(path);
        self.record(Op::DeleteFile, &path)?;
        match self.files.remove(&path) {
            Some(_) => Ok(()),
            None => Err(Self::rejected(&path, "ENOENT")),
        }
    }

    async fn delete_dir(&mut self, path: &str) -> Result<()> {
        let path = normalize_remote_path(path);
        self.record(Op::DeleteDir, &path)?;
        if !self.dirs.remove(&path) {
            return Err(Self::rejected(&path, "ENOENT"));
        }
        let prefix = format!("{}/", path);
        self.dirs.retain(|d| !d.starts_with(&prefix));
        self.files.retain(|f, _| !f.starts_with(&prefix));
        Ok(())
    }

    async fn make_dir(&mut self, path: &str) -> Result<()> {
        let path = normalize_remote_path(path);
        self.record(Op::MakeDir, &path)?;
        if self.dirs.contains(&path) || self.files.contains_key(&path) {
            return Err(Self::rejected(&path, "EEXIST"));
        }
        if !self.parent_exists(&path) {
            return Err(Self::rejected(&path, "ENOENT"));
        }
        self.dirs.insert(path);
        Ok(())
    }

    async fn put_file(
        &mut self,
        job: &mut TransferJob,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let path = normalize_remote_path(&job.destination);
        self.record(Op::Put, &path)?;

        if self.config.creates_parents {
            for dir in ancestors(&path) {
                self.dirs.insert(dir);
            }
        } else if !self.parent_exists(&path) {
            return Err(Self::rejected(&path, "ENOENT"));
        }

        let data = tokio::fs::read(&job.source).await?;
        job.total_bytes = data.len() as u64;
        for chunk in data.chunks(1024) {
            job.advance(chunk.len() as u64);
            progress.report(&format!("Uploading {}", path), Some(job.percent()));
        }
        self.files.insert(path, data);
        Ok(())
    }

    async fn run_firmware_op(
        &mut self,
        op: &FirmwareOp,
        progress: &mut dyn ProgressSink,
    ) -> Result<String> {
        match &op.verb {
            FirmwareVerb::ChipId => {
                self.record(Op::ChipId, "")?;
                Ok(self.config.chip_id_output.clone())
            }
            FirmwareVerb::EraseFlash => {
                self.record(Op::Erase, "")?;
                self.flash.fill(0xFF);
                Ok("Chip erase completed successfully\n".to_string())
            }
            FirmwareVerb::WriteFlash { image, .. } => {
                self.record(Op::Write, &image.display().to_string())?;
                self.write_flash(image, progress).await
            }
            FirmwareVerb::VerifyFlash { image } => {
                self.record(Op::Verify, &image.display().to_string())?;
                let data = tokio::fs::read(image).await?;
                if self.flash.get(..data.len()) == Some(data.as_slice()) {
                    Ok("-- verify OK (digest matched)\n".to_string())
                } else {
                    Err(Self::rejected("verify_flash", "digest mismatch"))
                }
            }
        }
    }

    fn creates_parents(&self) -> bool {
        self.config.creates_parents
    }
}

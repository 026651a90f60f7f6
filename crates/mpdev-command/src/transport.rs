//! Command transport
//!
//! Every operation runs one external process and waits for it to exit. File
//! operations go through the file tool (`<tool> -p <port> <verb> <args>`),
//! firmware operations through the flash tool. Operations never overlap
//! because the serial line is exclusive.

use crate::process::{run_tool, ToolOutput};
use mpdev_core::error::{Error, Result};
use mpdev_core::{Endpoint, FirmwareOp, ProgressSink, TransferJob, Transport};

/// External programs used by the command transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// File tool (`ampy`)
    pub file_tool: String,
    /// Flash tool (`esptool`)
    pub flash_tool: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            file_tool: "ampy".to_string(),
            flash_tool: "esptool".to_string(),
        }
    }
}

/// Transport spawning one process per operation
#[derive(Debug, Clone)]
pub struct CommandTransport {
    endpoint: Endpoint,
    tools: ToolPaths,
}

impl CommandTransport {
    /// Create a transport for `endpoint`
    ///
    /// Nothing is opened here; each operation opens the line on its own.
    pub fn new(endpoint: Endpoint, tools: ToolPaths) -> Self {
        Self { endpoint, tools }
    }

    /// Configured tools
    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Arguments for a file tool invocation
    fn file_args(&self, verb: &str, args: &[String]) -> Result<Vec<String>> {
        let port = self
            .endpoint
            .serial_port()
            .ok_or(Error::Unsupported("file operations need a serial endpoint"))?;
        let mut out = vec!["-p".to_string(), port.to_string(), verb.to_string()];
        out.extend(args.iter().cloned());
        Ok(out)
    }

    async fn file_tool(&self, verb: &str, args: &[String]) -> Result<ToolOutput> {
        let args = self.file_args(verb, args)?;
        run_tool(&self.tools.file_tool, &args, &mut mpdev_core::NoProgress).await
    }
}

/// Remote path as the file tool expects it (absolute)
fn device_path(path: &str) -> String {
    format!("/{}", mpdev_core::entry::normalize_remote_path(path))
}

/// Split listing output into entries
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

impl Transport for CommandTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn list_entries(&mut self, path: &str) -> Result<Vec<String>> {
        let target = device_path(path);
        match self.file_tool("ls", &[target.clone()]).await {
            Ok(out) => Ok(parse_listing(&out.stdout)),
            // Listing a leaf is rejected by the device, not a tool failure
            Err(Error::CommandFailed { diagnostic, .. }) if !path.is_empty() => {
                Err(Error::Listing {
                    path: target,
                    reason: diagnostic,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        self.file_tool("rm", &[device_path(path)]).await.map(|_| ())
    }

    async fn delete_dir(&mut self, path: &str) -> Result<()> {
        self.file_tool("rmdir", &[device_path(path)]).await.map(|_| ())
    }

    async fn make_dir(&mut self, path: &str) -> Result<()> {
        self.file_tool("mkdir", &[device_path(path)]).await.map(|_| ())
    }

    async fn put_file(
        &mut self,
        job: &mut TransferJob,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let source = job.source.display().to_string();
        let destination = device_path(&job.destination);
        progress.report(&format!("Uploading {}", job.destination), Some(0));

        self.file_tool("put", &[source, destination]).await?;

        job.advance(job.total_bytes);
        progress.report(&format!("Uploaded {}", job.destination), Some(100));
        Ok(())
    }

    async fn run_firmware_op(
        &mut self,
        op: &FirmwareOp,
        progress: &mut dyn ProgressSink,
    ) -> Result<String> {
        let args = op.args();
        log::info!("{} {}", self.tools.flash_tool, args.join(" "));
        let out = run_tool(&self.tools.flash_tool, &args, progress).await?;
        Ok(out.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mpdev_core::{ErrorKind, NoProgress};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write an executable stand-in for the file tool that logs its arguments
    fn fake_tool(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-ampy");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> {}\n{}\n",
            dir.join("calls.log").display(),
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn transport(tool: String) -> CommandTransport {
        CommandTransport::new(
            Endpoint::Serial("/dev/ttyUSB0".into()),
            ToolPaths {
                file_tool: tool,
                flash_tool: "esptool".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_list_uses_port_and_verb() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "printf '/boot.py\\n/lib\\n\\n'");
        let mut t = transport(tool);
        let entries = t.list_entries("").await.unwrap();
        assert_eq!(entries, vec!["/boot.py", "/lib"]);
        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert_eq!(calls.trim(), "-p /dev/ttyUSB0 ls /");
    }

    #[tokio::test]
    async fn test_failed_sub_listing_is_device_state() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'OSError: 20' >&2; exit 1");
        let mut t = transport(tool);
        let err = t.list_entries("README").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceState);
    }

    #[tokio::test]
    async fn test_put_marks_job_sent() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "exit 0");
        let mut t = transport(tool);
        let mut job = TransferJob::new(dir.path().join("main.py"), "lib/main.py", 42);
        t.put_file(&mut job, &mut NoProgress).await.unwrap();
        assert!(job.is_sent());
        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let expected = format!("put {} /lib/main.py", dir.path().join("main.py").display());
        assert!(calls.trim().ends_with(&expected));
    }

    #[tokio::test]
    async fn test_file_ops_need_serial_endpoint() {
        let mut t = CommandTransport::new(
            Endpoint::parse("192.168.4.1:8266").unwrap(),
            ToolPaths::default(),
        );
        let err = t.delete_file("a.py").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}

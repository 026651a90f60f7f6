//! Spawning external tools and capturing their output

use mpdev_core::error::{Error, Result};
use mpdev_core::ProgressSink;
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Percentage marker printed by the flash tool, e.g. `Writing at 0x00010000... (12 %)`
static PERCENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d{1,3})\s*%\s*\)").expect("valid percent regex"));

/// Captured output of a finished tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Extracts `(NN %)` markers from a byte stream
///
/// Tools redraw their progress line with `\r`, so both `\r` and `\n` end a
/// line. Bytes after the last line break are kept until more data arrives.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: Vec<u8>,
}

impl ProgressParser {
    /// Feed a chunk and return `(line, percent)` for every complete line
    /// carrying a marker
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<(String, u8)> {
        self.pending.extend_from_slice(chunk);
        let mut found = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(hit) = parse_line(&line[..line.len() - 1]) {
                found.push(hit);
            }
        }
        found
    }

    /// Flush whatever is left once the stream ended
    pub fn finish(&mut self) -> Option<(String, u8)> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<(String, u8)> {
    let text = String::from_utf8_lossy(line);
    let caps = PERCENT_MARKER.captures(&text)?;
    let percent: u8 = caps.get(1)?.as_str().parse().ok()?;
    Some((text.trim().to_string(), percent.min(100)))
}

/// Run `program` with `args` until it exits
///
/// Standard output and error are drained concurrently so neither pipe can
/// fill up and block the tool. Percent markers are forwarded to `progress`.
/// A non-zero exit is reported as [`Error::CommandFailed`] carrying the error
/// stream (or standard output when the error stream is empty).
pub async fn run_tool(
    program: &str,
    args: &[String],
    progress: &mut dyn ProgressSink,
) -> Result<ToolOutput> {
    let command_line = format!("{} {}", program, args.join(" "));
    log::debug!("Running {}", command_line);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            program: program.to_string(),
            source,
        })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Protocol(format!("{}: stdout not captured", program)))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Protocol(format!("{}: stderr not captured", program)))?;

    let mut out_bytes = Vec::new();
    let mut err_bytes = Vec::new();
    let mut out_buf = [0u8; 1024];
    let mut err_buf = [0u8; 1024];
    let mut out_open = true;
    let mut err_open = true;
    let mut parser = ProgressParser::default();

    while out_open || err_open {
        tokio::select! {
            n = stdout.read(&mut out_buf), if out_open => {
                let n = n?;
                if n == 0 {
                    out_open = false;
                } else {
                    let chunk = &out_buf[..n];
                    log::trace!("{}: {}", program, String::from_utf8_lossy(chunk).trim_end());
                    out_bytes.extend_from_slice(chunk);
                    for (line, percent) in parser.feed(chunk) {
                        progress.report(&line, Some(percent));
                    }
                }
            }
            n = stderr.read(&mut err_buf), if err_open => {
                let n = n?;
                if n == 0 {
                    err_open = false;
                } else {
                    let chunk = &err_buf[..n];
                    log::debug!("{} stderr: {}", program, String::from_utf8_lossy(chunk).trim_end());
                    err_bytes.extend_from_slice(chunk);
                }
            }
        }
    }

    if let Some((line, percent)) = parser.finish() {
        progress.report(&line, Some(percent));
    }

    let status = child.wait().await?;
    let output = ToolOutput {
        stdout: String::from_utf8_lossy(&out_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&err_bytes).into_owned(),
    };

    if !status.success() {
        let diagnostic = if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        };
        return Err(Error::CommandFailed {
            command: command_line,
            status: status.to_string(),
            diagnostic,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpdev_core::{ErrorKind, NoProgress};

    #[test]
    fn test_marker_split_across_chunks() {
        let mut parser = ProgressParser::default();
        assert!(parser.feed(b"Writing at 0x00001000... (1").is_empty());
        let hits = parser.feed(b"2 %)\rWriting at 0x00002000... (25 %)\r");
        assert_eq!(
            hits.iter().map(|(_, p)| *p).collect::<Vec<_>>(),
            vec![12, 25]
        );
        assert_eq!(hits[0].0, "Writing at 0x00001000... (12 %)");
    }

    #[test]
    fn test_lines_without_marker_ignored() {
        let mut parser = ProgressParser::default();
        assert!(parser.feed(b"Chip is ESP32-S3\nMAC: 7c:df:a1:00:11:22\n").is_empty());
        parser.feed(b"Hash of data verified. (100%)");
        assert_eq!(parser.finish().map(|(_, p)| p), Some(100));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let args = vec!["-c".to_string(), "echo 'no device' >&2; exit 2".to_string()];
        let err = run_tool("sh", &args, &mut NoProgress).await.unwrap_err();
        match &err {
            Error::CommandFailed { diagnostic, .. } => assert_eq!(diagnostic, "no device"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_progress_reported_from_stdout() {
        let args = vec![
            "-c".to_string(),
            "printf 'Writing (10 %%)\\rWriting (50 %%)\\rWriting (100 %%)\\n'".to_string(),
        ];
        let mut seen = Vec::new();
        let mut sink = |_: &str, pct: Option<u8>| seen.push(pct);
        run_tool("sh", &args, &mut sink).await.unwrap();
        assert_eq!(seen, vec![Some(10), Some(50), Some(100)]);
    }

    #[tokio::test]
    async fn test_missing_program_is_fatal() {
        let err = run_tool("mpdev-no-such-tool", &[], &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}

//! Control commands sent to a session

use crate::error::SessionError;
use core::fmt;

/// A control command for an open session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop the running program (Ctrl-C)
    Interrupt,
    /// Soft reset the interpreter (Ctrl-D)
    SoftReset,
    /// Reboot the board
    HardReset,
    /// Print the root directory listing
    ListFiles,
    /// Print free heap memory
    FreeMemory,
    /// Print the interpreter version
    Version,
    /// Send raw text
    SendText(String),
    /// Close the session
    Close,
}

/// Names accepted by [`ControlCommand::parse`], for completion and help
pub const COMMAND_NAMES: &[(&str, &str)] = &[
    (":interrupt", "stop the running program (Ctrl-C)"),
    (":soft-reset", "soft reset the interpreter (Ctrl-D)"),
    (":hard-reset", "reboot the board"),
    (":ls", "list files on the device"),
    (":mem", "show free memory"),
    (":version", "show the interpreter version"),
    (":send <text>", "send text verbatim (\\r and \\n escapes allowed)"),
    (":close", "close the session"),
];

impl ControlCommand {
    /// Bytes written to the session, `None` for [`ControlCommand::Close`]
    pub fn payload(&self) -> Option<Vec<u8>> {
        let text = match self {
            Self::Interrupt => "\x03",
            Self::SoftReset => "\x04",
            Self::HardReset => "import machine\r\nmachine.reset()\r\n",
            Self::ListFiles => "import os\r\nos.listdir()\r\n",
            Self::FreeMemory => "import gc\r\nprint(f\"Free memory: {gc.mem_free()} bytes\")\r\n",
            Self::Version => "import sys\r\nsys.version\r\n",
            Self::SendText(text) => return Some(text.as_bytes().to_vec()),
            Self::Close => return None,
        };
        Some(text.as_bytes().to_vec())
    }

    /// Parse a `:command` line from the attach loop
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };
        match name {
            ":interrupt" | ":int" => Ok(Self::Interrupt),
            ":soft-reset" => Ok(Self::SoftReset),
            ":hard-reset" | ":reset" => Ok(Self::HardReset),
            ":ls" => Ok(Self::ListFiles),
            ":mem" => Ok(Self::FreeMemory),
            ":version" => Ok(Self::Version),
            ":send" if !rest.is_empty() => Ok(Self::SendText(unescape(rest))),
            ":close" | ":q" | ":quit" => Ok(Self::Close),
            _ => Err(SessionError::UnknownCommand(line.to_string())),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupt"),
            Self::SoftReset => write!(f, "soft reset"),
            Self::HardReset => write!(f, "hard reset"),
            Self::ListFiles => write!(f, "list files"),
            Self::FreeMemory => write!(f, "free memory"),
            Self::Version => write!(f, "version"),
            Self::SendText(text) => write!(f, "send {:?}", text),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Expand `\r`, `\n` and `\\` typed at the prompt
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

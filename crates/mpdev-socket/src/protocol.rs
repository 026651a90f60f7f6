//! Wire format of the device's upload socket
//!
//! Outbound control frames are JSON text messages tagged by `action`; file
//! contents travel as raw binary messages between `start_upload` and
//! `end_upload`. Inbound text messages are either JSON replies (`list`) or
//! plain status lines:
//!
//! ```text
//! progress:512/2048
//! [Remote]✅ main.py saved
//! [Remote]❌ write failed
//! ⚠️ low memory
//! ```

use mpdev_core::progress::percent_of;
use serde::{Deserialize, Serialize};

/// Control frame sent to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Announce a file; binary chunks follow
    StartUpload {
        /// Destination path, `/`-separated
        filename: String,
        /// Total bytes that will follow
        filesize: u64,
    },
    /// All chunks of `filename` were sent
    EndUpload {
        /// Destination path
        filename: String,
    },
    /// Ask for the device's file list
    List,
    /// Delete one path
    Delete {
        /// Path to delete
        filename: String,
    },
}

impl ControlFrame {
    /// Serialize to the JSON text sent on the wire
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Reply to [`ControlFrame::List`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListReply {
    /// Always `"list"`
    pub action: String,
    /// Every file on the device
    #[serde(default)]
    pub files: Vec<String>,
}

impl ListReply {
    /// Parse a text frame, `None` if it is not a list reply
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<ListReply>(text)
            .ok()
            .filter(|r| r.action == "list")
    }
}

/// Inbound status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFrame {
    /// Bytes the device has stored so far
    Progress {
        /// Bytes done
        done: u64,
        /// Bytes expected
        total: u64,
    },
    /// Terminal success
    Done(String),
    /// Terminal failure, including warnings
    Failed(String),
    /// Anything else; logged and ignored
    Other(String),
}

impl StatusFrame {
    /// Classify a text frame
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();

        if let Some(rest) = trimmed.strip_prefix("progress:") {
            if let Some((done, total)) = rest.trim().split_once('/') {
                if let (Ok(done), Ok(total)) = (done.trim().parse(), total.trim().parse()) {
                    return StatusFrame::Progress { done, total };
                }
            }
            return StatusFrame::Other(trimmed.to_string());
        }

        let body = trimmed.strip_prefix("[Remote]").unwrap_or(trimmed).trim_start();
        if body.starts_with('✅') {
            StatusFrame::Done(trimmed.to_string())
        } else if body.starts_with('❌') || body.starts_with('⚠') {
            StatusFrame::Failed(trimmed.to_string())
        } else {
            StatusFrame::Other(trimmed.to_string())
        }
    }

    /// Percentage for a progress frame
    pub fn percent(&self) -> Option<u8> {
        match self {
            StatusFrame::Progress { done, total } => Some(percent_of(*done, *total)),
            _ => None,
        }
    }

    /// True for frames that end an exchange
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusFrame::Done(_) | StatusFrame::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frames_on_the_wire() {
        let start = ControlFrame::StartUpload {
            filename: "lib/a.py".into(),
            filesize: 2048,
        };
        assert_eq!(
            start.to_json().unwrap(),
            r#"{"action":"start_upload","filename":"lib/a.py","filesize":2048}"#
        );
        assert_eq!(ControlFrame::List.to_json().unwrap(), r#"{"action":"list"}"#);
        let end = ControlFrame::EndUpload {
            filename: "a.py".into(),
        };
        assert_eq!(
            end.to_json().unwrap(),
            r#"{"action":"end_upload","filename":"a.py"}"#
        );
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(StatusFrame::parse("progress:50/200").percent(), Some(25));
        assert_eq!(
            StatusFrame::parse("progress: 200 / 200"),
            StatusFrame::Progress {
                done: 200,
                total: 200
            }
        );
        assert!(matches!(
            StatusFrame::parse("[Remote]✅ saved"),
            StatusFrame::Done(_)
        ));
        assert!(matches!(
            StatusFrame::parse("[Remote]❌ disk full"),
            StatusFrame::Failed(_)
        ));
        assert!(matches!(
            StatusFrame::parse("⚠️ unexpected chunk"),
            StatusFrame::Failed(_)
        ));
        assert!(matches!(StatusFrame::parse("✅ deleted a.py"), StatusFrame::Done(_)));
        assert!(matches!(StatusFrame::parse("hello"), StatusFrame::Other(_)));
        assert!(matches!(
            StatusFrame::parse("progress:abc"),
            StatusFrame::Other(_)
        ));
    }

    #[test]
    fn test_list_reply() {
        let reply = ListReply::parse(r#"{"action":"list","files":["boot.py","lib/x.py"]}"#).unwrap();
        assert_eq!(reply.files, vec!["boot.py", "lib/x.py"]);
        assert!(ListReply::parse("[Remote]✅").is_none());
        assert!(ListReply::parse(r#"{"action":"other"}"#).is_none());
    }
}

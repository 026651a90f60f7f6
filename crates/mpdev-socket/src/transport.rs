//! Socket transport
//!
//! One websocket connection carries a whole batch: listing, deletes and every
//! upload. Exactly one file is in flight at a time. An upload is complete
//! only when the device answers with its terminal confirmation, not when the
//! last chunk left the local buffers.

use crate::error::SocketError;
use crate::protocol::{ControlFrame, ListReply, StatusFrame};
use futures_util::{SinkExt, StreamExt};
use mpdev_core::entry::normalize_remote_path;
use mpdev_core::error::{Error, Result};
use mpdev_core::progress::percent_of;
use mpdev_core::{Endpoint, FirmwareOp, ProgressSink, TransferJob, Transport};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Bytes per binary frame
    pub chunk_size: usize,
    /// Bound on opening the connection
    pub connect_timeout: Duration,
    /// Websocket path on the device
    pub path: String,
    /// Bound on waiting for any single reply
    pub response_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            connect_timeout: Duration::from_secs(20),
            path: "/ws".to_string(),
            response_timeout: Duration::from_secs(30),
        }
    }
}

/// Websocket URL for an endpoint
///
/// `host:port` becomes `ws://host:port<path>`; `ws://` and `wss://` URLs are
/// used as given.
pub fn socket_url(endpoint: &Endpoint, path: &str) -> std::result::Result<String, SocketError> {
    match endpoint {
        Endpoint::Socket { host, port } => {
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
            Ok(format!("ws://{}:{}{}", host, port, path))
        }
        Endpoint::Url { scheme, .. } if scheme == "ws" || scheme == "wss" => {
            Ok(endpoint.to_string())
        }
        other => Err(SocketError::NotASocket(other.to_string())),
    }
}

/// Transport over one persistent websocket
pub struct SocketTransport {
    endpoint: Endpoint,
    url: String,
    config: SocketConfig,
    ws: Option<WsStream>,
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("url", &self.url)
            .field("open", &self.ws.is_some())
            .finish()
    }
}

impl SocketTransport {
    /// Open the connection
    ///
    /// Fails with [`SocketError::Timeout`] if the handshake does not finish
    /// within `config.connect_timeout`. Callers must not retry this under the
    /// per-file retry policy.
    pub async fn connect(
        endpoint: Endpoint,
        config: SocketConfig,
    ) -> std::result::Result<Self, SocketError> {
        let url = socket_url(&endpoint, &config.path)?;
        let ws = open(&url, config.connect_timeout).await?;
        Ok(Self {
            endpoint,
            url,
            config,
            ws: Some(ws),
        })
    }

    /// URL of the connection
    pub fn url(&self) -> &str {
        &self.url
    }

    /// True while the connection is up
    pub fn is_open(&self) -> bool {
        self.ws.is_some()
    }

    /// Every file the device reports, as one flat list
    pub async fn list_files(&mut self) -> Result<Vec<String>> {
        self.send_control(&ControlFrame::List).await?;
        loop {
            let text = self.next_text("list").await?;
            if let Some(reply) = ListReply::parse(&text) {
                return Ok(reply.files);
            }
            log::debug!("Ignoring frame while waiting for list: {}", text);
        }
    }

    /// Reconnect after the connection dropped
    async fn ensure_open(&mut self) -> Result<()> {
        if self.ws.is_none() {
            log::info!("Reconnecting to {}", self.url);
            self.ws = Some(open(&self.url, self.config.connect_timeout).await?);
        }
        Ok(())
    }

    async fn send(&mut self, message: Message, what: &str) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| Error::Disconnected(what.to_string()))?;
        let result = ws.send(message).await;
        if let Err(e) = result {
            self.ws = None;
            return Err(Error::Disconnected(format!("{} ({})", what, e)));
        }
        Ok(())
    }

    async fn send_control(&mut self, frame: &ControlFrame) -> Result<()> {
        let json = frame
            .to_json()
            .map_err(|e| Error::Protocol(format!("encoding control frame: {}", e)))?;
        log::trace!("-> {}", json);
        self.send(Message::text(json), "control frame").await
    }

    /// Next text frame, skipping pings and binary frames
    async fn next_text(&mut self, what: &str) -> Result<String> {
        let timeout = self.config.response_timeout;
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| Error::Disconnected(what.to_string()))?;

        loop {
            let waited = tokio::time::timeout(timeout, ws.next()).await;
            let next = match waited {
                Ok(next) => next,
                Err(_) => {
                    // A late reply would be taken for the next request's answer
                    self.ws = None;
                    return Err(Error::Protocol(format!(
                        "no reply to {} within {:?}",
                        what, timeout
                    )));
                }
            };
            match next {
                Some(Ok(Message::Text(text))) => {
                    log::trace!("<- {}", text.as_str());
                    return Ok(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.ws = None;
                    return Err(Error::Disconnected(what.to_string()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.ws = None;
                    return Err(Error::Disconnected(format!("{} ({})", what, e)));
                }
            }
        }
    }

    /// Wait for the terminal status of `subject`, forwarding progress
    async fn await_confirmation(
        &mut self,
        subject: &str,
        progress: &mut dyn ProgressSink,
    ) -> Result<String> {
        loop {
            let text = self.next_text(subject).await?;
            match StatusFrame::parse(&text) {
                StatusFrame::Progress { done, total } => {
                    progress.report(
                        &format!("{} {}/{} bytes stored", subject, done, total),
                        Some(percent_of(done, total)),
                    );
                }
                StatusFrame::Done(message) => return Ok(message),
                StatusFrame::Failed(message) => {
                    return Err(Error::Remote {
                        subject: subject.to_string(),
                        message,
                    })
                }
                StatusFrame::Other(message) => log::debug!("Device said: {}", message),
            }
        }
    }

    async fn delete(&mut self, path: &str) -> Result<()> {
        let filename = normalize_remote_path(path);
        self.send_control(&ControlFrame::Delete {
            filename: filename.clone(),
        })
        .await?;
        self.await_confirmation(&filename, &mut mpdev_core::NoProgress)
            .await
            .map(|_| ())
    }
}

async fn open(url: &str, connect_timeout: Duration) -> std::result::Result<WsStream, SocketError> {
    log::debug!("Connecting to {}", url);
    match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((ws, _response))) => {
            log::info!("Connected to {}", url);
            Ok(ws)
        }
        Ok(Err(source)) => Err(SocketError::Handshake {
            url: url.to_string(),
            source,
        }),
        Err(_) => Err(SocketError::Timeout {
            url: url.to_string(),
            secs: connect_timeout.as_secs(),
        }),
    }
}

impl Transport for SocketTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn list_entries(&mut self, path: &str) -> Result<Vec<String>> {
        self.ensure_open().await?;
        let files = self.list_files().await?;
        let dir = normalize_remote_path(path);
        if dir.is_empty() {
            return Ok(files);
        }
        let prefix = format!("{}/", dir);
        let below: Vec<String> = files
            .into_iter()
            .filter(|f| normalize_remote_path(f).starts_with(&prefix))
            .collect();
        if below.is_empty() {
            return Err(Error::Listing {
                path: dir,
                reason: "no such directory".to_string(),
            });
        }
        Ok(below)
    }

    async fn delete_file(&mut self, path: &str) -> Result<()> {
        self.ensure_open().await?;
        self.delete(path).await
    }

    async fn delete_dir(&mut self, path: &str) -> Result<()> {
        self.ensure_open().await?;
        self.delete(path).await
    }

    async fn make_dir(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn put_file(
        &mut self,
        job: &mut TransferJob,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        self.ensure_open().await?;
        let data = tokio::fs::read(&job.source).await?;
        let filename = normalize_remote_path(&job.destination);
        job.total_bytes = data.len() as u64;

        self.send_control(&ControlFrame::StartUpload {
            filename: filename.clone(),
            filesize: job.total_bytes,
        })
        .await?;

        let chunk_size = self.config.chunk_size.max(1);
        for chunk in data.chunks(chunk_size) {
            self.send(Message::binary(chunk.to_vec()), &filename).await?;
            job.advance(chunk.len() as u64);
            progress.report(
                &format!("{} {}/{} bytes sent", filename, job.sent_bytes(), job.total_bytes),
                None,
            );
        }

        self.send_control(&ControlFrame::EndUpload {
            filename: filename.clone(),
        })
        .await?;

        let message = self.await_confirmation(&filename, progress).await?;
        log::info!("{}", message);
        Ok(())
    }

    async fn run_firmware_op(
        &mut self,
        _op: &FirmwareOp,
        _progress: &mut dyn ProgressSink,
    ) -> Result<String> {
        Err(Error::Unsupported("firmware operations over the socket transport"))
    }

    fn creates_parents(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close(None).await {
                log::debug!("Closing {}: {}", self.url, e);
            }
        }
        Ok(())
    }
}

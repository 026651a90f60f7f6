//! Session registry
//!
//! At most one live session per [`Endpoint`]. A session moves through
//!
//! ```text
//! Absent → Starting → Active → Closing → Absent
//! ```
//!
//! Opening an endpoint that already has a session returns the existing
//! handle. Each session gets an observer task that removes the registry entry
//! when the process exits on its own; an explicit close kills the process and
//! removes the entry once the process is reaped.

use crate::command::ControlCommand;
use crate::error::{Result, SessionError};
use crate::launcher::SessionLauncher;
use mpdev_core::Endpoint;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex};

/// Lifecycle state of a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process being launched
    Starting,
    /// Process running and observed
    Active,
    /// Close requested, waiting for the process to go away
    Closing,
}

/// Reference to a session returned by [`SessionManager::open`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Endpoint the session owns
    pub endpoint: Endpoint,
    /// Unique id of the process behind the session
    pub id: u64,
    /// When the process was launched
    pub opened_at: Instant,
    /// True if an already open session was returned
    pub reused: bool,
}

/// Which session a command is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The only active session
    Auto,
    /// A specific endpoint
    Endpoint(Endpoint),
}

struct Slot {
    id: u64,
    opened_at: Instant,
    state: SessionState,
    stdin: Option<SharedStdin>,
    shutdown: Option<oneshot::Sender<()>>,
    reaped: Option<oneshot::Receiver<()>>,
}

type SharedStdin = Arc<Mutex<ChildStdin>>;
type Registry = Arc<Mutex<HashMap<Endpoint, Slot>>>;

/// Owns every interactive session, keyed by endpoint
pub struct SessionManager<L: SessionLauncher> {
    launcher: L,
    sessions: Registry,
    next_id: AtomicU64,
}

impl<L: SessionLauncher> SessionManager<L> {
    /// Create an empty manager
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a session on `endpoint`, or return the one already open
    ///
    /// Must be called from within a tokio runtime; the observer task is
    /// spawned on it.
    pub async fn open(&self, endpoint: &Endpoint, reset: bool) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;

        if let Some(slot) = sessions.get(endpoint) {
            log::info!("Session on {} already open, reusing it", endpoint);
            return Ok(SessionHandle {
                endpoint: endpoint.clone(),
                id: slot.id,
                opened_at: slot.opened_at,
                reused: true,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let opened_at = Instant::now();
        log::debug!("Session {} on {}: {:?}", id, endpoint, SessionState::Starting);
        sessions.insert(
            endpoint.clone(),
            Slot {
                id,
                opened_at,
                state: SessionState::Starting,
                stdin: None,
                shutdown: None,
                reaped: None,
            },
        );

        let mut child = match self.launcher.launch(endpoint, reset) {
            Ok(child) => child,
            Err(source) => {
                sessions.remove(endpoint);
                return Err(SessionError::Launch {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (reaped_tx, reaped_rx) = oneshot::channel();
        let stdin = child.stdin.take().map(|s| Arc::new(Mutex::new(s)));
        tokio::spawn(observe(
            child,
            endpoint.clone(),
            id,
            shutdown_rx,
            reaped_tx,
            Arc::clone(&self.sessions),
        ));

        if let Some(slot) = sessions.get_mut(endpoint) {
            slot.stdin = stdin;
            slot.shutdown = Some(shutdown_tx);
            slot.reaped = Some(reaped_rx);
            slot.state = SessionState::Active;
        }
        log::info!("Opened session {} on {}", id, endpoint);

        Ok(SessionHandle {
            endpoint: endpoint.clone(),
            id,
            opened_at,
            reused: false,
        })
    }

    /// Close the session on `endpoint` and wait until its process is gone
    pub async fn close(&self, endpoint: &Endpoint) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let slot = sessions
            .get_mut(endpoint)
            .ok_or_else(|| SessionError::NotFound(endpoint.to_string()))?;

        slot.state = SessionState::Closing;
        drop(slot.stdin.take());
        if let Some(shutdown) = slot.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(reaped) = slot.reaped.take() {
            // The observer signals before it needs the registry lock
            let _ = reaped.await;
        }

        sessions.remove(endpoint);
        log::info!("Closed session on {}", endpoint);
        Ok(())
    }

    /// Close every session
    pub async fn close_all(&self) {
        for endpoint in self.active_endpoints().await {
            if let Err(e) = self.close(&endpoint).await {
                log::debug!("{}", e);
            }
        }
    }

    /// Pick the endpoint a command is for
    pub async fn resolve(&self, target: &Target) -> Result<Endpoint> {
        let sessions = self.sessions.lock().await;
        match target {
            Target::Endpoint(endpoint) if sessions.contains_key(endpoint) => Ok(endpoint.clone()),
            Target::Endpoint(endpoint) => Err(SessionError::NotFound(endpoint.to_string())),
            Target::Auto => {
                let mut open: Vec<&Endpoint> = sessions.keys().collect();
                open.sort();
                match open.as_slice() {
                    [] => Err(SessionError::NoActiveSession),
                    [only] => Ok((*only).clone()),
                    many => Err(SessionError::Ambiguous(
                        many.iter().map(|e| e.to_string()).collect(),
                    )),
                }
            }
        }
    }

    /// Deliver `command` to the targeted session
    ///
    /// Returns the endpoint the command went to.
    pub async fn send(&self, target: &Target, command: &ControlCommand) -> Result<Endpoint> {
        let endpoint = self.resolve(target).await?;

        let Some(payload) = command.payload() else {
            self.close(&endpoint).await?;
            return Ok(endpoint);
        };

        // Writes can block on a full pipe; never hold the registry across them
        let shared = {
            let sessions = self.sessions.lock().await;
            let slot = sessions
                .get(&endpoint)
                .ok_or_else(|| SessionError::NotFound(endpoint.to_string()))?;
            slot.stdin
                .clone()
                .ok_or_else(|| SessionError::NoInput(endpoint.to_string()))?
        };
        let mut stdin = shared.lock().await;

        let write_err = |source| SessionError::Write {
            endpoint: endpoint.to_string(),
            source,
        };
        stdin.write_all(&payload).await.map_err(write_err)?;
        stdin.flush().await.map_err(write_err)?;
        log::debug!("Sent {} to {}", command, endpoint);
        Ok(endpoint)
    }

    /// Endpoints with a session, sorted
    pub async fn active_endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.sessions.lock().await.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// State of the session on `endpoint`, `None` if absent
    pub async fn state(&self, endpoint: &Endpoint) -> Option<SessionState> {
        self.sessions.lock().await.get(endpoint).map(|s| s.state)
    }

    /// True if `endpoint` has a session
    pub async fn is_open(&self, endpoint: &Endpoint) -> bool {
        self.sessions.lock().await.contains_key(endpoint)
    }
}

/// Wait for the session process to end, then release its registry entry
async fn observe(
    mut child: Child,
    endpoint: Endpoint,
    id: u64,
    mut shutdown: oneshot::Receiver<()>,
    reaped: oneshot::Sender<()>,
    sessions: Registry,
) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => log::info!("Session on {} ended ({})", endpoint, status),
            Err(e) => log::warn!("Lost track of session on {}: {}", endpoint, e),
        },
        _ = &mut shutdown => {
            if let Err(e) = child.kill().await {
                log::debug!("Killing session on {}: {}", endpoint, e);
            }
        }
    }
    let _ = reaped.send(());

    let mut sessions = sessions.lock().await;
    if sessions.get(&endpoint).is_some_and(|slot| slot.id == id) {
        sessions.remove(&endpoint);
        log::debug!("Released session {} on {}", id, endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::process::Stdio;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::process::Command;

    /// Spawns a shell script per session and counts launches
    #[derive(Default)]
    struct ShellLauncher {
        script: String,
        launches: Arc<AtomicUsize>,
    }

    impl ShellLauncher {
        fn new(script: &str) -> Self {
            Self {
                script: script.to_string(),
                ..Default::default()
            }
        }
    }

    impl SessionLauncher for ShellLauncher {
        fn launch(&self, endpoint: &Endpoint, _reset: bool) -> std::io::Result<Child> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Command::new("sh")
                .arg("-c")
                .arg(&self.script)
                .arg("sh")
                .arg(endpoint.to_string())
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .kill_on_drop(true)
                .spawn()
        }
    }

    struct FailingLauncher;

    impl SessionLauncher for FailingLauncher {
        fn launch(&self, _endpoint: &Endpoint, _reset: bool) -> std::io::Result<Child> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such program",
            ))
        }
    }

    fn ep(s: &str) -> Endpoint {
        Endpoint::parse(s).unwrap()
    }

    async fn wait_until_closed<L: SessionLauncher>(m: &SessionManager<L>, e: &Endpoint) {
        for _ in 0..100 {
            if !m.is_open(e).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session on {} never closed", e);
    }

    #[tokio::test]
    async fn test_second_open_reuses_session() {
        let launcher = ShellLauncher::new("cat");
        let launches = Arc::clone(&launcher.launches);
        let manager = SessionManager::new(launcher);
        let port = ep("/dev/ttyUSB0");

        let first = manager.open(&port, false).await.unwrap();
        let second = manager.open(&port, true).await.unwrap();
        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.id, second.id);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_endpoints().await, vec![port.clone()]);
        assert_eq!(manager.state(&port).await, Some(SessionState::Active));

        manager.close_all().await;
    }

    #[tokio::test]
    async fn test_close_then_reopen() {
        let manager = SessionManager::new(ShellLauncher::new("cat"));
        let port = ep("/dev/ttyUSB0");

        let first = manager.open(&port, false).await.unwrap();
        manager.close(&port).await.unwrap();
        assert!(!manager.is_open(&port).await);
        assert!(matches!(
            manager.close(&port).await,
            Err(SessionError::NotFound(_))
        ));

        let second = manager.open(&port, false).await.unwrap();
        assert_ne!(first.id, second.id);
        manager.close(&port).await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_releases_endpoint() {
        let manager = SessionManager::new(ShellLauncher::new("exit 0"));
        let port = ep("/dev/ttyUSB1");
        manager.open(&port, false).await.unwrap();
        wait_until_closed(&manager, &port).await;
        assert_eq!(manager.state(&port).await, None);
    }

    #[tokio::test]
    async fn test_command_target_resolution() {
        let manager = SessionManager::new(ShellLauncher::new("cat"));
        assert!(matches!(
            manager.send(&Target::Auto, &ControlCommand::SoftReset).await,
            Err(SessionError::NoActiveSession)
        ));

        let a = ep("/dev/ttyUSB0");
        let b = ep("192.168.4.1:8266");
        manager.open(&a, false).await.unwrap();
        let sent = manager
            .send(&Target::Auto, &ControlCommand::Interrupt)
            .await
            .unwrap();
        assert_eq!(sent, a);

        manager.open(&b, false).await.unwrap();
        assert!(matches!(
            manager.send(&Target::Auto, &ControlCommand::Interrupt).await,
            Err(SessionError::Ambiguous(list)) if list.len() == 2
        ));
        let sent = manager
            .send(&Target::Endpoint(b.clone()), &ControlCommand::Version)
            .await
            .unwrap();
        assert_eq!(sent, b);

        manager
            .send(&Target::Endpoint(b.clone()), &ControlCommand::Close)
            .await
            .unwrap();
        assert_eq!(manager.active_endpoints().await, vec![a]);
        manager.close_all().await;
        assert!(manager.active_endpoints().await.is_empty());
    }

    #[tokio::test]
    async fn test_text_reaches_process() {
        let dir = tempfile::tempdir().unwrap();
        let out: PathBuf = dir.path().join("session.out");
        let script = format!("cat > '{}'", out.display());
        let manager = SessionManager::new(ShellLauncher::new(&script));
        let port = ep("COM3");
        manager.open(&port, false).await.unwrap();

        manager
            .send(&Target::Auto, &ControlCommand::SendText("print(1)\r\n".into()))
            .await
            .unwrap();

        let mut seen = String::new();
        for _ in 0..100 {
            seen = std::fs::read_to_string(&out).unwrap_or_default();
            if !seen.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(seen, "print(1)\r\n");
        manager.close(&port).await.unwrap();
    }

    #[tokio::test]
    async fn test_blocked_write_leaves_registry_usable() {
        let manager = Arc::new(SessionManager::new(ShellLauncher::new("exec sleep 30")));
        let stuck = ep("/dev/ttyUSB0");
        let other = ep("/dev/ttyUSB1");
        manager.open(&stuck, false).await.unwrap();

        // Far more than a pipe buffer; the process never reads its input
        let flood = ControlCommand::SendText("x".repeat(4 << 20));
        let writer = {
            let manager = Arc::clone(&manager);
            let target = Target::Endpoint(stuck.clone());
            tokio::spawn(async move { manager.send(&target, &flood).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!writer.is_finished());

        let others = async {
            manager.open(&other, false).await.unwrap();
            let resolved = manager
                .resolve(&Target::Endpoint(other.clone()))
                .await
                .unwrap();
            assert_eq!(resolved, other);
            manager.close(&other).await.unwrap();
        };
        tokio::time::timeout(Duration::from_secs(5), others)
            .await
            .expect("other sessions stalled behind a blocked write");

        manager.close(&stuck).await.unwrap();
        let sent = tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(sent, Err(SessionError::Write { .. })));
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_no_entry() {
        let manager = SessionManager::new(FailingLauncher);
        let port = ep("/dev/ttyUSB0");
        assert!(matches!(
            manager.open(&port, false).await,
            Err(SessionError::Launch { .. })
        ));
        assert!(!manager.is_open(&port).await);
    }
}

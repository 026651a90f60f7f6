//! Session process launchers

use mpdev_core::Endpoint;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Produces the process behind a session
///
/// The returned child should have a piped stdin when control commands are to
/// be sent to it. It is owned by the session manager from then on.
pub trait SessionLauncher {
    /// Start a session process for `endpoint`, resetting the board first if
    /// `reset` is set
    fn launch(&self, endpoint: &Endpoint, reset: bool) -> std::io::Result<Child>;
}

/// Launches `mpremote connect <port> [reset] repl`
#[derive(Debug, Clone)]
pub struct MpremoteLauncher {
    program: String,
}

impl MpremoteLauncher {
    /// Use `program` instead of `mpremote`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for one endpoint
    pub fn args(endpoint: &Endpoint, reset: bool) -> Vec<String> {
        let mut args = vec!["connect".to_string(), endpoint.to_string()];
        if reset {
            args.push("reset".to_string());
        }
        args.push("repl".to_string());
        args
    }
}

impl Default for MpremoteLauncher {
    fn default() -> Self {
        Self::new("mpremote")
    }
}

impl SessionLauncher for MpremoteLauncher {
    fn launch(&self, endpoint: &Endpoint, reset: bool) -> std::io::Result<Child> {
        let args = Self::args(endpoint, reset);
        log::debug!("Launching {} {}", self.program, args.join(" "));
        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let ep = Endpoint::parse("/dev/ttyACM0").unwrap();
        assert_eq!(
            MpremoteLauncher::args(&ep, true),
            vec!["connect", "/dev/ttyACM0", "reset", "repl"]
        );
        assert_eq!(
            MpremoteLauncher::args(&ep, false),
            vec!["connect", "/dev/ttyACM0", "repl"]
        );
    }
}

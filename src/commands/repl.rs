//! Repl command implementation

use crate::config::Config;
use mpdev_core::Endpoint;
use mpdev_repl::{attach, MpremoteLauncher, SessionManager};

/// Attach the terminal to a session on `endpoint`
pub async fn run_repl(
    config: &Config,
    endpoint: &Endpoint,
    reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = SessionManager::new(MpremoteLauncher::new(&config.repl_tool));
    let result = attach(&manager, endpoint, reset).await;
    manager.close_all().await;
    result?;
    Ok(())
}

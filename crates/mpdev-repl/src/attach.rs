//! Interactive attach loop
//!
//! Reads lines with rustyline and forwards them to the session on one
//! endpoint. Lines starting with `:` are control commands; Ctrl-C at the
//! prompt interrupts the board, Ctrl-D closes the session.

use crate::command::{ControlCommand, COMMAND_NAMES};
use crate::error::{Result, SessionError};
use crate::highlight::AttachHelper;
use crate::launcher::SessionLauncher;
use crate::manager::{SessionManager, Target};
use colored::Colorize;
use directories::ProjectDirs;
use mpdev_core::Endpoint;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::Editor;
use std::path::PathBuf;

type LineEditor = Editor<AttachHelper, FileHistory>;

/// Get the history file path
fn history_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "mpdev") {
        let mut path = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&path).ok();
        path.push("repl_history");
        path
    } else {
        PathBuf::from(".mpdev_history")
    }
}

fn print_help() {
    println!();
    for (usage, what) in COMMAND_NAMES {
        println!("    {:<16} -- {}", usage.bright_cyan(), what);
    }
    println!("    {:<16} -- {}", ":? | :help".bright_cyan(), "this help");
    println!();
}

/// Read one line on a blocking thread, handing the editor back afterwards
async fn read_line(
    mut rl: LineEditor,
    prompt: String,
) -> Result<(LineEditor, std::result::Result<String, ReadlineError>)> {
    tokio::task::spawn_blocking(move || {
        let line = rl.readline(&prompt);
        (rl, line)
    })
    .await
    .map_err(|e| SessionError::Io(std::io::Error::other(e)))
}

/// Open (or reuse) the session on `endpoint` and attach the terminal to it
///
/// Returns when the session is closed from the prompt or ends on its own.
pub async fn attach<L: SessionLauncher>(
    manager: &SessionManager<L>,
    endpoint: &Endpoint,
    reset: bool,
) -> Result<()> {
    let handle = manager.open(endpoint, reset).await?;
    let target = Target::Endpoint(endpoint.clone());

    let mut rl: LineEditor = Editor::new().map_err(|e| SessionError::Io(std::io::Error::other(e)))?;
    rl.set_helper(Some(AttachHelper::new()));
    let history = history_path();
    if rl.load_history(&history).is_err() {
        log::debug!("No REPL history at {}", history.display());
    }

    println!(
        "{} {}{}",
        "Attached to".bright_green().bold(),
        endpoint,
        if handle.reused { " (existing session)" } else { "" }
    );
    println!(
        "Type {} for commands, {} to leave.",
        ":?".bright_cyan(),
        ":close".bright_cyan()
    );

    let prompt = format!("{} ", ">>>".bright_green().bold());
    loop {
        let (editor, line) = read_line(rl, prompt.clone()).await?;
        rl = editor;

        if !manager.is_open(endpoint).await {
            println!("{}", "Session ended".bright_yellow());
            break;
        }

        let command = match line {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    ControlCommand::SendText("\r\n".to_string())
                } else if input.starts_with(':') {
                    let _ = rl.add_history_entry(input);
                    if input == ":?" || input == ":help" {
                        print_help();
                        continue;
                    }
                    match ControlCommand::parse(input) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}: {}", "Error".bright_red().bold(), e);
                            continue;
                        }
                    }
                } else {
                    let _ = rl.add_history_entry(line.as_str());
                    ControlCommand::SendText(format!("{}\r\n", line))
                }
            }
            Err(ReadlineError::Interrupted) => ControlCommand::Interrupt,
            Err(ReadlineError::Eof) => ControlCommand::Close,
            Err(err) => {
                eprintln!("{}: {:?}", "Error".bright_red().bold(), err);
                ControlCommand::Close
            }
        };

        let closing = command == ControlCommand::Close;
        if let Err(e) = manager.send(&target, &command).await {
            eprintln!("{}: {}", "Error".bright_red().bold(), e);
            if matches!(e, SessionError::NotFound(_)) {
                break;
            }
        }
        if closing {
            println!("{}", "Session closed".bright_yellow());
            break;
        }
    }

    if let Err(e) = rl.save_history(&history) {
        eprintln!(
            "{}: Failed to save history: {}",
            "Warning".bright_yellow(),
            e
        );
    }
    Ok(())
}

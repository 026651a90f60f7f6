//! Terminal prompts

use indicatif::ProgressBar;
use mpdev_core::sync::Confirm;
use std::io::{self, BufRead, Write};

/// Yes/no prompt on the terminal, or unconditional yes with `--yes`
pub struct TerminalConfirm {
    assume_yes: bool,
    bar: Option<ProgressBar>,
}

impl TerminalConfirm {
    /// Create a prompt
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            bar: None,
        }
    }

    /// Hide `bar` while the question is on screen
    pub fn with_bar(mut self, bar: ProgressBar) -> Self {
        self.bar = Some(bar);
        self
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            log::info!("{} (assumed yes)", prompt);
            return true;
        }
        match &self.bar {
            Some(bar) => bar.suspend(|| ask_yes_no(prompt)),
            None => ask_yes_no(prompt),
        }
    }
}

/// Ask a yes/no question; anything but `y`/`yes` is no
pub fn ask_yes_no(prompt: &str) -> bool {
    match ask(&format!("{} [y/N] ", prompt)) {
        Some(answer) => is_yes(&answer),
        None => false,
    }
}

/// Ask for a line, falling back to `default` on an empty answer
pub fn ask_with_default(prompt: &str, default: &str) -> Option<String> {
    let answer = ask(&format!("{} [{}]: ", prompt, default))?;
    if answer.is_empty() {
        Some(default.to_string())
    } else {
        Some(answer)
    }
}

fn ask(prompt: &str) -> Option<String> {
    eprint!("{}", prompt);
    io::stderr().flush().ok()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[test]
    fn test_assume_yes() {
        assert!(TerminalConfirm::new(true).confirm("Delete everything?"));
    }
}

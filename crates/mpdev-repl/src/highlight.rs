//! Line editor helper for the attach loop
//!
//! Completes and colors `:` control commands. Everything else is passed
//! through untouched since it is interpreted by the board, not by us.

use crate::command::COMMAND_NAMES;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Helper};
use std::borrow::Cow;

/// rustyline helper for `mpdev repl`
#[derive(Helper)]
pub struct AttachHelper {
    names: Vec<&'static str>,
}

impl AttachHelper {
    /// Create a helper knowing every control command
    pub fn new() -> Self {
        Self {
            names: COMMAND_NAMES
                .iter()
                .map(|(usage, _)| usage.split_whitespace().next().unwrap_or(usage))
                .collect(),
        }
    }

    fn is_known(&self, word: &str) -> bool {
        self.names.contains(&word)
    }
}

impl Default for AttachHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for AttachHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let typed = &line[..pos];
        if !typed.starts_with(':') || typed.contains(char::is_whitespace) {
            return Ok((0, Vec::new()));
        }

        let completions = self
            .names
            .iter()
            .filter(|name| name.starts_with(typed))
            .map(|name| Pair {
                display: format!("{}", name.white()),
                replacement: name.to_string(),
            })
            .collect();
        Ok((0, completions))
    }
}

impl Validator for AttachHelper {
    fn validate(&self, _ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        Ok(ValidationResult::Valid(None))
    }
}

impl Hinter for AttachHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _context: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for AttachHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if !line.starts_with(':') {
            return Cow::Borrowed(line);
        }

        let (word, rest) = match line.find(char::is_whitespace) {
            Some(i) => line.split_at(i),
            None => (line, ""),
        };
        let word = if self.is_known(word) {
            word.bright_cyan().bold()
        } else {
            word.bright_red()
        };
        Cow::Owned(format!("{}{}", word, rest))
    }

    fn highlight_char(&self, line: &str, _pos: usize, _forced: bool) -> bool {
        line.starts_with(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_commands() {
        let helper = AttachHelper::new();
        assert!(helper.is_known(":send"));
        assert!(helper.is_known(":hard-reset"));
        assert!(!helper.is_known(":bogus"));
    }

    #[test]
    fn test_plain_lines_untouched() {
        let helper = AttachHelper::new();
        assert!(matches!(helper.highlight("print(1)", 0), Cow::Borrowed("print(1)")));
    }
}

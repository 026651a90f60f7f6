//! Terminal progress rendering

use indicatif::{ProgressBar, ProgressStyle};
use mpdev_core::ProgressSink;
use std::time::Duration;

/// Progress sink drawing one indicatif line
///
/// Shows a spinner for informational steps and a bar once a step reports a
/// percentage.
pub struct IndicatifProgress {
    bar: ProgressBar,
    determinate: bool,
}

impl IndicatifProgress {
    /// Start a spinner
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            determinate: false,
        }
    }

    /// Handle to the underlying bar, e.g. to suspend it around a prompt
    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    /// Stop drawing and leave `message` on the line
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop drawing and clear the line
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgress {
    fn report(&mut self, message: &str, percent: Option<u8>) {
        match percent {
            Some(percent) => {
                if !self.determinate {
                    self.bar.set_style(bar_style());
                    self.bar.set_length(100);
                    self.determinate = true;
                }
                self.bar.set_position(u64::from(percent));
            }
            None if self.determinate => {
                self.bar.set_style(spinner_style());
                self.determinate = false;
            }
            None => {}
        }
        self.bar.set_message(message.to_string());
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

//! Progress reporting contract
//!
//! Transports and pipelines report through a single `(message, percent)`
//! callback. `percent` is `None` for purely informational messages.

/// Receiver of progress updates
pub trait ProgressSink {
    /// Report a step. `percent` is in `0..=100` when known.
    fn report(&mut self, message: &str, percent: Option<u8>);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str, Option<u8>),
{
    fn report(&mut self, message: &str, percent: Option<u8>) {
        self(message, percent)
    }
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _message: &str, _percent: Option<u8>) {}
}

/// Integer percentage of `done` over `total`, clamped to 100
///
/// An empty total counts as complete.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(50, 200), 25);
        assert_eq!(percent_of(200, 200), 100);
        assert_eq!(percent_of(300, 200), 100);
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |msg: &str, pct: Option<u8>| seen.push((msg.to_string(), pct));
            sink.report("a", Some(10));
            sink.report("b", None);
        }
        assert_eq!(seen, vec![("a".to_string(), Some(10)), ("b".to_string(), None)]);
    }
}

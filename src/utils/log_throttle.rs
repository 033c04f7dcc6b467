use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    started_at: Instant,
    suppressed: u64,
}

/// Rate limits repetitive log lines per key.
///
/// A busy table can push many change notifications per second; each one
/// triggers a refetch, and logging every single one drowns the output.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    windows: HashMap<String, Window>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            windows: HashMap::new(),
        }
    }

    /// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
    /// otherwise `None` and the event is counted as suppressed for the active window.
    pub fn should_emit(&mut self, key: &str) -> Option<u64> {
        self.should_emit_at(key, Instant::now())
    }

    fn should_emit_at(&mut self, key: &str, now: Instant) -> Option<u64> {
        match self.windows.get_mut(key) {
            Some(window) if now.duration_since(window.started_at) >= self.interval => {
                let suppressed = window.suppressed;
                window.started_at = now;
                window.suppressed = 0;
                Some(suppressed)
            }
            Some(window) => {
                window.suppressed += 1;
                None
            }
            None => {
                self.windows.insert(
                    key.to_string(),
                    Window {
                        started_at: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_then_suppresses_then_emits_with_count() {
        let mut throttle = LogThrottle::new(Duration::from_secs(30));
        let start = Instant::now();

        assert_eq!(throttle.should_emit_at("feed", start), Some(0));
        assert_eq!(throttle.should_emit_at("feed", start + Duration::from_secs(1)), None);
        assert_eq!(throttle.should_emit_at("feed", start + Duration::from_secs(2)), None);
        assert_eq!(
            throttle.should_emit_at("feed", start + Duration::from_secs(31)),
            Some(2)
        );
    }

    /// Test that keys are throttled independently.
    #[test]
    fn keys_have_separate_windows() {
        let mut throttle = LogThrottle::new(Duration::from_secs(30));
        let start = Instant::now();

        assert_eq!(throttle.should_emit_at("a", start), Some(0));
        assert_eq!(throttle.should_emit_at("b", start), Some(0));
        assert_eq!(throttle.should_emit_at("a", start), None);
    }
}

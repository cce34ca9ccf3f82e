//! Sliding-window counter bounding sustained request rate.

use std::time::{Duration, Instant};

/// Per-identity window state. Limit and duration are passed in per call so
/// reconfiguration takes effect without rebuilding state.
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    /// Start of the current window
    window_start: Instant,
    /// Requests admitted in the current window
    count: u32,
}

impl SlidingWindow {
    /// Create a fresh window starting now.
    pub(crate) fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Count one request against the window. Returns the time until the
    /// window resets on failure.
    pub(crate) fn try_consume(&mut self, limit: u32, duration: Duration) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);

        if elapsed > duration {
            self.window_start = now;
            self.count = 0;
        }

        if self.count >= limit {
            Err(duration.saturating_sub(now.duration_since(self.window_start)))
        } else {
            self.count += 1;
            Ok(())
        }
    }

    /// Requests remaining in the current window.
    pub(crate) fn remaining(&self, limit: u32, duration: Duration) -> u32 {
        if Instant::now().duration_since(self.window_start) > duration {
            limit
        } else {
            limit.saturating_sub(self.count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_blocks_at_limit() {
        let mut window = SlidingWindow::new();
        let duration = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(window.try_consume(3, duration).is_ok());
        }
        let wait = window.try_consume(3, duration).unwrap_err();
        assert!(wait <= duration);
    }

    #[test]
    fn test_window_resets_after_duration() {
        let mut window = SlidingWindow::new();
        let duration = Duration::from_millis(100);
        assert!(window.try_consume(1, duration).is_ok());
        assert!(window.try_consume(1, duration).is_err());

        std::thread::sleep(Duration::from_millis(120));
        assert!(window.try_consume(1, duration).is_ok());
    }

    #[test]
    fn test_remaining() {
        let mut window = SlidingWindow::new();
        let duration = Duration::from_secs(60);
        assert_eq!(window.remaining(3, duration), 3);
        window.try_consume(3, duration).unwrap();
        assert_eq!(window.remaining(3, duration), 2);
    }
}

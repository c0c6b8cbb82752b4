//! Underrun accounting.
//!
//! An underrun means the DMA engine reached slots software never refilled
//! and replayed stale divisors. The controller recovers by refilling every
//! free slot with the neutral divisor, which holds the carrier on center
//! (silence) instead of repeating old audio. Occasional underruns are
//! tolerated; a burst of them means the host cannot keep up and the session
//! is faulted.
//!
//! [`UnderrunMonitor`] keeps the timestamps of recent underruns and decides
//! whether the latest one crossed the limit.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// What the controller should do after an underrun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderrunVerdict {
    /// Refill with neutral and keep streaming.
    Recover {
        /// Underruns inside the window, this one included.
        recent: u32,
    },
    /// Limit exceeded; fault the session.
    Escalate {
        /// Underruns inside the window, this one included.
        recent: u32,
    },
}

/// Sliding-window underrun counter.
#[derive(Debug, Clone)]
pub struct UnderrunMonitor {
    max_underruns: u32,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl UnderrunMonitor {
    /// Tolerate up to `max_underruns` within any `window`.
    pub fn new(max_underruns: u32, window: Duration) -> Self {
        Self {
            max_underruns,
            window,
            recent: VecDeque::new(),
        }
    }

    /// Record an underrun observed at `now`.
    pub fn record(&mut self, now: Instant) -> UnderrunVerdict {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.push_back(now);

        let recent = u32::try_from(self.recent.len()).unwrap_or(u32::MAX);
        if recent > self.max_underruns {
            UnderrunVerdict::Escalate { recent }
        } else {
            UnderrunVerdict::Recover { recent }
        }
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_limit_recovers() {
        let mut m = UnderrunMonitor::new(3, Duration::from_secs(5));
        let t = Instant::now();
        for i in 1..=3 {
            assert_eq!(m.record(t), UnderrunVerdict::Recover { recent: i });
        }
    }

    #[test]
    fn test_exceeding_limit_escalates() {
        let mut m = UnderrunMonitor::new(2, Duration::from_secs(5));
        let t = Instant::now();
        m.record(t);
        m.record(t + Duration::from_millis(10));
        assert_eq!(
            m.record(t + Duration::from_millis(20)),
            UnderrunVerdict::Escalate { recent: 3 }
        );
    }

    #[test]
    fn test_old_underruns_leave_the_window() {
        let mut m = UnderrunMonitor::new(1, Duration::from_secs(1));
        let t = Instant::now();
        m.record(t);
        assert_eq!(
            m.record(t + Duration::from_secs(2)),
            UnderrunVerdict::Recover { recent: 1 }
        );
    }

    #[test]
    fn test_zero_tolerance() {
        let mut m = UnderrunMonitor::new(0, Duration::from_secs(1));
        assert!(matches!(m.record(Instant::now()), UnderrunVerdict::Escalate { .. }));
    }
}

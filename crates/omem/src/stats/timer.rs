//! GC Timer - Timing Utilities
//!
//! Measures collection phases with the monotonic clock.

use std::time::{Duration, Instant};

/// GcTimer - timer for measuring a collection or one of its phases
#[derive(Debug, Clone, Copy)]
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed time since the last lap (or start), restarting the lap
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now - self.start;
        self.start = now;
        lap
    }
}

impl Default for GcTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lap_restarts() {
        let mut timer = GcTimer::start();
        std::thread::sleep(Duration::from_millis(2));
        let first = timer.lap();

        assert!(first >= Duration::from_millis(2));
        assert!(timer.elapsed() < first + Duration::from_secs(1));
    }
}

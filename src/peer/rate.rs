use std::time::{Duration, Instant};

/// Bytes transferred since the window was last reset.
#[derive(Debug, Clone)]
pub struct Rate {
    bytes: u64,
    since: Instant,
}

impl Rate {
    pub fn new() -> Self {
        Self {
            bytes: 0,
            since: Instant::now(),
        }
    }

    pub fn add(&mut self, bytes: u64) {
        self.bytes = self.bytes.saturating_add(bytes);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Bytes per second over the current window.
    pub fn per_second(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    pub fn rate_at(&self, now: Instant) -> f64 {
        if self.bytes == 0 {
            return 0.0;
        }
        let elapsed = now
            .saturating_duration_since(self.since)
            .max(Duration::from_millis(1));
        self.bytes as f64 / elapsed.as_secs_f64()
    }

    pub fn reset(&mut self) {
        self.bytes = 0;
        self.since = Instant::now();
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::new()
    }
}

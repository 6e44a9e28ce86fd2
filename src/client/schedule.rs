use crate::config::ClientConfig;

/// What the control loop does on one tick besides the regular choke pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub optimistic: bool,
    pub reset_rates: bool,
}

/// Counts control loop ticks. The first tick does both.
#[derive(Debug, Clone)]
pub struct ControlSchedule {
    optimistic_every: u32,
    rate_reset_every: u32,
    tick: u64,
}

impl ControlSchedule {
    pub fn new(optimistic_every: u32, rate_reset_every: u32) -> Self {
        Self {
            optimistic_every: optimistic_every.max(1),
            rate_reset_every: rate_reset_every.max(1),
            tick: 0,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.optimistic_every, config.rate_reset_every)
    }

    pub fn next(&mut self) -> Tick {
        let tick = self.tick;
        self.tick += 1;
        Tick {
            optimistic: tick % self.optimistic_every as u64 == 0,
            reset_rates: tick % self.rate_reset_every as u64 == 0,
        }
    }
}

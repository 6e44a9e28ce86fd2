//! Client configuration.
//!
//! Plain structs built by the embedding application; nothing is read from
//! disk or the environment.

use crate::constants::*;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("empty listen port range")]
    EmptyPortRange,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("piece timeout {timeout:?} is shorter than the tick {tick:?}")]
    TimeoutBelowTick { timeout: Duration, tick: Duration },
}

/// Tunables of the choke scheduler.
#[derive(Debug, Clone)]
pub struct ChokingConfig {
    /// Interested peers kept unchoked by rank (default: 4).
    pub max_unchoked: usize,
    /// Age at which an unanswered piece request is released (default: 9 seconds).
    pub piece_timeout: Duration,
}

impl Default for ChokingConfig {
    fn default() -> Self {
        Self {
            max_unchoked: MAX_UNCHOKED,
            piece_timeout: PIECE_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub listen_ip: IpAddr,
    /// Ports tried in order; the first free one is used. A range holding only
    /// port 0 binds an ephemeral port.
    pub listen_ports: RangeInclusive<u16>,
    /// Control loop period.
    pub tick: Duration,
    pub optimistic_every: u32,
    pub rate_reset_every: u32,
    pub voluntary_outbound: usize,
    /// Send server-completion messages alongside bitfields and HAVEs.
    pub server: bool,
    pub choking: ChokingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_ports: PORT_RANGE_START..=PORT_RANGE_END,
            tick: DEFAULT_TICK,
            optimistic_every: OPTIMISTIC_UNCHOKE_EVERY,
            rate_reset_every: RATE_RESET_EVERY,
            voluntary_outbound: VOLUNTARY_OUTBOUND_LIMIT,
            server: false,
            choking: ChokingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loopback on an ephemeral port, used by tests and local swarms.
    pub fn loopback() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_ports: 0..=0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_ports.is_empty() {
            return Err(ConfigError::EmptyPortRange);
        }
        if self.tick.is_zero() {
            return Err(ConfigError::Zero("tick"));
        }
        if self.optimistic_every == 0 {
            return Err(ConfigError::Zero("optimistic_every"));
        }
        if self.rate_reset_every == 0 {
            return Err(ConfigError::Zero("rate_reset_every"));
        }
        if self.choking.max_unchoked == 0 {
            return Err(ConfigError::Zero("max_unchoked"));
        }
        if self.choking.piece_timeout < self.tick {
            return Err(ConfigError::TimeoutBelowTick {
                timeout: self.choking.piece_timeout,
                tick: self.tick,
            });
        }
        Ok(())
    }
}

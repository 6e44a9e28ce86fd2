//! Protocol constants and tuning parameters.
//!
//! Defaults for [`ClientConfig`](crate::config::ClientConfig) and
//! [`ChokingConfig`](crate::config::ChokingConfig) come from here, as do the
//! fixed values of the wire protocol.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &[u8; 8] = b"-SL0001-";

// ============================================================================
// Ports
// ============================================================================

/// First port tried when binding the listen socket
pub const PORT_RANGE_START: u16 = 6881;

/// Last port tried when binding the listen socket
pub const PORT_RANGE_END: u16 = 6889;

// ============================================================================
// Control loop
// ============================================================================

/// Period of the client control loop
pub const DEFAULT_TICK: Duration = Duration::from_secs(3);

/// Run the optimistic unchoke on every Nth tick
pub const OPTIMISTIC_UNCHOKE_EVERY: u32 = 3;

/// Reset windowed rate counters on every Mth tick
pub const RATE_RESET_EVERY: u32 = 2;

// ============================================================================
// Choking
// ============================================================================

/// Interested peers kept unchoked by rank
pub const MAX_UNCHOKED: usize = 4;

/// Outstanding piece requests older than this are released
pub const PIECE_REQUEST_TIMEOUT: Duration = Duration::from_secs(9);

// ============================================================================
// Connections
// ============================================================================

/// Once a torrent is complete, discovered peers are only dialled while fewer
/// than this many are connected
pub const VOLUNTARY_OUTBOUND_LIMIT: usize = 20;

/// Announce budget given to every newly added torrent
pub const DEFAULT_ANNOUNCES: u32 = 2;

// ============================================================================
// Buffer sizes
// ============================================================================

/// Size of the reactor's per-read staging buffer
pub const STAGING_BUFFER_SIZE: usize = 8 * 1024;

/// Initial capacity of a connection's accumulation buffer
pub const INITIAL_READ_BUFFER: usize = 30 * 1024;

// ============================================================================
// Blocks
// ============================================================================

/// Standard block size for piece requests (16 KiB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

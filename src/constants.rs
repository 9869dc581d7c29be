//! Application-wide constants for knobd.
//!
//! This module centralizes the bus protocol values and timing constants
//! so the byte partition and timeout policy live in one place. Constants
//! are grouped by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Bus protocol**: the byte-range partition spoken by the controller
//! - **Timeouts**: bounds on WebSocket connect and request/response calls
//! - **Polling**: loop cadence defaults

use std::time::Duration;

// ============================================================================
// Bus protocol
// ============================================================================

/// Highest raw byte interpreted as a volume level.
///
/// Readings in `0..=VOLUME_MAX` are volume levels; the same bound clamps
/// outgoing volume mutations defensively.
pub const VOLUME_MAX: u8 = 100;

/// Reserved byte meaning "nothing to report" on a poll tick.
///
/// The controller cannot use 0 as its idle value because 0 is a valid
/// volume level, so the top of the byte range is reserved instead.
pub const SENTINEL_BYTE: u8 = 255;

/// Offset subtracted from a raw button reading to recover the button code.
///
/// Button readings occupy `101..=254`; subtracting the offset yields
/// codes `1..=154`, of which only a handful are mapped.
pub const BUTTON_CODE_OFFSET: u8 = 100;

// ============================================================================
// Timeouts
// ============================================================================

/// WebSocket connect timeout.
///
/// The UI service runs on the same host, so a connect that takes longer
/// than this is as good as refused. Bounding it keeps a dead service from
/// stalling the poll loop.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request/response round-trip timeout on either channel.
///
/// Each send is followed by exactly one receive; this bounds the pair so
/// a hung peer is treated like any other transport failure.
pub const ROUNDTRIP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Polling
// ============================================================================

/// Default interval between bus polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Default delay before retrying a failed bootstrap.
///
/// Bootstrap failure usually means the UI service is down; retrying at
/// the raw poll cadence would hammer the connect path for nothing.
pub const DEFAULT_BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(1);

//! Lazy, self-healing connections to the UI service.
//!
//! The service exposes two independent duplex channels on the same
//! endpoint: `/state` for queries/mutations and `/action` for discrete
//! instructions. The manager owns at most one live connection per channel,
//! dials lazily on first use, and drops a connection the moment a caller
//! reports a failure — the next `acquire` dials fresh.
//!
//! # Lifecycle
//!
//! ```text
//! acquire(State) ──(slot empty)──► ws::connect(<url>/state) ──► held
//!        │                               │
//!        │ (slot held)                   └─(failure)─► Err("no connection
//!        ▼                                             available"), slot
//!   &mut WsConnection                                  stays empty
//!
//! release(State) ──► close + clear slot (next acquire reconnects)
//! ```
//!
//! Channels fail independently: releasing `state` never touches `action`.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};

use crate::ws::{self, WsConnection};

/// One of the two logical channels to the UI service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// State queries and mutations (`/state`).
    State,
    /// Discrete action instructions (`/action`).
    Action,
}

impl Channel {
    /// Endpoint path for this channel.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::State => "/state",
            Self::Action => "/action",
        }
    }

    /// Human-readable channel name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Action => "action",
        }
    }
}

/// Owner of the two per-channel connection slots.
///
/// Single-threaded by design — the poll loop is the only caller, so the
/// slots need no locking.
#[derive(Debug)]
pub struct ChannelManager {
    server_url: String,
    state: Option<WsConnection>,
    action: Option<WsConnection>,
}

impl ChannelManager {
    /// Create a manager dialing `server_url` (scheme is normalized to ws/wss).
    #[must_use]
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: ws::http_to_ws_scheme(server_url.trim_end_matches('/')),
            state: None,
            action: None,
        }
    }

    /// Return the held connection for `channel`, dialing if the slot is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns "no connection available" if the dial fails; the slot stays
    /// empty so the next call retries.
    pub async fn acquire(&mut self, channel: Channel) -> Result<&mut WsConnection> {
        if self.slot(channel).is_none() {
            let url = format!("{}{}", self.server_url, channel.path());
            let conn = ws::connect(&url).await.with_context(|| {
                format!("no connection available for {} channel", channel.name())
            })?;
            *self.slot_mut(channel) = Some(conn);
        }

        self.slot_mut(channel)
            .as_mut()
            .with_context(|| format!("no connection available for {} channel", channel.name()))
    }

    /// Close and clear the held connection for `channel`.
    ///
    /// Invoked whenever a caller detects a send/receive failure or a
    /// malformed response. A no-op if the slot is already empty.
    pub async fn release(&mut self, channel: Channel) {
        if let Some(mut conn) = self.slot_mut(channel).take() {
            // Best-effort close frame; the socket is going away regardless.
            let _ = conn.close().await;
            log::debug!("released {} channel connection", channel.name());
        }
    }

    /// Whether a connection is currently held for `channel`.
    #[must_use]
    pub fn is_held(&self, channel: Channel) -> bool {
        self.slot(channel).is_some()
    }

    fn slot(&self, channel: Channel) -> &Option<WsConnection> {
        match channel {
            Channel::State => &self.state,
            Channel::Action => &self.action,
        }
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut Option<WsConnection> {
        match channel {
            Channel::State => &mut self.state,
            Channel::Action => &mut self.action,
        }
    }
}

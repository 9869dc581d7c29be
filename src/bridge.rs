//! Bridge - the poll/bootstrap loop at the center of the daemon.
//!
//! The Bridge owns all state and runs the main loop. Each tick it either
//! attempts bootstrap (when uninitialized) or reads one byte from the bus
//! and routes it through the dispatcher.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────┐
//!            │       Bridge         │
//!            │  - Owns all state    │
//!            │  - Runs poll loop    │
//!            └──────────┬───────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        │              │              │
//!        ▼              ▼              ▼
//!      Bus          Dispatcher     Channels
//!  (controller)   (byte→command)  (UI service)
//! ```
//!
//! # State machine
//!
//! Uninitialized ──bootstrap ok──► Initialized ──state-channel failure──►
//! Uninitialized. Bus errors and action-channel errors never leave
//! Initialized; the asymmetry is deliberate — bus flakiness is tolerated
//! per-tick, but once the state channel is lost the local shadow state can
//! no longer be trusted.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde_json::Value;

use crate::bus::VolumeBus;
use crate::channel::{Channel, ChannelManager};
use crate::config::Config;
use crate::constants::VOLUME_MAX;
use crate::dispatch::{self, PollEvent};
use crate::service;

/// Session-scoped flags owned by the loop.
///
/// Passed by reference into the dispatcher and bootstrap rather than
/// living as ambient globals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionState {
    /// Whether bootstrap has succeeded since the last state-channel loss.
    pub initialized: bool,
    /// Local shadow of the remote display-mode flag (`"mode" == "Light"`).
    ///
    /// The service is the source of truth; this may lag it when a mode
    /// mutation fails after the local flip.
    pub bright: bool,
}

/// What a tick did, so the loop can pick the right sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Normal tick — poll again after the configured interval.
    Polled,
    /// Bootstrap failed — back off before the next attempt.
    AwaitingBootstrap,
}

/// Central orchestrator for the knobd daemon.
pub struct Bridge {
    config: Config,
    channels: ChannelManager,
    bus: Box<dyn VolumeBus + Send>,
    /// Session flags; public so tests can observe the state machine.
    pub session: SessionState,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("session", &self.session)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Create a bridge over `bus`, dialing the service named in `config`.
    #[must_use]
    pub fn new(config: Config, bus: Box<dyn VolumeBus + Send>) -> Self {
        let channels = ChannelManager::new(&config.server_url);
        Self {
            config,
            channels,
            bus,
            session: SessionState::default(),
        }
    }

    /// Pull current state from the service and push the derived volume
    /// byte down to the device.
    ///
    /// Idempotent for a fixed remote state. The device write is
    /// best-effort — a bus failure here is logged and does not fail the
    /// bootstrap.
    ///
    /// # Errors
    ///
    /// Returns an error if either state query fails; the caller releases
    /// the state channel and stays uninitialized.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let volume = service::query(&mut self.channels, "volume").await?;
        let mode = service::query(&mut self.channels, "mode").await?;

        self.session.bright = mode.as_str() == Some("Light");

        let level = volume_byte(&volume);
        if let Err(e) = self.bus.write_byte(level) {
            log::warn!("failed to push volume {level} to controller: {e:#}");
        }

        self.session.initialized = true;
        log::info!(
            "initialization done (volume {level}, {} mode)",
            if self.session.bright { "light" } else { "dark" }
        );
        Ok(())
    }

    /// Run one tick of the poll/bootstrap loop.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.session.initialized {
            if let Err(e) = self.bootstrap().await {
                log::warn!("bootstrap failed: {e:#}");
                self.channels.release(Channel::State).await;
                return TickOutcome::AwaitingBootstrap;
            }
            return TickOutcome::Polled;
        }

        let byte = match self.bus.read_byte() {
            Ok(byte) => byte,
            Err(e) => {
                // Transient: the tick is a no-op, state stays Initialized.
                log::warn!("bus read error: {e:#}");
                return TickOutcome::Polled;
            }
        };

        match dispatch::classify(byte) {
            PollEvent::Volume(level) => {
                if let Err(e) = dispatch::set_volume(level, &mut self.channels).await {
                    log::warn!("volume update failed, re-initializing: {e:#}");
                    self.session.initialized = false;
                }
            }
            PollEvent::Sentinel => {}
            PollEvent::Button(code) => {
                if let Err(e) =
                    dispatch::dispatch_button(code, &mut self.session, &mut self.channels).await
                {
                    log::warn!("button command failed, re-initializing: {e:#}");
                    self.session.initialized = false;
                }
            }
        }

        TickOutcome::Polled
    }

    /// Run the loop until `shutdown` is set.
    ///
    /// There is no terminal state — only external shutdown ends the loop.
    /// Held connections are closed on the way out.
    pub async fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "bridge loop started (poll interval {:?})",
            self.config.poll_interval()
        );

        while !shutdown.load(Ordering::Relaxed) {
            let delay = match self.tick().await {
                TickOutcome::Polled => self.config.poll_interval(),
                TickOutcome::AwaitingBootstrap => self.config.bootstrap_retry(),
            };
            tokio::time::sleep(delay).await;
        }

        log::info!("shutting down");
        self.channels.release(Channel::State).await;
        self.channels.release(Channel::Action).await;
    }
}

/// Derive the device volume byte from a service state value.
///
/// Unset or non-integer values degrade to 0; out-of-range values are
/// clamped like any other volume.
fn volume_byte(value: &Value) -> u8 {
    let level = value.as_u64().unwrap_or(0).min(u64::from(VOLUME_MAX));
    level as u8
}

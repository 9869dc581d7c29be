//! Reading classification and button command dispatch.
//!
//! A poll reading is partitioned by value: `0..=100` is a volume level,
//! `255` is the idle sentinel, everything else is a button reading whose
//! code is recovered by subtracting the fixed offset. Button codes map
//! through a static table to [`ButtonAction`] variants — no stringly-typed
//! lookup, so a mapped code can never bind to a missing handler.
//!
//! Unknown codes and unimplemented actions are diagnostics, never errors:
//! the poll loop must survive anything the controller sends.

use anyhow::Result;
use serde_json::Value;

use crate::bridge::SessionState;
use crate::channel::ChannelManager;
use crate::constants::{BUTTON_CODE_OFFSET, SENTINEL_BYTE, VOLUME_MAX};
use crate::service;

/// Classification of one raw bus reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A volume level in `0..=100`.
    Volume(u8),
    /// The idle sentinel — nothing to report this tick.
    Sentinel,
    /// A button code (already offset-corrected).
    Button(u8),
}

/// Partition a raw bus byte into its event class.
///
/// The partition is total: every byte maps to exactly one class.
#[must_use]
pub fn classify(byte: u8) -> PollEvent {
    if byte <= VOLUME_MAX {
        PollEvent::Volume(byte)
    } else if byte == SENTINEL_BYTE {
        PollEvent::Sentinel
    } else {
        PollEvent::Button(byte - BUTTON_CODE_OFFSET)
    }
}

/// Semantic command bound to a button code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Cycle the UI to its next page.
    ToggleMode,
    /// Jump to the previous track (placeholder).
    PreviousTrack,
    /// Toggle play/pause (placeholder).
    TogglePlay,
    /// Jump to the next track (placeholder).
    NextTrack,
    /// Flip the display between light and dark mode.
    ToggleBrightness,
}

impl ButtonAction {
    /// Command name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ToggleMode => "toggle_mode",
            Self::PreviousTrack => "previous_track",
            Self::TogglePlay => "toggle_play",
            Self::NextTrack => "next_track",
            Self::ToggleBrightness => "toggle_brightness",
        }
    }
}

/// Fixed button-code → action table.
pub const BUTTON_MAP: &[(u8, ButtonAction)] = &[
    (1, ButtonAction::ToggleMode),
    (2, ButtonAction::PreviousTrack),
    (3, ButtonAction::TogglePlay),
    (4, ButtonAction::NextTrack),
    (5, ButtonAction::ToggleBrightness),
];

/// Look up the action bound to `code`, if any.
#[must_use]
pub fn button_action(code: u8) -> Option<ButtonAction> {
    BUTTON_MAP
        .iter()
        .find(|(mapped, _)| *mapped == code)
        .map(|(_, action)| *action)
}

/// Clamp a raw reading into the valid volume range.
///
/// Defensive — the classifier already restricts volume readings to the
/// range, but mutations must never leave it regardless of the caller.
#[must_use]
pub fn clamp_volume(raw: u8) -> u8 {
    raw.min(VOLUME_MAX)
}

/// Dispatch a button code to its bound action.
///
/// Unknown codes log an error and succeed — the loop continues.
///
/// # Errors
///
/// Returns an error only when an action's **state-channel** interaction
/// fails; the caller uses that to schedule re-initialization. Action-channel
/// failures are logged and absorbed here.
pub async fn dispatch_button(
    code: u8,
    session: &mut SessionState,
    channels: &mut ChannelManager,
) -> Result<()> {
    let Some(action) = button_action(code) else {
        log::error!("unknown button {code}");
        return Ok(());
    };

    log::debug!("button {code} -> {}", action.name());

    match action {
        ButtonAction::ToggleMode => {
            toggle_mode(channels).await;
            Ok(())
        }
        ButtonAction::PreviousTrack => {
            log::warn!("TODO: previous track");
            Ok(())
        }
        ButtonAction::TogglePlay => {
            log::warn!("TODO: toggling play/pause");
            Ok(())
        }
        ButtonAction::NextTrack => {
            log::warn!("TODO: next track");
            Ok(())
        }
        ButtonAction::ToggleBrightness => toggle_brightness(session, channels).await,
    }
}

/// Clamp `raw` and mutate the service's `volume` key.
///
/// # Errors
///
/// Propagates state-channel failure (the connection has already been
/// released by the protocol layer).
pub async fn set_volume(raw: u8, channels: &mut ChannelManager) -> Result<()> {
    let volume = clamp_volume(raw);
    service::mutate(channels, "volume", Value::from(volume)).await?;
    Ok(())
}

/// Send `cycle_page` over the action channel.
///
/// Failure is logged and absorbed: losing the action channel never forces
/// a rebootstrap, and the connection manager already released it.
async fn toggle_mode(channels: &mut ChannelManager) {
    if let Err(e) = service::send_instruction(channels, "cycle_page").await {
        log::warn!("cycle_page failed: {e:#}");
    }
}

/// Flip the local brightness shadow, then push the new mode to the service.
///
/// The local flip happens first and is not rolled back on failure; the
/// service remains the source of truth and the next bootstrap re-reads it.
async fn toggle_brightness(
    session: &mut SessionState,
    channels: &mut ChannelManager,
) -> Result<()> {
    session.bright = !session.bright;
    let mode = if session.bright { "Light" } else { "Dark" };
    let echoed = service::mutate(channels, "mode", Value::from(mode)).await?;
    if echoed.is_none() {
        log::debug!("service did not echo mode mutation");
    }
    Ok(())
}

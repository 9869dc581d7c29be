//! knobd - hardware controller bridge daemon.
//!
//! This crate bridges a microcontroller (buttons + volume knob behind a
//! register-style I2C bus) to a running UI/state service reachable over
//! two persistent WebSocket channels.
//!
//! # Architecture
//!
//! The crate follows a centralized state store pattern:
//!
//! - **Bridge** - Central orchestrator, owns state, runs the poll loop
//! - **Bus** - SMBus adapter for the controller device
//! - **Channels** - Lazy per-channel WebSocket connections to the service
//! - **Service** - JSON request/response protocol (state sync + actions)
//! - **Dispatcher** - Raw byte → semantic command mapping
//!
//! # Modules
//!
//! - [`bridge`] - Poll/bootstrap loop and session state
//! - [`dispatch`] - Reading classification and button actions
//! - [`channel`] - Connection manager for the two service channels
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod bridge;
pub mod bus;
pub mod channel;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod service;
pub mod ws;

// Re-export commonly used types
pub use bridge::{Bridge, SessionState, TickOutcome};
pub use bus::VolumeBus;
pub use channel::{Channel, ChannelManager};
pub use config::Config;
pub use dispatch::{ButtonAction, PollEvent};

//! Heatstake bridge: keeps a heat-staking controller's Modbus RTU register
//! space and an operator console on a WebSocket link in sync.
//!
//! The controller is polled block by block over a half-duplex serial bus;
//! every change is pushed to the console as a small JSON message, and console
//! actions come back as queued register writes. See [`bridge::Bridge`] for the
//! engine and [`protocol`] for the two transports.

#[doc(hidden)]
pub mod boot;
pub mod bridge;
#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod error;
pub mod protocol;

pub use bridge::{Bridge, SyncSettings};
pub use error::{BridgeError, Result};

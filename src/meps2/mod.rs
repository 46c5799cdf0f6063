//! MePS2 receiver support
//!
//! This module provides the receiver side of the bridge:
//! - Frame decoding with checksum validation and resync
//! - Axis scaling, button and D-pad decoding
//! - Edge-correct controller state with a stale timeout
//! - Serial port discovery and reader tasks

pub mod constants;
pub mod types;
pub mod decoder;
pub mod controller;
pub mod connection;

// Re-export commonly used items
pub use types::*;
pub use decoder::{DecoderStats, Frame, FrameDecoder, FrameResult};
pub use controller::{scale_axis, ControllerSnapshot, ControllerState, StalePolicy, StateDelta};
pub use connection::*;

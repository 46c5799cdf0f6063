//! meps2-bridge: MePS2 serial gamepad receiver bridge
//!
//! This library decodes the MePS2 serial controller protocol and forwards
//! normalized stick, trigger, button and D-pad state to an output sink, one
//! session per attached receiver.

pub mod backend;
pub mod config;
pub mod manager;
pub mod meps2;
pub mod session;

// Re-export commonly used items
pub use backend::{JsonSink, LogSink, MockSink, OutputSink, SinkError};
pub use config::{Config, ConfigError, SinkKind};
pub use manager::{Bridge, BridgeError, BridgeTiming, Connector, Discovery, SessionRegistry};
pub use meps2::{Button, ControllerState, EndpointId, FrameDecoder, FrameResult};
pub use session::{DeviceSession, SessionOptions, SessionState};

//! Output backends for normalized controller state
//!
//! A sink receives stick, trigger, button and D-pad commands for one device
//! and publishes them atomically on `commit`. This module provides the
//! unified interface plus a logging sink, a JSON-lines sink and a recording
//! mock for tests.

pub mod json_sink;
pub mod log_sink;
pub mod mock_sink;

pub use json_sink::JsonSink;
pub use log_sink::LogSink;
pub use mock_sink::{MockHandle, MockSink, SinkCommand};

use crate::meps2::constants::BUTTON_TABLE;
use crate::meps2::types::{Button, DpadDirection, Stick, TriggerSide};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink operation failed: {0}")]
    Operation(String),

    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Unified interface for virtual controller outputs
pub trait OutputSink {
    /// Set left stick position (each axis in -255..=255)
    fn set_left_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError>;

    /// Set right stick position (each axis in -255..=255)
    fn set_right_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError>;

    /// Set a trigger level (0 = released, 255 = fully pressed)
    fn set_trigger(&mut self, side: TriggerSide, level: u8) -> Result<(), SinkError>;

    /// Press or release a button
    fn set_button(&mut self, button: Button, pressed: bool) -> Result<(), SinkError>;

    /// Set the D-pad direction
    fn set_dpad(&mut self, direction: DpadDirection) -> Result<(), SinkError>;

    /// Publish everything set since the last commit
    fn commit(&mut self) -> Result<(), SinkError>;

    /// Return every control to neutral (not committed)
    fn reset(&mut self) -> Result<(), SinkError> {
        self.set_left_stick(0, 0)?;
        self.set_right_stick(0, 0)?;
        self.set_trigger(TriggerSide::Left, 0)?;
        self.set_trigger(TriggerSide::Right, 0)?;
        for (button, _, _) in BUTTON_TABLE {
            self.set_button(button, false)?;
        }
        self.set_dpad(DpadDirection::Neutral)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn set_left_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError> {
        (**self).set_left_stick(x, y)
    }

    fn set_right_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError> {
        (**self).set_right_stick(x, y)
    }

    fn set_trigger(&mut self, side: TriggerSide, level: u8) -> Result<(), SinkError> {
        (**self).set_trigger(side, level)
    }

    fn set_button(&mut self, button: Button, pressed: bool) -> Result<(), SinkError> {
        (**self).set_button(button, pressed)
    }

    fn set_dpad(&mut self, direction: DpadDirection) -> Result<(), SinkError> {
        (**self).set_dpad(direction)
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        (**self).commit()
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        (**self).reset()
    }
}

/// Full output state as accumulated by the buffering sinks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PadReport {
    pub left_stick: Stick,
    pub right_stick: Stick,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub dpad: DpadDirection,
    /// Pressed buttons, in table order
    pub buttons: Vec<Button>,
}

impl PadReport {
    pub fn set_trigger(&mut self, side: TriggerSide, level: u8) {
        match side {
            TriggerSide::Left => self.left_trigger = level,
            TriggerSide::Right => self.right_trigger = level,
        }
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        let held = self.buttons.contains(&button);
        if pressed && !held {
            self.buttons.push(button);
            self.buttons.sort_by_key(|b| b.index());
        } else if !pressed && held {
            self.buttons.retain(|b| *b != button);
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == PadReport::default()
    }
}

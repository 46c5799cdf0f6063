//! MePS2 type definitions
//!
//! This module defines the basic data types used throughout the meps2 module,
//! including button and axis names, stick values and D-pad directions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque identifier of a device endpoint (serial port name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EndpointId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Analog axis carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    LX,
    LY,
    RX,
    RY,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::LX, Axis::LY, Axis::RX, Axis::RY];

    /// Vertical axes report up as positive, so the raw value is negated
    pub fn is_inverted(self) -> bool {
        matches!(self, Axis::LY | Axis::RY)
    }
}

/// Digital button carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Button {
    R1,
    R2,
    L1,
    L2,
    Mode,
    ButtonL,
    Triangle,
    XShaped,
    Square,
    Round,
    Start,
    Up,
    Down,
    Left,
    Right,
    Select,
    ButtonR,
}

impl Button {
    /// Protocol name of the button
    pub fn name(self) -> &'static str {
        match self {
            Button::R1 => "R1",
            Button::R2 => "R2",
            Button::L1 => "L1",
            Button::L2 => "L2",
            Button::Mode => "MODE",
            Button::ButtonL => "BUTTON_L",
            Button::Triangle => "TRIANGLE",
            Button::XShaped => "XSHAPED",
            Button::Square => "SQUARE",
            Button::Round => "ROUND",
            Button::Start => "START",
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
            Button::Select => "SELECT",
            Button::ButtonR => "BUTTON_R",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("Unknown button name: {0}")]
pub struct UnknownButton(pub String);

impl FromStr for Button {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::meps2::constants::BUTTON_TABLE
            .iter()
            .map(|(button, _, _)| *button)
            .find(|button| button.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

impl TryFrom<String> for Button {
    type Error = UnknownButton;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Button> for String {
    fn from(button: Button) -> Self {
        button.name().to_string()
    }
}

/// Scaled analog stick state (each axis in -255..=255)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stick {
    /// Horizontal axis (-255 = left, 255 = right)
    pub x: i16,

    /// Vertical axis (-255 = down, 255 = up)
    pub y: i16,
}

/// Trigger side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSide {
    Left,
    Right,
}

/// Eight-way D-pad direction plus neutral
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpadDirection {
    #[default]
    Neutral,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl DpadDirection {
    /// Combine the four D-pad bits; combinations outside the table are neutral
    pub fn from_flags(up: bool, down: bool, left: bool, right: bool) -> Self {
        match (up, down, left, right) {
            (true, false, false, false) => DpadDirection::North,
            (true, false, false, true) => DpadDirection::NorthEast,
            (false, false, false, true) => DpadDirection::East,
            (false, true, false, true) => DpadDirection::SouthEast,
            (false, true, false, false) => DpadDirection::South,
            (false, true, true, false) => DpadDirection::SouthWest,
            (false, false, true, false) => DpadDirection::West,
            (true, false, true, false) => DpadDirection::NorthWest,
            _ => DpadDirection::Neutral,
        }
    }
}

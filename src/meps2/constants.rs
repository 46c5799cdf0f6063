//! MePS2 protocol constants
//!
//! This module contains all the constants needed to talk to a MePS2 receiver:
//! - Frame layout and sync marker
//! - Analog axis positions and scaling limits
//! - The static button table shared by every session
//! - Timing defaults

use crate::meps2::types::{Axis, Button};

// ============================================================================
// Frame Layout
// ============================================================================

/// Total frame length, marker and checksum included
pub const FRAME_LEN: usize = 10;

/// First byte of the sync marker
pub const MARKER_HIGH: u8 = 0xFF;

/// Second byte of the sync marker
pub const MARKER_LOW: u8 = 0x55;

/// First payload position (LX)
pub const PAYLOAD_START: usize = 2;

/// Last payload position (RY)
pub const PAYLOAD_END: usize = 8;

/// Number of payload bytes covered by the checksum
pub const PAYLOAD_LEN: usize = PAYLOAD_END - PAYLOAD_START + 1;

/// Checksum position
pub const CHECKSUM_INDEX: usize = 9;

/// Cursor limit while hunting for a marker before the decoder forces a reset
pub const SYNC_WINDOW: usize = 12;

// ============================================================================
// Analog Axes
// ============================================================================

/// Raw value of a centered stick
pub const AXIS_CENTER: u8 = 0x80;

/// Largest magnitude reported for a scaled axis
pub const AXIS_LIMIT: i16 = 255;

/// Scaled magnitude from which an axis reports full scale
pub const AXIS_SNAP: i16 = 252;

/// Frame position of each analog axis
pub const AXIS_TABLE: [(Axis, usize); 4] = [
    (Axis::LX, 2),
    (Axis::LY, 4),
    (Axis::RX, 6),
    (Axis::RY, 8),
];

// ============================================================================
// Digital Buttons
// ============================================================================

/// Button name, frame position and bit mask
pub const BUTTON_TABLE: [(Button, usize, u8); 17] = [
    (Button::R1, 3, 0x01),
    (Button::R2, 3, 0x02),
    (Button::L1, 3, 0x04),
    (Button::L2, 3, 0x08),
    (Button::Mode, 3, 0x10),
    (Button::ButtonL, 3, 0x20),
    (Button::Triangle, 5, 0x01),
    (Button::XShaped, 5, 0x02),
    (Button::Square, 5, 0x04),
    (Button::Round, 5, 0x08),
    (Button::Start, 5, 0x10),
    (Button::Up, 7, 0x01),
    (Button::Down, 7, 0x02),
    (Button::Left, 7, 0x04),
    (Button::Right, 7, 0x08),
    (Button::Select, 7, 0x10),
    (Button::ButtonR, 7, 0x20),
];

/// Trigger level reported for a pressed L2/R2
pub const TRIGGER_FULL: u8 = 255;

// ============================================================================
// Timing Constants
// ============================================================================

/// Silence after which a session is considered stale (milliseconds)
pub const DEFAULT_STALE_TIMEOUT_MS: u64 = 200;

/// Interval between endpoint reconciliations (milliseconds)
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1000;

/// Interval between stale checks (milliseconds)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Default serial baud rate of the receiver
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

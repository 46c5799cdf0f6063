//! MePS2 controller state
//!
//! This module interprets validated frames: analog axis scaling, button
//! lookup through the shared button table, trigger and D-pad derivation,
//! and the silence timeout that returns a stalled device to neutral.
//!
//! Two snapshots are kept. `current` is the last decoded frame, `baseline`
//! is the last button state handed to a consumer. While the state is not
//! ready, button reads answer from the baseline so a poll between frames
//! never observes a release that did not happen.

use crate::meps2::constants::*;
use crate::meps2::decoder::Frame;
use crate::meps2::types::{Axis, Button, DpadDirection, Stick, TriggerSide};
use log::debug;
use std::time::{Duration, Instant};

const BUTTON_COUNT: usize = BUTTON_TABLE.len();

impl Button {
    /// Position of the button in [`BUTTON_TABLE`]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl Axis {
    fn index(self) -> usize {
        self as usize
    }
}

/// Scale a raw axis byte to -255..=255, inverting vertical axes.
///
/// The two outermost raw steps on either side land on full scale.
pub fn scale_axis(axis: Axis, raw: u8) -> i16 {
    let mut value = 2 * (raw as i16 - AXIS_CENTER as i16);
    if axis.is_inverted() {
        value = -value;
    }
    if value.abs() >= AXIS_SNAP {
        value.signum() * AXIS_LIMIT
    } else {
        value
    }
}

/// What happens to the baseline when a session goes stale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePolicy {
    /// Baseline is cleared with the live state; reads report all released
    #[default]
    Neutral,
    /// Baseline survives the timeout; reads keep the last known buttons
    HoldLastKnown,
}

/// Decoded controller state as of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSnapshot {
    axes: [u8; 4],
    buttons: [bool; BUTTON_COUNT],
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ControllerSnapshot {
    /// Sticks centered, nothing pressed
    pub fn neutral() -> Self {
        Self {
            axes: [AXIS_CENTER; 4],
            buttons: [false; BUTTON_COUNT],
        }
    }

    pub fn from_frame(frame: &Frame) -> Self {
        let mut snapshot = Self::neutral();
        for (axis, position) in AXIS_TABLE {
            snapshot.axes[axis.index()] = frame.byte(position);
        }
        for (button, position, mask) in BUTTON_TABLE {
            snapshot.buttons[button.index()] = frame.byte(position) & mask != 0;
        }
        snapshot
    }

    pub fn raw_axis(&self, axis: Axis) -> u8 {
        self.axes[axis.index()]
    }

    pub fn axis(&self, axis: Axis) -> i16 {
        scale_axis(axis, self.raw_axis(axis))
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons[button.index()]
    }

    pub fn left_stick(&self) -> Stick {
        Stick { x: self.axis(Axis::LX), y: self.axis(Axis::LY) }
    }

    pub fn right_stick(&self) -> Stick {
        Stick { x: self.axis(Axis::RX), y: self.axis(Axis::RY) }
    }

    /// L2/R2 are digital; pressed reports full scale
    pub fn trigger(&self, side: TriggerSide) -> u8 {
        let button = match side {
            TriggerSide::Left => Button::L2,
            TriggerSide::Right => Button::R2,
        };
        if self.button(button) { TRIGGER_FULL } else { 0 }
    }

    pub fn dpad(&self) -> DpadDirection {
        DpadDirection::from_flags(
            self.button(Button::Up),
            self.button(Button::Down),
            self.button(Button::Left),
            self.button(Button::Right),
        )
    }

    /// Differences going from `self` to `next`
    pub fn diff(&self, next: &ControllerSnapshot) -> StateDelta {
        let buttons = BUTTON_TABLE
            .iter()
            .map(|(button, _, _)| *button)
            .filter(|button| self.button(*button) != next.button(*button))
            .map(|button| (button, next.button(button)))
            .collect();

        StateDelta {
            buttons,
            axes_changed: self.axes != next.axes,
        }
    }
}

/// Changes produced by applying a frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    /// Buttons whose value changed, with their new value
    pub buttons: Vec<(Button, bool)>,
    /// Whether any raw axis byte moved
    pub axes_changed: bool,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty() && !self.axes_changed
    }
}

/// Live controller state for one device
#[derive(Debug, Clone)]
pub struct ControllerState {
    current: ControllerSnapshot,
    baseline: ControllerSnapshot,
    ready: bool,
    last_activity: Option<Instant>,
    timed_out: bool,
    stale_timeout: Duration,
    policy: StalePolicy,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_STALE_TIMEOUT_MS), StalePolicy::default())
    }
}

impl ControllerState {
    pub fn new(stale_timeout: Duration, policy: StalePolicy) -> Self {
        Self {
            current: ControllerSnapshot::neutral(),
            baseline: ControllerSnapshot::neutral(),
            ready: false,
            last_activity: None,
            timed_out: false,
            stale_timeout,
            policy,
        }
    }

    /// True once a valid frame has been applied and no timeout has happened since
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Live snapshot (last decoded frame, or neutral after a timeout)
    pub fn snapshot(&self) -> &ControllerSnapshot {
        &self.current
    }

    pub fn baseline(&self) -> &ControllerSnapshot {
        &self.baseline
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Record that bytes arrived
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
        self.timed_out = false;
    }

    /// Apply a validated frame
    pub fn apply(&mut self, frame: &Frame) -> StateDelta {
        let next = ControllerSnapshot::from_frame(frame);
        let delta = self.current.diff(&next);
        self.current = next;
        self.ready = true;
        delta
    }

    /// Scaled axis value; zero until ready
    pub fn read_axis(&self, axis: Axis) -> i16 {
        if !self.ready {
            return 0;
        }
        self.current.axis(axis)
    }

    /// Edge-correct button read.
    ///
    /// Not ready: the baseline is returned and left untouched. Ready: the
    /// live value is returned and copied into the baseline.
    pub fn read_button(&mut self, button: Button) -> bool {
        if !self.ready {
            return self.baseline.button(button);
        }
        let pressed = self.current.button(button);
        self.baseline.buttons[button.index()] = pressed;
        pressed
    }

    /// Reset to neutral if the silence window elapsed.
    ///
    /// Returns true only on the call that performs the reset.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_activity else {
            return false;
        };
        if self.timed_out || now.saturating_duration_since(last) < self.stale_timeout {
            return false;
        }

        debug!("No data for {:?}, resetting controller to neutral", self.stale_timeout);
        self.timed_out = true;
        self.ready = false;
        self.current = ControllerSnapshot::neutral();
        if self.policy == StalePolicy::Neutral {
            self.baseline = ControllerSnapshot::neutral();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(lx: u8, b3: u8, ly: u8, b5: u8, rx: u8, b7: u8, ry: u8) -> Frame {
        Frame::from_payload([lx, b3, ly, b5, rx, b7, ry])
    }

    #[test]
    fn test_button_table_matches_enum_order() {
        for (i, (button, _, _)) in BUTTON_TABLE.iter().enumerate() {
            assert_eq!(button.index(), i, "{} out of order", button);
        }
    }

    #[test]
    fn test_axis_scaling_limits() {
        assert_eq!(scale_axis(Axis::LX, 128), 0);
        assert_eq!(scale_axis(Axis::LX, 0), -255);
        assert_eq!(scale_axis(Axis::LX, 1), -255);
        assert_eq!(scale_axis(Axis::LX, 254), 255);
        assert_eq!(scale_axis(Axis::LX, 255), 255);
        assert_eq!(scale_axis(Axis::LX, 253), 250);
        assert_eq!(scale_axis(Axis::LX, 3), -250);
    }

    #[test]
    fn test_axis_snap_boundary() {
        // |2*(raw-128)| >= 252 is full scale: raw 2 and 254 snap, 3 and 253 do not
        assert_eq!(scale_axis(Axis::LX, 2), -255);
        assert_eq!(scale_axis(Axis::LX, 3), -250);
        assert_eq!(scale_axis(Axis::LX, 253), 250);
        assert_eq!(scale_axis(Axis::LX, 254), 255);
        assert_eq!(scale_axis(Axis::LY, 2), 255);
        assert_eq!(scale_axis(Axis::LY, 253), -250);
    }

    #[test]
    fn test_axis_scaling_is_monotonic_and_antisymmetric() {
        let mut previous = i16::MIN;
        for raw in 0..=255u8 {
            let x = scale_axis(Axis::RX, raw);
            assert!(x >= previous);
            assert_eq!(scale_axis(Axis::RY, raw), -x);
            previous = x;
        }
        for offset in 1..=127i16 {
            let up = scale_axis(Axis::LX, (128 + offset) as u8);
            let down = scale_axis(Axis::LX, (128 - offset) as u8);
            assert_eq!(up, -down);
        }
    }

    #[test]
    fn test_vertical_axes_are_inverted() {
        assert_eq!(scale_axis(Axis::LY, 0), 255);
        assert_eq!(scale_axis(Axis::LY, 1), 255);
        assert_eq!(scale_axis(Axis::LY, 255), -255);
        assert_eq!(scale_axis(Axis::RY, 192), -128);
        assert_eq!(scale_axis(Axis::RX, 192), 128);
    }

    #[test]
    fn test_sample_frame_buttons() {
        let mut state = ControllerState::default();
        let delta = state.apply(&frame(0x80, 0x01, 0x80, 0x02, 0x80, 0x04, 0x80));

        assert!(state.is_ready());
        for axis in Axis::ALL {
            assert_eq!(state.read_axis(axis), 0);
        }
        for (button, _, _) in BUTTON_TABLE {
            let expected = matches!(button, Button::R1 | Button::XShaped | Button::Left);
            assert_eq!(state.read_button(button), expected, "{}", button);
        }
        assert!(!delta.axes_changed);
        assert_eq!(
            delta.buttons,
            vec![(Button::R1, true), (Button::XShaped, true), (Button::Left, true)]
        );
    }

    #[test]
    fn test_triggers_and_dpad() {
        let snapshot = ControllerSnapshot::from_frame(&frame(0x80, 0x08, 0x80, 0, 0x80, 0x09, 0x80));
        assert_eq!(snapshot.trigger(TriggerSide::Left), 255);
        assert_eq!(snapshot.trigger(TriggerSide::Right), 0);
        assert_eq!(snapshot.dpad(), DpadDirection::NorthEast);

        let snapshot = ControllerSnapshot::from_frame(&frame(0x80, 0x02, 0x80, 0, 0x80, 0x03, 0x80));
        assert_eq!(snapshot.trigger(TriggerSide::Right), 255);
        assert_eq!(snapshot.dpad(), DpadDirection::Neutral);
    }

    #[test]
    fn test_not_ready_reads() {
        let mut state = ControllerState::default();
        assert!(!state.is_ready());
        assert_eq!(state.read_axis(Axis::LX), 0);
        assert!(!state.read_button(Button::Start));
    }

    #[test]
    fn test_held_button_survives_polling_between_frames() {
        let mut state = ControllerState::default();
        let start = Instant::now();
        state.touch(start);
        state.apply(&frame(0x80, 0, 0x80, 0x10, 0x80, 0, 0x80));

        // Repeated polls with no new frame inside the window keep reporting pressed
        for ms in [10, 50, 150, 199] {
            assert!(!state.check_timeout(start + Duration::from_millis(ms)));
            assert!(state.read_button(Button::Start));
        }
    }

    #[test]
    fn test_timeout_resets_to_neutral() {
        let mut state = ControllerState::default();
        let start = Instant::now();
        state.touch(start);
        state.apply(&frame(0x00, 0x3F, 0xFF, 0x1F, 0x10, 0x3F, 0xF0));
        for (button, _, _) in BUTTON_TABLE {
            assert!(state.read_button(button));
        }

        assert!(state.check_timeout(start + Duration::from_millis(200)));
        assert!(!state.is_ready());
        for axis in Axis::ALL {
            assert_eq!(state.read_axis(axis), 0);
        }
        for (button, _, _) in BUTTON_TABLE {
            assert!(!state.read_button(button));
        }
        assert_eq!(*state.snapshot(), ControllerSnapshot::neutral());

        // Only reported once per silence period
        assert!(!state.check_timeout(start + Duration::from_millis(400)));
    }

    #[test]
    fn test_hold_policy_keeps_baseline_through_timeout() {
        let mut state = ControllerState::new(Duration::from_millis(200), StalePolicy::HoldLastKnown);
        let start = Instant::now();
        state.touch(start);
        state.apply(&frame(0x80, 0x04, 0x80, 0, 0x80, 0, 0x80));
        assert!(state.read_button(Button::L1));

        assert!(state.check_timeout(start + Duration::from_millis(250)));
        assert!(!state.is_ready());
        assert!(state.read_button(Button::L1));
        assert!(!state.snapshot().button(Button::L1));

        // A fresh frame explicitly releases it
        state.touch(start + Duration::from_millis(300));
        state.apply(&frame(0x80, 0, 0x80, 0, 0x80, 0, 0x80));
        assert!(!state.read_button(Button::L1));
    }

    #[test]
    fn test_no_timeout_before_any_activity() {
        let mut state = ControllerState::default();
        assert!(!state.check_timeout(Instant::now() + Duration::from_secs(5)));
    }

    #[test]
    fn test_activity_rearms_timeout() {
        let mut state = ControllerState::default();
        let start = Instant::now();
        state.touch(start);
        assert!(state.check_timeout(start + Duration::from_millis(300)));
        state.touch(start + Duration::from_millis(310));
        assert!(!state.check_timeout(start + Duration::from_millis(400)));
        assert!(state.check_timeout(start + Duration::from_millis(510)));
    }

    #[test]
    fn test_diff_reports_axis_motion() {
        let a = ControllerSnapshot::neutral();
        let b = ControllerSnapshot::from_frame(&frame(0x81, 0, 0x80, 0, 0x80, 0, 0x80));
        let delta = a.diff(&b);
        assert!(delta.axes_changed);
        assert!(delta.buttons.is_empty());
        assert!(a.diff(&a).is_empty());
    }
}

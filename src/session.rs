//! Per-device session
//!
//! A session owns everything needed for one attached receiver: the frame
//! decoder, the controller state and the output sink. Bytes go in through
//! [`DeviceSession::on_bytes`], every valid frame is pushed to the sink as
//! one committed report, and [`DeviceSession::close`] leaves the sink
//! neutral before releasing it.

use crate::backend::{OutputSink, SinkError};
use crate::meps2::constants::{AXIS_LIMIT, BUTTON_TABLE, DEFAULT_STALE_TIMEOUT_MS};
use crate::meps2::controller::{ControllerSnapshot, ControllerState, StalePolicy};
use crate::meps2::decoder::{DecoderStats, FrameDecoder, FrameResult};
use crate::meps2::types::{Button, EndpointId, TriggerSide};
use log::{debug, info, trace, warn};
use std::time::{Duration, Instant};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, nothing received yet
    Opening,
    /// Receiving data
    Active,
    /// Silent for longer than the stale timeout; live state is neutral
    Stale,
    /// Torn down; the sink has been released
    Closed,
}

/// Per-session behaviour knobs
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub stale_timeout: Duration,
    pub stale_policy: StalePolicy,
    /// Fraction of full scale below which stick axes report zero
    pub stick_deadzone: f32,
    /// Button tapped on the sink when the session opens
    pub wake_button: Option<Button>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_millis(DEFAULT_STALE_TIMEOUT_MS),
            stale_policy: StalePolicy::Neutral,
            stick_deadzone: 0.0,
            wake_button: None,
        }
    }
}

/// One attached device
pub struct DeviceSession<S: OutputSink> {
    endpoint: EndpointId,
    state: SessionState,
    decoder: FrameDecoder,
    controller: ControllerState,
    sink: Option<S>,
    deadzone: i16,
    stale_policy: StalePolicy,
}

impl<S: OutputSink> DeviceSession<S> {
    pub fn new(endpoint: EndpointId, sink: S, options: &SessionOptions) -> Self {
        let deadzone = (options.stick_deadzone.clamp(0.0, 1.0) * AXIS_LIMIT as f32).round() as i16;
        let mut session = Self {
            endpoint,
            state: SessionState::Opening,
            decoder: FrameDecoder::new(),
            controller: ControllerState::new(options.stale_timeout, options.stale_policy),
            sink: Some(sink),
            deadzone,
            stale_policy: options.stale_policy,
        };
        if let Some(button) = options.wake_button {
            session.wake(button);
        }
        session
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn controller(&self) -> &ControllerState {
        &self.controller
    }

    /// Mutable access for edge-correct button reads
    pub fn controller_mut(&mut self) -> &mut ControllerState {
        &mut self.controller
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Feed bytes received from the transport. Returns the number of frames applied.
    pub fn on_bytes(&mut self, bytes: &[u8], now: Instant) -> usize {
        if self.is_closed() {
            trace!("[{}] dropping {} bytes after close", self.endpoint, bytes.len());
            return 0;
        }
        if bytes.is_empty() {
            return 0;
        }

        // A silence that no tick has observed yet still resets the decoder
        self.tick(now);
        self.controller.touch(now);
        if self.state != SessionState::Active {
            debug!("[{}] {:?} -> Active", self.endpoint, self.state);
            self.state = SessionState::Active;
        }

        let mut applied = 0;
        for &byte in bytes {
            match self.decoder.feed(byte) {
                FrameResult::Incomplete => {}
                FrameResult::Valid(frame) => {
                    let delta = self.controller.apply(&frame);
                    if !delta.buttons.is_empty() {
                        trace!("[{}] buttons changed: {:?}", self.endpoint, delta.buttons);
                    }
                    let snapshot = *self.controller.snapshot();
                    self.publish(&snapshot);
                    applied += 1;
                }
                FrameResult::ChecksumMismatch => {
                    trace!("[{}] checksum mismatch, frame dropped", self.endpoint);
                }
            }
        }
        applied
    }

    /// Check the silence timeout. Returns true when the session just went stale.
    ///
    /// Going stale drops any partial frame. Under [`StalePolicy::Neutral`] the
    /// sink also gets a neutral commit; under [`StalePolicy::HoldLastKnown`]
    /// it keeps the last committed report.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.state != SessionState::Active || !self.controller.check_timeout(now) {
            return false;
        }

        debug!("[{}] Active -> Stale", self.endpoint);
        self.state = SessionState::Stale;
        self.decoder.reset();
        if self.stale_policy == StalePolicy::Neutral {
            self.publish_neutral();
        }
        true
    }

    /// Tear the session down: neutral commit, then release the sink.
    ///
    /// Returns false if the session was already closed.
    pub fn close(&mut self, reason: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = SessionState::Closed;
        self.publish_neutral();
        drop(self.sink.take());

        let stats = self.decoder.stats();
        info!(
            "[{}] session closed ({}): {} frames, {} checksum errors, {} resyncs",
            self.endpoint, reason, stats.frames, stats.checksum_errors, stats.resyncs
        );
        true
    }

    fn deadzoned(&self, value: i16) -> i16 {
        if value.abs() < self.deadzone {
            0
        } else {
            value
        }
    }

    /// Push the full state, then commit once
    fn publish(&mut self, snapshot: &ControllerSnapshot) {
        let left = snapshot.left_stick();
        let right = snapshot.right_stick();
        let (lx, ly) = (self.deadzoned(left.x), self.deadzoned(left.y));
        let (rx, ry) = (self.deadzoned(right.x), self.deadzoned(right.y));

        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let endpoint = &self.endpoint;

        report(endpoint, "left stick", sink.set_left_stick(lx, ly));
        report(endpoint, "right stick", sink.set_right_stick(rx, ry));
        for side in [TriggerSide::Left, TriggerSide::Right] {
            report(endpoint, "trigger", sink.set_trigger(side, snapshot.trigger(side)));
        }
        for (button, _, _) in BUTTON_TABLE {
            report(endpoint, button.name(), sink.set_button(button, snapshot.button(button)));
        }
        report(endpoint, "dpad", sink.set_dpad(snapshot.dpad()));
        report(endpoint, "commit", sink.commit());
    }

    fn publish_neutral(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            report(&self.endpoint, "reset", sink.reset());
            report(&self.endpoint, "commit", sink.commit());
        }
    }

    fn wake(&mut self, button: Button) {
        debug!("[{}] waking sink with {}", self.endpoint, button);
        if let Some(sink) = self.sink.as_mut() {
            report(&self.endpoint, "wake", sink.set_button(button, true));
            report(&self.endpoint, "wake", sink.commit());
            report(&self.endpoint, "wake", sink.set_button(button, false));
            report(&self.endpoint, "wake", sink.commit());
        }
    }
}

impl<S: OutputSink> Drop for DeviceSession<S> {
    fn drop(&mut self) {
        self.close("dropped");
    }
}

/// Log a failed sink command; the caller carries on with the rest of the report
fn report(endpoint: &EndpointId, what: &str, result: Result<(), SinkError>) {
    if let Err(e) = result {
        warn!("[{}] sink command '{}' failed: {}", endpoint, what, e);
    }
}

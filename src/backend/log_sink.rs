//! Logging output sink.
//!
//! This sink logs committed controller state instead of driving a virtual
//! device. Only commits that change the published state are logged at info
//! level; repeats go to trace.

use crate::backend::{OutputSink, PadReport, SinkError};
use crate::meps2::types::{Button, DpadDirection, EndpointId, Stick, TriggerSide};
use log::{info, trace};

/// Sink that logs every state change of one device
#[derive(Debug)]
pub struct LogSink {
    endpoint: EndpointId,
    pending: PadReport,
    published: Option<PadReport>,
}

impl LogSink {
    pub fn new(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            pending: PadReport::default(),
            published: None,
        }
    }

    /// Last committed report
    pub fn published(&self) -> Option<&PadReport> {
        self.published.as_ref()
    }
}

impl OutputSink for LogSink {
    fn set_left_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError> {
        self.pending.left_stick = Stick { x, y };
        Ok(())
    }

    fn set_right_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError> {
        self.pending.right_stick = Stick { x, y };
        Ok(())
    }

    fn set_trigger(&mut self, side: TriggerSide, level: u8) -> Result<(), SinkError> {
        self.pending.set_trigger(side, level);
        Ok(())
    }

    fn set_button(&mut self, button: Button, pressed: bool) -> Result<(), SinkError> {
        self.pending.set_button(button, pressed);
        Ok(())
    }

    fn set_dpad(&mut self, direction: DpadDirection) -> Result<(), SinkError> {
        self.pending.dpad = direction;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        if self.published.as_ref() == Some(&self.pending) {
            trace!("[{}] unchanged", self.endpoint);
            return Ok(());
        }

        let r = &self.pending;
        let pressed: Vec<&str> = r.buttons.iter().map(|b| b.name()).collect();
        info!(
            "[{}] L=({:4},{:4}) R=({:4},{:4}) LT={:3} RT={:3} dpad={:?} buttons=[{}]",
            self.endpoint,
            r.left_stick.x,
            r.left_stick.y,
            r.right_stick.x,
            r.right_stick.y,
            r.left_trigger,
            r.right_trigger,
            r.dpad,
            pressed.join(" ")
        );
        self.published = Some(self.pending.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sink_publishes_on_commit() {
        let mut sink = LogSink::new(EndpointId::from("COM3"));
        sink.set_button(Button::Round, true).unwrap();
        sink.set_trigger(TriggerSide::Right, 255).unwrap();
        assert!(sink.published().is_none());

        sink.commit().unwrap();
        let published = sink.published().unwrap();
        assert_eq!(published.buttons, vec![Button::Round]);
        assert_eq!(published.right_trigger, 255);

        sink.reset().unwrap();
        sink.commit().unwrap();
        assert!(sink.published().unwrap().is_neutral());
    }
}

//! JSON-lines output sink.
//!
//! Every commit writes one JSON object describing the full controller state,
//! so another process can consume the bridge output from a pipe.

use crate::backend::{OutputSink, PadReport, SinkError};
use crate::meps2::types::{Button, DpadDirection, EndpointId, Stick, TriggerSide};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonLine<'a> {
    endpoint: &'a EndpointId,
    seq: u64,
    #[serde(flatten)]
    report: &'a PadReport,
}

/// Sink writing one JSON object per commit
pub struct JsonSink<W: Write> {
    endpoint: EndpointId,
    writer: W,
    pending: PadReport,
    seq: u64,
}

impl JsonSink<std::io::Stdout> {
    /// Sink writing to the process stdout
    pub fn stdout(endpoint: EndpointId) -> Self {
        Self::new(endpoint, std::io::stdout())
    }
}

impl<W: Write> JsonSink<W> {
    pub fn new(endpoint: EndpointId, writer: W) -> Self {
        Self {
            endpoint,
            writer,
            pending: PadReport::default(),
            seq: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for JsonSink<W> {
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
        let line = serde_json::to_string(&JsonLine {
            endpoint: &self.endpoint,
            seq: self.seq,
            report: &self.pending,
        })?;
        // One write per line so concurrent sinks on stdout do not interleave
        self.writer.write_all(format!("{}\n", line).as_bytes())?;
        self.writer.flush()?;
        self.seq += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sink_writes_one_line_per_commit() {
        let mut sink = JsonSink::new(EndpointId::from("/dev/ttyUSB0"), Vec::new());
        sink.set_left_stick(255, -255).unwrap();
        sink.set_button(Button::ButtonL, true).unwrap();
        sink.set_dpad(DpadDirection::SouthWest).unwrap();
        sink.commit().unwrap();
        sink.reset().unwrap();
        sink.commit().unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["endpoint"], "/dev/ttyUSB0");
        assert_eq!(lines[0]["seq"], 0);
        assert_eq!(lines[0]["left_stick"]["x"], 255);
        assert_eq!(lines[0]["left_stick"]["y"], -255);
        assert_eq!(lines[0]["dpad"], "southwest");
        assert_eq!(lines[0]["buttons"][0], "BUTTON_L");
        assert_eq!(lines[1]["seq"], 1);
        assert_eq!(lines[1]["buttons"].as_array().unwrap().len(), 0);
    }
}

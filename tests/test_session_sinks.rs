//! Integration tests driving sessions into each sink through the public API

use meps2_bridge::backend::{JsonSink, LogSink, MockSink, SinkCommand};
use meps2_bridge::meps2::{Axis, Button, Frame, TriggerSide};
use meps2_bridge::{DeviceSession, EndpointId, SessionOptions, SessionState};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

/// Left stick full right, L2 and UP held
fn frame() -> Frame {
    Frame::from_payload([0xFF, 0x08, 0x80, 0x00, 0x80, 0x01, 0x80])
}

#[test]
fn test_session_into_mock_sink() {
    init_logger();

    let sink = MockSink::new();
    let handle = sink.handle();
    let mut session = DeviceSession::new(EndpointId::from("COM3"), sink, &SessionOptions::default());

    // Split across reads, with line noise in front
    let bytes = frame().to_bytes();
    let now = Instant::now();
    assert_eq!(session.on_bytes(&[0x00, 0x13, 0xFF], now), 0);
    assert_eq!(session.on_bytes(&bytes[..4], now), 0);
    assert_eq!(session.on_bytes(&bytes[4..], now), 1);

    let report = handle.last_report().unwrap();
    assert_eq!(report.left_stick.x, 255);
    assert_eq!(report.left_trigger, 255);
    assert_eq!(report.right_trigger, 0);
    assert_eq!(report.buttons, vec![Button::L2, Button::Up]);
    assert!(handle.commands().contains(&SinkCommand::Trigger(TriggerSide::Left, 255)));

    assert_eq!(session.controller().read_axis(Axis::LX), 255);
    assert!(session.controller_mut().read_button(Button::L2));

    drop(session);
    assert!(handle.is_released());
    assert!(handle.last_report().unwrap().is_neutral());
}

#[test]
fn test_session_into_log_sink() {
    init_logger();

    let mut session = DeviceSession::new(
        EndpointId::from("COM4"),
        LogSink::new(EndpointId::from("COM4")),
        &SessionOptions::default(),
    );
    let start = Instant::now();
    session.on_bytes(&frame().to_bytes(), start);
    let published = session.sink().unwrap().published().unwrap();
    assert_eq!(published.buttons, vec![Button::L2, Button::Up]);

    assert!(session.tick(start + Duration::from_millis(250)));
    assert_eq!(session.state(), SessionState::Stale);
    assert!(session.sink().unwrap().published().unwrap().is_neutral());
}

/// Writer whose contents outlive the sink that owns it
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_session_into_json_sink() {
    init_logger();

    let buf = SharedBuf::default();
    let endpoint = EndpointId::from("/dev/ttyACM0");
    let mut session = DeviceSession::new(
        endpoint.clone(),
        JsonSink::new(endpoint, buf.clone()),
        &SessionOptions::default(),
    );
    let mut bytes = Vec::new();
    for _ in 0..3 {
        bytes.extend_from_slice(&frame().to_bytes());
    }
    assert_eq!(session.on_bytes(&bytes, Instant::now()), 3);
    session.close("test over");

    let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    // Three frames plus the neutral report on close
    assert_eq!(lines.len(), 4);
    for (seq, line) in lines.iter().enumerate() {
        assert_eq!(line["endpoint"], "/dev/ttyACM0");
        assert_eq!(line["seq"], seq as u64);
    }
    assert_eq!(lines[0]["left_trigger"], 255);
    assert_eq!(lines[2]["buttons"], serde_json::json!(["L2", "UP"]));
    assert_eq!(lines[3]["left_trigger"], 0);
    assert_eq!(lines[3]["dpad"], "neutral");
}

//! Mock output sink for testing.
//!
//! This sink records every command instead of driving a real virtual
//! controller. A [`MockHandle`] obtained before the sink is handed off keeps
//! the record readable after the sink has been dropped.

use crate::backend::{OutputSink, PadReport, SinkError};
use crate::meps2::types::{Button, DpadDirection, Stick, TriggerSide};
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded sink call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCommand {
    LeftStick(i16, i16),
    RightStick(i16, i16),
    Trigger(TriggerSide, u8),
    Button(Button, bool),
    Dpad(DpadDirection),
    Commit,
    /// The sink was dropped
    Released,
}

#[derive(Debug, Default)]
struct MockRecord {
    commands: Vec<SinkCommand>,
    pending: PadReport,
    committed: Vec<PadReport>,
    fail_buttons: bool,
    fail_commit: bool,
}

/// Recording sink
#[derive(Debug, Default)]
pub struct MockSink {
    record: Arc<Mutex<MockRecord>>,
}

/// Read side of a [`MockSink`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    record: Arc<Mutex<MockRecord>>,
}

fn lock(record: &Arc<Mutex<MockRecord>>) -> MutexGuard<'_, MockRecord> {
    // A panicking test thread must not hide the record from the others
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle { record: Arc::clone(&self.record) }
    }

    /// Make every `set_button` call fail
    pub fn fail_buttons(&self, fail: bool) {
        lock(&self.record).fail_buttons = fail;
    }

    /// Make every `commit` call fail
    pub fn fail_commit(&self, fail: bool) {
        lock(&self.record).fail_commit = fail;
    }

    pub fn last_report(&self) -> Option<PadReport> {
        self.handle().last_report()
    }

    fn push(&self, command: SinkCommand) {
        lock(&self.record).commands.push(command);
    }
}

impl MockHandle {
    /// Every recorded command, oldest first
    pub fn commands(&self) -> Vec<SinkCommand> {
        lock(&self.record).commands.clone()
    }

    pub fn commit_count(&self) -> usize {
        lock(&self.record).committed.len()
    }

    /// Reports published by each commit, oldest first
    pub fn reports(&self) -> Vec<PadReport> {
        lock(&self.record).committed.clone()
    }

    pub fn last_report(&self) -> Option<PadReport> {
        lock(&self.record).committed.last().cloned()
    }

    pub fn is_released(&self) -> bool {
        lock(&self.record).commands.contains(&SinkCommand::Released)
    }
}

impl OutputSink for MockSink {
    fn set_left_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError> {
        lock(&self.record).pending.left_stick = Stick { x, y };
        self.push(SinkCommand::LeftStick(x, y));
        Ok(())
    }

    fn set_right_stick(&mut self, x: i16, y: i16) -> Result<(), SinkError> {
        lock(&self.record).pending.right_stick = Stick { x, y };
        self.push(SinkCommand::RightStick(x, y));
        Ok(())
    }

    fn set_trigger(&mut self, side: TriggerSide, level: u8) -> Result<(), SinkError> {
        lock(&self.record).pending.set_trigger(side, level);
        self.push(SinkCommand::Trigger(side, level));
        Ok(())
    }

    fn set_button(&mut self, button: Button, pressed: bool) -> Result<(), SinkError> {
        let mut record = lock(&self.record);
        if record.fail_buttons {
            return Err(SinkError::Operation(format!("injected failure on {}", button)));
        }
        record.pending.set_button(button, pressed);
        record.commands.push(SinkCommand::Button(button, pressed));
        Ok(())
    }

    fn set_dpad(&mut self, direction: DpadDirection) -> Result<(), SinkError> {
        lock(&self.record).pending.dpad = direction;
        self.push(SinkCommand::Dpad(direction));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        let mut record = lock(&self.record);
        if record.fail_commit {
            return Err(SinkError::Operation("injected commit failure".to_string()));
        }
        let report = record.pending.clone();
        debug!("[MOCK SINK] Commit: {:?}", report);
        record.committed.push(report);
        record.commands.push(SinkCommand::Commit);
        Ok(())
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.push(SinkCommand::Released);
    }
}

//! MePS2 frame decoder
//!
//! Turns the receiver's unbounded byte stream into validated frames. The
//! stream is consumed one byte at a time; the only lookahead kept is the
//! previous byte, which is enough to spot the `FF 55` marker.

use crate::meps2::constants::*;
use log::trace;

/// A checksum-validated frame (payload positions 2..=8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    /// Build a frame from the seven payload bytes
    pub fn from_payload(payload: [u8; PAYLOAD_LEN]) -> Self {
        Self { payload }
    }

    /// Payload bytes, positions 2..=8
    pub fn payload(&self) -> &[u8; PAYLOAD_LEN] {
        &self.payload
    }

    /// Byte at a frame position (2..=8)
    pub fn byte(&self, position: usize) -> u8 {
        self.payload[position - PAYLOAD_START]
    }

    /// Checksum over a payload
    pub fn checksum(payload: &[u8]) -> u8 {
        payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
    }

    /// Wire representation: marker, payload, checksum
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = MARKER_HIGH;
        bytes[1] = MARKER_LOW;
        bytes[PAYLOAD_START..=PAYLOAD_END].copy_from_slice(&self.payload);
        bytes[CHECKSUM_INDEX] = Self::checksum(&self.payload);
        bytes
    }
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameResult {
    /// No complete frame yet
    Incomplete,
    /// A frame arrived and its checksum matched
    Valid(Frame),
    /// A frame arrived with a bad checksum and was discarded
    ChecksumMismatch,
}

/// Counters kept by a decoder since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub checksum_errors: u64,
    pub resyncs: u64,
}

/// Per-connection byte-stream state machine
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    buffer: [u8; FRAME_LEN],
    index: usize,
    prev: u8,
    in_frame: bool,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            buffer: [0; FRAME_LEN],
            index: 0,
            prev: 0,
            in_frame: false,
            stats: DecoderStats::default(),
        }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a marker has been seen and a frame is being accumulated
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any partial frame and forget the previous byte.
    ///
    /// Counters are kept.
    pub fn reset(&mut self) {
        self.buffer = [0; FRAME_LEN];
        self.index = 0;
        self.prev = 0;
        self.in_frame = false;
    }

    /// Feed one byte
    pub fn feed(&mut self, byte: u8) -> FrameResult {
        if byte == MARKER_LOW && !self.in_frame && self.prev == MARKER_HIGH {
            self.index = 1;
            self.in_frame = true;
        } else {
            self.prev = byte;
            if self.in_frame {
                self.buffer[self.index] = byte;
            }
        }

        self.index += 1;

        if !self.in_frame && self.index > SYNC_WINDOW {
            trace!("No marker within {} bytes, resyncing", SYNC_WINDOW);
            self.index = 0;
            self.stats.resyncs += 1;
            FrameResult::Incomplete
        } else if self.in_frame && self.index > CHECKSUM_INDEX {
            self.in_frame = false;
            self.index = 0;

            let payload = &self.buffer[PAYLOAD_START..=PAYLOAD_END];
            if Frame::checksum(payload) == self.buffer[CHECKSUM_INDEX] {
                self.stats.frames += 1;
                let mut bytes = [0u8; PAYLOAD_LEN];
                bytes.copy_from_slice(payload);
                FrameResult::Valid(Frame::from_payload(bytes))
            } else {
                // The byte that broke the frame must not pair with a following 0x55
                self.prev = 0;
                self.stats.checksum_errors += 1;
                FrameResult::ChecksumMismatch
            }
        } else {
            FrameResult::Incomplete
        }
    }

    /// Feed a chunk, handing every non-incomplete result to `on_result` in order
    pub fn feed_all<F>(&mut self, bytes: &[u8], mut on_result: F)
    where
        F: FnMut(FrameResult),
    {
        for &byte in bytes {
            match self.feed(byte) {
                FrameResult::Incomplete => {}
                result => on_result(result),
            }
        }
    }
}

//! Framing and validation of raw receive chunks.
//!
//! A [`PacketHandler`] turns the raw bytes the receive loop pulls off the
//! UART into accepted payloads in the ring buffer. Partial frames are kept
//! across calls.

use log::{debug, warn};

use crate::command::{self, END, FRAME_OVERHEAD, HEADER, TYPE_TAG_NOTICE};
use crate::ring_buffer::RingProducer;
use crate::types::{TagInfo, Trigger};

/// Upper bound on bytes kept while waiting for a frame to complete
pub const MAX_PENDING: usize = 1024;

/// Summary of the frames accepted from one raw chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accepted {
    /// Number of frames whose payload went into the ring
    pub frames: u32,
    /// Payload length of the last accepted frame
    pub last_len: usize,
}

impl Accepted {
    pub(crate) fn record(&mut self, len: usize) {
        self.frames += 1;
        self.last_len = len;
    }
}

/// Protocol-specific framer driven by the receive loop.
pub trait PacketHandler: Send + 'static {
    /// Consume `raw`, writing the payload of every complete, valid frame
    /// that matches `trigger` into `ring`.
    fn handle(&mut self, ring: &mut RingProducer, trigger: Trigger, raw: &[u8]) -> Accepted;
}

/// Write `payload` only if it fits whole.
pub(crate) fn push_payload(ring: &mut RingProducer, payload: &[u8]) -> bool {
    if ring.free() < payload.len() {
        warn!(
            "Ring buffer full, dropping {} byte payload ({} bytes free)",
            payload.len(),
            ring.free()
        );
        return false;
    }
    ring.write(payload) == payload.len()
}

/// Drop everything before the next header byte at or after `from`.
pub(crate) fn resync(pending: &mut Vec<u8>, from: usize, header: u8) {
    match pending[from..].iter().position(|&b| b == header) {
        Some(offset) => {
            pending.drain(..from + offset);
        }
        None => pending.clear(),
    }
}

/// Length an M100 frame starting at `bytes[0]` claims, header to end byte.
fn declared_len(bytes: &[u8]) -> usize {
    FRAME_OVERHEAD + u16::from_be_bytes([bytes[3], bytes[4]]) as usize
}

/// Length of the complete, well-formed M100 frame at the start of `bytes`.
fn complete_frame(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < FRAME_OVERHEAD || bytes[0] != HEADER {
        return None;
    }
    let frame_len = declared_len(bytes);
    if frame_len > MAX_PENDING || bytes.len() < frame_len {
        return None;
    }
    let checksum = command::frame_checksum(&bytes[1..frame_len - 2]);
    (bytes[frame_len - 1] == END && bytes[frame_len - 2] == checksum).then_some(frame_len)
}

/// Handler for the MagicRF M100 frame grammar.
#[derive(Debug, Default)]
pub struct M100PacketHandler {
    pending: Vec<u8>,
}

impl M100PacketHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn matches(trigger: Trigger, frame: &[u8]) -> bool {
        let (frame_type, cmd) = (frame[1], frame[2]);
        match trigger {
            Trigger::Query => frame_type == TYPE_TAG_NOTICE && cmd == trigger.code(),
            _ => cmd == trigger.code(),
        }
    }
}

impl PacketHandler for M100PacketHandler {
    fn handle(&mut self, ring: &mut RingProducer, trigger: Trigger, raw: &[u8]) -> Accepted {
        let mut accepted = Accepted::default();
        self.pending.extend_from_slice(raw);

        loop {
            resync(&mut self.pending, 0, HEADER);
            if self.pending.len() < FRAME_OVERHEAD {
                break;
            }

            let frame_len = declared_len(&self.pending);
            if frame_len > MAX_PENDING {
                warn!("Frame length {} exceeds limit, resynchronising", frame_len);
                resync(&mut self.pending, 1, HEADER);
                continue;
            }
            if self.pending.len() < frame_len {
                // Skip a stray header whose claimed frame hides complete ones
                let skip = (1..self.pending.len())
                    .find(|&at| complete_frame(&self.pending[at..]).is_some());
                match skip {
                    Some(at) => {
                        warn!("Skipping {} bytes of unterminated frame", at);
                        self.pending.drain(..at);
                        continue;
                    }
                    None => break,
                }
            }

            if complete_frame(&self.pending).is_none() {
                warn!("Discarding corrupt frame start: {:02X?}", &self.pending[..5]);
                resync(&mut self.pending, 1, HEADER);
                continue;
            }

            let frame = &self.pending[..frame_len];
            let payload = &frame[5..frame_len - 2];
            if !Self::matches(trigger, frame) {
                debug!(
                    "Ignoring frame type 0x{:02X} cmd 0x{:02X} while armed for {:?}",
                    frame[1], frame[2], trigger
                );
            } else if trigger == Trigger::Query && TagInfo::from_notice(payload).is_none() {
                warn!("Tag notice failed EPC CRC check: {:02X?}", payload);
            } else if push_payload(ring, payload) {
                debug!("Accepted {} byte payload for {:?}", payload.len(), trigger);
                accepted.record(payload.len());
            }

            self.pending.drain(..frame_len);
        }

        accepted
    }
}

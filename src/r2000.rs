//! Impinj R2000 module frames.
//!
//! `A0 | len | address | cmd | data | lrc`, where `len` counts the bytes
//! after itself and the LRC makes the checksum of the whole frame zero.

use log::{debug, warn};

use crate::checksum::lrc;
use crate::packet::{push_payload, resync, Accepted, PacketHandler};
use crate::ring_buffer::RingProducer;
use crate::types::{ReaderError, Trigger};

pub const HEADER: u8 = 0xA0;

/// Address that every R2000 module answers to
pub const BROADCAST_ADDRESS: u8 = 0xFF;

// Command codes
pub const RESET: u8 = 0x70;
pub const GET_FIRMWARE_VERSION: u8 = 0x72;
pub const SET_WORK_ANTENNA: u8 = 0x74;
pub const SET_RF_POWER: u8 = 0x76;
pub const GET_RF_POWER: u8 = 0x77;
pub const REAL_TIME_INVENTORY: u8 = 0x89;

pub const MAX_ANTENNA: u8 = 3;
pub const MAX_RF_POWER_DBM: u8 = 33;

/// Frame `data` for `command` addressed to `address`.
pub fn frame(address: u8, command: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + data.len());
    out.extend_from_slice(&[HEADER, (3 + data.len()) as u8, address, command]);
    out.extend_from_slice(data);
    out.push(lrc(&out));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R2000Command {
    Reset,
    GetFirmwareVersion,
    SetWorkAntenna(u8),
    /// Per-antenna output power in dBm
    SetRfPower([u8; 4]),
    GetRfPower,
    /// Inventory with tags reported as they are seen
    RealTimeInventory { repeat: u8 },
}

impl R2000Command {
    pub fn set_work_antenna(antenna: u8) -> Result<Self, ReaderError> {
        if antenna > MAX_ANTENNA {
            return Err(ReaderError::InvalidArgument(format!(
                "antenna {} out of range 0-{}",
                antenna, MAX_ANTENNA
            )));
        }
        Ok(R2000Command::SetWorkAntenna(antenna))
    }

    pub fn set_rf_power(dbm: [u8; 4]) -> Result<Self, ReaderError> {
        if let Some(bad) = dbm.iter().find(|&&p| p > MAX_RF_POWER_DBM) {
            return Err(ReaderError::InvalidArgument(format!(
                "RF power {} dBm exceeds maximum of {} dBm",
                bad, MAX_RF_POWER_DBM
            )));
        }
        Ok(R2000Command::SetRfPower(dbm))
    }

    pub fn encode(&self, address: u8) -> Vec<u8> {
        match *self {
            R2000Command::Reset => frame(address, RESET, &[]),
            R2000Command::GetFirmwareVersion => frame(address, GET_FIRMWARE_VERSION, &[]),
            R2000Command::SetWorkAntenna(antenna) => frame(address, SET_WORK_ANTENNA, &[antenna]),
            R2000Command::SetRfPower(dbm) => frame(address, SET_RF_POWER, &dbm),
            R2000Command::GetRfPower => frame(address, GET_RF_POWER, &[]),
            R2000Command::RealTimeInventory { repeat } => {
                frame(address, REAL_TIME_INVENTORY, &[repeat])
            }
        }
    }
}

/// Framer for R2000 responses.
///
/// Accepted frames contribute `cmd | data` to the ring. The trigger is not
/// used to filter since R2000 responses carry their own command code.
#[derive(Debug)]
pub struct R2000PacketHandler {
    address: u8,
    pending: Vec<u8>,
}

impl R2000PacketHandler {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            pending: Vec::new(),
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn accept(&self, ring: &mut RingProducer, frame: &[u8], accepted: &mut Accepted) {
        if frame[2] != self.address && self.address != BROADCAST_ADDRESS {
            debug!("Ignoring frame for address 0x{:02X}", frame[2]);
            return;
        }

        let payload = &frame[3..frame.len() - 1];
        if push_payload(ring, payload) {
            debug!("Accepted R2000 response 0x{:02X}", frame[3]);
            accepted.record(payload.len());
        }
    }
}

impl PacketHandler for R2000PacketHandler {
    fn handle(&mut self, ring: &mut RingProducer, _trigger: Trigger, raw: &[u8]) -> Accepted {
        let mut accepted = Accepted::default();
        self.pending.extend_from_slice(raw);

        loop {
            resync(&mut self.pending, 0, HEADER);
            if self.pending.len() < 2 {
                break;
            }

            let len = self.pending[1] as usize;
            if len < 3 {
                warn!("Invalid R2000 length byte 0x{:02X}", len);
                resync(&mut self.pending, 1, HEADER);
                continue;
            }
            let frame_len = len + 2;
            if self.pending.len() < frame_len {
                break;
            }
            if lrc(&self.pending[..frame_len]) != 0 {
                warn!(
                    "Discarding R2000 frame with bad checksum: {:02X?}",
                    &self.pending[..frame_len]
                );
                resync(&mut self.pending, 1, HEADER);
                continue;
            }

            let frame: Vec<u8> = self.pending.drain(..frame_len).collect();
            self.accept(ring, &frame, &mut accepted);
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::ring_buffer;

    #[test]
    fn test_reset_frame() {
        assert_eq!(R2000Command::Reset.encode(0x01), [0xA0, 0x03, 0x01, 0x70, 0xEC]);
    }

    #[test]
    fn test_frames_have_zero_lrc() {
        let commands = [
            R2000Command::GetFirmwareVersion,
            R2000Command::set_work_antenna(2).unwrap(),
            R2000Command::set_rf_power([20, 21, 20, 20]).unwrap(),
            R2000Command::GetRfPower,
            R2000Command::RealTimeInventory { repeat: 0xFF },
        ];
        for command in commands {
            let frame = command.encode(BROADCAST_ADDRESS);
            assert_eq!(frame[0], HEADER);
            assert_eq!(frame[1] as usize, frame.len() - 2);
            assert_eq!(lrc(&frame), 0, "{:?}", command);
        }
    }

    #[test]
    fn test_argument_ranges() {
        assert!(matches!(R2000Command::set_work_antenna(4), Err(ReaderError::InvalidArgument(_))));
        assert!(matches!(
            R2000Command::set_rf_power([20, 34, 20, 20]),
            Err(ReaderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_handler_accepts_split_frame() {
        let (mut tx, mut rx) = ring_buffer(64);
        let mut handler = R2000PacketHandler::new(0x01);
        let response = frame(0x01, SET_WORK_ANTENNA, &[0x10]);

        assert_eq!(handler.handle(&mut tx, Trigger::Query, &response[..3]).frames, 0);
        let accepted = handler.handle(&mut tx, Trigger::Query, &response[3..]);

        assert_eq!(accepted, Accepted { frames: 1, last_len: 2 });
        assert_eq!(rx.read(64), vec![SET_WORK_ANTENNA, 0x10]);
    }

    #[test]
    fn test_handler_filters_address_and_checksum() {
        let (mut tx, mut rx) = ring_buffer(64);
        let mut handler = R2000PacketHandler::new(0x01);

        let other = frame(0x02, GET_RF_POWER, &[20]);
        let mut corrupt = frame(0x01, GET_RF_POWER, &[20]);
        corrupt[4] = 21;
        let good = frame(0x01, GET_RF_POWER, &[22]);

        let mut chunk = vec![0x00, 0x55];
        chunk.extend_from_slice(&other);
        chunk.extend_from_slice(&corrupt);
        chunk.extend_from_slice(&good);
        let accepted = handler.handle(&mut tx, Trigger::Query, &chunk);

        assert_eq!(accepted.frames, 1);
        assert_eq!(rx.read(64), vec![GET_RF_POWER, 22]);
    }

    #[test]
    fn test_frame_inside_corrupt_span_is_recovered() {
        let (mut tx, mut rx) = ring_buffer(64);
        let mut handler = R2000PacketHandler::new(0x01);
        let good = frame(0x01, GET_RF_POWER, &[0x16]);

        // Truncated frame whose claimed length swallows the start of `good`
        let mut chunk = vec![HEADER, 0x06, 0x01, GET_RF_POWER];
        chunk.extend_from_slice(&good);
        let accepted = handler.handle(&mut tx, Trigger::Query, &chunk);

        assert_eq!(accepted.frames, 1);
        assert_eq!(rx.read(64), vec![GET_RF_POWER, 0x16]);
        assert_eq!(handler.pending(), 0);
    }
}

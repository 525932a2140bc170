//! Types for reader operations

use core::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

use crate::checksum::epc16;

/// Errors that can occur during reader operations
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Invalid argument passed to a function; raised before any UART I/O
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Transport layer error while setting up the UART
    #[error("transport error: {0}")]
    Transport(String),
    /// The background receive task could not be spawned
    #[error("can't create receive task: {0}")]
    TaskCreation(String),
}

/// Which response the next frames from the reader are expected to be.
///
/// The discriminant is the command code carried by the matching response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Trigger {
    /// Tag notices produced by an inventory (query) round
    Query = 0x22,
    /// Transmit power reading
    PaPower = 0xB7,
    /// Acknowledgement of a stop command
    Stop = 0x28,
    /// Channel RSSI scan result
    Rssi = 0xF3,
}

impl Trigger {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Trigger {
    type Error = ReaderError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x22 => Ok(Trigger::Query),
            0xB7 => Ok(Trigger::PaPower),
            0x28 => Ok(Trigger::Stop),
            0xF3 => Ok(Trigger::Rssi),
            other => Err(ReaderError::InvalidArgument(format!(
                "unknown trigger code: 0x{:02X}",
                other
            ))),
        }
    }
}

/// Trigger shared between the caller and the receive loop.
///
/// Single byte, so a store is never observed half-written.
#[derive(Debug)]
pub struct AtomicTrigger(AtomicU8);

impl AtomicTrigger {
    pub fn new(trigger: Trigger) -> Self {
        Self(AtomicU8::new(trigger.code()))
    }

    pub fn store(&self, trigger: Trigger) {
        self.0.store(trigger.code(), Ordering::Release);
    }

    pub fn load(&self) -> Trigger {
        // Only valid codes are ever stored
        Trigger::try_from(self.0.load(Ordering::Acquire)).unwrap_or(Trigger::Query)
    }
}

/// Reader demodulation mode, passed to [`crate::Reader::mode`]
pub const MODE_HIGH_SENSITIVITY: u8 = 0x00;
pub const MODE_DENSE_READER: u8 = 0x01;

/// Sel field of the Gen2 Query command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QuerySel {
    #[default]
    All = 0,
    /// Tags with SL deasserted
    Nsl = 2,
    /// Tags with SL asserted
    Sl = 3,
}

impl TryFrom<u32> for QuerySel {
    type Error = ReaderError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 | 1 => Ok(QuerySel::All),
            2 => Ok(QuerySel::Nsl),
            3 => Ok(QuerySel::Sl),
            other => Err(ReaderError::InvalidArgument(format!("invalid query select: {}", other))),
        }
    }
}

/// Inventory session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QuerySession {
    #[default]
    S0 = 0,
    S1 = 1,
    S2 = 2,
    S3 = 3,
}

impl TryFrom<u32> for QuerySession {
    type Error = ReaderError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QuerySession::S0),
            1 => Ok(QuerySession::S1),
            2 => Ok(QuerySession::S2),
            3 => Ok(QuerySession::S3),
            other => Err(ReaderError::InvalidArgument(format!("invalid query session: {}", other))),
        }
    }
}

/// Inventoried flag targeted by the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QueryTarget {
    #[default]
    A = 0,
    B = 1,
}

impl TryFrom<u32> for QueryTarget {
    type Error = ReaderError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QueryTarget::A),
            1 => Ok(QueryTarget::B),
            other => Err(ReaderError::InvalidArgument(format!("invalid query target: {}", other))),
        }
    }
}

/// Parameters of the Gen2 Query command used during inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParams {
    pub sel: QuerySel,
    pub session: QuerySession,
    pub target: QueryTarget,
    /// Slot count exponent, 0-15
    pub q: u8,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            sel: QuerySel::All,
            session: QuerySession::S0,
            target: QueryTarget::A,
            q: 4,
        }
    }
}

impl QueryParams {
    /// Build from raw integers, validating every field.
    pub fn new(select: u32, session: u32, target: u32, q: u32) -> Result<Self, ReaderError> {
        if q > 15 {
            return Err(ReaderError::InvalidArgument(format!("Q value must be 0-15, got {}", q)));
        }

        Ok(Self {
            sel: QuerySel::try_from(select)?,
            session: QuerySession::try_from(session)?,
            target: QueryTarget::try_from(target)?,
            q: q as u8,
        })
    }

    /// Encode as `DR(1) M(2) TRext(1) Sel(2) Session(2) | Target(1) Q(4) 000`
    /// with DR=0, M=0 (FM0) and TRext=1.
    pub fn to_bytes(&self) -> [u8; 2] {
        let msb = 0x10 | ((self.sel as u8) << 2) | (self.session as u8);
        let lsb = ((self.target as u8) << 7) | ((self.q & 0x0F) << 3);
        [msb, lsb]
    }
}

/// Information about a detected RFID tag
#[derive(Debug, Clone)]
pub struct TagInfo {
    pub epc: String,
    pub rssi: u8,
    pub pc: u16,
}

impl PartialEq for TagInfo {
    fn eq(&self, other: &Self) -> bool {
        self.epc == other.epc
    }
}

impl TagInfo {
    /// Parse an M100 tag notice payload: `RSSI | PC(2) | EPC | CRC(2)`.
    ///
    /// Returns `None` if the payload is too short or the tag's CRC over
    /// PC and EPC does not match.
    pub fn from_notice(payload: &[u8]) -> Option<Self> {
        if payload.len() < 5 {
            return None;
        }

        let rssi = payload[0];
        let (body, crc) = payload[1..].split_at(payload.len() - 3);
        let stored = u16::from_be_bytes([crc[0], crc[1]]);
        if epc16(body) != stored {
            return None;
        }

        Some(TagInfo {
            epc: bytes_to_hex(&body[2..]),
            rssi,
            pc: u16::from_be_bytes([body[0], body[1]]),
        })
    }
}

/// Convert bytes to uppercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Build a tag notice payload with a valid tag CRC.
#[cfg(test)]
pub(crate) fn tag_notice(rssi: u8, pc: u16, epc: &[u8]) -> Vec<u8> {
    let mut body = pc.to_be_bytes().to_vec();
    body.extend_from_slice(epc);
    let crc = epc16(&body);

    let mut payload = vec![rssi];
    payload.extend_from_slice(&body);
    payload.extend_from_slice(&crc.to_be_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0xDE, 0xAD, 0xBE, 0xEF]), "DEADBEEF");
        assert_eq!(bytes_to_hex(&[0x00, 0x01, 0x0A, 0xFF]), "00010AFF");
        assert_eq!(bytes_to_hex(&[]), "");
    }

    #[test]
    fn test_trigger_codes() {
        for trigger in [Trigger::Query, Trigger::PaPower, Trigger::Stop, Trigger::Rssi] {
            assert_eq!(Trigger::try_from(trigger.code()).unwrap(), trigger);
        }
        assert!(matches!(Trigger::try_from(0x00), Err(ReaderError::InvalidArgument(_))));
    }

    #[test]
    fn test_atomic_trigger_store_load() {
        let armed = AtomicTrigger::new(Trigger::Query);
        assert_eq!(armed.load(), Trigger::Query);
        armed.store(Trigger::PaPower);
        assert_eq!(armed.load(), Trigger::PaPower);
    }

    #[test]
    fn test_query_params_to_bytes() {
        let params = QueryParams::default();
        // DR=0, M=0, TRext=1, Sel=00, Session=00, Target=0, Q=4
        assert_eq!(params.to_bytes(), [0x10, 0x20]);

        let params = QueryParams {
            sel: QuerySel::Sl,
            session: QuerySession::S2,
            target: QueryTarget::B,
            q: 8,
        };
        // 0001 1110, 1 1000 000
        assert_eq!(params.to_bytes(), [0x1E, 0xC0]);
    }

    #[test]
    fn test_query_params_new_validates() {
        assert_eq!(QueryParams::new(0, 0, 0, 4).unwrap(), QueryParams::default());
        assert_eq!(QueryParams::new(2, 1, 1, 15).unwrap().sel, QuerySel::Nsl);
        assert!(matches!(QueryParams::new(0, 0, 0, 16), Err(ReaderError::InvalidArgument(_))));
        assert!(matches!(QueryParams::new(4, 0, 0, 4), Err(ReaderError::InvalidArgument(_))));
        assert!(matches!(QueryParams::new(0, 4, 0, 4), Err(ReaderError::InvalidArgument(_))));
        assert!(matches!(QueryParams::new(0, 0, 2, 4), Err(ReaderError::InvalidArgument(_))));
    }

    #[test]
    fn test_tag_info_from_notice() {
        let epc = [0xE2, 0x00, 0x68, 0x16, 0x00, 0x00, 0x00, 0x60, 0x12, 0x34, 0x56, 0x78];
        let payload = tag_notice(0xC8, 0x3000, &epc);

        let tag = TagInfo::from_notice(&payload).unwrap();
        assert_eq!(tag.rssi, 0xC8);
        assert_eq!(tag.pc, 0x3000);
        assert_eq!(tag.epc, "E20068160000006012345678");
    }

    #[test]
    fn test_tag_info_bad_crc() {
        let mut payload = tag_notice(0xC8, 0x3000, &[0xE2, 0x00]);
        let last = payload.len() - 1;
        payload[last] ^= 0xFF;
        assert!(TagInfo::from_notice(&payload).is_none());
        assert!(TagInfo::from_notice(&[0xC8, 0x30]).is_none());
    }

    #[test]
    fn test_tag_info_equality() {
        let tag1 = TagInfo { epc: "E200".to_string(), rssi: 100, pc: 0x3000 };
        let tag2 = TagInfo { epc: "E200".to_string(), rssi: 50, pc: 0x3000 };
        let tag3 = TagInfo { epc: "E300".to_string(), rssi: 100, pc: 0x3000 };

        assert_eq!(tag1, tag2);
        assert_ne!(tag1, tag3);
    }
}

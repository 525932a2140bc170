//! M100 command encoding.
//!
//! Every frame has the layout
//! `BB | type | cmd | PL_hi | PL_lo | params | checksum | 7E`, where the
//! checksum is the low byte of the sum of `type` through the last param.

use log::warn;

use crate::types::{QueryParams, ReaderError};

// Protocol constants
pub const HEADER: u8 = 0xBB;
pub const END: u8 = 0x7E;
pub const TYPE_COMMAND: u8 = 0x00;
pub const TYPE_NOTIFICATION: u8 = 0x01;
pub const TYPE_TAG_NOTICE: u8 = 0x02;

/// Bytes of framing around the params: header, type, cmd, 2x length, checksum, end
pub const FRAME_OVERHEAD: usize = 7;

// Command codes
pub const SINGLE_POLL: u8 = 0x22;
pub const MULTIPLE_POLL: u8 = 0x27;
pub const STOP_MULTIPLE_POLL: u8 = 0x28;
pub const SET_QUERY_PARAM: u8 = 0x0E;
pub const SET_TX_POWER: u8 = 0xB6;
pub const GET_TX_POWER: u8 = 0xB7;
pub const SET_READER_MODE: u8 = 0xF5;
pub const SCAN_RSSI: u8 = 0xF3;
pub const ERROR_RESPONSE: u8 = 0xFF;

/// Reserved byte preceding the round count of a multiple poll
const MULTIPLE_POLL_RESERVED: u8 = 0x22;

/// Transmit power range accepted by the module, in dBm
pub const MIN_POWER_DBM: f32 = 18.0;
pub const MAX_POWER_DBM: f32 = 26.0;

/// Largest loop count a query frame can carry
pub const MAX_QUERY_LOOPS: u32 = 0xFFFF;

/// Sum of `bytes` truncated to 8 bits
pub fn frame_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Frame `params` as a `frame_type` frame for `command`.
pub fn frame(frame_type: u8, command: u8, params: &[u8]) -> Vec<u8> {
    let [msb, lsb] = (params.len() as u16).to_be_bytes();

    let checksum = frame_checksum(&[frame_type, command, msb, lsb])
        .wrapping_add(frame_checksum(params));

    let mut out = Vec::with_capacity(FRAME_OVERHEAD + params.len());
    out.extend_from_slice(&[HEADER, frame_type, command, msb, lsb]);
    out.extend_from_slice(params);
    out.push(checksum);
    out.push(END);
    out
}

/// Frame a host-to-reader command.
pub fn create_command(command: u8, params: &[u8]) -> Vec<u8> {
    frame(TYPE_COMMAND, command, params)
}

/// A logical request to the reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Read the current transmit power
    GetPower,
    /// Set transmit power, in hundredths of a dBm
    SetPower(u16),
    /// Run `loops` inventory rounds
    Query(u16),
    /// Set the demodulation mode
    SetMode(u8),
    /// Stop a running inventory
    Stop,
    /// Set the Gen2 Query parameters
    SetQueryParams(QueryParams),
}

impl Command {
    /// Query command for `loops` rounds, rejecting counts above 65535.
    pub fn query(loops: u32) -> Result<Self, ReaderError> {
        u16::try_from(loops).map(Command::Query).map_err(|_| {
            ReaderError::InvalidArgument(format!(
                "query loop count {} exceeds maximum of {}",
                loops, MAX_QUERY_LOOPS
            ))
        })
    }

    /// Set-power command; the value is clamped to the module's range.
    pub fn set_power(dbm: f32) -> Result<Self, ReaderError> {
        if !dbm.is_finite() {
            return Err(ReaderError::InvalidArgument(format!(
                "transmit power must be finite, got {}",
                dbm
            )));
        }

        let clamped = dbm.clamp(MIN_POWER_DBM, MAX_POWER_DBM);
        if clamped != dbm {
            warn!(
                "Transmit power {} dBm out of range, clamped to {} dBm",
                dbm, clamped
            );
        }

        Ok(Command::SetPower((clamped * 100.0).round() as u16))
    }

    /// Mode command; only the low 8 bits of `mode` are sent.
    pub fn mode(mode: u32) -> Self {
        Command::SetMode((mode & 0xFF) as u8)
    }

    /// Encode to the bytes written to the UART.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Command::GetPower => create_command(GET_TX_POWER, &[]),
            Command::SetPower(centi_dbm) => create_command(SET_TX_POWER, &centi_dbm.to_be_bytes()),
            Command::Query(loops) => {
                let [msb, lsb] = loops.to_be_bytes();
                create_command(MULTIPLE_POLL, &[MULTIPLE_POLL_RESERVED, msb, lsb])
            }
            Command::SetMode(mode) => create_command(SET_READER_MODE, &[mode]),
            Command::Stop => create_command(STOP_MULTIPLE_POLL, &[]),
            Command::SetQueryParams(params) => create_command(SET_QUERY_PARAM, &params.to_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QuerySel, QuerySession, QueryTarget};

    #[test]
    fn test_create_command_with_param() {
        let result = create_command(0x03, &[0x01]);
        assert_eq!(result, [0xBB, 0x00, 0x03, 0x00, 0x01, 0x01, 0x05, 0x7E]);
    }

    #[test]
    fn test_create_command_no_param() {
        let result = create_command(0x22, &[]);
        assert_eq!(result, [0xBB, 0x00, 0x22, 0x00, 0x00, 0x22, 0x7E]);
    }

    #[test]
    fn test_query_frame() {
        // 10,000 rounds (0x2710)
        let result = Command::query(10_000).unwrap().encode();
        assert_eq!(result, [0xBB, 0x00, 0x27, 0x00, 0x03, 0x22, 0x27, 0x10, 0x83, 0x7E]);
    }

    #[test]
    fn test_query_loop_boundary() {
        let frame = Command::query(65_535).unwrap().encode();
        assert_eq!(frame[6], 0xFF);
        assert_eq!(frame[7], 0xFF);

        assert!(matches!(Command::query(65_536), Err(ReaderError::InvalidArgument(_))));
    }

    #[test]
    fn test_get_power_frame() {
        assert_eq!(Command::GetPower.encode(), [0xBB, 0x00, 0xB7, 0x00, 0x00, 0xB7, 0x7E]);
    }

    #[test]
    fn test_set_power_frame() {
        // 20 dBm (2000 = 0x07D0)
        let result = Command::set_power(20.0).unwrap().encode();
        assert_eq!(result, [0xBB, 0x00, 0xB6, 0x00, 0x02, 0x07, 0xD0, 0x8F, 0x7E]);
    }

    #[test]
    fn test_set_power_fractional() {
        assert_eq!(Command::set_power(22.5).unwrap(), Command::SetPower(2250));
    }

    #[test]
    fn test_set_power_clamped() {
        assert_eq!(Command::set_power(30.0).unwrap(), Command::SetPower(2600));
        assert_eq!(Command::set_power(5.0).unwrap(), Command::SetPower(1800));
    }

    #[test]
    fn test_set_power_not_finite() {
        assert!(matches!(Command::set_power(f32::NAN), Err(ReaderError::InvalidArgument(_))));
        assert!(matches!(Command::set_power(f32::INFINITY), Err(ReaderError::InvalidArgument(_))));
    }

    #[test]
    fn test_stop_frame() {
        assert_eq!(Command::Stop.encode(), [0xBB, 0x00, 0x28, 0x00, 0x00, 0x28, 0x7E]);
    }

    #[test]
    fn test_mode_frame_masks_to_byte() {
        assert_eq!(Command::mode(0x101), Command::SetMode(0x01));
        assert_eq!(Command::mode(1).encode(), [0xBB, 0x00, 0xF5, 0x00, 0x01, 0x01, 0xF7, 0x7E]);
    }

    #[test]
    fn test_set_query_params_frame() {
        let params = QueryParams {
            sel: QuerySel::All,
            session: QuerySession::S0,
            target: QueryTarget::A,
            q: 4,
        };
        let result = Command::SetQueryParams(params).encode();
        assert_eq!(result, [0xBB, 0x00, 0x0E, 0x00, 0x02, 0x10, 0x20, 0x40, 0x7E]);
    }

    #[test]
    fn test_notification_frame() {
        let result = frame(TYPE_NOTIFICATION, STOP_MULTIPLE_POLL, &[0x00]);
        assert_eq!(result, [0xBB, 0x01, 0x28, 0x00, 0x01, 0x00, 0x2A, 0x7E]);
    }
}

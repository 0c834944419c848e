//! IBUS: `0x20 0x40` header, fourteen little-endian channels, checksum

use super::FrameError;
use crate::types::RawChannels;

pub const FRAME_LEN: usize = 32;
pub const HEADER: u16 = 0x4020;
pub const CHANNELS: usize = 14;

/// Complement checksum over everything before the checksum field
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0xFFFFu16, |acc, b| acc.wrapping_sub(*b as u16))
}

fn channel(frame: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([frame[2 + 2 * index], frame[3 + 2 * index]])
}

pub fn decode(frame: &[u8], verify_checksum: bool) -> Result<RawChannels, FrameError> {
    if frame.len() != FRAME_LEN {
        return Err(FrameError::Length);
    }
    if u16::from_le_bytes([frame[0], frame[1]]) != HEADER {
        return Err(FrameError::Header);
    }
    if verify_checksum {
        let carried = u16::from_le_bytes([frame[FRAME_LEN - 2], frame[FRAME_LEN - 1]]);
        if carried != checksum(&frame[..FRAME_LEN - 2]) {
            return Err(FrameError::Checksum);
        }
    }
    Ok(RawChannels {
        throttle: channel(frame, 2),
        aileron: channel(frame, 0),
        elevator: channel(frame, 1),
        rudder: channel(frame, 3),
        armed: channel(frame, 4),
        aux: channel(frame, 5),
    })
}

//! SUMD: vendor id, status, channel count, twelve big-endian channels, CRC-16

use crc::{Crc, CRC_16_XMODEM};

use super::FrameError;
use crate::types::RawChannels;

pub const FRAME_LEN: usize = 29;
pub const VENDOR_ID: u8 = 0xA8;
/// Live frame
pub const STATUS_LIVE: u8 = 0x01;
/// Transmitter failsafe frame
pub const STATUS_FAILSAFE: u8 = 0x81;
pub const CHANNELS: usize = 12;

pub const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

fn channel(frame: &[u8], index: usize) -> u16 {
    u16::from_be_bytes([frame[3 + 2 * index], frame[4 + 2 * index]])
}

pub fn decode(frame: &[u8], verify_checksum: bool) -> Result<RawChannels, FrameError> {
    if frame.len() != FRAME_LEN {
        return Err(FrameError::Length);
    }
    if frame[0] != VENDOR_ID {
        return Err(FrameError::Header);
    }
    if frame[1] != STATUS_LIVE && frame[1] != STATUS_FAILSAFE {
        return Err(FrameError::Status);
    }
    if verify_checksum {
        let carried = u16::from_be_bytes([frame[FRAME_LEN - 2], frame[FRAME_LEN - 1]]);
        if carried != CRC.checksum(&frame[..FRAME_LEN - 2]) {
            return Err(FrameError::Checksum);
        }
    }
    Ok(RawChannels {
        throttle: channel(frame, 0),
        aileron: channel(frame, 1),
        elevator: channel(frame, 2),
        rudder: channel(frame, 3),
        armed: channel(frame, 4),
        aux: channel(frame, 5),
    })
}

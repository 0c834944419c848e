//! SBUS: header, sixteen 11-bit channels packed LSB first, flags, end byte
//!
//! The header is compared in bit-reversed form; `0x0F` and `0x8F` are both
//! accepted.

use super::FrameError;
use crate::types::RawChannels;

pub const FRAME_LEN: usize = 25;
pub const CHANNELS: usize = 16;
pub const END_BYTE: u8 = 0x00;

const PAYLOAD: core::ops::Range<usize> = 1..23;

/// Accepted headers after bit reversal
const HEADERS_REVERSED: [u8; 2] = [0xF0, 0xF1];

/// Unpack the first `N` 11-bit channels
pub fn unpack<const N: usize>(payload: &[u8]) -> [u16; N] {
    let mut out = [0u16; N];
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut bytes = payload.iter();
    for ch in out.iter_mut() {
        while bits < 11 {
            let Some(b) = bytes.next() else {
                return out;
            };
            acc |= (*b as u32) << bits;
            bits += 8;
        }
        *ch = (acc & 0x07FF) as u16;
        acc >>= 11;
        bits -= 11;
    }
    out
}

pub fn decode(frame: &[u8]) -> Result<RawChannels, FrameError> {
    if frame.len() != FRAME_LEN {
        return Err(FrameError::Length);
    }
    if !HEADERS_REVERSED.contains(&frame[0].reverse_bits()) {
        return Err(FrameError::Header);
    }
    if frame[FRAME_LEN - 1] != END_BYTE {
        return Err(FrameError::EndByte);
    }
    let ch = unpack::<6>(&frame[PAYLOAD]);
    Ok(RawChannels {
        throttle: ch[2],
        aileron: ch[0],
        elevator: ch[1],
        rudder: ch[3],
        armed: ch[4],
        aux: ch[5],
    })
}

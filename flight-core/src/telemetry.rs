//! Debug telemetry selected by the debug register
//!
//! The register picks one pipeline stage (`case`, bits 0-7) and a counter
//! mask (bits 16-31). The stage sends its intermediate values whenever the
//! relevant counter ANDed with the mask is zero. All values go out
//! little-endian.

use heapless::Vec;

use crate::types::RawInertialSample;

/// Largest debug packet
pub const MAX_PACKET: usize = 32;

pub type Packet = Vec<u8, MAX_PACKET>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DebugCase {
    Off,
    /// 7 x i16, sensor register order
    RawSensor,
    /// gyro, accel and temperature as 7 x f32
    ScaledSensor,
    /// filtered voltage, f32
    Battery,
    /// 6 x u16
    RawChannels,
    /// 6 x f32: throttle, aileron, elevator, rudder, armed, aux
    SmoothedCommands,
    /// 3 x f32: pitch, roll, yaw
    PidOutputs,
    /// 3 motors and the servo before clipping, 4 x f32
    MixerOutputs,
    /// 3 motors and the servo after clipping, 4 x u16
    MotorOutputs,
}

impl DebugCase {
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => DebugCase::RawSensor,
            2 => DebugCase::ScaledSensor,
            3 => DebugCase::Battery,
            4 => DebugCase::RawChannels,
            5 => DebugCase::SmoothedCommands,
            6 => DebugCase::PidOutputs,
            7 => DebugCase::MixerOutputs,
            8 => DebugCase::MotorOutputs,
            _ => DebugCase::Off,
        }
    }
}

/// Decoded debug register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DebugSelect {
    pub case: DebugCase,
    pub mask: u16,
}

impl DebugSelect {
    pub const OFF: DebugSelect = DebugSelect {
        case: DebugCase::Off,
        mask: 0,
    };

    pub const fn from_word(word: u32) -> Self {
        Self {
            case: DebugCase::from_code((word & 0xFF) as u8),
            mask: (word >> 16) as u16,
        }
    }

    /// Whether `case` should report at this counter value
    pub fn wants(&self, case: DebugCase, counter: u16) -> bool {
        case != DebugCase::Off && self.case == case && counter & self.mask == 0
    }
}

impl Default for DebugSelect {
    fn default() -> Self {
        Self::OFF
    }
}

fn encode<const N: usize, const W: usize>(values: [[u8; W]; N]) -> Packet {
    let mut packet = Packet::new();
    for bytes in values.iter() {
        if packet.extend_from_slice(bytes).is_err() {
            break;
        }
    }
    packet
}

pub fn encode_f32<const N: usize>(values: [f32; N]) -> Packet {
    encode(values.map(f32::to_le_bytes))
}

pub fn encode_u16<const N: usize>(values: [u16; N]) -> Packet {
    encode(values.map(u16::to_le_bytes))
}

pub fn encode_raw_sample(sample: &RawInertialSample) -> Packet {
    encode(sample.fields().map(i16::to_le_bytes))
}

/// Single-byte answer to a host sensor register read
pub fn encode_register_byte(value: u8) -> Packet {
    encode([[value]])
}

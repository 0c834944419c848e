//! Radio link decoding
//!
//! Each supported wire format lives in its own submodule and produces the
//! same [`RawChannels`]. [`Receiver`] holds the last good channels across
//! rejected frames and rescales them into a [`PilotCommand`].

pub mod ibus;
pub mod link;
pub mod sbus;
pub mod sumd;

pub use link::{LinkSync, ResyncOutcome};

use heapless::Vec;

use crate::types::{PilotCommand, RawChannels};

/// Longest frame of any supported protocol
pub const MAX_FRAME_LEN: usize = 32;

/// Storage for one received frame
pub type FrameBuffer = Vec<u8, MAX_FRAME_LEN>;

/// Rejected frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Wrong number of bytes
    Length,
    /// Magic header or vendor id mismatch
    Header,
    /// Status byte not accepted
    Status,
    /// Missing end-of-frame marker
    EndByte,
    /// Checksum mismatch
    Checksum,
}

#[cfg(feature = "std")]
impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::Length => write!(f, "wrong frame length"),
            FrameError::Header => write!(f, "bad frame header"),
            FrameError::Status => write!(f, "bad frame status"),
            FrameError::EndByte => write!(f, "bad end byte"),
            FrameError::Checksum => write!(f, "checksum mismatch"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

/// Radio link wire format
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    /// 32-byte frame of little-endian 16-bit channels
    Ibus,
    /// 29-byte frame with vendor and status bytes
    Sumd,
    /// 25-byte frame of bit-packed 11-bit channels
    Sbus,
}

/// Offset and span used to turn a raw channel into a fraction
#[derive(Copy, Clone, Debug, PartialEq)]
struct Span {
    offset: f32,
    span: f32,
}

impl Span {
    const fn new(offset: f32, span: f32) -> Self {
        Self { offset, span }
    }

    fn apply(&self, raw: u16) -> f32 {
        (raw as f32 - self.offset) / self.span
    }

    fn invert(&self, fraction: f32) -> u16 {
        // float casts saturate; +0.5 rounds the non-negative result
        (fraction * self.span + self.offset + 0.5) as u16
    }
}

/// Per-protocol scaling: unipolar channels, stick axes, switches
struct Scaling {
    throttle: Span,
    axis: Span,
    switch: Span,
}

const IBUS_SCALING: Scaling = Scaling {
    throttle: Span::new(1000.0, 1000.0),
    axis: Span::new(1500.0, 500.0),
    switch: Span::new(1000.0, 1000.0),
};

const SUMD_SCALING: Scaling = Scaling {
    throttle: Span::new(8800.0, 6400.0),
    axis: Span::new(12000.0, 3200.0),
    switch: Span::new(8800.0, 6400.0),
};

const SBUS_SCALING: Scaling = Scaling {
    throttle: Span::new(368.0, 1312.0),
    axis: Span::new(1024.0, 656.0),
    switch: Span::new(144.0, 1760.0),
};

impl Protocol {
    /// Frame size in bytes
    pub const fn frame_len(self) -> usize {
        match self {
            Protocol::Ibus => ibus::FRAME_LEN,
            Protocol::Sumd => sumd::FRAME_LEN,
            Protocol::Sbus => sbus::FRAME_LEN,
        }
    }

    /// Whether the wire format carries a checksum
    pub const fn has_checksum(self) -> bool {
        !matches!(self, Protocol::Sbus)
    }

    /// Validate a frame and extract the named channels
    pub fn decode(self, frame: &[u8], verify_checksum: bool) -> Result<RawChannels, FrameError> {
        match self {
            Protocol::Ibus => ibus::decode(frame, verify_checksum),
            Protocol::Sumd => sumd::decode(frame, verify_checksum),
            Protocol::Sbus => sbus::decode(frame),
        }
    }

    fn scaling(self) -> &'static Scaling {
        match self {
            Protocol::Ibus => &IBUS_SCALING,
            Protocol::Sumd => &SUMD_SCALING,
            Protocol::Sbus => &SBUS_SCALING,
        }
    }

    /// Rescale raw channels into fractions.
    ///
    /// Transmitter endpoints past the nominal span saturate: stick axes stay
    /// within [-1, 1] and throttle within [0, 1].
    pub fn normalize(self, raw: &RawChannels) -> PilotCommand {
        let s = self.scaling();
        let axis = |value| s.axis.apply(value).clamp(-1.0, 1.0);
        PilotCommand {
            throttle: s.throttle.apply(raw.throttle).clamp(0.0, 1.0),
            aileron: axis(raw.aileron),
            elevator: axis(raw.elevator),
            rudder: axis(raw.rudder),
            armed: s.switch.apply(raw.armed),
            aux: s.switch.apply(raw.aux),
        }
    }

    /// Raw channels that normalize to `cmd`, saturating at the wire range.
    /// Used by simulators and ground tools.
    pub fn raw_from(self, cmd: &PilotCommand) -> RawChannels {
        let s = self.scaling();
        RawChannels {
            throttle: s.throttle.invert(cmd.throttle),
            aileron: s.axis.invert(cmd.aileron),
            elevator: s.axis.invert(cmd.elevator),
            rudder: s.axis.invert(cmd.rudder),
            armed: s.switch.invert(cmd.armed),
            aux: s.switch.invert(cmd.aux),
        }
    }
}

/// Decoder state: last accepted channels and the frame counter
pub struct Receiver {
    protocol: Protocol,
    verify_checksum: bool,
    raw: RawChannels,
    frames: u16,
}

impl Receiver {
    pub const fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            verify_checksum: false,
            raw: RawChannels {
                throttle: 0,
                aileron: 0,
                elevator: 0,
                rudder: 0,
                armed: 0,
                aux: 0,
            },
            frames: 0,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn set_verify_checksum(&mut self, enabled: bool) {
        self.verify_checksum = enabled;
    }

    /// Decode one frame.
    ///
    /// A rejected frame leaves the held channels and the frame counter
    /// unchanged; the caller counts the fault and requests a resync.
    pub fn accept(&mut self, frame: &[u8]) -> Result<&RawChannels, FrameError> {
        self.raw = self.protocol.decode(frame, self.verify_checksum)?;
        self.frames = self.frames.wrapping_add(1);
        Ok(&self.raw)
    }

    /// Last accepted channels
    pub fn raw(&self) -> &RawChannels {
        &self.raw
    }

    /// Held channels rescaled to fractions
    pub fn command(&self) -> PilotCommand {
        self.protocol.normalize(&self.raw)
    }

    /// Accepted frames, wrapping
    pub fn frame_count(&self) -> u16 {
        self.frames
    }
}

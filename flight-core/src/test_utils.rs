//! Test utilities for flight core functionality
//!
//! Frame and sample builders for every wire format, plus [`Rig`], a booted
//! controller on a mock board that tests drive through the same entry
//! points the interrupt handlers use.

use crate::controller::FlightController;
use crate::hal::mock::MockHal;
use crate::host::HostCommand;
use crate::receiver::{ibus, sbus, sumd, FrameBuffer, Protocol};
use crate::sensor::{CALIBRATION_SAMPLES, DATA_READY, SAMPLE_LEN};
use crate::sync::{SharedState, TickOutcome};
use crate::types::{PilotCommand, RawChannels, RawInertialSample};
use crate::{Duration, FlightConfig};

/// Sticks centred, throttle closed, switches low
pub const IDLE_STICKS: PilotCommand = PilotCommand {
    throttle: 0.0,
    aileron: 0.0,
    elevator: 0.0,
    rudder: 0.0,
    armed: 0.0,
    aux: 0.0,
};

/// Accelerometer reading of a level vehicle at rest, 1 g on Z
pub const LEVEL_ACCEL: [i16; 3] = [0, 0, 2048];

/// Sensor transfer as read from the bus: status byte then big-endian words
pub fn sample_payload(sample: &RawInertialSample) -> [u8; SAMPLE_LEN] {
    let mut payload = [0u8; SAMPLE_LEN];
    payload[0] = DATA_READY;
    for (i, value) in sample.fields().iter().enumerate() {
        payload[1 + 2 * i..3 + 2 * i].copy_from_slice(&value.to_be_bytes());
    }
    payload
}

fn to_frame(bytes: &[u8]) -> FrameBuffer {
    FrameBuffer::from_slice(bytes).unwrap()
}

/// IBUS frame with the unused channels centred and a valid checksum
pub fn ibus_frame(raw: &RawChannels) -> FrameBuffer {
    let mut channels = [1500u16; ibus::CHANNELS];
    channels[0] = raw.aileron;
    channels[1] = raw.elevator;
    channels[2] = raw.throttle;
    channels[3] = raw.rudder;
    channels[4] = raw.armed;
    channels[5] = raw.aux;

    let mut frame = [0u8; ibus::FRAME_LEN];
    frame[..2].copy_from_slice(&ibus::HEADER.to_le_bytes());
    for (i, ch) in channels.iter().enumerate() {
        frame[2 + 2 * i..4 + 2 * i].copy_from_slice(&ch.to_le_bytes());
    }
    let sum = ibus::checksum(&frame[..ibus::FRAME_LEN - 2]);
    frame[ibus::FRAME_LEN - 2..].copy_from_slice(&sum.to_le_bytes());
    to_frame(&frame)
}

/// Live SUMD frame with the unused channels centred and a valid CRC
pub fn sumd_frame(raw: &RawChannels) -> FrameBuffer {
    let mut channels = [12000u16; sumd::CHANNELS];
    channels[..6].copy_from_slice(&[
        raw.throttle,
        raw.aileron,
        raw.elevator,
        raw.rudder,
        raw.armed,
        raw.aux,
    ]);

    let mut frame = [0u8; sumd::FRAME_LEN];
    frame[0] = sumd::VENDOR_ID;
    frame[1] = sumd::STATUS_LIVE;
    frame[2] = sumd::CHANNELS as u8;
    for (i, ch) in channels.iter().enumerate() {
        frame[3 + 2 * i..5 + 2 * i].copy_from_slice(&ch.to_be_bytes());
    }
    let crc = sumd::CRC.checksum(&frame[..sumd::FRAME_LEN - 2]);
    frame[sumd::FRAME_LEN - 2..].copy_from_slice(&crc.to_be_bytes());
    to_frame(&frame)
}

/// Pack 11-bit channels least significant bit first
pub fn pack_sbus(channels: &[u16; sbus::CHANNELS]) -> [u8; 22] {
    let mut out = [0u8; 22];
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut idx = 0;
    for ch in channels {
        acc |= ((*ch & 0x7FF) as u32) << bits;
        bits += 11;
        while bits >= 8 {
            out[idx] = acc as u8;
            idx += 1;
            acc >>= 8;
            bits -= 8;
        }
    }
    out
}

/// SBUS frame in the non-inverted header form with no flags set
pub fn sbus_frame(raw: &RawChannels) -> FrameBuffer {
    let mut channels = [1024u16; sbus::CHANNELS];
    channels[0] = raw.aileron;
    channels[1] = raw.elevator;
    channels[2] = raw.throttle;
    channels[3] = raw.rudder;
    channels[4] = raw.armed;
    channels[5] = raw.aux;

    let mut frame = [0u8; sbus::FRAME_LEN];
    frame[0] = 0x0F;
    frame[1..23].copy_from_slice(&pack_sbus(&channels));
    frame[23] = 0;
    frame[24] = sbus::END_BYTE;
    to_frame(&frame)
}

pub fn frame_for(protocol: Protocol, raw: &RawChannels) -> FrameBuffer {
    match protocol {
        Protocol::Ibus => ibus_frame(raw),
        Protocol::Sumd => sumd_frame(raw),
        Protocol::Sbus => sbus_frame(raw),
    }
}

/// Booted controller on a mock board.
///
/// Each `send_*` call publishes through the interrupt-side entry point and
/// runs exactly one scheduler pass, so follow-up events stay observable.
pub struct Rig {
    pub hal: MockHal,
    pub controller: FlightController<'static>,
    shared: &'static SharedState,
    protocol: Protocol,
}

impl Rig {
    pub fn new(protocol: Protocol) -> Self {
        Self::with_hal(protocol, MockHal::new())
    }

    pub fn with_hal(protocol: Protocol, mut hal: MockHal) -> Self {
        let config = FlightConfig::new(protocol);
        let shared: &'static SharedState = Box::leak(Box::new(SharedState::new(&config)));
        let controller = FlightController::boot(shared, config, &mut hal);
        Self {
            hal,
            controller,
            shared,
            protocol,
        }
    }

    pub fn shared(&self) -> &'static SharedState {
        self.shared
    }

    /// One scheduler pass; returns the number of events serviced
    pub fn poll(&mut self) -> usize {
        self.controller.poll_once(&mut self.hal)
    }

    /// Poll until no event is pending
    pub fn settle(&mut self) -> usize {
        let mut total = 0;
        loop {
            let handled = self.poll();
            if handled == 0 {
                return total;
            }
            total += handled;
        }
    }

    pub fn send_channels(&mut self, raw: &RawChannels) {
        self.shared.on_frame(&frame_for(self.protocol, raw));
        self.poll();
    }

    pub fn send_command(&mut self, cmd: &PilotCommand) {
        let raw = self.protocol.raw_from(cmd);
        self.send_channels(&raw);
    }

    /// Deliver one level sample with the given gyro counts
    pub fn send_sample(&mut self, gyro: [i16; 3]) {
        let sample = RawInertialSample {
            accel: LEVEL_ACCEL,
            temperature: 0,
            gyro,
        };
        self.shared
            .on_sample_transfer(&sample_payload(&sample), Duration::from_micros(120));
        self.poll();
    }

    /// Feed a full calibration run of constant gyro counts
    pub fn calibrate(&mut self, gyro: [i16; 3]) {
        for _ in 0..CALIBRATION_SAMPLES {
            self.send_sample(gyro);
        }
    }

    /// Perform the unlock gesture with the throttle closed
    pub fn unlock(&mut self) {
        for armed in [0.0, 1.0, 0.0] {
            self.send_command(&PilotCommand { armed, ..IDLE_STICKS });
        }
    }

    pub fn host(&mut self, cmd: HostCommand) {
        self.shared.on_host_request(&cmd.encode());
        self.poll();
    }

    /// Run `ms` timer ticks of one millisecond, advancing the mock clock
    pub fn tick(&mut self, ms: u32) -> TickOutcome {
        let mut last = TickOutcome::default();
        for _ in 0..ms {
            self.hal.advance(Duration::from_millis(1));
            let outcome = self.shared.on_tick(1);
            if outcome.beeper.is_some() {
                last = outcome;
            }
        }
        last
    }
}

//! Inertial sample decoding and gyro bias calibration

use crate::types::{RawInertialSample, ScaledSample};

/// Bytes in one completed transfer: status byte then seven big-endian words
pub const SAMPLE_LEN: usize = 15;
/// Data-ready bit in the status byte
pub const DATA_READY: u8 = 0x01;
/// Samples averaged for the gyro bias
pub const CALIBRATION_SAMPLES: u16 = 1000;
/// deg/s per count at the +/-2000 deg/s range
pub const GYRO_SCALE: f32 = 0.061035;
/// g per count at the +/-16 g range
pub const ACCEL_SCALE: f32 = 0.00048828;

/// Rejected sample
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleError {
    /// Data-ready bit not set
    NotReady,
    /// Transfer shorter than a full sample
    Length,
}

#[cfg(feature = "std")]
impl core::fmt::Display for SampleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SampleError::NotReady => write!(f, "sample without data-ready flag"),
            SampleError::Length => write!(f, "short sample transfer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SampleError {}

/// Decode a completed transfer into raw counts
pub fn decode_sample(payload: &[u8]) -> Result<RawInertialSample, SampleError> {
    if payload.len() < SAMPLE_LEN {
        return Err(SampleError::Length);
    }
    if payload[0] & DATA_READY == 0 {
        return Err(SampleError::NotReady);
    }
    let word = |i: usize| i16::from_be_bytes([payload[1 + 2 * i], payload[2 + 2 * i]]);
    Ok(RawInertialSample {
        accel: [word(0), word(1), word(2)],
        temperature: word(3),
        gyro: [word(4), word(5), word(6)],
    })
}

/// Result of feeding one accepted sample
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SampleOutcome {
    /// Still accumulating the bias
    Calibrating,
    /// This sample completed the calibration window
    Calibrated,
    /// Bias-corrected sample ready for the stabilizer
    Ready(ScaledSample),
}

/// Sensor pipeline state: sample counter, bias and the last good sample
pub struct SensorPipeline {
    accepted: u16,
    calibration_count: u16,
    sum: [i32; 3],
    bias: Option<[f32; 3]>,
    last_raw: RawInertialSample,
    last: ScaledSample,
}

impl SensorPipeline {
    pub const fn new() -> Self {
        Self {
            accepted: 0,
            calibration_count: 0,
            sum: [0; 3],
            bias: None,
            last_raw: RawInertialSample {
                accel: [0; 3],
                temperature: 0,
                gyro: [0; 3],
            },
            last: ScaledSample {
                gyro: [0.0; 3],
                accel: [0.0; 3],
                temperature: 0.0,
            },
        }
    }

    /// Validate and process one transfer.
    ///
    /// A rejected transfer leaves the bias, the counters and the last good
    /// sample untouched.
    pub fn process(&mut self, payload: &[u8]) -> Result<SampleOutcome, SampleError> {
        let raw = decode_sample(payload)?;
        self.accepted = self.accepted.wrapping_add(1);
        self.last_raw = raw;

        let outcome = match self.bias {
            Some(bias) => {
                self.last = scale(&raw, &bias);
                SampleOutcome::Ready(self.last)
            }
            None => self.accumulate(&raw),
        };
        Ok(outcome)
    }

    fn accumulate(&mut self, raw: &RawInertialSample) -> SampleOutcome {
        for (sum, g) in self.sum.iter_mut().zip(raw.gyro) {
            *sum += g as i32;
        }
        self.calibration_count += 1;
        if self.calibration_count < CALIBRATION_SAMPLES {
            return SampleOutcome::Calibrating;
        }

        let n = CALIBRATION_SAMPLES as i32;
        // Integer part first so a constant input yields exactly that constant
        let bias = self.sum.map(|s| (s / n) as f32 + (s % n) as f32 / n as f32);
        self.bias = Some(bias);
        #[cfg(feature = "defmt")]
        defmt::info!("gyro bias {} {} {}", bias[0], bias[1], bias[2]);
        SampleOutcome::Calibrated
    }

    pub fn is_calibrated(&self) -> bool {
        self.bias.is_some()
    }

    pub fn bias(&self) -> Option<[f32; 3]> {
        self.bias
    }

    /// Accepted samples, wrapping
    pub fn sample_count(&self) -> u16 {
        self.accepted
    }

    pub fn last_raw(&self) -> &RawInertialSample {
        &self.last_raw
    }

    pub fn last(&self) -> &ScaledSample {
        &self.last
    }
}

impl Default for SensorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn scale(raw: &RawInertialSample, bias: &[f32; 3]) -> ScaledSample {
    ScaledSample {
        gyro: [
            (raw.gyro[0] as f32 - bias[0]) * GYRO_SCALE,
            (raw.gyro[1] as f32 - bias[1]) * GYRO_SCALE,
            (raw.gyro[2] as f32 - bias[2]) * GYRO_SCALE,
        ],
        accel: raw.accel.map(|a| a as f32 * ACCEL_SCALE),
        temperature: raw.temperature as f32 / 340.0 + 36.53,
    }
}

//! Tricopter mixing and actuator overrides

use crate::config::MotorTest;
use crate::pid::Correction;
use crate::types::{ActuatorCommand, MOTOR_MAX, SERVO_CENTER, SERVO_MAX};

/// Mixer settings taken from the register table
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MixerParams {
    /// Lowest motor count while armed
    pub motor_start: u32,
    /// Idle offset added to every motor while armed
    pub motor_armed: u32,
    /// Motor counts at full throttle
    pub throttle_range: f32,
    /// Mixing headroom lost per unit of throttle
    pub throttle_atten: f32,
}

/// Unclipped mixer outputs, kept for telemetry
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MixOutput {
    pub motors: [f32; 3],
    pub servo: f32,
}

/// Why the computed command was replaced
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Override {
    None,
    /// Host motor test
    Test,
    /// Disarmed, sensor timeout or calibration in progress
    Safe,
}

/// Mix throttle and PID corrections.
///
/// Motor 0 is front-left, 1 the tail, 2 front-right. Yaw drives the tail
/// servo only.
pub fn mix(throttle: f32, correction: &Correction, params: &MixerParams) -> MixOutput {
    let base = throttle * params.throttle_range;
    let gain = 1.0 - throttle * params.throttle_atten;
    let Correction { pitch, roll, yaw } = *correction;
    MixOutput {
        motors: [
            base + (roll - pitch) * gain,
            base + pitch * gain,
            base + (-roll - pitch) * gain,
        ],
        servo: -yaw,
    }
}

/// Float to clamped motor count.
///
/// The float-to-int cast saturates and NaN maps to zero, so any input lands
/// in `[start, MOTOR_MAX]`.
pub fn clip_motor(value: f32, params: &MixerParams) -> u16 {
    let armed = params.motor_armed.min(i32::MAX as u32) as i32;
    let start = params.motor_start.min(MOTOR_MAX as u32) as i32;
    let v = (value as i32).saturating_add(armed);
    let clipped = if v < start {
        start
    } else if v > MOTOR_MAX as i32 {
        MOTOR_MAX as i32
    } else {
        v
    };
    clipped as u16
}

pub fn clip_servo(value: f32) -> u16 {
    let v = (value as i32).saturating_add(SERVO_CENTER as i32);
    let clipped = if v < 0 {
        0
    } else if v > SERVO_MAX as i32 {
        SERVO_MAX as i32
    } else {
        v
    };
    clipped as u16
}

/// Output stage: clipping, override precedence and servo cadence
pub struct Mixer {
    params: MixerParams,
    computed: ActuatorCommand,
    last_mix: MixOutput,
    cycles: u8,
}

impl Mixer {
    pub fn new(params: MixerParams) -> Self {
        Self {
            params,
            computed: ActuatorCommand::SAFE,
            last_mix: MixOutput::default(),
            cycles: 0,
        }
    }

    pub fn set_params(&mut self, params: MixerParams) {
        self.params = params;
    }

    /// Compute and clip a new command from one stabilizer step
    pub fn update(&mut self, throttle: f32, correction: &Correction) -> ActuatorCommand {
        let mix = mix(throttle, correction, &self.params);
        self.last_mix = mix;
        self.computed = ActuatorCommand {
            motors: mix.motors.map(|m| clip_motor(m, &self.params)),
            servo: clip_servo(mix.servo),
            servo_refresh: false,
        };
        self.computed
    }

    /// Last clipped command before overrides
    pub fn computed(&self) -> ActuatorCommand {
        self.computed
    }

    pub fn last_mix(&self) -> &MixOutput {
        &self.last_mix
    }

    /// Command to hand to the pulse generator this cycle.
    ///
    /// Motor test wins over the safe output, which wins over the computed
    /// command. The servo pulse restarts every fourth cycle.
    pub fn output(&mut self, test: MotorTest, safe: bool) -> (ActuatorCommand, Override) {
        self.cycles = self.cycles.wrapping_add(1);
        let (mut command, reason) = if test.is_active() {
            let value = test.value.min(MOTOR_MAX);
            let mut motors = [0u16; 3];
            for (i, m) in motors.iter_mut().enumerate() {
                if test.select & (1 << i) != 0 {
                    *m = value;
                }
            }
            let servo = if test.select & 0x8 != 0 {
                value.min(SERVO_MAX)
            } else {
                SERVO_CENTER
            };
            (
                ActuatorCommand {
                    motors,
                    servo,
                    servo_refresh: false,
                },
                Override::Test,
            )
        } else if safe {
            (ActuatorCommand::SAFE, Override::Safe)
        } else {
            (self.computed, Override::None)
        };
        command.servo_refresh = self.cycles & 0x03 == 0;
        (command, reason)
    }
}

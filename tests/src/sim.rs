//! Closed-loop simulation: a crude rate model of the airframe wired to a
//! booted controller on the mock board

use flight_core::sensor::GYRO_SCALE;
use flight_core::test_utils::{Rig, IDLE_STICKS};
use flight_core::types::{ActuatorCommand, PilotCommand, SERVO_CENTER};
use flight_core::Protocol;

/// Rate change in deg/s per pulse count of torque, per sample
pub const TORQUE_GAIN: f32 = 0.01;

/// Body rates integrated from the actuator outputs
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Airframe {
    /// Pitch, roll and yaw rate in deg/s
    pub rates: [f32; 3],
}

impl Airframe {
    /// Advance one sample period under `cmd`
    pub fn step(&mut self, cmd: &ActuatorCommand) {
        let [m0, m1, m2] = cmd.motors.map(|m| m as f32);
        let pitch = m1 - (m0 + m2) / 2.0;
        let roll = (m0 - m2) / 2.0;
        let yaw = SERVO_CENTER as f32 - cmd.servo as f32;
        self.rates[0] += pitch * TORQUE_GAIN;
        self.rates[1] += roll * TORQUE_GAIN;
        self.rates[2] += yaw * TORQUE_GAIN;
    }

    /// Rates as the gyro would report them
    pub fn gyro_counts(&self) -> [i16; 3] {
        self.rates.map(|r| (r / GYRO_SCALE).round() as i16)
    }
}

/// Controller and airframe stepped together, one sensor sample at a time
pub struct Simulation {
    pub rig: Rig,
    pub airframe: Airframe,
    pub samples: u32,
}

impl Simulation {
    pub fn new(protocol: Protocol) -> Self {
        let mut rig = Rig::new(protocol);
        rig.settle();
        Self {
            rig,
            airframe: Airframe::default(),
            samples: 0,
        }
    }

    /// Calibrate on a still airframe, unlock and arm at idle throttle
    pub fn prepare(&mut self) {
        self.rig.calibrate([0; 3]);
        self.rig.unlock();
        self.rig.send_command(&PilotCommand {
            armed: 1.0,
            ..IDLE_STICKS
        });
    }

    /// Deliver one gyro sample and apply the resulting outputs
    pub fn step(&mut self) -> ActuatorCommand {
        self.rig.send_sample(self.airframe.gyro_counts());
        let cmd = self.rig.controller.output();
        self.airframe.step(&cmd);
        self.samples += 1;
        cmd
    }

    pub fn run(&mut self, samples: u32) -> ActuatorCommand {
        let mut last = self.rig.controller.output();
        for _ in 0..samples {
            last = self.step();
        }
        last
    }
}

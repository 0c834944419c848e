//! Stick expo curve and command smoothing

use crate::types::PilotCommand;

/// Smoothing constant of the command average
pub const COMMAND_ALPHA: f32 = 0.1;

/// Sum of `(x*k)^n / n!` for n = 1..=6
fn series(x: f32, k: f32) -> f32 {
    let mut term = 1.0;
    let mut sum = 0.0;
    let mut factorial = 1.0;
    for n in 1..=6 {
        term *= x * k;
        factorial *= n as f32;
        sum += term / factorial;
    }
    sum
}

/// Expo curve normalized so that full deflection stays at full deflection
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Expo {
    k: f32,
    scale: f32,
}

impl Expo {
    /// Build the curve for coefficient `k`; zero or negative disables it
    pub fn new(k: f32) -> Self {
        if k > 0.0 {
            Self { k, scale: series(1.0, k) }
        } else {
            Self { k: 0.0, scale: 1.0 }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.k > 0.0
    }

    /// Apply to a stick fraction, preserving sign
    pub fn apply(&self, x: f32) -> f32 {
        if !self.is_enabled() {
            return x;
        }
        if x >= 0.0 {
            series(x, self.k) / self.scale
        } else {
            -(series(-x, self.k) / self.scale)
        }
    }
}

impl Default for Expo {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Exponential average of the four analogue commands.
///
/// The accumulator holds the unscaled sum; the smoothed value is the
/// accumulator times alpha.
#[derive(Copy, Clone, Debug, Default)]
pub struct CommandSmoother {
    acc: [f32; 4],
}

/// Smoothed throttle and stick axes
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SmoothedCommand {
    pub throttle: f32,
    pub aileron: f32,
    pub elevator: f32,
    pub rudder: f32,
}

impl CommandSmoother {
    pub const fn new() -> Self {
        Self { acc: [0.0; 4] }
    }

    pub fn update(&mut self, cmd: &PilotCommand) -> SmoothedCommand {
        let input = [cmd.throttle, cmd.aileron, cmd.elevator, cmd.rudder];
        for (acc, x) in self.acc.iter_mut().zip(input) {
            *acc = *acc * (1.0 - COMMAND_ALPHA) + x;
        }
        let [throttle, aileron, elevator, rudder] = self.acc.map(|a| a * COMMAND_ALPHA);
        SmoothedCommand {
            throttle,
            aileron,
            elevator,
            rudder,
        }
    }
}

//! Per-axis rate PID with a gain-dependent integral window

use crate::shaping::SmoothedCommand;
use crate::types::Axis;

/// Largest magnitude of the integral contribution `integral * I`
pub const INTEGRAL_MAX: f32 = 200.0;

/// Proportional, integral and derivative gains of one axis
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Gains {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

/// Largest integral whose contribution stays within [`INTEGRAL_MAX`].
///
/// The quotient is stepped down by one ulp until the product with the gain
/// no longer overshoots, so rounding can never push the contribution past
/// the bound.
pub fn integral_window(i_gain: f32) -> f32 {
    let gain = if i_gain < 0.0 { -i_gain } else { i_gain };
    if gain == 0.0 || !gain.is_finite() {
        return 0.0;
    }
    let mut window = INTEGRAL_MAX / gain;
    if !window.is_finite() {
        window = f32::MAX;
    }
    while window > 0.0 && window * gain > INTEGRAL_MAX {
        window = f32::from_bits(window.to_bits() - 1);
    }
    window
}

/// Error state of one axis
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AxisController {
    gains: Gains,
    window: f32,
    error: f32,
    previous: f32,
    integral: f32,
}

impl AxisController {
    pub fn new(gains: Gains) -> Self {
        Self {
            gains,
            window: integral_window(gains.i),
            ..Default::default()
        }
    }

    /// Replace the gains; the accumulated state is kept
    pub fn set_gains(&mut self, gains: Gains) {
        self.gains = gains;
        self.window = integral_window(gains.i);
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    pub fn window(&self) -> f32 {
        self.window
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// One step against `error`; `hold_integral_at_zero` resets the integral
    pub fn step(&mut self, error: f32, hold_integral_at_zero: bool) -> f32 {
        self.previous = self.error;
        self.error = error;
        if hold_integral_at_zero {
            self.integral = 0.0;
        } else {
            self.integral += error;
        }
        if self.integral > self.window {
            self.integral = self.window;
        } else if self.integral < -self.window {
            self.integral = -self.window;
        }
        self.error * self.gains.p
            + self.integral * self.gains.i
            + (self.error - self.previous) * self.gains.d
    }
}

/// Command rates in deg/s at full stick
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RateLimits {
    pub pitch_roll: f32,
    pub yaw: f32,
}

/// PID outputs per axis
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Correction {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Three-axis rate stabilizer
pub struct Stabilizer {
    axes: [AxisController; 3],
    rates: RateLimits,
    reset_integral_on_disarm: bool,
}

impl Stabilizer {
    pub fn new(gains: [Gains; 3], rates: RateLimits) -> Self {
        Self {
            axes: gains.map(AxisController::new),
            rates,
            reset_integral_on_disarm: false,
        }
    }

    pub fn configure(&mut self, gains: [Gains; 3], rates: RateLimits, reset_integral_on_disarm: bool) {
        for (axis, g) in self.axes.iter_mut().zip(gains) {
            axis.set_gains(g);
        }
        self.rates = rates;
        self.reset_integral_on_disarm = reset_integral_on_disarm;
    }

    pub fn axis(&self, axis: Axis) -> &AxisController {
        &self.axes[axis.index()]
    }

    /// One control step from the smoothed sticks and the measured rates
    /// (gyro X is pitch, Y is roll, Z is yaw)
    pub fn update(&mut self, command: &SmoothedCommand, gyro: &[f32; 3], armed: bool) -> Correction {
        let desired = [
            command.elevator * self.rates.pitch_roll,
            command.aileron * self.rates.pitch_roll,
            command.rudder * self.rates.yaw,
        ];
        let hold = !armed && self.reset_integral_on_disarm;
        let mut out = [0.0f32; 3];
        for axis in Axis::ALL {
            let i = axis.index();
            out[i] = self.axes[i].step(desired[i] - gyro[i], hold);
        }
        Correction {
            pitch: out[0],
            roll: out[1],
            yaw: out[2],
        }
    }
}

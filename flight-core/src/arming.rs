//! Arming gesture and battery monitoring

use crate::types::ArmStatus;

/// Switch fraction separating low from high
pub const SWITCH_THRESHOLD: f32 = 0.5;
/// Throttle must be below this to complete the unlock gesture
pub const THROTTLE_IDLE: f32 = 0.01;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmState {
    /// Boot state; waiting for the switch to go high
    Locked,
    /// Switch seen high while locked; waiting for it to drop with throttle idle
    Step1Armed,
    /// Gesture complete; the armed value follows the switch
    Unlocked,
}

/// Arming state machine.
///
/// The switch must go high then low with the throttle at idle before the
/// armed value follows the switch. Unlocking lasts until reboot.
pub struct ArmingStateMachine {
    state: ArmState,
    armed: f32,
}

impl ArmingStateMachine {
    pub const fn new() -> Self {
        Self {
            state: ArmState::Locked,
            armed: 0.0,
        }
    }

    /// Feed the switch and throttle fractions of one accepted frame
    pub fn update(&mut self, switch: f32, throttle: f32) -> f32 {
        match self.state {
            ArmState::Locked => {
                self.armed = 0.0;
                if switch > SWITCH_THRESHOLD {
                    self.state = ArmState::Step1Armed;
                }
            }
            ArmState::Step1Armed => {
                self.armed = 0.0;
                if switch < SWITCH_THRESHOLD && throttle < THROTTLE_IDLE {
                    self.state = ArmState::Unlocked;
                    #[cfg(feature = "defmt")]
                    defmt::info!("arming unlocked");
                }
            }
            ArmState::Unlocked => self.armed = switch,
        }
        self.armed
    }

    /// Drop the armed value until the next accepted frame
    pub fn force_disarm(&mut self) {
        self.armed = 0.0;
    }

    pub fn armed(&self) -> f32 {
        self.armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed >= SWITCH_THRESHOLD
    }

    pub fn state(&self) -> ArmState {
        self.state
    }

    pub fn status(&self) -> ArmStatus {
        match self.state {
            ArmState::Locked => ArmStatus::Locked,
            ArmState::Step1Armed => ArmStatus::Step1Armed,
            ArmState::Unlocked if self.is_armed() => ArmStatus::Armed,
            ArmState::Unlocked => ArmStatus::Disarmed,
        }
    }
}

impl Default for ArmingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Volts per converter count
pub const ADC_SCALE: f32 = 0.0089;
/// Smoothing constant of the voltage average
pub const VBAT_ALPHA: f32 = 0.001;
/// Readings below this are treated as a disconnected sense line
pub const VBAT_FLOOR: f32 = 8.0;
/// Voltage the average starts from
const VBAT_INITIAL: f32 = 15.0;

/// Filtered battery voltage with a low-voltage alarm
pub struct BatteryMonitor {
    acc: f32,
    voltage: f32,
    samples: u16,
}

impl BatteryMonitor {
    pub fn new() -> Self {
        Self {
            acc: VBAT_INITIAL / VBAT_ALPHA,
            voltage: VBAT_INITIAL,
            samples: 0,
        }
    }

    /// Feed one raw conversion; returns the filtered voltage
    pub fn update(&mut self, raw: u16) -> f32 {
        self.samples = self.samples.wrapping_add(1);
        self.acc = self.acc * (1.0 - VBAT_ALPHA) + raw as f32 * ADC_SCALE;
        self.voltage = self.acc * VBAT_ALPHA;
        self.voltage
    }

    pub fn voltage(&self) -> f32 {
        self.voltage
    }

    /// Low when under `minimum` but above the plausibility floor
    pub fn is_low(&self, minimum: f32) -> bool {
        self.voltage < minimum && self.voltage > VBAT_FLOOR
    }

    pub fn sample_count(&self) -> u16 {
        self.samples
    }
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

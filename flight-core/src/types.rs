//! Core data types shared between the pipeline stages

/// Maximum motor pulse count
pub const MOTOR_MAX: u16 = 2000;
/// Maximum tail servo pulse count
pub const SERVO_MAX: u16 = 2000;
/// Tail servo pulse count at neutral
pub const SERVO_CENTER: u16 = 1000;

/// Stabilized rotation axes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    /// Nose up/down, measured on gyro X
    Pitch,
    /// Wing up/down, measured on gyro Y
    Roll,
    /// Heading, measured on gyro Z
    Yaw,
}

impl Axis {
    /// All axes in controller order
    pub const ALL: [Axis; 3] = [Axis::Pitch, Axis::Roll, Axis::Yaw];

    /// Position of this axis in per-axis arrays
    pub const fn index(&self) -> usize {
        match self {
            Axis::Pitch => 0,
            Axis::Roll => 1,
            Axis::Yaw => 2,
        }
    }
}

/// One inertial sample in raw sensor counts
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct RawInertialSample {
    /// Acceleration X/Y/Z
    pub accel: [i16; 3],
    /// Die temperature
    pub temperature: i16,
    /// Angular rate X/Y/Z
    pub gyro: [i16; 3],
}

impl RawInertialSample {
    /// Fields in sensor register order
    pub const fn fields(&self) -> [i16; 7] {
        [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.temperature,
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        ]
    }
}

/// Inertial sample in physical units
#[derive(Copy, Clone, Default, PartialEq, Debug)]
pub struct ScaledSample {
    /// Bias-corrected angular rate in deg/s, X/Y/Z
    pub gyro: [f32; 3],
    /// Acceleration in g, X/Y/Z
    pub accel: [f32; 3],
    /// Die temperature in degrees Celsius
    pub temperature: f32,
}

/// Named channels in the raw units of the active radio protocol
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct RawChannels {
    pub throttle: u16,
    pub aileron: u16,
    pub elevator: u16,
    pub rudder: u16,
    pub armed: u16,
    pub aux: u16,
}

impl RawChannels {
    pub const fn to_array(&self) -> [u16; 6] {
        [
            self.throttle,
            self.aileron,
            self.elevator,
            self.rudder,
            self.armed,
            self.aux,
        ]
    }
}

/// Pilot command as normalized fractions.
///
/// Throttle, arm switch and auxiliary channel span roughly `0..=1`; the
/// three stick axes span `-1..=1` before expo shaping.
#[derive(Copy, Clone, Default, PartialEq, Debug)]
pub struct PilotCommand {
    pub throttle: f32,
    /// Roll stick
    pub aileron: f32,
    /// Pitch stick
    pub elevator: f32,
    /// Yaw stick
    pub rudder: f32,
    /// Arm switch
    pub armed: f32,
    pub aux: f32,
}

/// Pulse counts handed to the external pulse generator
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActuatorCommand {
    /// Three motor pulses, front-left, tail, front-right
    pub motors: [u16; 3],
    /// Tail servo pulse
    pub servo: u16,
    /// Whether the servo pulse is restarted this cycle
    pub servo_refresh: bool,
}

impl ActuatorCommand {
    /// Motors stopped, servo centered
    pub const SAFE: ActuatorCommand = ActuatorCommand {
        motors: [0; 3],
        servo: SERVO_CENTER,
        servo_refresh: false,
    };

    /// True when every pulse lies inside its documented interval
    pub fn in_range(&self) -> bool {
        self.motors.iter().all(|m| *m <= MOTOR_MAX) && self.servo <= SERVO_MAX
    }
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        Self::SAFE
    }
}

/// Externally visible arming status
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmStatus {
    /// Waiting for the unlock gesture
    Locked,
    /// Arm switch seen high once while locked
    Step1Armed,
    /// Unlocked and the arm switch is high
    Armed,
    /// Unlocked but the arm switch is low or a timeout forced a disarm
    Disarmed,
}

/// Sources that can make the beeper sound
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmSource {
    /// Pilot request on the auxiliary channel
    User,
    /// Radio link timeout
    Link,
    /// Inertial sensor timeout
    Sensor,
    /// Beeper test requested by the host
    Host,
    /// Low battery
    Battery,
}

impl AlarmSource {
    pub const fn mask(&self) -> u8 {
        match self {
            AlarmSource::User => 0x01,
            AlarmSource::Link => 0x02,
            AlarmSource::Sensor => 0x04,
            AlarmSource::Host => 0x08,
            AlarmSource::Battery => 0x10,
        }
    }
}

/// Indicator behaviour selected by the control word
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorMode {
    /// Both lights off
    Off,
    /// Sensor light on, link light off
    Status,
    /// Lights blink with link and sensor activity
    Heartbeat,
    /// Link light on, sensor light off
    Link,
}

impl IndicatorMode {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => IndicatorMode::Off,
            1 => IndicatorMode::Status,
            2 => IndicatorMode::Heartbeat,
            _ => IndicatorMode::Link,
        }
    }
}

/// Activity source of a heartbeat blink
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeartbeatSource {
    Link,
    Sensor,
}

/// Fault categories reported to the indicator
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Sample rejected by the sensor pipeline
    SensorSample,
    /// Frame rejected by the radio decoder
    LinkFrame,
    /// No valid frame within the link timeout
    LinkTimeout,
    /// No valid sample within the sensor timeout
    SensorTimeout,
}

/// Semantic events delivered to the indicator hardware
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorEvent {
    /// Steady indicator pattern selected by configuration
    Mode(IndicatorMode),
    /// Blink phase for one activity source
    Heartbeat { source: HeartbeatSource, on: bool },
    /// Gyro bias calibration started
    Calibrating,
    /// Gyro bias calibration finished
    Calibrated,
    /// A fault was detected
    Fault(FaultKind),
}

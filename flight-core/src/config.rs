//! Register table holding every tunable and diagnostic value.
//!
//! Each entry is stored as a raw 32-bit pattern and interpreted as a word
//! or a float according to its metadata. The host reads and writes entries
//! by address; persisted entries are restored from storage at boot when the
//! stored version marker matches [`FIRMWARE_VERSION`].

use crate::hal::Storage;
use crate::types::IndicatorMode;

/// Version marker stored in word 0 of the configuration page
pub const FIRMWARE_VERSION: u32 = 25;

/// Number of entries in the register table
pub const REGISTER_COUNT: usize = 25;

/// Register addresses
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    Version = 0,
    Ctrl,
    MotorTest,
    Debug,
    Error,
    Time,
    Vbat,
    VbatMin,
    PitchRollExpo,
    YawExpo,
    MotorStart,
    MotorArmed,
    PitchRollRate,
    YawRate,
    ThrottleRange,
    ThrottleAtten,
    PitchP,
    PitchI,
    PitchD,
    RollP,
    RollI,
    RollD,
    YawP,
    YawI,
    YawD,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Version,
        Register::Ctrl,
        Register::MotorTest,
        Register::Debug,
        Register::Error,
        Register::Time,
        Register::Vbat,
        Register::VbatMin,
        Register::PitchRollExpo,
        Register::YawExpo,
        Register::MotorStart,
        Register::MotorArmed,
        Register::PitchRollRate,
        Register::YawRate,
        Register::ThrottleRange,
        Register::ThrottleAtten,
        Register::PitchP,
        Register::PitchI,
        Register::PitchD,
        Register::RollP,
        Register::RollI,
        Register::RollD,
        Register::YawP,
        Register::YawI,
        Register::YawD,
    ];

    pub fn from_address(address: u8) -> Option<Register> {
        Self::ALL.get(address as usize).copied()
    }

    pub const fn address(self) -> u8 {
        self as u8
    }

    pub fn meta(self) -> &'static EntryMeta {
        &TABLE[self as usize]
    }
}

/// How the raw bits of an entry are interpreted
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueKind {
    Word,
    Float,
}

/// Static properties of one register
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct EntryMeta {
    /// Host writes are ignored
    pub read_only: bool,
    /// Restored from storage at boot
    pub persisted: bool,
    pub kind: ValueKind,
    /// Bit pattern loaded when storage holds no valid image
    pub default_bits: u32,
}

const fn word(read_only: bool, persisted: bool, default_bits: u32) -> EntryMeta {
    EntryMeta {
        read_only,
        persisted,
        kind: ValueKind::Word,
        default_bits,
    }
}

const fn float(read_only: bool, persisted: bool, default_bits: u32) -> EntryMeta {
    EntryMeta {
        read_only,
        persisted,
        kind: ValueKind::Float,
        default_bits,
    }
}

static TABLE: [EntryMeta; REGISTER_COUNT] = [
    word(true, true, FIRMWARE_VERSION), // Version
    word(false, false, 34),             // Ctrl
    word(false, false, 0),              // MotorTest
    word(false, false, 0),              // Debug
    word(true, false, 0),               // Error
    word(true, false, 0),               // Time
    float(true, false, 0),              // Vbat
    float(false, true, 0x4166_6666),    // VbatMin 14.4
    float(false, true, 0x4080_0000),    // PitchRollExpo 4.0
    float(false, true, 0x4080_0000),    // YawExpo 4.0
    word(false, true, 50),              // MotorStart
    word(false, true, 150),             // MotorArmed
    float(false, true, 0x4496_0000),    // PitchRollRate 1200.0
    float(false, true, 0x4496_0000),    // YawRate 1200.0
    float(false, true, 0x44DA_C000),    // ThrottleRange 1750.0
    float(false, true, 0),              // ThrottleAtten
    float(false, true, 0x4080_0000),    // PitchP 4.0
    float(false, true, 0x3BA3_D70A),    // PitchI 0.005
    float(false, true, 0),              // PitchD
    float(false, true, 0x4080_0000),    // RollP 4.0
    float(false, true, 0x3BA3_D70A),    // RollI 0.005
    float(false, true, 0),              // RollD
    float(false, true, 0x40C0_0000),    // YawP 6.0
    float(false, true, 0x3C23_D70A),    // YawI 0.01
    float(false, true, 0),              // YawD
];

/// Decoded register value
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ConfigValue {
    Word(u32),
    Float(f32),
}

impl ConfigValue {
    pub fn from_bits(kind: ValueKind, bits: u32) -> Self {
        match kind {
            ValueKind::Word => ConfigValue::Word(bits),
            ValueKind::Float => ConfigValue::Float(f32::from_bits(bits)),
        }
    }

    pub fn to_bits(self) -> u32 {
        match self {
            ConfigValue::Word(w) => w,
            ConfigValue::Float(f) => f.to_bits(),
        }
    }
}

/// Reasons a host write is refused
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No register at this address
    UnknownAddress(u8),
    /// Register cannot be written by the host
    ReadOnly(Register),
}

#[cfg(feature = "std")]
impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::UnknownAddress(a) => write!(f, "no register at address {}", a),
            ConfigError::ReadOnly(r) => write!(f, "register {:?} is read-only", r),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Where the boot configuration came from
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigSource {
    Persisted,
    Defaults,
}

/// The register table
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConfigStore {
    bits: [u32; REGISTER_COUNT],
}

impl ConfigStore {
    /// Table filled with defaults
    pub fn defaults() -> Self {
        let mut bits = [0; REGISTER_COUNT];
        for (slot, meta) in bits.iter_mut().zip(TABLE.iter()) {
            *slot = meta.default_bits;
        }
        Self { bits }
    }

    /// Load persisted entries when the stored version marker matches.
    ///
    /// Any storage error falls back to defaults for the whole table.
    pub fn load<S: Storage>(storage: &mut S) -> (Self, ConfigSource) {
        let mut store = Self::defaults();
        match storage.read_word(Register::Version.address() as u16) {
            Ok(FIRMWARE_VERSION) => {}
            _ => return (store, ConfigSource::Defaults),
        }
        for reg in Register::ALL {
            if !reg.meta().persisted || reg == Register::Version {
                continue;
            }
            match storage.read_word(reg.address() as u16) {
                Ok(bits) => store.bits[reg as usize] = bits,
                Err(_) => return (Self::defaults(), ConfigSource::Defaults),
            }
        }
        (store, ConfigSource::Persisted)
    }

    pub fn bits(&self, reg: Register) -> u32 {
        self.bits[reg as usize]
    }

    pub fn get(&self, reg: Register) -> ConfigValue {
        ConfigValue::from_bits(reg.meta().kind, self.bits(reg))
    }

    /// Entry as an unsigned word; float entries yield their bit pattern
    pub fn word(&self, reg: Register) -> u32 {
        self.bits(reg)
    }

    /// Entry as a float; word entries are converted numerically
    pub fn float(&self, reg: Register) -> f32 {
        match self.get(reg) {
            ConfigValue::Float(f) => f,
            ConfigValue::Word(w) => w as f32,
        }
    }

    /// Raw bits at a host address
    pub fn read(&self, address: u8) -> Result<u32, ConfigError> {
        Register::from_address(address)
            .map(|reg| self.bits(reg))
            .ok_or(ConfigError::UnknownAddress(address))
    }

    /// Host write of raw bits; read-only entries are refused
    pub fn write(&mut self, address: u8, bits: u32) -> Result<Register, ConfigError> {
        let reg = Register::from_address(address).ok_or(ConfigError::UnknownAddress(address))?;
        if reg.meta().read_only {
            return Err(ConfigError::ReadOnly(reg));
        }
        self.bits[reg as usize] = bits;
        Ok(reg)
    }

    /// Internal update that bypasses the read-only flag (diagnostics)
    pub fn set(&mut self, reg: Register, value: ConfigValue) {
        self.bits[reg as usize] = value.to_bits();
    }

    pub fn ctrl(&self) -> ControlWord {
        ControlWord(self.bits(Register::Ctrl))
    }

    pub fn motor_test(&self) -> MotorTest {
        MotorTest::from_word(self.bits(Register::MotorTest))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Bit fields of the control register
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ControlWord(pub u32);

impl ControlWord {
    pub const SENSOR_HOST_CONTROL: u32 = 1 << 0;
    pub const INDICATOR_SHIFT: u32 = 1;
    pub const BEEP_TEST: u32 = 1 << 3;
    pub const TIME_MAXHOLD: u32 = 1 << 4;
    pub const RESET_INTEGRAL_ON_DISARM: u32 = 1 << 5;
    pub const VERIFY_CHECKSUM: u32 = 1 << 6;

    /// Sensor bus handed to the host; periodic sampling stops
    pub const fn sensor_host_control(&self) -> bool {
        self.0 & Self::SENSOR_HOST_CONTROL != 0
    }

    pub const fn indicator_mode(&self) -> IndicatorMode {
        IndicatorMode::from_bits(self.0 >> Self::INDICATOR_SHIFT)
    }

    pub const fn beep_test(&self) -> bool {
        self.0 & Self::BEEP_TEST != 0
    }

    /// Timing registers keep their maximum instead of the latest value
    pub const fn time_maxhold(&self) -> bool {
        self.0 & Self::TIME_MAXHOLD != 0
    }

    pub const fn reset_integral_on_disarm(&self) -> bool {
        self.0 & Self::RESET_INTEGRAL_ON_DISARM != 0
    }

    /// Reject frames whose checksum does not match
    pub const fn verify_checksum(&self) -> bool {
        self.0 & Self::VERIFY_CHECKSUM != 0
    }
}

/// Decoded motor test register
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct MotorTest {
    /// Bits 0..2 select motors, bit 3 the servo
    pub select: u8,
    pub value: u16,
}

impl MotorTest {
    pub const fn from_word(word: u32) -> Self {
        Self {
            select: (word & 0xF) as u8,
            value: (word >> 16) as u16,
        }
    }

    pub const fn to_word(&self) -> u32 {
        (self.select as u32 & 0xF) | ((self.value as u32) << 16)
    }

    pub const fn is_active(&self) -> bool {
        self.select != 0
    }
}

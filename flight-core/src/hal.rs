//! Hardware Abstraction Layer for the flight core

// Re-export time types based on feature
#[cfg(feature = "embassy-time")]
pub use embassy_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
pub use self::mock_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
mod mock_time {
    /// Mock instant type for compilation without embassy-time
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Instant(u64);

    impl Instant {
        pub const fn from_micros(us: u64) -> Self {
            Self(us)
        }

        pub const fn from_millis(ms: u64) -> Self {
            Self(ms * 1000)
        }

        pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }

        pub const fn as_micros(&self) -> u64 {
            self.0
        }

        pub const fn as_millis(&self) -> u64 {
            self.0 / 1000
        }
    }

    impl core::ops::Add<Duration> for Instant {
        type Output = Instant;

        fn add(self, rhs: Duration) -> Instant {
            Instant(self.0 + rhs.as_micros())
        }
    }

    /// Mock duration type
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Duration(u64);

    impl Duration {
        pub const fn from_micros(us: u64) -> Self {
            Self(us)
        }

        pub const fn from_millis(ms: u64) -> Self {
            Self(ms * 1000)
        }

        pub const fn as_micros(&self) -> u64 {
            self.0
        }

        pub const fn as_millis(&self) -> u64 {
            self.0 / 1000
        }
    }
}

use embedded_hal::digital::OutputPin;
use crate::types::{ActuatorCommand, HeartbeatSource, IndicatorEvent, IndicatorMode};

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// Inertial sensor bus transfer failed
    BusError,
    /// Non-volatile storage operation failed
    StorageError,
    /// Radio link peripheral failed
    LinkError,
    /// Host transport could not accept the packet
    TransportBusy,
    /// Pulse generator rejected the command
    OutputError,
    /// Hardware not initialized
    NotInitialized,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::BusError => write!(f, "Sensor bus transfer failed"),
            HalError::StorageError => write!(f, "Storage operation failed"),
            HalError::LinkError => write!(f, "Radio link peripheral failed"),
            HalError::TransportBusy => write!(f, "Host transport busy"),
            HalError::OutputError => write!(f, "Pulse output failed"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// External pulse generator driving the ESCs and the tail servo
pub trait PulseOutput {
    type Error: From<HalError>;

    /// Load the target counts and restart the one-shot pulses
    fn write(&mut self, command: &ActuatorCommand) -> Result<(), Self::Error>;
}

/// Register access on the inertial sensor bus.
///
/// Periodic sample reads are started by the hardware event handlers; this
/// trait only carries the single-register accesses requested by the host.
pub trait SensorBus {
    type Error: From<HalError>;

    /// Start a one-register read; the byte arrives as a completed transfer
    fn read_register(&mut self, register: u8) -> Result<(), Self::Error>;

    /// Write one register
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error>;
}

/// Serial port carrying the radio link
pub trait LinkPort {
    type Error: From<HalError>;

    /// Stop delivering frames
    fn stop_reception(&mut self) -> Result<(), Self::Error>;

    /// True once the line has been idle for one character time
    fn line_idle(&mut self) -> bool;

    /// Read and drop one received byte, if any
    fn discard_byte(&mut self);

    /// Re-arm frame delivery for frames of `frame_len` bytes
    fn start_reception(&mut self, frame_len: usize) -> Result<(), Self::Error>;
}

/// Word-addressed non-volatile storage holding the persisted configuration
pub trait Storage {
    type Error: From<HalError>;

    fn read_word(&mut self, index: u16) -> Result<u32, Self::Error>;

    /// Unlock and program one word
    fn write_word(&mut self, index: u16, value: u32) -> Result<(), Self::Error>;

    /// Erase the configuration page
    fn erase_page(&mut self) -> Result<(), Self::Error>;
}

/// Packet transport towards the host
pub trait HostTransport {
    type Error: From<HalError>;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error>;
}

/// Battery voltage converter
pub trait BatterySense {
    type Error: From<HalError>;

    /// Latest raw conversion
    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

/// Status lights driven from semantic events
pub trait Indicator {
    type Error: From<HalError>;

    fn signal(&mut self, event: IndicatorEvent) -> Result<(), Self::Error>;
}

/// Complete flight controller HAL interface
pub trait FlightHal {
    type Pulses: PulseOutput;
    type Sensor: SensorBus;
    type Link: LinkPort;
    type Storage: Storage;
    type Host: HostTransport;
    type Battery: BatterySense;
    type Indicator: Indicator;

    /// Access to the pulse generator
    fn pulses(&mut self) -> &mut Self::Pulses;

    /// Access to the inertial sensor bus
    fn sensor(&mut self) -> &mut Self::Sensor;

    /// Access to the radio link port
    fn link(&mut self) -> &mut Self::Link;

    /// Access to configuration storage
    fn storage(&mut self) -> &mut Self::Storage;

    /// Access to the host transport
    fn host(&mut self) -> &mut Self::Host;

    /// Access to the battery converter
    fn battery(&mut self) -> &mut Self::Battery;

    /// Access to the status lights
    fn indicator(&mut self) -> &mut Self::Indicator;

    /// Free-running monotonic time
    fn now(&self) -> Instant;

    /// Suspend until the next hardware event
    fn wait_for_event(&mut self);
}

/// Two open-drain status lights on embedded-hal pins.
///
/// The link light follows radio activity and the sensor light follows the
/// inertial sample rate. Lights are active low.
pub struct PinIndicator<L, S> {
    link: L,
    sensor: S,
}

impl<L, S> PinIndicator<L, S>
where
    L: OutputPin,
    S: OutputPin,
{
    pub fn new(link: L, sensor: S) -> Self {
        Self { link, sensor }
    }

    fn drive<P: OutputPin>(pin: &mut P, lit: bool) -> Result<(), HalError> {
        if lit {
            pin.set_low().map_err(|_| HalError::GpioError)
        } else {
            pin.set_high().map_err(|_| HalError::GpioError)
        }
    }

    /// Release the pins
    pub fn release(self) -> (L, S) {
        (self.link, self.sensor)
    }
}

impl<L, S> Indicator for PinIndicator<L, S>
where
    L: OutputPin,
    S: OutputPin,
{
    type Error = HalError;

    fn signal(&mut self, event: IndicatorEvent) -> Result<(), Self::Error> {
        match event {
            IndicatorEvent::Mode(mode) => {
                let (link, sensor) = match mode {
                    IndicatorMode::Off | IndicatorMode::Heartbeat => (false, false),
                    IndicatorMode::Status => (false, true),
                    IndicatorMode::Link => (true, false),
                };
                Self::drive(&mut self.link, link)?;
                Self::drive(&mut self.sensor, sensor)
            }
            IndicatorEvent::Heartbeat { source: HeartbeatSource::Link, on } => {
                Self::drive(&mut self.link, on)
            }
            IndicatorEvent::Heartbeat { source: HeartbeatSource::Sensor, on } => {
                Self::drive(&mut self.sensor, on)
            }
            // Calibration and faults are reported audibly and over the host link
            IndicatorEvent::Calibrating
            | IndicatorEvent::Calibrated
            | IndicatorEvent::Fault(_) => Ok(()),
        }
    }
}

/// Beeper on an embedded-hal pin, toggled from the beeper timer
pub struct Beeper<P> {
    pin: P,
    on: bool,
}

impl<P> Beeper<P>
where
    P: OutputPin,
{
    pub fn new(pin: P) -> Self {
        Self { pin, on: false }
    }

    /// Advance one beeper period; sounds while `active`, silent otherwise
    pub fn tick(&mut self, active: bool) -> Result<(), HalError> {
        self.on = active && !self.on;
        if self.on {
            self.pin.set_high().map_err(|_| HalError::GpioError)
        } else {
            self.pin.set_low().map_err(|_| HalError::GpioError)
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Release the pin
    pub fn release(self) -> P {
        self.pin
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use core::cell::Cell;
    use heapless::{Deque, Vec};

    /// Packet as captured by [`MockHost`]
    pub type CapturedPacket = Vec<u8, 32>;

    /// Pulse generator recording every command
    #[derive(Default)]
    pub struct MockPulses {
        last: Option<ActuatorCommand>,
        writes: u32,
        servo_restarts: u32,
    }

    impl MockPulses {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn last(&self) -> Option<ActuatorCommand> {
            self.last
        }

        pub fn writes(&self) -> u32 {
            self.writes
        }

        pub fn servo_restarts(&self) -> u32 {
            self.servo_restarts
        }
    }

    impl PulseOutput for MockPulses {
        type Error = HalError;

        fn write(&mut self, command: &ActuatorCommand) -> Result<(), Self::Error> {
            self.last = Some(*command);
            self.writes += 1;
            if command.servo_refresh {
                self.servo_restarts += 1;
            }
            Ok(())
        }
    }

    /// Register operation seen on [`MockSensorBus`]
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum BusOp {
        Read(u8),
        Write(u8, u8),
    }

    #[derive(Default)]
    pub struct MockSensorBus {
        ops: Vec<BusOp, 16>,
    }

    impl MockSensorBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ops(&self) -> &[BusOp] {
            &self.ops
        }
    }

    impl SensorBus for MockSensorBus {
        type Error = HalError;

        fn read_register(&mut self, register: u8) -> Result<(), Self::Error> {
            self.ops.push(BusOp::Read(register)).map_err(|_| HalError::BusError)
        }

        fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
            self.ops
                .push(BusOp::Write(register, value))
                .map_err(|_| HalError::BusError)
        }
    }

    /// Link port that reports an idle line after a set number of polls
    pub struct MockLink {
        idle_after: Option<u32>,
        polls: u32,
        discarded: u32,
        receiving: bool,
        frame_len: usize,
        restarts: u32,
        failed_starts: u32,
    }

    impl MockLink {
        pub fn new() -> Self {
            Self {
                idle_after: Some(0),
                polls: 0,
                discarded: 0,
                receiving: false,
                frame_len: 0,
                restarts: 0,
                failed_starts: 0,
            }
        }

        /// The next `count` calls to `start_reception` fail
        pub fn fail_starts(&mut self, count: u32) {
            self.failed_starts = count;
        }

        /// Line goes idle after `polls` busy polls; `None` never goes idle
        pub fn set_idle_after(&mut self, polls: Option<u32>) {
            self.idle_after = polls;
        }

        pub fn discarded(&self) -> u32 {
            self.discarded
        }

        pub fn is_receiving(&self) -> bool {
            self.receiving
        }

        pub fn frame_len(&self) -> usize {
            self.frame_len
        }

        pub fn restarts(&self) -> u32 {
            self.restarts
        }
    }

    impl Default for MockLink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl LinkPort for MockLink {
        type Error = HalError;

        fn stop_reception(&mut self) -> Result<(), Self::Error> {
            self.receiving = false;
            self.polls = 0;
            Ok(())
        }

        fn line_idle(&mut self) -> bool {
            let idle = matches!(self.idle_after, Some(n) if self.polls >= n);
            self.polls += 1;
            idle
        }

        fn discard_byte(&mut self) {
            self.discarded += 1;
        }

        fn start_reception(&mut self, frame_len: usize) -> Result<(), Self::Error> {
            if self.failed_starts > 0 {
                self.failed_starts -= 1;
                return Err(HalError::LinkError);
            }
            self.receiving = true;
            self.frame_len = frame_len;
            self.restarts += 1;
            Ok(())
        }
    }

    /// Storage page of 64 words, erased to all ones
    pub struct MockStorage {
        words: [u32; 64],
        writes: u32,
    }

    impl MockStorage {
        pub fn new() -> Self {
            Self {
                words: [u32::MAX; 64],
                writes: 0,
            }
        }

        pub fn word(&self, index: u16) -> u32 {
            self.words.get(index as usize).copied().unwrap_or(u32::MAX)
        }

        pub fn writes(&self) -> u32 {
            self.writes
        }
    }

    impl Default for MockStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Storage for MockStorage {
        type Error = HalError;

        fn read_word(&mut self, index: u16) -> Result<u32, Self::Error> {
            self.words
                .get(index as usize)
                .copied()
                .ok_or(HalError::StorageError)
        }

        fn write_word(&mut self, index: u16, value: u32) -> Result<(), Self::Error> {
            let word = self
                .words
                .get_mut(index as usize)
                .ok_or(HalError::StorageError)?;
            // Flash programming can only clear bits
            *word &= value;
            self.writes += 1;
            Ok(())
        }

        fn erase_page(&mut self) -> Result<(), Self::Error> {
            self.words = [u32::MAX; 64];
            Ok(())
        }
    }

    /// Host transport keeping the most recent packets
    #[derive(Default)]
    pub struct MockHost {
        sent: Deque<CapturedPacket, 8>,
        total: u32,
    }

    impl MockHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn last(&self) -> Option<&CapturedPacket> {
            self.sent.back()
        }

        pub fn take(&mut self) -> Option<CapturedPacket> {
            self.sent.pop_front()
        }

        pub fn total(&self) -> u32 {
            self.total
        }

        pub fn clear(&mut self) {
            self.sent.clear();
        }
    }

    impl HostTransport for MockHost {
        type Error = HalError;

        fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
            let captured =
                CapturedPacket::from_slice(packet).map_err(|_| HalError::TransportBusy)?;
            if self.sent.is_full() {
                self.sent.pop_front();
            }
            self.sent
                .push_back(captured)
                .map_err(|_| HalError::TransportBusy)?;
            self.total += 1;
            Ok(())
        }
    }

    pub struct MockBattery {
        raw: Option<u16>,
    }

    impl MockBattery {
        pub fn new() -> Self {
            Self { raw: Some(0) }
        }

        /// Next conversions return `raw`; `None` makes them fail
        pub fn set_raw(&mut self, raw: Option<u16>) {
            self.raw = raw;
        }
    }

    impl Default for MockBattery {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BatterySense for MockBattery {
        type Error = HalError;

        fn read_raw(&mut self) -> Result<u16, Self::Error> {
            self.raw.ok_or(HalError::NotInitialized)
        }
    }

    /// Indicator keeping the most recent events
    #[derive(Default)]
    pub struct MockIndicator {
        events: Deque<IndicatorEvent, 16>,
    }

    impl MockIndicator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn saw(&self, event: IndicatorEvent) -> bool {
            self.events.iter().any(|e| *e == event)
        }

        pub fn last(&self) -> Option<IndicatorEvent> {
            self.events.back().copied()
        }

        pub fn clear(&mut self) {
            self.events.clear();
        }
    }

    impl Indicator for MockIndicator {
        type Error = HalError;

        fn signal(&mut self, event: IndicatorEvent) -> Result<(), Self::Error> {
            if self.events.is_full() {
                self.events.pop_front();
            }
            self.events.push_back(event).map_err(|_| HalError::GpioError)
        }
    }

    /// Complete mock board with a virtual microsecond clock
    pub struct MockHal {
        pub pulses: MockPulses,
        pub sensor: MockSensorBus,
        pub link: MockLink,
        pub storage: MockStorage,
        pub host: MockHost,
        pub battery: MockBattery,
        pub indicator: MockIndicator,
        clock_us: Cell<u64>,
        step_us: u64,
        idle_waits: u32,
    }

    impl MockHal {
        pub fn new() -> Self {
            Self {
                pulses: MockPulses::new(),
                sensor: MockSensorBus::new(),
                link: MockLink::new(),
                storage: MockStorage::new(),
                host: MockHost::new(),
                battery: MockBattery::new(),
                indicator: MockIndicator::new(),
                clock_us: Cell::new(0),
                step_us: 10,
                idle_waits: 0,
            }
        }

        /// Move the virtual clock forward
        pub fn advance(&self, elapsed: Duration) {
            self.clock_us.set(self.clock_us.get() + elapsed.as_micros());
        }

        /// Amount the clock moves on every `now()` call
        pub fn set_clock_step(&mut self, step: Duration) {
            self.step_us = step.as_micros();
        }

        pub fn idle_waits(&self) -> u32 {
            self.idle_waits
        }
    }

    impl Default for MockHal {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FlightHal for MockHal {
        type Pulses = MockPulses;
        type Sensor = MockSensorBus;
        type Link = MockLink;
        type Storage = MockStorage;
        type Host = MockHost;
        type Battery = MockBattery;
        type Indicator = MockIndicator;

        fn pulses(&mut self) -> &mut Self::Pulses {
            &mut self.pulses
        }

        fn sensor(&mut self) -> &mut Self::Sensor {
            &mut self.sensor
        }

        fn link(&mut self) -> &mut Self::Link {
            &mut self.link
        }

        fn storage(&mut self) -> &mut Self::Storage {
            &mut self.storage
        }

        fn host(&mut self) -> &mut Self::Host {
            &mut self.host
        }

        fn battery(&mut self) -> &mut Self::Battery {
            &mut self.battery
        }

        fn indicator(&mut self) -> &mut Self::Indicator {
            &mut self.indicator
        }

        fn now(&self) -> Instant {
            let now = self.clock_us.get();
            self.clock_us.set(now + self.step_us);
            Instant::from_micros(now)
        }

        fn wait_for_event(&mut self) {
            self.idle_waits += 1;
        }
    }
}

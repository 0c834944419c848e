//! State shared between interrupt handlers and the main loop.
//!
//! Handlers only copy bytes into a [`Mailbox`], raise an [`Event`], bump a
//! fault counter or advance a watchdog. Everything else is owned by the
//! [`FlightController`](crate::FlightController).

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::hal::Duration;
use crate::host::REQUEST_LEN;
use crate::receiver::{FrameBuffer, MAX_FRAME_LEN};
use crate::sensor::SAMPLE_LEN;
use crate::types::AlarmSource;
use crate::FlightConfig;

/// Sticky event flags, listed in service order
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Event {
    /// Configuration changed; derived parameters must be rebuilt
    ConfigUpdate = 1 << 0,
    /// Link watchdog expired
    LinkTimeout = 1 << 1,
    /// Sensor watchdog expired
    SensorTimeout = 1 << 2,
    /// Radio link must be realigned to a frame boundary
    LinkResync = 1 << 3,
    /// Radio frame waiting in the mailbox
    Command = 1 << 4,
    /// Sensor transfer waiting in the mailbox
    Sample = 1 << 5,
    /// Actuator command ready to be written
    Actuator = 1 << 6,
    /// Battery sampling period elapsed
    Battery = 1 << 7,
    /// Host request waiting in the mailbox
    Host = 1 << 8,
}

impl Event {
    /// Fixed service order of the main loop
    pub const PRIORITY: [Event; 9] = [
        Event::ConfigUpdate,
        Event::LinkTimeout,
        Event::SensorTimeout,
        Event::LinkResync,
        Event::Command,
        Event::Sample,
        Event::Actuator,
        Event::Battery,
        Event::Host,
    ];

    pub const fn mask(self) -> u32 {
        self as u32
    }
}

/// Set of sticky event flags
pub struct EventFlags {
    bits: AtomicU32,
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Set a flag (interrupt or main context)
    pub fn raise(&self, event: Event) {
        self.bits.fetch_or(event.mask(), Ordering::Release);
    }

    /// Clear a flag, returning whether it was set
    pub fn take(&self, event: Event) -> bool {
        self.bits.fetch_and(!event.mask(), Ordering::AcqRel) & event.mask() != 0
    }

    pub fn is_raised(&self, event: Event) -> bool {
        self.bits.load(Ordering::Acquire) & event.mask() != 0
    }

    /// True when no flag is pending
    pub fn is_idle(&self) -> bool {
        self.bits.load(Ordering::Acquire) == 0
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-producer single-consumer cell.
///
/// The producer copies a complete value in under a critical section and the
/// consumer takes it out the same way, so the consumer never observes a
/// partially written value. Publishing over an unread value replaces it and
/// reports the overrun.
pub struct Mailbox<T> {
    slot: Mutex<RefCell<Option<T>>>,
}

impl<T> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    /// Store a value; returns `true` if an unread value was overwritten
    pub fn publish(&self, value: T) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).replace(Some(value)).is_some())
    }

    pub fn take(&self) -> Option<T> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    pub fn has_data(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).borrow().is_some())
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fault counts; they only ever increase and saturate at `u16::MAX`
pub struct FaultCounters {
    sensor: AtomicU16,
    link: AtomicU16,
    sample_overruns: AtomicU16,
    frame_overruns: AtomicU16,
}

fn bump(counter: &AtomicU16) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
}

impl FaultCounters {
    pub const fn new() -> Self {
        Self {
            sensor: AtomicU16::new(0),
            link: AtomicU16::new(0),
            sample_overruns: AtomicU16::new(0),
            frame_overruns: AtomicU16::new(0),
        }
    }

    pub fn record_sensor_fault(&self) {
        bump(&self.sensor);
    }

    pub fn record_link_fault(&self) {
        bump(&self.link);
    }

    pub fn record_sample_overrun(&self) {
        bump(&self.sample_overruns);
    }

    pub fn record_frame_overrun(&self) {
        bump(&self.frame_overruns);
    }

    pub fn sensor_faults(&self) -> u16 {
        self.sensor.load(Ordering::Relaxed)
    }

    pub fn link_faults(&self) -> u16 {
        self.link.load(Ordering::Relaxed)
    }

    pub fn sample_overruns(&self) -> u16 {
        self.sample_overruns.load(Ordering::Relaxed)
    }

    pub fn frame_overruns(&self) -> u16 {
        self.frame_overruns.load(Ordering::Relaxed)
    }

    /// Packed form exposed through the error register
    pub fn error_word(&self) -> u32 {
        ((self.link_faults() as u32) << 16) | self.sensor_faults() as u32
    }
}

impl Default for FaultCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Active beeper sources
pub struct Alarms {
    bits: AtomicU8,
}

impl Alarms {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    pub fn set(&self, source: AlarmSource, active: bool) {
        if active {
            self.bits.fetch_or(source.mask(), Ordering::Relaxed);
        } else {
            self.bits.fetch_and(!source.mask(), Ordering::Relaxed);
        }
    }

    pub fn is_active(&self, source: AlarmSource) -> bool {
        self.bits.load(Ordering::Relaxed) & source.mask() != 0
    }

    /// True when any source wants the beeper on
    pub fn any(&self) -> bool {
        self.bits.load(Ordering::Relaxed) != 0
    }
}

impl Default for Alarms {
    fn default() -> Self {
        Self::new()
    }
}

/// Auto-reloading millisecond timer advanced from the tick interrupt.
///
/// It expires every `period` until fed, like a hardware timer whose counter
/// is cleared by the main loop.
pub struct Watchdog {
    period_ms: u32,
    elapsed_ms: AtomicU32,
}

impl Watchdog {
    pub const fn new(period: Duration) -> Self {
        let ms = period.as_millis();
        Self {
            period_ms: if ms == 0 { 1 } else if ms > u32::MAX as u64 { u32::MAX } else { ms as u32 },
            elapsed_ms: AtomicU32::new(0),
        }
    }

    /// Advance by `ms`; returns true when the period elapsed
    pub fn tick(&self, ms: u32) -> bool {
        let elapsed = self.elapsed_ms.fetch_add(ms, Ordering::AcqRel).saturating_add(ms);
        if elapsed >= self.period_ms {
            self.elapsed_ms.store(0, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Restart the period
    pub fn feed(&self) {
        self.elapsed_ms.store(0, Ordering::Release);
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }
}

/// Completed inertial transfer as captured by the interrupt handler
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SampleTransfer {
    pub payload: Vec<u8, SAMPLE_LEN>,
    /// Bus transfer duration in microseconds
    pub transfer_us: u16,
}

/// Result of one timer tick
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct TickOutcome {
    /// Beeper period elapsed; carries whether any alarm is active
    pub beeper: Option<bool>,
}

/// Everything the interrupt context may touch
pub struct SharedState {
    pub events: EventFlags,
    pub faults: FaultCounters,
    pub alarms: Alarms,
    samples: Mailbox<SampleTransfer>,
    frames: Mailbox<FrameBuffer>,
    requests: Mailbox<Vec<u8, REQUEST_LEN>>,
    sensor_timeout: AtomicBool,
    sensor_host_control: AtomicBool,
    link_watchdog: Watchdog,
    sensor_watchdog: Watchdog,
    battery_timer: Watchdog,
    beeper_timer: Watchdog,
}

impl SharedState {
    pub const fn new(config: &FlightConfig) -> Self {
        Self {
            events: EventFlags::new(),
            faults: FaultCounters::new(),
            alarms: Alarms::new(),
            samples: Mailbox::new(),
            frames: Mailbox::new(),
            requests: Mailbox::new(),
            sensor_timeout: AtomicBool::new(false),
            sensor_host_control: AtomicBool::new(false),
            link_watchdog: Watchdog::new(config.link_timeout),
            sensor_watchdog: Watchdog::new(config.sensor_timeout),
            battery_timer: Watchdog::new(config.battery_period),
            beeper_timer: Watchdog::new(config.beeper_period),
        }
    }

    // ---- interrupt side ----

    /// Sensor transfer completed
    pub fn on_sample_transfer(&self, payload: &[u8], transfer_time: Duration) {
        let Ok(payload) = Vec::from_slice(&payload[..payload.len().min(SAMPLE_LEN)]) else {
            self.faults.record_sensor_fault();
            return;
        };
        let transfer_us = transfer_time.as_micros().min(u16::MAX as u64) as u16;
        if self.samples.publish(SampleTransfer { payload, transfer_us }) {
            self.faults.record_sample_overrun();
        }
        self.events.raise(Event::Sample);
    }

    /// Sensor bus or DMA error
    pub fn on_sensor_bus_error(&self) {
        self.faults.record_sensor_fault();
    }

    /// Radio frame completed
    pub fn on_frame(&self, bytes: &[u8]) {
        let Ok(frame) = FrameBuffer::from_slice(&bytes[..bytes.len().min(MAX_FRAME_LEN)]) else {
            self.faults.record_link_fault();
            return;
        };
        if self.frames.publish(frame) {
            self.faults.record_frame_overrun();
        }
        self.events.raise(Event::Command);
    }

    /// Serial framing, noise or overrun error on the radio link
    pub fn on_link_error(&self) {
        self.faults.record_link_fault();
        self.events.raise(Event::LinkResync);
    }

    /// Request packet from the host
    pub fn on_host_request(&self, bytes: &[u8]) {
        let Ok(request) = Vec::from_slice(&bytes[..bytes.len().min(REQUEST_LEN)]) else {
            return;
        };
        self.requests.publish(request);
        self.events.raise(Event::Host);
    }

    /// Millisecond timer tick driving the watchdogs and periodic events
    pub fn on_tick(&self, ms: u32) -> TickOutcome {
        if self.link_watchdog.tick(ms) {
            self.events.raise(Event::LinkTimeout);
        }
        if self.sensor_watchdog.tick(ms) {
            self.sensor_timeout.store(true, Ordering::Release);
            self.events.raise(Event::SensorTimeout);
        }
        if self.battery_timer.tick(ms) {
            self.events.raise(Event::Battery);
        }
        TickOutcome {
            beeper: self.beeper_timer.tick(ms).then(|| self.alarms.any()),
        }
    }

    /// Whether periodic sampling is currently suspended for host access
    pub fn sensor_host_control(&self) -> bool {
        self.sensor_host_control.load(Ordering::Acquire)
    }

    // ---- main loop side ----

    pub fn take_sample(&self) -> Option<SampleTransfer> {
        self.samples.take()
    }

    pub fn take_frame(&self) -> Option<FrameBuffer> {
        self.frames.take()
    }

    pub fn take_request(&self) -> Option<Vec<u8, REQUEST_LEN>> {
        self.requests.take()
    }

    pub fn feed_link_watchdog(&self) {
        self.link_watchdog.feed();
    }

    pub fn feed_sensor_watchdog(&self) {
        self.sensor_watchdog.feed();
    }

    pub fn sensor_timed_out(&self) -> bool {
        self.sensor_timeout.load(Ordering::Acquire)
    }

    pub fn clear_sensor_timeout(&self) {
        self.sensor_timeout.store(false, Ordering::Release);
    }

    pub fn set_sensor_host_control(&self, enabled: bool) {
        self.sensor_host_control.store(enabled, Ordering::Release);
    }
}

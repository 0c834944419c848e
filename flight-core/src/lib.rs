#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! # Flight Core
//!
//! Rate-stabilization core for a tricopter running on a bare-metal
//! microcontroller. Interrupt handlers feed a [`SharedState`] with raw
//! sensor transfers, radio frames, host requests and timer ticks; a
//! single-threaded [`FlightController`] services the resulting event flags
//! in a fixed priority order and drives the actuators.

pub mod types;
pub mod hal;
pub mod config;
pub mod sync;
pub mod sensor;
pub mod receiver;
pub mod shaping;
pub mod arming;
pub mod pid;
pub mod mixer;
pub mod telemetry;
pub mod host;
pub mod controller;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;


pub use types::*;
pub use config::{ConfigStore, ConfigValue, Register, FIRMWARE_VERSION};
pub use sync::{Event, SharedState};
pub use receiver::Protocol;
pub use controller::FlightController;
pub use hal::{Duration, Instant};

/// Flight core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build-time configuration shared by the interrupt side and the main loop
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FlightConfig {
    /// Radio link wire format
    pub protocol: Protocol,
    /// Silence on the radio link after which the vehicle is disarmed
    pub link_timeout: Duration,
    /// Silence from the inertial sensor after which outputs are killed
    pub sensor_timeout: Duration,
    /// Battery sampling period
    pub battery_period: Duration,
    /// Beeper toggle period
    pub beeper_period: Duration,
    /// Upper bound on the time spent draining the link during resync
    pub resync_bound: Duration,
}

impl FlightConfig {
    /// Defaults for the given radio protocol
    pub const fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            link_timeout: Duration::from_millis(500),
            sensor_timeout: Duration::from_millis(10),
            battery_period: Duration::from_millis(10),
            beeper_period: Duration::from_millis(250),
            resync_bound: Duration::from_millis(15),
        }
    }

    /// Validated constructor for non-default timing
    pub fn with_timeouts(
        protocol: Protocol,
        link_timeout: Duration,
        sensor_timeout: Duration,
    ) -> Result<Self, &'static str> {
        if link_timeout.as_millis() == 0 {
            return Err("link timeout must be at least 1 ms");
        }
        if sensor_timeout.as_millis() == 0 {
            return Err("sensor timeout must be at least 1 ms");
        }
        Ok(Self {
            link_timeout,
            sensor_timeout,
            ..Self::new(protocol)
        })
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self::new(Protocol::Ibus)
    }
}

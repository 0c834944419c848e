#![no_std]

//! Firmware library: board support, interrupt glue and the shared state
//! the interrupt handlers publish into

pub use flight_core::*;

pub mod board;
pub mod interrupts;

// Time driver for embassy
mod time_driver;

pub use board::Board;

/// Radio protocol selected at build time
pub const PROTOCOL: Protocol = if cfg!(feature = "sbus") {
    Protocol::Sbus
} else if cfg!(feature = "sumd") {
    Protocol::Sumd
} else {
    Protocol::Ibus
};

/// Timing used by both the interrupt side and the main loop
pub const FLIGHT_CONFIG: FlightConfig = FlightConfig::new(PROTOCOL);

/// State shared between the interrupt handlers and the main loop
pub static SHARED: SharedState = SharedState::new(&FLIGHT_CONFIG);

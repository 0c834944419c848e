//! Interrupt glue
//!
//! Each handler clears its hardware condition, updates the board shadows and
//! hands the data to [`SHARED`]. None of them touches main-loop state.

use core::cell::RefCell;

use critical_section::Mutex;
use portable_atomic::Ordering;

use flight_core::hal::{Beeper, Duration};

use crate::board::{
    pins, GpioPin, SensorSpi, ADC_RESULT, HOST_BUSY, LINK_IDLE, LINK_RX_PENDING, SPI_BUSY,
};
use crate::time_driver;
use crate::SHARED;

static BEEPER: Mutex<RefCell<Option<Beeper<GpioPin>>>> = Mutex::new(RefCell::new(None));

/// Hand the beeper pin to the timer handler
pub fn init_beeper() {
    critical_section::with(|cs| {
        BEEPER
            .borrow_ref_mut(cs)
            .replace(Beeper::new(GpioPin::new(pins::BEEPER)));
    });
}

/// EXTI4: the inertial sensor has a new sample
pub fn on_sensor_data_ready() {
    if SHARED.sensor_host_control() {
        return;
    }
    if SensorSpi::start_sample_read() {
        time_driver::mark_transfer_start();
    }
}

/// SPI1 receive DMA complete
pub fn on_sensor_transfer_complete(payload: &[u8]) {
    SPI_BUSY.store(false, Ordering::Release);
    let elapsed = time_driver::transfer_elapsed_us();
    SHARED.on_sample_transfer(payload, Duration::from_micros(elapsed as u64));
}

/// SPI1 or DMA error; the transfer is aborted
pub fn on_sensor_transfer_error() {
    SPI_BUSY.store(false, Ordering::Release);
    SHARED.on_sensor_bus_error();
}

/// USART1 receive DMA complete; DMA is re-armed for the next frame
pub fn on_link_frame(frame: &[u8]) {
    SHARED.on_frame(frame);
}

/// USART1 framing, noise or overrun error; reception stops until resync
pub fn on_link_error() {
    SHARED.on_link_error();
}

/// USART1 byte received while frame DMA is disabled
pub fn on_link_byte() {
    LINK_IDLE.store(false, Ordering::Release);
    let _ = LINK_RX_PENDING.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1));
}

/// USART1 idle-line detection
pub fn on_link_idle() {
    LINK_IDLE.store(true, Ordering::Release);
}

/// USB OUT endpoint: a host request arrived
pub fn on_host_packet(packet: &[u8]) {
    SHARED.on_host_request(packet);
}

/// USB IN endpoint drained
pub fn on_host_tx_complete() {
    HOST_BUSY.store(false, Ordering::Release);
}

/// ADC1 end of conversion
pub fn on_battery_conversion(raw: u16) {
    ADC_RESULT.store(raw, Ordering::Relaxed);
}

/// SysTick at 1 kHz: watchdogs, periodic events and the beeper
pub fn on_systick() {
    let outcome = SHARED.on_tick(1);
    if let Some(active) = outcome.beeper {
        critical_section::with(|cs| {
            if let Some(beeper) = BEEPER.borrow_ref_mut(cs).as_mut() {
                let _ = beeper.tick(active);
            }
        });
    }
}

//! CH32V203 board support
//!
//! 64KB Flash / 20KB RAM. Peripherals are driven through register shadows
//! that the interrupt handlers in [`crate::interrupts`] keep current, so the
//! main loop never blocks on hardware.

use core::cell::RefCell;
use core::convert::Infallible;

use critical_section::Mutex;
use embedded_hal::digital::{ErrorType, OutputPin};
use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use flight_core::hal::{
    BatterySense, FlightHal, HalError, HostTransport, Instant, LinkPort, PinIndicator,
    PulseOutput, SensorBus, Storage,
};
use flight_core::types::{ActuatorCommand, MOTOR_MAX};

/// CH32V203 pin assignment (bit positions in the GPIOA output register)
pub mod pins {
    pub const BEEPER: u8 = 0;
    pub const LINK_LED: u8 = 4;
    pub const SENSOR_LED: u8 = 5;
}

/// First register of the inertial sensor burst read (interrupt status)
pub const SENSOR_BURST_START: u8 = 0x3A;

/// Words in the configuration flash page
pub const CONFIG_PAGE_WORDS: usize = 64;

// Register shadows shared with the interrupt handlers
static GPIOA_ODR: AtomicU16 = AtomicU16::new(0);
static MOTOR_COMPARE: [AtomicU16; 3] = [AtomicU16::new(0), AtomicU16::new(0), AtomicU16::new(0)];
static SERVO_COMPARE: AtomicU16 = AtomicU16::new(0);
static PULSE_STARTS: AtomicU32 = AtomicU32::new(0);

pub(crate) static SPI_BUSY: AtomicBool = AtomicBool::new(false);
/// Pending host register access: bit 15 read/write, 14..8 register, 7..0 value
static SPI_REQUEST: AtomicU16 = AtomicU16::new(0);

pub(crate) static LINK_IDLE: AtomicBool = AtomicBool::new(false);
pub(crate) static LINK_RX_PENDING: AtomicU8 = AtomicU8::new(0);
static LINK_DMA_LEN: AtomicU8 = AtomicU8::new(0);
static LINK_ENABLED: AtomicBool = AtomicBool::new(false);

const ERASED: AtomicU32 = AtomicU32::new(u32::MAX);
static CONFIG_PAGE: [AtomicU32; CONFIG_PAGE_WORDS] = [ERASED; CONFIG_PAGE_WORDS];

pub(crate) static HOST_BUSY: AtomicBool = AtomicBool::new(false);
static HOST_TX: Mutex<RefCell<Vec<u8, 32>>> = Mutex::new(RefCell::new(Vec::new()));

pub(crate) static ADC_RESULT: AtomicU16 = AtomicU16::new(0);

/// GPIOA output bit usable through embedded-hal
pub struct GpioPin {
    bit: u8,
}

impl GpioPin {
    pub const fn new(bit: u8) -> Self {
        Self { bit }
    }

    pub fn is_set_high(&self) -> bool {
        GPIOA_ODR.load(Ordering::Relaxed) & (1 << self.bit) != 0
    }
}

impl ErrorType for GpioPin {
    type Error = Infallible;
}

impl OutputPin for GpioPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        GPIOA_ODR.fetch_and(!(1 << self.bit), Ordering::Relaxed);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        GPIOA_ODR.fetch_or(1 << self.bit, Ordering::Relaxed);
        Ok(())
    }
}

/// One-pulse timers feeding the ESCs (TIM2/TIM3) and the tail servo (TIM4)
pub struct PulseTimers;

impl PulseTimers {
    /// Auto-reload of every one-pulse timer
    const RELOAD: u16 = MOTOR_MAX * 2 + 1;

    /// Output rises at compare and falls at reload, so width grows as compare drops
    fn compare(count: u16) -> u16 {
        Self::RELOAD - count.min(MOTOR_MAX) * 2
    }

    /// Pulses started since boot
    pub fn starts() -> u32 {
        PULSE_STARTS.load(Ordering::Relaxed)
    }
}

impl PulseOutput for PulseTimers {
    type Error = HalError;

    fn write(&mut self, command: &ActuatorCommand) -> Result<(), Self::Error> {
        for (slot, count) in MOTOR_COMPARE.iter().zip(command.motors) {
            slot.store(Self::compare(count), Ordering::Relaxed);
        }
        if command.servo_refresh {
            SERVO_COMPARE.store(Self::compare(command.servo), Ordering::Relaxed);
        }
        PULSE_STARTS.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// SPI1 towards the inertial sensor
pub struct SensorSpi;

impl SensorSpi {
    fn request(op: u16) -> Result<(), HalError> {
        if SPI_BUSY.swap(true, Ordering::AcqRel) {
            return Err(HalError::BusError);
        }
        SPI_REQUEST.store(op, Ordering::Release);
        Ok(())
    }

    /// Start the periodic burst read; false while a transfer is in flight
    pub fn start_sample_read() -> bool {
        Self::request(0x8000 | ((SENSOR_BURST_START as u16) << 8)).is_ok()
    }
}

impl SensorBus for SensorSpi {
    type Error = HalError;

    fn read_register(&mut self, register: u8) -> Result<(), Self::Error> {
        Self::request(0x8000 | ((register as u16 & 0x7F) << 8))
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        Self::request(((register as u16 & 0x7F) << 8) | value as u16)
    }
}

/// USART1 with DMA reception of whole radio frames
pub struct LinkUart;

impl LinkPort for LinkUart {
    type Error = HalError;

    fn stop_reception(&mut self) -> Result<(), Self::Error> {
        LINK_ENABLED.store(false, Ordering::Release);
        LINK_IDLE.store(false, Ordering::Release);
        Ok(())
    }

    fn line_idle(&mut self) -> bool {
        LINK_IDLE.load(Ordering::Acquire)
    }

    fn discard_byte(&mut self) {
        let _ = LINK_RX_PENDING.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn start_reception(&mut self, frame_len: usize) -> Result<(), Self::Error> {
        let len = u8::try_from(frame_len).map_err(|_| HalError::LinkError)?;
        LINK_DMA_LEN.store(len, Ordering::Relaxed);
        LINK_ENABLED.store(true, Ordering::Release);
        Ok(())
    }
}

/// Whether the link DMA is armed, and for how many bytes
pub fn link_dma() -> Option<u8> {
    LINK_ENABLED
        .load(Ordering::Acquire)
        .then(|| LINK_DMA_LEN.load(Ordering::Relaxed))
}

/// Last flash page, holding the persisted register table
pub struct ConfigFlash;

impl Storage for ConfigFlash {
    type Error = HalError;

    fn read_word(&mut self, index: u16) -> Result<u32, Self::Error> {
        CONFIG_PAGE
            .get(index as usize)
            .map(|w| w.load(Ordering::Relaxed))
            .ok_or(HalError::StorageError)
    }

    fn write_word(&mut self, index: u16, value: u32) -> Result<(), Self::Error> {
        let word = CONFIG_PAGE
            .get(index as usize)
            .ok_or(HalError::StorageError)?;
        // programming clears bits only
        word.fetch_and(value, Ordering::Relaxed);
        Ok(())
    }

    fn erase_page(&mut self) -> Result<(), Self::Error> {
        for word in CONFIG_PAGE.iter() {
            word.store(u32::MAX, Ordering::Relaxed);
        }
        #[cfg(feature = "defmt")]
        defmt::info!("🧹 Configuration page erased");
        Ok(())
    }
}

/// USB full-speed endpoint towards the host
pub struct HostPort;

impl HostTransport for HostPort {
    type Error = HalError;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        if HOST_BUSY.swap(true, Ordering::AcqRel) {
            return Err(HalError::TransportBusy);
        }
        critical_section::with(|cs| {
            let mut tx = HOST_TX.borrow_ref_mut(cs);
            tx.clear();
            tx.extend_from_slice(packet).map_err(|_| HalError::TransportBusy)
        })
        .inspect_err(|_| HOST_BUSY.store(false, Ordering::Release))
    }
}

/// Run `f` on the packet waiting for the USB IN endpoint
pub fn with_host_tx<R>(f: impl FnOnce(&[u8]) -> R) -> R {
    critical_section::with(|cs| f(&HOST_TX.borrow_ref(cs)))
}

/// ADC1 channel on the battery divider
pub struct BatteryAdc;

impl BatterySense for BatteryAdc {
    type Error = HalError;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        Ok(ADC_RESULT.load(Ordering::Relaxed))
    }
}

/// CH32V203 flight controller board
pub struct Board {
    pulses: PulseTimers,
    sensor: SensorSpi,
    link: LinkUart,
    storage: ConfigFlash,
    host: HostPort,
    battery: BatteryAdc,
    indicator: PinIndicator<GpioPin, GpioPin>,
}

impl Board {
    pub fn new() -> Self {
        #[cfg(feature = "defmt")]
        defmt::info!("🔌 CH32V203 board initialized");
        Self {
            pulses: PulseTimers,
            sensor: SensorSpi,
            link: LinkUart,
            storage: ConfigFlash,
            host: HostPort,
            battery: BatteryAdc,
            indicator: PinIndicator::new(
                GpioPin::new(pins::LINK_LED),
                GpioPin::new(pins::SENSOR_LED),
            ),
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightHal for Board {
    type Pulses = PulseTimers;
    type Sensor = SensorSpi;
    type Link = LinkUart;
    type Storage = ConfigFlash;
    type Host = HostPort;
    type Battery = BatteryAdc;
    type Indicator = PinIndicator<GpioPin, GpioPin>;

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
        Instant::now()
    }

    fn wait_for_event(&mut self) {
        // An event raised just before WFI waits at most one timer tick
        unsafe { riscv::asm::wfi() };
    }
}

//! Embassy time driver on the core cycle counter

use embassy_time_driver::{AlarmHandle, Driver};
use portable_atomic::{AtomicU32, Ordering};

/// HCLK of the CH32V203 at 144 MHz
const CYCLES_PER_US: u64 = 144;

/// Microsecond time base; the firmware polls time and never sets alarms
pub struct CycleTimeDriver {
    transfer_start: AtomicU32,
}

impl CycleTimeDriver {
    const fn new() -> Self {
        Self {
            transfer_start: AtomicU32::new(0),
        }
    }

    fn micros(&self) -> u64 {
        riscv::register::mcycle::read64() / CYCLES_PER_US
    }
}

impl Driver for CycleTimeDriver {
    fn now(&self) -> u64 {
        self.micros()
    }

    unsafe fn allocate_alarm(&self) -> Option<AlarmHandle> {
        None
    }

    fn set_alarm_callback(&self, _alarm: AlarmHandle, _callback: fn(*mut ()), _ctx: *mut ()) {}

    fn set_alarm(&self, _alarm: AlarmHandle, _timestamp: u64) -> bool {
        false
    }
}

embassy_time_driver::time_driver_impl!(static DRIVER: CycleTimeDriver = CycleTimeDriver::new());

/// Remember when the sensor burst read started
pub fn mark_transfer_start() {
    DRIVER
        .transfer_start
        .store(DRIVER.micros() as u32, Ordering::Relaxed);
}

/// Microseconds since [`mark_transfer_start`]
pub fn transfer_elapsed_us() -> u32 {
    (DRIVER.micros() as u32).wrapping_sub(DRIVER.transfer_start.load(Ordering::Relaxed))
}

// Critical section implementation for single-core RISC-V
critical_section::set_impl!(RiscvCriticalSection);

struct RiscvCriticalSection;

unsafe impl critical_section::Impl for RiscvCriticalSection {
    unsafe fn acquire() -> u8 {
        let mut mstatus: usize;
        core::arch::asm!("csrrci {}, mstatus, 8", out(reg) mstatus);
        (mstatus & 8) as u8
    }

    unsafe fn release(was_active: u8) {
        if was_active != 0 {
            core::arch::asm!("csrsi mstatus, 8");
        }
    }
}

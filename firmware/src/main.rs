#![no_std]
#![no_main]

#[cfg(feature = "defmt")]
use defmt_rtt as _;

// RISC-V runtime
use riscv_rt as _;

// Panic handler
#[cfg(not(feature = "panic-probe"))]
use panic_halt as _;
#[cfg(feature = "panic-probe")]
use panic_probe as _;

use static_cell::StaticCell;

use tricopter_firmware::interrupts;
use tricopter_firmware::*;

static BOARD: StaticCell<Board> = StaticCell::new();

/// Main firmware entry point
#[riscv_rt::entry]
fn main() -> ! {
    #[cfg(feature = "defmt")]
    defmt::info!("🚁 Tricopter firmware v{} starting...", VERSION);

    let board = BOARD.init(Board::new());
    interrupts::init_beeper();

    let mut controller = FlightController::boot(&SHARED, FLIGHT_CONFIG, board);

    #[cfg(feature = "defmt")]
    defmt::info!("✨ Flight loop running, calibrating gyro");

    controller.run(board)
}

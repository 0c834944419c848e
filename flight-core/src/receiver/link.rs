//! Frame boundary realignment for the radio link

use crate::hal::{Duration, FlightHal, LinkPort};

/// How a resync finished
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResyncOutcome {
    /// Gap between frames found; reception restarts on a boundary
    IdleLine,
    /// No gap found within the bound; reception restarts anyway
    TimedOut,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SyncState {
    Synchronizing,
    Receiving,
}

/// Resynchronization state machine.
///
/// Stops frame delivery, drops bytes until the line goes idle or the bound
/// elapses, then re-arms reception for whole frames. It always ends in the
/// receiving state, so a valid frame right after a bad one is decoded
/// normally.
pub struct LinkSync {
    state: SyncState,
    frame_len: usize,
    bound: Duration,
    resyncs: u16,
}

impl LinkSync {
    pub const fn new(frame_len: usize, bound: Duration) -> Self {
        Self {
            state: SyncState::Synchronizing,
            frame_len,
            bound,
            resyncs: 0,
        }
    }

    pub fn resync<H: FlightHal>(
        &mut self,
        hal: &mut H,
    ) -> Result<ResyncOutcome, <H::Link as LinkPort>::Error> {
        self.state = SyncState::Synchronizing;
        self.resyncs = self.resyncs.wrapping_add(1);
        hal.link().stop_reception()?;

        let start = hal.now();
        let outcome = loop {
            if hal.link().line_idle() {
                break ResyncOutcome::IdleLine;
            }
            if hal.now().saturating_duration_since(start) >= self.bound {
                break ResyncOutcome::TimedOut;
            }
            hal.link().discard_byte();
        };

        hal.link().start_reception(self.frame_len)?;
        self.state = SyncState::Receiving;
        Ok(outcome)
    }

    pub fn is_receiving(&self) -> bool {
        self.state == SyncState::Receiving
    }

    pub fn resync_count(&self) -> u16 {
        self.resyncs
    }
}

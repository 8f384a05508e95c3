//! Single-flight flag for rebuilds.
//!
//! At most one holder at a time. Unlike a lock, a second caller does not
//! wait: `try_enter` returns `None` and the caller skips its work.

use core::sync::atomic::{AtomicBool, Ordering};

/// Per-instance flight flag. Embed this in structs and guard the exclusive
/// section with `let Some(_g) = self.flight.try_enter() else { return };`.
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    in_flight: AtomicBool,
}

impl SingleFlight {
    pub(crate) const fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Claim the flag. Returns `None` if another holder is active.
    #[inline]
    pub(crate) fn try_enter(&self) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { owner: self })
    }

    #[inline]
    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// RAII guard returned by `SingleFlight::try_enter`. Clears the flag on drop,
/// including while unwinding.
#[derive(Debug)]
pub(crate) struct FlightGuard<'a> {
    owner: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.in_flight.store(false, Ordering::Release);
    }
}

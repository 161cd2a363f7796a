//! Wall-clock time source for hosted targets.

use std::time::{Duration, Instant};

use nwp_shared::Clock;

/// [`Clock`] backed by [`std::time::Instant`]
///
/// Polling loops yield the thread between polls instead of spinning.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: Instant) -> Duration {
        since.elapsed()
    }

    fn relax(&mut self) {
        std::thread::yield_now();
    }
}

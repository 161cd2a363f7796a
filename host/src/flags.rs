//! Event flag word used to wake the dispatch worker.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Ask the worker to exit
pub const TERMINATE: u32 = 1 << 0;
/// Raised by the worker just before it exits
pub const TERMINATE_ACK: u32 = 1 << 1;
/// A registration request is waiting
pub const REGISTER: u32 = 1 << 2;
/// One or more binding queues have new items
pub const EVENT: u32 = 1 << 3;

/// A word of event bits with blocking wait
#[derive(Debug, Default)]
pub struct EventFlags {
    bits: Mutex<u32>,
    changed: Condvar,
}

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, mask: u32) {
        *self.lock() |= mask;
        self.changed.notify_all();
    }

    pub fn clear(&self, mask: u32) {
        *self.lock() &= !mask;
    }

    pub fn get(&self) -> u32 {
        *self.lock()
    }

    /// Block until any bit in `mask` is set, then clear and return those bits
    ///
    /// Returns 0 if `timeout` elapses first. `None` waits forever.
    pub fn wait_any(&self, mask: u32, timeout: Option<Duration>) -> u32 {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut bits = self.lock();
        loop {
            let hit = *bits & mask;
            if hit != 0 {
                *bits &= !hit;
                return hit;
            }
            bits = match deadline {
                None => self
                    .changed
                    .wait(bits)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return 0;
                    }
                    self.changed
                        .wait_timeout(bits, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

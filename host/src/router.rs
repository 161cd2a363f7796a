//! Frame router bridging the bus to the dispatch engine.
//!
//! The router is what a host's interrupt line handler calls: it asks the NWP
//! whether a frame is pending, reads it, acknowledges the interrupt and hands
//! the frame to the [`EventQueue`] registered for its frame type, then wakes
//! the dispatch worker.

use std::collections::HashMap;

use log::{debug, trace, warn};
use nwp_shared::protocol::{INT_FRAME_PENDING, INT_STATUS_REG};
use nwp_shared::{BusLink, Frame, LinkHal, RegisterWidth};

use crate::engine::EventSignal;
use crate::error::Result;
use crate::queue::EventQueue;

/// Counters kept by the router
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    /// Frames pushed into a route's queue
    pub routed: u64,
    /// Frames with no route for their type
    pub unrouted: u64,
    /// Frames dropped because the route's queue was full
    pub overflowed: u64,
}

/// Routes received frames to event queues by frame type
pub struct FrameRouter {
    routes: HashMap<u8, EventQueue<Frame>>,
    signal: EventSignal,
    stats: RouterStats,
}

impl FrameRouter {
    pub fn new(signal: EventSignal) -> Self {
        Self {
            routes: HashMap::new(),
            signal,
            stats: RouterStats::default(),
        }
    }

    /// Send frames of `frame_type` to `queue`, returning any previous route
    pub fn route(&mut self, frame_type: u8, queue: EventQueue<Frame>) -> Option<EventQueue<Frame>> {
        debug!("routing frame type {:#04x}", frame_type);
        self.routes.insert(frame_type, queue)
    }

    pub fn unroute(&mut self, frame_type: u8) -> Option<EventQueue<Frame>> {
        self.routes.remove(&frame_type)
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Service one interrupt
    ///
    /// Returns `Ok(false)` if no frame was pending.
    pub fn service<H: LinkHal>(&mut self, bus: &mut BusLink<H>) -> Result<bool> {
        let status = bus.read_interrupt_status()?;
        if status & INT_FRAME_PENDING == 0 {
            trace!("interrupt status {:#06x}, nothing pending", status);
            return Ok(false);
        }

        let frame = bus.read_frame()?;
        bus.write_register(INT_STATUS_REG, RegisterWidth::Word, INT_FRAME_PENDING)?;
        self.deliver(frame);
        Ok(true)
    }

    /// Service interrupts until nothing is pending or `limit` frames were read
    pub fn drain<H: LinkHal>(&mut self, bus: &mut BusLink<H>, limit: usize) -> Result<usize> {
        let mut count = 0;
        while count < limit && self.service(bus)? {
            count += 1;
        }
        Ok(count)
    }

    /// Push a frame into its route's queue and wake the worker
    pub fn deliver(&mut self, frame: Frame) {
        let frame_type = frame.frame_type();
        let Some(queue) = self.routes.get(&frame_type) else {
            warn!("no route for frame type {:#04x}, dropping", frame_type);
            self.stats.unrouted += 1;
            return;
        };

        match queue.push(frame) {
            Ok(()) => {
                self.stats.routed += 1;
                self.signal.notify();
            }
            Err(_) => {
                warn!("queue for frame type {:#04x} full, dropping", frame_type);
                self.stats.overflowed += 1;
            }
        }
    }
}

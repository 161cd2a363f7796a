//! # NWP Shared Library
//!
//! Host-side building blocks for talking to a network processor over a
//! synchronous serial bus:
//!
//! - **Bus Framing Protocol**: link bring-up, register, memory and frame
//!   exchanges, interrupt status polling ([`bus`])
//! - **Wire Format**: control words, acknowledge sentinels, frame descriptors
//!   ([`protocol`])
//! - **Queue**: a fixed-capacity FIFO with predicate removal and flush
//!   ([`queue`])
//! - **Hardware Seam**: the transfer, selection line and clock traits a board
//!   implements ([`traits`])
//!
//! ## Architecture
//!
//! ```text
//! caller ──► BusLink ──► Transaction ──► LinkHal (Transfer + SelectLine + Clock)
//!                │                              │
//!           LinkStats                     bus wires to the NWP
//! ```
//!
//! The crate is `no_std` without the default `std` feature and never
//! allocates: frame payloads and queue storage are fixed-capacity. Logging
//! goes through `defmt` or `log`, whichever feature is enabled.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(test, not(feature = "std")))]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bus;
pub mod protocol;
pub mod queue;
pub mod status;
pub mod traits;

#[cfg(all(feature = "std", any(test, feature = "testing")))]
pub mod testing;

// Re-export main types for convenience
pub use bus::{BusConfig, BusLink, LinkState, LinkStats};
pub use protocol::{ControlWord, Frame, FrameDescriptor, RegisterWidth, MAX_FRAME_PAYLOAD};
pub use queue::{Queue, QueueError};
pub use status::{LinkError, LinkResult};
pub use traits::{Clock, Hal, LinkHal, SelectLine, Transfer};

/// Library version for protocol compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

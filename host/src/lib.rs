//! # NWP Host Library
//!
//! The std side of the NWP link:
//!
//! - **Event Dispatch Engine**: a worker thread that owns event bindings and
//!   runs handlers off the producer's context ([`engine`])
//! - **Event Queues**: cloneable, mutex-guarded queues producers push into
//!   ([`queue`])
//! - **Frame Router**: services the NWP interrupt and routes frames to event
//!   queues by type ([`router`])
//! - **Configuration**: bus and engine settings loaded from JSON ([`config`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  read_frame  ┌─────────────┐  push + notify  ┌──────────────┐
//! │ BusLink      │─────────────►│ FrameRouter │────────────────►│ EventEngine  │
//! │ (nwp-shared) │              └─────────────┘                 │ worker thread│
//! └──────────────┘                                              └──────┬───────┘
//!                                                                      │
//!                                                          handler(event_id, frame)
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod queue;
pub mod router;

// Re-export main types for convenience
pub use clock::StdClock;
pub use config::{EngineConfig, HostConfig};
pub use engine::{EngineState, EventEngine, EventId, EventSignal, MAX_BINDINGS};
pub use error::{EngineError, HostError, Result};
pub use queue::{EventQueue, DEFAULT_EVENT_CAPACITY};
pub use router::{FrameRouter, RouterStats};

pub use nwp_shared;

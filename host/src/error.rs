//! Error types for the host crate.

use nwp_shared::LinkError;
use thiserror::Error;

/// Errors reported by the event dispatch engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dispatch engine is not running")]
    NotRunning,
    #[error("dispatch engine is already running")]
    AlreadyRunning,
    #[error("register_event called from the dispatch thread")]
    OnWorkerThread,
    #[error("registration queue is full")]
    RegistrationQueueFull,
    #[error("binding for event {event_id} rejected: binding table full")]
    Rejected { event_id: u32 },
    #[error("engine shut down before the registration was serviced")]
    Shutdown,
    #[error("worker did not acknowledge termination within {0} ms")]
    ShutdownTimeout(u32),
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("dispatch thread panicked")]
    WorkerPanicked,
    #[error("max_bindings {requested} exceeds binding capacity {capacity}")]
    TooManyBindings { requested: usize, capacity: usize },
}

impl EngineError {
    /// Equivalent code in the shared status space
    pub fn status(&self) -> LinkError {
        match self {
            EngineError::NotRunning | EngineError::AlreadyRunning | EngineError::OnWorkerThread => {
                LinkError::InvalidMode
            }
            EngineError::RegistrationQueueFull | EngineError::Spawn(_) => LinkError::NoMoreResource,
            EngineError::Rejected { .. } | EngineError::Shutdown | EngineError::WorkerPanicked => {
                LinkError::Fail
            }
            EngineError::ShutdownTimeout(_) => LinkError::Timeout,
            EngineError::TooManyBindings { .. } => LinkError::InvalidParameter,
        }
    }
}

impl From<EngineError> for LinkError {
    fn from(e: EngineError) -> Self {
        e.status()
    }
}

/// Top-level error for host applications
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, HostError>;

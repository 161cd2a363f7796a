//! Host configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "bus": { "start_token_timeout_ms": 2000 },
//!   "engine": { "thread_name": "wifi-events", "max_bindings": 8 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use log::debug;
use nwp_shared::BusConfig;
use serde::{Deserialize, Serialize};

use crate::engine::MAX_BINDINGS;
use crate::error::{EngineError, Result};

/// Dispatch engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name given to the worker thread
    pub thread_name: String,
    /// Worker thread stack size in bytes; unset uses the platform default
    ///
    /// Handlers run on this stack, including any panic unwind they trigger.
    pub stack_size: Option<usize>,
    /// How long `deinit` waits for the worker to acknowledge termination
    pub shutdown_timeout_ms: u32,
    /// Bindings the worker adopts before rejecting registrations
    pub max_bindings: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: "nwp-dispatch".to_string(),
            stack_size: None,
            shutdown_timeout_ms: 5_000,
            max_bindings: MAX_BINDINGS,
        }
    }
}

impl EngineConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms as u64)
    }

    /// Check the settings against compiled-in limits
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.max_bindings > MAX_BINDINGS {
            return Err(EngineError::TooManyBindings {
                requested: self.max_bindings,
                capacity: MAX_BINDINGS,
            });
        }
        Ok(())
    }
}

/// Complete host configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub bus: BusConfig,
    pub engine: EngineConfig,
}

impl HostConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: HostConfig = serde_json::from_str(json)?;
        config.engine.validate()?;
        debug!("loaded host config: {:?}", config);
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

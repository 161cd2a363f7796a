//! # Status Codes
//!
//! Every fallible operation in this crate reports one of the codes below.
//! Success is `Ok(..)`; the variants of [`LinkError`] cover the rest of the
//! shared status space used by the bus, the queue primitive and the host
//! dispatch engine.
//!
//! ## Taxonomy
//!
//! | Class              | Codes                                          | Retry?           |
//! |--------------------|------------------------------------------------|------------------|
//! | Parameter          | `InvalidParameter`, `NullPointer`, `InvalidMode` | never            |
//! | Transient link     | `Busy`, `Timeout`                              | caller may retry |
//! | Terminal link      | `Fail`                                         | whole exchange   |
//! | Resource           | `NoMoreResource`                               | after freeing    |
//! | Queue              | `Empty`, `NotFound`                            | n/a              |

use core::fmt;

/// Error half of the shared status space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Explicit FAIL acknowledge, or a transport-level failure
    Fail,
    /// The peer never produced a start token / acknowledge in time
    Busy,
    /// A polling loop ran out of time
    Timeout,
    /// A required handle was missing
    NullPointer,
    /// Allocation or capacity exhausted
    NoMoreResource,
    /// A parameter was out of range (zero length, oversized, bad width)
    InvalidParameter,
    /// The operation is not allowed in the current state
    InvalidMode,
    /// The queue holds no nodes
    Empty,
    /// No queued node satisfied the predicate
    NotFound,
}

/// Result type alias for link operations
pub type LinkResult<T> = Result<T, LinkError>;

impl LinkError {
    /// Whether the caller may legitimately retry the whole operation
    pub fn is_transient(&self) -> bool {
        matches!(self, LinkError::Busy | LinkError::Timeout)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LinkError::Fail => "operation failed",
            LinkError::Busy => "peer busy",
            LinkError::Timeout => "timed out",
            LinkError::NullPointer => "missing handle",
            LinkError::NoMoreResource => "no more resources",
            LinkError::InvalidParameter => "invalid parameter",
            LinkError::InvalidMode => "invalid mode",
            LinkError::Empty => "queue empty",
            LinkError::NotFound => "no matching entry",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LinkError {}

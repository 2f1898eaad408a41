//! Error taxonomy and the shared first-error-wins error state.

use parking_lot::Mutex;

/// Errors reported by engine operations.
///
/// Every public engine call returns `Result<T, Error>`. Failures are also
/// recorded in the engine's [`ErrorState`] so callers that prefer polling can
/// consult it instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Unknown source, buffer or context id.
    #[error("invalid {kind} name {id}")]
    InvalidName {
        /// What kind of object was named ("source", "buffer", "context").
        kind: &'static str,
        /// The offending id.
        id: u32,
    },

    /// Out-of-range parameter or count.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// Unsupported attribute selector or value shape.
    #[error("illegal enum: {0}")]
    IllegalEnum(&'static str),

    /// Operation not valid in the current state.
    #[error("illegal command: {0}")]
    IllegalCommand(&'static str),

    /// Allocation failure while growing a pool or scratch buffer.
    #[error("out of memory")]
    OutOfMemory,

    /// A device backend failed.
    #[error("device error: {0}")]
    Device(String),
}

impl Error {
    /// Shorthand for an unknown source id.
    pub(crate) fn no_source(id: u32) -> Self {
        Error::InvalidName { kind: "source", id }
    }

    /// Shorthand for an unknown buffer id.
    pub(crate) fn no_buffer(id: u32) -> Self {
        Error::InvalidName { kind: "buffer", id }
    }

    /// Shorthand for an unknown context id.
    pub(crate) fn no_context(id: u32) -> Self {
        Error::InvalidName {
            kind: "context",
            id,
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error slot.
///
/// Holds the first error recorded since the last [`take`](Self::take); later
/// errors are dropped until the slot is read.
#[derive(Debug, Default)]
pub struct ErrorState {
    slot: Mutex<Option<Error>>,
}

impl ErrorState {
    /// Creates an empty error state.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Records `error` unless an earlier error is still unread.
    pub fn record(&self, error: &Error) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(error.clone());
        }
    }

    /// Returns and clears the recorded error.
    pub fn take(&self) -> Option<Error> {
        self.slot.lock().take()
    }

    /// Returns the recorded error without clearing it.
    pub fn peek(&self) -> Option<Error> {
        self.slot.lock().clone()
    }
}

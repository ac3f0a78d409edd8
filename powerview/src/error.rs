//! Shade adapter error types
//!
//! Normalization and command routing never fail; errors only come from the
//! boundaries (JSON decoding, the hub channel and the per-shade worker).

use crate::events::ShadeEvent;
use crate::state::ShadeId;
use thiserror::Error;

/// Result alias for shade operations
pub type ShadeResult<T> = Result<T, ShadeError>;

/// Errors raised at the edges of the shade adapter
#[derive(Debug, Error)]
pub enum ShadeError {
    #[error("Hub unavailable: {0}")]
    HubUnavailable(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shade {0} is not registered")]
    UnknownShade(ShadeId),

    #[error("Telemetry does not name a shade")]
    MissingShadeId,

    /// Telemetry was applied and its events emitted, but the forced poll
    /// it called for could not be handed to the hub
    #[error("Forced poll failed after emitting {} events: {source}", events.len())]
    RepollFailed {
        events: Vec<ShadeEvent>,
        #[source]
        source: Box<ShadeError>,
    },

    #[error("Shade worker stopped during {operation}")]
    WorkerStopped { operation: String },

    #[error("Shade {operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

impl ShadeError {
    /// Create a timeout error with operation context
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        ShadeError::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a worker-stopped error with operation context
    pub fn worker_stopped(operation: impl Into<String>) -> Self {
        ShadeError::WorkerStopped {
            operation: operation.into(),
        }
    }

    /// Check if the failed call is worth repeating
    pub fn is_retryable(&self) -> bool {
        match self {
            ShadeError::Timeout { .. } => true,
            ShadeError::HubUnavailable(_) => false,
            ShadeError::Decode(_) => false,
            ShadeError::InvalidConfig(_) => false,
            ShadeError::UnknownShade(_) => false,
            ShadeError::MissingShadeId => false,
            ShadeError::RepollFailed { source, .. } => source.is_retryable(),
            ShadeError::WorkerStopped { .. } => false,
        }
    }
}

impl ShadeError {
    /// Attribute events that reached the host before the failure
    pub fn emitted_events(&self) -> &[ShadeEvent] {
        match self {
            ShadeError::RepollFailed { events, .. } => events,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for ShadeError {
    fn from(err: serde_json::Error) -> Self {
        ShadeError::Decode(err.to_string())
    }
}

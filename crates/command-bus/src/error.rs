use thiserror::Error;

use crate::ListenerDescriptor;

/// Errors raised by the transport itself, never by command handling.
#[derive(Debug, Error)]
pub enum BusError {
    /// Nobody is registered for the descriptor a command was sent to.
    #[error("No handler registered for {0}")]
    NoRoute(ListenerDescriptor),

    /// A second handler tried to bind an already-bound descriptor.
    #[error("A handler is already registered for {0}")]
    DuplicateListener(ListenerDescriptor),

    #[error("Failed to serialize command: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;

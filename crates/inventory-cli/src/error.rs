//! CLI error types.

use command_bus::BusError;
use domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Command bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// The aggregate stopped publishing before every command had an outcome.
    #[error("Notification stream closed after {received} of {expected} outcomes")]
    NotificationsClosed { received: usize, expected: usize },
}

//! Error types for skillcert-node.

use crate::payment::PaymentRejection;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in skillcert-node.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed request input (bad wallet address, wrong answer count, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Payment could not be verified; carries the specific rejection reason.
    #[error("payment rejected: {0}")]
    PaymentRejected(#[from] PaymentRejection),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The test already has a recorded result and cannot be graded again.
    #[error("test already settled: {0}")]
    AlreadySettled(String),

    /// Durable storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Chain RPC failure (transport or malformed response).
    #[error("chain error: {0}")]
    Chain(String),

    /// An external collaborator (question source, minting service) failed.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//! Error types for the authentication gateway

use std::io;

use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Negotiation round trip failed (wraps the underlying mechanism's cause)
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// A presented token did not verify (bad signature, wrong shape, expired)
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Role directory lookup itself errored. Always treated fail-closed.
    #[error("Role directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this failure means "no identity was established" as opposed
    /// to "an identity was refused". Both deny the request; the distinction
    /// only shapes the message sent back to the client.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::NegotiationFailed(_) | Self::InvalidToken(_))
    }
}

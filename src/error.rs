//! Error types for session and transfer operations

use thiserror::Error;

/// Errors that can occur while managing or talking to a device
#[derive(Error, Debug)]
pub enum HidError {
    // Session/registry errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Session is not open")]
    NotOpen,

    // Permission handshake
    #[error("Permission denied by host")]
    PermissionDenied,

    #[error("Permission request failed: {0}")]
    PermissionRequest(String),

    // Open sequence
    #[error("Failed to claim interface {0}")]
    ClaimFailed(usize),

    #[error("Missing input or output endpoint on interface {0}")]
    MissingEndpoint(usize),

    // Transfers
    #[error("Transfer timeout")]
    Timeout,

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Empty report buffer")]
    EmptyReport,

    // Identifier persistence
    #[error("Identifier storage error: {0}")]
    Storage(#[from] sled::Error),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

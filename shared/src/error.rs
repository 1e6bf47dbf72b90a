//! Link error kinds

use thiserror::Error;

/// Errors surfaced by device discovery, connection and reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth is not supported on this device")]
    AdapterUnavailable,

    #[error("Bluetooth is turned off")]
    AdapterDisabled,

    #[error("HC-05 not found among paired devices, pair it first")]
    DeviceNotFound,

    #[error("Bluetooth permission denied")]
    PermissionDenied,

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Read error: {0}")]
    Read(String),
}

impl LinkError {
    /// Map an I/O error raised while opening a link
    pub fn from_connect_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => LinkError::PermissionDenied,
            _ => LinkError::ConnectFailed(err.to_string()),
        }
    }

    /// Whether this error must stop any further connection attempts
    pub fn is_permission(&self) -> bool {
        matches!(self, LinkError::PermissionDenied)
    }
}

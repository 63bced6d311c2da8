use std::net::SocketAddr;

use crate::selector::ParseError;

/// All error types that can occur when talking to the daemon.
///
/// Malformed datagrams never surface here: the codec's
/// [`DecodeError`](crate::wire::DecodeError) is handled inside the event loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// The target selector could not be parsed.
    #[error("invalid target selector: {0}")]
    Selector(#[from] ParseError),

    /// A device or site address was not 12 hex digits.
    #[error("invalid device address: {0}")]
    InvalidDeviceId(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bulb was reported for a gateway the registry doesn't know.
    #[error("gateway {0} is not registered")]
    UnknownGateway(SocketAddr),

    /// The event loop is no longer running.
    #[error("the daemon has stopped")]
    DaemonStopped,
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new configuration error
    pub fn invalid_config(reason: &str) -> Self {
        Error::InvalidConfig(reason.to_string())
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

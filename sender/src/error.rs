// sender/src/error.rs

use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of a single send run. Nothing is retried; the first one ends the run.
#[derive(Debug, Error)]
pub enum SenderError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("failed to send {kind} frame: {source}")]
    Transmission {
        kind: &'static str,
        #[source]
        source: tungstenite::Error,
    },

    #[error("peer closed the connection before the {kind} frame was sent")]
    ClosedByPeer { kind: &'static str },

    #[error("failed to serialize {kind} frame: {source}")]
    Serialization {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("sender already finished in state {0:?}")]
    AlreadyFinished(crate::sender::SenderState),
}

impl SenderError {
    /// Connection could not be established (refused, unreachable, bad handshake, timeout).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::ConnectTimeout { .. })
    }

    /// Connection was up but the frame did not make it out.
    pub fn is_transmission(&self) -> bool {
        matches!(self, Self::Transmission { .. } | Self::ClosedByPeer { .. })
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("output device id must be non-negative, got {0}")]
    InvalidDeviceId(i32),
}

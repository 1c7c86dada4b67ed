//! Client-side error type.

use thiserror::Error;

use gaze_shared::BridgeError;

/// Errors surfaced to guest code by the IPC client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The host did not answer within the deadline.
    #[error("request on '{channel}' timed out after {timeout_ms}ms")]
    Timeout { channel: String, timeout_ms: u64 },

    /// The host answered with an error envelope.
    #[error("request failed with {code}: {message}")]
    Request { code: String, message: String },

    /// The channel is not in this surface's allow-list.
    #[error("channel '{0}' is not allowed for this surface")]
    ChannelNotAllowed(String),

    /// The bridge itself failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ClientError {
    /// `true` when the failure is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The machine-readable error code from the host, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Request { code, .. } => Some(code),
            _ => None,
        }
    }
}

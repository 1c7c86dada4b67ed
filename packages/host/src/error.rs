//! Error types for host-side operations.

use gaze_shared::{BridgeError, UnknownWindowType, ValidationError};
use thiserror::Error;

/// Result type alias for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur in the host core.
#[derive(Debug, Error)]
pub enum HostError {
    /// A window type name did not parse.
    #[error(transparent)]
    UnknownWindowType(#[from] UnknownWindowType),

    /// A window id did not resolve to a live window.
    #[error("window {0} not found")]
    WindowNotFound(u64),

    /// A channel was used without being declared in the registry.
    #[error("channel '{0}' is not registered")]
    ChannelNotRegistered(String),

    /// A sender identity failed the channel's allow-list check.
    #[error("'{sender}' is not authorized to send on '{channel}'")]
    NotAuthorized {
        /// Channel the send was attempted on.
        channel: String,
        /// Identity that attempted the send.
        sender: String,
    },

    /// An incoming message failed structural validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A bridge operation failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// A handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Persistence or other filesystem work failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload or persisted document did not (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HostError {
    /// Returns `true` if this error indicates a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::WindowNotFound(_) | Self::ChannelNotRegistered(_) | Self::UnknownWindowType(_)
        )
    }

    /// Returns `true` if this error is an authorization refusal.
    #[must_use]
    pub const fn is_authorization_error(&self) -> bool {
        matches!(self, Self::NotAuthorized { .. })
    }

    /// Stable machine-readable code used in error response envelopes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownWindowType(_) => "UNKNOWN_WINDOW_TYPE",
            Self::WindowNotFound(_) => "WINDOW_NOT_FOUND",
            Self::ChannelNotRegistered(_) => "CHANNEL_NOT_REGISTERED",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::Validation(_) => "INVALID_MESSAGE",
            Self::Bridge(_) => "BRIDGE_ERROR",
            Self::Handler(_) => "HANDLER_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(HostError::WindowNotFound(7).to_string(), "window 7 not found");
        assert_eq!(
            HostError::ChannelNotRegistered("x:y".into()).to_string(),
            "channel 'x:y' is not registered"
        );
        assert_eq!(
            HostError::NotAuthorized {
                channel: "state:update".into(),
                sender: "renderer-1".into(),
            }
            .to_string(),
            "'renderer-1' is not authorized to send on 'state:update'"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(HostError::WindowNotFound(1).is_not_found());
        assert!(HostError::ChannelNotRegistered("a".into()).is_not_found());
        assert!(!HostError::Handler("x".into()).is_not_found());

        let denied = HostError::NotAuthorized {
            channel: "a".into(),
            sender: "b".into(),
        };
        assert!(denied.is_authorization_error());
        assert_eq!(denied.code(), "NOT_AUTHORIZED");
    }

    #[test]
    fn test_validation_conversion() {
        let error: HostError = ValidationError::RequestWithoutDestination.into();
        assert_eq!(error.code(), "INVALID_MESSAGE");
    }
}

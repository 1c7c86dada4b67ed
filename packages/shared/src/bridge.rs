//! The constrained surface a guest uses to talk to the host.
//!
//! A [`Bridge`] is the only capability a guest holds. It exposes exactly
//! four verbs plus introspection over the channels its identity is allowed
//! to use. Implementations enforce the channel allow-lists before anything
//! reaches the host.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::message::Message;

/// Token identifying a registered listener.
pub type ListenerId = u64;

/// Callback invoked with messages arriving on a subscribed channel.
pub type BridgeListener = Arc<dyn Fn(&Message) + Send + Sync>;

/// Errors surfaced by bridge operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The channel is not in the caller's allow-list, or not registered.
    #[error("channel '{0}' is not allowed for this surface")]
    ChannelNotAllowed(String),
    /// The other side of the bridge is gone.
    #[error("bridge is disconnected")]
    Disconnected,
    /// The host failed to process the message.
    #[error("bridge operation failed: {0}")]
    Operation(String),
}

/// Guest-side capability for crossing the process boundary.
pub trait Bridge: Send + Sync {
    /// Sends a fire-and-forget message to the host.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelNotAllowed`] when the channel is not in
    /// the send allow-list.
    fn send(&self, channel: &str, message: Message) -> Result<(), BridgeError>;

    /// Subscribes to messages delivered on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelNotAllowed`] when the channel is not in
    /// the receive allow-list.
    fn receive(&self, channel: &str, listener: BridgeListener) -> Result<ListenerId, BridgeError>;

    /// Sends a request and resolves with the host's response message.
    fn invoke(&self, channel: &str, message: Message)
    -> BoxFuture<'static, Result<Message, BridgeError>>;

    /// Removes a listener previously returned by [`Bridge::receive`].
    fn remove_listener(&self, channel: &str, listener: ListenerId);

    /// Channels this surface may send on.
    fn valid_send_channels(&self) -> Vec<String>;

    /// Channels this surface may receive on.
    fn valid_receive_channels(&self) -> Vec<String>;

    /// Returns `true` if this surface may send on `channel`.
    fn is_valid_send_channel(&self, channel: &str) -> bool {
        self.valid_send_channels().iter().any(|name| name == channel)
    }

    /// Returns `true` if this surface may receive on `channel`.
    fn is_valid_receive_channel(&self, channel: &str) -> bool {
        self.valid_receive_channels().iter().any(|name| name == channel)
    }
}

//! Host-side bridge surface handed to guests.
//!
//! A [`HostBridge`] is minted per window. It snapshots the channels a
//! renderer identity may use and enforces them before anything touches the
//! IPC manager, so a compromised guest cannot reach channels outside its
//! allow-lists. Inbound traffic rides the window's delivery bus.

use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, ready};
use log::debug;

use gaze_shared::{Bridge, BridgeError, BridgeListener, ListenerId, Message};

use crate::ipc::IpcManager;
use crate::platform::PlatformWindow;

/// The identity class every windowed guest authenticates as.
const GUEST_IDENTITY: &str = "renderer";

/// A guest's capability to talk to this host.
pub struct HostBridge {
    ipc: Arc<IpcManager>,
    window: Weak<dyn PlatformWindow>,
    send_channels: Vec<String>,
    receive_channels: Vec<String>,
}

impl HostBridge {
    /// Mints a bridge for the guest hosted in `window`.
    #[must_use]
    pub fn for_window(ipc: Arc<IpcManager>, window: &Arc<dyn PlatformWindow>) -> Self {
        let registry = ipc.registry();
        let send_channels = registry
            .channels_for_sender(GUEST_IDENTITY)
            .into_iter()
            .map(str::to_string)
            .collect();
        let receive_channels = registry
            .channels_for_receiver(GUEST_IDENTITY)
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            ipc,
            window: Arc::downgrade(window),
            send_channels,
            receive_channels,
        }
    }

    /// The id of the window this bridge belongs to, while it is alive.
    #[must_use]
    pub fn window_id(&self) -> Option<u64> {
        self.window.upgrade().map(|window| window.id())
    }

    fn live_window(&self) -> Result<Arc<dyn PlatformWindow>, BridgeError> {
        self.window
            .upgrade()
            .filter(|window| !window.is_destroyed())
            .ok_or(BridgeError::Disconnected)
    }
}

impl Bridge for HostBridge {
    fn send(&self, channel: &str, message: Message) -> Result<(), BridgeError> {
        if !self.is_valid_send_channel(channel) {
            return Err(BridgeError::ChannelNotAllowed(channel.to_string()));
        }
        self.live_window()?;
        debug!("bridge send on '{channel}' from '{}'", message.source);
        self.ipc.handle_notification(&message);
        Ok(())
    }

    fn receive(&self, channel: &str, listener: BridgeListener) -> Result<ListenerId, BridgeError> {
        if !self.is_valid_receive_channel(channel) {
            return Err(BridgeError::ChannelNotAllowed(channel.to_string()));
        }
        let window = self.live_window()?;
        let subscribed = channel.to_string();
        Ok(window.on_delivery(Arc::new(move |delivered: &str, message: &Message| {
            if delivered == subscribed {
                listener(message);
            }
        })))
    }

    fn invoke(
        &self,
        channel: &str,
        message: Message,
    ) -> BoxFuture<'static, Result<Message, BridgeError>> {
        if !self.is_valid_send_channel(channel) {
            return Box::pin(ready(Err(BridgeError::ChannelNotAllowed(
                channel.to_string(),
            ))));
        }
        if self.live_window().is_err() {
            return Box::pin(ready(Err(BridgeError::Disconnected)));
        }
        let response = self.ipc.handle_request(message);
        Box::pin(async move { Ok(response.await) })
    }

    fn remove_listener(&self, _channel: &str, listener: ListenerId) {
        if let Some(window) = self.window.upgrade() {
            window.remove_delivery_listener(listener);
        }
    }

    fn valid_send_channels(&self) -> Vec<String> {
        self.send_channels.clone()
    }

    fn valid_receive_channels(&self) -> Vec<String> {
        self.receive_channels.clone()
    }
}

//! Host-side IPC manager.
//!
//! All guest traffic funnels through [`IpcManager`]. Requests run through a
//! fixed gauntlet before a handler sees them: structural validation, kind
//! check, then the sender allow-list from the channel registry. Handler
//! failures become error response envelopes; they never escape as panics or
//! host errors.

pub mod handlers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, ready};
use log::{debug, error, warn};
use parking_lot::RwLock;
use serde_json::Value;

use gaze_shared::{ChannelRegistry, ListenerId, Message, validate_message};

use crate::error::HostError;
use crate::logger;
use crate::platform::PlatformWindow;

/// Failure reported by a request handler.
#[derive(Debug, Clone)]
pub struct HandlerError {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional structured context.
    pub details: Option<Value>,
}

impl HandlerError {
    /// Creates a handler error.
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured context.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<HostError> for HandlerError {
    fn from(error: HostError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

/// Outcome of a request handler: the `data` half of a success envelope, or
/// an error to be wrapped in a failure envelope.
pub type HandlerResult = Result<Value, HandlerError>;

/// An async request handler.
pub type IpcHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A notification listener.
pub type IpcListener = Arc<dyn Fn(&Message) + Send + Sync>;

/// Source of live windows for broadcasts.
pub trait WindowLister: Send + Sync {
    /// All currently live windows.
    fn all_windows(&self) -> Vec<Arc<dyn PlatformWindow>>;
}

/// Maps a concrete message source onto the identity class used by the
/// channel allow-lists. `renderer-17...` checks as `renderer`.
#[must_use]
pub fn identity_class(source: &str) -> &str {
    if source == "main" {
        "main"
    } else if source.starts_with("renderer") {
        "renderer"
    } else {
        source
    }
}

/// Routes requests and notifications between the host and its guests.
pub struct IpcManager {
    registry: Arc<ChannelRegistry>,
    handlers: RwLock<HashMap<String, IpcHandler>>,
    listeners: RwLock<HashMap<String, HashMap<ListenerId, IpcListener>>>,
    next_listener: AtomicU64,
    windows: RwLock<Option<Weak<dyn WindowLister>>>,
    initialized: AtomicBool,
}

impl IpcManager {
    /// Creates a manager over the given channel registry.
    #[must_use]
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            handlers: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            windows: RwLock::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// The registry this manager enforces.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Wires the window source used by broadcasts. Called once by the
    /// composition root after the window manager exists.
    pub fn set_window_source(&self, source: Weak<dyn WindowLister>) {
        *self.windows.write() = Some(source);
    }

    /// Registers a request handler for a channel.
    ///
    /// Returns `false` when the channel is not declared in the registry.
    /// Registering over an existing handler replaces it with a warning.
    pub fn register_handler(&self, channel: &str, handler: IpcHandler) -> bool {
        if !self.registry.channel_exists(channel) {
            error!("refusing handler for unregistered channel '{channel}'");
            return false;
        }
        let previous = self.handlers.write().insert(channel.to_string(), handler);
        if previous.is_some() {
            warn!("handler for '{channel}' replaced");
        }
        true
    }

    /// Registers a notification listener for a channel.
    ///
    /// Returns `None` when the channel is not declared in the registry.
    pub fn register_listener(&self, channel: &str, listener: IpcListener) -> Option<ListenerId> {
        if !self.registry.channel_exists(channel) {
            error!("refusing listener for unregistered channel '{channel}'");
            return None;
        }
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(channel.to_string())
            .or_default()
            .insert(id, listener);
        Some(id)
    }

    /// Removes the handler for a channel. Unknown channels warn and return
    /// `false`.
    pub fn unregister_handler(&self, channel: &str) -> bool {
        if self.handlers.write().remove(channel).is_some() {
            true
        } else {
            warn!("no handler registered for '{channel}'");
            false
        }
    }

    /// Removes a single listener.
    pub fn unregister_listener(&self, channel: &str, listener: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(channel_listeners) = listeners.get_mut(channel) else {
            return false;
        };
        let removed = channel_listeners.remove(&listener).is_some();
        if channel_listeners.is_empty() {
            listeners.remove(channel);
        }
        removed
    }

    /// Removes every handler and listener.
    pub fn unregister_all(&self) {
        self.handlers.write().clear();
        self.listeners.write().clear();
    }

    /// Number of registered request handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Processes a request and produces the response message.
    ///
    /// Never fails: every rejection becomes an error response envelope
    /// correlated with the request.
    pub fn handle_request(&self, message: Message) -> BoxFuture<'static, Message> {
        if let Err(validation) = validate_message(&message) {
            return Box::pin(ready(Message::error_response(
                &message,
                "INVALID_MESSAGE",
                &validation.to_string(),
                None,
                "main",
            )));
        }
        if !message.is_request() {
            return Box::pin(ready(Message::error_response(
                &message,
                "NOT_A_REQUEST",
                "only request messages can be invoked",
                None,
                "main",
            )));
        }
        if !self.registry.channel_exists(&message.channel) {
            return Box::pin(ready(Message::error_response(
                &message,
                "CHANNEL_NOT_REGISTERED",
                &format!("channel '{}' is not registered", message.channel),
                None,
                "main",
            )));
        }
        if !self.registry.can_send(&message.channel, identity_class(&message.source)) {
            warn!(
                "rejected request on '{}' from unauthorized sender '{}'",
                message.channel, message.source
            );
            return Box::pin(ready(Message::error_response(
                &message,
                "NOT_AUTHORIZED",
                &format!(
                    "'{}' is not authorized to send on '{}'",
                    message.source, message.channel
                ),
                None,
                "main",
            )));
        }

        let handler = self.handlers.read().get(&message.channel).cloned();
        let Some(handler) = handler else {
            return Box::pin(ready(Message::error_response(
                &message,
                "HANDLER_NOT_FOUND",
                &format!("no handler registered for '{}'", message.channel),
                None,
                "main",
            )));
        };

        Box::pin(async move {
            debug!("dispatching request {} on '{}'", message.id, message.channel);
            match handler(message.clone()).await {
                Ok(data) => Message::success_response(&message, data, "main"),
                Err(failure) => Message::error_response(
                    &message,
                    &failure.code,
                    &failure.message,
                    failure.details,
                    "main",
                ),
            }
        })
    }

    /// Delivers a notification to the channel's listeners.
    ///
    /// Invalid or unauthorized notifications are dropped with a warning.
    /// Returns the number of listeners notified.
    pub fn handle_notification(&self, message: &Message) -> usize {
        if let Err(validation) = validate_message(message) {
            warn!("dropping invalid notification on '{}': {validation}", message.channel);
            return 0;
        }
        if !self.registry.can_send(&message.channel, identity_class(&message.source)) {
            warn!(
                "dropping notification on '{}' from unauthorized sender '{}'",
                message.channel, message.source
            );
            return 0;
        }

        let listeners: Vec<IpcListener> = self
            .listeners
            .read()
            .get(&message.channel)
            .map(|channel_listeners| channel_listeners.values().cloned().collect())
            .unwrap_or_default();

        for listener in &listeners {
            listener(message);
        }
        listeners.len()
    }

    /// Wraps a payload in a notification from `main` and delivers it to one
    /// window's guest surface.
    pub fn send_to_renderer(&self, window: &dyn PlatformWindow, channel: &str, payload: Value) -> bool {
        if !self.registry.can_send(channel, "main") {
            warn!("'main' may not send on '{channel}'");
            return false;
        }
        let message = Message::notification_to(channel, payload, "main", "renderer");
        let delivered = window.deliver(channel, &message);
        if !delivered {
            warn!("window {} is gone, dropped '{channel}' notification", window.id());
        }
        delivered
    }

    /// Broadcasts a payload to every live window. Returns the delivery count.
    pub fn broadcast_to_renderers(&self, channel: &str, payload: Value) -> usize {
        if !self.registry.can_send(channel, "main") {
            warn!("'main' may not send on '{channel}'");
            return 0;
        }
        let Some(windows) = self.window_list() else {
            warn!("no window source wired, dropped broadcast on '{channel}'");
            return 0;
        };

        let message = Message::notification_to(channel, payload, "main", "renderer");
        windows
            .iter()
            .filter(|window| !window.is_destroyed() && window.deliver(channel, &message))
            .count()
    }

    /// Forwards a payload from one guest to another, tagging source and
    /// destination with the window identities.
    pub fn forward_between_renderers(
        &self,
        from: u64,
        to: &dyn PlatformWindow,
        channel: &str,
        payload: Value,
    ) -> bool {
        if !self.registry.can_send(channel, "renderer") {
            warn!("'renderer' may not send on '{channel}'");
            return false;
        }
        let message = Message::notification_to(
            channel,
            payload,
            &format!("renderer-{from}"),
            &format!("renderer-{}", to.id()),
        );
        to.deliver(channel, &message)
    }

    /// Installs the builtin `log:message` listener.
    ///
    /// Idempotent; later calls warn and do nothing.
    pub fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("ipc manager already initialized");
            return;
        }
        self.register_listener(
            "log:message",
            Arc::new(|message: &Message| {
                logger::log_guest_record(&message.source, &message.payload);
            }),
        );
        debug!("ipc manager initialized");
    }

    /// Drops all registrations.
    pub fn shutdown(&self) {
        self.unregister_all();
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Live windows from the wired window source. Empty before the source
    /// is wired.
    #[must_use]
    pub fn live_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
        self.window_list()
            .unwrap_or_default()
            .into_iter()
            .filter(|window| !window.is_destroyed())
            .collect()
    }

    fn window_list(&self) -> Option<Vec<Arc<dyn PlatformWindow>>> {
        self.windows
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|lister| lister.all_windows())
    }
}

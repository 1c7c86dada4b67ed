//! Guest-side IPC client.
//!
//! [`IpcClient`] wraps a [`Bridge`] with the ergonomics guest code wants:
//! request/response with timeouts, fire-and-forget notifications that never
//! fail the caller, and multi-subscriber channel subscriptions multiplexed
//! over a single bridge listener per channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;

use gaze_shared::{Bridge, BridgeListener, ListenerId, Message, generate_id};

use crate::error::ClientError;

/// Default deadline for a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Token identifying a subscription on a channel.
pub type SubscriptionId = u64;

struct ChannelSubscription {
    bridge_listener: ListenerId,
    listeners: Arc<Mutex<HashMap<SubscriptionId, BridgeListener>>>,
}

/// A guest's connection to the host.
pub struct IpcClient {
    bridge: Arc<dyn Bridge>,
    renderer_id: String,
    timeout: Duration,
    pending: Arc<Mutex<HashMap<String, String>>>,
    subscriptions: Mutex<HashMap<String, ChannelSubscription>>,
    next_subscription: AtomicU64,
    available: AtomicBool,
}

impl IpcClient {
    /// Creates a client over a bridge with the default request timeout.
    #[must_use]
    pub fn new(bridge: Arc<dyn Bridge>) -> Self {
        Self::with_timeout(bridge, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom request timeout.
    #[must_use]
    pub fn with_timeout(bridge: Arc<dyn Bridge>, timeout: Duration) -> Self {
        Self {
            bridge,
            renderer_id: format!("renderer-{}", generate_id()),
            timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// The identity this client stamps on outgoing messages.
    #[must_use]
    pub fn renderer_id(&self) -> &str {
        &self.renderer_id
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// `true` while the client is usable.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Subscribes the builtin listeners. Call once after construction.
    pub fn initialize(&self) {
        let result = self.subscribe(
            "app:error",
            Arc::new(|message: &Message| {
                warn!("host reported error: {}", message.payload);
            }),
        );
        if result.is_err() {
            warn!("could not subscribe to app:error");
        }
    }

    /// Tears down every subscription and marks the client unavailable.
    pub fn shutdown(&self) {
        self.available.store(false, Ordering::SeqCst);
        let mut subscriptions = self.subscriptions.lock();
        for (channel, subscription) in subscriptions.drain() {
            self.bridge.remove_listener(&channel, subscription.bridge_listener);
        }
        self.pending.lock().clear();
    }

    /// Sends a request and waits for the response with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] when the deadline passes,
    /// [`ClientError::Request`] when the host answers with an error
    /// envelope, or a bridge error.
    pub async fn send_request(&self, channel: &str, payload: Value) -> Result<Value, ClientError> {
        self.send_request_with_timeout(channel, payload, self.timeout)
            .await
    }

    /// Sends a request with an explicit deadline.
    ///
    /// A timed-out request is forgotten; a response arriving later is
    /// dropped by the bridge since nobody awaits it.
    ///
    /// # Errors
    ///
    /// Same as [`IpcClient::send_request`].
    pub async fn send_request_with_timeout(
        &self,
        channel: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        if !self.bridge.is_valid_send_channel(channel) {
            return Err(ClientError::ChannelNotAllowed(channel.to_string()));
        }

        let request = Message::request(channel, payload, &self.renderer_id, "main");
        let request_id = request.id.clone();
        self.pending
            .lock()
            .insert(request_id.clone(), channel.to_string());
        debug!("request {request_id} on '{channel}'");

        let outcome = tokio::time::timeout(timeout, self.bridge.invoke(channel, request)).await;
        self.pending.lock().remove(&request_id);

        let response = match outcome {
            Err(_elapsed) => {
                return Err(ClientError::Timeout {
                    channel: channel.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Ok(result) => result?,
        };

        if response.is_success_response() {
            return Ok(response.response_data());
        }
        let error = response
            .error_from_response()
            .unwrap_or_else(|| gaze_shared::ResponseError {
                code: "MALFORMED_RESPONSE".to_string(),
                message: "response carried no error envelope".to_string(),
                details: None,
            });
        Err(ClientError::Request {
            code: error.code,
            message: error.message,
        })
    }

    /// Sends a fire-and-forget notification.
    ///
    /// Failures are logged, never surfaced; notification senders have no
    /// way to react anyway.
    pub fn send_notification(&self, channel: &str, payload: Value) {
        let message = Message::notification(channel, payload, &self.renderer_id);
        if let Err(err) = self.bridge.send(channel, message) {
            warn!("dropped notification on '{channel}': {err}");
        }
    }

    /// Subscribes a listener to a channel. Multiple subscribers per channel
    /// share one bridge listener.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ChannelNotAllowed`] when the channel is not
    /// receivable, or a bridge error.
    pub fn subscribe(
        &self,
        channel: &str,
        listener: BridgeListener,
    ) -> Result<SubscriptionId, ClientError> {
        if !self.bridge.is_valid_receive_channel(channel) {
            return Err(ClientError::ChannelNotAllowed(channel.to_string()));
        }

        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let mut subscriptions = self.subscriptions.lock();
        if let Some(subscription) = subscriptions.get(channel) {
            subscription.listeners.lock().insert(id, listener);
            return Ok(id);
        }

        let listeners: Arc<Mutex<HashMap<SubscriptionId, BridgeListener>>> =
            Arc::new(Mutex::new(HashMap::new()));
        listeners.lock().insert(id, listener);

        let fanout = Arc::clone(&listeners);
        let bridge_listener = self.bridge.receive(
            channel,
            Arc::new(move |message: &Message| {
                let current: Vec<BridgeListener> = fanout.lock().values().cloned().collect();
                for listener in current {
                    listener(message);
                }
            }),
        )?;

        subscriptions.insert(
            channel.to_string(),
            ChannelSubscription {
                bridge_listener,
                listeners,
            },
        );
        Ok(id)
    }

    /// Removes a subscription. The bridge listener is released when the
    /// last subscriber on the channel goes away.
    pub fn unsubscribe(&self, channel: &str, subscription: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let Some(entry) = subscriptions.get(channel) else {
            return false;
        };
        let removed = entry.listeners.lock().remove(&subscription).is_some();
        if removed && entry.listeners.lock().is_empty() {
            let entry = subscriptions.remove(channel);
            if let Some(entry) = entry {
                self.bridge.remove_listener(channel, entry.bridge_listener);
            }
        }
        removed
    }

    /// Number of channels with at least one live subscription.
    #[must_use]
    pub fn subscribed_channel_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

//! Window-to-window communication.
//!
//! Routes `window:message` traffic between windows, applies `window:state-sync`
//! updates to the state store and fans them out, and answers
//! `window:request-sync` with a snapshot of a domain. Maintains its own
//! registry of live windows from the `window:created`/`window:closed`
//! notifications.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};

use gaze_shared::{ListenerId, Message, WindowType};

use crate::ipc::{HandlerError, IpcManager, WindowLister};
use crate::platform::PlatformWindow;
use crate::store::StateStore;
use crate::windows::manager::WindowManager;

/// Identity parsed from a message source tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSource {
    /// The host process itself.
    Main,
    /// A guest, by its window id.
    Renderer(u64),
}

/// Parses a message source tag: `main`, or `renderer-<windowId>[...]`.
#[must_use]
pub fn extract_window_id(source: &str) -> Option<WindowSource> {
    if source == "main" {
        return Some(WindowSource::Main);
    }
    let rest = source.strip_prefix("renderer-")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok().map(WindowSource::Renderer)
}

/// Routes messages and state between windows.
pub struct WindowCommunicationManager {
    ipc: Arc<IpcManager>,
    store: Arc<StateStore>,
    manager: RwLock<Option<Weak<WindowManager>>>,
    known_windows: RwLock<HashMap<u64, WindowType>>,
    listeners: Mutex<Vec<(&'static str, ListenerId)>>,
}

impl WindowCommunicationManager {
    /// Creates a manager over the given IPC manager and state store.
    #[must_use]
    pub fn new(ipc: Arc<IpcManager>, store: Arc<StateStore>) -> Arc<Self> {
        Arc::new(Self {
            ipc,
            store,
            manager: RwLock::new(None),
            known_windows: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Wires the window manager used to resolve window ids.
    pub fn set_window_manager(&self, manager: Weak<WindowManager>) {
        *self.manager.write() = Some(manager);
    }

    /// Registers the communication handlers and the window registry
    /// listeners.
    pub fn initialize(self: &Arc<Self>) {
        let communication = Arc::downgrade(self);
        self.ipc.register_handler(
            "window:message",
            Arc::new(move |message: Message| {
                let communication = communication.clone();
                Box::pin(async move {
                    let Some(communication) = communication.upgrade() else {
                        return Err(HandlerError::new("UNAVAILABLE", "communication manager is gone"));
                    };
                    communication.handle_window_message(&message)
                })
            }),
        );

        let communication = Arc::downgrade(self);
        self.ipc.register_handler(
            "window:state-sync",
            Arc::new(move |message: Message| {
                let communication = communication.clone();
                Box::pin(async move {
                    let Some(communication) = communication.upgrade() else {
                        return Err(HandlerError::new("UNAVAILABLE", "communication manager is gone"));
                    };
                    communication.handle_state_sync(&message)
                })
            }),
        );

        let communication = Arc::downgrade(self);
        self.ipc.register_handler(
            "window:request-sync",
            Arc::new(move |message: Message| {
                let communication = communication.clone();
                Box::pin(async move {
                    let Some(communication) = communication.upgrade() else {
                        return Err(HandlerError::new("UNAVAILABLE", "communication manager is gone"));
                    };
                    communication.handle_request_sync(&message)
                })
            }),
        );

        let mut listeners = self.listeners.lock();

        let communication = Arc::downgrade(self);
        if let Some(listener) = self.ipc.register_listener(
            "window:created",
            Arc::new(move |message: &Message| {
                let Some(communication) = communication.upgrade() else {
                    return;
                };
                let Some(window_id) = message.payload["windowId"].as_u64() else {
                    return;
                };
                if let Ok(window_type) =
                    serde_json::from_value::<WindowType>(message.payload["windowType"].clone())
                {
                    communication.known_windows.write().insert(window_id, window_type);
                    debug!("registered window {window_id} ('{window_type}')");
                }
            }),
        ) {
            listeners.push(("window:created", listener));
        }

        let communication = Arc::downgrade(self);
        if let Some(listener) = self.ipc.register_listener(
            "window:closed",
            Arc::new(move |message: &Message| {
                let Some(communication) = communication.upgrade() else {
                    return;
                };
                if let Some(window_id) = message.payload["windowId"].as_u64() {
                    communication.known_windows.write().remove(&window_id);
                    debug!("unregistered window {window_id}");
                }
            }),
        ) {
            listeners.push(("window:closed", listener));
        }

        info!("window communication manager initialized");
    }

    /// Drops handlers, listeners, and the window registry.
    pub fn shutdown(&self) {
        self.ipc.unregister_handler("window:message");
        self.ipc.unregister_handler("window:state-sync");
        self.ipc.unregister_handler("window:request-sync");
        for (channel, listener) in self.listeners.lock().drain(..) {
            self.ipc.unregister_listener(channel, listener);
        }
        self.known_windows.write().clear();
    }

    /// Window ids currently known to the registry.
    #[must_use]
    pub fn known_window_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.known_windows.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Delivers a payload to one window over `window:message`.
    pub fn send_message_to_window(&self, target: u64, payload: Value, source: &str) -> bool {
        let Some(window) = self.resolve_window(target) else {
            warn!("window {target} not found, dropped window message");
            return false;
        };
        let message = Message::notification_to(
            "window:message",
            payload,
            source,
            &format!("renderer-{target}"),
        );
        window.deliver("window:message", &message)
    }

    /// Delivers a payload to every live window except `except`.
    /// Returns the delivery count.
    pub fn broadcast_message_to_all_except(
        &self,
        except: Option<u64>,
        payload: &Value,
        source: &str,
    ) -> usize {
        self.live_windows()
            .into_iter()
            .filter(|window| Some(window.id()) != except)
            .filter(|window| {
                let message = Message::notification_to(
                    "window:message",
                    payload.clone(),
                    source,
                    &format!("renderer-{}", window.id()),
                );
                window.deliver("window:message", &message)
            })
            .count()
    }

    /// Pushes a state change to every window except the one it came from.
    pub fn broadcast_state_change(
        &self,
        domain: &str,
        key: &str,
        value: &Value,
        except: Option<u64>,
    ) -> usize {
        let payload = json!({ "domain": domain, "key": key, "value": value });
        self.live_windows()
            .into_iter()
            .filter(|window| Some(window.id()) != except)
            .filter(|window| {
                let message = Message::notification_to(
                    "window:state-sync",
                    payload.clone(),
                    "main",
                    &format!("renderer-{}", window.id()),
                );
                window.deliver("window:state-sync", &message)
            })
            .count()
    }

    /// Rebroadcasts a window event to every guest.
    pub fn broadcast_window_event(&self, payload: Value) -> usize {
        self.ipc.broadcast_to_renderers("window:event", payload)
    }

    fn handle_window_message(&self, message: &Message) -> Result<Value, HandlerError> {
        let sender = extract_window_id(&message.source);
        let sender_id = match sender {
            Some(WindowSource::Renderer(id)) => Some(id),
            _ => None,
        };

        let target = &message.payload["targetWindowId"];
        let delivered = if target == &json!("all") {
            self.broadcast_message_to_all_except(sender_id, &message.payload, &message.source)
        } else if let Some(target_id) = target.as_u64() {
            usize::from(self.send_message_to_window(target_id, message.payload.clone(), &message.source))
        } else {
            return Err(HandlerError::new(
                "INVALID_PAYLOAD",
                "targetWindowId must be a window id or 'all'",
            ));
        };
        Ok(json!({ "delivered": delivered }))
    }

    fn handle_state_sync(&self, message: &Message) -> Result<Value, HandlerError> {
        let domain = message.payload["domain"]
            .as_str()
            .ok_or_else(|| HandlerError::new("INVALID_PAYLOAD", "missing field 'domain'"))?;
        let key = message.payload["key"]
            .as_str()
            .ok_or_else(|| HandlerError::new("INVALID_PAYLOAD", "missing field 'key'"))?;
        let value = message.payload["value"].clone();

        self.store
            .set_state(domain, Some(key), value.clone())
            .map_err(HandlerError::from)?;

        let except = match extract_window_id(&message.source) {
            Some(WindowSource::Renderer(id)) => Some(id),
            _ => None,
        };
        let synced = self.broadcast_state_change(domain, key, &value, except);
        Ok(json!({ "synced": synced }))
    }

    fn handle_request_sync(&self, message: &Message) -> Result<Value, HandlerError> {
        let domain = message.payload["domain"]
            .as_str()
            .ok_or_else(|| HandlerError::new("INVALID_PAYLOAD", "missing field 'domain'"))?;
        let data = self.store.get_state(domain, None).unwrap_or(Value::Null);

        // Also push a sync-response message so passive listeners see it.
        if let Some(WindowSource::Renderer(requester)) = extract_window_id(&message.source) {
            self.send_message_to_window(
                requester,
                json!({ "type": "sync-response", "domain": domain, "data": data }),
                "main",
            );
        }
        Ok(data)
    }

    fn resolve_window(&self, window_id: u64) -> Option<Arc<dyn PlatformWindow>> {
        let manager = self.manager.read().as_ref().and_then(Weak::upgrade)?;
        manager
            .window_by_id(window_id)
            .filter(|window| !window.is_destroyed())
    }

    fn live_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
        let Some(manager) = self.manager.read().as_ref().and_then(Weak::upgrade) else {
            return Vec::new();
        };
        manager
            .all_windows()
            .into_iter()
            .filter(|window| !window.is_destroyed())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_window_id() {
        assert_eq!(extract_window_id("main"), Some(WindowSource::Main));
        assert_eq!(extract_window_id("renderer-42"), Some(WindowSource::Renderer(42)));
        assert_eq!(
            extract_window_id("renderer-42-x7x7x7"),
            Some(WindowSource::Renderer(42))
        );
        assert_eq!(extract_window_id("renderer-"), None);
        assert_eq!(extract_window_id("renderer-abc"), None);
        assert_eq!(extract_window_id("somewhere"), None);
    }
}

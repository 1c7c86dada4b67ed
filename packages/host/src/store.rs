//! Shared state store for the host process.
//!
//! State is a two-level tree: domain, then key. Selected keys are marked as
//! synced and their changes are pushed to guests over `state:update`. Each
//! domain persists to its own JSON file under the application data
//! directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::{Map, Value, json};

use gaze_shared::{ListenerId, Message};

use crate::error::HostResult;
use crate::ipc::{HandlerError, IpcManager};

/// Directory under the data directory holding the per-domain files.
const STATE_DIR_NAME: &str = "state";

/// Callback invoked on state changes. The key is `None` when an entire
/// domain was replaced.
pub type StoreListener = Arc<dyn Fn(&str, Option<&str>, &Value) + Send + Sync>;

/// Domain/key state tree with listeners, guest sync, and persistence.
pub struct StateStore {
    dir: PathBuf,
    state: RwLock<HashMap<String, Map<String, Value>>>,
    listeners: RwLock<HashMap<String, HashMap<ListenerId, StoreListener>>>,
    next_listener: AtomicU64,
    synced: HashSet<&'static str>,
    ipc: RwLock<Option<Weak<IpcManager>>>,
}

impl StateStore {
    /// Creates a store persisting under `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: data_dir.join(STATE_DIR_NAME),
            state: RwLock::new(initial_state()),
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            synced: synced_keys(),
            ipc: RwLock::new(None),
        })
    }

    /// Reads a key, or a whole domain when `key` is `None`.
    ///
    /// Unknown domains warn and return `None`.
    #[must_use]
    pub fn get_state(&self, domain: &str, key: Option<&str>) -> Option<Value> {
        let state = self.state.read();
        let Some(entries) = state.get(domain) else {
            warn!("accessed unknown state domain '{domain}'");
            return None;
        };
        match key {
            Some(key) => entries.get(key).cloned(),
            None => Some(Value::Object(entries.clone())),
        }
    }

    /// Writes a key, or replaces a whole domain when `key` is `None`.
    ///
    /// Unknown domains are created with a warning. Synced keys are pushed to
    /// guests over `state:update`.
    ///
    /// # Errors
    ///
    /// Returns an error when a domain-level write is not a JSON object.
    pub fn set_state(&self, domain: &str, key: Option<&str>, value: Value) -> HostResult<()> {
        {
            let mut state = self.state.write();
            let entries = state.entry(domain.to_string()).or_insert_with(|| {
                warn!("creating new state domain '{domain}'");
                Map::new()
            });
            match key {
                Some(key) => {
                    entries.insert(key.to_string(), value.clone());
                    debug!("state {domain}.{key} updated");
                }
                None => {
                    let Value::Object(replacement) = value.clone() else {
                        return Err(crate::error::HostError::Handler(format!(
                            "domain '{domain}' must be set to an object"
                        )));
                    };
                    *entries = replacement;
                    debug!("state domain {domain} replaced");
                }
            }
        }

        self.notify_listeners(domain, key, &value);

        if let Some(key) = key {
            if self.is_synced(domain, key) {
                self.sync_with_guests(domain, key, &value);
            }
        }
        Ok(())
    }

    /// Subscribes to changes of a key, or of a whole domain when `key` is
    /// `None`. Returns a token for [`StateStore::unsubscribe`].
    pub fn subscribe(&self, domain: &str, key: Option<&str>, listener: StoreListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(listener_key(domain, key))
            .or_default()
            .insert(id, listener);
        id
    }

    /// Removes a subscription.
    pub fn unsubscribe(&self, domain: &str, key: Option<&str>, listener: ListenerId) -> bool {
        let map_key = listener_key(domain, key);
        let mut listeners = self.listeners.write();
        let Some(entry) = listeners.get_mut(&map_key) else {
            return false;
        };
        let removed = entry.remove(&listener).is_some();
        if entry.is_empty() {
            listeners.remove(&map_key);
        }
        removed
    }

    /// Resets one domain, or everything, back to the initial state.
    pub fn reset_state(&self, domain: Option<&str>) {
        let defaults = initial_state();
        match domain {
            Some(domain) => {
                if let Some(entries) = defaults.get(domain) {
                    // Defaults are objects, the error arm is unreachable.
                    let _ = self.set_state(domain, None, Value::Object(entries.clone()));
                    info!("reset state domain '{domain}'");
                } else {
                    warn!("attempted to reset unknown domain '{domain}'");
                }
            }
            None => {
                for domain in defaults.keys() {
                    self.reset_state(Some(domain));
                }
            }
        }
    }

    /// Writes one domain, or every domain, to disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the state directory or a file cannot be
    /// written.
    pub fn save_state(&self, domain: Option<&str>) -> HostResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let state = self.state.read().clone();
        match domain {
            Some(domain) => {
                if let Some(entries) = state.get(domain) {
                    self.write_domain(domain, entries)?;
                }
            }
            None => {
                for (domain, entries) in &state {
                    self.write_domain(domain, entries)?;
                }
            }
        }
        Ok(())
    }

    /// Loads one domain, or every persisted domain, from disk. Missing
    /// files are not an error.
    pub fn load_state(&self, domain: Option<&str>) {
        match domain {
            Some(domain) => self.load_domain(domain),
            None => {
                let Ok(entries) = std::fs::read_dir(&self.dir) else {
                    info!("no saved state found");
                    return;
                };
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    if let Some(domain) = name.to_str().and_then(|name| name.strip_suffix(".json")) {
                        self.load_domain(domain);
                    }
                }
            }
        }
    }

    /// Registers the `state:get`/`state:set` handlers, wires the guest sync
    /// path, and loads persisted state.
    pub fn initialize(self: &Arc<Self>, ipc: &Arc<IpcManager>) {
        *self.ipc.write() = Some(Arc::downgrade(ipc));

        let store = Arc::clone(self);
        ipc.register_handler(
            "state:get",
            Arc::new(move |message: Message| {
                let store = Arc::clone(&store);
                Box::pin(async move {
                    let domain = required_str(&message.payload, "domain")?;
                    let key = message.payload["key"].as_str();
                    Ok(store.get_state(domain, key).unwrap_or(Value::Null))
                })
            }),
        );

        let store = Arc::clone(self);
        ipc.register_handler(
            "state:set",
            Arc::new(move |message: Message| {
                let store = Arc::clone(&store);
                Box::pin(async move {
                    let domain = required_str(&message.payload, "domain")?;
                    let key = required_str(&message.payload, "key")?;
                    let value = message.payload["value"].clone();
                    store
                        .set_state(domain, Some(key), value)
                        .map_err(HandlerError::from)?;
                    Ok(Value::Null)
                })
            }),
        );

        self.load_state(None);
        info!("state store initialized");
    }

    /// Persists everything and drops all listeners.
    pub fn shutdown(&self) {
        if let Err(err) = self.save_state(None) {
            error!("failed to save state on shutdown: {err}");
        }
        self.listeners.write().clear();
        info!("state store shut down");
    }

    fn is_synced(&self, domain: &str, key: &str) -> bool {
        self.synced.contains(format!("{domain}.{key}").as_str())
    }

    fn sync_with_guests(&self, domain: &str, key: &str, value: &Value) {
        let Some(ipc) = self.ipc.read().as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let delivered = ipc.broadcast_to_renderers(
            "state:update",
            json!({ "domain": domain, "key": key, "value": value }),
        );
        debug!("synced {domain}.{key} with {delivered} guests");
    }

    fn notify_listeners(&self, domain: &str, key: Option<&str>, value: &Value) {
        let mut callbacks: Vec<StoreListener> = Vec::new();
        {
            let listeners = self.listeners.read();
            if let Some(domain_listeners) = listeners.get(domain) {
                callbacks.extend(domain_listeners.values().cloned());
            }
            if let Some(key) = key {
                if let Some(key_listeners) = listeners.get(&listener_key(domain, Some(key))) {
                    callbacks.extend(key_listeners.values().cloned());
                }
            }
        }
        for callback in callbacks {
            callback(domain, key, value);
        }
    }

    fn write_domain(&self, domain: &str, entries: &Map<String, Value>) -> HostResult<()> {
        let serialized = serde_json::to_string_pretty(&Value::Object(entries.clone()))?;
        std::fs::write(self.dir.join(format!("{domain}.json")), serialized)?;
        debug!("saved state domain '{domain}'");
        Ok(())
    }

    fn load_domain(&self, domain: &str) {
        let path = self.dir.join(format!("{domain}.json"));
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return;
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(value) if value.is_object() => {
                let _ = self.set_state(domain, None, value);
                info!("loaded state domain '{domain}'");
            }
            Ok(_) => warn!("state file for '{domain}' is not an object, ignored"),
            Err(err) => warn!("failed to parse state file for '{domain}': {err}"),
        }
    }
}

fn listener_key(domain: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("{domain}.{key}"),
        None => domain.to_string(),
    }
}

fn required_str<'payload>(
    payload: &'payload Value,
    field: &str,
) -> Result<&'payload str, HandlerError> {
    payload[field]
        .as_str()
        .ok_or_else(|| HandlerError::new("INVALID_PAYLOAD", format!("missing field '{field}'")))
}

/// Keys whose changes are pushed to guests.
fn synced_keys() -> HashSet<&'static str> {
    HashSet::from([
        "app.isReady",
        "app.theme",
        "camera.devices",
        "camera.selectedDevice",
        "camera.status",
        "detection.isActive",
        "detection.results",
        "detection.settings",
        "media.isRecording",
        "media.captureCount",
    ])
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn initial_state() -> HashMap<String, Map<String, Value>> {
    HashMap::from([
        (
            "app".to_string(),
            object(json!({
                "isReady": false,
                "theme": "light",
                "errors": [],
            })),
        ),
        (
            "camera".to_string(),
            object(json!({
                "devices": [],
                "selectedDevice": null,
                "status": "idle",
                "settings": { "width": 640, "height": 480, "frameRate": 30 },
            })),
        ),
        (
            "detection".to_string(),
            object(json!({
                "isActive": false,
                "faceDetection": {
                    "isActive": false,
                    "settings": { "minConfidence": 0.5, "maxResults": 5 },
                },
                "eyeContact": {
                    "isActive": false,
                    "settings": { "threshold": 0.7, "stabilizationFrames": 3 },
                },
                "results": { "faces": [], "eyeContact": false, "timestamp": null },
            })),
        ),
        (
            "media".to_string(),
            object(json!({
                "isRecording": false,
                "captureCount": 0,
                "storage": { "format": "png" },
            })),
        ),
        ("windows".to_string(), Map::new()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_shared::ChannelRegistry;
    use std::sync::atomic::AtomicUsize;

    fn store() -> (tempfile::TempDir, Arc<StateStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_get_and_set() {
        let (_dir, store) = store();

        assert_eq!(store.get_state("app", Some("theme")), Some(json!("light")));
        store.set_state("app", Some("theme"), json!("dark")).unwrap();
        assert_eq!(store.get_state("app", Some("theme")), Some(json!("dark")));

        assert!(store.get_state("nope", Some("x")).is_none());
        assert!(store.get_state("app", Some("missing")).is_none());

        let domain = store.get_state("app", None).unwrap();
        assert_eq!(domain["theme"], json!("dark"));
    }

    #[test]
    fn test_domain_replacement_requires_object() {
        let (_dir, store) = store();
        assert!(store.set_state("app", None, json!(3)).is_err());
        assert!(store.set_state("app", None, json!({ "theme": "dark" })).is_ok());
        assert_eq!(store.get_state("app", Some("theme")), Some(json!("dark")));
    }

    #[test]
    fn test_listeners_fire_and_unsubscribe() {
        let (_dir, store) = store();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let domain_listener = store.subscribe(
            "camera",
            None,
            Arc::new(move |_domain, _key, _value| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let counter = Arc::clone(&seen);
        store.subscribe(
            "camera",
            Some("status"),
            Arc::new(move |_domain, _key, _value| {
                counter.fetch_add(10, Ordering::SeqCst);
            }),
        );

        store.set_state("camera", Some("status"), json!("active")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 11);

        store.set_state("camera", Some("devices"), json!([])).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 12);

        assert!(store.unsubscribe("camera", None, domain_listener));
        store.set_state("camera", Some("status"), json!("idle")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let store = StateStore::new(dir.path());
        store.set_state("app", Some("theme"), json!("dark")).unwrap();
        store
            .set_state("windows", Some("main"), json!({ "width": 900, "height": 700 }))
            .unwrap();
        store.save_state(None).unwrap();

        let reloaded = StateStore::new(dir.path());
        reloaded.load_state(None);
        assert_eq!(reloaded.get_state("app", Some("theme")), Some(json!("dark")));
        assert_eq!(
            reloaded.get_state("windows", Some("main")),
            Some(json!({ "width": 900, "height": 700 }))
        );
    }

    #[test]
    fn test_reset_state() {
        let (_dir, store) = store();
        store.set_state("app", Some("theme"), json!("dark")).unwrap();
        store.reset_state(Some("app"));
        assert_eq!(store.get_state("app", Some("theme")), Some(json!("light")));

        // Unknown domains only warn.
        store.reset_state(Some("nope"));
    }

    #[tokio::test]
    async fn test_ipc_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let ipc = Arc::new(IpcManager::new(Arc::new(ChannelRegistry::with_builtin_channels())));
        store.initialize(&ipc);

        let set = Message::request(
            "state:set",
            json!({ "domain": "app", "key": "theme", "value": "dark" }),
            "renderer-1",
            "main",
        );
        assert!(ipc.handle_request(set).await.is_success_response());

        let get = Message::request(
            "state:get",
            json!({ "domain": "app", "key": "theme" }),
            "renderer-1",
            "main",
        );
        let response = ipc.handle_request(get).await;
        assert_eq!(response.response_data(), json!("dark"));

        let bad = Message::request("state:set", json!({ "domain": "app" }), "renderer-1", "main");
        let response = ipc.handle_request(bad).await;
        assert_eq!(response.error_from_response().unwrap().code, "INVALID_PAYLOAD");
    }
}

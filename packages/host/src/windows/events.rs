//! Window event funnel.
//!
//! Every raw platform event of every tracked window passes through
//! [`WindowEventHandler::handle_window_event`]. The funnel maps raw events
//! onto the uniform taxonomy, consults the window type's behavior, and
//! rebroadcasts unhandled events to guests through the communication
//! manager, falling back to a direct broadcast before that manager is
//! wired. Display topology changes also land here and trigger geometry
//! revalidation.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};

use gaze_shared::{ListenerId, WindowEventType, WindowType};

use crate::ipc::IpcManager;
use crate::platform::{DisplayEvent, PlatformWindow, RawWindowEvent, WindowBackend};
use crate::windows::behavior::{
    BehaviorContext, FacePanelBehavior, MainWindowBehavior, SettingsBehavior, WindowTypeBehavior,
};
use crate::windows::communication::WindowCommunicationManager;
use crate::windows::manager::WindowManager;
use crate::windows::state::WindowStateManager;

struct RegisteredWindow {
    window: Weak<dyn PlatformWindow>,
    window_type: WindowType,
    listener: ListenerId,
}

/// Funnels window and display events through one code path.
pub struct WindowEventHandler {
    ipc: Arc<IpcManager>,
    state: Arc<WindowStateManager>,
    backend: Arc<dyn WindowBackend>,
    context: BehaviorContext,
    behaviors: RwLock<HashMap<WindowType, Arc<dyn WindowTypeBehavior>>>,
    communication: RwLock<Option<Weak<WindowCommunicationManager>>>,
    manager: RwLock<Option<Weak<WindowManager>>>,
    registered: RwLock<HashMap<u64, RegisteredWindow>>,
    display_listener: Mutex<Option<ListenerId>>,
}

impl WindowEventHandler {
    /// Creates a funnel with the builtin behaviors installed.
    #[must_use]
    pub fn new(
        ipc: Arc<IpcManager>,
        state: Arc<WindowStateManager>,
        backend: Arc<dyn WindowBackend>,
        quit_requested: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let context = BehaviorContext {
            ipc: Arc::clone(&ipc),
            backend: Arc::clone(&backend),
            quit_requested,
        };

        let handler = Self {
            ipc,
            state,
            backend,
            context,
            behaviors: RwLock::new(HashMap::new()),
            communication: RwLock::new(None),
            manager: RwLock::new(None),
            registered: RwLock::new(HashMap::new()),
            display_listener: Mutex::new(None),
        };
        handler.install_behavior(Arc::new(MainWindowBehavior));
        handler.install_behavior(Arc::new(FacePanelBehavior::default()));
        handler.install_behavior(Arc::new(SettingsBehavior));
        Arc::new(handler)
    }

    /// Subscribes to display topology changes.
    pub fn initialize(self: &Arc<Self>) {
        let handler = Arc::downgrade(self);
        let listener = self.backend.on_display_event(Arc::new(move |event| {
            if let Some(handler) = handler.upgrade() {
                handler.handle_display_event(event);
            }
        }));
        *self.display_listener.lock() = Some(listener);
    }

    /// Unsubscribes from display events and drops window registrations.
    pub fn shutdown(&self) {
        if let Some(listener) = self.display_listener.lock().take() {
            self.backend.remove_display_listener(listener);
        }
        let registered: Vec<u64> = self.registered.read().keys().copied().collect();
        for window_id in registered {
            self.unregister_window_events(window_id);
        }
    }

    /// Wires the communication manager. Broadcasts fall back to the IPC
    /// manager until this is called.
    pub fn set_communication(&self, communication: Weak<WindowCommunicationManager>) {
        *self.communication.write() = Some(communication);
    }

    /// Wires the window manager for close bookkeeping.
    pub fn set_window_manager(&self, manager: Weak<WindowManager>) {
        *self.manager.write() = Some(manager);
    }

    /// Installs or replaces the behavior for a window type.
    pub fn install_behavior(&self, behavior: Arc<dyn WindowTypeBehavior>) {
        self.behaviors.write().insert(behavior.window_type(), behavior);
    }

    /// Removes the behavior for a window type.
    pub fn remove_behavior(&self, window_type: WindowType) -> bool {
        self.behaviors.write().remove(&window_type).is_some()
    }

    /// Attaches the funnel to a window and runs the type behavior's
    /// registration hook.
    pub fn register_window_events(self: &Arc<Self>, window: &Arc<dyn PlatformWindow>) {
        let window_id = window.id();
        if self.registered.read().contains_key(&window_id) {
            warn!("window {window_id} is already registered with the event funnel");
            return;
        }

        let handler = Arc::downgrade(self);
        let funneled = Arc::downgrade(window);
        let listener = window.on_event(Arc::new(move |event| {
            let Some(handler) = handler.upgrade() else {
                return;
            };
            let Some(window) = funneled.upgrade() else {
                return;
            };
            handler.handle_window_event(&window, event.event_type(), &event_data(event));
        }));

        self.registered.write().insert(
            window_id,
            RegisteredWindow {
                window: Arc::downgrade(window),
                window_type: window.window_type(),
                listener,
            },
        );

        if let Some(behavior) = self.behavior_for(window.window_type()) {
            if let Err(err) = behavior.on_register(&self.context, window) {
                error!(
                    "behavior registration failed for '{}' window {window_id}: {err}",
                    window.window_type()
                );
            }
        }
        debug!("registered events for window {window_id}");
    }

    /// Detaches the funnel from a window.
    pub fn unregister_window_events(&self, window_id: u64) {
        let Some(entry) = self.registered.write().remove(&window_id) else {
            return;
        };
        if let Some(window) = entry.window.upgrade() {
            window.remove_event_listener(entry.listener);
        }
        if let Some(behavior) = self.behavior_for(entry.window_type) {
            if let Err(err) = behavior.on_unregister(&self.context, window_id) {
                error!(
                    "behavior unregistration failed for '{}' window {window_id}: {err}",
                    entry.window_type
                );
            }
        }
    }

    /// The single funnel for window events.
    pub fn handle_window_event(
        &self,
        window: &Arc<dyn PlatformWindow>,
        event: WindowEventType,
        data: &Value,
    ) {
        if window.is_destroyed() && event != WindowEventType::Closed {
            return;
        }
        debug!("window {} event '{event}'", window.id());

        let handled = self
            .behavior_for(window.window_type())
            .map_or(Ok(false), |behavior| {
                behavior.on_event(&self.context, window, event, data)
            })
            .unwrap_or_else(|err| {
                error!(
                    "behavior failed on '{event}' for window {}: {err}",
                    window.id()
                );
                false
            });

        if handled {
            return;
        }

        self.broadcast_event(&json!({
            "windowId": window.id(),
            "windowType": window.window_type(),
            "event": event,
            "data": data,
        }));

        match event {
            // An unvetoed close request destroys the window.
            WindowEventType::Close => window.close(),
            WindowEventType::Closed => {
                if let Some(manager) = self.manager.read().as_ref().and_then(Weak::upgrade) {
                    manager.handle_closed(window.id());
                }
            }
            _ => {}
        }
    }

    /// Handles a display topology change: revalidate geometry, then tell
    /// the guests.
    pub fn handle_display_event(&self, event: &DisplayEvent) {
        let change = match event {
            DisplayEvent::Added(_) => "added",
            DisplayEvent::Removed(_) => "removed",
            DisplayEvent::MetricsChanged(_) => "metrics-changed",
        };
        debug!("display topology change: {change}");

        let revalidated = self.state.validate_all_window_states();
        self.broadcast_event(&json!({
            "event": "display-change",
            "data": { "change": change, "revalidated": revalidated },
        }));
    }

    fn broadcast_event(&self, payload: &Value) {
        let communication = self.communication.read().as_ref().and_then(Weak::upgrade);
        if let Some(communication) = communication {
            communication.broadcast_window_event(payload.clone());
        } else {
            self.ipc.broadcast_to_renderers("window:event", payload.clone());
        }
    }

    fn behavior_for(&self, window_type: WindowType) -> Option<Arc<dyn WindowTypeBehavior>> {
        self.behaviors.read().get(&window_type).cloned()
    }
}

/// Extracts the payload data for a raw event.
fn event_data(event: &RawWindowEvent) -> Value {
    match event {
        RawWindowEvent::Resized(bounds) => json!({
            "x": bounds.x,
            "y": bounds.y,
            "width": bounds.width,
            "height": bounds.height,
        }),
        RawWindowEvent::Moving { x, y }
        | RawWindowEvent::MoveEnded { x, y }
        | RawWindowEvent::SystemContextMenu { x, y } => json!({ "x": x, "y": y }),
        RawWindowEvent::TitleChanged(title) => json!({ "title": title }),
        RawWindowEvent::AppCommand(command) => json!({ "command": command }),
        _ => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::platform::WindowOptions;
    use crate::platform::headless::HeadlessBackend;
    use crate::store::StateStore;
    use gaze_shared::{ChannelRegistry, WindowState};

    struct Fixture {
        _dir: tempfile::TempDir,
        backend: Arc<HeadlessBackend>,
        ipc: Arc<IpcManager>,
        state: Arc<WindowStateManager>,
        handler: Arc<WindowEventHandler>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let backend = Arc::new(HeadlessBackend::new());
        let state = WindowStateManager::new(
            store,
            Arc::clone(&backend) as Arc<dyn WindowBackend>,
        );
        let ipc = Arc::new(IpcManager::new(Arc::new(ChannelRegistry::with_builtin_channels())));
        let handler = WindowEventHandler::new(
            Arc::clone(&ipc),
            Arc::clone(&state),
            Arc::clone(&backend) as Arc<dyn WindowBackend>,
            Arc::new(AtomicBool::new(false)),
        );
        Fixture {
            _dir: dir,
            backend,
            ipc,
            state,
            handler,
        }
    }

    #[test]
    fn test_event_data_extraction() {
        let data = event_data(&RawWindowEvent::Resized(gaze_shared::Rect::new(1, 2, 3, 4)));
        assert_eq!(data, json!({ "x": 1, "y": 2, "width": 3, "height": 4 }));

        let data = event_data(&RawWindowEvent::AppCommand("browser-refresh".into()));
        assert_eq!(data, json!({ "command": "browser-refresh" }));

        assert_eq!(event_data(&RawWindowEvent::Focus), json!({}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unvetoed_close_request_destroys_window() {
        let fixture = fixture();
        let window = fixture
            .backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        fixture.handler.register_window_events(&window);

        window.request_close();
        assert!(window.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_main_close_is_vetoed_by_behavior() {
        let fixture = fixture();
        let window = fixture
            .backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        fixture.handler.register_window_events(&window);

        window.request_close();
        assert!(!window.is_destroyed());
        assert!(window.is_minimized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_registration_is_refused() {
        let fixture = fixture();
        let window = fixture
            .backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        fixture.handler.register_window_events(&window);
        fixture.handler.register_window_events(&window);

        assert_eq!(fixture.handler.registered.read().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_detaches_listener() {
        let fixture = fixture();
        let window = fixture
            .backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        fixture.handler.register_window_events(&window);
        fixture.handler.unregister_window_events(window.id());

        // With the funnel gone a close request no longer destroys.
        window.request_close();
        assert!(!window.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_event_revalidates_states() {
        let fixture = fixture();
        fixture.handler.initialize();

        fixture.state.set_state(
            WindowType::Main,
            WindowState {
                width: 900,
                height: 700,
                x: Some(5000),
                y: Some(5000),
                is_maximized: false,
            },
        );

        // Removing a nonexistent display still fires revalidation through
        // the listener only for real changes; use metrics change instead.
        fixture.backend.update_display(crate::platform::DisplayInfo {
            id: 1,
            bounds: gaze_shared::Rect::new(0, 0, 1280, 720),
            work_area: gaze_shared::Rect::new(0, 0, 1280, 700),
            scale_factor: 1.0,
            primary: true,
        });

        let state = fixture.state.state_for(WindowType::Main);
        assert_eq!((state.x, state.y), (None, None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_behavior_stops_vetoing() {
        let fixture = fixture();
        let window = fixture
            .backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        fixture.handler.register_window_events(&window);
        assert!(fixture.handler.remove_behavior(WindowType::Main));

        window.request_close();
        assert!(window.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_broadcast_to_guests() {
        let fixture = fixture();
        let window = fixture
            .backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        fixture.handler.register_window_events(&window);

        struct SingleWindow(Arc<dyn PlatformWindow>);
        impl crate::ipc::WindowLister for SingleWindow {
            fn all_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
                vec![Arc::clone(&self.0)]
            }
        }
        let lister: Arc<dyn crate::ipc::WindowLister> =
            Arc::new(SingleWindow(Arc::clone(&window)));
        fixture.ipc.set_window_source(Arc::downgrade(&lister));

        window.focus();

        let concrete = fixture.backend.window(window.id()).unwrap();
        let delivered = concrete.drain_delivered();
        // panel-focus message from the behavior plus the window:event
        // rebroadcast.
        let events: Vec<&str> = delivered.iter().map(|(channel, _)| channel.as_str()).collect();
        assert!(events.contains(&"window:event"));
        let event = delivered
            .iter()
            .find(|(channel, _)| channel == "window:event")
            .unwrap();
        assert_eq!(event.1.payload["event"], json!("focus"));
        assert_eq!(event.1.payload["windowId"], json!(window.id()));
    }
}

//! In-memory windowing backend.
//!
//! Implements the platform traits without any OS surface. Used by the test
//! suites and by embeddings that only need the routing core. Raw events are
//! dispatched synchronously to registered listeners.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use gaze_shared::{ListenerId, Message, Rect, WindowType};

use crate::error::HostResult;
use crate::platform::{
    DeliveryListener, DisplayEvent, DisplayEventListener, DisplayInfo, PlatformWindow,
    RawWindowEvent, WindowBackend, WindowEventListener, WindowOptions,
};

#[derive(Debug, Clone)]
struct WindowInner {
    bounds: Rect,
    restore_bounds: Rect,
    title: String,
    maximized: bool,
    minimized: bool,
    focused: bool,
    visible: bool,
    destroyed: bool,
}

/// An in-memory window.
pub struct HeadlessWindow {
    id: u64,
    window_type: WindowType,
    inner: RwLock<WindowInner>,
    event_listeners: RwLock<HashMap<ListenerId, WindowEventListener>>,
    delivery_listeners: RwLock<HashMap<ListenerId, DeliveryListener>>,
    delivered: Mutex<Vec<(String, Message)>>,
    next_listener: AtomicU64,
}

impl HeadlessWindow {
    fn new(id: u64, options: &WindowOptions) -> Self {
        let bounds = Rect::new(
            options.x.unwrap_or(0),
            options.y.unwrap_or(0),
            options.width,
            options.height,
        );
        Self {
            id,
            window_type: options.window_type,
            inner: RwLock::new(WindowInner {
                bounds,
                restore_bounds: bounds,
                title: options.title.clone(),
                maximized: false,
                minimized: false,
                focused: false,
                visible: options.show,
                destroyed: false,
            }),
            event_listeners: RwLock::new(HashMap::new()),
            delivery_listeners: RwLock::new(HashMap::new()),
            delivered: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Emits a raw event to all registered listeners.
    ///
    /// Tests drive window lifecycles through this.
    pub fn emit(&self, event: &RawWindowEvent) {
        let listeners: Vec<WindowEventListener> =
            self.event_listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Returns and clears the messages delivered to this window's guest
    /// surface so far.
    pub fn drain_delivered(&self) -> Vec<(String, Message)> {
        std::mem::take(&mut self.delivered.lock())
    }

    /// Number of messages delivered to this window's guest surface.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }
}

impl PlatformWindow for HeadlessWindow {
    fn id(&self) -> u64 {
        self.id
    }

    fn window_type(&self) -> WindowType {
        self.window_type
    }

    fn bounds(&self) -> Rect {
        self.inner.read().bounds
    }

    fn set_bounds(&self, bounds: Rect) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed {
                return;
            }
            inner.bounds = bounds;
        }
        self.emit(&RawWindowEvent::Resized(bounds));
        self.emit(&RawWindowEvent::MoveEnded {
            x: bounds.x,
            y: bounds.y,
        });
    }

    fn set_size(&self, width: u32, height: u32) {
        let bounds = {
            let mut inner = self.inner.write();
            if inner.destroyed {
                return;
            }
            inner.bounds.width = width;
            inner.bounds.height = height;
            inner.bounds
        };
        self.emit(&RawWindowEvent::Resized(bounds));
    }

    fn title(&self) -> String {
        self.inner.read().title.clone()
    }

    fn set_title(&self, title: &str) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed {
                return;
            }
            inner.title = title.to_string();
        }
        self.emit(&RawWindowEvent::TitleChanged(title.to_string()));
    }

    fn is_maximized(&self) -> bool {
        self.inner.read().maximized
    }

    fn is_minimized(&self) -> bool {
        self.inner.read().minimized
    }

    fn is_focused(&self) -> bool {
        self.inner.read().focused
    }

    fn is_visible(&self) -> bool {
        self.inner.read().visible
    }

    fn is_destroyed(&self) -> bool {
        self.inner.read().destroyed
    }

    fn maximize(&self) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed || inner.maximized {
                return;
            }
            inner.restore_bounds = inner.bounds;
            inner.maximized = true;
        }
        self.emit(&RawWindowEvent::Maximized);
    }

    fn unmaximize(&self) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed || !inner.maximized {
                return;
            }
            inner.maximized = false;
            inner.bounds = inner.restore_bounds;
        }
        self.emit(&RawWindowEvent::Unmaximized);
    }

    fn minimize(&self) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed || inner.minimized {
                return;
            }
            inner.minimized = true;
        }
        self.emit(&RawWindowEvent::Minimized);
    }

    fn restore(&self) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed || !inner.minimized {
                return;
            }
            inner.minimized = false;
        }
        self.emit(&RawWindowEvent::Restored);
    }

    fn focus(&self) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed {
                return;
            }
            inner.focused = true;
            inner.minimized = false;
        }
        self.emit(&RawWindowEvent::Focus);
    }

    fn show(&self) {
        let mut inner = self.inner.write();
        if inner.destroyed {
            return;
        }
        inner.visible = true;
    }

    fn request_close(&self) {
        if self.inner.read().destroyed {
            return;
        }
        self.emit(&RawWindowEvent::CloseRequested);
    }

    fn close(&self) {
        {
            let mut inner = self.inner.write();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.visible = false;
        }
        self.emit(&RawWindowEvent::Destroyed);
    }

    fn deliver(&self, channel: &str, message: &Message) -> bool {
        if self.inner.read().destroyed {
            return false;
        }
        self.delivered.lock().push((channel.to_string(), message.clone()));
        let listeners: Vec<DeliveryListener> =
            self.delivery_listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(channel, message);
        }
        true
    }

    fn on_event(&self, listener: WindowEventListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.event_listeners.write().insert(id, listener);
        id
    }

    fn remove_event_listener(&self, listener: ListenerId) {
        self.event_listeners.write().remove(&listener);
    }

    fn on_delivery(&self, listener: DeliveryListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.delivery_listeners.write().insert(id, listener);
        id
    }

    fn remove_delivery_listener(&self, listener: ListenerId) {
        self.delivery_listeners.write().remove(&listener);
    }
}

/// In-memory backend with a mutable display topology.
pub struct HeadlessBackend {
    next_window_id: AtomicU64,
    next_listener_id: AtomicU64,
    windows: RwLock<Vec<Arc<HeadlessWindow>>>,
    displays: RwLock<Vec<DisplayInfo>>,
    display_listeners: RwLock<HashMap<ListenerId, DisplayEventListener>>,
}

impl HeadlessBackend {
    /// Creates a backend with a single 1920x1080 primary display.
    #[must_use]
    pub fn new() -> Self {
        Self::with_displays(vec![DisplayInfo {
            id: 1,
            bounds: Rect::new(0, 0, 1920, 1080),
            work_area: Rect::new(0, 0, 1920, 1040),
            scale_factor: 1.0,
            primary: true,
        }])
    }

    /// Creates a backend with the given display topology.
    #[must_use]
    pub fn with_displays(displays: Vec<DisplayInfo>) -> Self {
        Self {
            next_window_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
            windows: RwLock::new(Vec::new()),
            displays: RwLock::new(displays),
            display_listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up a window as its concrete headless type.
    #[must_use]
    pub fn window(&self, id: u64) -> Option<Arc<HeadlessWindow>> {
        self.windows.read().iter().find(|window| window.id == id).cloned()
    }

    /// Every window created so far, destroyed ones included.
    #[must_use]
    pub fn all_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
        self.windows
            .read()
            .iter()
            .map(|window| Arc::clone(window) as Arc<dyn PlatformWindow>)
            .collect()
    }

    /// Connects a display and notifies listeners.
    pub fn add_display(&self, display: DisplayInfo) {
        self.displays.write().push(display.clone());
        self.notify(&DisplayEvent::Added(display));
    }

    /// Disconnects a display by id and notifies listeners.
    pub fn remove_display(&self, id: u64) {
        let removed = {
            let mut displays = self.displays.write();
            let index = displays.iter().position(|display| display.id == id);
            index.map(|index| displays.remove(index))
        };
        if let Some(display) = removed {
            self.notify(&DisplayEvent::Removed(display));
        }
    }

    /// Replaces a display's metrics and notifies listeners.
    pub fn update_display(&self, updated: DisplayInfo) {
        {
            let mut displays = self.displays.write();
            if let Some(display) = displays.iter_mut().find(|display| display.id == updated.id) {
                *display = updated.clone();
            } else {
                return;
            }
        }
        self.notify(&DisplayEvent::MetricsChanged(updated));
    }

    fn notify(&self, event: &DisplayEvent) {
        let listeners: Vec<DisplayEventListener> =
            self.display_listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowBackend for HeadlessBackend {
    fn create_window(&self, options: &WindowOptions) -> HostResult<Arc<dyn PlatformWindow>> {
        let id = self.next_window_id.fetch_add(1, Ordering::Relaxed);
        let window = Arc::new(HeadlessWindow::new(id, options));
        self.windows.write().push(Arc::clone(&window));
        Ok(window)
    }

    fn displays(&self) -> Vec<DisplayInfo> {
        self.displays.read().clone()
    }

    fn on_display_event(&self, listener: DisplayEventListener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.display_listeners.write().insert(id, listener);
        id
    }

    fn remove_display_listener(&self, listener: ListenerId) {
        self.display_listeners.write().remove(&listener);
    }
}

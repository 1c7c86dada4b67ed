//! Window geometry persistence.
//!
//! Tracks the geometry of live windows per window type, validates it against
//! the display topology, and persists it through the `windows` domain of the
//! state store. Saves are debounced: every change re-arms a one second timer
//! and a single flush writes all cached states.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use gaze_shared::{ListenerId, WindowState, WindowType};

use crate::error::HostResult;
use crate::platform::{PlatformWindow, RawWindowEvent, WindowBackend};
use crate::store::StateStore;

/// Settle time before a flush.
const SAVE_DELAY: Duration = Duration::from_secs(1);

/// State store domain the geometry lives in.
const DOMAIN: &str = "windows";

struct TrackedWindow {
    window: Weak<dyn PlatformWindow>,
    listener: ListenerId,
}

/// Caches, validates, and persists window geometry.
pub struct WindowStateManager {
    store: Arc<StateStore>,
    backend: Arc<dyn WindowBackend>,
    cache: RwLock<HashMap<WindowType, WindowState>>,
    tracked: RwLock<HashMap<u64, TrackedWindow>>,
    save_task: Mutex<Option<JoinHandle<()>>>,
    save_count: AtomicUsize,
}

impl WindowStateManager {
    /// Creates a manager persisting through `store`.
    #[must_use]
    pub fn new(store: Arc<StateStore>, backend: Arc<dyn WindowBackend>) -> Arc<Self> {
        Arc::new(Self {
            store,
            backend,
            cache: RwLock::new(HashMap::new()),
            tracked: RwLock::new(HashMap::new()),
            save_task: Mutex::new(None),
            save_count: AtomicUsize::new(0),
        })
    }

    /// Loads persisted states into the cache, validating each entry.
    pub fn load(&self) {
        let mut cache = self.cache.write();
        for window_type in WindowType::all() {
            let Some(value) = self.store.get_state(DOMAIN, Some(window_type.as_str())) else {
                continue;
            };
            match serde_json::from_value::<WindowState>(value) {
                Ok(state) => {
                    cache.insert(window_type, self.validate_window_state(window_type, state));
                }
                Err(err) => {
                    warn!("discarding invalid persisted state for '{window_type}': {err}");
                }
            }
        }
    }

    /// Returns the validated state for a window type, falling back to the
    /// type defaults when nothing was persisted.
    #[must_use]
    pub fn state_for(&self, window_type: WindowType) -> WindowState {
        self.cache.read().get(&window_type).map_or_else(
            || window_type.default_state(),
            |state| self.validate_window_state(window_type, *state),
        )
    }

    /// Stores a state and schedules a debounced flush.
    pub fn set_state(self: &Arc<Self>, window_type: WindowType, state: WindowState) {
        self.cache.write().insert(window_type, state);
        self.schedule_save();
    }

    /// Clamps the size to the type minimum and drops a position that no
    /// longer falls on any display.
    #[must_use]
    pub fn validate_window_state(&self, window_type: WindowType, state: WindowState) -> WindowState {
        let (min_width, min_height) = window_type.minimum_size();
        let mut validated = state;
        validated.width = validated.width.max(min_width);
        validated.height = validated.height.max(min_height);

        if let Some(rect) = validated.rect() {
            let displays = self.backend.displays();
            let visible = displays.iter().any(|display| rect.intersects(&display.bounds));
            if !visible {
                debug!("dropping off-screen position for '{window_type}'");
                validated.x = None;
                validated.y = None;
            }
        }
        validated
    }

    /// Revalidates every cached state against the current display topology.
    ///
    /// Returns `true` when anything changed; a change schedules a single
    /// debounced flush.
    pub fn validate_all_window_states(self: &Arc<Self>) -> bool {
        let mut changed = false;
        {
            let mut cache = self.cache.write();
            for (window_type, state) in cache.iter_mut() {
                let validated = self.validate_window_state(*window_type, *state);
                if validated != *state {
                    *state = validated;
                    changed = true;
                }
            }
        }
        if changed {
            self.schedule_save();
        }
        changed
    }

    /// Applies the persisted state to a window and starts tracking its
    /// geometry changes.
    pub fn track_window(self: &Arc<Self>, window: &Arc<dyn PlatformWindow>) {
        let window_type = window.window_type();
        let state = self.state_for(window_type);

        // Apply before attaching listeners so the initial placement does not
        // count as a change.
        if let Some(rect) = state.rect() {
            window.set_bounds(rect);
        } else {
            window.set_size(state.width, state.height);
        }
        if state.is_maximized {
            window.maximize();
        }
        self.cache.write().insert(window_type, state);

        let manager = Arc::downgrade(self);
        let tracked_window = Arc::downgrade(window);
        let listener = window.on_event(Arc::new(move |event| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let Some(window) = tracked_window.upgrade() else {
                return;
            };
            if matches!(
                event,
                RawWindowEvent::Resized(_)
                    | RawWindowEvent::MoveEnded { .. }
                    | RawWindowEvent::Maximized
                    | RawWindowEvent::Unmaximized
                    | RawWindowEvent::CloseRequested
            ) {
                manager.capture_window_state(&window);
            }
        }));

        self.tracked.write().insert(
            window.id(),
            TrackedWindow {
                window: Arc::downgrade(window),
                listener,
            },
        );
        debug!("tracking geometry of window {} ('{window_type}')", window.id());
    }

    /// Stops tracking a window and schedules a flush of whatever was last
    /// captured. Unknown ids are tolerated.
    pub fn untrack_window(self: &Arc<Self>, window_id: u64) {
        let Some(entry) = self.tracked.write().remove(&window_id) else {
            return;
        };
        if let Some(window) = entry.window.upgrade() {
            window.remove_event_listener(entry.listener);
        }
        self.schedule_save();
    }

    /// Writes all cached states through the store immediately.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot persist the domain.
    pub fn save_now(&self) -> HostResult<()> {
        let cache = self.cache.read().clone();
        for (window_type, state) in &cache {
            self.store
                .set_state(DOMAIN, Some(window_type.as_str()), serde_json::to_value(state)?)?;
        }
        self.store.save_state(Some(DOMAIN))?;
        self.save_count.fetch_add(1, Ordering::SeqCst);
        debug!("flushed {} window states", cache.len());
        Ok(())
    }

    /// Number of flushes performed so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Cancels any pending flush and persists immediately.
    pub fn shutdown(&self) {
        if let Some(task) = self.save_task.lock().take() {
            task.abort();
        }
        if let Err(err) = self.save_now() {
            error!("failed to flush window states on shutdown: {err}");
        }
    }

    fn capture_window_state(self: &Arc<Self>, window: &Arc<dyn PlatformWindow>) {
        // Minimized geometry is meaningless, skip the update entirely.
        if window.is_minimized() {
            return;
        }
        let window_type = window.window_type();
        let state = if window.is_maximized() {
            // Keep the last normal bounds, only flip the flag.
            let mut state = self
                .cache
                .read()
                .get(&window_type)
                .copied()
                .unwrap_or_else(|| window_type.default_state());
            state.is_maximized = true;
            state
        } else {
            let bounds = window.bounds();
            WindowState {
                width: bounds.width,
                height: bounds.height,
                x: Some(bounds.x),
                y: Some(bounds.y),
                is_maximized: false,
            }
        };
        self.set_state(window_type, state);
    }

    fn schedule_save(self: &Arc<Self>) {
        let mut pending = self.save_task.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No runtime to debounce on, flush inline.
            drop(pending);
            if let Err(err) = self.save_now() {
                error!("failed to flush window states: {err}");
            }
            return;
        };

        let manager = Arc::downgrade(self);
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(SAVE_DELAY).await;
            if let Some(manager) = manager.upgrade() {
                if let Err(err) = manager.save_now() {
                    error!("failed to flush window states: {err}");
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_shared::Rect;

    use crate::platform::WindowOptions;
    use crate::platform::headless::HeadlessBackend;

    fn setup() -> (tempfile::TempDir, Arc<HeadlessBackend>, Arc<WindowStateManager>) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let backend = Arc::new(HeadlessBackend::new());
        let manager = WindowStateManager::new(store, Arc::clone(&backend) as Arc<dyn WindowBackend>);
        (dir, backend, manager)
    }

    #[test]
    fn test_state_for_falls_back_to_defaults() {
        let (_dir, _backend, manager) = setup();
        assert_eq!(manager.state_for(WindowType::Main), WindowType::Main.default_state());
        assert_eq!(
            manager.state_for(WindowType::FacePanel),
            WindowType::FacePanel.default_state()
        );
    }

    #[test]
    fn test_validate_clamps_size() {
        let (_dir, _backend, manager) = setup();
        let state = WindowState {
            width: 100,
            height: 50,
            x: Some(10),
            y: Some(10),
            is_maximized: false,
        };
        let validated = manager.validate_window_state(WindowType::Main, state);
        assert_eq!((validated.width, validated.height), (800, 600));
        // On-screen position survives.
        assert_eq!((validated.x, validated.y), (Some(10), Some(10)));
    }

    #[test]
    fn test_validate_drops_offscreen_position() {
        let (_dir, _backend, manager) = setup();
        let state = WindowState {
            width: 900,
            height: 700,
            x: Some(5000),
            y: Some(5000),
            is_maximized: false,
        };
        let validated = manager.validate_window_state(WindowType::Main, state);
        // Position dropped, size untouched.
        assert_eq!((validated.x, validated.y), (None, None));
        assert_eq!((validated.width, validated.height), (900, 700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_saves_collapse_into_one_flush() {
        let (_dir, _backend, manager) = setup();

        for width in [900, 910, 920, 930] {
            manager.set_state(
                WindowType::Main,
                WindowState {
                    width,
                    height: 700,
                    x: Some(0),
                    y: Some(0),
                    is_maximized: false,
                },
            );
        }
        assert_eq!(manager.save_count(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(manager.save_count(), 1);
        assert_eq!(manager.state_for(WindowType::Main).width, 930);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_window_applies_and_captures_state() {
        let (_dir, backend, manager) = setup();

        manager.set_state(
            WindowType::Main,
            WindowState {
                width: 900,
                height: 700,
                x: Some(40),
                y: Some(50),
                is_maximized: false,
            },
        );

        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        manager.track_window(&window);
        assert_eq!(window.bounds(), Rect::new(40, 50, 900, 700));

        window.set_bounds(Rect::new(10, 20, 1000, 800));
        let state = manager.state_for(WindowType::Main);
        assert_eq!((state.x, state.y), (Some(10), Some(20)));
        assert_eq!((state.width, state.height), (1000, 800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimized_updates_are_skipped() {
        let (_dir, backend, manager) = setup();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        manager.track_window(&window);

        window.set_bounds(Rect::new(10, 20, 900, 700));
        window.minimize();
        let concrete = backend.window(window.id()).unwrap();
        concrete.emit(&RawWindowEvent::Resized(Rect::new(0, 0, 1, 1)));

        let state = manager.state_for(WindowType::Main);
        assert_eq!((state.width, state.height), (900, 700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_maximized_capture_keeps_normal_bounds() {
        let (_dir, backend, manager) = setup();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        manager.track_window(&window);

        window.set_bounds(Rect::new(30, 40, 900, 700));
        window.maximize();

        let state = manager.state_for(WindowType::Main);
        assert!(state.is_maximized);
        assert_eq!((state.x, state.y), (Some(30), Some(40)));
        assert_eq!((state.width, state.height), (900, 700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_untrack_stops_capturing() {
        let (_dir, backend, manager) = setup();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        manager.track_window(&window);

        window.set_bounds(Rect::new(10, 10, 900, 700));
        manager.untrack_window(window.id());
        window.set_bounds(Rect::new(99, 99, 1200, 900));

        let state = manager.state_for(WindowType::Main);
        assert_eq!(state.width, 900);

        // Unknown ids are tolerated.
        manager.untrack_window(424_242);
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_removal_revalidation() {
        use crate::platform::DisplayInfo;

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let backend = Arc::new(HeadlessBackend::with_displays(vec![
            DisplayInfo {
                id: 1,
                bounds: Rect::new(0, 0, 1920, 1080),
                work_area: Rect::new(0, 0, 1920, 1040),
                scale_factor: 1.0,
                primary: true,
            },
            DisplayInfo {
                id: 2,
                bounds: Rect::new(1920, 0, 1280, 1024),
                work_area: Rect::new(1920, 0, 1280, 1024),
                scale_factor: 1.0,
                primary: false,
            },
        ]));
        let manager = WindowStateManager::new(store, Arc::clone(&backend) as Arc<dyn WindowBackend>);

        // A window parked on the secondary display.
        manager.set_state(
            WindowType::Settings,
            WindowState {
                width: 600,
                height: 500,
                x: Some(2000),
                y: Some(100),
                is_maximized: false,
            },
        );

        assert!(!manager.validate_all_window_states());

        backend.remove_display(2);
        assert!(manager.validate_all_window_states());

        let state = manager.state_for(WindowType::Settings);
        assert_eq!((state.x, state.y), (None, None));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(manager.save_count(), 1);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(HeadlessBackend::new());

        {
            let store = StateStore::new(dir.path());
            let manager =
                WindowStateManager::new(store, Arc::clone(&backend) as Arc<dyn WindowBackend>);
            manager.cache.write().insert(
                WindowType::Main,
                WindowState {
                    width: 1100,
                    height: 850,
                    x: None,
                    y: None,
                    is_maximized: true,
                },
            );
            manager.save_now().unwrap();
        }

        let store = StateStore::new(dir.path());
        store.load_state(None);
        let manager = WindowStateManager::new(store, backend as Arc<dyn WindowBackend>);
        manager.load();

        let state = manager.state_for(WindowType::Main);
        assert_eq!((state.width, state.height), (1100, 850));
        assert_eq!((state.x, state.y), (None, None));
        assert!(state.is_maximized);
    }
}

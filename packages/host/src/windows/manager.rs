//! Window lifecycle management.
//!
//! Owns the per-type window state machines: one main window, one settings
//! dialog, any number of face panels. Creation seeds geometry from the
//! persisted window state, hooks the window into the event funnel, and
//! announces it over `window:created`. Layout operations arrange the live
//! panels over the primary display's work area.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use serde_json::json;

use gaze_shared::{Message, WindowType};

use crate::error::HostResult;
use crate::ipc::{IpcManager, WindowLister};
use crate::platform::{PlatformWindow, WindowBackend, WindowOptions};
use crate::windows::events::WindowEventHandler;
use crate::windows::layout::{self, GridOptions, LineOptions};
use crate::windows::state::WindowStateManager;

/// Application display name used for window titles.
const APP_NAME: &str = "Gaze Detection";

/// Options accepted by [`WindowManager::create_window`].
#[derive(Debug, Clone, Default)]
pub struct CreateWindowOptions {
    /// Stable panel identifier; generated when absent. Only meaningful for
    /// face panels.
    pub panel_id: Option<String>,
    /// Title override.
    pub title: Option<String>,
}

/// Owns every window of the application.
pub struct WindowManager {
    backend: Arc<dyn WindowBackend>,
    state: Arc<WindowStateManager>,
    ipc: Arc<IpcManager>,
    events: Arc<WindowEventHandler>,
    main: RwLock<Option<Arc<dyn PlatformWindow>>>,
    settings: RwLock<Option<Arc<dyn PlatformWindow>>>,
    panels: RwLock<Vec<(String, Arc<dyn PlatformWindow>)>>,
    panel_ids: RwLock<HashMap<u64, String>>,
    next_panel: AtomicU64,
}

impl WindowManager {
    /// Creates a manager. The caller wires it into the event funnel and the
    /// IPC manager afterwards.
    #[must_use]
    pub fn new(
        backend: Arc<dyn WindowBackend>,
        state: Arc<WindowStateManager>,
        ipc: Arc<IpcManager>,
        events: Arc<WindowEventHandler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            state,
            ipc,
            events,
            main: RwLock::new(None),
            settings: RwLock::new(None),
            panels: RwLock::new(Vec::new()),
            panel_ids: RwLock::new(HashMap::new()),
            next_panel: AtomicU64::new(1),
        })
    }

    /// Creates (or revives) a window of the given type.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend refuses the window.
    pub fn create_window(
        self: &Arc<Self>,
        window_type: WindowType,
        options: &CreateWindowOptions,
    ) -> HostResult<Arc<dyn PlatformWindow>> {
        let window = match window_type {
            WindowType::Main => self.create_main_window(),
            WindowType::FacePanel => self.create_face_panel(options.panel_id.clone()),
            WindowType::Settings => self.create_settings_window(),
        }?;
        if let Some(title) = &options.title {
            window.set_title(title);
        }
        Ok(window)
    }

    /// Creates the main window, or focuses and returns the live one.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend refuses the window.
    pub fn create_main_window(self: &Arc<Self>) -> HostResult<Arc<dyn PlatformWindow>> {
        if let Some(existing) = self.live_slot(&self.main) {
            existing.focus();
            return Ok(existing);
        }

        let mut options = WindowOptions::for_type(WindowType::Main);
        options.title = APP_NAME.to_string();
        let window = self.backend.create_window(&options)?;
        *self.main.write() = Some(Arc::clone(&window));
        self.setup_window(&window);
        info!("created main window {}", window.id());
        Ok(window)
    }

    /// Creates a face panel. A live panel with the same id is focused and
    /// returned instead.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend refuses the window.
    pub fn create_face_panel(
        self: &Arc<Self>,
        panel_id: Option<String>,
    ) -> HostResult<Arc<dyn PlatformWindow>> {
        let panel_id = panel_id.unwrap_or_else(|| {
            format!("face-panel-{}", self.next_panel.fetch_add(1, Ordering::Relaxed))
        });

        if let Some((_, existing)) = self
            .panels
            .read()
            .iter()
            .find(|(id, window)| *id == panel_id && !window.is_destroyed())
        {
            existing.focus();
            return Ok(Arc::clone(existing));
        }

        let mut options = WindowOptions::for_type(WindowType::FacePanel);
        options.title = format!("{APP_NAME} - {panel_id}");
        let window = self.backend.create_window(&options)?;
        self.panels.write().push((panel_id.clone(), Arc::clone(&window)));
        self.panel_ids.write().insert(window.id(), panel_id.clone());
        self.setup_window(&window);
        info!("created face panel {} ('{panel_id}')", window.id());
        Ok(window)
    }

    /// Creates the settings dialog, or focuses and returns the live one.
    /// The dialog is modal to the main window when one exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend refuses the window.
    pub fn create_settings_window(self: &Arc<Self>) -> HostResult<Arc<dyn PlatformWindow>> {
        if let Some(existing) = self.live_slot(&self.settings) {
            existing.focus();
            return Ok(existing);
        }

        let mut options = WindowOptions::for_type(WindowType::Settings);
        options.title = format!("{APP_NAME} - Settings");
        options.parent = self.live_slot(&self.main).map(|window| window.id());
        let window = self.backend.create_window(&options)?;
        *self.settings.write() = Some(Arc::clone(&window));
        self.setup_window(&window);
        info!("created settings window {}", window.id());
        Ok(window)
    }

    /// Looks up any window by id, live or not.
    #[must_use]
    pub fn window_by_id(&self, window_id: u64) -> Option<Arc<dyn PlatformWindow>> {
        self.all_windows()
            .into_iter()
            .find(|window| window.id() == window_id)
    }

    /// The live main window, if any.
    #[must_use]
    pub fn main_window(&self) -> Option<Arc<dyn PlatformWindow>> {
        self.live_slot(&self.main)
    }

    /// The live settings dialog, if any.
    #[must_use]
    pub fn settings_window(&self) -> Option<Arc<dyn PlatformWindow>> {
        self.live_slot(&self.settings)
    }

    /// All live face panels, in creation order.
    #[must_use]
    pub fn face_panel_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
        self.panels
            .read()
            .iter()
            .filter(|(_, window)| !window.is_destroyed())
            .map(|(_, window)| Arc::clone(window))
            .collect()
    }

    /// The panel id of a face panel window.
    #[must_use]
    pub fn panel_id_of(&self, window_id: u64) -> Option<String> {
        self.panel_ids.read().get(&window_id).cloned()
    }

    /// Closes a window by id. Missing or already destroyed windows warn and
    /// return `false`.
    pub fn close_window(&self, window_id: u64) -> bool {
        match self.window_by_id(window_id) {
            Some(window) if !window.is_destroyed() => {
                window.close();
                true
            }
            _ => {
                warn!("close requested for unknown window {window_id}");
                false
            }
        }
    }

    /// Closes every window. Returns how many were live.
    pub fn close_all_windows(&self) -> usize {
        let live: Vec<Arc<dyn PlatformWindow>> = self
            .all_windows()
            .into_iter()
            .filter(|window| !window.is_destroyed())
            .collect();
        // Panels and dialog first so the main window goes last.
        let mut ordered = live;
        ordered.sort_by_key(|window| window.window_type() == WindowType::Main);
        let count = ordered.len();
        for window in ordered {
            window.close();
        }
        count
    }

    /// Bookkeeping for a destroyed window. Called from the event funnel on
    /// the `closed` event; idempotent.
    pub fn handle_closed(&self, window_id: u64) {
        self.state.untrack_window(window_id);
        self.events.unregister_window_events(window_id);

        let panel_id = self.panel_ids.write().remove(&window_id);
        if panel_id.is_some() {
            self.panels.write().retain(|(_, window)| window.id() != window_id);
        }
        if self.main.read().as_ref().is_some_and(|window| window.id() == window_id) {
            *self.main.write() = None;
        }
        if self
            .settings
            .read()
            .as_ref()
            .is_some_and(|window| window.id() == window_id)
        {
            *self.settings.write() = None;
        }

        let payload = json!({ "windowId": window_id, "panelId": panel_id });
        let notification = Message::notification("window:closed", payload.clone(), "main");
        self.ipc.handle_notification(&notification);
        self.ipc.broadcast_to_renderers("window:closed", payload);
        info!("window {window_id} closed");
    }

    /// Arranges the live face panels in a grid over the primary display's
    /// work area. Returns `false` when there are no panels or no display.
    pub fn arrange_in_grid(&self, options: &GridOptions) -> bool {
        let panels = self.face_panel_windows();
        if panels.is_empty() {
            warn!("no face panels to arrange");
            return false;
        }
        let Some(display) = self.backend.primary_display() else {
            warn!("no primary display to arrange on");
            return false;
        };

        let positions = layout::grid_positions(panels.len(), &display.work_area, options);
        for (window, bounds) in panels.iter().zip(positions) {
            window.set_bounds(bounds);
        }
        self.broadcast_layout_change("grid", panels.len());
        true
    }

    /// Stacks the live face panels vertically.
    pub fn arrange_in_vertical_stack(&self, options: &LineOptions) -> bool {
        let panels = self.face_panel_windows();
        if panels.is_empty() {
            warn!("no face panels to arrange");
            return false;
        }
        let Some(display) = self.backend.primary_display() else {
            warn!("no primary display to arrange on");
            return false;
        };

        let positions = layout::vertical_stack_positions(panels.len(), &display.work_area, options);
        for (window, bounds) in panels.iter().zip(positions) {
            window.set_bounds(bounds);
        }
        self.broadcast_layout_change("vertical-stack", panels.len());
        true
    }

    /// Lays the live face panels out in a horizontal row.
    pub fn arrange_in_horizontal_row(&self, options: &LineOptions) -> bool {
        let panels = self.face_panel_windows();
        if panels.is_empty() {
            warn!("no face panels to arrange");
            return false;
        }
        let Some(display) = self.backend.primary_display() else {
            warn!("no primary display to arrange on");
            return false;
        };

        let positions = layout::horizontal_row_positions(panels.len(), &display.work_area, options);
        for (window, bounds) in panels.iter().zip(positions) {
            window.set_bounds(bounds);
        }
        self.broadcast_layout_change("horizontal-row", panels.len());
        true
    }

    /// Minimizes every live window except the given one. Returns the count
    /// of windows minimized.
    pub fn minimize_all_except(&self, window_id: u64) -> usize {
        self.all_windows()
            .into_iter()
            .filter(|window| {
                window.id() != window_id && !window.is_destroyed() && !window.is_minimized()
            })
            .map(|window| window.minimize())
            .count()
    }

    /// Focuses every live window, panels first so the main window ends up
    /// on top. Returns the count.
    pub fn bring_all_to_front(&self) -> usize {
        let mut windows: Vec<Arc<dyn PlatformWindow>> = self
            .all_windows()
            .into_iter()
            .filter(|window| !window.is_destroyed())
            .collect();
        windows.sort_by_key(|window| window.window_type() == WindowType::Main);
        let count = windows.len();
        for window in windows {
            window.focus();
        }
        count
    }

    fn setup_window(self: &Arc<Self>, window: &Arc<dyn PlatformWindow>) {
        self.state.track_window(window);
        self.events.register_window_events(window);

        let payload = json!({
            "windowId": window.id(),
            "windowType": window.window_type(),
            "panelId": self.panel_id_of(window.id()),
        });
        let notification = Message::notification("window:created", payload.clone(), "main");
        self.ipc.handle_notification(&notification);
        self.ipc.broadcast_to_renderers("window:created", payload);
    }

    fn live_slot(&self, slot: &RwLock<Option<Arc<dyn PlatformWindow>>>) -> Option<Arc<dyn PlatformWindow>> {
        slot.read()
            .as_ref()
            .filter(|window| !window.is_destroyed())
            .map(Arc::clone)
    }

    fn broadcast_layout_change(&self, layout: &str, panels: usize) {
        self.ipc.broadcast_to_renderers(
            "window:event",
            json!({
                "event": "layout-changed",
                "data": { "layout": layout, "panels": panels },
            }),
        );
    }
}

impl WindowLister for WindowManager {
    fn all_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
        let mut windows: Vec<Arc<dyn PlatformWindow>> = Vec::new();
        if let Some(main) = self.main.read().as_ref() {
            windows.push(Arc::clone(main));
        }
        windows.extend(self.panels.read().iter().map(|(_, window)| Arc::clone(window)));
        if let Some(settings) = self.settings.read().as_ref() {
            windows.push(Arc::clone(settings));
        }
        windows
    }
}

//! Per-window-type behavior.
//!
//! Each window type can carry a [`WindowTypeBehavior`] that hooks into
//! registration and the event funnel. Behaviors are keyed by the
//! [`WindowType`] enum, so attaching one to an unknown type is impossible by
//! construction. A behavior that errors is logged and never blocks the
//! funnel or its siblings.

mod face_panel;
mod main_window;
mod settings;

pub use face_panel::FacePanelBehavior;
pub use main_window::MainWindowBehavior;
pub use settings::SettingsBehavior;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde_json::Value;

use gaze_shared::{WindowEventType, WindowType};

use crate::error::HostResult;
use crate::ipc::IpcManager;
use crate::platform::{PlatformWindow, WindowBackend};

/// Shared capabilities handed to behavior hooks.
pub struct BehaviorContext {
    /// IPC manager for notifying guests.
    pub ipc: Arc<IpcManager>,
    /// Backend, for display geometry.
    pub backend: Arc<dyn WindowBackend>,
    /// Set when the application is shutting down for real.
    pub quit_requested: Arc<AtomicBool>,
}

/// Type-specific window behavior.
pub trait WindowTypeBehavior: Send + Sync {
    /// The window type this behavior applies to.
    fn window_type(&self) -> WindowType;

    /// Called once when a window of this type registers with the event
    /// funnel.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the funnel logs and continues.
    fn on_register(
        &self,
        _context: &BehaviorContext,
        _window: &Arc<dyn PlatformWindow>,
    ) -> HostResult<()> {
        Ok(())
    }

    /// Called when a window of this type unregisters.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the funnel logs and continues.
    fn on_unregister(&self, _context: &BehaviorContext, _window_id: u64) -> HostResult<()> {
        Ok(())
    }

    /// Called for every funneled event of a window of this type.
    ///
    /// Returning `Ok(true)` marks the event as fully handled: the funnel
    /// neither rebroadcasts it nor applies its default consequence (a
    /// handled `close` keeps the window alive).
    ///
    /// # Errors
    ///
    /// Implementations may fail; the funnel logs and treats the event as
    /// unhandled.
    fn on_event(
        &self,
        _context: &BehaviorContext,
        _window: &Arc<dyn PlatformWindow>,
        _event: WindowEventType,
        _data: &Value,
    ) -> HostResult<bool> {
        Ok(false)
    }
}

//! Behavior of the main application window.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::debug;
use serde_json::{Value, json};

use gaze_shared::{WindowEventType, WindowType};

use crate::error::HostResult;
use crate::platform::PlatformWindow;
use crate::windows::behavior::{BehaviorContext, WindowTypeBehavior};

/// Main window: closing hides instead of quitting, reload is intercepted,
/// and restoring from the tray asks the guest to refresh its view.
#[derive(Debug, Default)]
pub struct MainWindowBehavior;

impl WindowTypeBehavior for MainWindowBehavior {
    fn window_type(&self) -> WindowType {
        WindowType::Main
    }

    fn on_event(
        &self,
        context: &BehaviorContext,
        window: &Arc<dyn PlatformWindow>,
        event: WindowEventType,
        data: &Value,
    ) -> HostResult<bool> {
        match event {
            WindowEventType::Close => {
                if context.quit_requested.load(Ordering::SeqCst) {
                    return Ok(false);
                }
                // Outside shutdown the main window survives its close
                // button.
                debug!("intercepted close of main window {}", window.id());
                window.minimize();
                context.ipc.send_to_renderer(
                    window.as_ref(),
                    "window:message",
                    json!({ "type": "close-intercepted" }),
                );
                Ok(true)
            }
            WindowEventType::Restore => {
                context.ipc.send_to_renderer(
                    window.as_ref(),
                    "window:message",
                    json!({ "type": "refresh" }),
                );
                Ok(false)
            }
            WindowEventType::AppCommand if data["command"] == json!("browser-refresh") => {
                // Accidental F5/Cmd-R must not reload the capture surface.
                debug!("blocked reload of main window {}", window.id());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use crate::ipc::IpcManager;
    use crate::platform::headless::HeadlessBackend;
    use crate::platform::{WindowBackend, WindowOptions};
    use gaze_shared::ChannelRegistry;

    fn context() -> (Arc<HeadlessBackend>, BehaviorContext) {
        let backend = Arc::new(HeadlessBackend::new());
        let context = BehaviorContext {
            ipc: Arc::new(IpcManager::new(Arc::new(ChannelRegistry::with_builtin_channels()))),
            backend: Arc::clone(&backend) as Arc<dyn WindowBackend>,
            quit_requested: Arc::new(AtomicBool::new(false)),
        };
        (backend, context)
    }

    #[test]
    fn test_close_is_intercepted_outside_shutdown() {
        let (backend, context) = context();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        let behavior = MainWindowBehavior;

        let handled = behavior
            .on_event(&context, &window, WindowEventType::Close, &json!({}))
            .unwrap();
        assert!(handled);
        assert!(window.is_minimized());
        assert!(!window.is_destroyed());

        let concrete = backend.window(window.id()).unwrap();
        let delivered = concrete.drain_delivered();
        assert_eq!(delivered[0].1.payload, json!({ "type": "close-intercepted" }));
    }

    #[test]
    fn test_close_passes_through_during_shutdown() {
        let (backend, context) = context();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();
        context.quit_requested.store(true, Ordering::SeqCst);

        let handled = MainWindowBehavior
            .on_event(&context, &window, WindowEventType::Close, &json!({}))
            .unwrap();
        assert!(!handled);
        assert!(!window.is_minimized());
    }

    #[test]
    fn test_reload_command_is_blocked() {
        let (backend, context) = context();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::Main))
            .unwrap();

        let handled = MainWindowBehavior
            .on_event(
                &context,
                &window,
                WindowEventType::AppCommand,
                &json!({ "command": "browser-refresh" }),
            )
            .unwrap();
        assert!(handled);

        let handled = MainWindowBehavior
            .on_event(
                &context,
                &window,
                WindowEventType::AppCommand,
                &json!({ "command": "media-play-pause" }),
            )
            .unwrap();
        assert!(!handled);
    }
}

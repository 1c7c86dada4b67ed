//! Behavior of the settings dialog.

use std::sync::Arc;

use serde_json::{Value, json};

use gaze_shared::{WindowEventType, WindowType};

use crate::error::HostResult;
use crate::platform::PlatformWindow;
use crate::windows::behavior::{BehaviorContext, WindowTypeBehavior};

/// Settings dialog: modal against the main window, its lifecycle is relayed
/// to the other windows so they can re-read the configuration, and the
/// save, undo, and escape app commands map to dialog actions.
#[derive(Debug, Default)]
pub struct SettingsBehavior;

impl SettingsBehavior {
    fn handle_command(
        context: &BehaviorContext,
        window: &Arc<dyn PlatformWindow>,
        command: &str,
    ) -> bool {
        match command {
            "save" => {
                context.ipc.send_to_renderer(
                    window.as_ref(),
                    "window:message",
                    json!({ "type": "settings-save" }),
                );
                context
                    .ipc
                    .broadcast_to_renderers("window:message", json!({ "type": "settings-saved" }));
                true
            }
            "undo" => {
                context.ipc.send_to_renderer(
                    window.as_ref(),
                    "window:message",
                    json!({ "type": "settings-undo" }),
                );
                true
            }
            "escape" | "close" => {
                window.request_close();
                true
            }
            _ => false,
        }
    }
}

impl WindowTypeBehavior for SettingsBehavior {
    fn window_type(&self) -> WindowType {
        WindowType::Settings
    }

    fn on_event(
        &self,
        context: &BehaviorContext,
        window: &Arc<dyn PlatformWindow>,
        event: WindowEventType,
        data: &Value,
    ) -> HostResult<bool> {
        match event {
            WindowEventType::Blur => {
                // The dialog is modal, take focus back.
                window.focus();
            }
            WindowEventType::Close => {
                context
                    .ipc
                    .broadcast_to_renderers("window:message", json!({ "type": "settings-closed" }));
            }
            WindowEventType::AppCommand => {
                if let Some(command) = data["command"].as_str() {
                    return Ok(Self::handle_command(context, window, command));
                }
            }
            _ => {}
        }
        Ok(false)
    }
}

//! Builtin request handlers.
//!
//! Registers the host's application-level handlers on the IPC manager:
//! application metadata and quit, window creation and teardown, camera
//! enumeration, and the configuration channels. State and window
//! communication channels register their own handlers elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::info;
use serde_json::json;

use gaze_shared::{Message, WindowType};

use crate::config::ConfigStore;
use crate::ipc::{HandlerError, HandlerResult, IpcHandler, IpcManager};
use crate::windows::manager::{CreateWindowOptions, WindowManager};

/// Application display name reported over `app:ready`.
const APP_NAME: &str = "Gaze Detection";

/// Everything the builtin handlers need.
#[derive(Clone)]
pub struct HandlerContext {
    pub config: Arc<ConfigStore>,
    pub windows: Weak<WindowManager>,
    pub quit_requested: Arc<AtomicBool>,
}

impl HandlerContext {
    fn window_manager(&self) -> Result<Arc<WindowManager>, HandlerError> {
        self.windows
            .upgrade()
            .ok_or_else(|| HandlerError::new("UNAVAILABLE", "window manager is gone"))
    }
}

/// Registers the builtin handlers. Returns how many were installed.
pub fn install(ipc: &IpcManager, context: &HandlerContext) -> usize {
    let handlers: Vec<(&str, IpcHandler)> = vec![
        ("app:ready", app_ready_handler()),
        ("app:quit", app_quit_handler(context)),
        ("window:create", window_create_handler(context)),
        ("window:close", window_close_handler(context)),
        ("camera:list", camera_list_handler()),
        ("config:get", config_get_handler(context)),
        ("config:update", config_update_handler(context)),
    ];

    let mut installed = 0;
    for (channel, handler) in handlers {
        if ipc.register_handler(channel, handler) {
            installed += 1;
        }
    }
    info!("installed {installed} builtin handlers");
    installed
}

fn app_ready_handler() -> IpcHandler {
    Arc::new(|_message: Message| {
        Box::pin(async {
            Ok(json!({
                "name": APP_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "platform": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }))
        })
    })
}

fn app_quit_handler(context: &HandlerContext) -> IpcHandler {
    let context = context.clone();
    Arc::new(move |_message: Message| {
        let context = context.clone();
        Box::pin(async move {
            context.quit_requested.store(true, Ordering::SeqCst);
            info!("quit requested over ipc");
            if let Ok(windows) = context.window_manager() {
                windows.close_all_windows();
            }
            Ok(json!({ "quitting": true }))
        })
    })
}

fn window_create_handler(context: &HandlerContext) -> IpcHandler {
    let context = context.clone();
    Arc::new(move |message: Message| {
        let context = context.clone();
        Box::pin(async move { create_window(&context, &message) })
    })
}

fn create_window(context: &HandlerContext, message: &Message) -> HandlerResult {
    let windows = context.window_manager()?;

    let raw_type = message.payload["windowType"].clone();
    let window_type: WindowType = serde_json::from_value(raw_type.clone()).map_err(|_| {
        HandlerError::new("UNKNOWN_WINDOW_TYPE", "unknown window type")
            .with_details(json!({ "windowType": raw_type }))
    })?;

    let options = CreateWindowOptions {
        panel_id: message.payload["panelId"].as_str().map(str::to_string),
        title: message.payload["title"].as_str().map(str::to_string),
    };
    let window = windows
        .create_window(window_type, &options)
        .map_err(HandlerError::from)?;

    Ok(json!({
        "windowId": window.id(),
        "windowType": window.window_type(),
        "panelId": windows.panel_id_of(window.id()),
    }))
}

fn window_close_handler(context: &HandlerContext) -> IpcHandler {
    let context = context.clone();
    Arc::new(move |message: Message| {
        let context = context.clone();
        Box::pin(async move {
            let windows = context.window_manager()?;
            let window_id = message.payload["windowId"].as_u64().ok_or_else(|| {
                HandlerError::new("INVALID_PAYLOAD", "missing field 'windowId'")
            })?;
            Ok(json!({ "closed": windows.close_window(window_id) }))
        })
    })
}

// Camera access lives in the guest; the host only names the default device.
fn camera_list_handler() -> IpcHandler {
    Arc::new(|_message: Message| {
        Box::pin(async {
            Ok(json!([
                { "id": "camera1", "label": "Default Camera", "deviceId": "default" },
            ]))
        })
    })
}

fn config_get_handler(context: &HandlerContext) -> IpcHandler {
    let context = context.clone();
    Arc::new(move |_message: Message| {
        let context = context.clone();
        Box::pin(async move { Ok(context.config.to_value()) })
    })
}

fn config_update_handler(context: &HandlerContext) -> IpcHandler {
    let context = context.clone();
    Arc::new(move |message: Message| {
        let context = context.clone();
        Box::pin(async move {
            context
                .config
                .update(&message.payload)
                .map_err(HandlerError::from)?;
            Ok(context.config.to_value())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::platform::WindowBackend;
    use crate::platform::headless::HeadlessBackend;
    use crate::store::StateStore;
    use crate::windows::events::WindowEventHandler;
    use crate::windows::state::WindowStateManager;
    use gaze_shared::ChannelRegistry;

    struct Fixture {
        _dir: tempfile::TempDir,
        ipc: Arc<IpcManager>,
        windows: Arc<WindowManager>,
        quit_requested: Arc<AtomicBool>,
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
        let quit_requested = Arc::new(AtomicBool::new(false));
        let events = WindowEventHandler::new(
            Arc::clone(&ipc),
            Arc::clone(&state),
            Arc::clone(&backend) as Arc<dyn WindowBackend>,
            Arc::clone(&quit_requested),
        );
        let windows = WindowManager::new(
            backend as Arc<dyn WindowBackend>,
            state,
            Arc::clone(&ipc),
            events,
        );

        let context = HandlerContext {
            config: ConfigStore::new(dir.path()),
            windows: Arc::downgrade(&windows),
            quit_requested: Arc::clone(&quit_requested),
        };
        assert_eq!(install(&ipc, &context), 7);

        Fixture {
            _dir: dir,
            ipc,
            windows,
            quit_requested,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_ready_reports_metadata() {
        let fixture = fixture();
        let request = Message::request("app:ready", json!({}), "renderer-1", "main");
        let response = fixture.ipc.handle_request(request).await;

        assert!(response.is_success_response());
        let data = response.response_data();
        assert_eq!(data["name"], json!("Gaze Detection"));
        assert!(data["version"].as_str().is_some_and(|v| !v.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_create_and_close_roundtrip() {
        let fixture = fixture();
        let request = Message::request(
            "window:create",
            json!({ "windowType": "face-panel", "panelId": "alice" }),
            "renderer-1",
            "main",
        );
        let response = fixture.ipc.handle_request(request).await;
        assert!(response.is_success_response());

        let data = response.response_data();
        let window_id = data["windowId"].as_u64().unwrap();
        assert_eq!(data["panelId"], json!("alice"));
        assert_eq!(fixture.windows.face_panel_windows().len(), 1);

        let close = Message::request(
            "window:close",
            json!({ "windowId": window_id }),
            "renderer-1",
            "main",
        );
        let response = fixture.ipc.handle_request(close).await;
        assert_eq!(response.response_data(), json!({ "closed": true }));
        assert!(fixture.windows.face_panel_windows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_create_rejects_unknown_type() {
        let fixture = fixture();
        let request = Message::request(
            "window:create",
            json!({ "windowType": "popup" }),
            "renderer-1",
            "main",
        );
        let response = fixture.ipc.handle_request(request).await;

        let error = response.error_from_response().unwrap();
        assert_eq!(error.code, "UNKNOWN_WINDOW_TYPE");
        assert_eq!(error.details, Some(json!({ "windowType": "popup" })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_quit_sets_flag_and_closes_windows() {
        let fixture = fixture();
        fixture.windows.create_main_window().unwrap();

        let request = Message::request("app:quit", json!({}), "renderer-1", "main");
        let response = fixture.ipc.handle_request(request).await;

        assert_eq!(response.response_data(), json!({ "quitting": true }));
        assert!(fixture.quit_requested.load(Ordering::SeqCst));
        assert!(fixture.windows.main_window().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_list() {
        let fixture = fixture();
        let request = Message::request("camera:list", json!({}), "renderer-1", "main");
        let response = fixture.ipc.handle_request(request).await;

        let cameras = response.response_data();
        assert_eq!(cameras[0]["deviceId"], json!("default"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_get_and_update() {
        let fixture = fixture();
        let request = Message::request("config:get", json!({}), "renderer-1", "main");
        let response = fixture.ipc.handle_request(request).await;
        assert_eq!(response.response_data()["camera"]["frameRate"], json!(30));

        let request = Message::request(
            "config:update",
            json!({ "camera": { "frameRate": 60 } }),
            "renderer-1",
            "main",
        );
        let response = fixture.ipc.handle_request(request).await;
        let data = response.response_data();
        assert_eq!(data["camera"]["frameRate"], json!(60));
        // Untouched fields keep their defaults.
        assert_eq!(data["camera"]["width"], json!(640));
    }
}

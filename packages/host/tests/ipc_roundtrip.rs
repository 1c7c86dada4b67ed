//! End-to-end tests over the assembled application: a real guest client
//! talking to the host through a minted bridge, with headless windows.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gaze_client::{ClientError, IpcClient};
use gaze_host::App;
use gaze_host::ipc::WindowLister;
use gaze_host::platform::WindowBackend;
use gaze_host::platform::headless::HeadlessBackend;
use gaze_shared::Bridge;

struct Harness {
    _dir: tempfile::TempDir,
    backend: Arc<HeadlessBackend>,
    app: Arc<App>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(HeadlessBackend::new());
    let app = App::new(Arc::clone(&backend) as Arc<dyn WindowBackend>, dir.path());
    app.initialize().unwrap();
    Harness {
        _dir: dir,
        backend,
        app,
    }
}

fn client_for_main(harness: &Harness) -> IpcClient {
    let main = harness.app.windows().main_window().unwrap();
    let bridge = harness.app.attach_guest(main.id()).unwrap();
    IpcClient::new(Arc::new(bridge))
}

#[tokio::test(start_paused = true)]
async fn camera_list_roundtrip() {
    let harness = harness();
    let client = client_for_main(&harness);

    let cameras = client.send_request("camera:list", json!({})).await.unwrap();
    assert_eq!(cameras[0]["id"], json!("camera1"));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn guest_cannot_reach_host_only_channels() {
    let harness = harness();
    let client = client_for_main(&harness);

    // state:update flows host to guest only.
    let error = client
        .send_request("state:update", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::ChannelNotAllowed(_)));

    // The raw bridge refuses the same channel on the send path.
    let main = harness.app.windows().main_window().unwrap();
    let bridge = harness.app.attach_guest(main.id()).unwrap();
    let forged = gaze_shared::Message::notification("camera:frame", json!({}), "renderer-1");
    assert!(bridge.send("camera:frame", forged).is_err());
}

#[tokio::test(start_paused = true)]
async fn timed_out_request_leaves_no_pending_state() {
    let harness = harness();
    let client = client_for_main(&harness);

    // A handler that never resolves.
    harness.app.ipc().register_handler(
        "detection:start",
        Arc::new(|_message| {
            Box::pin(futures_util::future::pending::<gaze_host::ipc::HandlerResult>())
        }),
    );

    let error = client
        .send_request_with_timeout("detection:start", json!({}), Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(error.is_timeout());
    assert_eq!(client.pending_count(), 0);

    // The client is still usable afterwards.
    let cameras = client.send_request("camera:list", json!({})).await.unwrap();
    assert!(cameras.is_array());
}

#[tokio::test(start_paused = true)]
async fn window_lifecycle_over_ipc() {
    let harness = harness();
    let client = client_for_main(&harness);

    let created = client
        .send_request(
            "window:create",
            json!({ "windowType": "face-panel", "panelId": "subject-1" }),
        )
        .await
        .unwrap();
    let panel_id = created["windowId"].as_u64().unwrap();
    assert_eq!(harness.app.windows().face_panel_windows().len(), 1);
    assert_eq!(harness.app.communication().known_window_ids().len(), 2);

    let closed = client
        .send_request("window:close", json!({ "windowId": panel_id }))
        .await
        .unwrap();
    assert_eq!(closed, json!({ "closed": true }));
    assert!(harness.app.windows().face_panel_windows().is_empty());
    assert_eq!(harness.app.communication().known_window_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn broadcast_message_reaches_other_windows() {
    let harness = harness();
    let client = client_for_main(&harness);

    let created = client
        .send_request("window:create", json!({ "windowType": "face-panel" }))
        .await
        .unwrap();
    let panel_id = created["windowId"].as_u64().unwrap();
    let panel = harness.backend.window(panel_id).unwrap();
    panel.drain_delivered();

    let delivered = client
        .send_request(
            "window:message",
            json!({ "targetWindowId": "all", "payload": { "hello": true } }),
        )
        .await
        .unwrap();
    assert_eq!(delivered["delivered"], json!(2));

    let messages = panel.drain_delivered();
    assert!(messages.iter().any(|(channel, _)| channel == "window:message"));
}

#[tokio::test(start_paused = true)]
async fn state_sync_updates_store_and_fans_out() {
    let harness = harness();
    let client = client_for_main(&harness);

    client
        .send_request("window:create", json!({ "windowType": "face-panel" }))
        .await
        .unwrap();

    let synced = client
        .send_request(
            "window:state-sync",
            json!({ "domain": "detection", "key": "isDetecting", "value": true }),
        )
        .await
        .unwrap();
    assert_eq!(synced["synced"], json!(2));

    let stored = harness
        .app
        .store()
        .get_state("detection", Some("isDetecting"))
        .unwrap();
    assert_eq!(stored, json!(true));
}

#[tokio::test(start_paused = true)]
async fn window_moves_collapse_into_one_save() {
    let harness = harness();
    let main = harness.app.windows().main_window().unwrap();
    let before = harness.app.window_state().save_count();

    for step in 0..4 {
        main.set_bounds(gaze_shared::Rect::new(40 * step, 30 * step, 1024, 768));
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(harness.app.window_state().save_count(), before + 1);
}

#[tokio::test(start_paused = true)]
async fn config_update_persists_across_app_instances() {
    let dir = tempfile::tempdir().unwrap();
    {
        let backend = Arc::new(HeadlessBackend::new());
        let app = App::new(Arc::clone(&backend) as Arc<dyn WindowBackend>, dir.path());
        app.initialize().unwrap();

        let main = app.windows().main_window().unwrap();
        let client = IpcClient::new(Arc::new(app.attach_guest(main.id()).unwrap()));
        client
            .send_request(
                "config:update",
                json!({ "detection": { "minConfidence": 0.9 } }),
            )
            .await
            .unwrap();
        app.shutdown();
    }

    let backend = Arc::new(HeadlessBackend::new());
    let app = App::new(backend as Arc<dyn WindowBackend>, dir.path());
    app.initialize().unwrap();
    let config = app.config().get();
    assert!((config.detection.min_confidence - 0.9).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn app_quit_closes_windows_and_sets_flag() {
    let harness = harness();
    let client = client_for_main(&harness);

    let quitting = client.send_request("app:quit", json!({})).await.unwrap();
    assert_eq!(quitting, json!({ "quitting": true }));
    assert!(harness.app.is_quitting());
    assert!(harness.app.windows().all_windows().is_empty());
}

//! Behavior of the floating face panels.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use parking_lot::Mutex;
use serde_json::{Value, json};

use gaze_shared::{Rect, WindowEventType, WindowType};

use crate::error::HostResult;
use crate::platform::PlatformWindow;
use crate::windows::behavior::{BehaviorContext, WindowTypeBehavior};

/// Distance in pixels within which a dragged panel snaps to a work area
/// edge.
const SNAP_DISTANCE: i32 = 16;

/// Face panels report focus changes to their guest, snap to the nearest
/// screen edge after a drag, and swap places with a panel they are dropped
/// onto.
#[derive(Debug, Default)]
pub struct FacePanelBehavior {
    /// Last settled bounds per panel, the anchor a displaced panel returns
    /// to on a swap.
    docked: Mutex<HashMap<u64, Rect>>,
    /// Guards against re-entry while this behavior is itself moving panels.
    moving: AtomicBool,
}

impl FacePanelBehavior {
    #[allow(clippy::cast_possible_wrap)]
    fn snapped_position(bounds: &Rect, work_area: &Rect) -> Option<(i32, i32)> {
        let mut x = bounds.x;
        let mut y = bounds.y;

        let right_edge = work_area.x + work_area.width as i32 - bounds.width as i32;
        let bottom_edge = work_area.y + work_area.height as i32 - bounds.height as i32;

        if (x - work_area.x).abs() <= SNAP_DISTANCE {
            x = work_area.x;
        } else if (x - right_edge).abs() <= SNAP_DISTANCE {
            x = right_edge;
        }
        if (y - work_area.y).abs() <= SNAP_DISTANCE {
            y = work_area.y;
        } else if (y - bottom_edge).abs() <= SNAP_DISTANCE {
            y = bottom_edge;
        }

        if (x, y) == (bounds.x, bounds.y) { None } else { Some((x, y)) }
    }

    /// `true` when the target rectangle's center falls inside `bounds`.
    #[allow(clippy::cast_possible_wrap)]
    fn occupies(bounds: &Rect, target: &Rect) -> bool {
        let center_x = target.x + target.width as i32 / 2;
        let center_y = target.y + target.height as i32 / 2;
        center_x >= bounds.x
            && center_x < bounds.x + bounds.width as i32
            && center_y >= bounds.y
            && center_y < bounds.y + bounds.height as i32
    }

    fn handle_moved(&self, context: &BehaviorContext, window: &Arc<dyn PlatformWindow>) {
        let Some(display) = context.backend.primary_display() else {
            return;
        };
        let bounds = window.bounds();
        let target = Self::snapped_position(&bounds, &display.work_area)
            .map_or(bounds, |(x, y)| Rect::new(x, y, bounds.width, bounds.height));

        let displaced = context
            .ipc
            .live_windows()
            .into_iter()
            .find(|sibling| {
                sibling.id() != window.id()
                    && sibling.window_type() == WindowType::FacePanel
                    && Self::occupies(&sibling.bounds(), &target)
            });

        let previous = self.docked.lock().get(&window.id()).copied();

        if target != bounds {
            debug!("snapping panel {} to ({}, {})", window.id(), target.x, target.y);
            window.set_bounds(target);
        }
        if let (Some(sibling), Some(previous)) = (displaced, previous) {
            debug!("swapping panels {} and {}", window.id(), sibling.id());
            sibling.set_bounds(previous);
            self.docked.lock().insert(sibling.id(), previous);
        }
        self.docked.lock().insert(window.id(), target);
    }
}

impl WindowTypeBehavior for FacePanelBehavior {
    fn window_type(&self) -> WindowType {
        WindowType::FacePanel
    }

    fn on_register(
        &self,
        _context: &BehaviorContext,
        window: &Arc<dyn PlatformWindow>,
    ) -> HostResult<()> {
        self.docked.lock().insert(window.id(), window.bounds());
        Ok(())
    }

    fn on_unregister(&self, _context: &BehaviorContext, window_id: u64) -> HostResult<()> {
        self.docked.lock().remove(&window_id);
        Ok(())
    }

    fn on_event(
        &self,
        context: &BehaviorContext,
        window: &Arc<dyn PlatformWindow>,
        event: WindowEventType,
        _data: &Value,
    ) -> HostResult<bool> {
        match event {
            WindowEventType::Focus => {
                context.ipc.send_to_renderer(
                    window.as_ref(),
                    "window:message",
                    json!({ "type": "panel-focus" }),
                );
            }
            WindowEventType::Blur => {
                context.ipc.send_to_renderer(
                    window.as_ref(),
                    "window:message",
                    json!({ "type": "panel-blur" }),
                );
            }
            WindowEventType::Moved => {
                if !self.moving.swap(true, Ordering::SeqCst) {
                    self.handle_moved(context, window);
                    self.moving.store(false, Ordering::SeqCst);
                }
            }
            _ => {}
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use crate::ipc::{IpcManager, WindowLister};
    use crate::platform::headless::HeadlessBackend;
    use crate::platform::{WindowBackend, WindowOptions};
    use gaze_shared::ChannelRegistry;

    struct BackendWindows(Arc<HeadlessBackend>);

    impl WindowLister for BackendWindows {
        fn all_windows(&self) -> Vec<Arc<dyn PlatformWindow>> {
            self.0.all_windows()
        }
    }

    fn context() -> (Arc<HeadlessBackend>, BehaviorContext, Arc<dyn WindowLister>) {
        let backend = Arc::new(HeadlessBackend::new());
        let ipc = Arc::new(IpcManager::new(Arc::new(ChannelRegistry::with_builtin_channels())));
        let lister: Arc<dyn WindowLister> = Arc::new(BackendWindows(Arc::clone(&backend)));
        ipc.set_window_source(Arc::downgrade(&lister));
        let context = BehaviorContext {
            ipc,
            backend: Arc::clone(&backend) as Arc<dyn WindowBackend>,
            quit_requested: Arc::new(AtomicBool::new(false)),
        };
        (backend, context, lister)
    }

    #[test]
    fn test_snap_within_distance() {
        let work_area = Rect::new(0, 0, 1920, 1040);

        // 10px from the left edge snaps to it.
        let bounds = Rect::new(10, 400, 300, 300);
        assert_eq!(
            FacePanelBehavior::snapped_position(&bounds, &work_area),
            Some((0, 400))
        );

        // 12px from the bottom-right corner snaps both axes.
        let bounds = Rect::new(1610, 730, 300, 300);
        assert_eq!(
            FacePanelBehavior::snapped_position(&bounds, &work_area),
            Some((1620, 740))
        );

        // Far from every edge stays put.
        let bounds = Rect::new(500, 400, 300, 300);
        assert_eq!(FacePanelBehavior::snapped_position(&bounds, &work_area), None);
    }

    #[test]
    fn test_moved_event_snaps_window() {
        let (backend, context, _lister) = context();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        let behavior = FacePanelBehavior::default();
        behavior.on_register(&context, &window).unwrap();

        window.set_bounds(Rect::new(8, 500, 300, 300));
        behavior
            .on_event(&context, &window, WindowEventType::Moved, &json!({}))
            .unwrap();
        assert_eq!(window.bounds(), Rect::new(0, 500, 300, 300));
    }

    #[test]
    fn test_dropping_on_a_sibling_swaps_positions() {
        let (backend, context, _lister) = context();
        let behavior = FacePanelBehavior::default();

        let dragged = backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        let settled = backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();

        dragged.set_bounds(Rect::new(100, 100, 300, 300));
        settled.set_bounds(Rect::new(600, 100, 300, 300));
        behavior.on_register(&context, &dragged).unwrap();
        behavior.on_register(&context, &settled).unwrap();

        // Drop the first panel onto the second.
        dragged.set_bounds(Rect::new(590, 110, 300, 300));
        behavior
            .on_event(&context, &dragged, WindowEventType::Moved, &json!({}))
            .unwrap();

        assert_eq!(settled.bounds(), Rect::new(100, 100, 300, 300));
        assert_eq!(dragged.bounds(), Rect::new(590, 110, 300, 300));
    }

    #[test]
    fn test_focus_and_blur_notify_guest() {
        let (backend, context, _lister) = context();
        let window = backend
            .create_window(&WindowOptions::for_type(WindowType::FacePanel))
            .unwrap();
        let concrete = backend.window(window.id()).unwrap();
        let behavior = FacePanelBehavior::default();

        behavior
            .on_event(&context, &window, WindowEventType::Focus, &json!({}))
            .unwrap();
        behavior
            .on_event(&context, &window, WindowEventType::Blur, &json!({}))
            .unwrap();

        let delivered = concrete.drain_delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].1.payload, json!({ "type": "panel-focus" }));
        assert_eq!(delivered[1].1.payload, json!({ "type": "panel-blur" }));
    }
}

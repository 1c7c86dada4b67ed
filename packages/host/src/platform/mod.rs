//! Windowing platform abstraction.
//!
//! The window managers in this crate never talk to a concrete windowing
//! system. They work against [`PlatformWindow`] and [`WindowBackend`], which
//! a real desktop shell implements over its toolkit and
//! [`headless::HeadlessBackend`] implements in memory for tests and embedding.

pub mod headless;

use std::sync::Arc;

use gaze_shared::{ListenerId, Message, Rect, WindowEventType, WindowType};

use crate::error::HostResult;

/// Raw event emitted by a platform window.
///
/// Mapped onto the shared [`WindowEventType`] taxonomy by
/// [`RawWindowEvent::event_type`]; the match is exhaustive so a new raw event
/// cannot be added without deciding its public name.
#[derive(Debug, Clone, PartialEq)]
pub enum RawWindowEvent {
    /// The window finished initializing and is ready to show.
    Ready,
    Focus,
    Blur,
    /// Close was requested; the window still exists.
    CloseRequested,
    /// The window is gone.
    Destroyed,
    Maximized,
    Unmaximized,
    Minimized,
    Restored,
    Resized(Rect),
    Moving { x: i32, y: i32 },
    MoveEnded { x: i32, y: i32 },
    TitleChanged(String),
    ContentLoaded,
    DomReady,
    EnterFullscreen,
    LeaveFullscreen,
    EnterHtmlFullscreen,
    LeaveHtmlFullscreen,
    AppCommand(String),
    SystemContextMenu { x: i32, y: i32 },
}

impl RawWindowEvent {
    /// Maps this raw event onto the uniform taxonomy.
    #[must_use]
    pub const fn event_type(&self) -> WindowEventType {
        match self {
            Self::Ready => WindowEventType::Ready,
            Self::Focus => WindowEventType::Focus,
            Self::Blur => WindowEventType::Blur,
            Self::CloseRequested => WindowEventType::Close,
            Self::Destroyed => WindowEventType::Closed,
            Self::Maximized => WindowEventType::Maximize,
            Self::Unmaximized => WindowEventType::Unmaximize,
            Self::Minimized => WindowEventType::Minimize,
            Self::Restored => WindowEventType::Restore,
            Self::Resized(_) => WindowEventType::Resize,
            Self::Moving { .. } => WindowEventType::Move,
            Self::MoveEnded { .. } => WindowEventType::Moved,
            Self::TitleChanged(_) => WindowEventType::TitleChange,
            Self::ContentLoaded => WindowEventType::Loaded,
            Self::DomReady => WindowEventType::DomReady,
            Self::EnterFullscreen => WindowEventType::EnterFullscreen,
            Self::LeaveFullscreen => WindowEventType::LeaveFullscreen,
            Self::EnterHtmlFullscreen => WindowEventType::EnterHtmlFullscreen,
            Self::LeaveHtmlFullscreen => WindowEventType::LeaveHtmlFullscreen,
            Self::AppCommand(_) => WindowEventType::AppCommand,
            Self::SystemContextMenu { .. } => WindowEventType::SystemContextMenu,
        }
    }
}

/// Options for creating a platform window.
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub window_type: WindowType,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub min_width: u32,
    pub min_height: u32,
    pub resizable: bool,
    pub always_on_top: bool,
    pub show: bool,
    /// Window id this window is modal to, if any.
    pub parent: Option<u64>,
}

impl WindowOptions {
    /// Creates options seeded from the type's default geometry.
    #[must_use]
    pub fn for_type(window_type: WindowType) -> Self {
        let (width, height) = window_type.default_size();
        let (min_width, min_height) = window_type.minimum_size();
        Self {
            window_type,
            title: String::new(),
            width,
            height,
            x: None,
            y: None,
            min_width,
            min_height,
            resizable: true,
            always_on_top: window_type == WindowType::FacePanel,
            show: true,
            parent: None,
        }
    }
}

/// A connected display.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub id: u64,
    /// Full display bounds.
    pub bounds: Rect,
    /// Bounds minus reserved areas such as task bars.
    pub work_area: Rect,
    pub scale_factor: f64,
    pub primary: bool,
}

/// Display topology change.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Added(DisplayInfo),
    Removed(DisplayInfo),
    MetricsChanged(DisplayInfo),
}

/// Callback invoked with raw window events.
pub type WindowEventListener = Arc<dyn Fn(&RawWindowEvent) + Send + Sync>;

/// Callback invoked with messages delivered to the window's guest surface.
pub type DeliveryListener = Arc<dyn Fn(&str, &Message) + Send + Sync>;

/// Callback invoked with display topology changes.
pub type DisplayEventListener = Arc<dyn Fn(&DisplayEvent) + Send + Sync>;

/// A single window owned by the platform.
///
/// Operations on a destroyed window are silently ignored; callers that care
/// check [`PlatformWindow::is_destroyed`] first.
pub trait PlatformWindow: Send + Sync {
    fn id(&self) -> u64;
    fn window_type(&self) -> WindowType;

    fn bounds(&self) -> Rect;
    fn set_bounds(&self, bounds: Rect);
    fn set_size(&self, width: u32, height: u32);

    fn title(&self) -> String;
    fn set_title(&self, title: &str);

    fn is_maximized(&self) -> bool;
    fn is_minimized(&self) -> bool;
    fn is_focused(&self) -> bool;
    fn is_visible(&self) -> bool;
    fn is_destroyed(&self) -> bool;

    fn maximize(&self);
    fn unmaximize(&self);
    fn minimize(&self);
    fn restore(&self);
    fn focus(&self);
    fn show(&self);

    /// Asks the window to close. Emits [`RawWindowEvent::CloseRequested`];
    /// whether the window is then destroyed is up to the close handling.
    fn request_close(&self);

    /// Destroys the window.
    fn close(&self);

    /// Delivers a message to the guest surface hosted in this window.
    ///
    /// Returns `false` when the window is destroyed.
    fn deliver(&self, channel: &str, message: &Message) -> bool;

    fn on_event(&self, listener: WindowEventListener) -> ListenerId;
    fn remove_event_listener(&self, listener: ListenerId);

    fn on_delivery(&self, listener: DeliveryListener) -> ListenerId;
    fn remove_delivery_listener(&self, listener: ListenerId);
}

/// The windowing system itself.
pub trait WindowBackend: Send + Sync {
    /// Creates a window.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform refuses the window.
    fn create_window(&self, options: &WindowOptions) -> HostResult<Arc<dyn PlatformWindow>>;

    /// All connected displays.
    fn displays(&self) -> Vec<DisplayInfo>;

    /// The primary display, when one exists.
    fn primary_display(&self) -> Option<DisplayInfo> {
        self.displays().into_iter().find(|display| display.primary)
    }

    fn on_display_event(&self, listener: DisplayEventListener) -> ListenerId;
    fn remove_display_listener(&self, listener: ListenerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_mapping() {
        assert_eq!(RawWindowEvent::Ready.event_type(), WindowEventType::Ready);
        assert_eq!(
            RawWindowEvent::CloseRequested.event_type(),
            WindowEventType::Close
        );
        assert_eq!(RawWindowEvent::Destroyed.event_type(), WindowEventType::Closed);
        assert_eq!(
            RawWindowEvent::Resized(Rect::new(0, 0, 1, 1)).event_type(),
            WindowEventType::Resize
        );
        assert_eq!(
            RawWindowEvent::MoveEnded { x: 0, y: 0 }.event_type(),
            WindowEventType::Moved
        );
        assert_eq!(
            RawWindowEvent::AppCommand("browser-refresh".into()).event_type(),
            WindowEventType::AppCommand
        );
    }

    #[test]
    fn test_options_for_type() {
        let options = WindowOptions::for_type(WindowType::FacePanel);
        assert_eq!((options.width, options.height), (300, 300));
        assert_eq!((options.min_width, options.min_height), (200, 200));
        assert!(options.always_on_top);

        let options = WindowOptions::for_type(WindowType::Main);
        assert!(!options.always_on_top);
        assert_eq!((options.width, options.height), (1024, 768));
    }
}

//! Uniform window event taxonomy.
//!
//! The host funnels every platform window event through this enum before
//! rebroadcasting it to guests, so guests only ever see one naming scheme.

use serde::{Deserialize, Serialize};

/// Every window lifecycle event the system recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowEventType {
    Ready,
    Focus,
    Blur,
    /// The window was asked to close but is still alive.
    Close,
    /// The window is gone.
    Closed,
    Maximize,
    Unmaximize,
    Minimize,
    Restore,
    Resize,
    Move,
    /// A move gesture finished.
    Moved,
    TitleChange,
    Loaded,
    DomReady,
    EnterFullscreen,
    LeaveFullscreen,
    EnterHtmlFullscreen,
    LeaveHtmlFullscreen,
    AppCommand,
    SystemContextMenu,
}

impl WindowEventType {
    /// Stable string form used in `window:event` payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Close => "close",
            Self::Closed => "closed",
            Self::Maximize => "maximize",
            Self::Unmaximize => "unmaximize",
            Self::Minimize => "minimize",
            Self::Restore => "restore",
            Self::Resize => "resize",
            Self::Move => "move",
            Self::Moved => "moved",
            Self::TitleChange => "title-change",
            Self::Loaded => "loaded",
            Self::DomReady => "dom-ready",
            Self::EnterFullscreen => "enter-fullscreen",
            Self::LeaveFullscreen => "leave-fullscreen",
            Self::EnterHtmlFullscreen => "enter-html-fullscreen",
            Self::LeaveHtmlFullscreen => "leave-html-fullscreen",
            Self::AppCommand => "app-command",
            Self::SystemContextMenu => "system-context-menu",
        }
    }

    /// Returns `true` for the two terminal events of a window's life.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Close | Self::Closed)
    }
}

impl std::fmt::Display for WindowEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Window types and persisted geometry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A rectangle in virtual screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Returns `true` if the two rectangles share any area.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // Window dimensions stay far below i32::MAX
    pub const fn intersects(&self, other: &Self) -> bool {
        let self_right = self.x.saturating_add(self.width as i32);
        let self_bottom = self.y.saturating_add(self.height as i32);
        let other_right = other.x.saturating_add(other.width as i32);
        let other_bottom = other.y.saturating_add(other.height as i32);

        self.x < other_right && other.x < self_right && self.y < other_bottom && other.y < self_bottom
    }
}

/// The window types the application knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowType {
    /// Primary application window. Singleton.
    Main,
    /// Small always-on-top panel showing a detected face. Many allowed.
    FacePanel,
    /// Settings dialog. Singleton, modal to the main window.
    Settings,
}

impl WindowType {
    /// Stable string form used in channel payloads and persistence keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::FacePanel => "face-panel",
            Self::Settings => "settings",
        }
    }

    /// Default geometry used when no state was persisted for this type.
    #[must_use]
    pub const fn default_state(self) -> WindowState {
        let (width, height) = self.default_size();
        WindowState {
            width,
            height,
            x: None,
            y: None,
            is_maximized: false,
        }
    }

    /// Default size for this window type.
    #[must_use]
    pub const fn default_size(self) -> (u32, u32) {
        match self {
            Self::Main => (1024, 768),
            Self::FacePanel => (300, 300),
            Self::Settings => (600, 500),
        }
    }

    /// Minimum size allowed for this window type.
    #[must_use]
    pub const fn minimum_size(self) -> (u32, u32) {
        match self {
            Self::Main => (800, 600),
            Self::FacePanel => (200, 200),
            Self::Settings => (400, 300),
        }
    }

    /// All known window types.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Main, Self::FacePanel, Self::Settings]
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowType {
    type Err = UnknownWindowType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "face-panel" => Ok(Self::FacePanel),
            "settings" => Ok(Self::Settings),
            other => Err(UnknownWindowType(other.to_string())),
        }
    }
}

/// Error produced when parsing an unknown window type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown window type '{0}'")]
pub struct UnknownWindowType(pub String);

/// Persisted geometry of a window.
///
/// `x`/`y` are absent when the window has never been positioned or when its
/// last known position no longer falls on any display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowState {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    pub is_maximized: bool,
}

impl Default for WindowState {
    fn default() -> Self {
        WindowType::Main.default_state()
    }
}

impl WindowState {
    /// Returns the window's rectangle when a position is known.
    #[must_use]
    pub fn rect(&self) -> Option<Rect> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Rect::new(x, y, self.width, self.height)),
            _ => None,
        }
    }
}

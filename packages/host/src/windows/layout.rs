//! Pure layout computation for face panel arrangements.
//!
//! These functions only compute target rectangles; applying them to windows
//! is the window manager's job. Keeping the math free of window handles
//! makes the arrangements directly testable.

use gaze_shared::Rect;

/// Options for [`grid_positions`].
#[derive(Debug, Clone, Copy)]
pub struct GridOptions {
    /// Panels per row before wrapping.
    pub max_per_row: usize,
    /// Gap between panels, horizontally and vertically.
    pub spacing: u32,
    pub panel_width: u32,
    pub panel_height: u32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            max_per_row: 3,
            spacing: 20,
            panel_width: 300,
            panel_height: 300,
        }
    }
}

/// Options for the stack and row arrangements.
#[derive(Debug, Clone, Copy)]
pub struct LineOptions {
    pub spacing: u32,
    pub panel_width: u32,
    pub panel_height: u32,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            spacing: 20,
            panel_width: 300,
            panel_height: 300,
        }
    }
}

/// Computes non-overlapping grid positions for `count` panels, row-major
/// from the work area origin.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub fn grid_positions(count: usize, area: &Rect, options: &GridOptions) -> Vec<Rect> {
    let per_row = options.max_per_row.max(1);
    (0..count)
        .map(|index| {
            let row = (index / per_row) as i32;
            let column = (index % per_row) as i32;
            Rect::new(
                area.x + column * (options.panel_width + options.spacing) as i32,
                area.y + row * (options.panel_height + options.spacing) as i32,
                options.panel_width,
                options.panel_height,
            )
        })
        .collect()
}

/// Computes positions stacking `count` panels top to bottom.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub fn vertical_stack_positions(count: usize, area: &Rect, options: &LineOptions) -> Vec<Rect> {
    (0..count)
        .map(|index| {
            Rect::new(
                area.x,
                area.y + (index as i32) * (options.panel_height + options.spacing) as i32,
                options.panel_width,
                options.panel_height,
            )
        })
        .collect()
}

/// Computes positions laying `count` panels out left to right.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub fn horizontal_row_positions(count: usize, area: &Rect, options: &LineOptions) -> Vec<Rect> {
    (0..count)
        .map(|index| {
            Rect::new(
                area.x + (index as i32) * (options.panel_width + options.spacing) as i32,
                area.y,
                options.panel_width,
                options.panel_height,
            )
        })
        .collect()
}

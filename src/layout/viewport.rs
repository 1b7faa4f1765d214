//! Vertical scroll state for the grid body.

use serde::Serialize;

use super::window::{visible_window, VirtualWindow};

pub const DEFAULT_ROW_HEIGHT_PX: f64 = 36.0;
pub const DEFAULT_OVERSCAN: usize = 5;
pub const DEFAULT_VIEWPORT_HEIGHT_PX: f64 = 600.0;

/// Viewport state - the visible slice of the row list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// Vertical scroll position in pixels
    pub scroll_y: f64,
    /// Viewport height in pixels
    pub height: f64,
    /// Fixed height of every row
    pub row_height_px: f64,
    /// Extra rows rendered above and below the visible ones
    pub overscan: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_HEIGHT_PX, DEFAULT_ROW_HEIGHT_PX, DEFAULT_OVERSCAN)
    }
}

impl Viewport {
    #[must_use]
    pub fn new(height: f64, row_height_px: f64, overscan: usize) -> Self {
        Self {
            scroll_y: 0.0,
            height,
            row_height_px,
            overscan,
        }
    }

    /// Total content height for `row_count` rows.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn content_height(&self, row_count: usize) -> f64 {
        row_count as f64 * self.row_height_px
    }

    /// Largest scroll offset that still shows content: `max(0, rows·h − height)`.
    #[must_use]
    pub fn max_scroll(&self, row_count: usize) -> f64 {
        let max = self.content_height(row_count) - self.height;
        if max.is_finite() {
            max.max(0.0)
        } else {
            0.0
        }
    }

    /// Clamp scroll position to valid range.
    pub fn clamp_scroll(&mut self, row_count: usize) {
        let max = self.max_scroll(row_count);
        self.scroll_y = if self.scroll_y.is_nan() {
            0.0
        } else {
            self.scroll_y.clamp(0.0, max)
        };
    }

    /// Scroll by a delta
    pub fn scroll_by(&mut self, delta_y: f64, row_count: usize) {
        self.scroll_y += delta_y;
        self.clamp_scroll(row_count);
    }

    /// Set absolute scroll position
    pub fn set_scroll(&mut self, y: f64, row_count: usize) {
        self.scroll_y = y;
        self.clamp_scroll(row_count);
    }

    /// Resize the viewport; the scroll position is re-clamped to the new height.
    pub fn resize(&mut self, height: f64, row_count: usize) {
        self.height = if height.is_finite() {
            height.max(0.0)
        } else {
            0.0
        };
        self.clamp_scroll(row_count);
    }

    /// Scroll the minimum distance that brings row `index` fully into view.
    #[allow(clippy::cast_precision_loss)]
    pub fn ensure_visible(&mut self, index: usize, row_count: usize) {
        let top = index as f64 * self.row_height_px;
        let bottom = top + self.row_height_px;
        if top < self.scroll_y {
            self.scroll_y = top;
        } else if bottom > self.scroll_y + self.height {
            self.scroll_y = bottom - self.height;
        }
        self.clamp_scroll(row_count);
    }

    /// Rows to render at the current scroll position.
    #[must_use]
    pub fn window(&self, row_count: usize) -> VirtualWindow {
        visible_window(
            self.scroll_y,
            self.height,
            row_count,
            self.row_height_px,
            self.overscan,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_scroll_bounds() {
        let mut vp = Viewport::new(360.0, 36.0, 0);
        vp.set_scroll(-10.0, 100);
        assert_eq!(vp.scroll_y, 0.0);
        vp.set_scroll(1e9, 100);
        assert_eq!(vp.scroll_y, 3600.0 - 360.0);
        vp.set_scroll(f64::NAN, 100);
        assert_eq!(vp.scroll_y, 0.0);
    }

    #[test]
    fn test_short_table_cannot_scroll() {
        let mut vp = Viewport::new(600.0, 36.0, 5);
        vp.scroll_by(500.0, 3);
        assert_eq!(vp.scroll_y, 0.0);
        assert_eq!(vp.max_scroll(3), 0.0);
    }

    #[test]
    fn test_scroll_by_accumulates() {
        let mut vp = Viewport::new(360.0, 36.0, 0);
        vp.scroll_by(36.0, 100);
        vp.scroll_by(72.0, 100);
        assert_eq!(vp.scroll_y, 108.0);
        assert_eq!(vp.window(100).first_visible_index(), Some(3));
    }

    #[test]
    fn test_resize_reclamps() {
        let mut vp = Viewport::new(360.0, 36.0, 0);
        vp.set_scroll(3240.0, 100);
        vp.resize(720.0, 100);
        assert_eq!(vp.scroll_y, 3600.0 - 720.0);
    }

    #[test]
    fn test_ensure_visible() {
        let mut vp = Viewport::new(360.0, 36.0, 0);
        vp.ensure_visible(20, 100);
        // Row 20 spans 720..756; bottom-aligned in a 360px viewport.
        assert_eq!(vp.scroll_y, 396.0);
        vp.ensure_visible(2, 100);
        assert_eq!(vp.scroll_y, 72.0);
        vp.ensure_visible(5, 100);
        assert_eq!(vp.scroll_y, 72.0);
    }

    #[test]
    fn test_window_follows_scroll() {
        let mut vp = Viewport::default();
        assert_eq!(vp.window(0).len(), 0);
        vp.set_scroll(3600.0, 1000);
        let w = vp.window(1000);
        assert_eq!(w.first_visible_index(), Some(95));
        assert_eq!(w.last_visible_index(), Some(122));
    }
}

//! Visible row range for a virtualized list of fixed-height rows.

use serde::Serialize;
use std::ops::Range;

/// Contiguous block of row indices to render, overscan included.
///
/// Serializes with inclusive `firstVisibleIndex`/`lastVisibleIndex`, both `null` when empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "WindowRepr")]
pub struct VirtualWindow {
    start: usize,
    end: usize,
    pub row_height_px: f64,
    pub overscan_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowRepr {
    first_visible_index: Option<usize>,
    last_visible_index: Option<usize>,
    row_height_px: f64,
    overscan_count: usize,
}

impl From<VirtualWindow> for WindowRepr {
    fn from(w: VirtualWindow) -> Self {
        Self {
            first_visible_index: w.first_visible_index(),
            last_visible_index: w.last_visible_index(),
            row_height_px: w.row_height_px,
            overscan_count: w.overscan_count,
        }
    }
}

impl VirtualWindow {
    fn empty(row_height_px: f64, overscan_count: usize) -> Self {
        Self {
            start: 0,
            end: 0,
            row_height_px,
            overscan_count,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Half-open index range, `0..0` when empty.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    #[must_use]
    pub fn first_visible_index(&self) -> Option<usize> {
        (!self.is_empty()).then_some(self.start)
    }

    /// Inclusive last index.
    #[must_use]
    pub fn last_visible_index(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.end - 1)
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    /// Height of the spacer above the first rendered row.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn offset_top_px(&self) -> f64 {
        self.start as f64 * self.row_height_px
    }
}

/// Compute the rows to render for a scroll position.
///
/// `first = max(0, floor(scroll / h) - overscan)` and
/// `last = min(row_count - 1, ceil((scroll + viewport) / h) + overscan)`.
/// Negative or NaN scroll counts as 0. No rows, or a row height that is not a positive
/// finite number, gives an empty window. The first index never decreases as scroll grows.
#[must_use]
pub fn visible_window(
    scroll_offset_px: f64,
    viewport_height_px: f64,
    row_count: usize,
    row_height_px: f64,
    overscan: usize,
) -> VirtualWindow {
    if row_count == 0 || !row_height_px.is_finite() || row_height_px <= 0.0 {
        return VirtualWindow::empty(row_height_px, overscan);
    }

    let scroll = non_negative(scroll_offset_px);
    let viewport = non_negative(viewport_height_px);
    let last_index = row_count - 1;

    let top = px_to_index((scroll / row_height_px).floor());
    let bottom = px_to_index(((scroll + viewport) / row_height_px).ceil());

    let first = top.saturating_sub(overscan).min(last_index);
    let last = bottom.saturating_add(overscan).min(last_index);

    VirtualWindow {
        start: first,
        end: last + 1,
        row_height_px,
        overscan_count: overscan,
    }
}

fn non_negative(px: f64) -> f64 {
    if px.is_nan() || px < 0.0 {
        0.0
    } else {
        px
    }
}

/// Saturating float → index conversion. Huge offsets land on `usize::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn px_to_index(rows_f: f64) -> usize {
    rows_f.max(0.0) as usize
}

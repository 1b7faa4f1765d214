//! Row virtualization.
//!
//! This module handles:
//! - Computing the visible row range from scroll metrics
//! - Managing viewport state (scroll position, clamping, resize)

mod viewport;
mod window;

pub use viewport::{Viewport, DEFAULT_OVERSCAN, DEFAULT_ROW_HEIGHT_PX, DEFAULT_VIEWPORT_HEIGHT_PX};
pub use window::{visible_window, VirtualWindow};

//! Engine configuration.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```
//! use sheetgrid::config::EngineConfig;
//! let config = EngineConfig::from_json(r#"{ "overscan": 10 }"#).unwrap();
//! assert_eq!(config.overscan, 10);
//! assert_eq!(config.row_height_px, 36.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::derived::DerivedRegistry;
use crate::editor::SwitchPolicy;
use crate::error::Result;
use crate::ingest::HeaderLocator;
use crate::layout::{Viewport, DEFAULT_OVERSCAN, DEFAULT_ROW_HEIGHT_PX, DEFAULT_VIEWPORT_HEIGHT_PX};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// How the header row is found in the decoded sheet.
    pub header: HeaderLocator,
    pub row_height_px: f64,
    pub overscan: usize,
    pub viewport_height_px: f64,
    /// What an open edit does when another cell is clicked.
    pub switch_policy: SwitchPolicy,
    /// Calculated columns, in evaluation order.
    pub derived: DerivedRegistry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            header: HeaderLocator::default(),
            row_height_px: DEFAULT_ROW_HEIGHT_PX,
            overscan: DEFAULT_OVERSCAN,
            viewport_height_px: DEFAULT_VIEWPORT_HEIGHT_PX,
            switch_policy: SwitchPolicy::default(),
            derived: DerivedRegistry::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration; missing fields keep their defaults.
    ///
    /// # Errors
    /// [`crate::GridError::Json`] for malformed JSON or an invalid derived registry.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Viewport at scroll 0 with this configuration's metrics.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_height_px, self.row_height_px, self.overscan)
    }
}

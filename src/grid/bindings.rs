//! JavaScript bindings for [`SheetGrid`].
//!
//! Values cross the boundary through `serde-wasm-bindgen`; errors become JS strings.
//! Row ids are plain numbers on the JS side.

use js_sys::Function;
use wasm_bindgen::prelude::*;

use super::SheetGrid;
use crate::config::EngineConfig;
use crate::editor::{BeginOutcome, Direction};
use crate::store::{StoreEvent, UpdateOutcome};
use crate::types::{CellMatrix, CellValue, RowId};

/// Largest integer a JS number represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_id_from_js(value: f64) -> Option<RowId> {
    let exact = value.is_finite() && value >= 0.0 && value <= MAX_SAFE_INTEGER;
    (exact && value.fract() == 0.0).then(|| RowId::from_raw(value as u64))
}

fn to_js<T: serde::Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

fn changed(outcome: Option<UpdateOutcome>) -> bool {
    matches!(outcome, Some(UpdateOutcome::Updated { .. }))
}

#[wasm_bindgen]
impl SheetGrid {
    /// Create a grid. `config` is an optional object in the `EngineConfig` shape.
    #[wasm_bindgen(constructor)]
    pub fn js_new(config: JsValue) -> Result<SheetGrid, JsValue> {
        console_error_panic_hook::set_once();
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        Ok(SheetGrid::with_config(config))
    }

    /// Load XLSX, CSV or TSV bytes. The previous table survives a failed load.
    #[wasm_bindgen(js_name = "loadFile")]
    pub fn js_load_file(&mut self, data: &[u8], file_name: Option<String>) -> Result<(), JsValue> {
        Ok(self.load_file(data, file_name.as_deref())?)
    }

    /// Load an already-decoded array of rows.
    #[wasm_bindgen(js_name = "loadMatrix")]
    pub fn js_load_matrix(&mut self, matrix: JsValue) -> Result<(), JsValue> {
        let matrix: CellMatrix = serde_wasm_bindgen::from_value(matrix)?;
        Ok(self.load_matrix(&matrix)?)
    }

    #[wasm_bindgen(js_name = "columns")]
    pub fn js_columns(&self) -> Result<JsValue, JsValue> {
        to_js(self.store.columns())
    }

    #[wasm_bindgen(js_name = "rowCount")]
    pub fn js_row_count(&self) -> usize {
        self.store.row_count()
    }

    #[wasm_bindgen(js_name = "revision")]
    #[allow(clippy::cast_precision_loss)]
    pub fn js_revision(&self) -> f64 {
        self.store.revision() as f64
    }

    /// `{ window, firstIndex, offsetTopPx, totalHeightPx, rows }` for the current scroll.
    #[wasm_bindgen(js_name = "rowsInWindow")]
    pub fn js_rows_in_window(&self) -> Result<JsValue, JsValue> {
        to_js(&self.rows_in_window())
    }

    #[wasm_bindgen(js_name = "visibleWindow")]
    pub fn js_visible_window(&self) -> Result<JsValue, JsValue> {
        to_js(&self.visible_window())
    }

    #[wasm_bindgen(js_name = "isEditable")]
    pub fn js_is_editable(&self, column_key: &str) -> bool {
        self.is_editable(column_key)
    }

    /// Write a cell directly. Returns whether anything changed.
    #[wasm_bindgen(js_name = "updateCell")]
    pub fn js_update_cell(
        &mut self,
        row_index: usize,
        column_key: &str,
        value: JsValue,
    ) -> Result<bool, JsValue> {
        let value: CellValue = serde_wasm_bindgen::from_value(value)?;
        Ok(changed(Some(self.update_cell(row_index, column_key, value)?)))
    }

    /// Returns `true` when the cell is now being edited.
    #[wasm_bindgen(js_name = "beginEdit")]
    pub fn js_begin_edit(&mut self, row_id: f64, column_key: &str) -> bool {
        let Some(row_id) = row_id_from_js(row_id) else {
            return false;
        };
        self.begin_edit(row_id, column_key) != BeginOutcome::Ignored
    }

    #[wasm_bindgen(js_name = "changeEdit")]
    pub fn js_change_edit(&mut self, value: String) -> bool {
        self.change_edit(value)
    }

    #[wasm_bindgen(js_name = "editBuffer")]
    pub fn js_edit_buffer(&self) -> Option<String> {
        self.editor.buffer().map(str::to_string)
    }

    /// Commit the open edit. Returns whether the table changed.
    #[wasm_bindgen(js_name = "commitEdit")]
    pub fn js_commit_edit(&mut self) -> Result<bool, JsValue> {
        Ok(changed(self.commit_edit()?))
    }

    /// `direction` is `"down"` (Enter) or `"right"` (Tab).
    #[wasm_bindgen(js_name = "commitAndAdvance")]
    pub fn js_commit_and_advance(&mut self, direction: &str) -> Result<bool, JsValue> {
        let direction = match direction {
            "down" => Direction::Down,
            "right" => Direction::Right,
            other => return Err(JsValue::from_str(&format!("Unknown direction: {other}"))),
        };
        Ok(changed(self.commit_and_advance(direction)?))
    }

    #[wasm_bindgen(js_name = "cancelEdit")]
    pub fn js_cancel_edit(&mut self) {
        self.cancel_edit();
    }

    #[wasm_bindgen(js_name = "setScroll")]
    pub fn js_set_scroll(&mut self, scroll_y: f64) {
        self.set_scroll(scroll_y);
    }

    #[wasm_bindgen(js_name = "scrollBy")]
    pub fn js_scroll_by(&mut self, delta_y: f64) {
        self.scroll_by(delta_y);
    }

    #[wasm_bindgen(js_name = "resize")]
    pub fn js_resize(&mut self, height: f64) {
        self.resize(height);
    }

    /// Register a callback invoked with each change event; `null` removes it.
    #[wasm_bindgen(js_name = "onChange")]
    pub fn js_on_change(&mut self, callback: Option<Function>) {
        let listener = callback.map(|f| {
            Box::new(move |event: &StoreEvent| {
                let Ok(payload) = serde_wasm_bindgen::to_value(event) else {
                    return;
                };
                if let Err(e) = f.call1(&JsValue::NULL, &payload) {
                    tracing::warn!(error = ?e, "change callback threw");
                }
            }) as Box<dyn FnMut(&StoreEvent)>
        });
        self.set_change_listener(listener);
    }
}

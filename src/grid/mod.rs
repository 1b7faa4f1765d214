//! `SheetGrid`: the engine as one owned object.
//!
//! Composes the row store, the edit session and the viewport behind the calls a
//! grid renderer makes: load a file, read the visible slice, edit cells, scroll.
//! The JavaScript surface lives in `bindings` and is compiled for wasm32 only.

#[cfg(target_arch = "wasm32")]
mod bindings;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::decode::decode;
use crate::editor::{BeginOutcome, Direction, EditSessionManager};
use crate::error::Result;
use crate::ingest::ingest;
use crate::layout::{VirtualWindow, Viewport};
use crate::store::{RowStore, StoreEvent, SubscriptionId, UpdateOutcome};
use crate::types::{CellValue, RowId, RowRecord};

/// Rows currently worth rendering, plus the spacer geometry around them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSlice<'a> {
    pub window: VirtualWindow,
    pub first_index: usize,
    pub offset_top_px: f64,
    pub total_height_px: f64,
    pub rows: &'a [RowRecord],
}

/// The main grid struct exported to JavaScript.
#[wasm_bindgen]
pub struct SheetGrid {
    config: EngineConfig,
    store: RowStore,
    editor: EditSessionManager,
    viewport: Viewport,
    change_listener: Option<SubscriptionId>,
}

impl Default for SheetGrid {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl std::fmt::Debug for SheetGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetGrid")
            .field("store", &self.store)
            .field("editor", &self.editor)
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

impl SheetGrid {
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            store: RowStore::new(config.derived.clone()),
            editor: EditSessionManager::new(config.switch_policy),
            viewport: config.viewport(),
            change_listener: None,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &RowStore {
        &self.store
    }

    #[must_use]
    pub fn editor(&self) -> &EditSessionManager {
        &self.editor
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    // ---- Loading ----

    /// Decode a file and replace the table with its first sheet.
    ///
    /// # Errors
    /// Decoding and ingestion errors; the current table is kept on failure.
    pub fn load_file(&mut self, data: &[u8], file_name: Option<&str>) -> Result<()> {
        let matrix = decode(data, file_name)?;
        self.load_matrix(&matrix)
    }

    /// Ingest a raw matrix and replace the table. Any open edit is dropped and the
    /// viewport scrolls back to the top.
    ///
    /// # Errors
    /// Ingestion errors; the current table is kept on failure.
    pub fn load_matrix(&mut self, matrix: &[Vec<CellValue>]) -> Result<()> {
        let table = ingest(matrix, &self.config.header, self.store.registry())?;
        self.editor.cancel();
        self.store.load(table);
        self.viewport.set_scroll(0.0, self.store.row_count());
        tracing::info!(
            rows = self.store.row_count(),
            columns = self.store.columns().len(),
            "table loaded"
        );
        Ok(())
    }

    // ---- Rendering ----

    #[must_use]
    pub fn visible_window(&self) -> VirtualWindow {
        self.viewport.window(self.store.row_count())
    }

    #[must_use]
    pub fn rows_in_window(&self) -> WindowSlice<'_> {
        let window = self.visible_window();
        WindowSlice {
            window,
            first_index: window.range().start,
            offset_top_px: window.offset_top_px(),
            total_height_px: self.viewport.content_height(self.store.row_count()),
            rows: self.store.rows().get(window.range()).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn is_editable(&self, column_key: &str) -> bool {
        self.store.is_editable(column_key)
    }

    // ---- Editing ----

    /// Direct cell write, bypassing the edit session (paste, fill).
    ///
    /// # Errors
    /// See [`RowStore::update_cell`].
    pub fn update_cell(
        &mut self,
        row_index: usize,
        column_key: &str,
        value: CellValue,
    ) -> Result<UpdateOutcome> {
        self.store.update_cell(row_index, column_key, value)
    }

    pub fn begin_edit(&mut self, row_id: RowId, column_key: &str) -> BeginOutcome {
        let outcome = self.editor.begin(&mut self.store, row_id, column_key);
        if outcome == BeginOutcome::Started {
            self.scroll_to_edit_target();
        }
        outcome
    }

    pub fn change_edit(&mut self, value: impl Into<String>) -> bool {
        self.editor.change(value)
    }

    /// # Errors
    /// See [`EditSessionManager::commit`].
    pub fn commit_edit(&mut self) -> Result<Option<UpdateOutcome>> {
        self.editor.commit(&mut self.store)
    }

    /// Commit and move to the next cell down or right, scrolling it into view.
    ///
    /// # Errors
    /// See [`EditSessionManager::commit_and_advance`].
    pub fn commit_and_advance(&mut self, direction: Direction) -> Result<Option<UpdateOutcome>> {
        let outcome = self.editor.commit_and_advance(&mut self.store, direction)?;
        self.scroll_to_edit_target();
        Ok(outcome)
    }

    pub fn cancel_edit(&mut self) {
        self.editor.cancel();
    }

    fn scroll_to_edit_target(&mut self) {
        let index = self
            .editor
            .target()
            .and_then(|(row_id, _)| self.store.row_index_of(row_id));
        if let Some(index) = index {
            self.viewport.ensure_visible(index, self.store.row_count());
        }
    }

    // ---- Scrolling ----

    pub fn set_scroll(&mut self, scroll_y: f64) {
        self.viewport.set_scroll(scroll_y, self.store.row_count());
    }

    pub fn scroll_by(&mut self, delta_y: f64) {
        self.viewport.scroll_by(delta_y, self.store.row_count());
    }

    pub fn resize(&mut self, height: f64) {
        self.viewport.resize(height, self.store.row_count());
    }

    // ---- Notifications ----

    /// Install (or with `None`, remove) the single change listener.
    pub fn set_change_listener(&mut self, listener: Option<Box<dyn FnMut(&StoreEvent)>>) {
        if let Some(id) = self.change_listener.take() {
            self.store.unsubscribe(id);
        }
        if let Some(listener) = listener {
            self.change_listener = Some(self.store.subscribe(listener));
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::editor::EditState;
    use crate::GridError;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn invoice_csv(rows: usize) -> Vec<u8> {
        let mut csv = String::from("Exporter: ACME\nHS Code,Rate in USD,Total No of Boxes,Total Qty\n");
        for i in 0..rows {
            csv.push_str(&format!("{i:04},2,3,{}\n", i + 1));
        }
        csv.into_bytes()
    }

    fn loaded(rows: usize) -> SheetGrid {
        let mut grid = SheetGrid::default();
        grid.load_file(&invoice_csv(rows), Some("invoice.csv")).unwrap();
        grid
    }

    #[test]
    fn test_load_file_ingests_and_derives() {
        let grid = loaded(3);
        assert_eq!(grid.store().row_count(), 3);
        assert_eq!(grid.store().revision(), 1);
        // 2 * 3 * 3 = 18, discount 2.7
        let net = grid.store().value(2, "net_amount").and_then(CellValue::as_number).unwrap();
        assert!((net - 15.3).abs() < 1e-9);
        assert!(!grid.is_editable("discount"));
        assert!(grid.is_editable("HS Code"));
    }

    #[test]
    fn test_failed_load_keeps_table() {
        let mut grid = loaded(3);
        let err = grid.load_file(b"a,b\n1,2\n", Some("other.csv")).unwrap_err();
        assert!(matches!(err, GridError::HeaderRowNotFound { .. }));
        assert_eq!(grid.store().row_count(), 3);
        assert_eq!(grid.store().revision(), 1);
    }

    #[test]
    fn test_rows_in_window() {
        let mut grid = loaded(1000);
        grid.set_scroll(3600.0);
        let slice = grid.rows_in_window();
        assert_eq!(slice.first_index, 95);
        assert_eq!(slice.rows.len(), 28);
        assert_eq!(slice.offset_top_px, 95.0 * 36.0);
        assert_eq!(slice.total_height_px, 36_000.0);
        assert_eq!(slice.rows[0].id, grid.store().rows()[95].id);
    }

    #[test]
    fn test_window_on_empty_grid() {
        let grid = SheetGrid::default();
        let slice = grid.rows_in_window();
        assert!(slice.window.is_empty());
        assert!(slice.rows.is_empty());
    }

    #[test]
    fn test_edit_round_trip_notifies() {
        let mut grid = loaded(3);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        grid.set_change_listener(Some(Box::new(move |e: &StoreEvent| {
            sink.borrow_mut().push(e.revision());
        })));

        let id = grid.store().rows()[0].id;
        assert_eq!(grid.begin_edit(id, "total_qty"), BeginOutcome::Started);
        assert!(grid.change_edit("10"));
        let outcome = grid.commit_edit().unwrap();
        assert_eq!(outcome, Some(UpdateOutcome::Updated { revision: 2 }));
        assert_eq!(*events.borrow(), vec![2]);
        assert_eq!(grid.editor().state(), EditState::Idle);

        grid.set_change_listener(None);
        grid.update_cell(0, "total_qty", CellValue::Number(11.0)).unwrap();
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn test_advance_scrolls_into_view() {
        let mut grid = loaded(100);
        grid.resize(360.0);
        let id = grid.store().rows()[9].id;
        grid.begin_edit(id, "hs_code");
        grid.commit_and_advance(Direction::Down).unwrap();
        // Row 10 spans 360..396; it must now be inside the viewport.
        assert_eq!(grid.viewport().scroll_y, 36.0);
        assert!(grid.visible_window().contains(10));
    }

    #[test]
    fn test_load_cancels_open_edit() {
        let mut grid = loaded(3);
        let id = grid.store().rows()[0].id;
        grid.begin_edit(id, "hs_code");
        grid.load_file(&invoice_csv(2), None).unwrap();
        assert_eq!(grid.editor().state(), EditState::Idle);
        assert_eq!(grid.store().revision(), 2);
    }
}

//! The row store: sole owner and mutator of [`TableState`].
//!
//! Mutations build the replacement rows first and only then swap them in, so a
//! snapshot taken with [`RowStore::snapshot`] never observes a half-applied change.
//! Listeners registered with [`RowStore::subscribe`] hear about every mutation that
//! changed something, after the change is visible.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::derived::DerivedRegistry;
use crate::error::{GridError, Result};
use crate::schema::{ensure_column, normalize_key};
use crate::types::{CellValue, ColumnDescriptor, ColumnKey, RowId, RowRecord, TableState};

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    /// The whole table was replaced.
    #[serde(rename_all = "camelCase")]
    DataReplaced {
        revision: u64,
        rows: usize,
        columns: usize,
    },
    /// One cell changed; `recalculated` is set when derived columns were refreshed.
    #[serde(rename_all = "camelCase")]
    CellUpdated {
        revision: u64,
        row_id: RowId,
        column_key: ColumnKey,
        recalculated: bool,
    },
}

impl StoreEvent {
    #[must_use]
    pub fn revision(&self) -> u64 {
        match self {
            Self::DataReplaced { revision, .. } | Self::CellUpdated { revision, .. } => *revision,
        }
    }
}

/// Result of a successful [`RowStore::update_cell`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The cell already held this value; nothing changed.
    Unchanged,
    /// The cell changed and the table moved to `revision`.
    Updated { revision: u64 },
}

/// Handle returned by [`RowStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback type for store change notifications.
pub type Listener = Box<dyn FnMut(&StoreEvent)>;

pub struct RowStore {
    state: Arc<TableState>,
    registry: DerivedRegistry,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl fmt::Debug for RowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStore")
            .field("revision", &self.state.revision)
            .field("rows", &self.state.rows.len())
            .field("columns", &self.state.columns.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for RowStore {
    fn default() -> Self {
        Self::new(DerivedRegistry::default())
    }
}

impl RowStore {
    /// Empty store using `registry` for derived columns.
    #[must_use]
    pub fn new(registry: DerivedRegistry) -> Self {
        Self {
            state: Arc::new(TableState::default()),
            registry,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    // ---- Reads ----

    /// Shared immutable snapshot of the current table.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TableState> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn rows(&self) -> &[RowRecord] {
        &self.state.rows
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.state.columns
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state.revision
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.state.rows.len()
    }

    #[must_use]
    pub fn registry(&self) -> &DerivedRegistry {
        &self.registry
    }

    /// Value at `(row_index, column_key)`; the key may be raw or normalized.
    #[must_use]
    pub fn value(&self, row_index: usize, column_key: &str) -> Option<&CellValue> {
        let key = normalize_key(column_key);
        if !self.state.has_column(&key) {
            return None;
        }
        self.state.value(row_index, &key)
    }

    /// Current index of the row with `id`.
    #[must_use]
    pub fn row_index_of(&self, id: RowId) -> Option<usize> {
        self.state.row_index_of(id)
    }

    /// Whether users may edit `column_key`: it must exist and must not be derived.
    #[must_use]
    pub fn is_editable(&self, column_key: &str) -> bool {
        let key = normalize_key(column_key);
        self.state.has_column(&key) && !self.registry.is_target(&key)
    }

    // ---- Mutations ----

    /// Replace the table wholesale.
    ///
    /// Rows are restricted to the given columns, filled with `Empty` where a value is
    /// missing, and run through the derived field evaluator. Derived target columns
    /// are appended when absent. Always bumps the revision.
    pub fn set_data(&mut self, mut rows: Vec<RowRecord>, mut columns: Vec<ColumnDescriptor>) {
        for target in self.registry.targets() {
            ensure_column(&mut columns, target);
        }
        let known: HashSet<&ColumnKey> = columns.iter().map(|c| &c.key).collect();
        for row in &mut rows {
            row.cells.retain(|k, _| known.contains(k));
            row.fill_missing(&columns);
            self.registry.evaluate_in_place(row);
        }

        let revision = self.state.revision + 1;
        let event = StoreEvent::DataReplaced {
            revision,
            rows: rows.len(),
            columns: columns.len(),
        };
        self.state = Arc::new(TableState {
            columns,
            rows,
            revision,
        });

        tracing::debug!(revision, rows = self.row_count(), "table replaced");
        self.notify(&event);
    }

    /// Replace the table with an ingested [`TableState`] (its revision is ignored).
    pub fn load(&mut self, table: TableState) {
        self.set_data(table.rows, table.columns);
    }

    /// Write one cell, addressed by its position in the current row order.
    ///
    /// `column_key` may be a raw label or a normalized key. Writing the value a cell
    /// already holds is a no-op that leaves the revision alone. Editing a source
    /// column re-evaluates the derived columns of that row only.
    ///
    /// # Errors
    /// - [`GridError::IndexOutOfRange`] if `row_index >= row_count`
    /// - [`GridError::UnknownColumn`] if the key names no column
    /// - [`GridError::ColumnNotEditable`] if the key is a derived column
    ///
    /// The table is untouched whenever an error is returned.
    pub fn update_cell(
        &mut self,
        row_index: usize,
        column_key: &str,
        value: CellValue,
    ) -> Result<UpdateOutcome> {
        let value = value.normalized();
        let len = self.row_count();
        let Some(current) = self.state.rows.get(row_index) else {
            tracing::warn!(row_index, len, "update_cell: row index out of range");
            return Err(GridError::IndexOutOfRange {
                index: row_index,
                len,
            });
        };

        let key = normalize_key(column_key);
        let Some(column) = self.state.column(&key) else {
            return Err(GridError::UnknownColumn { key });
        };
        if self.registry.is_target(&key) {
            return Err(GridError::ColumnNotEditable { key });
        }
        if current.get(&key) == &value {
            return Ok(UpdateOutcome::Unchanged);
        }

        let key = column.key.clone();
        let mut row = current.clone();
        row.set(key.clone(), value);
        let recalculated = self.registry.is_source(key.as_str());
        if recalculated {
            self.registry.evaluate_in_place(&mut row);
            tracing::trace!(row_id = %row.id, column = %key, "recalculated derived fields");
        }
        let row_id = row.id;

        let state = Arc::make_mut(&mut self.state);
        if let Some(slot) = state.rows.get_mut(row_index) {
            *slot = row;
        }
        state.revision += 1;
        let revision = state.revision;

        tracing::debug!(revision, row_index, column = %key, "cell updated");
        self.notify(&StoreEvent::CellUpdated {
            revision,
            row_id,
            column_key: key,
            recalculated,
        });
        Ok(UpdateOutcome::Updated { revision })
    }

    /// [`Self::update_cell`] addressed by row id instead of position.
    ///
    /// # Errors
    /// As [`Self::update_cell`]; an unknown id reports [`GridError::IndexOutOfRange`]
    /// with `index == row_count`.
    pub fn update_cell_by_id(
        &mut self,
        row_id: RowId,
        column_key: &str,
        value: CellValue,
    ) -> Result<UpdateOutcome> {
        let index = self.row_index_of(row_id).unwrap_or_else(|| self.row_count());
        self.update_cell(index, column_key, value)
    }

    // ---- Subscriptions ----

    /// Register a change listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, event: &StoreEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
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
    use crate::schema::normalize_headers;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn invoice_store() -> RowStore {
        let columns = normalize_headers(&[
            "HS Code",
            "Rate in USD",
            "Total No of Boxes",
            "Total Qty",
        ])
        .unwrap();
        let rows = vec![
            RowRecord::from_pairs([
                ("hs_code", CellValue::from("8471")),
                ("rate_in_usd", CellValue::Number(10.0)),
                ("total_no_of_boxes", CellValue::Number(2.0)),
                ("total_qty", CellValue::Number(5.0)),
            ]),
            RowRecord::from_pairs([("hs_code", "9403")]),
        ];
        let mut store = RowStore::new(DerivedRegistry::invoice());
        store.set_data(rows, columns);
        store
    }

    #[test]
    fn test_set_data_evaluates_and_fills() {
        let store = invoice_store();
        assert_eq!(store.revision(), 1);
        assert_eq!(store.columns().len(), 7);
        assert_eq!(store.value(0, "net_amount"), Some(&CellValue::Number(85.0)));
        // Second row has no sources at all: derived values are zero, inputs explicit Empty.
        assert_eq!(store.rows()[1].cells.get("total_qty"), Some(&CellValue::Empty));
        assert_eq!(store.value(1, "discount"), Some(&CellValue::Number(0.0)));
    }

    #[test]
    fn test_set_data_drops_unknown_keys() {
        let columns = normalize_headers(&["A"]).unwrap();
        let rows = vec![RowRecord::from_pairs([("a", 1), ("stray", 2)])];
        let mut store = RowStore::new(DerivedRegistry::empty());
        store.set_data(rows, columns);
        assert_eq!(store.rows()[0].cells.len(), 1);
    }

    #[test]
    fn test_update_source_recalculates_row() {
        let mut store = invoice_store();
        let outcome = store
            .update_cell(0, "Total Qty", CellValue::Number(50.0))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated { revision: 2 });
        assert_eq!(store.value(0, "product_value_in_usd"), Some(&CellValue::Number(1000.0)));
        assert_eq!(store.value(0, "discount"), Some(&CellValue::Number(50.0)));
        assert_eq!(store.value(0, "net_amount"), Some(&CellValue::Number(950.0)));
        // Other rows untouched.
        assert_eq!(store.value(1, "net_amount"), Some(&CellValue::Number(0.0)));
    }

    #[test]
    fn test_update_non_source_does_not_recalculate() {
        let mut store = invoice_store();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        store.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        store.update_cell(0, "hs_code", CellValue::from("0101")).unwrap();
        let events = events.borrow();
        assert!(matches!(
            events.as_slice(),
            [StoreEvent::CellUpdated { recalculated: false, revision: 2, .. }]
        ));
    }

    #[test]
    fn test_equal_value_is_noop() {
        let mut store = invoice_store();
        let before = store.snapshot();
        let outcome = store
            .update_cell(0, "rate_in_usd", CellValue::Number(10.0))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(store.revision(), 1);
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_empty_text_over_empty_is_noop() {
        let mut store = invoice_store();
        store.update_cell(0, "hs_code", CellValue::Empty).unwrap();
        let revision = store.revision();

        let outcome = store
            .update_cell(0, "hs_code", CellValue::Text(String::new()))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(store.revision(), revision);
        assert_eq!(store.value(0, "hs_code"), Some(&CellValue::Empty));

        let outcome = store
            .update_cell(0, "total_qty", CellValue::Number(f64::NAN))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated { revision: revision + 1 });
        assert_eq!(store.value(0, "total_qty"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_out_of_range_leaves_state() {
        let mut store = invoice_store();
        let before = store.snapshot();
        let err = store
            .update_cell(store.row_count(), "hs_code", CellValue::from("x"))
            .unwrap_err();
        assert!(matches!(err, GridError::IndexOutOfRange { index: 2, len: 2 }));
        assert_eq!(*before, *store.snapshot());
    }

    #[test]
    fn test_unknown_and_derived_columns_rejected() {
        let mut store = invoice_store();
        assert!(matches!(
            store.update_cell(0, "nope", CellValue::Empty),
            Err(GridError::UnknownColumn { .. })
        ));
        assert!(matches!(
            store.update_cell(0, "Net Amount", CellValue::Number(1.0)),
            Err(GridError::ColumnNotEditable { .. })
        ));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_updates() {
        let mut store = invoice_store();
        let old = store.snapshot();
        store.update_cell(0, "hs_code", CellValue::from("0101")).unwrap();
        assert_eq!(old.rows[0].get("hs_code"), &CellValue::Text("8471".into()));
        assert_eq!(store.value(0, "hs_code"), Some(&CellValue::Text("0101".into())));
    }

    #[test]
    fn test_update_by_id() {
        let mut store = invoice_store();
        let id = store.rows()[1].id;
        store
            .update_cell_by_id(id, "rate_in_usd", CellValue::Number(1.0))
            .unwrap();
        assert_eq!(store.value(1, "rate_in_usd"), Some(&CellValue::Number(1.0)));

        let stale = RowId::next();
        assert!(matches!(
            store.update_cell_by_id(stale, "rate_in_usd", CellValue::Empty),
            Err(GridError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_is_editable() {
        let store = invoice_store();
        assert!(store.is_editable("HS Code"));
        assert!(store.is_editable("total_qty"));
        assert!(!store.is_editable("discount"));
        assert!(!store.is_editable("missing"));
    }

    #[test]
    fn test_unsubscribe_stops_events() {
        let mut store = invoice_store();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = store.subscribe(move |_| *c.borrow_mut() += 1);

        store.update_cell(0, "hs_code", CellValue::from("1")).unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update_cell(0, "hs_code", CellValue::from("2")).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_no_event_for_noop_or_error() {
        let mut store = invoice_store();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        store.subscribe(move |_| *c.borrow_mut() += 1);

        store
            .update_cell(0, "rate_in_usd", CellValue::Number(10.0))
            .unwrap();
        let _ = store.update_cell(99, "rate_in_usd", CellValue::Number(1.0));
        assert_eq!(*count.borrow(), 0);
    }
}

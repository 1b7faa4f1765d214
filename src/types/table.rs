use serde::{Deserialize, Serialize};

use super::{CellValue, ColumnDescriptor, RowId, RowRecord};

/// Columns, rows and a revision counter.
///
/// `revision` only moves forward; consumers compare it to detect change without
/// walking the rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableState {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<RowRecord>,
    pub revision: u64,
}

impl TableState {
    #[must_use]
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<RowRecord>) -> Self {
        Self {
            columns,
            rows,
            revision: 0,
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column(&self, key: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.key.as_str() == key)
    }

    #[must_use]
    pub fn has_column(&self, key: &str) -> bool {
        self.column(key).is_some()
    }

    /// Value at `(row_index, key)`, or `None` when the row does not exist.
    #[must_use]
    pub fn value(&self, row_index: usize, key: &str) -> Option<&CellValue> {
        self.rows.get(row_index).map(|r| r.get(key))
    }

    /// Current position of a row, if it is still in the table.
    #[must_use]
    pub fn row_index_of(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }
}

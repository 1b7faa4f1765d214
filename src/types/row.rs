use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CellValue, ColumnDescriptor, ColumnKey};

static NEXT_ROW_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique row identifier, assigned once at ingestion.
///
/// Survives re-sorting and filtering in the renderer, unlike a row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    /// Allocate a fresh identifier. Identifiers are never reused.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ROW_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Rebuild an identifier previously handed out (e.g. round-tripped through JS).
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row-{}", self.0)
    }
}

/// One table row: a stable id plus a value for every column key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: RowId,
    pub cells: BTreeMap<ColumnKey, CellValue>,
}

impl RowRecord {
    /// Empty row with a freshly allocated id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: RowId::next(),
            cells: BTreeMap::new(),
        }
    }

    /// Build a row from `(key, value)` pairs with a fresh id.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<ColumnKey>,
        V: Into<CellValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            id: RowId::next(),
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value at `key`; missing keys read as `Empty`.
    #[must_use]
    pub fn get(&self, key: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(key).unwrap_or(&EMPTY)
    }

    pub fn set(&mut self, key: ColumnKey, value: CellValue) {
        self.cells.insert(key, value);
    }

    /// Insert an explicit `Empty` for every column this row lacks.
    pub fn fill_missing(&mut self, columns: &[ColumnDescriptor]) {
        for col in columns {
            self.cells.entry(col.key.clone()).or_default();
        }
    }

    /// Values in column order, for renderers that want positional cells.
    #[must_use]
    pub fn values_in_order(&self, columns: &[ColumnDescriptor]) -> Vec<CellValue> {
        columns
            .iter()
            .map(|c| self.get(c.key.as_str()).clone())
            .collect()
    }
}

impl Default for RowRecord {
    fn default() -> Self {
        Self::new()
    }
}

use serde::{Deserialize, Serialize};

use crate::types::{CellValue, ColumnKey, RowId};

/// Lifecycle of the single edit session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EditState {
    #[default]
    Idle,
    Editing,
    /// Transient: the buffer is being written to the store.
    Committing,
}

/// What happens to an open session when editing starts on another cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPolicy {
    #[default]
    Commit,
    Cancel,
}

/// Result of [`super::EditSessionManager::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new session is open on the requested cell.
    Started,
    /// The requested cell was already being edited; its buffer is kept.
    Continued,
    /// The cell cannot be edited (calculated column, unknown row or column).
    Ignored,
}

/// Where [`super::EditSessionManager::commit_and_advance`] moves next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Same column, next row (Enter).
    Down,
    /// Same row, next editable column (Tab).
    Right,
}

/// The cell being edited and the text typed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub row_id: RowId,
    pub column_key: ColumnKey,
    pub buffer: String,
    /// Store value when the session began.
    pub original: CellValue,
}

impl EditSession {
    pub(crate) fn new(row_id: RowId, column_key: ColumnKey, original: CellValue) -> Self {
        Self {
            row_id,
            column_key,
            buffer: original.display(),
            original,
        }
    }

    /// Value to write back. An untouched buffer yields the original value, so
    /// committing without typing never changes the cell's type.
    pub(crate) fn committed_value(&self) -> CellValue {
        if self.buffer == self.original.display() {
            self.original.clone()
        } else {
            CellValue::from_input(&self.buffer)
        }
    }

    pub(crate) fn targets(&self, row_id: RowId, column_key: &str) -> bool {
        self.row_id == row_id && self.column_key.as_str() == column_key
    }
}

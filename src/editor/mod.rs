//! Single-cell edit sessions.
//!
//! `EditSessionManager` holds at most one [`EditSession`]. Typing only touches the
//! session buffer; the store sees nothing until [`EditSessionManager::commit`]. The
//! session is addressed by row id, so a commit lands on the right row even if the
//! store was reordered while the editor was open.

mod session;

pub use session::{BeginOutcome, Direction, EditSession, EditState, SwitchPolicy};

use crate::error::Result;
use crate::schema::normalize_key;
use crate::store::{RowStore, UpdateOutcome};
use crate::types::{ColumnKey, RowId};

#[derive(Debug, Default)]
pub struct EditSessionManager {
    state: EditState,
    session: Option<EditSession>,
    policy: SwitchPolicy,
}

impl EditSessionManager {
    #[must_use]
    pub fn new(policy: SwitchPolicy) -> Self {
        Self {
            state: EditState::Idle,
            session: None,
            policy,
        }
    }

    #[must_use]
    pub fn state(&self) -> EditState {
        self.state
    }

    #[must_use]
    pub fn policy(&self) -> SwitchPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SwitchPolicy) {
        self.policy = policy;
    }

    /// The open session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    /// Current buffer text while editing.
    #[must_use]
    pub fn buffer(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.buffer.as_str())
    }

    /// `(row_id, column_key)` of the open session.
    #[must_use]
    pub fn target(&self) -> Option<(RowId, &ColumnKey)> {
        self.session.as_ref().map(|s| (s.row_id, &s.column_key))
    }

    /// Whether the given cell is the one being edited. Used by renderers to swap
    /// the display text for an input.
    #[must_use]
    pub fn is_editing(&self, row_id: RowId, column_key: &str) -> bool {
        self.state == EditState::Editing
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.targets(row_id, &normalize_key(column_key)))
    }

    /// Open a session on `(row_id, column_key)`.
    ///
    /// Calculated columns, unknown columns and rows not in the store are ignored and
    /// leave any open session alone. An open session on a different cell is first
    /// closed according to the switch policy; a failed implicit commit is logged and
    /// does not stop the new session.
    pub fn begin(
        &mut self,
        store: &mut RowStore,
        row_id: RowId,
        column_key: &str,
    ) -> BeginOutcome {
        let key = normalize_key(column_key);
        if self.is_editing(row_id, &key) {
            return BeginOutcome::Continued;
        }

        if store.row_index_of(row_id).is_none() {
            tracing::debug!(%row_id, "begin edit ignored: unknown row");
            return BeginOutcome::Ignored;
        }
        if !store.is_editable(&key) {
            tracing::debug!(column = %key, "begin edit ignored: column not editable");
            return BeginOutcome::Ignored;
        }

        if self.state == EditState::Editing {
            match self.policy {
                SwitchPolicy::Commit => {
                    if let Err(e) = self.commit(store) {
                        tracing::warn!(error = %e, "implicit commit failed while switching cells");
                    }
                }
                SwitchPolicy::Cancel => self.cancel(),
            }
        }

        let original = store
            .row_index_of(row_id)
            .and_then(|index| store.value(index, &key))
            .cloned()
            .unwrap_or_default();
        self.state = EditState::Editing;
        self.session = Some(EditSession::new(row_id, ColumnKey::new(key), original));
        BeginOutcome::Started
    }

    /// Replace the buffer. Returns `false` (and does nothing) when not editing.
    pub fn change(&mut self, value: impl Into<String>) -> bool {
        if self.state != EditState::Editing {
            return false;
        }
        match self.session.as_mut() {
            Some(session) => {
                session.buffer = value.into();
                true
            }
            None => false,
        }
    }

    /// Write the buffer to the store and close the session.
    ///
    /// The row is looked up by id at commit time. The manager returns to `Idle` whether
    /// or not the store accepts the value.
    ///
    /// # Errors
    /// Whatever [`RowStore::update_cell`] reports. A row that disappeared while editing
    /// is reported as [`crate::GridError::IndexOutOfRange`].
    pub fn commit(&mut self, store: &mut RowStore) -> Result<Option<UpdateOutcome>> {
        if self.state != EditState::Editing {
            return Ok(None);
        }
        let Some(session) = self.session.take() else {
            self.state = EditState::Idle;
            return Ok(None);
        };

        self.state = EditState::Committing;
        let value = session.committed_value();
        let result =
            store.update_cell_by_id(session.row_id, session.column_key.as_str(), value);
        self.state = EditState::Idle;

        if let Err(e) = &result {
            tracing::warn!(
                row_id = %session.row_id,
                column = %session.column_key,
                error = %e,
                "commit rejected"
            );
        }
        result.map(Some)
    }

    /// Drop the buffer without touching the store.
    pub fn cancel(&mut self) {
        if self.state == EditState::Editing {
            self.session = None;
            self.state = EditState::Idle;
        }
    }

    /// Commit, then open a session on the neighbouring cell.
    ///
    /// `Down` keeps the column and moves one row; `Right` keeps the row and moves to the
    /// next editable column. With no neighbour the manager stays `Idle`.
    ///
    /// # Errors
    /// A failed commit is returned and no new session is opened.
    pub fn commit_and_advance(
        &mut self,
        store: &mut RowStore,
        direction: Direction,
    ) -> Result<Option<UpdateOutcome>> {
        let Some((row_id, key)) = self.target().map(|(id, k)| (id, k.clone())) else {
            return Ok(None);
        };
        if self.state != EditState::Editing {
            return Ok(None);
        }

        let outcome = self.commit(store)?;
        if let Some((next_row, next_key)) = neighbour(store, row_id, &key, direction) {
            self.begin(store, next_row, next_key.as_str());
        }
        Ok(outcome)
    }
}

fn neighbour(
    store: &RowStore,
    row_id: RowId,
    key: &ColumnKey,
    direction: Direction,
) -> Option<(RowId, ColumnKey)> {
    let index = store.row_index_of(row_id)?;
    match direction {
        Direction::Down => {
            let next = store.rows().get(index + 1)?;
            Some((next.id, key.clone()))
        }
        Direction::Right => {
            let position = store.columns().iter().position(|c| &c.key == key)?;
            store
                .columns()
                .iter()
                .skip(position + 1)
                .find(|c| store.is_editable(c.key.as_str()))
                .map(|c| (row_id, c.key.clone()))
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
    use crate::derived::DerivedRegistry;
    use crate::schema::normalize_headers;
    use crate::types::{CellValue, RowRecord};
    use crate::GridError;

    fn store() -> RowStore {
        let columns =
            normalize_headers(&["HS Code", "Rate in USD", "Total No of Boxes", "Total Qty"])
                .unwrap();
        let rows = (0..3)
            .map(|i| {
                RowRecord::from_pairs([
                    ("hs_code", CellValue::from(format!("code-{i}"))),
                    ("rate_in_usd", CellValue::Number(10.0)),
                    ("total_no_of_boxes", CellValue::Number(1.0)),
                    ("total_qty", CellValue::Number(1.0)),
                ])
            })
            .collect();
        let mut store = RowStore::new(DerivedRegistry::invoice());
        store.set_data(rows, columns);
        store
    }

    fn ids(store: &RowStore) -> Vec<RowId> {
        store.rows().iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_begin_captures_current_value() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        assert_eq!(
            editor.begin(&mut store, ids[0], "Rate in USD"),
            BeginOutcome::Started
        );
        assert_eq!(editor.state(), EditState::Editing);
        assert_eq!(editor.buffer(), Some("10"));
        assert!(editor.is_editing(ids[0], "rate_in_usd"));
        assert!(!editor.is_editing(ids[1], "rate_in_usd"));
    }

    #[test]
    fn test_begin_ignores_calculated_and_unknown() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        assert_eq!(editor.begin(&mut store, ids[0], "discount"), BeginOutcome::Ignored);
        assert_eq!(editor.begin(&mut store, ids[0], "nope"), BeginOutcome::Ignored);
        assert_eq!(
            editor.begin(&mut store, RowId::next(), "hs_code"),
            BeginOutcome::Ignored
        );
        assert_eq!(editor.state(), EditState::Idle);
    }

    #[test]
    fn test_change_does_not_touch_store() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        assert!(!editor.change("ignored"));

        editor.begin(&mut store, ids[0], "total_qty");
        assert!(editor.change("7"));
        assert_eq!(store.revision(), 1);
        assert_eq!(store.value(0, "total_qty"), Some(&CellValue::Number(1.0)));

        let outcome = editor.commit(&mut store).unwrap();
        assert_eq!(outcome, Some(UpdateOutcome::Updated { revision: 2 }));
        assert_eq!(
            store.value(0, "product_value_in_usd"),
            Some(&CellValue::Number(70.0))
        );
        assert_eq!(editor.state(), EditState::Idle);
    }

    #[test]
    fn test_commit_unchanged_is_noop() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[1], "hs_code");
        let outcome = editor.commit(&mut store).unwrap();
        assert_eq!(outcome, Some(UpdateOutcome::Unchanged));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_commit_outside_editing() {
        let mut store = store();
        let mut editor = EditSessionManager::default();
        assert_eq!(editor.commit(&mut store).unwrap(), None);
    }

    #[test]
    fn test_cancel_discards_buffer() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[0], "total_qty");
        editor.change("999");
        editor.cancel();
        assert_eq!(editor.state(), EditState::Idle);
        assert_eq!(editor.buffer(), None);
        assert_eq!(editor.commit(&mut store).unwrap(), None);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_commit_after_row_vanished_returns_idle() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[0], "total_qty");
        editor.change("5");

        let columns = store.columns().to_vec();
        store.set_data(Vec::new(), columns);

        let err = editor.commit(&mut store).unwrap_err();
        assert!(matches!(err, GridError::IndexOutOfRange { .. }));
        assert_eq!(editor.state(), EditState::Idle);
    }

    #[test]
    fn test_begin_same_cell_keeps_buffer() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[0], "total_qty");
        editor.change("3");
        assert_eq!(
            editor.begin(&mut store, ids[0], "Total Qty"),
            BeginOutcome::Continued
        );
        assert_eq!(editor.buffer(), Some("3"));
    }

    #[test]
    fn test_switch_commits_by_default() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[0], "total_qty");
        editor.change("2");
        assert_eq!(
            editor.begin(&mut store, ids[1], "total_qty"),
            BeginOutcome::Started
        );
        assert_eq!(store.value(0, "total_qty"), Some(&CellValue::Number(2.0)));
        assert!(editor.is_editing(ids[1], "total_qty"));
    }

    #[test]
    fn test_switch_cancel_policy() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::new(SwitchPolicy::Cancel);
        editor.begin(&mut store, ids[0], "total_qty");
        editor.change("2");
        editor.begin(&mut store, ids[1], "total_qty");
        assert_eq!(store.value(0, "total_qty"), Some(&CellValue::Number(1.0)));
        assert_eq!(store.revision(), 1);
        assert!(editor.is_editing(ids[1], "total_qty"));
    }

    #[test]
    fn test_switch_to_ignored_cell_keeps_session() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[0], "total_qty");
        editor.change("2");
        assert_eq!(
            editor.begin(&mut store, ids[1], "net_amount"),
            BeginOutcome::Ignored
        );
        assert_eq!(editor.buffer(), Some("2"));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_commit_and_advance_down() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[1], "hs_code");
        editor.change("X");
        editor
            .commit_and_advance(&mut store, Direction::Down)
            .unwrap();
        assert_eq!(store.value(1, "hs_code"), Some(&CellValue::Text("X".into())));
        assert!(editor.is_editing(ids[2], "hs_code"));

        // Last row: nothing below.
        editor
            .commit_and_advance(&mut store, Direction::Down)
            .unwrap();
        assert_eq!(editor.state(), EditState::Idle);
    }

    #[test]
    fn test_commit_and_advance_right_skips_calculated() {
        let mut store = store();
        let ids = ids(&store);
        let mut editor = EditSessionManager::default();
        editor.begin(&mut store, ids[0], "total_no_of_boxes");
        editor
            .commit_and_advance(&mut store, Direction::Right)
            .unwrap();
        assert!(editor.is_editing(ids[0], "total_qty"));

        // Only calculated columns remain to the right.
        editor
            .commit_and_advance(&mut store, Direction::Right)
            .unwrap();
        assert_eq!(editor.state(), EditState::Idle);
    }
}

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A normalized column key (`total_no_of_boxes`, `hs_code_1`, ...).
///
/// Produced by [`crate::schema`]; unique within a table and never renamed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnKey(String);

impl ColumnKey {
    /// Wrap an already-normalized key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ColumnKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ColumnKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColumnKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A spreadsheet header after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// The label exactly as it appeared in the header row.
    pub original_label: String,
    pub key: ColumnKey,
    /// Position in the header row (0-based).
    pub order: usize,
}

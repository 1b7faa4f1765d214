//! Header label normalization.
//!
//! Spreadsheet headers are free text: mixed case, punctuation, embedded newlines and
//! duplicates. Each label is reduced to a lowercase `[a-z0-9_]` key; duplicates get a
//! numeric suffix in first-seen order (`qty`, `qty_1`, `qty_2`).

use std::collections::HashSet;

use crate::error::{GridError, Result};
use crate::types::{ColumnDescriptor, ColumnKey};

/// Base key for labels with no alphanumeric characters at all.
pub const PLACEHOLDER_KEY: &str = "column";

/// Normalize a single label or key.
///
/// Line breaks are dropped, the rest is lowercased and split on anything outside
/// `[a-z0-9]`; the non-empty pieces are joined with `_`. Already-normalized keys map
/// to themselves, so the same function serves raw labels and caller-supplied keys.
///
/// ```
/// use sheetgrid::schema::normalize_key;
/// assert_eq!(normalize_key("Total No. of Boxes"), "total_no_of_boxes");
/// assert_eq!(normalize_key("Rate (USD)"), "rate_usd");
/// assert_eq!(normalize_key("hs_code_1"), "hs_code_1");
/// ```
#[must_use]
pub fn normalize_key(label: &str) -> String {
    let lowered: String = label
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .trim()
        .to_lowercase();

    let mut key = String::with_capacity(lowered.len());
    for token in lowered
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|t| !t.is_empty())
    {
        if !key.is_empty() {
            key.push('_');
        }
        key.push_str(token);
    }
    key
}

/// Turn a header row into column descriptors with unique keys, preserving order.
///
/// # Errors
/// Returns [`GridError::EmptyHeaderRow`] when `labels` is empty.
pub fn normalize_headers<S: AsRef<str>>(labels: &[S]) -> Result<Vec<ColumnDescriptor>> {
    if labels.is_empty() {
        return Err(GridError::EmptyHeaderRow);
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(labels.len());
    let mut columns = Vec::with_capacity(labels.len());

    for (order, label) in labels.iter().enumerate() {
        let label = label.as_ref();
        let mut base = normalize_key(label);
        if base.is_empty() {
            base = PLACEHOLDER_KEY.to_string();
        }
        let key = unique_key(&base, &seen);
        seen.insert(key.clone());
        columns.push(ColumnDescriptor {
            original_label: label.to_string(),
            key: ColumnKey::new(key),
            order,
        });
    }

    Ok(columns)
}

/// `base` if unused, else `base_N` for the smallest free positive `N`.
fn unique_key(base: &str, seen: &HashSet<String>) -> String {
    if !seen.contains(base) {
        return base.to_string();
    }
    let mut n: u32 = 1;
    loop {
        let candidate = format!("{base}_{n}");
        if !seen.contains(&candidate) {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

/// Append a descriptor for `key` unless the table already has that column.
///
/// Used to surface derived columns the source sheet did not carry.
pub fn ensure_column(columns: &mut Vec<ColumnDescriptor>, key: &ColumnKey) -> bool {
    if columns.iter().any(|c| &c.key == key) {
        return false;
    }
    let order = columns.len();
    columns.push(ColumnDescriptor {
        original_label: key.to_string(),
        key: key.clone(),
        order,
    });
    true
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn keys(labels: &[&str]) -> Vec<String> {
        normalize_headers(labels)
            .unwrap()
            .into_iter()
            .map(|c| c.key.to_string())
            .collect()
    }

    #[test_case("HS Code", "hs_code")]
    #[test_case("Rate (USD)", "rate_usd")]
    #[test_case("Rate in USD", "rate_in_usd")]
    #[test_case("Total No. of Boxes", "total_no_of_boxes")]
    #[test_case("  Total\nQty  ", "totalqty"; "newline is removed not split")]
    #[test_case("NET   AMOUNT", "net_amount")]
    #[test_case("Ünit Price", "nit_price"; "non ascii dropped")]
    #[test_case("---", ""; "punctuation only")]
    #[test_case("foo_1", "foo_1"; "already normalized")]
    fn test_normalize_key(label: &str, expected: &str) {
        assert_eq!(normalize_key(label), expected);
    }

    #[test]
    fn test_normalize_key_is_idempotent() {
        for label in ["HS Code", "Rate (USD)", "a__b", " x-y-z ", "Q1 2024"] {
            let once = normalize_key(label);
            assert_eq!(normalize_key(&once), once);
        }
    }

    #[test]
    fn test_duplicates_get_suffixes() {
        assert_eq!(keys(&["Foo", "foo", "FOO!"]), vec!["foo", "foo_1", "foo_2"]);
    }

    #[test]
    fn test_suffix_skips_taken_keys() {
        // "foo_1" is a real header, so the second "foo" has to skip to "foo_2".
        assert_eq!(keys(&["foo", "foo_1", "foo"]), vec!["foo", "foo_1", "foo_2"]);
    }

    #[test]
    fn test_blank_labels_use_placeholder() {
        assert_eq!(keys(&["", "  ", "Name"]), vec!["column", "column_1", "name"]);
    }

    #[test]
    fn test_order_and_labels_preserved() {
        let cols = normalize_headers(&["B", "A"]).unwrap();
        assert_eq!(cols[0].order, 0);
        assert_eq!(cols[0].original_label, "B");
        assert_eq!(cols[1].order, 1);
        assert_eq!(cols[1].key.as_str(), "a");
    }

    #[test]
    fn test_empty_header_row() {
        let labels: [&str; 0] = [];
        assert!(matches!(
            normalize_headers(&labels),
            Err(GridError::EmptyHeaderRow)
        ));
    }

    #[test]
    fn test_ensure_column() {
        let mut cols = normalize_headers(&["A"]).unwrap();
        assert!(ensure_column(&mut cols, &ColumnKey::new("discount")));
        assert!(!ensure_column(&mut cols, &ColumnKey::new("discount")));
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].order, 1);
    }
}

//! Ingestion: raw cell matrix → [`TableState`].
//!
//! The header row is found by a [`HeaderLocator`], normalized into column keys, and
//! every following row up to the last non-blank one becomes a [`RowRecord`] with derived
//! fields filled in.
//! Nothing is written to a store here; a failed ingest leaves the caller's table as is.

use serde::{Deserialize, Serialize};

use crate::derived::DerivedRegistry;
use crate::error::{GridError, Result};
use crate::schema::{ensure_column, normalize_headers};
use crate::types::{CellValue, ColumnDescriptor, RowRecord, TableState};

/// Header marker used by the invoice sheets this engine was built around.
pub const DEFAULT_HEADER_MARKER: &str = "hs code";

/// How to find the header row in a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLocator {
    /// First row with a cell containing this text (case-insensitive).
    Marker(String),
    /// A fixed, 0-based row index.
    Index(usize),
}

impl Default for HeaderLocator {
    fn default() -> Self {
        Self::Marker(DEFAULT_HEADER_MARKER.to_string())
    }
}

impl HeaderLocator {
    #[must_use]
    pub fn marker(text: impl Into<String>) -> Self {
        Self::Marker(text.into())
    }
}

/// Find the header row index.
///
/// # Errors
/// [`GridError::HeaderRowNotFound`] when no row contains the marker, or
/// [`GridError::HeaderRowOutOfBounds`] for an index past the end of the matrix.
pub fn locate_header(matrix: &[Vec<CellValue>], locator: &HeaderLocator) -> Result<usize> {
    match locator {
        HeaderLocator::Index(index) => {
            if *index < matrix.len() {
                Ok(*index)
            } else {
                Err(GridError::HeaderRowOutOfBounds {
                    index: *index,
                    rows: matrix.len(),
                })
            }
        }
        HeaderLocator::Marker(marker) => {
            let needle = marker.to_lowercase();
            matrix
                .iter()
                .position(|row| {
                    row.iter()
                        .any(|cell| cell.display().to_lowercase().contains(&needle))
                })
                .ok_or_else(|| GridError::HeaderRowNotFound {
                    marker: marker.clone(),
                })
        }
    }
}

/// Build a table from a raw matrix.
///
/// Trailing blank header cells are ignored, data cells past the header width are
/// dropped, missing cells become `Empty`, and blank rows after the last data row are
/// skipped. Blank rows between data rows are kept as all-`Empty` records. Derived
/// target columns missing from the header are appended so every row value has a column.
///
/// # Errors
/// Header location failures, or [`GridError::EmptyHeaderRow`] if the header row
/// carries no labels.
pub fn ingest(
    matrix: &[Vec<CellValue>],
    locator: &HeaderLocator,
    registry: &DerivedRegistry,
) -> Result<TableState> {
    let header_index = locate_header(matrix, locator)?;
    let header = matrix.get(header_index).map_or(&[][..], Vec::as_slice);

    let width = header
        .iter()
        .rposition(|c| !is_blank(c))
        .map_or(0, |last| last + 1);
    let labels: Vec<String> = header.iter().take(width).map(CellValue::display).collect();
    let mut columns = normalize_headers(&labels)?;
    for target in registry.targets() {
        ensure_column(&mut columns, target);
    }

    let body = matrix.get(header_index + 1..).unwrap_or_default();
    let body_len = body
        .iter()
        .rposition(|raw| !raw.iter().all(is_blank))
        .map_or(0, |last| last + 1);
    let rows: Vec<RowRecord> = body
        .iter()
        .take(body_len)
        .map(|raw| build_row(raw, &columns, registry))
        .collect();

    tracing::debug!(
        header_row = header_index,
        columns = columns.len(),
        rows = rows.len(),
        "ingested matrix"
    );

    Ok(TableState::new(columns, rows))
}

fn build_row(
    raw: &[CellValue],
    columns: &[ColumnDescriptor],
    registry: &DerivedRegistry,
) -> RowRecord {
    let mut row = RowRecord::new();
    for col in columns {
        let value = raw.get(col.order).cloned().unwrap_or_default();
        row.set(col.key.clone(), value);
    }
    registry.evaluate_in_place(&mut row);
    row
}

fn is_blank(cell: &CellValue) -> bool {
    match cell {
        CellValue::Empty => true,
        CellValue::Text(s) => s.trim().is_empty(),
        CellValue::Number(_) => false,
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

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|s| CellValue::from(*s)).collect()
    }

    fn invoice_matrix() -> Vec<Vec<CellValue>> {
        vec![
            text_row(&["ACME Export Ltd"]),
            text_row(&["Invoice No. 42", "", "Date: 2024-01-01"]),
            text_row(&["HS Code", "Rate (USD)", "Total No. of Boxes", "Total Qty"]),
            vec![
                CellValue::from("8471"),
                CellValue::Number(10.0),
                CellValue::Number(2.0),
                CellValue::Number(5.0),
            ],
            vec![CellValue::from("9403"), CellValue::Number(3.0)],
        ]
    }

    #[test]
    fn test_locate_header_by_marker() {
        let matrix = invoice_matrix();
        assert_eq!(
            locate_header(&matrix, &HeaderLocator::marker("HS CODE")).unwrap(),
            2
        );
    }

    #[test]
    fn test_locate_header_marker_missing() {
        let matrix = invoice_matrix();
        let err = locate_header(&matrix, &HeaderLocator::marker("sku")).unwrap_err();
        assert!(matches!(err, GridError::HeaderRowNotFound { ref marker } if marker == "sku"));
    }

    #[test]
    fn test_locate_header_by_index() {
        let matrix = invoice_matrix();
        assert_eq!(locate_header(&matrix, &HeaderLocator::Index(0)).unwrap(), 0);
        assert!(matches!(
            locate_header(&matrix, &HeaderLocator::Index(5)),
            Err(GridError::HeaderRowOutOfBounds { index: 5, rows: 5 })
        ));
    }

    #[test]
    fn test_ingest_keys_and_rows() {
        let table = ingest(
            &invoice_matrix(),
            &HeaderLocator::default(),
            &DerivedRegistry::empty(),
        )
        .unwrap();
        let keys: Vec<&str> = table.columns.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["hs_code", "rate_usd", "total_no_of_boxes", "total_qty"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.revision, 0);

        let short = &table.rows[1];
        assert_eq!(short.get("rate_usd"), &CellValue::Number(3.0));
        assert_eq!(short.cells.get("total_qty"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_ingest_appends_and_fills_derived_columns() {
        let matrix = vec![
            text_row(&["HS Code", "Rate in USD", "Total No of Boxes", "Total Qty"]),
            vec![
                CellValue::from("8471"),
                CellValue::Number(10.0),
                CellValue::Number(2.0),
                CellValue::Number(5.0),
            ],
        ];
        let table =
            ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::invoice()).unwrap();
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.columns[6].key.as_str(), "net_amount");
        assert_eq!(table.columns[6].order, 6);
        assert_eq!(table.rows[0].get("net_amount"), &CellValue::Number(85.0));
    }

    #[test]
    fn test_ingest_trims_trailing_blank_rows_and_extra_cells() {
        let matrix = vec![
            text_row(&["Name", "", ""]),
            text_row(&["a", "overflow"]),
            text_row(&["b"]),
            text_row(&["", "  "]),
            vec![],
        ];
        let table = ingest(&matrix, &HeaderLocator::Index(0), &DerivedRegistry::empty()).unwrap();
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells.len(), 1);
        assert_eq!(table.rows[1].get("name"), &CellValue::Text("b".into()));
    }

    #[test]
    fn test_ingest_keeps_interior_blank_rows() {
        let matrix = vec![
            text_row(&["Name", "Qty"]),
            vec![CellValue::from("a"), CellValue::Number(1.0)],
            vec![],
            text_row(&["", "  "]),
            vec![CellValue::from("b"), CellValue::Number(2.0)],
        ];
        let table = ingest(&matrix, &HeaderLocator::Index(0), &DerivedRegistry::empty()).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[1].get("name"), &CellValue::Empty);
        assert_eq!(table.rows[1].get("qty"), &CellValue::Empty);
        assert_eq!(table.rows[2].get("name"), &CellValue::Empty);
        assert_eq!(table.rows[3].get("qty"), &CellValue::Number(2.0));
    }

    #[test]
    fn test_ingest_blank_header_row() {
        let matrix = vec![text_row(&["", " "]), text_row(&["x"])];
        assert!(matches!(
            ingest(&matrix, &HeaderLocator::Index(0), &DerivedRegistry::empty()),
            Err(GridError::EmptyHeaderRow)
        ));
    }

    #[test]
    fn test_ingest_assigns_distinct_row_ids() {
        let table = ingest(
            &invoice_matrix(),
            &HeaderLocator::default(),
            &DerivedRegistry::invoice(),
        )
        .unwrap();
        assert_ne!(table.rows[0].id, table.rows[1].id);
    }
}

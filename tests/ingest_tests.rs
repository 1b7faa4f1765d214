//! Decode + ingest tests against generated XLSX and CSV files.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod fixtures;

use fixtures::{invoice_csv, invoice_xlsx, RawValue, SheetBuilder, XlsxBuilder};
use sheetgrid::{
    decode, ingest, CellValue, DerivedRegistry, EngineConfig, GridError, HeaderLocator, SheetGrid,
};

fn keys(table: &sheetgrid::TableState) -> Vec<&str> {
    table.columns.iter().map(|c| c.key.as_str()).collect()
}

fn num(table: &sheetgrid::TableState, row: usize, key: &str) -> f64 {
    table
        .value(row, key)
        .and_then(CellValue::as_number)
        .unwrap_or_else(|| panic!("no number at row {row}, column {key}"))
}

// ============================================================================
// XLSX
// ============================================================================

#[test]
fn test_xlsx_invoice_ingests_with_derived_columns() {
    let matrix = decode(&invoice_xlsx(3), Some("invoice.xlsx")).unwrap();
    let table = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::invoice()).unwrap();

    assert_eq!(
        keys(&table),
        vec![
            "hs_code",
            "description",
            "rate_in_usd",
            "total_no_of_boxes",
            "total_qty",
            "product_value_in_usd",
            "discount",
            "net_amount",
        ]
    );
    assert_eq!(table.row_count(), 3);

    // Row 0: 1 * 2 * 10 = 20, discount 3, net 17
    assert_eq!(table.value(0, "hs_code"), Some(&CellValue::Text("008471".into())));
    assert_eq!(num(&table, 0, "product_value_in_usd"), 20.0);
    assert_eq!(num(&table, 0, "discount"), 3.0);
    assert_eq!(num(&table, 0, "net_amount"), 17.0);
}

#[test]
fn test_xlsx_discount_is_capped() {
    let matrix = decode(&invoice_xlsx(30), None).unwrap();
    let table = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::invoice()).unwrap();
    // Row 20: 21 * 2 * 10 = 420, 15% would be 63
    assert_eq!(num(&table, 20, "product_value_in_usd"), 420.0);
    assert_eq!(num(&table, 20, "discount"), 50.0);
    assert_eq!(num(&table, 20, "net_amount"), 370.0);
}

#[test]
fn test_xlsx_reads_first_sheet_only() {
    let xlsx = XlsxBuilder::new()
        .add_sheet("First")
        .add_row(1, ["HS Code", "Total Qty"])
        .add_row(2, [RawValue::from("0101"), RawValue::from(4)])
        .done()
        .add_sheet("Second")
        .add_row(1, ["HS Code", "Other"])
        .add_row(2, ["x", "y"])
        .build();

    let matrix = decode(&xlsx, Some("book.xlsx")).unwrap();
    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix[1][0], CellValue::Text("0101".into()));
    assert_eq!(matrix[1][1], CellValue::Number(4.0));
}

#[test]
fn test_xlsx_cell_types() {
    let xlsx = XlsxBuilder::new()
        .add_sheet("Types")
        .add_cell("A1", "shared")
        .add_cell("B1", 3.25)
        .add_cell("C1", true)
        .add_cell("D1", RawValue::Error("#DIV/0!".into()))
        .add_cell("E1", RawValue::InlineString("inline & text".into()))
        .add_cell("F1", RawValue::FormulaString("computed".into()))
        .build();

    let matrix = decode(&xlsx, None).unwrap();
    assert_eq!(
        matrix[0],
        vec![
            CellValue::Text("shared".into()),
            CellValue::Number(3.25),
            CellValue::Text("TRUE".into()),
            CellValue::Text("#DIV/0!".into()),
            CellValue::Text("inline & text".into()),
            CellValue::Text("computed".into()),
        ]
    );
}

#[test]
fn test_xlsx_sparse_cells_become_empty() {
    let xlsx = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Sparse")
                .row(1, ["HS Code", "Description", "Total Qty"])
                .cell("A3", "9403")
                .cell("C3", 7),
        )
        .build();

    let matrix = decode(&xlsx, None).unwrap();
    let table = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::empty()).unwrap();
    // Row 2 of the sheet is blank and stays as an empty record.
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.value(0, "hs_code"), Some(&CellValue::Empty));
    assert_eq!(table.value(0, "total_qty"), Some(&CellValue::Empty));
    assert_eq!(table.value(1, "description"), Some(&CellValue::Empty));
    assert_eq!(table.value(1, "total_qty"), Some(&CellValue::Number(7.0)));
}

#[test]
fn test_xlsx_header_after_title_rows() {
    let xlsx = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Invoice")
                .cell("A1", "ACME Export Ltd")
                .cell("A2", "Invoice No 42")
                .row(4, ["Item", "hs code", "Qty", "Qty"])
                .row(5, [RawValue::from("Bolts"), "7318".into(), 5.into(), 6.into()]),
        )
        .build();

    let matrix = decode(&xlsx, None).unwrap();
    let table = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::empty()).unwrap();
    assert_eq!(keys(&table), vec!["item", "hs_code", "qty", "qty_1"]);
    assert_eq!(table.columns[3].original_label, "Qty");
    assert_eq!(table.value(0, "qty_1"), Some(&CellValue::Number(6.0)));
}

#[test]
fn test_corrupt_xlsx_is_an_error() {
    let mut xlsx = invoice_xlsx(2);
    xlsx.truncate(40);
    assert!(decode(&xlsx, Some("broken.xlsx")).is_err());
}

#[test]
fn test_xlsx_cell_beyond_sheet_limits_is_recoverable() {
    let only_far_cell = XlsxBuilder::new()
        .sheet(SheetBuilder::new("Far").cell("ZZZZZZZZZZ1", 1))
        .build();
    let matrix = decode(&only_far_cell, Some("far.xlsx")).unwrap();
    assert!(matrix.is_empty());

    let mut grid = SheetGrid::default();
    grid.load_file(&invoice_csv(3), Some("invoice.csv")).unwrap();
    assert!(grid.load_file(&only_far_cell, Some("far.xlsx")).is_err());
    assert_eq!(grid.store().row_count(), 3);

    let mixed = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Mixed")
                .row(1, ["HS Code", "Total Qty"])
                .row(2, [RawValue::from("8471"), 4.into()])
                .cell("XFE2", 9)
                .cell("A1048577", "lost"),
        )
        .build();
    let matrix = decode(&mixed, None).unwrap();
    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix[1].len(), 2);
}

// ============================================================================
// CSV / TSV
// ============================================================================

#[test]
fn test_csv_matches_xlsx() {
    let registry = DerivedRegistry::invoice();
    let locator = HeaderLocator::default();
    let from_xlsx = ingest(&decode(&invoice_xlsx(25), None).unwrap(), &locator, &registry).unwrap();
    let from_csv = ingest(
        &decode(&invoice_csv(25), Some("invoice.csv")).unwrap(),
        &locator,
        &registry,
    )
    .unwrap();

    assert_eq!(from_xlsx.columns, from_csv.columns);
    for i in 0..25 {
        let a = from_xlsx.rows[i].values_in_order(&from_xlsx.columns);
        let b = from_csv.rows[i].values_in_order(&from_csv.columns);
        assert_eq!(a, b, "row {i}");
    }
}

#[test]
fn test_tsv_with_quoted_fields() {
    let tsv = "HS Code\tDescription\tTotal Qty\r\n\"0101\"\t\"Horses,\tlive\"\t3\r\n";
    let matrix = decode(tsv.as_bytes(), Some("items.tsv")).unwrap();
    let table = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::empty()).unwrap();
    assert_eq!(table.value(0, "hs_code"), Some(&CellValue::Text("0101".into())));
    assert_eq!(
        table.value(0, "description"),
        Some(&CellValue::Text("Horses,\tlive".into()))
    );
    assert_eq!(table.value(0, "total_qty"), Some(&CellValue::Number(3.0)));
}

#[test]
fn test_legacy_xls_is_rejected() {
    let err = decode(b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", Some("old.xls")).unwrap_err();
    assert!(matches!(err, GridError::UnsupportedFormat(_)));
}

// ============================================================================
// Header location
// ============================================================================

#[test]
fn test_missing_marker_fails_without_partial_table() {
    let csv = b"Description,Qty\nBolts,3\n";
    let matrix = decode(csv, Some("a.csv")).unwrap();
    let err = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::invoice()).unwrap_err();
    assert!(matches!(err, GridError::HeaderRowNotFound { ref marker } if marker == "hs code"));
    assert!(err.is_recoverable_ingest());
}

#[test]
fn test_index_locator() {
    let csv = b"Description,Qty\nBolts,3\n";
    let matrix = decode(csv, Some("a.csv")).unwrap();
    let table = ingest(&matrix, &HeaderLocator::Index(0), &DerivedRegistry::empty()).unwrap();
    assert_eq!(keys(&table), vec!["description", "qty"]);

    let err = ingest(&matrix, &HeaderLocator::Index(5), &DerivedRegistry::empty()).unwrap_err();
    assert!(matches!(err, GridError::HeaderRowOutOfBounds { index: 5, rows: 2 }));
}

#[test]
fn test_header_only_sheet_gives_empty_table() {
    let matrix = decode(b"HS Code,Total Qty\n", Some("a.csv")).unwrap();
    let table = ingest(&matrix, &HeaderLocator::default(), &DerivedRegistry::invoice()).unwrap();
    assert_eq!(table.row_count(), 0);
    assert!(table.has_column("net_amount"));
}

// ============================================================================
// Through the grid facade
// ============================================================================

#[test]
fn test_grid_with_configured_header_and_registry() {
    let config = EngineConfig::from_json(
        r#"{
            "header": { "marker": "sku" },
            "derived": [
                { "targetKey": "line_total",
                  "formula": { "op": "product", "factors": ["price", "qty"] } }
            ]
        }"#,
    )
    .unwrap();

    let mut grid = SheetGrid::with_config(config);
    grid.load_file(b"Order 7\nSKU,Price,Qty\nA-1,2.5,4\n", Some("order.csv"))
        .unwrap();

    assert_eq!(grid.store().value(0, "line_total"), Some(&CellValue::Number(10.0)));
    assert!(!grid.is_editable("line_total"));
    assert!(grid.is_editable("Price"));
}

//! Test fixtures for generating XLSX and CSV files in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! use fixtures::XlsxBuilder;
//!
//! let xlsx = XlsxBuilder::new()
//!     .add_sheet("Invoice")
//!     .add_row(1, ["HS Code", "Rate in USD"])
//!     .add_cell("A2", "0101")
//!     .add_cell("B2", 12.5)
//!     .build();
//!
//! let matrix = sheetgrid::decode(&xlsx, Some("invoice.xlsx")).unwrap();
//! ```
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Value of a fixture cell, tagged the way the worksheet XML stores it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Shared string (`t="s"`).
    String(String),
    Number(f64),
    Boolean(bool),
    /// Error value such as `#DIV/0!`.
    Error(String),
    /// Inline string (`t="inlineStr"`).
    InlineString(String),
    /// Formula result string (`t="str"`).
    FormulaString(String),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::String(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::String(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i32> for RawValue {
    fn from(n: i32) -> Self {
        RawValue::Number(f64::from(n))
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Boolean(b)
    }
}

#[derive(Debug, Clone)]
struct CellEntry {
    cell_ref: String,
    value: RawValue,
}

/// Builder for one worksheet.
#[derive(Debug, Clone, Default)]
pub struct SheetBuilder {
    name: String,
    cells: Vec<CellEntry>,
}

impl SheetBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: Vec::new(),
        }
    }

    #[must_use]
    pub fn cell<V: Into<RawValue>>(mut self, cell_ref: &str, value: V) -> Self {
        self.cells.push(CellEntry {
            cell_ref: cell_ref.to_string(),
            value: value.into(),
        });
        self
    }

    /// Fill row `row` (1-based) from column A onwards.
    #[must_use]
    pub fn row<V, I>(mut self, row: u32, values: I) -> Self
    where
        V: Into<RawValue>,
        I: IntoIterator<Item = V>,
    {
        for (i, value) in values.into_iter().enumerate() {
            let cell_ref = format!("{}{}", col_num_to_letter(i as u32 + 1), row);
            self = self.cell(&cell_ref, value);
        }
        self
    }
}

/// Builder for complete XLSX packages.
#[derive(Debug, Default)]
pub struct XlsxBuilder {
    sheets: Vec<SheetBuilder>,
}

impl XlsxBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sheet(mut self, sheet: SheetBuilder) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Add a sheet by name (returns a builder for chaining).
    #[must_use]
    pub fn add_sheet(self, name: &str) -> XlsxSheetAdder {
        XlsxSheetAdder {
            builder: self,
            sheet: SheetBuilder::new(name),
        }
    }

    /// Build the XLSX file as bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut shared_strings: Vec<String> = Vec::new();
        for sheet in &self.sheets {
            for cell in &sheet.cells {
                if let RawValue::String(ref s) = cell.value {
                    if !shared_strings.contains(s) {
                        shared_strings.push(s.clone());
                    }
                }
            }
        }

        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(generate_content_types(self.sheets.len()).as_bytes())
            .unwrap();

        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(generate_rels().as_bytes()).unwrap();

        zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        zip.write_all(generate_workbook_rels(self.sheets.len()).as_bytes())
            .unwrap();

        zip.start_file("xl/workbook.xml", options).unwrap();
        zip.write_all(generate_workbook(&self.sheets).as_bytes())
            .unwrap();

        if !shared_strings.is_empty() {
            zip.start_file("xl/sharedStrings.xml", options).unwrap();
            zip.write_all(generate_shared_strings(&shared_strings).as_bytes())
                .unwrap();
        }

        for (i, sheet) in self.sheets.iter().enumerate() {
            let path = format!("xl/worksheets/sheet{}.xml", i + 1);
            zip.start_file(&path, options).unwrap();
            zip.write_all(generate_sheet_xml(sheet, &shared_strings).as_bytes())
                .unwrap();
        }

        zip.finish().expect("Failed to finish ZIP").into_inner()
    }
}

/// Helper for fluent sheet building within `XlsxBuilder`.
pub struct XlsxSheetAdder {
    builder: XlsxBuilder,
    sheet: SheetBuilder,
}

impl XlsxSheetAdder {
    #[must_use]
    pub fn add_cell<V: Into<RawValue>>(mut self, cell_ref: &str, value: V) -> Self {
        self.sheet = self.sheet.cell(cell_ref, value);
        self
    }

    #[must_use]
    pub fn add_row<V, I>(mut self, row: u32, values: I) -> Self
    where
        V: Into<RawValue>,
        I: IntoIterator<Item = V>,
    {
        self.sheet = self.sheet.row(row, values);
        self
    }

    /// Finish the current sheet and return the builder.
    #[must_use]
    pub fn done(mut self) -> XlsxBuilder {
        self.builder.sheets.push(self.sheet);
        self.builder
    }

    /// Build the XLSX directly (finishes the current sheet automatically).
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.done().build()
    }
}

// ============================================================================
// Canned inputs
// ============================================================================

/// Invoice workbook: a title row, the header on row 2, then `rows` line items.
/// Line item `i` has rate `i + 1`, 2 boxes and quantity 10.
pub fn invoice_xlsx(rows: usize) -> Vec<u8> {
    let mut sheet = SheetBuilder::new("Invoice")
        .cell("A1", "Commercial Invoice")
        .row(
            2,
            [
                "HS Code",
                "Description",
                "Rate in USD",
                "Total No of Boxes",
                "Total Qty",
            ],
        );
    for i in 0..rows {
        let r = i as u32 + 3;
        sheet = sheet
            .cell(&format!("A{r}"), format!("{:06}", 8471 + i))
            .cell(&format!("B{r}"), format!("Item {i}"))
            .cell(&format!("C{r}"), (i + 1) as f64)
            .cell(&format!("D{r}"), 2.0)
            .cell(&format!("E{r}"), 10.0);
    }
    XlsxBuilder::new().sheet(sheet).build()
}

/// Same line items as [`invoice_xlsx`], as CSV text.
pub fn invoice_csv(rows: usize) -> Vec<u8> {
    let mut csv = String::from(
        "Commercial Invoice\nHS Code,Description,Rate in USD,Total No of Boxes,Total Qty\n",
    );
    for i in 0..rows {
        csv.push_str(&format!("{:06},Item {i},{},2,10\n", 8471 + i, i + 1));
    }
    csv.into_bytes()
}

// ============================================================================
// XML generation
// ============================================================================

fn generate_content_types(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn generate_rels() -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    xml.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#);
    xml.push_str("</Relationships>");
    xml
}

/// Sheets get rId1..rIdN in reverse file order so that resolving the first
/// `<sheet>` has to go through the relationships.
fn generate_workbook_rels(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            sheet_count + 1 - i
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
        sheet_count + 1
    ));
    xml.push_str("</Relationships>");
    xml
}

fn generate_workbook(sheets: &[SheetBuilder]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#);
    xml.push_str("<sheets>");
    let count = sheets.len();
    for (i, sheet) in sheets.iter().enumerate() {
        // sheet{i+1}.xml is referenced by rId{count - i}
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(&sheet.name),
            i + 1,
            count - i
        ));
    }
    xml.push_str("</sheets>");
    xml.push_str("</workbook>");
    xml
}

fn generate_shared_strings(strings: &[String]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(&format!(
        r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
        strings.len(),
        strings.len()
    ));
    for s in strings {
        xml.push_str(&format!(r#"<si><t xml:space="preserve">{}</t></si>"#, escape_xml(s)));
    }
    xml.push_str("</sst>");
    xml
}

fn generate_sheet_xml(sheet: &SheetBuilder, shared_strings: &[String]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );
    xml.push_str("<sheetData>");

    let mut rows: std::collections::BTreeMap<u32, Vec<&CellEntry>> =
        std::collections::BTreeMap::new();
    for cell in &sheet.cells {
        let (_, row) = parse_cell_ref(&cell.cell_ref);
        rows.entry(row).or_default().push(cell);
    }

    for (row_num, cells) in rows {
        xml.push_str(&format!(r#"<row r="{row_num}">"#));
        for cell in cells {
            let r = &cell.cell_ref;
            match &cell.value {
                RawValue::String(s) => {
                    let idx = shared_strings.iter().position(|x| x == s).unwrap_or(0);
                    xml.push_str(&format!(r#"<c r="{r}" t="s"><v>{idx}</v></c>"#));
                }
                RawValue::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{r}"><v>{n}</v></c>"#));
                }
                RawValue::Boolean(b) => {
                    let v = if *b { "1" } else { "0" };
                    xml.push_str(&format!(r#"<c r="{r}" t="b"><v>{v}</v></c>"#));
                }
                RawValue::Error(e) => {
                    xml.push_str(&format!(r#"<c r="{r}" t="e"><v>{}</v></c>"#, escape_xml(e)));
                }
                RawValue::InlineString(s) => {
                    xml.push_str(&format!(
                        r#"<c r="{r}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        escape_xml(s)
                    ));
                }
                RawValue::FormulaString(s) => {
                    xml.push_str(&format!(
                        r#"<c r="{r}" t="str"><f>A1</f><v>{}</v></c>"#,
                        escape_xml(s)
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData>");
    xml.push_str("</worksheet>");
    xml
}

/// "B12" -> (2, 12), both 1-based.
fn parse_cell_ref(cell_ref: &str) -> (u32, u32) {
    let split = cell_ref
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell_ref.len());
    let (letters, digits) = cell_ref.split_at(split);
    let col = letters
        .bytes()
        .fold(0u32, |acc, b| {
            acc.saturating_mul(26)
                .saturating_add(u32::from(b.to_ascii_uppercase() - b'A' + 1))
        });
    (col, digits.parse().unwrap_or(1))
}

fn col_num_to_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

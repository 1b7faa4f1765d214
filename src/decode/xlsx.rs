//! First-worksheet reader for XLSX packages.
//!
//! Follows the workbook relationships to the first `<sheet>` listed in
//! `xl/workbook.xml`, resolves shared strings, and lays the `<c>` values out by their
//! cell references. Everything else in the package is skipped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufReader, Cursor, Read, Seek};
use zip::ZipArchive;

use crate::error::Result;
use crate::types::{CellMatrix, CellValue};

const FALLBACK_SHEET_PATH: &str = "xl/worksheets/sheet1.xml";
const FALLBACK_SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

/// Sheet limits (`XFD1048576`). Cells outside them are dropped.
const MAX_COLS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// Paths pulled out of `xl/_rels/workbook.xml.rels`.
#[derive(Default, Debug)]
struct WorkbookRelationships {
    /// rId -> full path, e.g. "rId1" -> "xl/worksheets/sheet1.xml"
    worksheets: HashMap<String, String>,
    shared_strings: Option<String>,
}

/// Cell type tag from the `t` attribute of a `<c>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellTypeTag {
    Shared,
    Inline,
    Str,
    Bool,
    Error,
    Default,
}

fn parse_cell_type_tag(value: &[u8]) -> CellTypeTag {
    match value {
        b"s" => CellTypeTag::Shared,
        b"b" => CellTypeTag::Bool,
        b"e" => CellTypeTag::Error,
        b"str" => CellTypeTag::Str,
        b"inlineStr" => CellTypeTag::Inline,
        _ => CellTypeTag::Default,
    }
}

/// Decode the first worksheet of an XLSX file into a matrix.
pub(crate) fn read_first_sheet(data: &[u8]) -> Result<CellMatrix> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let rels = parse_workbook_relationships(&mut archive);
    let sheet_path = first_sheet_path(&mut archive, &rels.worksheets)?;
    let shared_strings = parse_shared_strings(&mut archive, rels.shared_strings.as_deref());

    tracing::debug!(
        sheet = %sheet_path,
        shared_strings = shared_strings.len(),
        "reading first worksheet"
    );

    let file = archive.by_name(&sheet_path)?;
    parse_sheet_cells(BufReader::new(file), &shared_strings)
}

fn parse_workbook_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> WorkbookRelationships {
    let mut rels = WorkbookRelationships::default();

    let Ok(file) = archive.by_name("xl/_rels/workbook.xml.rels") else {
        return rels; // Relationships file is optional
    };

    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e) | Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let id = attr(e, b"Id").unwrap_or_default();
                let target = attr(e, b"Target").unwrap_or_default();
                let rel_type = attr(e, b"Type").unwrap_or_default();

                // Targets are relative to xl/ unless absolute.
                let full_path = match target.strip_prefix('/') {
                    Some(stripped) => stripped.to_string(),
                    None => format!("xl/{target}"),
                };

                if rel_type.ends_with("/worksheet") && !id.is_empty() && !target.is_empty() {
                    rels.worksheets.insert(id, full_path);
                } else if rel_type.ends_with("/sharedStrings") {
                    rels.shared_strings = Some(full_path);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    rels
}

/// Path of the first `<sheet>` in `xl/workbook.xml`.
fn first_sheet_path<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    worksheets: &HashMap<String, String>,
) -> Result<String> {
    let file = archive.by_name("xl/workbook.xml")?;
    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                // r:id is namespace prefixed
                let r_id = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"id")
                    .and_then(|a| std::str::from_utf8(&a.value).ok().map(str::to_string));
                let path = r_id
                    .and_then(|id| worksheets.get(&id).cloned())
                    .unwrap_or_else(|| FALLBACK_SHEET_PATH.to_string());
                return Ok(path);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(FALLBACK_SHEET_PATH.to_string())
}

/// Shared string table. Rich-text runs are concatenated; phonetic hints are skipped.
fn parse_shared_strings<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: Option<&str>,
) -> Vec<String> {
    let sst_path = path.unwrap_or(FALLBACK_SHARED_STRINGS_PATH);
    let Ok(file) = archive.by_name(sst_path) else {
        return Vec::new(); // SharedStrings is optional
    };

    let mut xml = Reader::from_reader(BufReader::new(file));
    xml.trim_text(false);

    let mut strings = Vec::new();
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_si && !in_phonetic => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(ref e)) if in_t => {
                if let Ok(text) = e.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    strings
}

/// The `<c>` currently being read.
struct PendingCell {
    col: usize,
    row: usize,
    tag: CellTypeTag,
    raw: String,
}

/// Read every cell of a worksheet into a ragged matrix indexed by cell reference.
fn parse_sheet_cells<B: std::io::BufRead>(
    source: B,
    shared_strings: &[String],
) -> Result<CellMatrix> {
    let mut xml = Reader::from_reader(source);
    xml.trim_text(false);

    let mut matrix: CellMatrix = Vec::new();
    let mut buf = Vec::new();
    let mut current_row: usize = 0;
    let mut next_col: usize = 0;
    let mut seen_row = false;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;
    let mut dropped: usize = 0;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = next_row_index(e, current_row, seen_row);
                    seen_row = true;
                    next_col = 0;
                }
                b"c" => match cell_position(e, current_row, next_col) {
                    Some((col, row, tag)) => {
                        next_col = col.saturating_add(1);
                        pending = Some(PendingCell {
                            col,
                            row,
                            tag,
                            raw: String::new(),
                        });
                    }
                    None => {
                        dropped += 1;
                        pending = None;
                    }
                },
                // <v> holds the value, <t> (inside <is>) holds inline text
                b"v" | b"t" if pending.is_some() => in_value = true,
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = next_row_index(e, current_row, seen_row);
                    seen_row = true;
                    next_col = 0;
                }
                b"c" => {
                    if let Some((col, _, _)) = cell_position(e, current_row, next_col) {
                        next_col = col.saturating_add(1);
                    }
                }
                _ => {}
            },
            Event::Text(ref e) if in_value => {
                if let Some(cell) = pending.as_mut() {
                    cell.raw.push_str(&e.unescape()?);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        if !place(&mut matrix, cell, shared_strings) {
                            dropped += 1;
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if dropped > 0 {
        tracing::warn!(dropped, "skipped cells outside the sheet limits");
    }
    Ok(matrix)
}

/// Store a cell value. Returns `false` when the cell lies outside the sheet limits.
fn place(matrix: &mut CellMatrix, cell: PendingCell, shared_strings: &[String]) -> bool {
    if cell.row >= MAX_ROWS || cell.col >= MAX_COLS {
        return false;
    }
    let value = resolve_value(cell.tag, cell.raw, shared_strings);
    if value.is_empty() {
        return true;
    }
    if matrix.len() <= cell.row {
        matrix.resize_with(cell.row + 1, Vec::new);
    }
    if let Some(row) = matrix.get_mut(cell.row) {
        if row.len() <= cell.col {
            row.resize(cell.col + 1, CellValue::Empty);
        }
        if let Some(slot) = row.get_mut(cell.col) {
            *slot = value;
        }
    }
    true
}

fn resolve_value(tag: CellTypeTag, raw: String, shared_strings: &[String]) -> CellValue {
    match tag {
        CellTypeTag::Shared => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared_strings.get(idx))
            .map_or(CellValue::Empty, |s| CellValue::from(s.as_str())),
        CellTypeTag::Bool => match raw.trim() {
            "1" | "true" => CellValue::from("TRUE"),
            "0" | "false" => CellValue::from("FALSE"),
            _ => CellValue::from(raw),
        },
        CellTypeTag::Inline | CellTypeTag::Str | CellTypeTag::Error => CellValue::from(raw),
        CellTypeTag::Default => match raw.trim().parse::<f64>() {
            Ok(n) => CellValue::number(n),
            Err(_) => CellValue::from(raw),
        },
    }
}

/// 0-based row from `<row r="N">`, or the row after the previous one.
///
/// A number past the last sheet row yields `MAX_ROWS`, so cells on that row without
/// their own reference are dropped.
fn next_row_index(e: &BytesStart, current_row: usize, seen_row: bool) -> usize {
    attr(e, b"r")
        .and_then(|r| r.trim().parse::<u64>().ok())
        .map_or_else(
            || {
                if seen_row {
                    current_row.saturating_add(1).min(MAX_ROWS)
                } else {
                    0
                }
            },
            |r| {
                usize::try_from(r)
                    .ok()
                    .filter(|r| *r <= MAX_ROWS)
                    .map_or(MAX_ROWS, |r| r.saturating_sub(1))
            },
        )
}

/// Column, row and type of a `<c>`. A missing `r` means "next cell in this row";
/// an `r` that is malformed or outside the sheet limits gives `None`.
fn cell_position(
    e: &BytesStart,
    current_row: usize,
    next_col: usize,
) -> Option<(usize, usize, CellTypeTag)> {
    let mut position = Some((next_col, current_row));
    let mut tag = CellTypeTag::Default;
    for a in e.attributes().flatten() {
        match a.key.as_ref() {
            b"r" => position = parse_cell_ref_bytes(&a.value),
            b"t" => tag = parse_cell_type_tag(&a.value),
            _ => {}
        }
    }
    position.map(|(col, row)| (col, row, tag))
}

/// Parse a cell reference like `B12` (or `$B$12`) into 0-based `(col, row)`.
fn parse_cell_ref_bytes(ref_bytes: &[u8]) -> Option<(usize, usize)> {
    let mut col: usize = 0;
    let mut row: usize = 0;
    let mut saw_col = false;
    let mut saw_row = false;

    for &b in ref_bytes {
        if b == b'$' {
            continue;
        }
        if b.is_ascii_alphabetic() && !saw_row {
            let digit = usize::from(b.to_ascii_uppercase() - b'A') + 1;
            col = col.checked_mul(26)?.checked_add(digit)?;
            saw_col = true;
        } else if b.is_ascii_digit() && saw_col {
            row = row.checked_mul(10)?.checked_add(usize::from(b - b'0'))?;
            saw_row = true;
        } else {
            return None;
        }
    }

    if !saw_col || !saw_row || row == 0 || row > MAX_ROWS || col > MAX_COLS {
        return None;
    }
    Some((col - 1, row - 1))
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| std::str::from_utf8(&a.value).ok().map(str::to_string))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn sheet_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{body}</sheetData></worksheet>"#
        )
    }

    fn parse(body: &str, sst: &[&str]) -> CellMatrix {
        let sst: Vec<String> = sst.iter().map(|s| (*s).to_string()).collect();
        let xml = sheet_xml(body);
        parse_sheet_cells(xml.as_bytes(), &sst).unwrap()
    }

    #[test]
    fn test_parse_cell_ref_bytes() {
        assert_eq!(parse_cell_ref_bytes(b"A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref_bytes(b"$AA$10"), Some((26, 9)));
        assert_eq!(parse_cell_ref_bytes(b"1A"), None);
        assert_eq!(parse_cell_ref_bytes(b"A0"), None);
        assert_eq!(parse_cell_ref_bytes(b"A"), None);
        assert_eq!(parse_cell_ref_bytes(b"XFD1048576"), Some((16_383, 1_048_575)));
        assert_eq!(parse_cell_ref_bytes(b"XFE1"), None);
        assert_eq!(parse_cell_ref_bytes(b"A1048577"), None);
        assert_eq!(parse_cell_ref_bytes(b"ZZZZZZZZZZ1"), None);
    }

    #[test]
    fn test_out_of_range_cells_are_dropped() {
        let m = parse(
            r#"<row r="1"><c r="ZZZZZZZZZZ1"><v>1</v></c><c r="B1"><v>2</v></c></row><row r="99999999999"><c><v>3</v></c></row>"#,
            &[],
        );
        assert_eq!(m, vec![vec![CellValue::Empty, CellValue::Number(2.0)]]);
    }

    #[test]
    fn test_cell_types() {
        let m = parse(
            r#"<row r="1">
                <c r="A1" t="s"><v>0</v></c>
                <c r="B1"><v>12.5</v></c>
                <c r="C1" t="b"><v>1</v></c>
                <c r="D1" t="e"><v>#DIV/0!</v></c>
                <c r="E1" t="inlineStr"><is><t>inline &amp; text</t></is></c>
                <c r="F1" t="str"><f>A1</f><v>HS Code</v></c>
            </row>"#,
            &["HS Code"],
        );
        assert_eq!(
            m[0],
            vec![
                CellValue::from("HS Code"),
                CellValue::Number(12.5),
                CellValue::from("TRUE"),
                CellValue::from("#DIV/0!"),
                CellValue::from("inline & text"),
                CellValue::from("HS Code"),
            ]
        );
    }

    #[test]
    fn test_sparse_cells_are_positioned() {
        let m = parse(
            r#"<row r="2"><c r="C2"><v>3</v></c></row><row r="4"><c r="A4"><v>1</v></c></row>"#,
            &[],
        );
        assert_eq!(m.len(), 4);
        assert!(m[0].is_empty());
        assert_eq!(m[1], vec![CellValue::Empty, CellValue::Empty, CellValue::Number(3.0)]);
        assert_eq!(m[3][0], CellValue::Number(1.0));
    }

    #[test]
    fn test_cells_without_refs_follow_order() {
        let m = parse(
            r#"<row><c><v>1</v></c><c/><c><v>3</v></c></row><row><c><v>4</v></c></row>"#,
            &[],
        );
        assert_eq!(m[0], vec![CellValue::Number(1.0), CellValue::Empty, CellValue::Number(3.0)]);
        assert_eq!(m[1], vec![CellValue::Number(4.0)]);
    }

    #[test]
    fn test_missing_shared_string_is_empty() {
        let m = parse(r#"<row r="1"><c r="A1" t="s"><v>9</v></c><c r="B1"><v>1</v></c></row>"#, &[]);
        assert_eq!(m[0], vec![CellValue::Empty, CellValue::Number(1.0)]);
    }

    fn build_package(files: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_first_sheet_via_relationships() {
        let workbook = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Invoice" sheetId="1" r:id="rId2"/><sheet name="Other" sheetId="2" r:id="rId1"/></sheets></workbook>"#;
        let rels = r#"<Relationships>
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
        </Relationships>"#;
        let sst = r#"<sst><si><t>Wrong</t></si><si><r><t>HS </t></r><r><t>Code</t></r><rPh><t>x</t></rPh></si></sst>"#;
        let other = sheet_xml(r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#);
        let invoice = sheet_xml(r#"<row r="1"><c r="A1" t="s"><v>1</v></c></row>"#);

        let data = build_package(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/sharedStrings.xml", sst),
            ("xl/worksheets/sheet1.xml", &other),
            ("xl/worksheets/sheet2.xml", &invoice),
        ]);
        let m = read_first_sheet(&data).unwrap();
        assert_eq!(m, vec![vec![CellValue::from("HS Code")]]);
    }

    #[test]
    fn test_missing_relationships_fall_back_to_sheet1() {
        let workbook = r#"<workbook><sheets><sheet name="S" sheetId="1"/></sheets></workbook>"#;
        let sheet = sheet_xml(r#"<row r="1"><c r="A1"><v>7</v></c></row>"#);
        let data = build_package(&[
            ("xl/workbook.xml", workbook),
            ("xl/worksheets/sheet1.xml", &sheet),
        ]);
        assert_eq!(read_first_sheet(&data).unwrap(), vec![vec![CellValue::Number(7.0)]]);
    }

    #[test]
    fn test_missing_worksheet_is_zip_error() {
        let workbook = r#"<workbook><sheets><sheet name="S" sheetId="1"/></sheets></workbook>"#;
        let data = build_package(&[("xl/workbook.xml", workbook)]);
        assert!(matches!(
            read_first_sheet(&data),
            Err(crate::GridError::Zip(_))
        ));
    }
}

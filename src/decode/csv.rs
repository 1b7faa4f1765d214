//! Minimal CSV/TSV reader producing a cell matrix.

use crate::types::{CellMatrix, CellValue};

/// Field delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Tab => '\t',
        }
    }

    /// Tab if the first line has more tabs than commas, else comma.
    pub(crate) fn sniff(data: &[u8]) -> Self {
        let first_line = data.split(|b| *b == b'\n').next().unwrap_or_default();
        let tabs = first_line.iter().filter(|b| **b == b'\t').count();
        let commas = first_line.iter().filter(|b| **b == b',').count();
        if tabs > commas {
            Self::Tab
        } else {
            Self::Comma
        }
    }
}

/// Parse delimited text. Invalid UTF-8 is replaced, a leading BOM is dropped, and
/// quoted fields may contain delimiters, doubled quotes and line breaks.
pub fn parse_delimited(data: &[u8], delim: Delimiter) -> CellMatrix {
    let text = String::from_utf8_lossy(data);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&*text);
    let sep = delim.as_char();

    let mut rows: CellMatrix = Vec::new();
    let mut row: Vec<CellValue> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    // Escaped quote
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == sep {
            row.push(to_cell(&field));
            field.clear();
        } else if ch == '\n' || ch == '\r' {
            if ch == '\r' && chars.peek() == Some(&'\n') {
                chars.next();
            }
            row.push(to_cell(&field));
            field.clear();
            rows.push(std::mem::take(&mut row));
        } else {
            field.push(ch);
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(to_cell(&field));
        rows.push(row);
    }
    rows
}

fn to_cell(field: &str) -> CellValue {
    CellValue::from_input(field.trim())
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

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_parse_csv_basic() {
        let m = parse_delimited(b"Name,Age,City\nAlice,30,NYC\nBob,25,LA", Delimiter::Comma);
        assert_eq!(m.len(), 3);
        assert_eq!(m[1][0], text("Alice"));
        assert_eq!(m[1][1], CellValue::Number(30.0));
        assert_eq!(m[2][2], text("LA"));
    }

    #[test]
    fn test_parse_tsv() {
        let m = parse_delimited(b"A\tB\r\n1\t2\r\n", Delimiter::Tab);
        assert_eq!(m.len(), 2);
        assert_eq!(m[1], vec![CellValue::Number(1.0), CellValue::Number(2.0)]);
    }

    #[test]
    fn test_quoted_csv() {
        let m = parse_delimited(
            b"\"Hello, World\",42\n\"She said \"\"hi\"\"\",0",
            Delimiter::Comma,
        );
        assert_eq!(m[0][0], text("Hello, World"));
        assert_eq!(m[1][0], text("She said \"hi\""));
    }

    #[test]
    fn test_quoted_line_break_stays_in_field() {
        let m = parse_delimited(b"\"Total\nQty\",x\n5,y", Delimiter::Comma);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0][0], text("Total\nQty"));
    }

    #[test]
    fn test_codes_keep_leading_zeros() {
        let m = parse_delimited(b"0101,1.50,7", Delimiter::Comma);
        assert_eq!(m[0][0], text("0101"));
        assert_eq!(m[0][1], text("1.50"));
        assert_eq!(m[0][2], CellValue::Number(7.0));
    }

    #[test]
    fn test_blank_lines_and_bom() {
        let m = parse_delimited("\u{feff}a,b\n\n,\n".as_bytes(), Delimiter::Comma);
        assert_eq!(m.len(), 3);
        assert_eq!(m[0][0], text("a"));
        assert_eq!(m[1], vec![CellValue::Empty]);
        assert_eq!(m[2], vec![CellValue::Empty, CellValue::Empty]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_delimited(b"", Delimiter::Comma).is_empty());
    }

    #[test]
    fn test_sniff() {
        assert_eq!(Delimiter::sniff(b"a\tb,c\td"), Delimiter::Tab);
        assert_eq!(Delimiter::sniff(b"plain"), Delimiter::Comma);
    }
}

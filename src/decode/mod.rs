//! File bytes → raw cell matrix.
//!
//! Reads the first worksheet of an XLSX package, or a CSV/TSV text file. Only cell
//! values are read; styles, formulas and every other sheet are ignored.

mod csv;
mod xlsx;

pub use self::csv::{parse_delimited, Delimiter};

use crate::error::{GridError, Result};
use crate::types::CellMatrix;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Detected input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Xlsx,
    Delimited(Delimiter),
}

impl FileFormat {
    /// Sniff the format from the leading bytes, using the file name as a hint for text.
    ///
    /// # Errors
    /// [`GridError::UnsupportedFormat`] for empty input, legacy binary workbooks and
    /// anything else that is neither a ZIP package nor text.
    pub fn detect(data: &[u8], file_name: Option<&str>) -> Result<Self> {
        if data.is_empty() {
            return Err(GridError::UnsupportedFormat("empty file".to_string()));
        }
        if data.starts_with(ZIP_MAGIC) {
            return Ok(Self::Xlsx);
        }

        let ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsx" | "xlsm" | "xls") => {
                return Err(GridError::UnsupportedFormat(
                    "workbook is not an XLSX (ZIP) package".to_string(),
                ));
            }
            Some("tsv" | "tab") => return Ok(Self::Delimited(Delimiter::Tab)),
            Some("csv") => return Ok(Self::Delimited(Delimiter::Comma)),
            _ => {}
        }

        if data.contains(&0) {
            return Err(GridError::UnsupportedFormat("binary data".to_string()));
        }
        Ok(Self::Delimited(Delimiter::sniff(data)))
    }
}

/// Decode file bytes into a matrix of cells.
///
/// # Errors
/// Format detection failures, and ZIP or XML errors from malformed workbooks.
pub fn decode(data: &[u8], file_name: Option<&str>) -> Result<CellMatrix> {
    let format = FileFormat::detect(data, file_name)?;
    let matrix = match format {
        FileFormat::Xlsx => xlsx::read_first_sheet(data)?,
        FileFormat::Delimited(delim) => csv::parse_delimited(data, delim),
    };
    tracing::debug!(?format, rows = matrix.len(), "decoded file");
    Ok(matrix)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::CellValue;

    #[test]
    fn test_detect_zip() {
        assert_eq!(
            FileFormat::detect(b"PK\x03\x04rest", Some("a.csv")).unwrap(),
            FileFormat::Xlsx
        );
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            FileFormat::detect(b"a,b", Some("data.TSV")).unwrap(),
            FileFormat::Delimited(Delimiter::Tab)
        );
        assert!(matches!(
            FileFormat::detect(b"\xD0\xCF\x11\xE0", Some("old.xls")),
            Err(GridError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_detect_sniffs_text() {
        assert_eq!(
            FileFormat::detect(b"a\tb\n1\t2", None).unwrap(),
            FileFormat::Delimited(Delimiter::Tab)
        );
        assert_eq!(
            FileFormat::detect(b"a,b\n1,2", None).unwrap(),
            FileFormat::Delimited(Delimiter::Comma)
        );
    }

    #[test]
    fn test_detect_rejects_empty_and_binary() {
        assert!(FileFormat::detect(b"", None).is_err());
        assert!(FileFormat::detect(b"\x00\x01\x02", None).is_err());
    }

    #[test]
    fn test_decode_csv() {
        let m = decode(b"HS Code,Qty\n8471,5\n", Some("inv.csv")).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m[1][1], CellValue::Number(5.0));
    }

    #[test]
    fn test_decode_truncated_zip() {
        let err = decode(b"PK\x03\x04garbage", None).unwrap_err();
        assert!(matches!(err, GridError::Zip(_)));
    }
}

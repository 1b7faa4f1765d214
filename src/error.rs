//! Structured error types for sheetgrid.
//!
//! Every fallible engine operation returns [`Result`]. Numeric parse failures are
//! never errors: derived fields treat malformed input as zero (see [`crate::derived`]).

/// All errors that can occur while decoding, ingesting or editing a table.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// The header row had no labels at all.
    #[error("Header row is empty")]
    EmptyHeaderRow,

    /// No row contained the header marker.
    #[error("Header row not found (marker {marker:?})")]
    HeaderRowNotFound { marker: String },

    /// A fixed header row index pointed past the end of the matrix.
    #[error("Header row {index} is out of bounds ({rows} rows)")]
    HeaderRowOutOfBounds { index: usize, rows: usize },

    /// A row index outside `[0, len)`.
    #[error("Row index {index} out of range (row count {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A column key that does not exist in the current table.
    #[error("Unknown column: {key}")]
    UnknownColumn { key: String },

    /// A write aimed at a derived (calculated) column.
    #[error("Column {key} is calculated and cannot be edited")]
    ColumnNotEditable { key: String },

    /// A derived-field registry whose formulas cannot be evaluated in one pass.
    #[error("Invalid derived field registry: {0}")]
    InvalidRegistry(String),

    /// File bytes that are neither XLSX nor delimited text.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// XML parsing error from quick-xml.
    #[error("XML parsing: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error.
    #[error("ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or serialization error.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for string errors.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GridError>;

impl GridError {
    /// Ingestion failures the user can recover from by uploading another file.
    #[must_use]
    pub fn is_recoverable_ingest(&self) -> bool {
        matches!(
            self,
            Self::EmptyHeaderRow
                | Self::HeaderRowNotFound { .. }
                | Self::HeaderRowOutOfBounds { .. }
                | Self::UnsupportedFormat(_)
                | Self::Xml(_)
                | Self::Zip(_)
        )
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

#[cfg(target_arch = "wasm32")]
impl From<GridError> for wasm_bindgen::JsValue {
    fn from(e: GridError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GridError::IndexOutOfRange { index: 5, len: 3 };
        assert_eq!(err.to_string(), "Row index 5 out of range (row count 3)");

        let err = GridError::HeaderRowNotFound {
            marker: "hs code".into(),
        };
        assert_eq!(err.to_string(), "Header row not found (marker \"hs code\")");
    }

    #[test]
    fn test_recoverable_ingest() {
        assert!(GridError::EmptyHeaderRow.is_recoverable_ingest());
        assert!(!GridError::UnknownColumn { key: "x".into() }.is_recoverable_ingest());
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: GridError = err.into();
        assert!(matches!(err, GridError::Json(_)));
    }
}

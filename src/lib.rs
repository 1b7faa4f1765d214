//! sheetgrid - editable spreadsheet grid engine for the web
//!
//! Turns an uploaded sheet into an editable table via WebAssembly:
//! - Header labels normalized into stable column keys
//! - Calculated columns kept consistent under single-cell edits
//! - One edit session at a time (begin / change / commit / cancel)
//! - Row virtualization for large tables
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { SheetGrid } from 'sheetgrid';
//! await init();
//! const grid = new SheetGrid();
//! grid.loadFile(bytes, file.name);
//! grid.onChange(() => render(grid.rowsInWindow()));
//! ```
//!
//! # Usage (Rust)
//!
//! ```
//! use sheetgrid::{ingest, CellValue, DerivedRegistry, HeaderLocator, RowStore};
//!
//! let matrix: Vec<Vec<CellValue>> = vec![
//!     vec!["HS Code".into(), "Rate in USD".into(), "Total No of Boxes".into(), "Total Qty".into()],
//!     vec!["8471".into(), 10.into(), 2.into(), 5.into()],
//! ];
//! let registry = DerivedRegistry::invoice();
//! let table = ingest(&matrix, &HeaderLocator::default(), &registry).unwrap();
//!
//! let mut store = RowStore::new(registry);
//! store.load(table);
//! assert_eq!(store.value(0, "net_amount"), Some(&CellValue::Number(85.0)));
//! ```

// Engine
pub mod derived;
pub mod editor;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod schema;
pub mod store;
pub mod types;

// Input, configuration and the JS-facing facade
pub mod config;
pub mod decode;
pub mod grid;

use wasm_bindgen::prelude::*;

pub use config::EngineConfig;
pub use decode::decode;
pub use derived::{evaluate, DerivedFieldSpec, DerivedRegistry, Formula};
pub use editor::{BeginOutcome, Direction, EditSession, EditSessionManager, EditState, SwitchPolicy};
pub use error::{GridError, Result};
pub use grid::SheetGrid;
pub use ingest::{ingest, HeaderLocator};
pub use layout::{visible_window, Viewport, VirtualWindow};
pub use schema::{normalize_headers, normalize_key};
pub use store::{RowStore, StoreEvent, SubscriptionId, UpdateOutcome};
pub use types::*;

/// Decode a file and return its ingested table as JSON (columns, rows, revision).
///
/// # Errors
/// Returns an error if the file cannot be decoded or has no recognizable header row.
#[wasm_bindgen(js_name = "parseTable")]
pub fn parse_table(data: &[u8], file_name: Option<String>) -> std::result::Result<String, JsValue> {
    let config = EngineConfig::default();
    let matrix =
        decode(data, file_name.as_deref()).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let table = ingest(&matrix, &config.header, &config.derived)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    serde_json::to_string(&table)
        .map_err(|e| JsValue::from_str(&format!("JSON serialization error: {e}")))
}

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

//! Data types for the grid engine.

mod cell;
mod column;
mod row;
mod table;

pub use cell::*;
pub use column::*;
pub use row::*;
pub use table::*;

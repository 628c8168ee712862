//! Secondary data sources feeding the pipeline alongside the analytics API.

pub mod sheets;

pub use sheets::{a1_range, SheetTable, SheetsClient};

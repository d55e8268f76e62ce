mod catalog;
mod extract;
mod join;

pub use catalog::{Category, CategorySpec, PartsSpec, TableSpec};
pub use extract::{extract_table, Extraction, FieldExtraction};
pub use join::{index_by, records_of};

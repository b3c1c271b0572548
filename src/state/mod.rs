/// Catalog state
///
/// This module holds everything persisted about slides:
/// - The SQLite catalog and its queries (catalog.rs)
/// - Row types shared with callers (data.rs)
/// - Column mapping and DDL for each table (schema.rs)

pub mod catalog;
pub mod data;
pub mod schema;

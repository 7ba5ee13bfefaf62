//! Schema Builder & Pusher (§4.4).

pub mod catalog;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod push;

pub use catalog::{describe_database, CatalogSnapshot, LiveColumn, LiveIndex, TableSnapshot};
pub use ddl::{index_name, infer_storage_type, render_create_table, render_indexes, StorageType};
pub use diff::{diff as diff_table, SchemaDiff, TableDiff};
pub use error::{SchemaError, SchemaResult};
pub use push::push;

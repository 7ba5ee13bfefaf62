//! Facade crate: wires the Model Inspector, Code Generator, Schema
//! Builder/Pusher, and Backend into the two entry points an (out-of-scope)
//! CLI driver would call — `generate` and `push_db` (§6 "Command surface").
//!
//! The driver itself (argument parsing, loading models by file path,
//! writing the generated module to a package location, logging setup) is
//! explicitly out of scope (§1); these two functions take an in-process
//! model list instead of a file path and return the generated text /
//! schema diff directly rather than performing file I/O.

pub mod error;

pub use error::{OrmForgeError, OrmForgeResult};

pub use ormforge_codegen::generate_module;
pub use ormforge_inspect::inspect;
pub use ormforge_macros::Model;
pub use ormforge_models::{
    self as models, Cardinality, ColumnInfo, DataSourceConfig, DynModel, EnumCodec, EnumColumn,
    ErrorContext, FieldKind, FieldSpec, ForeignKeyInfo, ModelError, ModelGraph, ModelInfo,
    PROVIDER_SQLITE, RelationInfo, ScalarLiteral,
};
pub use ormforge_query::{
    Backend, ConnectionSource, FromScalar, IdentityMap, LazyRelation, PooledFactory, Query,
    QueryError, Row, Scalar, SingleConnection, ToScalar,
};
pub use ormforge_query::backend::composite_key;
pub use ormforge_query::where_compiler::{Direction, FieldFilter, Filter, OrderBy, RelationFilterKind};
pub use ormforge_schema::{SchemaDiff, SchemaError, TableDiff};

use rusqlite::Connection;

/// Inspects `models`, then emits the generated client module text for one
/// datasource (§4.3). Deterministic: the same inspected graph always
/// yields byte-identical text (§3 invariant, §8 "Deterministic codegen").
pub fn generate(
    models: Vec<Box<dyn DynModel>>,
    datasources: Vec<DataSourceConfig>,
    datasource_key: &str,
) -> OrmForgeResult<String> {
    let graph = inspect(models, datasources)?;
    Ok(generate_module(&graph, datasource_key))
}

/// Opens a connection for `datasource_key` and reconciles the live schema
/// with the declared models (§4.4). Only the embedded sqlite provider is
/// currently supported (§1, §6); any other provider is rejected up front.
pub fn push_db(
    models: Vec<Box<dyn DynModel>>,
    datasources: Vec<DataSourceConfig>,
    datasource_key: &str,
    confirm_rebuild: impl Fn(&TableDiff) -> bool,
    sync_indexes: bool,
) -> OrmForgeResult<SchemaDiff> {
    let graph = inspect(models, datasources)?;
    let ds = graph
        .data_sources
        .get(datasource_key)
        .ok_or_else(|| OrmForgeError::UnknownDatasource(datasource_key.to_string()))?;
    let mut conn = open_connection(ds)?;
    let diff = ormforge_schema::push(&mut conn, &graph, datasource_key, confirm_rebuild, sync_indexes)?;
    Ok(diff)
}

/// Opens the sqlite connection named by a `DataSourceConfig`'s
/// `<provider>:///<path>` URL (§6), treating a path of `:memory:` as an
/// in-memory database.
fn open_connection(ds: &DataSourceConfig) -> OrmForgeResult<Connection> {
    if ds.provider != PROVIDER_SQLITE {
        return Err(OrmForgeError::UnsupportedProvider(ds.provider.clone()));
    }
    let path = DataSourceConfig::parse_url(&ds.provider, &ds.url)
        .ok_or_else(|| OrmForgeError::UnsupportedProvider(ds.url.clone()))?;
    let conn = if path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(&path)?
    };
    Ok(conn)
}

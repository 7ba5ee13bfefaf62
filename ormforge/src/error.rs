//! Top-level error rolling up every subsystem's error category (§7), so the
//! two facade entry points have a single `Result` type. The CLI driver
//! (out of scope) is expected to match on the inner variant and map it to
//! an exit code.

use ormforge_models::ModelError;
use ormforge_query::QueryError;
use ormforge_schema::SchemaError;

#[derive(Debug, thiserror::Error)]
pub enum OrmForgeError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("provider `{0}` is not supported")]
    UnsupportedProvider(String),

    #[error("datasource `{0}` has no matching `DataSourceConfig`")]
    UnknownDatasource(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type OrmForgeResult<T> = Result<T, OrmForgeError>;

//! Query-time failure modes (§4.6, §7).

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unknown filter key `{key}` on `{model}`")]
    InvalidFilter { model: String, key: String },

    #[error("`{kind}` filters only apply to many relations (`{relation}` on `{model}`)")]
    RelationFilterCardinality {
        model: String,
        relation: String,
        kind: &'static str,
    },

    #[error("unique constraint violated on `{table}`: {reason}")]
    IntegrityViolation { table: String, reason: String },

    #[error("relation `{relation}` on `{model}` could not be resolved: foreign-key target missing")]
    RelationUnresolvable { model: String, relation: String },

    #[error("table `{0}` does not exist (schema drift)")]
    NoSuchTable(String),

    #[error("column decode error: {0}")]
    TypeMismatch(String),

    #[error("connection accessed across thread boundaries without a factory")]
    ConnectionUsageError,

    #[error("connection was closed")]
    ConnectionClosed,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type QueryResult<T> = Result<T, QueryError>;

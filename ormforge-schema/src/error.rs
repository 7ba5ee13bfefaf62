//! Schema-time failure modes (§4.4, §7).

use ormforge_models::ErrorContext;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("column `{table}.{column}` has no storage mapping: {reason}")]
    SchemaInferenceError {
        table: String,
        column: String,
        reason: String,
        context: ErrorContext,
    },

    #[error(
        "pushing `{table}` requires a rebuild (dropped: {dropped:?}, changed: {changed:?}, pk_changed: {pk_changed}); \
         pass confirm_rebuild to proceed"
    )]
    RebuildRejected {
        table: String,
        dropped: Vec<String>,
        changed: Vec<String>,
        pk_changed: bool,
    },

    #[error("provider `{0}` is not supported")]
    UnsupportedProvider(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

//! Shared error categories (§7). Every variant carries a human-readable
//! message plus a structured context map a caller can pattern-match on
//! without parsing the message.

use std::collections::BTreeMap;
use std::fmt;

/// Structured context attached to an error: model/column/relation names
/// involved, so callers don't have to scrape the display string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext(BTreeMap<&'static str, String>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Model-time errors: raised while probing fake-self methods or inspecting
/// a set of record classes (§4.1, §4.2, §7).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model `{model}` references unknown model `{target}` ({context})")]
    UnknownModelReference {
        model: String,
        target: String,
        context: ErrorContext,
    },

    #[error("ambiguous foreign key on `{model}`: {reason} ({context})")]
    AmbiguousForeignKey {
        model: String,
        reason: String,
        context: ErrorContext,
    },

    #[error("model `{model}` has no primary key ({context})")]
    MissingPrimaryKey {
        model: String,
        context: ErrorContext,
    },

    #[error("models `{first}` and `{second}` both map to table `{table}` in datasource `{datasource}`")]
    DuplicateTable {
        first: String,
        second: String,
        table: String,
        datasource: String,
    },

    #[error("probe failed for `{model}::{method}`: {reason} ({context})")]
    ProbeError {
        model: String,
        method: &'static str,
        reason: String,
        context: ErrorContext,
    },
}

pub type ModelResult<T> = Result<T, ModelError>;

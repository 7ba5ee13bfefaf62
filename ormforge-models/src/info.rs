//! §3 Data Model: the normalized graph the Model Inspector produces and
//! every other component consumes.

use indexmap::IndexMap;

use crate::field::{Cardinality, EnumMapping};
use crate::reflect::ColumnRef;
use crate::type_render::RustType;

/// §3 `ColumnInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub rust_type: RustType,
    pub nullable: bool,
    pub default_present: bool,
    pub default_is_factory: bool,
    pub is_autoincrement_pk: bool,
    pub enum_mapping: Option<EnumMapping>,
}

/// §3 `RelationInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub attr_name: String,
    pub target_model: String,
    pub cardinality: Cardinality,
    pub backref_name: Option<String>,
    pub via_foreign_key: bool,
}

/// §3 `ForeignKeyInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub from_model: String,
    pub from_columns: Vec<String>,
    pub to_model: String,
    pub to_columns: Vec<String>,
    pub local_relation_attr: String,
    pub remote_relation_attr: String,
}

/// §3 `DataSourceConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceConfig {
    pub key: String,
    pub provider: String,
    pub url: String,
}

/// Provider restricted, per spec §6, to the embedded SQL store.
pub const PROVIDER_SQLITE: &str = "sqlite";

impl DataSourceConfig {
    /// Parses the `<provider>:///<path>` URL form (§6).
    pub fn parse_url(provider: &str, url: &str) -> Option<String> {
        let prefix = format!("{provider}:///");
        url.strip_prefix(&prefix).map(str::to_string)
    }
}

/// §3 `ModelInfo`. Built once per `generate` invocation by the Model
/// Inspector; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<(Vec<String>, bool)>,
    pub relations: Vec<RelationInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub datasource_key: String,
}

impl ModelInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, attr_name: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.attr_name == attr_name)
    }

    pub fn foreign_key_for_relation(&self, attr_name: &str) -> Option<&ForeignKeyInfo> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.local_relation_attr == attr_name)
    }

    pub fn scalar_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn include_relation_names(&self) -> Vec<&str> {
        self.relations.iter().map(|r| r.attr_name.as_str()).collect()
    }

    pub fn autoincrement_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.is_autoincrement_pk)
    }
}

/// Resolved `ColumnRef` helper: looks a ref up against an `IndexMap` of
/// model name to `ModelInfo`, used when binding foreign-key comparisons to
/// concrete columns (§4.2).
pub fn resolve_column<'a>(
    models: &'a IndexMap<String, ModelInfo>,
    col: &ColumnRef,
) -> Option<&'a ColumnInfo> {
    models.get(col.owner).and_then(|m| m.column(col.field))
}

/// The full output of one Model Inspector run (§4.2 contract:
/// `inspect(models) -> {data_sources, models_by_name}`).
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    pub data_sources: IndexMap<String, DataSourceConfig>,
    pub models: IndexMap<String, ModelInfo>,
}

impl ModelGraph {
    pub fn models_in(&self, datasource_key: &str) -> Vec<&ModelInfo> {
        self.models
            .values()
            .filter(|m| m.datasource_key == datasource_key)
            .collect()
    }
}

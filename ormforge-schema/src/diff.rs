//! Diffing a declared model against its live table snapshot (§4.4).

use ormforge_models::ModelInfo;

use crate::catalog::TableSnapshot;
use crate::ddl::{index_name, infer_storage_type};

/// What changed between a declared table and its live counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub table: String,
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub changed_columns: Vec<String>,
    pub added_indexes: Vec<(Vec<String>, bool)>,
    pub removed_indexes: Vec<String>,
    pub requires_rebuild: bool,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
    }
}

/// The full schema-wide result of a push (§4.4 `SchemaDiff`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub created_tables: Vec<String>,
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.created_tables.is_empty()
            && self.table_diffs.iter().all(TableDiff::is_empty)
    }
}

/// Compares one declared model's shape to its live table (§4.4: "removed,
/// type-changed, or primary key changed" triggers `requires_rebuild`).
pub fn diff(declared: &ModelInfo, live: &TableSnapshot) -> TableDiff {
    let mut d = TableDiff {
        table: declared.table_name.clone(),
        ..Default::default()
    };

    let declared_pk: std::collections::BTreeSet<&str> =
        declared.primary_key.iter().map(String::as_str).collect();
    let live_pk: std::collections::BTreeSet<&str> = live
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();
    let mut pk_changed = declared_pk != live_pk;

    for col in &declared.columns {
        match live.columns.iter().find(|c| c.name == col.name) {
            None => d.added_columns.push(col.name.clone()),
            Some(live_col) => {
                let expected_ty = infer_storage_type(col).as_sql();
                let type_changed = expected_ty != live_col.storage_type;
                let nullability_changed = live_col.not_null == col.nullable;
                if type_changed || nullability_changed {
                    d.changed_columns.push(col.name.clone());
                }
                if type_changed {
                    pk_changed = pk_changed || col.is_autoincrement_pk != live_col.primary_key;
                }
            }
        }
    }
    for live_col in &live.columns {
        if !declared.columns.iter().any(|c| c.name == live_col.name) {
            d.removed_columns.push(live_col.name.clone());
        }
    }

    let declared_index_names: std::collections::BTreeSet<String> = declared
        .indexes
        .iter()
        .map(|(cols, _)| index_name(&declared.table_name, cols))
        .collect();
    for (cols, unique) in &declared.indexes {
        let name = index_name(&declared.table_name, cols);
        if !live.indexes.iter().any(|i| i.name == name) {
            d.added_indexes.push((cols.clone(), *unique));
        }
    }
    for live_idx in &live.indexes {
        if !declared_index_names.contains(&live_idx.name) {
            d.removed_indexes.push(live_idx.name.clone());
        }
    }

    d.requires_rebuild =
        !d.removed_columns.is_empty() || !d.changed_columns.is_empty() || pk_changed;
    d
}

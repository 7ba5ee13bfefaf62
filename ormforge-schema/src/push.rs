//! Apply rules (§4.4): create missing tables, rebuild changed ones behind a
//! confirmation callback, and align indexes.

use ormforge_models::ModelGraph;
use rusqlite::Connection;
use tracing::info;

use crate::catalog::describe_database;
use crate::ddl::{render_create_table, render_indexes};
use crate::diff::{diff, SchemaDiff, TableDiff};
use crate::error::{SchemaError, SchemaResult};

/// Pushes every model in `graph`'s chosen datasource against the live
/// database reachable through `conn`. `confirm_rebuild` is consulted only
/// when a table's diff requires one; `sync_indexes` additionally drops live
/// indexes absent from the declared set.
///
/// Acquires an exclusive transaction for the duration of the push (§5:
/// "Schema push acquires an exclusive write transaction for the duration of
/// a rebuild"), so concurrent pushers against the same database serialize.
pub fn push(
    conn: &mut Connection,
    graph: &ModelGraph,
    datasource_key: &str,
    confirm_rebuild: impl Fn(&TableDiff) -> bool,
    sync_indexes: bool,
) -> SchemaResult<SchemaDiff> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive)?;
    let mut result = SchemaDiff::default();

    let catalog = describe_database(&tx)?;
    let models = graph.models_in(datasource_key);

    for model in models {
        match catalog.tables.get(&model.table_name) {
            None => {
                tx.execute_batch(&render_create_table(model))?;
                for stmt in render_indexes(model) {
                    tx.execute_batch(&stmt)?;
                }
                info!(table = %model.table_name, "created table");
                result.created_tables.push(model.table_name.clone());
            }
            Some(live) => {
                let table_diff = diff(model, live);
                if table_diff.is_empty() {
                    continue;
                }
                if table_diff.requires_rebuild {
                    if !confirm_rebuild(&table_diff) {
                        return Err(SchemaError::RebuildRejected {
                            table: model.table_name.clone(),
                            dropped: table_diff.removed_columns.clone(),
                            changed: table_diff.changed_columns.clone(),
                            pk_changed: table_diff.requires_rebuild
                                && table_diff.changed_columns.is_empty()
                                && table_diff.removed_columns.is_empty(),
                        });
                    }
                    rebuild_table(&tx, model, live)?;
                    info!(table = %model.table_name, "rebuilt table");
                } else {
                    for col in &table_diff.added_columns {
                        let column = model.column(col).expect("added column must be declared");
                        let ty = crate::ddl::infer_storage_type(column).as_sql();
                        let null_clause = if column.nullable { "" } else { " NOT NULL" };
                        tx.execute_batch(&format!(
                            "ALTER TABLE \"{}\" ADD COLUMN \"{col}\" {ty}{null_clause}",
                            model.table_name
                        ))?;
                    }
                }

                for (cols, _) in &table_diff.added_indexes {
                    let name = crate::ddl::index_name(&model.table_name, cols);
                    let unique = model
                        .indexes
                        .iter()
                        .find(|(c, _)| c == cols)
                        .map(|(_, u)| *u)
                        .unwrap_or(false);
                    let kw = if unique { "UNIQUE INDEX" } else { "INDEX" };
                    let col_list = cols
                        .iter()
                        .map(|c| format!("\"{c}\""))
                        .collect::<Vec<_>>()
                        .join(", ");
                    tx.execute_batch(&format!(
                        "CREATE {kw} \"{name}\" ON \"{}\" ({col_list})",
                        model.table_name
                    ))?;
                }
                if sync_indexes {
                    for name in &table_diff.removed_indexes {
                        tx.execute_batch(&format!("DROP INDEX \"{name}\""))?;
                    }
                }

                result.table_diffs.push(table_diff);
            }
        }
    }

    tx.commit()?;
    Ok(result)
}

/// Creates a temp table with the new shape, copies intersecting columns,
/// drops the original, renames (§4.4's rebuild preservation rule).
fn rebuild_table(
    tx: &rusqlite::Transaction<'_>,
    model: &ormforge_models::ModelInfo,
    live: &crate::catalog::TableSnapshot,
) -> SchemaResult<()> {
    let tmp_name = format!("{}__ormforge_rebuild", model.table_name);
    let mut tmp_model = model.clone();
    tmp_model.table_name = tmp_name.clone();
    tx.execute_batch(&render_create_table(&tmp_model))?;

    let shared: Vec<&str> = model
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| live.columns.iter().any(|lc| &lc.name == name))
        .collect();
    if !shared.is_empty() {
        let col_list = shared
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute_batch(&format!(
            "INSERT INTO \"{tmp_name}\" ({col_list}) SELECT {col_list} FROM \"{}\"",
            model.table_name
        ))?;
    }

    tx.execute_batch(&format!("DROP TABLE \"{}\"", model.table_name))?;
    tx.execute_batch(&format!(
        "ALTER TABLE \"{tmp_name}\" RENAME TO \"{}\"",
        model.table_name
    ))?;

    for stmt in render_indexes(model) {
        tx.execute_batch(&stmt)?;
    }
    Ok(())
}

//! Live catalog introspection, narrowed from `sql-schema-describer`'s
//! `SqlSchema` shape to what sqlite's `PRAGMA` family exposes.

use rusqlite::Connection;

use crate::error::SchemaResult;

/// One column as the live database actually declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub storage_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// One index as the live database declares it, with its member columns in
/// `PRAGMA index_info` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Everything `diff` needs about one live table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    pub columns: Vec<LiveColumn>,
    pub indexes: Vec<LiveIndex>,
}

/// The live catalog for every user table in the database (`sqlite_master`
/// rows whose type is `table`, excluding sqlite's own bookkeeping tables).
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub tables: std::collections::BTreeMap<String, TableSnapshot>,
}

pub fn describe_database(conn: &Connection) -> SchemaResult<CatalogSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let table_names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut tables = std::collections::BTreeMap::new();
    for table in table_names {
        tables.insert(table.clone(), describe_table(conn, &table)?);
    }
    Ok(CatalogSnapshot { tables })
}

fn describe_table(conn: &Connection, table: &str) -> SchemaResult<TableSnapshot> {
    let mut col_stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns: Vec<LiveColumn> = col_stmt
        .query_map([], |row| {
            Ok(LiveColumn {
                name: row.get(1)?,
                storage_type: row.get::<_, String>(2)?.to_uppercase(),
                not_null: row.get::<_, i64>(3)? != 0,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<_, _>>()?;
    drop(col_stmt);

    let mut idx_stmt = conn.prepare(&format!("PRAGMA index_list({})", quote_ident(table)))?;
    let idx_rows: Vec<(String, bool, String)> = idx_stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, i64>(2)? != 0, row.get::<_, String>(3)?))
        })?
        .collect::<Result<_, _>>()?;
    drop(idx_stmt);

    let mut indexes = Vec::new();
    for (name, unique, origin) in idx_rows {
        // Skip the implicit index sqlite creates for an inline
        // `PRIMARY KEY AUTOINCREMENT`/`UNIQUE` declaration ("u"/"pk" origin);
        // declared indexes and constraints are what §4.4's diff compares.
        if origin == "pk" {
            continue;
        }
        let mut info_stmt =
            conn.prepare(&format!("PRAGMA index_info({})", quote_ident(&name)))?;
        let columns: Vec<String> = info_stmt
            .query_map([], |row| row.get(2))?
            .collect::<Result<_, _>>()?;
        indexes.push(LiveIndex {
            name,
            columns,
            unique,
        });
    }

    Ok(TableSnapshot { columns, indexes })
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

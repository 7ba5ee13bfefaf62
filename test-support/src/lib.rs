//! Test-only assertion builders, mirroring the fluent `SchemaPush` /
//! `SchemaPushAssertion` shape used throughout this workspace's own test
//! suites: a builder that configures and sends one operation, returning an
//! assertion object whose methods consume and return `self` for chaining.

use ormforge_models::ModelGraph;
use ormforge_schema::{SchemaDiff, SchemaError, TableDiff};
use rusqlite::Connection;

/// Opens a fresh, empty in-memory database for one test.
pub fn memory_db() -> Connection {
    Connection::open_in_memory().expect("open in-memory sqlite connection")
}

pub struct SchemaPush<'a> {
    conn: &'a mut Connection,
    graph: &'a ModelGraph,
    datasource_key: &'a str,
    confirm_rebuild: bool,
    sync_indexes: bool,
}

impl<'a> SchemaPush<'a> {
    pub fn new(conn: &'a mut Connection, graph: &'a ModelGraph, datasource_key: &'a str) -> Self {
        SchemaPush {
            conn,
            graph,
            datasource_key,
            confirm_rebuild: false,
            sync_indexes: false,
        }
    }

    pub fn confirm_rebuild(mut self, confirm: bool) -> Self {
        self.confirm_rebuild = confirm;
        self
    }

    pub fn sync_indexes(mut self, sync: bool) -> Self {
        self.sync_indexes = sync;
        self
    }

    /// Sends the push and expects it to succeed.
    #[track_caller]
    pub fn send(self) -> SchemaPushAssertion {
        let confirm = self.confirm_rebuild;
        let result = ormforge_schema::push(
            self.conn,
            self.graph,
            self.datasource_key,
            |_| confirm,
            self.sync_indexes,
        )
        .expect("schema push failed");
        SchemaPushAssertion { result }
    }

    /// Sends the push and expects it to fail, returning the error.
    #[track_caller]
    pub fn send_unwrap_err(self) -> SchemaError {
        let confirm = self.confirm_rebuild;
        ormforge_schema::push(
            self.conn,
            self.graph,
            self.datasource_key,
            |_| confirm,
            self.sync_indexes,
        )
        .expect_err("expected schema push to fail")
    }
}

pub struct SchemaPushAssertion {
    result: SchemaDiff,
}

impl SchemaPushAssertion {
    #[track_caller]
    pub fn assert_created(self, tables: &[&str]) -> Self {
        assert_eq!(
            self.result.created_tables, tables,
            "expected created tables {tables:?}, got {:?}",
            self.result.created_tables
        );
        self
    }

    #[track_caller]
    pub fn assert_no_diff(self) -> Self {
        assert!(
            self.result.is_empty(),
            "expected an empty diff, got {:?}",
            self.result
        );
        self
    }

    #[track_caller]
    pub fn assert_table_diff(self, table: &str, check: impl FnOnce(&TableDiff)) -> Self {
        let diff = self
            .result
            .table_diffs
            .iter()
            .find(|d| d.table == table)
            .unwrap_or_else(|| panic!("no diff recorded for table `{table}`"));
        check(diff);
        self
    }

    pub fn into_diff(self) -> SchemaDiff {
        self.result
    }
}

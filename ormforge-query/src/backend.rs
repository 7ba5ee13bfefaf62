//! Backend (§4.6): synchronous CRUD execution over one model's table, with
//! an identity map scoped to a single query batch and lazy relation state
//! backed by `OnceCell` (§9 "resolved or single-shot query").
//!
//! `Backend` owns its connection source and graph (`Arc`-shared rather than
//! borrowed) so a `LazyRelation::deferred` resolver built from one can
//! outlive the call that built it — the whole point of a relation that
//! resolves on first access instead of at query time.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::info;

use ormforge_models::{ModelGraph, ModelInfo, ReflectedModel};

use crate::error::{QueryError, QueryResult};
use crate::where_compiler::{compile, Direction, Filter, OrderBy};

/// A column value on its way into or out of storage. `rusqlite::types::Value`
/// already has the shape every storage class needs (§4.4's type list), so
/// this wraps it rather than reinventing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar(pub Value);

impl Scalar {
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Implemented for every Rust type a generated column can hold, so the
/// macro-emitted serializer can write `Scalar::from(&v.field)` without
/// matching on the field's type itself.
pub trait ToScalar {
    fn to_scalar(&self) -> Scalar;
}

macro_rules! impl_to_scalar_int {
    ($($t:ty),*) => {
        $(impl ToScalar for $t {
            fn to_scalar(&self) -> Scalar { Scalar(Value::Integer(*self as i64)) }
        })*
    };
}
impl_to_scalar_int!(i8, i16, i32, i64, u8, u16, u32, isize, usize);

impl ToScalar for f32 {
    fn to_scalar(&self) -> Scalar {
        Scalar(Value::Real(*self as f64))
    }
}
impl ToScalar for f64 {
    fn to_scalar(&self) -> Scalar {
        Scalar(Value::Real(*self))
    }
}
impl ToScalar for bool {
    fn to_scalar(&self) -> Scalar {
        Scalar(Value::Integer(if *self { 1 } else { 0 }))
    }
}
impl ToScalar for String {
    fn to_scalar(&self) -> Scalar {
        Scalar(Value::Text(self.clone()))
    }
}
impl ToScalar for Vec<u8> {
    fn to_scalar(&self) -> Scalar {
        Scalar(Value::Blob(self.clone()))
    }
}
impl<T: ToScalar> ToScalar for Option<T> {
    fn to_scalar(&self) -> Scalar {
        match self {
            Some(v) => v.to_scalar(),
            None => Scalar(Value::Null),
        }
    }
}

impl<T: ToScalar> From<&T> for Scalar {
    fn from(value: &T) -> Self {
        value.to_scalar()
    }
}

/// Implemented for every Rust type a generated column can decode into, the
/// counterpart to `ToScalar` used by the macro-emitted deserializer.
pub trait FromScalar: Sized {
    fn from_scalar(value: &Value) -> QueryResult<Self>;
}

macro_rules! impl_from_scalar_int {
    ($($t:ty),*) => {
        $(impl FromScalar for $t {
            fn from_scalar(value: &Value) -> QueryResult<Self> {
                match value {
                    Value::Integer(i) => Ok(*i as $t),
                    other => Err(QueryError::TypeMismatch(format!("expected integer, found {other:?}"))),
                }
            }
        })*
    };
}
impl_from_scalar_int!(i8, i16, i32, i64, u8, u16, u32, isize, usize);

impl FromScalar for f64 {
    fn from_scalar(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Real(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(QueryError::TypeMismatch(format!("expected real, found {other:?}"))),
        }
    }
}
impl FromScalar for bool {
    fn from_scalar(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Integer(i) => Ok(*i != 0),
            other => Err(QueryError::TypeMismatch(format!("expected integer, found {other:?}"))),
        }
    }
}
impl FromScalar for String {
    fn from_scalar(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(QueryError::TypeMismatch(format!("expected text, found {other:?}"))),
        }
    }
}
impl<T: FromScalar> FromScalar for Option<T> {
    fn from_scalar(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_scalar(other).map(Some),
        }
    }
}

/// One decoded row, keyed by column name. `get`/`get_enum` panic-free decode
/// via `FromScalar`/`EnumCodec`; the macro-emitted deserializer is the only
/// caller that should need to reach for them directly.
#[derive(Debug, Clone, Default)]
pub struct Row(pub HashMap<String, Value>);

impl Row {
    pub fn get<T: FromScalar>(&self, name: &str) -> T {
        let value = self.0.get(name).cloned().unwrap_or(Value::Null);
        T::from_scalar(&value).unwrap_or_else(|e| panic!("column `{name}`: {e}"))
    }

    pub fn get_enum<T: ormforge_models::EnumCodec>(&self, name: &str) -> T {
        let value = self.0.get(name).cloned().unwrap_or(Value::Null);
        let literal = match value {
            Value::Integer(i) => ormforge_models::ScalarLiteral::Int(i),
            Value::Text(s) => ormforge_models::ScalarLiteral::Str(s),
            other => panic!("column `{name}`: enum column holds non-scalar value {other:?}"),
        };
        T::from_stored(&literal).unwrap_or_else(|| panic!("column `{name}`: no enum member stores {literal:?}"))
    }

    /// The raw stored value for `name`, `Value::Null` if absent. Used to
    /// build join keys for relation prefetch without going through a
    /// concrete `FromScalar` type.
    pub fn raw(&self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// A compiled query shape: a filter, sort order, and a page window (§4.6
/// `find_many(where?, include?, order_by?, take?, skip?)`). `include` is not
/// part of this type — it drives which relations the generated `{M}Table`
/// prefetches around a `Query`, not the `SELECT` itself.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

/// Abstracts over "how do I get a connection to run a statement on" (§5):
/// a single shared connection the caller must serialize access to, or a
/// per-thread pooled factory.
pub trait ConnectionSource {
    fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> QueryResult<R>) -> QueryResult<R>;
}

pub struct SingleConnection(std::sync::Mutex<Connection>);

impl SingleConnection {
    pub fn new(conn: Connection) -> Self {
        SingleConnection(std::sync::Mutex::new(conn))
    }
}

impl ConnectionSource for SingleConnection {
    fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> QueryResult<R>) -> QueryResult<R> {
        let guard = self.0.lock().map_err(|_| QueryError::ConnectionUsageError)?;
        f(&guard)
    }
}

pub struct PooledFactory(r2d2::Pool<SqliteConnectionManager>);

impl PooledFactory {
    pub fn new(pool: r2d2::Pool<SqliteConnectionManager>) -> Self {
        PooledFactory(pool)
    }
}

impl ConnectionSource for PooledFactory {
    fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> QueryResult<R>) -> QueryResult<R> {
        let conn = self.0.get()?;
        f(&conn)
    }
}

/// A relation slot backed by a single-shot resolver (§4.6 "Lazy
/// resolution"): resolved immediately when the owning query prefetched it
/// via `include`, otherwise resolved on first access.
pub struct LazyRelation<T> {
    cell: OnceCell<T>,
    resolver: RefCell<Option<Box<dyn FnOnce() -> QueryResult<T>>>>,
}

impl<T> LazyRelation<T> {
    pub fn resolved(value: T) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(value);
        LazyRelation {
            cell,
            resolver: RefCell::new(None),
        }
    }

    /// Builds a slot that issues exactly one query, the first time `.get()`
    /// is called on it. `resolver` must be `'static` because the slot can
    /// outlive the `find_many`/`find_first` call that produced it.
    pub fn deferred(resolver: impl FnOnce() -> QueryResult<T> + 'static) -> Self {
        LazyRelation {
            cell: OnceCell::new(),
            resolver: RefCell::new(Some(Box::new(resolver))),
        }
    }

    /// Consults existing state; otherwise runs the single-shot resolver and
    /// caches its result. A second call after a failed resolution also fails
    /// (§7: "failed resolution leaves the slot unresolved" — there is no
    /// resolver left to retry with).
    pub fn get(&self) -> QueryResult<&T> {
        if let Some(v) = self.cell.get() {
            return Ok(v);
        }
        let resolver = self
            .resolver
            .borrow_mut()
            .take()
            .ok_or(QueryError::ConnectionClosed)?;
        let value = resolver()?;
        let _ = self.cell.set(value);
        Ok(self.cell.get().expect("just set"))
    }

    /// Whether this slot has already been resolved, without forcing
    /// resolution. Generated code uses this to decide whether a prefetch is
    /// redundant with state a caller already resolved.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LazyRelation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(v) => f.debug_tuple("LazyRelation").field(v).finish(),
            None => f.write_str("LazyRelation(<unresolved>)"),
        }
    }
}

/// Per-batch identity map (§5, §4.6, §8 "Identity-map"): every row with the
/// same primary key decoded within one `find_*`/`insert*` call shares the
/// same `Rc`, not just an equal-by-value copy — two parents whose `include`
/// prefetch surfaces the same child row observe the same instance. Never
/// shared across calls; a fresh map is built per batch.
#[derive(Debug, Default)]
pub struct IdentityMap<M> {
    seen: HashMap<String, Rc<M>>,
}

impl<M> IdentityMap<M> {
    pub fn new() -> Self {
        IdentityMap { seen: HashMap::new() }
    }

    /// Returns the cached instance for `pk` if this batch already decoded
    /// it, otherwise builds one with `build`, caches it, and returns it.
    pub fn get_or_insert_with(&mut self, pk: String, build: impl FnOnce() -> M) -> Rc<M> {
        if let Some(existing) = self.seen.get(&pk) {
            return Rc::clone(existing);
        }
        let rc = Rc::new(build());
        self.seen.insert(pk, Rc::clone(&rc));
        rc
    }
}

/// The composite primary/foreign key of a row, stringified for use as an
/// identity-map or prefetch-grouping key. Matching values under different
/// `Value` variants (e.g. `1i64` vs `"1"`) are intentionally distinct — join
/// columns on either side of a relation are expected to share a type.
pub fn composite_key(columns: &[&str], row: &Row) -> String {
    columns
        .iter()
        .map(|c| format!("{:?}", row.raw(c)))
        .collect::<Vec<_>>()
        .join("/")
}

fn pk_value(model: &ModelInfo, row: &Row) -> String {
    let columns: Vec<&str> = model.primary_key.iter().map(String::as_str).collect();
    composite_key(&columns, row)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Executes CRUD for one model against one datasource connection (§4.6).
/// Cheap to clone: the connection source and graph are `Arc`-shared, so a
/// relation's `Backend<C, Remote>` can be cloned into a `LazyRelation`
/// resolver closure without borrowing from the `Backend` that produced it.
pub struct Backend<C: ConnectionSource, M: ReflectedModel> {
    source: Arc<C>,
    model_info: ModelInfo,
    graph: Arc<ModelGraph>,
    echo_sql: bool,
    _model: PhantomData<fn() -> M>,
}

impl<C: ConnectionSource, M: ReflectedModel> Clone for Backend<C, M> {
    fn clone(&self) -> Self {
        Backend {
            source: Arc::clone(&self.source),
            model_info: self.model_info.clone(),
            graph: Arc::clone(&self.graph),
            echo_sql: self.echo_sql,
            _model: PhantomData,
        }
    }
}

impl<C: ConnectionSource + 'static, M: ReflectedModel> Backend<C, M> {
    pub fn new(source: Arc<C>, model_info: ModelInfo, graph: Arc<ModelGraph>, echo_sql: bool) -> Self {
        Backend {
            source,
            model_info,
            graph,
            echo_sql,
            _model: PhantomData,
        }
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    fn echo(&self, sql: &str, params: &[Value]) {
        if self.echo_sql {
            info!(sql, ?params, "executing SQL");
        }
    }

    /// Inserts one row and decodes the stored result, without touching
    /// relation fields — callers (generated `{M}Table::insert`) attach
    /// relation slots around the returned `Row` themselves.
    pub fn insert_row<I>(&self, row: &I, serializer: fn(&I) -> Vec<(&'static str, Scalar)>) -> QueryResult<Row> {
        Ok(self.insert_rows(std::slice::from_ref(row), serializer)?.remove(0))
    }

    pub fn insert_rows<I>(&self, rows: &[I], serializer: fn(&I) -> Vec<(&'static str, Scalar)>) -> QueryResult<Vec<Row>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let fields: Vec<(&'static str, Value)> = serializer(row)
                .into_iter()
                .filter(|(_, v)| !matches!(v.0, Value::Null))
                .map(|(name, v)| (name, v.into_value()))
                .collect();
            let columns = fields
                .iter()
                .map(|(name, _)| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", ");
            let marks = fields.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "INSERT INTO {} ({columns}) VALUES ({marks})",
                quote_ident(&self.model_info.table_name)
            );
            let params: Vec<Value> = fields.into_iter().map(|(_, v)| v).collect();
            self.echo(&sql, &params);

            let decoded = self.source.with_connection(|conn| {
                conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                    .map_err(map_insert_error)?;
                let rowid = conn.last_insert_rowid();
                let select = format!(
                    "SELECT * FROM {} WHERE rowid = ?",
                    quote_ident(&self.model_info.table_name)
                );
                let decoded = conn.query_row(&select, [rowid], |sql_row| row_from_sql(sql_row))?;
                Ok(decoded)
            })?;
            out.push(decoded);
        }
        Ok(out)
    }

    /// Runs `query` and returns the raw decoded rows, with no relation
    /// handling and no identity-map dedup — the building block both
    /// `find_*` and relation prefetch are built from.
    pub fn select_rows(&self, query: &Query) -> QueryResult<Vec<Row>> {
        let (sql, params) = self.build_select(query)?;
        self.echo(&sql, &params);
        self.source.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |sql_row| {
                    row_from_sql(sql_row)
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
    }

    /// One/optional-one prefetch (§4.6): `WHERE <column> IN (keys)` against
    /// this (remote) table, grouped by the stringified join value so the
    /// parent can look its child up by its own foreign-key value.
    ///
    /// Assumes a single-column join; composite foreign keys fall back to
    /// per-row lazy resolution instead of batch prefetch (see DESIGN.md).
    pub fn prefetch_by_column(&self, column: &'static str, keys: Vec<Value>) -> QueryResult<HashMap<String, Vec<Row>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let query = Query {
            filter: Some(Filter::Field(column.to_string(), crate::where_compiler::FieldFilter::In(keys))),
            ..Default::default()
        };
        let rows = self.select_rows(&query)?;
        let mut grouped: HashMap<String, Vec<Row>> = HashMap::new();
        for row in rows {
            grouped.entry(format!("{:?}", row.raw(column))).or_default().push(row);
        }
        Ok(grouped)
    }

    /// Deferred-resolution counterpart of `prefetch_by_column`: a single
    /// `<column> = value` lookup, run the first time a `LazyRelation` slot
    /// built from this backend is accessed.
    pub fn find_many_by_column(&self, column: &'static str, value: Value) -> QueryResult<Vec<Row>> {
        let query = Query {
            filter: Some(Filter::eq(column, value)),
            ..Default::default()
        };
        self.select_rows(&query)
    }

    pub fn find_one_by_column(&self, column: &'static str, value: Value) -> QueryResult<Option<Row>> {
        Ok(self.find_many_by_column(column, value)?.into_iter().next())
    }

    pub fn query_raw(&self, sql: &str, params: Vec<Value>) -> QueryResult<Vec<Row>> {
        self.echo(sql, &params);
        self.source.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |sql_row| {
                    row_from_sql(sql_row)
                })?
                .collect::<Result<_, _>>()?;
            Ok(rows)
        })
    }

    pub fn execute_raw(&self, sql: &str, params: Vec<Value>) -> QueryResult<usize> {
        self.echo(sql, &params);
        self.source
            .with_connection(|conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params.iter()))?))
    }

    fn build_select(&self, query: &Query) -> QueryResult<(String, Vec<Value>)> {
        let mut sql = format!(
            "SELECT * FROM {}",
            quote_ident(&self.model_info.table_name)
        );
        let mut params = Vec::new();
        if let Some(filter) = &query.filter {
            let (frag, p) = compile(&self.model_info, &self.graph, filter)?;
            sql.push_str(" WHERE ");
            sql.push_str(&frag);
            params = p;
        }
        if !query.order_by.is_empty() {
            let order = query
                .order_by
                .iter()
                .map(|o| {
                    let dir = match o.direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    format!("{} {dir}", quote_ident(&o.column))
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        if let Some(take) = query.take {
            sql.push_str(&format!(" LIMIT {take}"));
        }
        if let Some(skip) = query.skip {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        Ok((sql, params))
    }

    /// Convenience wrapper for models with no relation fields: decodes every
    /// row through `deserializer` directly, still deduping through a
    /// per-batch identity map so repeated primary keys share one `Rc`.
    pub fn find_many(&self, query: Query, deserializer: fn(&Row) -> M) -> QueryResult<Vec<Rc<M>>> {
        let rows = self.select_rows(&query)?;
        let mut identity = IdentityMap::new();
        Ok(rows
            .into_iter()
            .map(|row| {
                let pk = pk_value(&self.model_info, &row);
                identity.get_or_insert_with(pk, || deserializer(&row))
            })
            .collect())
    }

    pub fn find_first(&self, mut query: Query, deserializer: fn(&Row) -> M) -> QueryResult<Option<Rc<M>>> {
        query.take = Some(1);
        Ok(self.find_many(query, deserializer)?.into_iter().next())
    }

    /// Convenience wrapper for models with no relation fields.
    pub fn insert<I>(&self, row: I, serializer: fn(&I) -> Vec<(&'static str, Scalar)>, deserializer: fn(&Row) -> M) -> QueryResult<Rc<M>> {
        let decoded = self.insert_row(&row, serializer)?;
        Ok(Rc::new(deserializer(&decoded)))
    }
}

fn row_from_sql(sql_row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut map = HashMap::new();
    for (i, column) in sql_row.as_ref().column_names().iter().enumerate() {
        let value: Value = sql_row.get(i)?;
        map.insert(column.to_string(), value);
    }
    Ok(Row(map))
}

fn map_insert_error(err: rusqlite::Error) -> QueryError {
    if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            return QueryError::IntegrityViolation {
                table: String::new(),
                reason: msg.clone(),
            };
        }
    }
    QueryError::Sqlite(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormforge_macros::Model;
    use ormforge_models::DataSourceConfig;

    #[derive(Model, Debug, Clone, PartialEq)]
    #[model(table = "user")]
    struct User {
        id: i64,
        name: String,
        email: Option<String>,
    }

    struct UserInsert {
        id: Option<i64>,
        name: String,
        email: Option<String>,
    }

    fn serialize_user(v: &UserInsert) -> Vec<(&'static str, Scalar)> {
        vec![
            ("id", Scalar::from(&v.id)),
            ("name", Scalar::from(&v.name)),
            ("email", Scalar::from(&v.email)),
        ]
    }

    fn deserialize_user(row: &Row) -> User {
        User {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
        }
    }

    fn setup() -> (rusqlite::Connection, ModelGraph) {
        let graph = ormforge_inspect::inspect(
            vec![User::dyn_model()],
            vec![DataSourceConfig {
                key: "sqlite".into(),
                provider: "sqlite".into(),
                url: "sqlite:///./dev.db".into(),
            }],
        )
        .unwrap();
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        ormforge_schema::push(&mut conn, &graph, "sqlite", |_| false, false).unwrap();
        (conn, graph)
    }

    fn backend(source: Arc<SingleConnection>, graph: &ModelGraph) -> Backend<SingleConnection, User> {
        Backend::new(
            source,
            graph.models["User"].clone(),
            Arc::new(graph.clone()),
            false,
        )
    }

    #[test]
    fn insert_then_find_first_round_trips() {
        let (conn, graph) = setup();
        let source = Arc::new(SingleConnection::new(conn));
        let backend = backend(Arc::clone(&source), &graph);

        let inserted = backend
            .insert_row(
                &UserInsert {
                    id: None,
                    name: "Ada".to_string(),
                    email: None,
                },
                serialize_user,
            )
            .map(|row| Rc::new(deserialize_user(&row)))
            .unwrap();
        assert_eq!(inserted.name, "Ada");
        assert_eq!(inserted.id, 1);

        let found = backend
            .find_first(Query::default(), deserialize_user)
            .unwrap()
            .unwrap();
        assert_eq!(found, inserted);
    }

    #[test]
    fn find_many_filters_by_equality() {
        let (conn, graph) = setup();
        let source = Arc::new(SingleConnection::new(conn));
        let backend = backend(Arc::clone(&source), &graph);

        for row in [
            UserInsert { id: None, name: "Ada".into(), email: None },
            UserInsert { id: None, name: "Bo".into(), email: None },
        ] {
            backend.insert_row(&row, serialize_user).unwrap();
        }

        let query = Query {
            filter: Some(Filter::eq("name", rusqlite::types::Value::Text("Bo".to_string()))),
            ..Default::default()
        };
        let found = backend.find_many(query, deserialize_user).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Bo");
    }

    #[test]
    fn find_many_shares_one_instance_per_primary_key() {
        let (conn, graph) = setup();
        let source = Arc::new(SingleConnection::new(conn));
        let backend = backend(Arc::clone(&source), &graph);
        backend
            .insert_row(&UserInsert { id: None, name: "Ada".into(), email: None }, serialize_user)
            .unwrap();

        let rows = backend.select_rows(&Query::default()).unwrap();
        let mut identity: IdentityMap<User> = IdentityMap::new();
        let a = identity.get_or_insert_with(pk_value(&graph.models["User"], &rows[0]), || deserialize_user(&rows[0]));
        let b = identity.get_or_insert_with(pk_value(&graph.models["User"], &rows[0]), || deserialize_user(&rows[0]));
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn unique_violation_surfaces_as_integrity_error() {
        #[derive(Model, Debug, Clone, PartialEq)]
        #[model(table = "account")]
        struct Account {
            id: i64,
            #[model(unique)]
            email: String,
        }
        let graph = ormforge_inspect::inspect(
            vec![Account::dyn_model()],
            vec![DataSourceConfig {
                key: "sqlite".into(),
                provider: "sqlite".into(),
                url: "sqlite:///./dev.db".into(),
            }],
        )
        .unwrap();
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        ormforge_schema::push(&mut conn, &graph, "sqlite", |_| false, false).unwrap();
        let source = Arc::new(SingleConnection::new(conn));
        let backend: Backend<SingleConnection, Account> = Backend::new(
            source,
            graph.models["Account"].clone(),
            Arc::new(graph.clone()),
            false,
        );

        struct AccountInsert {
            id: Option<i64>,
            email: String,
        }
        fn serialize(v: &AccountInsert) -> Vec<(&'static str, Scalar)> {
            vec![("id", Scalar::from(&v.id)), ("email", Scalar::from(&v.email))]
        }

        backend
            .insert_row(&AccountInsert { id: None, email: "a@example.com".into() }, serialize)
            .unwrap();
        let err = backend
            .insert_row(&AccountInsert { id: None, email: "a@example.com".into() }, serialize)
            .unwrap_err();
        assert!(matches!(err, QueryError::IntegrityViolation { .. }));
    }
}

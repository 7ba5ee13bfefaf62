//! End-to-end scenarios (§8 "End-to-end scenarios (literal)"), exercised
//! against the facade entry points plus the Backend directly — the
//! generated client module itself is text (§4.3), not something this
//! workspace compiles against itself, so relation/query scenarios drive
//! `Backend` the way the generated `{M}Table` methods would (lazy
//! relation slots, single-column-FK prefetch, identity-mapped results).

use ormforge::{
    Backend, DataSourceConfig, Filter, LazyRelation, QueryError, Row, Scalar, SingleConnection,
};
use ormforge_macros::Model;
use ormforge_models::ForeignKeyYield;
use rusqlite::types::Value;
use std::rc::Rc;

#[derive(Model, Debug)]
#[model(table = "user")]
struct User {
    id: i64,
    name: String,
    email: Option<String>,
    #[model(relation)]
    addresses: LazyRelation<Vec<Rc<Address>>>,
}

#[derive(Model, Debug)]
#[model(table = "address", foreign_keys)]
struct Address {
    id: i64,
    location: String,
    user_id: i64,
    #[model(relation)]
    user: LazyRelation<Rc<User>>,
}

impl Address {
    fn foreign_key(cols: &AddressColumns) -> Vec<ForeignKeyYield> {
        vec![(cols.user.id.eq(&cols.user_id), UserRelations::addresses())]
    }
}

fn datasources() -> Vec<DataSourceConfig> {
    vec![DataSourceConfig {
        key: "sqlite".into(),
        provider: "sqlite".into(),
        url: "sqlite:///:memory:".into(),
    }]
}

// Scenario 1: `generate` emits TUserIncludeCol / TUserSortableCol.
#[test]
fn generated_surface_matches_literal_unions() {
    let text = ormforge::generate(
        vec![User::dyn_model(), Address::dyn_model()],
        datasources(),
        "sqlite",
    )
    .unwrap();

    assert!(text.contains("pub enum TUserIncludeCol {"));
    assert!(text.contains("    Address,"));
    assert!(text.contains("pub enum TUserSortableCol {"));
    assert!(text.contains("    Id,"));
    assert!(text.contains("    Name,"));
    assert!(text.contains("    Email,"));
}

// Scenario 2: pushing to an empty store creates `user` and `address` with
// `user.id` as an autoincrement primary key.
#[test]
fn push_db_creates_both_tables() {
    let diff = ormforge::push_db(
        vec![User::dyn_model(), Address::dyn_model()],
        datasources(),
        "sqlite",
        |_| false,
        false,
    )
    .unwrap();

    assert_eq!(diff.created_tables, vec!["user".to_string(), "address".to_string()]);
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

struct AddressInsert {
    id: Option<i64>,
    location: String,
    user_id: i64,
}

fn serialize_address(v: &AddressInsert) -> Vec<(&'static str, Scalar)> {
    vec![
        ("id", Scalar::from(&v.id)),
        ("location", Scalar::from(&v.location)),
        ("user_id", Scalar::from(&v.user_id)),
    ]
}

// The shapes a generated `{M}Table` would emit for these two models: one
// lazy slot per relation, a bare-slots constructor for rows reached through
// another model's relation (capped at one hop — see DESIGN.md), and a table
// wrapper holding the owning Backend plus one Backend per relation target.

struct UserRelationSlots {
    addresses: LazyRelation<Vec<Rc<Address>>>,
}

fn user_bare_slots() -> UserRelationSlots {
    UserRelationSlots {
        addresses: LazyRelation::deferred(|| {
            Err(QueryError::RelationUnresolvable {
                model: "User".to_string(),
                relation: "addresses".to_string(),
            })
        }),
    }
}

fn deserialize_user(row: &Row, relations: UserRelationSlots) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        addresses: relations.addresses,
    }
}

struct AddressRelationSlots {
    user: LazyRelation<Rc<User>>,
}

fn address_bare_slots() -> AddressRelationSlots {
    AddressRelationSlots {
        user: LazyRelation::deferred(|| {
            Err(QueryError::RelationUnresolvable {
                model: "Address".to_string(),
                relation: "user".to_string(),
            })
        }),
    }
}

fn deserialize_address(row: &Row, relations: AddressRelationSlots) -> Address {
    Address {
        id: row.get("id"),
        location: row.get("location"),
        user_id: row.get("user_id"),
        user: relations.user,
    }
}

struct UserTable {
    backend: Backend<SingleConnection, User>,
    addresses_remote: Backend<SingleConnection, Address>,
}

impl UserTable {
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn lazy_slots(&self, row: &Row) -> UserRelationSlots {
        let remote = self.addresses_remote.clone();
        let key = row.raw("id");
        UserRelationSlots {
            addresses: LazyRelation::deferred(move || {
                Ok(remote
                    .find_many_by_column("user_id", key)?
                    .into_iter()
                    .map(|r| Rc::new(deserialize_address(&r, address_bare_slots())))
                    .collect())
            }),
        }
    }

    fn insert(&self, row: UserInsert) -> Result<Rc<User>, QueryError> {
        let decoded = self.backend.insert_row(&row, serialize_user)?;
        let relations = self.lazy_slots(&decoded);
        Ok(Rc::new(deserialize_user(&decoded, relations)))
    }

    fn find_many(
        &self,
        filter: Option<Filter>,
        include_addresses: bool,
    ) -> Result<Vec<Rc<User>>, QueryError> {
        let query = ormforge::Query { filter, ..Default::default() };
        let rows = self.backend.select_rows(&query)?;
        let prefetch = if include_addresses {
            Some(
                self.addresses_remote
                    .prefetch_by_column("user_id", rows.iter().map(|r| r.raw("id")).collect())?,
            )
        } else {
            None
        };
        let mut identity: ormforge::IdentityMap<User> = ormforge::IdentityMap::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let pk = ormforge::composite_key(Self::PRIMARY_KEY, &row);
            let rc = identity.get_or_insert_with(pk, || {
                let mut relations = self.lazy_slots(&row);
                if let Some(map) = &prefetch {
                    let key = format!("{:?}", row.raw("id"));
                    let children = map.get(&key).cloned().unwrap_or_default();
                    relations.addresses = LazyRelation::resolved(
                        children
                            .into_iter()
                            .map(|r| Rc::new(deserialize_address(&r, address_bare_slots())))
                            .collect(),
                    );
                }
                deserialize_user(&row, relations)
            });
            out.push(rc);
        }
        Ok(out)
    }

    fn find_first(
        &self,
        filter: Option<Filter>,
        include_addresses: bool,
    ) -> Result<Option<Rc<User>>, QueryError> {
        Ok(self.find_many(filter, include_addresses)?.into_iter().next())
    }
}

struct AddressTable {
    backend: Backend<SingleConnection, Address>,
    user_remote: Backend<SingleConnection, User>,
}

impl AddressTable {
    fn lazy_slots(&self, row: &Row) -> AddressRelationSlots {
        let remote = self.user_remote.clone();
        let key = row.raw("user_id");
        AddressRelationSlots {
            user: LazyRelation::deferred(move || {
                let r = remote.find_one_by_column("id", key)?.ok_or_else(|| {
                    QueryError::RelationUnresolvable {
                        model: "Address".to_string(),
                        relation: "user".to_string(),
                    }
                })?;
                Ok(Rc::new(deserialize_user(&r, user_bare_slots())))
            }),
        }
    }

    fn insert(&self, row: AddressInsert) -> Result<Rc<Address>, QueryError> {
        let decoded = self.backend.insert_row(&row, serialize_address)?;
        let relations = self.lazy_slots(&decoded);
        Ok(Rc::new(deserialize_address(&decoded, relations)))
    }
}

fn graph() -> ormforge::ModelGraph {
    ormforge::inspect(vec![User::dyn_model(), Address::dyn_model()], datasources()).unwrap()
}

fn tables(graph: &ormforge::ModelGraph, conn: rusqlite::Connection) -> (UserTable, AddressTable) {
    let source = std::sync::Arc::new(SingleConnection::new(conn));
    let graph_arc = std::sync::Arc::new(graph.clone());
    let user_backend = Backend::<SingleConnection, User>::new(
        std::sync::Arc::clone(&source),
        graph.models["User"].clone(),
        std::sync::Arc::clone(&graph_arc),
        false,
    );
    let address_backend = Backend::<SingleConnection, Address>::new(
        std::sync::Arc::clone(&source),
        graph.models["Address"].clone(),
        std::sync::Arc::clone(&graph_arc),
        false,
    );
    (
        UserTable { backend: user_backend.clone(), addresses_remote: address_backend.clone() },
        AddressTable { backend: address_backend, user_remote: user_backend },
    )
}

// Scenario 3: inserting a user and finding it back by name returns the same
// primary key.
#[test]
fn insert_then_find_first_returns_same_primary_key() {
    let graph = graph();
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    ormforge_schema::push(&mut conn, &graph, "sqlite", |_| false, false).unwrap();
    let (user_table, _address_table) = tables(&graph, conn);

    let inserted = user_table
        .insert(UserInsert { id: None, name: "Alice".into(), email: None })
        .unwrap();

    let found = user_table
        .find_first(Some(Filter::eq("name", Value::Text("Alice".to_string()))), false)
        .unwrap()
        .unwrap();

    assert_eq!(found.id, inserted.id);
}

// Scenario 4: an `or` of a scalar predicate and a `some` relation filter
// compiles to one EXISTS-correlated SELECT, and actually finds the user
// whose address matches.
#[test]
fn or_with_relation_some_filter_finds_matching_user() {
    let graph = graph();
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    ormforge_schema::push(&mut conn, &graph, "sqlite", |_| false, false).unwrap();
    let (user_table, address_table) = tables(&graph, conn);

    let bob = user_table
        .insert(UserInsert { id: None, name: "Bob".into(), email: None })
        .unwrap();
    address_table
        .insert(AddressInsert { id: None, location: "NY Loft".into(), user_id: bob.id })
        .unwrap();

    let filter = Filter::Or(vec![
        Filter::Field("name".into(), ormforge::FieldFilter::StartsWith("A".into())),
        Filter::Relation(
            "addresses".into(),
            ormforge::RelationFilterKind::Some,
            Box::new(Filter::Field(
                "location".into(),
                ormforge::FieldFilter::Contains("NY".into()),
            )),
        ),
    ]);

    let (sql, _) = ormforge_query::where_compiler::compile(&graph.models["User"], &graph, &filter).unwrap();
    assert!(sql.contains("EXISTS"));

    let found = user_table.find_many(Some(filter), false).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Bob");
}

// Scenario 5: `include={'addresses': True}` prefetches the relation in the
// same batch as `find_many` — accessing it afterwards resolves instantly,
// with no further query. Leaving it out of `include` defers resolution to
// first access, which still succeeds but does its own single-shot query.
#[test]
fn include_prefetches_relation_with_no_further_query() {
    let graph = graph();
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    ormforge_schema::push(&mut conn, &graph, "sqlite", |_| false, false).unwrap();
    let (user_table, address_table) = tables(&graph, conn);

    let dana = user_table
        .insert(UserInsert { id: None, name: "Dana".into(), email: None })
        .unwrap();
    address_table
        .insert(AddressInsert { id: None, location: "Loop Station".into(), user_id: dana.id })
        .unwrap();
    address_table
        .insert(AddressInsert { id: None, location: "River House".into(), user_id: dana.id })
        .unwrap();

    let included = user_table
        .find_many(Some(Filter::eq("name", Value::Text("Dana".to_string()))), true)
        .unwrap();
    assert_eq!(included.len(), 1);
    assert!(included[0].addresses.is_resolved());
    assert_eq!(included[0].addresses.get().unwrap().len(), 2);

    let lazy = user_table
        .find_many(Some(Filter::eq("name", Value::Text("Dana".to_string()))), false)
        .unwrap();
    assert_eq!(lazy.len(), 1);
    assert!(!lazy[0].addresses.is_resolved());
    assert_eq!(lazy[0].addresses.get().unwrap().len(), 2);
    assert!(lazy[0].addresses.is_resolved());
}

// Scenario 6: a rebuild-triggering column change is rejected without
// confirmation and preserves surviving rows once confirmed.
#[test]
fn rebuild_is_rejected_then_preserves_rows_once_confirmed() {
    let graph = graph();
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    ormforge_schema::push(&mut conn, &graph, "sqlite", |_| false, false).unwrap();

    conn.execute(
        "INSERT INTO user (name, email) VALUES ('Carol', NULL)",
        [],
    )
    .unwrap();

    // Simulate the declared shape changing to drop `email`, forcing a
    // rebuild; rebuild mechanics themselves are covered in ormforge-schema.
    let mut narrowed = graph.models["User"].clone();
    narrowed.columns.retain(|c| c.name != "email");

    let rejected = ormforge_schema::push(
        &mut conn,
        &single_model_graph(&graph, narrowed.clone()),
        "sqlite",
        |_| false,
        false,
    );
    assert!(rejected.is_err());

    let diff = ormforge_schema::push(
        &mut conn,
        &single_model_graph(&graph, narrowed),
        "sqlite",
        |_| true,
        false,
    )
    .unwrap();
    assert!(!diff.is_empty());

    let name: String = conn
        .query_row("SELECT name FROM user WHERE name = 'Carol'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "Carol");
}

fn single_model_graph(base: &ormforge::ModelGraph, model: ormforge_models::ModelInfo) -> ormforge::ModelGraph {
    let mut graph = base.clone();
    graph.models.insert(model.name.clone(), model);
    graph
}

// push_db against a real on-disk sqlite file, not just `:memory:`.
#[test]
fn push_db_against_an_on_disk_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("dev.db");
    let url = format!("sqlite:///{}", db_path.display());

    let datasources = vec![DataSourceConfig {
        key: "sqlite".into(),
        provider: "sqlite".into(),
        url,
    }];

    ormforge::push_db(
        vec![User::dyn_model(), Address::dyn_model()],
        datasources,
        "sqlite",
        |_| false,
        false,
    )
    .unwrap();

    assert!(db_path.exists());
}

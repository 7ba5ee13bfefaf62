//! Code Generator (§4.3): templates one complete, deterministic Rust module
//! per `generate` invocation from a `ModelGraph`.
//!
//! The source system targets a dynamically-typed language, so its "literal
//! union" types (`Literal['Address']`) have no Rust equivalent string-union
//! construct; they render here as small `#[non_exhaustive]` enums with an
//! `as_str()` accessor, which is what every generated `{M}WhereDict`/
//! `{M}IncludeDict`/`{M}OrderByDict` key type actually needs to be usable
//! (a finite, checkable set of string keys).
//!
//! Relation fields resolve through `LazyRelation` (§4.6 "Lazy resolution"):
//! `find_many`/`find_first` prefetch one level of `include`d relations with
//! a single extra `WHERE col IN (..)` query each; anything not included
//! resolves on first `.get()` with its own single-shot query. A relation
//! declared on a *related* model (two hops from the table you queried) is
//! out of scope for prefetch/lazy resolution — reaching for it raises
//! `QueryError::RelationUnresolvable` — see DESIGN.md.

use heck::{ToSnakeCase, ToUpperCamelCase};
use ormforge_models::{ModelGraph, ModelInfo, RelationInfo};
use std::fmt::Write as _;

/// Emits the complete generated client module for one datasource. Pure and
/// deterministic: the same `graph` always yields byte-identical text (§8).
pub fn generate_module(graph: &ModelGraph, datasource_key: &str) -> String {
    let mut out = String::new();
    writeln!(out, "// @generated by ormforge-codegen. Do not edit by hand.").unwrap();
    writeln!(out, "#![allow(non_camel_case_types, non_snake_case, dead_code)]").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "use ormforge_query::backend::{{").unwrap();
    writeln!(out, "    Backend, ConnectionSource, IdentityMap, LazyRelation, Query,").unwrap();
    writeln!(out, "}};").unwrap();
    writeln!(out, "use ormforge_query::error::QueryError;").unwrap();
    writeln!(out, "use ormforge_query::where_compiler::{{Filter, OrderBy}};").unwrap();
    writeln!(out).unwrap();

    writeln!(out, "{}", SHARED_SPECS).unwrap();

    let mut models: Vec<&ModelInfo> = graph.models_in(datasource_key);
    models.sort_by(|a, b| a.name.cmp(&b.name));

    for model in &models {
        render_model(&mut out, graph, model);
    }

    render_client(&mut out, &models);
    out
}

const SHARED_SPECS: &str = r#"#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub attr_name: &'static str,
    pub target_model: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub from_columns: &'static [&'static str],
    pub to_model: &'static str,
    pub to_columns: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceConfig {
    pub key: &'static str,
    pub provider: &'static str,
    pub url: &'static str,
}

fn _scalar_from_stored(lit: ormforge_models::ScalarLiteral) -> ormforge_query::backend::Scalar {
    use ormforge_query::backend::Scalar;
    use rusqlite::types::Value;
    match lit {
        ormforge_models::ScalarLiteral::Int(i) => Scalar(Value::Integer(i)),
        ormforge_models::ScalarLiteral::Str(s) => Scalar(Value::Text(s)),
    }
}
"#;

/// The single-column join a relation resolves through: a column on the
/// *local* model and the matching column on the *remote* one, whichever
/// side actually carries the foreign key. `None` when the relation's
/// foreign key spans more than one column — batch prefetch and lazy
/// resolution aren't supported for those (DESIGN.md).
struct Join<'g> {
    local_column: &'g str,
    remote_column: &'g str,
}

fn relation_join<'g>(graph: &'g ModelGraph, model: &'g ModelInfo, rel: &'g RelationInfo) -> Option<Join<'g>> {
    if let Some(fk) = model.foreign_keys.iter().find(|fk| fk.local_relation_attr == rel.attr_name) {
        return single_column_join(&fk.from_columns, &fk.to_columns);
    }
    for other in graph.models.values() {
        if let Some(fk) = other
            .foreign_keys
            .iter()
            .find(|fk| fk.to_model == model.name && fk.remote_relation_attr == rel.attr_name)
        {
            return single_column_join(&fk.to_columns, &fk.from_columns);
        }
    }
    None
}

fn single_column_join<'g>(local: &'g [String], remote: &'g [String]) -> Option<Join<'g>> {
    if local.len() == 1 && remote.len() == 1 {
        Some(Join { local_column: &local[0], remote_column: &remote[0] })
    } else {
        None
    }
}

/// The wrapped-in-`LazyRelation` Rust type a relation's slot and the
/// generated model struct's field both use.
fn relation_slot_type(rel: &RelationInfo) -> String {
    let target = &rel.target_model;
    match rel.cardinality {
        ormforge_models::Cardinality::Many => format!("LazyRelation<Vec<std::rc::Rc<{target}>>>"),
        ormforge_models::Cardinality::OptionalOne => format!("LazyRelation<Option<std::rc::Rc<{target}>>>"),
        ormforge_models::Cardinality::One => format!("LazyRelation<std::rc::Rc<{target}>>"),
    }
}

fn render_model(out: &mut String, graph: &ModelGraph, model: &ModelInfo) {
    let m = model.name.as_str();
    let has_relations = !model.relations.is_empty();
    writeln!(out, "// ---- {m} ----").unwrap();

    // T{M}IncludeCol
    writeln!(out, "#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]").unwrap();
    writeln!(out, "#[non_exhaustive]").unwrap();
    writeln!(out, "pub enum T{m}IncludeCol {{").unwrap();
    for rel in &model.relations {
        writeln!(out, "    {},", rel.target_model).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out, "impl T{m}IncludeCol {{").unwrap();
    writeln!(out, "    pub const fn as_str(self) -> &'static str {{").unwrap();
    writeln!(out, "        match self {{").unwrap();
    for rel in &model.relations {
        writeln!(out, "            T{m}IncludeCol::{0} => \"{0}\",", rel.target_model).unwrap();
    }
    writeln!(out, "        }}").unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    // T{M}SortableCol
    writeln!(out, "#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]").unwrap();
    writeln!(out, "#[non_exhaustive]").unwrap();
    writeln!(out, "pub enum T{m}SortableCol {{").unwrap();
    for col in &model.columns {
        writeln!(out, "    {},", pascal(&col.name)).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out, "impl T{m}SortableCol {{").unwrap();
    writeln!(out, "    pub const fn as_str(self) -> &'static str {{").unwrap();
    writeln!(out, "        match self {{").unwrap();
    for col in &model.columns {
        writeln!(out, "            T{m}SortableCol::{} => \"{}\",", pascal(&col.name), col.name).unwrap();
    }
    writeln!(out, "        }}").unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    // {M}Insert — auto-increment PK becomes Option<T>; everything else keeps
    // its declared type (§4.3 rationale: a freshly inserted record always
    // has its key, a pre-insert payload must not require one).
    writeln!(out, "#[derive(Debug, Clone, PartialEq)]").unwrap();
    writeln!(out, "pub struct {m}Insert {{").unwrap();
    for col in &model.columns {
        let ty = if col.is_autoincrement_pk {
            format!("Option<{}>", col.rust_type.render())
        } else {
            col.rust_type.render()
        };
        writeln!(out, "    pub {}: {},", col.name, ty).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    // {M}InsertDict — total map, same keys as Insert.
    writeln!(out, "#[derive(Debug, Clone, Default, PartialEq)]").unwrap();
    writeln!(out, "pub struct {m}InsertDict {{").unwrap();
    for col in &model.columns {
        writeln!(out, "    pub {}: Option<{}>,", col.name, col.rust_type.render()).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    // {M}WhereDict — partial map; every scalar column optional, plus
    // and/or/not and relation filters, all folded into the shared `Filter`
    // enum from ormforge-query (§4.5/§6). `find_many`/`find_first` take it
    // directly, so it isn't just emitted surface.
    writeln!(out, "pub type {m}WhereDict = Filter;").unwrap();
    writeln!(out).unwrap();

    // {M}IncludeDict
    writeln!(out, "#[derive(Debug, Clone, Default, PartialEq, Eq)]").unwrap();
    writeln!(out, "pub struct {m}IncludeDict {{").unwrap();
    for rel in &model.relations {
        writeln!(out, "    pub {}: bool,", rel.attr_name).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    // {M}OrderByDict — one slot per column; `find_many` reads it in
    // declaration order to build the `ORDER BY` clause, so a caller who
    // wants `col_a` before `col_b` sets both and relies on field order.
    writeln!(out, "#[derive(Debug, Clone, Default, PartialEq, Eq)]").unwrap();
    writeln!(out, "pub struct {m}OrderByDict {{").unwrap();
    for col in &model.columns {
        writeln!(out, "    pub {}: Option<OrderBy>,", col.name).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out, "impl {m}OrderByDict {{").unwrap();
    writeln!(out, "    fn into_order_by(self) -> Vec<OrderBy> {{").unwrap();
    writeln!(out, "        let mut out = Vec::new();").unwrap();
    for col in &model.columns {
        writeln!(out, "        if let Some(o) = self.{} {{ out.push(o); }}", col.name).unwrap();
    }
    writeln!(out, "        out").unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    // {M}RelationSlots — one LazyRelation-typed field per relation, built
    // either as `resolved` (prefetched via `include`) or `deferred` (lazy,
    // single-shot on first access).
    if has_relations {
        writeln!(out, "pub struct {m}RelationSlots {{").unwrap();
        for rel in &model.relations {
            writeln!(out, "    pub {}: {},", rel.attr_name, relation_slot_type(rel)).unwrap();
        }
        writeln!(out, "}}").unwrap();
        writeln!(out).unwrap();

        // A relation's own relations are out of scope one hop away from the
        // table actually queried; reaching for them raises RelationUnresolvable.
        writeln!(out, "fn _{m}_bare_slots() -> {m}RelationSlots {{").unwrap();
        writeln!(out, "    {m}RelationSlots {{").unwrap();
        for rel in &model.relations {
            writeln!(out, "        {}: LazyRelation::deferred(|| Err(QueryError::RelationUnresolvable {{", rel.attr_name).unwrap();
            writeln!(out, "            model: \"{m}\".to_string(),").unwrap();
            writeln!(out, "            relation: \"{}\".to_string(),", rel.attr_name).unwrap();
            writeln!(out, "        }})),").unwrap();
        }
        writeln!(out, "    }}").unwrap();
        writeln!(out, "}}").unwrap();
        writeln!(out).unwrap();
    }

    // static serializer/deserializer — pure functions, no reflection per row.
    writeln!(
        out,
        "pub fn _{m}_serializer(v: &{m}Insert) -> Vec<(&'static str, ormforge_query::backend::Scalar)> {{"
    )
    .unwrap();
    writeln!(out, "    vec![").unwrap();
    for col in &model.columns {
        if col.enum_mapping.is_some() {
            writeln!(
                out,
                "        (\"{0}\", _scalar_from_stored(ormforge_models::EnumCodec::to_stored(&v.{0}))),",
                col.name
            )
            .unwrap();
        } else {
            writeln!(
                out,
                "        (\"{0}\", ormforge_query::backend::Scalar::from(&v.{0})),",
                col.name
            )
            .unwrap();
        }
    }
    writeln!(out, "    ]").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    let deserializer_sig = if has_relations {
        format!("pub fn _{m}_deserializer(row: &ormforge_query::backend::Row, relations: {m}RelationSlots) -> {m} {{")
    } else {
        format!("pub fn _{m}_deserializer(row: &ormforge_query::backend::Row) -> {m} {{")
    };
    writeln!(out, "{deserializer_sig}").unwrap();
    writeln!(out, "    {m} {{").unwrap();
    for col in &model.columns {
        if col.enum_mapping.is_some() {
            writeln!(out, "        {0}: row.get_enum(\"{0}\"),", col.name).unwrap();
        } else {
            writeln!(out, "        {0}: row.get(\"{0}\"),", col.name).unwrap();
        }
    }
    for rel in &model.relations {
        writeln!(out, "        {0}: relations.{0},", rel.attr_name).unwrap();
    }
    writeln!(out, "    }}").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    render_table(out, graph, model, has_relations);
}

fn render_table(out: &mut String, graph: &ModelGraph, model: &ModelInfo, has_relations: bool) {
    let m = model.name.as_str();

    writeln!(out, "pub struct {m}Table<C: ConnectionSource + 'static> {{").unwrap();
    writeln!(out, "    pub backend: Backend<C, {m}>,").unwrap();
    for rel in &model.relations {
        writeln!(out, "    pub {}_remote: Backend<C, {}>,", rel.attr_name, rel.target_model).unwrap();
    }
    writeln!(out, "}}").unwrap();
    writeln!(out, "impl<C: ConnectionSource + 'static> {m}Table<C> {{").unwrap();
    writeln!(out, "    pub const MODEL: &'static str = \"{m}\";").unwrap();
    writeln!(
        out,
        "    pub const PRIMARY_KEY: &'static [&'static str] = &[{}];",
        model.primary_key.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ")
    )
    .unwrap();

    if has_relations {
        writeln!(out, "    fn lazy_slots(&self, row: &ormforge_query::backend::Row) -> {m}RelationSlots {{").unwrap();
        writeln!(out, "        {m}RelationSlots {{").unwrap();
        for rel in &model.relations {
            let attr = &rel.attr_name;
            let target = &rel.target_model;
            writeln!(out, "            {attr}: {{").unwrap();
            match relation_join(graph, model, rel) {
                Some(join) => {
                    writeln!(out, "                let remote = self.{attr}_remote.clone();").unwrap();
                    writeln!(out, "                let key = row.raw(\"{}\");", join.local_column).unwrap();
                    writeln!(out, "                LazyRelation::deferred(move || {{").unwrap();
                    let remote_col = join.remote_column;
                    match rel.cardinality {
                        ormforge_models::Cardinality::Many => {
                            writeln!(out, "                    Ok(remote.find_many_by_column(\"{remote_col}\", key)?").unwrap();
                            writeln!(out, "                        .into_iter()").unwrap();
                            writeln!(out, "                        .map(|r| std::rc::Rc::new({}))", deserialize_remote_call(graph, target)).unwrap();
                            writeln!(out, "                        .collect())").unwrap();
                        }
                        ormforge_models::Cardinality::OptionalOne => {
                            writeln!(out, "                    Ok(remote.find_one_by_column(\"{remote_col}\", key)?").unwrap();
                            writeln!(out, "                        .map(|r| std::rc::Rc::new({})))", deserialize_remote_call(graph, target)).unwrap();
                        }
                        ormforge_models::Cardinality::One => {
                            writeln!(out, "                    let r = remote.find_one_by_column(\"{remote_col}\", key)?").unwrap();
                            writeln!(out, "                        .ok_or_else(|| QueryError::RelationUnresolvable {{").unwrap();
                            writeln!(out, "                            model: \"{m}\".to_string(),").unwrap();
                            writeln!(out, "                            relation: \"{attr}\".to_string(),").unwrap();
                            writeln!(out, "                        }})?;").unwrap();
                            writeln!(out, "                    Ok(std::rc::Rc::new({}))", deserialize_remote_call(graph, target)).unwrap();
                        }
                    }
                    writeln!(out, "                }})").unwrap();
                }
                None => {
                    let relation_name = &rel.attr_name;
                    match rel.cardinality {
                        ormforge_models::Cardinality::Many => {
                            writeln!(out, "                LazyRelation::deferred(|| Ok(Vec::new()))").unwrap();
                        }
                        ormforge_models::Cardinality::OptionalOne => {
                            writeln!(out, "                LazyRelation::deferred(|| Ok(None))").unwrap();
                        }
                        ormforge_models::Cardinality::One => {
                            writeln!(out, "                LazyRelation::deferred(|| Err(QueryError::RelationUnresolvable {{").unwrap();
                            writeln!(out, "                    model: \"{m}\".to_string(),").unwrap();
                            writeln!(out, "                    relation: \"{relation_name}\".to_string(),").unwrap();
                            writeln!(out, "                }}))").unwrap();
                        }
                    }
                }
            }
            writeln!(out, "            }},").unwrap();
        }
        writeln!(out, "        }}").unwrap();
        writeln!(out, "    }}").unwrap();
        writeln!(out).unwrap();
    }

    // insert / insert_many
    writeln!(
        out,
        "    pub fn insert(&self, row: {m}Insert) -> Result<std::rc::Rc<{m}>, QueryError> {{"
    )
    .unwrap();
    if has_relations {
        writeln!(out, "        let decoded = self.backend.insert_row(&row, _{m}_serializer)?;").unwrap();
        writeln!(out, "        let relations = self.lazy_slots(&decoded);").unwrap();
        writeln!(out, "        Ok(std::rc::Rc::new(_{m}_deserializer(&decoded, relations)))").unwrap();
    } else {
        writeln!(out, "        self.backend.insert(row, _{m}_serializer, _{m}_deserializer)").unwrap();
    }
    writeln!(out, "    }}").unwrap();

    writeln!(
        out,
        "    pub fn insert_many(&self, rows: Vec<{m}Insert>) -> Result<Vec<std::rc::Rc<{m}>>, QueryError> {{"
    )
    .unwrap();
    if has_relations {
        writeln!(out, "        let decoded = self.backend.insert_rows(&rows, _{m}_serializer)?;").unwrap();
        writeln!(out, "        Ok(decoded").unwrap();
        writeln!(out, "            .into_iter()").unwrap();
        writeln!(out, "            .map(|row| {{").unwrap();
        writeln!(out, "                let relations = self.lazy_slots(&row);").unwrap();
        writeln!(out, "                std::rc::Rc::new(_{m}_deserializer(&row, relations))").unwrap();
        writeln!(out, "            }})").unwrap();
        writeln!(out, "            .collect())").unwrap();
    } else {
        writeln!(out, "        let mut out = Vec::with_capacity(rows.len());").unwrap();
        writeln!(out, "        for row in rows {{ out.push(self.backend.insert(row, _{m}_serializer, _{m}_deserializer)?); }}").unwrap();
        writeln!(out, "        Ok(out)").unwrap();
    }
    writeln!(out, "    }}").unwrap();

    // find_many / find_first
    writeln!(
        out,
        "    pub fn find_many(&self, where_: Option<{m}WhereDict>, include: {m}IncludeDict, order_by: {m}OrderByDict, take: Option<i64>, skip: Option<i64>) -> Result<Vec<std::rc::Rc<{m}>>, QueryError> {{"
    )
    .unwrap();
    writeln!(
        out,
        "        let query = Query {{ filter: where_, order_by: order_by.into_order_by(), take, skip }};"
    )
    .unwrap();
    writeln!(out, "        let rows = self.backend.select_rows(&query)?;").unwrap();

    if has_relations {
        for rel in &model.relations {
            let attr = &rel.attr_name;
            match relation_join(graph, model, rel) {
                Some(join) => {
                    writeln!(out, "        let {attr}_prefetch = if include.{attr} {{").unwrap();
                    writeln!(
                        out,
                        "            Some(self.{attr}_remote.prefetch_by_column(\"{}\", rows.iter().map(|r| r.raw(\"{}\")).collect())?)",
                        join.remote_column, join.local_column
                    )
                    .unwrap();
                    writeln!(out, "        }} else {{ None }};").unwrap();
                }
                None => {
                    writeln!(out, "        if include.{attr} {{").unwrap();
                    writeln!(out, "            return Err(QueryError::RelationUnresolvable {{").unwrap();
                    writeln!(out, "                model: \"{m}\".to_string(),").unwrap();
                    writeln!(out, "                relation: \"{attr}\".to_string(),").unwrap();
                    writeln!(out, "            }});").unwrap();
                    writeln!(out, "        }}").unwrap();
                    writeln!(out, "        let {attr}_prefetch: Option<std::collections::HashMap<String, Vec<ormforge_query::backend::Row>>> = None;").unwrap();
                }
            }
        }
        writeln!(out, "        let mut identity: IdentityMap<{m}> = IdentityMap::new();").unwrap();
        writeln!(out, "        let mut out = Vec::with_capacity(rows.len());").unwrap();
        writeln!(out, "        for row in rows {{").unwrap();
        writeln!(out, "            let pk = ormforge_query::backend::composite_key(Self::PRIMARY_KEY, &row);").unwrap();
        writeln!(out, "            let rc = identity.get_or_insert_with(pk, || {{").unwrap();
        writeln!(out, "                let mut relations = self.lazy_slots(&row);").unwrap();
        for rel in &model.relations {
            let attr = &rel.attr_name;
            if let Some(join) = relation_join(graph, model, rel) {
                writeln!(out, "                if let Some(map) = &{attr}_prefetch {{").unwrap();
                writeln!(out, "                    let key = format!(\"{{:?}}\", row.raw(\"{}\"));", join.local_column).unwrap();
                writeln!(out, "                    let children = map.get(&key).cloned().unwrap_or_default();").unwrap();
                let target = &rel.target_model;
                match rel.cardinality {
                    ormforge_models::Cardinality::Many => {
                        writeln!(out, "                    relations.{attr} = LazyRelation::resolved(").unwrap();
                        writeln!(out, "                        children.into_iter().map(|r| std::rc::Rc::new({})).collect()", deserialize_remote_call(graph, target)).unwrap();
                        writeln!(out, "                    );").unwrap();
                    }
                    ormforge_models::Cardinality::OptionalOne => {
                        writeln!(out, "                    relations.{attr} = LazyRelation::resolved(").unwrap();
                        writeln!(out, "                        children.into_iter().next().map(|r| std::rc::Rc::new({}))", deserialize_remote_call(graph, target)).unwrap();
                        writeln!(out, "                    );").unwrap();
                    }
                    ormforge_models::Cardinality::One => {
                        writeln!(out, "                    if let Some(r) = children.into_iter().next() {{").unwrap();
                        writeln!(out, "                        relations.{attr} = LazyRelation::resolved(std::rc::Rc::new({}));", deserialize_remote_call(graph, target)).unwrap();
                        writeln!(out, "                    }}").unwrap();
                    }
                }
                writeln!(out, "                }}").unwrap();
            }
        }
        writeln!(out, "                _{m}_deserializer(&row, relations)").unwrap();
        writeln!(out, "            }});").unwrap();
        writeln!(out, "            out.push(rc);").unwrap();
        writeln!(out, "        }}").unwrap();
        writeln!(out, "        Ok(out)").unwrap();
    } else {
        writeln!(out, "        let mut identity: IdentityMap<{m}> = IdentityMap::new();").unwrap();
        writeln!(out, "        Ok(rows").unwrap();
        writeln!(out, "            .into_iter()").unwrap();
        writeln!(out, "            .map(|row| {{").unwrap();
        writeln!(out, "                let pk = ormforge_query::backend::composite_key(Self::PRIMARY_KEY, &row);").unwrap();
        writeln!(out, "                identity.get_or_insert_with(pk, || _{m}_deserializer(&row))").unwrap();
        writeln!(out, "            }})").unwrap();
        writeln!(out, "            .collect())").unwrap();
    }
    writeln!(out, "    }}").unwrap();

    writeln!(
        out,
        "    pub fn find_first(&self, where_: Option<{m}WhereDict>, include: {m}IncludeDict, order_by: {m}OrderByDict) -> Result<Option<std::rc::Rc<{m}>>, QueryError> {{"
    )
    .unwrap();
    writeln!(out, "        Ok(self.find_many(where_, include, order_by, Some(1), None)?.into_iter().next())").unwrap();
    writeln!(out, "    }}").unwrap();

    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();
}

/// A call expression decoding one already-fetched remote row `r` into its
/// model type, supplying bare (always-deferred, never resolved) relation
/// slots when the remote model has relations of its own.
fn deserialize_remote_call(graph: &ModelGraph, target: &str) -> String {
    let target_has_relations = graph.models.get(target).map(|m| !m.relations.is_empty()).unwrap_or(false);
    if target_has_relations {
        format!("_{target}_deserializer(&r, _{target}_bare_slots())")
    } else {
        format!("_{target}_deserializer(&r)")
    }
}

fn render_client(out: &mut String, models: &[&ModelInfo]) {
    writeln!(out, "pub struct Client<C: ConnectionSource + 'static> {{").unwrap();
    for model in models {
        writeln!(out, "    pub {}: {}Table<C>,", model.name.to_snake_case(), model.name).unwrap();
    }
    writeln!(out, "    pub echo_sql: bool,").unwrap();
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();

    writeln!(out, "impl<C: ConnectionSource + 'static> Client<C> {{").unwrap();
    writeln!(
        out,
        "    pub fn new(graph: &ormforge_models::ModelGraph, provider: C, echo_sql: bool) -> Self {{"
    )
    .unwrap();
    writeln!(out, "        let source = std::sync::Arc::new(provider);").unwrap();
    writeln!(out, "        let graph_arc = std::sync::Arc::new(graph.clone());").unwrap();
    for model in models {
        let snake = model.name.to_snake_case();
        let m = &model.name;
        writeln!(
            out,
            "        let {snake}_backend = Backend::<C, {m}>::new(std::sync::Arc::clone(&source), graph.models[\"{m}\"].clone(), std::sync::Arc::clone(&graph_arc), echo_sql);"
        )
        .unwrap();
    }
    writeln!(out, "        Client {{").unwrap();
    for model in models {
        let snake = model.name.to_snake_case();
        let m = &model.name;
        writeln!(out, "            {snake}: {m}Table {{").unwrap();
        writeln!(out, "                backend: {snake}_backend.clone(),").unwrap();
        for rel in &model.relations {
            let target_snake = rel.target_model.to_snake_case();
            writeln!(out, "                {}_remote: {target_snake}_backend.clone(),", rel.attr_name).unwrap();
        }
        writeln!(out, "            }},").unwrap();
    }
    writeln!(out, "            echo_sql,").unwrap();
    writeln!(out, "        }}").unwrap();
    writeln!(out, "    }}").unwrap();
    writeln!(out, "}}").unwrap();
}

/// Renders a `snake_case` column name as the `PascalCase` enum variant
/// identifier it becomes in `T{M}SortableCol`.
fn pascal(name: &str) -> String {
    name.to_upper_camel_case()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormforge_macros::Model;
    use ormforge_models::{DataSourceConfig, ForeignKeyYield};
    use ormforge_query::backend::LazyRelation;
    use std::rc::Rc;

    #[derive(Model)]
    #[model(table = "user")]
    struct User {
        id: i64,
        name: String,
        email: Option<String>,
        #[model(relation)]
        addresses: LazyRelation<Vec<Rc<Address>>>,
    }

    #[derive(Model)]
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

    fn graph() -> ModelGraph {
        ormforge_inspect::inspect(
            vec![User::dyn_model(), Address::dyn_model()],
            vec![DataSourceConfig {
                key: "sqlite".into(),
                provider: "sqlite".into(),
                url: "sqlite:///./dev.db".into(),
            }],
        )
        .unwrap()
    }

    #[test]
    fn emits_include_and_sortable_literal_unions() {
        let text = generate_module(&graph(), "sqlite");
        assert!(text.contains("pub enum TUserIncludeCol {"));
        assert!(text.contains("    Address,"));
        assert!(text.contains("pub enum TUserSortableCol {"));
        assert!(text.contains("    Id,"));
        assert!(text.contains("    Name,"));
        assert!(text.contains("    Email,"));
    }

    #[test]
    fn insert_struct_makes_autoincrement_pk_optional() {
        let text = generate_module(&graph(), "sqlite");
        assert!(text.contains("pub struct UserInsert {"));
        assert!(text.contains("pub id: Option<i64>,"));
    }

    #[test]
    fn find_many_is_parameterized_by_the_emitted_dict_types() {
        let text = generate_module(&graph(), "sqlite");
        assert!(text.contains(
            "pub fn find_many(&self, where_: Option<UserWhereDict>, include: UserIncludeDict, order_by: UserOrderByDict, take: Option<i64>, skip: Option<i64>) -> Result<Vec<std::rc::Rc<User>>, QueryError> {"
        ));
    }

    #[test]
    fn client_holds_table_fields_and_a_constructor() {
        let text = generate_module(&graph(), "sqlite");
        assert!(text.contains("pub user: UserTable<C>,"));
        assert!(text.contains("pub address: AddressTable<C>,"));
        assert!(text.contains("pub fn new(graph: &ormforge_models::ModelGraph, provider: C, echo_sql: bool) -> Self {"));
    }

    #[test]
    fn generation_is_deterministic() {
        let g = graph();
        assert_eq!(generate_module(&g, "sqlite"), generate_module(&g, "sqlite"));
    }
}

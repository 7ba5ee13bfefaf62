//! Where Compiler (§4.5): translates a nested filter into a SQL fragment
//! plus bound parameters.

use ormforge_models::{ModelGraph, ModelInfo};
use rusqlite::types::Value;

use crate::error::{QueryError, QueryResult};

/// A bound parameter value. `rusqlite::types::Value` already implements
/// `ToSql`, so compiled fragments bind directly against it.
pub type Param = Value;

/// A single scalar-column comparison (§4.5's recognized ops, verbatim).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull(bool),
}

/// Which `EXISTS`/`NOT EXISTS` shape a relation key compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationFilterKind {
    Is,
    IsNot,
    Some,
    None,
    Every,
}

/// Sort direction for a compiled `ORDER BY` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// The filter grammar (§4.5), recursively defined. `and`/`or`/`not` combine
/// sibling filters; a scalar-column key yields a `Field` leaf; a relation
/// name yields a `Relation` leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field(String, FieldFilter),
    Relation(String, RelationFilterKind, Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Filter::Field(column.into(), FieldFilter::Eq(value))
    }
}

/// Compiles `filter` against `model`'s table, threading a fresh correlated
/// alias for every nested relation subquery.
pub fn compile(
    model: &ModelInfo,
    graph: &ModelGraph,
    filter: &Filter,
) -> QueryResult<(String, Vec<Param>)> {
    let mut params = Vec::new();
    let mut counter = 0usize;
    let sql = compile_inner(model, graph, filter, &model.table_name, &mut counter, &mut params)?;
    Ok((sql, params))
}

fn compile_inner(
    model: &ModelInfo,
    graph: &ModelGraph,
    filter: &Filter,
    alias: &str,
    counter: &mut usize,
    params: &mut Vec<Param>,
) -> QueryResult<String> {
    match filter {
        Filter::Field(name, ff) => {
            model.column(name).ok_or_else(|| QueryError::InvalidFilter {
                model: model.name.clone(),
                key: name.clone(),
            })?;
            Ok(compile_field(alias, name, ff, params))
        }
        Filter::And(subs) => {
            if subs.is_empty() {
                return Ok("1=1".to_string());
            }
            let parts: QueryResult<Vec<String>> = subs
                .iter()
                .map(|f| compile_inner(model, graph, f, alias, counter, params))
                .collect();
            Ok(format!("({})", parts?.join(" AND ")))
        }
        Filter::Or(subs) => {
            if subs.is_empty() {
                return Ok("1=0".to_string());
            }
            let parts: QueryResult<Vec<String>> = subs
                .iter()
                .map(|f| compile_inner(model, graph, f, alias, counter, params))
                .collect();
            Ok(format!("({})", parts?.join(" OR ")))
        }
        Filter::Not(inner) => {
            let sql = compile_inner(model, graph, inner, alias, counter, params)?;
            Ok(format!("NOT ({sql})"))
        }
        Filter::Relation(attr, kind, inner) => {
            compile_relation(model, graph, attr, *kind, inner, alias, counter, params)
        }
    }
}

fn compile_field(alias: &str, column: &str, ff: &FieldFilter, params: &mut Vec<Param>) -> String {
    let col = format!("{alias}.\"{column}\"");
    match ff {
        FieldFilter::Eq(v) => {
            params.push(v.clone());
            format!("{col} = ?")
        }
        FieldFilter::Ne(v) => {
            params.push(v.clone());
            format!("{col} <> ?")
        }
        FieldFilter::Lt(v) => {
            params.push(v.clone());
            format!("{col} < ?")
        }
        FieldFilter::Lte(v) => {
            params.push(v.clone());
            format!("{col} <= ?")
        }
        FieldFilter::Gt(v) => {
            params.push(v.clone());
            format!("{col} > ?")
        }
        FieldFilter::Gte(v) => {
            params.push(v.clone());
            format!("{col} >= ?")
        }
        FieldFilter::In(vs) => {
            if vs.is_empty() {
                return "1=0".to_string();
            }
            let marks = vs.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            params.extend(vs.iter().cloned());
            format!("{col} IN ({marks})")
        }
        FieldFilter::NotIn(vs) => {
            if vs.is_empty() {
                return "1=1".to_string();
            }
            let marks = vs.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            params.extend(vs.iter().cloned());
            format!("{col} NOT IN ({marks})")
        }
        FieldFilter::Contains(s) => {
            params.push(Value::Text(format!("%{s}%")));
            format!("{col} LIKE ?")
        }
        FieldFilter::StartsWith(s) => {
            params.push(Value::Text(format!("{s}%")));
            format!("{col} LIKE ?")
        }
        FieldFilter::EndsWith(s) => {
            params.push(Value::Text(format!("%{s}")));
            format!("{col} LIKE ?")
        }
        FieldFilter::IsNull(true) => format!("{col} IS NULL"),
        FieldFilter::IsNull(false) => format!("{col} IS NOT NULL"),
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_relation(
    model: &ModelInfo,
    graph: &ModelGraph,
    attr: &str,
    kind: RelationFilterKind,
    inner: &Filter,
    alias: &str,
    counter: &mut usize,
    params: &mut Vec<Param>,
) -> QueryResult<String> {
    let relation = model
        .relation(attr)
        .ok_or_else(|| QueryError::InvalidFilter {
            model: model.name.clone(),
            key: attr.to_string(),
        })?;
    let is_many = relation.cardinality == ormforge_models::Cardinality::Many;
    if matches!(
        kind,
        RelationFilterKind::Some | RelationFilterKind::None | RelationFilterKind::Every
    ) && !is_many
    {
        return Err(QueryError::RelationFilterCardinality {
            model: model.name.clone(),
            relation: attr.to_string(),
            kind: "some/none/every",
        });
    }

    let remote_model = graph
        .models
        .get(&relation.target_model)
        .expect("inspector already validated relation targets");

    // Owning side (this model holds the FK column) vs. reverse side (the
    // remote model owns it and points back via `remote_relation_attr`).
    let (local_cols, remote_cols) = if let Some(fk) = model.foreign_key_for_relation(attr) {
        (fk.from_columns.clone(), fk.to_columns.clone())
    } else {
        let fk = remote_model
            .foreign_keys
            .iter()
            .find(|fk| fk.remote_relation_attr == attr && fk.to_model == model.name)
            .ok_or_else(|| QueryError::RelationUnresolvable {
                model: model.name.clone(),
                relation: attr.to_string(),
            })?;
        (fk.to_columns.clone(), fk.from_columns.clone())
    };

    let sub_alias = format!("t{}", *counter);
    *counter += 1;
    let inner_sql = compile_inner(remote_model, graph, inner, &sub_alias, counter, params)?;

    let join_pred = local_cols
        .iter()
        .zip(remote_cols.iter())
        .map(|(l, r)| format!("{alias}.\"{l}\" = {sub_alias}.\"{r}\""))
        .collect::<Vec<_>>()
        .join(" AND ");

    let exists_body = format!(
        "SELECT 1 FROM \"{}\" AS {sub_alias} WHERE {join_pred} AND {inner_sql}",
        remote_model.table_name
    );
    let negated_body = format!(
        "SELECT 1 FROM \"{}\" AS {sub_alias} WHERE {join_pred} AND NOT ({inner_sql})",
        remote_model.table_name
    );

    Ok(match kind {
        RelationFilterKind::Is | RelationFilterKind::Some => format!("EXISTS ({exists_body})"),
        RelationFilterKind::IsNot | RelationFilterKind::None => {
            format!("NOT EXISTS ({exists_body})")
        }
        // Vacuous truth: a record with no related rows at all satisfies
        // `every`, so the compiled form is "no related row fails the
        // predicate" rather than "some related row passes it".
        RelationFilterKind::Every => format!("NOT EXISTS ({negated_body})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormforge_macros::Model;
    use ormforge_models::{DataSourceConfig, ForeignKeyYield};

    #[derive(Model)]
    #[model(table = "user")]
    struct User {
        id: i64,
        name: String,
        #[model(relation)]
        addresses: Vec<Address>,
    }

    #[derive(Model)]
    #[model(table = "address", foreign_keys)]
    struct Address {
        id: i64,
        city: String,
        user_id: i64,
        #[model(relation)]
        user: User,
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
    fn compiles_simple_equality() {
        let g = graph();
        let user = &g.models["User"];
        let (sql, params) = compile(user, &g, &Filter::eq("name", Value::Text("Ada".to_string()))).unwrap();
        assert_eq!(sql, "user.\"name\" = ?");
        assert_eq!(params, vec![Value::Text("Ada".into())]);
    }

    #[test]
    fn compiles_and_or_not() {
        let g = graph();
        let user = &g.models["User"];
        let filter = Filter::And(vec![
            Filter::eq("name", Value::Text("Ada".to_string())),
            Filter::Not(Box::new(Filter::Field("name".into(), FieldFilter::IsNull(true)))),
        ]);
        let (sql, _params) = compile(user, &g, &filter).unwrap();
        assert!(sql.contains("AND"));
        assert!(sql.contains("NOT"));
    }

    #[test]
    fn compiles_reverse_many_relation_with_correlated_exists() {
        let g = graph();
        let user = &g.models["User"];
        let filter = Filter::Relation(
            "addresses".into(),
            RelationFilterKind::Some,
            Box::new(Filter::eq("city", Value::Text("Oslo".to_string()))),
        );
        let (sql, params) = compile(user, &g, &filter).unwrap();
        assert!(sql.starts_with("EXISTS (SELECT 1 FROM \"address\" AS t0"));
        assert!(sql.contains("user.\"id\" = t0.\"user_id\""));
        assert_eq!(params, vec![Value::Text("Oslo".into())]);
    }

    #[test]
    fn every_over_empty_relation_is_vacuously_true() {
        let g = graph();
        let user = &g.models["User"];
        let filter = Filter::Relation(
            "addresses".into(),
            RelationFilterKind::Every,
            Box::new(Filter::eq("city", Value::Text("Oslo".to_string()))),
        );
        let (sql, _) = compile(user, &g, &filter).unwrap();
        assert!(sql.starts_with("NOT EXISTS (SELECT 1 FROM \"address\""));
        assert!(sql.contains("NOT ("));
    }

    #[test]
    fn some_on_singular_relation_is_rejected() {
        let g = graph();
        let address = &g.models["Address"];
        let filter = Filter::Relation(
            "user".into(),
            RelationFilterKind::Some,
            Box::new(Filter::eq("name", Value::Text("Ada".to_string()))),
        );
        let err = compile(address, &g, &filter).unwrap_err();
        assert!(matches!(err, QueryError::RelationFilterCardinality { .. }));
    }
}

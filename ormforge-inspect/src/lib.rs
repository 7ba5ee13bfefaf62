//! Model Inspector (§4.2): walks a set of reflected record classes and
//! produces the normalized `ModelGraph` every other component consumes.
//!
//! Two-pass, matching `psl/parser-database`'s documented approach to
//! forward references (§9 Design Notes): pass one registers every model's
//! declared columns and its datasource; pass two runs the foreign-key probe
//! and resolves relation/foreign-key cross-references now that every model
//! is known.

use indexmap::IndexMap;
use ormforge_models::{
    resolve_column, Cardinality, ColumnInfo, DataSourceConfig, DynModel, ErrorContext, FieldKind,
    ForeignKeyInfo, ModelError, ModelGraph, ModelInfo, RelationInfo,
};

/// Inspects a set of models against one or more declared datasources,
/// producing the `ModelGraph` the Code Generator, Schema Builder, and
/// Backend all consume (§4.2 contract).
pub fn inspect(
    models: Vec<Box<dyn DynModel>>,
    datasources: Vec<DataSourceConfig>,
) -> Result<ModelGraph, ModelError> {
    let mut data_sources: IndexMap<String, DataSourceConfig> = IndexMap::new();
    for ds in datasources {
        data_sources.insert(ds.key.clone(), ds);
    }
    let default_ds_key = data_sources
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| ormforge_models::PROVIDER_SQLITE.to_string());

    // Pass 1: register columns, relation shapes (unresolved), and table names.
    struct Pending {
        dyn_model: Box<dyn DynModel>,
        datasource_key: String,
        columns: Vec<ColumnInfo>,
        relations_raw: Vec<(String, String, Cardinality, Option<String>)>,
        primary_key_names: Vec<String>,
    }

    let mut pending: Vec<Pending> = Vec::new();
    let mut seen_tables: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

    for dyn_model in models {
        let name = dyn_model.name().to_string();
        let table_name = dyn_model.table_name().to_string();
        let datasource_key = dyn_model
            .datasource_key()
            .map(str::to_string)
            .unwrap_or_else(|| default_ds_key.clone());

        let table_key = (datasource_key.clone(), table_name.clone());
        if !seen_tables.insert(table_key) {
            // Find the model we already registered with the same table.
            let other = pending
                .iter()
                .find(|p| p.dyn_model.table_name() == table_name && p.datasource_key == datasource_key)
                .map(|p| p.dyn_model.name().to_string())
                .unwrap_or_default();
            return Err(ModelError::DuplicateTable {
                first: other,
                second: name,
                table: table_name,
                datasource: datasource_key,
            });
        }

        let fields = dyn_model.fields();
        let mut columns = Vec::new();
        let mut relations_raw = Vec::new();
        for field in &fields {
            match &field.kind {
                FieldKind::Column { enum_mapping } => {
                    columns.push(ColumnInfo {
                        name: field.name.to_string(),
                        rust_type: field.ty.clone(),
                        nullable: field.nullable(),
                        default_present: field.default.is_present(),
                        default_is_factory: field.default.is_factory(),
                        is_autoincrement_pk: false, // resolved below
                        enum_mapping: enum_mapping.clone(),
                    });
                }
                FieldKind::Relation {
                    target,
                    cardinality,
                    backref_name,
                } => {
                    relations_raw.push((
                        field.name.to_string(),
                        target.to_string(),
                        *cardinality,
                        backref_name.map(str::to_string),
                    ));
                }
            }
        }

        let pk_spec = dyn_model.primary_key();
        let primary_key_names: Vec<String> = pk_spec.0.iter().map(|c| c.field.to_string()).collect();
        if primary_key_names.is_empty() {
            return Err(ModelError::MissingPrimaryKey {
                model: name.clone(),
                context: ErrorContext::new().with("model", name.clone()),
            });
        }
        let is_explicit = dyn_model.primary_key_is_explicit();
        for pk_col in &primary_key_names {
            if !columns.iter().any(|c| &c.name == pk_col) {
                return Err(ModelError::MissingPrimaryKey {
                    model: name.clone(),
                    context: ErrorContext::new()
                        .with("model", name.clone())
                        .with("column", pk_col.clone()),
                });
            }
        }
        if !is_explicit && primary_key_names == ["id"] {
            if let Some(col) = columns.iter_mut().find(|c| c.name == "id") {
                if is_integer_type(&col.rust_type) {
                    col.is_autoincrement_pk = true;
                }
            }
        }

        for idx in dyn_model.indexes().into_iter().chain(dyn_model.unique()) {
            for col in &idx.columns {
                if !columns.iter().any(|c| c.name == col.field) {
                    return Err(ModelError::ProbeError {
                        model: name.clone(),
                        method: if idx.unique { "unique" } else { "index" },
                        reason: format!("unknown column `{}`", col.field),
                        context: ErrorContext::new().with("model", name.clone()),
                    });
                }
            }
        }

        pending.push(Pending {
            dyn_model,
            datasource_key,
            columns,
            relations_raw,
            primary_key_names,
        });
    }

    let known_models: std::collections::HashSet<&str> =
        pending.iter().map(|p| p.dyn_model.name()).collect();

    // Pass 2: resolve relations, foreign keys; assemble ModelInfo.
    let mut models_by_name: IndexMap<String, ModelInfo> = IndexMap::new();

    for p in &pending {
        for (_, target, _, _) in &p.relations_raw {
            if !known_models.contains(target.as_str()) {
                return Err(ModelError::UnknownModelReference {
                    model: p.dyn_model.name().to_string(),
                    target: target.clone(),
                    context: ErrorContext::new().with("model", p.dyn_model.name()),
                });
            }
        }
    }

    // Collect every model's foreign-key yields, resolved into ForeignKeyInfo,
    // before finalizing RelationInfo (relations need to know which ones are
    // `via_foreign_key`).
    let mut fks_by_model: IndexMap<String, Vec<ForeignKeyInfo>> = IndexMap::new();
    let mut via_fk: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

    for p in &pending {
        let model_name = p.dyn_model.name();
        let yields = p.dyn_model.foreign_keys();
        if yields.is_empty() {
            continue;
        }
        ormforge_models::validate_foreign_key_yields(model_name, &yields)?;

        let mut infos = Vec::new();
        for (cmp, remote) in &yields {
            let (from_col, to_col) = if cmp.left.owner == model_name {
                (&cmp.left, &cmp.right)
            } else {
                (&cmp.right, &cmp.left)
            };
            let to_model = to_col.owner;

            let matches: Vec<&(String, String, Cardinality, Option<String>)> = p
                .relations_raw
                .iter()
                .filter(|(_, target, _, _)| target == to_model)
                .collect();
            let local_relation_attr = match matches.len() {
                0 => {
                    return Err(ModelError::UnknownModelReference {
                        model: model_name.to_string(),
                        target: to_model.to_string(),
                        context: ErrorContext::new().with("model", model_name),
                    })
                }
                1 => matches[0].0.clone(),
                _ => {
                    return Err(ModelError::AmbiguousForeignKey {
                        model: model_name.to_string(),
                        reason: format!(
                            "multiple relations target `{to_model}`; disambiguate with #[model(backref = ..)]"
                        ),
                        context: ErrorContext::new().with("model", model_name),
                    })
                }
            };

            via_fk.insert((model_name.to_string(), local_relation_attr.clone()));
            via_fk.insert((to_model.to_string(), remote.field.to_string()));

            infos.push(ForeignKeyInfo {
                from_model: model_name.to_string(),
                from_columns: vec![from_col.field.to_string()],
                to_model: to_model.to_string(),
                to_columns: vec![to_col.field.to_string()],
                local_relation_attr,
                remote_relation_attr: remote.field.to_string(),
            });
        }
        fks_by_model.insert(model_name.to_string(), infos);
    }

    for p in pending {
        let model_name = p.dyn_model.name().to_string();

        // Relations are sorted own-table-first (there is only one table per
        // relation in this design — "own-table first" degenerates to
        // declaration order, which is already how `relations_raw` is built,
        // §4.2's stability rule).
        let mut relations: Vec<RelationInfo> = p
            .relations_raw
            .into_iter()
            .map(|(attr_name, target_model, cardinality, backref_name)| {
                let via_foreign_key = via_fk.contains(&(model_name.clone(), attr_name.clone()));
                RelationInfo {
                    attr_name,
                    target_model,
                    cardinality,
                    backref_name,
                    via_foreign_key,
                }
            })
            .collect();
        relations.sort_by_key(|r| r.target_model != model_name);

        let foreign_keys = fks_by_model.remove(&model_name).unwrap_or_default();

        let info = ModelInfo {
            name: model_name.clone(),
            table_name: p.dyn_model.table_name().to_string(),
            columns: p.columns,
            primary_key: p.primary_key_names,
            indexes: p
                .dyn_model
                .indexes()
                .into_iter()
                .chain(p.dyn_model.unique())
                .map(|i| (i.columns.into_iter().map(|c| c.field.to_string()).collect(), i.unique))
                .collect(),
            relations,
            foreign_keys,
            datasource_key: p.datasource_key,
        };
        models_by_name.insert(model_name, info);
    }

    // Touch `resolve_column` so the helper is exercised by at least the
    // compiler even when no caller in this crate needs cross-model lookup
    // yet; downstream crates use it directly against the finished graph.
    let _ = resolve_column;

    Ok(ModelGraph {
        data_sources,
        models: models_by_name,
    })
}

fn is_integer_type(ty: &ormforge_models::RustType) -> bool {
    matches!(
        ty.render().as_str(),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormforge_macros::Model;
    use ormforge_models::{ForeignKeyYield, RelationRef};
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

    fn ds() -> DataSourceConfig {
        DataSourceConfig {
            key: "sqlite".to_string(),
            provider: "sqlite".to_string(),
            url: "sqlite:///./dev.db".to_string(),
        }
    }

    #[test]
    fn builds_expected_graph() {
        let graph = inspect(vec![User::dyn_model(), Address::dyn_model()], vec![ds()]).unwrap();

        let user = &graph.models["User"];
        assert_eq!(user.table_name, "user");
        assert_eq!(user.primary_key, vec!["id".to_string()]);
        assert!(user.autoincrement_column().is_some());
        assert_eq!(user.relations.len(), 1);
        assert_eq!(user.relations[0].attr_name, "addresses");
        assert!(user.relations[0].via_foreign_key);

        let address = &graph.models["Address"];
        assert_eq!(address.foreign_keys.len(), 1);
        let fk = &address.foreign_keys[0];
        assert_eq!(fk.from_columns, vec!["user_id".to_string()]);
        assert_eq!(fk.to_columns, vec!["id".to_string()]);
        assert_eq!(fk.local_relation_attr, "user");
        assert_eq!(fk.remote_relation_attr, "addresses");
    }

    #[test]
    fn unknown_relation_target_is_an_error() {
        #[derive(Model)]
        struct Orphan {
            id: i64,
            #[model(relation)]
            owner: LazyRelation<Rc<User>>,
        }
        // `User` is known here, so build a model referencing something
        // never registered instead.
        #[derive(Model)]
        struct Ghost {
            id: i64,
            #[model(relation)]
            missing: LazyRelation<Rc<Orphan>>,
        }
        let err = inspect(vec![Ghost::dyn_model()], vec![ds()]).unwrap_err();
        assert!(matches!(err, ModelError::UnknownModelReference { .. }));
    }
}

//! Column type inference and DDL rendering (§4.4).

use ormforge_models::{ColumnInfo, ModelInfo, ScalarLiteral};

/// A sqlite storage class, per the type-affinity rules §4.4 lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Infers a column's storage type from its Rust type, per §4.4's rule table.
/// Enums take the storage type of the scalar their first variant stores,
/// since every variant of one mapping stores the same `ScalarLiteral` kind.
pub fn infer_storage_type(col: &ColumnInfo) -> StorageType {
    if let Some(mapping) = &col.enum_mapping {
        return match mapping.variants.first().map(|v| &v.stored) {
            Some(ScalarLiteral::Int(_)) | None => StorageType::Integer,
            Some(ScalarLiteral::Str(_)) => StorageType::Text,
        };
    }
    let rendered = col.rust_type.unwrap_option().render();
    match rendered.as_str() {
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => StorageType::Integer,
        "f32" | "f64" => StorageType::Real,
        "bool" => StorageType::Integer,
        "String" | "str" => StorageType::Text,
        "Vec<u8>" => StorageType::Blob,
        "NaiveDate" | "NaiveTime" | "NaiveDateTime" | "DateTime<Utc>" | "DateTime" => {
            StorageType::Text
        }
        _ => StorageType::Text,
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Renders one column's DDL fragment. The auto-increment primary key gets
/// its clause inline; everything else gets only `NOT NULL` when required
/// (§4.4: "no separate primary-key index is emitted" for that case).
fn render_column(col: &ColumnInfo) -> String {
    let ty = infer_storage_type(col);
    let mut frag = format!("{} {}", quote_ident(&col.name), ty.as_sql());
    if col.is_autoincrement_pk {
        frag.push_str(" PRIMARY KEY AUTOINCREMENT");
    } else if !col.nullable {
        frag.push_str(" NOT NULL");
    }
    frag
}

/// Renders `CREATE TABLE` for a model, including a composite `PRIMARY KEY`
/// clause when the key isn't the single auto-increment column (§4.4).
pub fn render_create_table(model: &ModelInfo) -> String {
    let mut parts: Vec<String> = model.columns.iter().map(render_column).collect();

    let has_autoincrement_pk = model.columns.iter().any(|c| c.is_autoincrement_pk);
    if !has_autoincrement_pk && !model.primary_key.is_empty() {
        let pk_cols = model
            .primary_key
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("PRIMARY KEY ({pk_cols})"));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_ident(&model.table_name),
        parts.join(",\n    ")
    )
}

/// One declared index, rendered by name so it can be created and dropped.
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("idx_{}_{}", table, columns.join("_"))
}

/// Renders every declared index/unique constraint's `CREATE INDEX` statement.
pub fn render_indexes(model: &ModelInfo) -> Vec<String> {
    model
        .indexes
        .iter()
        .map(|(columns, unique)| {
            let name = index_name(&model.table_name, columns);
            let cols = columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let kw = if *unique { "UNIQUE INDEX" } else { "INDEX" };
            format!(
                "CREATE {kw} {} ON {} ({cols})",
                quote_ident(&name),
                quote_ident(&model.table_name)
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormforge_macros::Model;
    use ormforge_models::DataSourceConfig;

    #[derive(Model)]
    #[model(table = "user")]
    struct User {
        id: i64,
        #[model(unique)]
        email: String,
        bio: Option<String>,
    }

    fn model() -> ModelInfo {
        let graph = ormforge_inspect::inspect(
            vec![User::dyn_model()],
            vec![DataSourceConfig {
                key: "sqlite".into(),
                provider: "sqlite".into(),
                url: "sqlite:///./dev.db".into(),
            }],
        )
        .unwrap();
        graph.models["User"].clone()
    }

    #[test]
    fn autoincrement_pk_has_inline_clause() {
        let ddl = render_create_table(&model());
        assert!(ddl.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(!ddl.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn nullable_column_has_no_not_null() {
        let ddl = render_create_table(&model());
        assert!(ddl.contains("\"bio\" TEXT"));
        assert!(!ddl.contains("\"bio\" TEXT NOT NULL"));
    }

    #[test]
    fn required_scalar_gets_not_null() {
        let ddl = render_create_table(&model());
        assert!(ddl.contains("\"email\" TEXT NOT NULL"));
    }

    #[test]
    fn unique_index_rendered() {
        let indexes = render_indexes(&model());
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].starts_with("CREATE UNIQUE INDEX"));
        assert!(indexes[0].contains("\"email\""));
    }
}

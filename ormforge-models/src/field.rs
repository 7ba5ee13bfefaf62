//! Declared-field metadata the `#[derive(Model)]` macro emits for every
//! struct field, prior to the Model Inspector turning it into `ColumnInfo`
//! or `RelationInfo` (§3, §4.2).

use crate::type_render::RustType;

/// Relation cardinality (§3 `RelationInfo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    OptionalOne,
    Many,
}

/// How a field's default value was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultSpec {
    None,
    /// A literal spelled in the generated module, e.g. `"0"`, `"false"`.
    Value(String),
    /// A factory call spelled in the generated module, e.g. `"Utc::now"`.
    Factory(String),
}

impl DefaultSpec {
    pub fn is_present(&self) -> bool {
        !matches!(self, DefaultSpec::None)
    }

    pub fn is_factory(&self) -> bool {
        matches!(self, DefaultSpec::Factory(_))
    }
}

/// A single enum member and the scalar value stored for it (§3: "Member
/// values, not member names, are stored").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub member: &'static str,
    pub stored: ScalarLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarLiteral {
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMapping {
    pub type_name: &'static str,
    pub variants: Vec<EnumVariant>,
}

/// What kind of field this is, as the macro determined from its syntactic
/// shape and any `#[model(..)]` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Column { enum_mapping: Option<EnumMapping> },
    /// `target` is the model name the annotation references; `via_foreign_key`
    /// names the `foreign_key` yield that should supply the join, when the
    /// author disambiguated it explicitly (needed when two relations target
    /// the same model).
    Relation {
        target: &'static str,
        cardinality: Cardinality,
        backref_name: Option<&'static str>,
    },
}

/// One declared field of a model, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: RustType,
    pub default: DefaultSpec,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation { .. })
    }

    pub fn nullable(&self) -> bool {
        self.ty.is_option()
    }
}

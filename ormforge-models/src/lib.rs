//! Core data model and fake-self reflection for ormforge.
//!
//! This crate has no notion of a database connection or of code generation;
//! it only defines the shapes the rest of the workspace agrees on (§3) and
//! the machinery a `#[derive(Model)]` struct plugs into (§4.1).

pub mod error;
pub mod field;
pub mod info;
pub mod reflect;
pub mod type_render;

pub use error::{ErrorContext, ModelError, ModelResult};
pub use field::{Cardinality, DefaultSpec, EnumMapping, EnumVariant, FieldKind, FieldSpec, ScalarLiteral};
pub use info::{
    resolve_column, ColumnInfo, DataSourceConfig, ForeignKeyInfo, ModelGraph, ModelInfo,
    RelationInfo, PROVIDER_SQLITE,
};
pub use reflect::{
    validate_foreign_key_yields, Col, ColumnRef, DynModel, ForeignKeyComparison, ForeignKeyYield,
    IndexSpec, MarkerMeta, ModelAdapter, PrimaryKeySpec, ProbeError, Rel, RelationRef,
};
pub use reflect::{ColumnsMarker, EnumCodec, EnumColumn, ReflectedModel};
pub use type_render::RustType;

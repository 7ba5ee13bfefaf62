//! Traits a `#[derive(Model)]` struct implements.
//!
//! `primary_key`, `index`, and `unique` are, in the source system, probe
//! methods the author writes by hand. In Rust, the struct's own field list
//! is already visible to the derive macro at expansion time (unlike in the
//! dynamic source language, where it is not), so the macro synthesizes these
//! three directly from `#[model(primary_key)]`/`#[model(index)]`/
//! `#[model(unique)]` field attributes instead of requiring an imperative
//! probe — no information is lost, only the mechanism producing it changes
//! (see DESIGN.md).
//!
//! `foreign_key` keeps the genuine fake-self probe mechanics (§4.1): it is
//! the one case the spec itself walks through with a worked example
//! (`self.user.id == self.user_id, User.addresses`) precisely because it
//! names a *remote* relation the macro cannot discover from the struct
//! alone. Models that declare `#[model(foreign_keys)]` forward to an
//! author-written inherent `fn foreign_key(cols: &Columns) -> Vec<ForeignKeyYield>`;
//! models without it get a macro-synthesized empty-vec body.

use std::marker::PhantomData;

use crate::field::{EnumMapping, FieldSpec, ScalarLiteral};
use crate::reflect::{ForeignKeyYield, IndexSpec, PrimaryKeySpec};

/// Implemented by the per-model marker struct the macro generates
/// (`UserColumns`, `AddressColumns`, ...). Carries no runtime state; it only
/// exists so probe methods have something to borrow.
pub trait ColumnsMarker: 'static + Copy {
    fn new() -> Self;
}

/// Implemented for the model struct itself by `#[derive(Model)]`.
pub trait ReflectedModel: 'static + Sized {
    type Columns: ColumnsMarker;

    const NAME: &'static str;
    const TABLE_NAME: &'static str;

    fn columns() -> Self::Columns {
        Self::Columns::new()
    }

    /// Declared fields, in declaration order, exactly as they appear in the
    /// struct.
    fn fields() -> Vec<FieldSpec>;

    /// The datasource key this model belongs to, as provided to the macro's
    /// `#[model(datasource = "...")]` attribute (defaults to the provider
    /// name when absent, resolved by the Model Inspector per §3).
    fn datasource_key() -> Option<&'static str> {
        None
    }

    fn primary_key(cols: &Self::Columns) -> PrimaryKeySpec;
    fn index(cols: &Self::Columns) -> Vec<IndexSpec>;
    fn unique(cols: &Self::Columns) -> Vec<IndexSpec>;
    fn foreign_key(cols: &Self::Columns) -> Vec<ForeignKeyYield>;

    /// True when `primary_key` came from an explicit `#[model(primary_key)]`
    /// field rather than the auto-increment `id` convention — the Model
    /// Inspector needs this to apply §3's "no explicit `primary_key` method
    /// overrides it" qualifier.
    fn primary_key_is_explicit() -> bool {
        false
    }
}

/// Implemented (by hand, not derived) for a field type used as an enum
/// column, so the Model Inspector can record the member/scalar mapping
/// (§3 `ColumnInfo::enum_mapping`).
pub trait EnumColumn: 'static {
    fn enum_mapping() -> EnumMapping;
}

/// Implemented by hand alongside `EnumColumn` for any type used as an
/// enum-mapped column, so the Backend can move values in and out of storage
/// without reflecting on `enum_mapping()`'s member names at row-decode time
/// (§3: "member values, not member names, are stored").
pub trait EnumCodec: EnumColumn + Sized {
    fn to_stored(&self) -> ScalarLiteral;
    fn from_stored(value: &ScalarLiteral) -> Option<Self>;
}

/// Type-erased handle to a model, used by the Model Inspector to walk a
/// heterogeneous set of record classes without one generic parameter per
/// model (§4.2 `inspect(models)`).
pub trait DynModel: 'static {
    fn name(&self) -> &'static str;
    fn table_name(&self) -> &'static str;
    fn datasource_key(&self) -> Option<&'static str>;
    fn fields(&self) -> Vec<FieldSpec>;
    fn primary_key(&self) -> PrimaryKeySpec;
    fn primary_key_is_explicit(&self) -> bool;
    fn indexes(&self) -> Vec<IndexSpec>;
    fn unique(&self) -> Vec<IndexSpec>;
    fn foreign_keys(&self) -> Vec<ForeignKeyYield>;
}

/// Blanket `DynModel` for any `ReflectedModel`, zero-sized at runtime.
/// `#[derive(Model)]` also emits `fn dyn_model() -> Box<dyn DynModel>` on
/// the model type returning `Box::new(ModelAdapter::<Self>::new())`.
pub struct ModelAdapter<M>(PhantomData<fn() -> M>);

impl<M> ModelAdapter<M> {
    pub const fn new() -> Self {
        ModelAdapter(PhantomData)
    }
}

impl<M> Default for ModelAdapter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ReflectedModel> DynModel for ModelAdapter<M> {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn table_name(&self) -> &'static str {
        M::TABLE_NAME
    }

    fn datasource_key(&self) -> Option<&'static str> {
        M::datasource_key()
    }

    fn fields(&self) -> Vec<FieldSpec> {
        M::fields()
    }

    fn primary_key(&self) -> PrimaryKeySpec {
        M::primary_key(&M::columns())
    }

    fn primary_key_is_explicit(&self) -> bool {
        M::primary_key_is_explicit()
    }

    fn indexes(&self) -> Vec<IndexSpec> {
        M::index(&M::columns())
    }

    fn unique(&self) -> Vec<IndexSpec> {
        M::unique(&M::columns())
    }

    fn foreign_keys(&self) -> Vec<ForeignKeyYield> {
        M::foreign_key(&M::columns())
    }
}

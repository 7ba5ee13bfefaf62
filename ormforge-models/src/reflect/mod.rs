//! The fake-self probe (§4.1), ported to Rust.
//!
//! The source system runs a record's `primary_key`/`index`/`unique`/
//! `foreign_key` method against a sentinel whose attribute accesses build up
//! a path; equality between two attribute accesses records a comparison
//! without evaluating to a boolean. Rust cannot overload `==` to return
//! anything but `bool`, so the sentinel here is a concrete marker value
//! (`Col<T>`/`Rel<M>`) generated per model by `#[derive(Model)]`, and the
//! "equality capture" becomes an explicit `.eq()` call — the same move
//! diesel-style query builders make for the same reason.
//!
//! `primary_key`/`index`/`unique`/`foreign_key` are ordinary associated
//! functions that take a reference to the generated marker struct and
//! return column references built from it; calling them *is* running the
//! probe. There is no dynamic attribute interception left to do, but the
//! shape — a sentinel receiver, captured paths, a sandboxed vocabulary — is
//! preserved, and the validation `ProbeError` catches is exactly what the
//! Python probe would have caught at yield time.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::{ErrorContext, ModelError};

pub mod traits;
pub use traits::{ColumnsMarker, DynModel, EnumCodec, EnumColumn, ModelAdapter, ReflectedModel};

/// A fully-qualified reference to a declared column, independent of any
/// generic marker type. This is what actually gets stored on `ModelInfo`,
/// `ForeignKeyInfo`, etc.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnRef {
    pub owner: &'static str,
    pub field: &'static str,
}

impl ColumnRef {
    pub fn new(owner: &'static str, field: &'static str) -> Self {
        ColumnRef { owner, field }
    }
}

/// A reference to a relation attribute on some model, standing in for the
/// source language's unbound class-attribute access (`User.addresses`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationRef {
    pub model: &'static str,
    pub field: &'static str,
}

impl RelationRef {
    pub fn new(model: &'static str, field: &'static str) -> Self {
        RelationRef { model, field }
    }
}

/// A column marker. Carries no data beyond identity — `owner`/`field` are
/// exactly the path a Python proxy attribute access would have recorded.
///
/// `Clone`/`Copy`/`Debug` are implemented by hand rather than derived: a
/// derive would add a spurious `T: Clone`/`T: Copy`/`T: Debug` bound even
/// though `T` never appears except behind `PhantomData<fn() -> T>`, which
/// would make e.g. `Col<String>` not `Copy`.
pub struct Col<T> {
    pub owner: &'static str,
    pub field: &'static str,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for Col<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Col<T> {}

impl<T> std::fmt::Debug for Col<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Col")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .finish()
    }
}

impl<T> Col<T> {
    pub const fn new(owner: &'static str, field: &'static str) -> Self {
        Col {
            owner,
            field,
            _ty: PhantomData,
        }
    }

    pub fn as_ref(&self) -> ColumnRef {
        ColumnRef::new(self.owner, self.field)
    }

    /// Records `self == other` as a `ForeignKeyComparison`, the Rust stand-in
    /// for the sentinel's overridden `__eq__`.
    pub fn eq<U>(&self, other: &Col<U>) -> ForeignKeyComparison {
        ForeignKeyComparison {
            left: self.as_ref(),
            right: other.as_ref(),
        }
    }
}

/// A relation marker. Dereferences to the target model's own column marker
/// struct, so `cols.user.id` yields a `Col` whose `owner` is `"User"` while
/// `cols.user_id` yields one whose `owner` is the declaring model — exactly
/// how the probe recovers which side of a foreign-key comparison belongs to
/// which table (§3).
#[derive(Clone, Copy)]
pub struct Rel<C> {
    pub owner: &'static str,
    pub field: &'static str,
    pub target_columns: C,
}

impl<C> std::fmt::Debug for Rel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rel")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .finish()
    }
}

impl<C> Rel<C> {
    pub const fn new(owner: &'static str, field: &'static str, target_columns: C) -> Self {
        Rel {
            owner,
            field,
            target_columns,
        }
    }

    pub fn as_ref(&self) -> RelationRef {
        RelationRef::new(self.owner, self.field)
    }
}

impl<C> std::ops::Deref for Rel<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.target_columns
    }
}

/// The result of probing `foreign_key`: `(lhs == rhs, RemoteModel.remote_attr)`
/// with the boolean replaced by a captured comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyComparison {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// Raised by the probe when a dynamic invariant the type system cannot
/// otherwise express is violated — an empty yield where one value was
/// required, or a comparison whose two sides don't involve the declaring
/// model at all.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ProbeError(pub ModelError);

/// A declared primary key: one or more columns, in yield order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeySpec(pub Vec<ColumnRef>);

impl<T> From<Col<T>> for PrimaryKeySpec {
    fn from(c: Col<T>) -> Self {
        PrimaryKeySpec(vec![c.as_ref()])
    }
}

impl<A, B> From<(Col<A>, Col<B>)> for PrimaryKeySpec {
    fn from((a, b): (Col<A>, Col<B>)) -> Self {
        PrimaryKeySpec(vec![a.as_ref(), b.as_ref()])
    }
}

impl<A, B, C> From<(Col<A>, Col<B>, Col<C>)> for PrimaryKeySpec {
    fn from((a, b, c): (Col<A>, Col<B>, Col<C>)) -> Self {
        PrimaryKeySpec(vec![a.as_ref(), b.as_ref(), c.as_ref()])
    }
}

/// A declared index or unique constraint: one composite key. `unique` marks
/// whether this came from the `unique` probe method (and is therefore also
/// a candidate lookup key per §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub columns: Vec<ColumnRef>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn non_unique(columns: Vec<ColumnRef>) -> Self {
        IndexSpec {
            columns,
            unique: false,
        }
    }

    pub fn unique(columns: Vec<ColumnRef>) -> Self {
        IndexSpec {
            columns,
            unique: true,
        }
    }
}

impl<T> From<Col<T>> for IndexSpec {
    fn from(c: Col<T>) -> Self {
        IndexSpec::non_unique(vec![c.as_ref()])
    }
}

impl<A, B> From<(Col<A>, Col<B>)> for IndexSpec {
    fn from((a, b): (Col<A>, Col<B>)) -> Self {
        IndexSpec::non_unique(vec![a.as_ref(), b.as_ref()])
    }
}

/// A single `foreign_key` yield: the comparison plus the relation it views
/// the link from, from the *remote* side.
pub type ForeignKeyYield = (ForeignKeyComparison, RelationRef);

/// Validates a batch of `foreign_key` yields for a declaring model, raising
/// `ProbeError` in place of the dynamic checks the Python probe performed at
/// yield time (§4.1 "sandboxed... fails with `ProbeError`").
pub fn validate_foreign_key_yields(
    model: &'static str,
    yields: &[ForeignKeyYield],
) -> Result<(), ModelError> {
    if yields.is_empty() {
        return Err(ModelError::ProbeError {
            model: model.to_string(),
            method: "foreign_key",
            reason: "yielded no comparisons".to_string(),
            context: ErrorContext::new().with("model", model),
        });
    }
    for (cmp, remote) in yields {
        let touches_model = cmp.left.owner == model || cmp.right.owner == model;
        if !touches_model {
            return Err(ModelError::ProbeError {
                model: model.to_string(),
                method: "foreign_key",
                reason: format!(
                    "comparison {:?} == {:?} does not reference `{model}`",
                    cmp.left, cmp.right
                ),
                context: ErrorContext::new()
                    .with("model", model)
                    .with("remote_relation", remote.field),
            });
        }
    }
    Ok(())
}

/// Per-model marker metadata the derive macro materializes once. `columns`
/// maps field name to declared `ColumnRef` for validation; `relations` maps
/// relation attribute name to the target model name.
#[derive(Debug, Clone, Default)]
pub struct MarkerMeta {
    pub columns: BTreeMap<&'static str, ColumnRef>,
    pub relations: BTreeMap<&'static str, &'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct UserColumns {
        id: Col<i64>,
    }

    #[derive(Clone, Copy)]
    struct AddressColumns {
        user_id: Col<i64>,
        user: Rel<UserColumns>,
    }

    #[test]
    fn eq_captures_both_sides_path() {
        let cols = AddressColumns {
            user_id: Col::new("Address", "user_id"),
            user: Rel::new("Address", "user", UserColumns {
                id: Col::new("User", "id"),
            }),
        };
        let cmp = cols.user.id.eq(&cols.user_id);
        assert_eq!(cmp.left, ColumnRef::new("User", "id"));
        assert_eq!(cmp.right, ColumnRef::new("Address", "user_id"));
    }

    #[test]
    fn empty_foreign_key_yields_is_an_error() {
        let err = validate_foreign_key_yields("Address", &[]);
        assert!(matches!(err, Err(ModelError::ProbeError { .. })));
    }

    #[test]
    fn foreign_key_not_touching_declaring_model_is_an_error() {
        let cmp = ForeignKeyComparison {
            left: ColumnRef::new("User", "id"),
            right: ColumnRef::new("Other", "x"),
        };
        let remote = RelationRef::new("User", "addresses");
        let err = validate_foreign_key_yields("Address", &[(cmp, remote)]);
        assert!(err.is_err());
    }

    #[test]
    fn primary_key_spec_from_tuple() {
        let id: Col<i64> = Col::new("Order", "id");
        let sku: Col<String> = Col::new("Order", "sku");
        let spec: PrimaryKeySpec = (id, sku).into();
        assert_eq!(spec.0, vec![ColumnRef::new("Order", "id"), ColumnRef::new("Order", "sku")]);
    }
}

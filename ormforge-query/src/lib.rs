//! Where Compiler (§4.5) and Backend (§4.6).

pub mod backend;
pub mod error;
pub mod where_compiler;

pub use backend::{
    Backend, ConnectionSource, FromScalar, IdentityMap, LazyRelation, PooledFactory, Query, Row,
    Scalar, SingleConnection, ToScalar,
};
pub use error::{QueryError, QueryResult};
pub use where_compiler::{compile, Direction, FieldFilter, Filter, OrderBy, Param, RelationFilterKind};

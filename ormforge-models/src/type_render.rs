//! Type Renderer (§4.1 of the system overview table): renders a type object
//! — including union, optional, and parametric forms — back to the textual
//! form the generated client module uses.
//!
//! The source language renders to Python type annotations (`Optional[int]`,
//! `list[Address]`). Here the same `RustType` tree renders to Rust type
//! syntax (`Option<i64>`, `Vec<Address>`), since the generated module is
//! itself Rust source.

use std::fmt::Write as _;

/// A type as it will appear in the generated module. Built once per field by
/// the `#[derive(Model)]` macro from the field's syntactic type and re-used
/// by codegen; never constructed dynamically at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RustType {
    /// A bare path, e.g. `i64`, `String`, `DateTime<Utc>`, or a model name.
    Path(String),
    Option(Box<RustType>),
    Vec(Box<RustType>),
    Tuple(Vec<RustType>),
}

impl RustType {
    pub fn path(s: impl Into<String>) -> Self {
        RustType::Path(s.into())
    }

    pub fn option(inner: RustType) -> Self {
        RustType::Option(Box::new(inner))
    }

    pub fn vec(inner: RustType) -> Self {
        RustType::Vec(Box::new(inner))
    }

    /// Renders the type to the textual form it will take in generated code.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            RustType::Path(p) => {
                out.push_str(p);
            }
            RustType::Option(inner) => {
                out.push_str("Option<");
                inner.render_into(out);
                out.push('>');
            }
            RustType::Vec(inner) => {
                out.push_str("Vec<");
                inner.render_into(out);
                out.push('>');
            }
            RustType::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render_into(out);
                }
                out.push(')');
            }
        }
    }

    /// Strips one layer of `Option<..>`, returning the inner type if present.
    pub fn unwrap_option(&self) -> Option<&RustType> {
        match self {
            RustType::Option(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, RustType::Option(_))
    }

    /// True if this names the given model (bare path or inside `Vec`/`Option`).
    pub fn names_model(&self, model: &str) -> bool {
        match self {
            RustType::Path(p) => p == model,
            RustType::Option(inner) | RustType::Vec(inner) => inner.names_model(model),
            RustType::Tuple(items) => items.iter().any(|t| t.names_model(model)),
        }
    }
}

impl std::fmt::Display for RustType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        write!(s, "{}", self.render())?;
        f.write_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_optional_scalar() {
        let t = RustType::option(RustType::path("String"));
        assert_eq!(t.render(), "Option<String>");
    }

    #[test]
    fn renders_vec_of_model() {
        let t = RustType::vec(RustType::path("Address"));
        assert_eq!(t.render(), "Vec<Address>");
        assert!(t.names_model("Address"));
        assert!(!t.names_model("User"));
    }

    #[test]
    fn renders_tuple() {
        let t = RustType::Tuple(vec![RustType::path("i64"), RustType::path("String")]);
        assert_eq!(t.render(), "(i64, String)");
    }
}

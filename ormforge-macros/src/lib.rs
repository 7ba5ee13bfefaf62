//! `#[derive(Model)]`.
//!
//! Expands an ordinary struct into the machinery `ormforge-inspect`'s Model
//! Inspector probes (§4.1, §4.2): a `{Model}Columns` marker struct (the
//! fake-self sentinel), a `{Model}Relations` marker with one associated
//! function per relation (standing in for unbound class-attribute access,
//! e.g. `User.addresses`), and the `ReflectedModel` impl itself.
//!
//! Field-level `#[model(..)]` attributes:
//! - `relation` — this field references another model and must be shaped
//!   `LazyRelation<Vec<Rc<T>>>` (many), `LazyRelation<Option<Rc<T>>>`
//!   (optional-one), or `LazyRelation<Rc<T>>` (one) — cardinality is
//!   inferred from the wrapped shape, matching §3 verbatim. The
//!   `LazyRelation` wrapper is what makes relation access resolve lazily
//!   (§4.6 "Lazy resolution") instead of requiring every relation to be
//!   eagerly loaded up front.
//! - `primary_key` — this column (or these columns, if repeated) forms the
//!   primary key, overriding the auto-increment `id` convention.
//! - `index`, `unique` — single-column index/unique constraint.
//! - `enum_column` — this column's type implements `EnumColumn`; its mapping
//!   is read via that trait rather than synthesized here.
//! - `default`, `default_factory` — literal or factory-call default,
//!   spelled exactly as it should appear in generated code.
//!
//! Struct-level `#[model(..)]` attributes:
//! - `table = "..."` — overrides the lower-cased struct name.
//! - `datasource = "..."` — overrides the inspector's default grouping.
//! - `foreign_keys` — forwards the `foreign_key` probe to an author-written
//!   inherent `fn foreign_key(cols: &{Model}Columns) -> Vec<ForeignKeyYield>`;
//!   absent, the macro supplies an empty-vec body.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, Type};

#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct ModelAttrs {
    table: Option<String>,
    datasource: Option<String>,
    has_foreign_keys: bool,
}

fn parse_model_attrs(attrs: &[syn::Attribute]) -> syn::Result<ModelAttrs> {
    let mut out = ModelAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                out.table = Some(lit.value());
            } else if meta.path.is_ident("datasource") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                out.datasource = Some(lit.value());
            } else if meta.path.is_ident("foreign_keys") {
                out.has_foreign_keys = true;
            } else {
                return Err(meta.error("unrecognized `model` struct attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

#[derive(Default)]
struct FieldAttrs {
    relation: bool,
    primary_key: bool,
    index: bool,
    unique: bool,
    enum_column: bool,
    default: Option<String>,
    default_factory: Option<String>,
    backref: Option<String>,
}

fn parse_field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("relation") {
                out.relation = true;
            } else if meta.path.is_ident("primary_key") {
                out.primary_key = true;
            } else if meta.path.is_ident("index") {
                out.index = true;
            } else if meta.path.is_ident("unique") {
                out.unique = true;
            } else if meta.path.is_ident("enum_column") {
                out.enum_column = true;
            } else if meta.path.is_ident("default") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                out.default = Some(lit.value());
            } else if meta.path.is_ident("default_factory") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                out.default_factory = Some(lit.value());
            } else if meta.path.is_ident("backref") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                out.backref = Some(lit.value());
            } else {
                return Err(meta.error("unrecognized `model` field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// A type's shape, as the spec's §3 cardinality rule cares about it.
enum Shape {
    Bare(Type),
    Option(Type),
    Vec(Type),
}

fn classify_shape(ty: &Type) -> Shape {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            if let syn::PathArguments::AngleBracketed(args) = &seg.arguments {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    if seg.ident == "Option" {
                        return Shape::Option(inner.clone());
                    }
                    if seg.ident == "Vec" {
                        return Shape::Vec(inner.clone());
                    }
                }
            }
        }
    }
    Shape::Bare(ty.clone())
}

fn type_name(ty: &Type) -> syn::Result<String> {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            return Ok(seg.ident.to_string());
        }
    }
    Err(syn::Error::new_spanned(ty, "expected a path type"))
}

fn generic_arg(ty: &Type, wrapper: &str) -> Option<Type> {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            if seg.ident == wrapper {
                if let syn::PathArguments::AngleBracketed(args) = &seg.arguments {
                    if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                        return Some(inner.clone());
                    }
                }
            }
        }
    }
    None
}

/// Unwraps a `#[model(relation)]` field's declared type — `LazyRelation<Rc<T>>`,
/// `LazyRelation<Option<Rc<T>>>`, or `LazyRelation<Vec<Rc<T>>>` — into the
/// target model type and its cardinality tokens.
fn classify_relation_shape(ty: &Type) -> syn::Result<(Type, TokenStream2)> {
    let wrapped = generic_arg(ty, "LazyRelation").ok_or_else(|| {
        syn::Error::new_spanned(
            ty,
            "#[model(relation)] field must be shaped `LazyRelation<Rc<T>>`, \
             `LazyRelation<Option<Rc<T>>>`, or `LazyRelation<Vec<Rc<T>>>`",
        )
    })?;
    let unwrap_rc = |rc_ty: &Type| -> syn::Result<Type> {
        generic_arg(rc_ty, "Rc").ok_or_else(|| {
            syn::Error::new_spanned(rc_ty, "relation target must be wrapped in `Rc<..>`")
        })
    };
    match classify_shape(&wrapped) {
        Shape::Vec(rc_t) => Ok((unwrap_rc(&rc_t)?, quote! { ::ormforge_models::Cardinality::Many })),
        Shape::Option(rc_t) => Ok((
            unwrap_rc(&rc_t)?,
            quote! { ::ormforge_models::Cardinality::OptionalOne },
        )),
        Shape::Bare(rc_t) => Ok((unwrap_rc(&rc_t)?, quote! { ::ormforge_models::Cardinality::One })),
    }
}

/// Builds the `ormforge_models::RustType` construction expression for a
/// field's syntactic type (the Type Renderer's input shape, §4.1).
fn rust_type_tokens(ty: &Type) -> TokenStream2 {
    match classify_shape(ty) {
        Shape::Option(inner) => {
            let inner_tokens = rust_type_tokens(&inner);
            quote! { ::ormforge_models::RustType::option(#inner_tokens) }
        }
        Shape::Vec(inner) => {
            let inner_tokens = rust_type_tokens(&inner);
            quote! { ::ormforge_models::RustType::vec(#inner_tokens) }
        }
        Shape::Bare(inner) => {
            let rendered = quote!(#inner).to_string().replace(' ', "");
            quote! { ::ormforge_models::RustType::path(#rendered) }
        }
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = input.ident.clone();
    let model_name = ident.to_string();
    let model_attrs = parse_model_attrs(&input.attrs)?;
    let table_name = model_attrs
        .table
        .unwrap_or_else(|| model_name.to_lowercase());

    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(named) => named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "#[derive(Model)] requires named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "#[derive(Model)] only applies to structs",
            ))
        }
    };

    let columns_ident = format_ident!("{}Columns", ident);
    let relations_ident = format_ident!("{}Relations", ident);

    let mut marker_fields = Vec::new();
    let mut marker_init = Vec::new();
    let mut field_spec_entries = Vec::new();
    let mut relation_const_fns = Vec::new();
    let mut pk_field_refs: Vec<TokenStream2> = Vec::new();
    let mut index_entries: Vec<TokenStream2> = Vec::new();
    let mut unique_entries: Vec<TokenStream2> = Vec::new();
    let mut has_id_i64 = false;

    for field in &fields {
        let fname = field.ident.clone().expect("named field");
        let fname_str = fname.to_string();
        let fattrs = parse_field_attrs(field)?;
        let ty = &field.ty;

        let default_tokens = match (&fattrs.default, &fattrs.default_factory) {
            (Some(lit), _) => quote! { ::ormforge_models::DefaultSpec::Value(#lit.to_string()) },
            (None, Some(factory)) => {
                quote! { ::ormforge_models::DefaultSpec::Factory(#factory.to_string()) }
            }
            (None, None) => quote! { ::ormforge_models::DefaultSpec::None },
        };

        if fattrs.relation {
            let (target_ty, cardinality_tokens) = classify_relation_shape(ty)?;
            let target_name = type_name(&target_ty)?;
            let target_columns_ident = format_ident!("{}Columns", target_name);
            let target_path = quote! { ::ormforge_models::RustType::path(#target_name) };
            let wrapped = generic_arg(ty, "LazyRelation").expect("checked by classify_relation_shape");
            let rust_type = match classify_shape(&wrapped) {
                Shape::Vec(_) => quote! { ::ormforge_models::RustType::vec(#target_path) },
                Shape::Option(_) => quote! { ::ormforge_models::RustType::option(#target_path) },
                Shape::Bare(_) => target_path,
            };
            let backref = match &fattrs.backref {
                Some(b) => quote! { Some(#b) },
                None => quote! { None },
            };

            marker_fields.push(quote! { pub #fname: ::ormforge_models::Rel<#target_columns_ident> });
            marker_init.push(quote! {
                #fname: ::ormforge_models::Rel::new(
                    #model_name, #fname_str, <#target_columns_ident as ::ormforge_models::ColumnsMarker>::new()
                )
            });
            field_spec_entries.push(quote! {
                ::ormforge_models::FieldSpec {
                    name: #fname_str,
                    ty: #rust_type,
                    default: #default_tokens,
                    kind: ::ormforge_models::FieldKind::Relation {
                        target: #target_name,
                        cardinality: #cardinality_tokens,
                        backref_name: #backref,
                    },
                }
            });
            relation_const_fns.push(quote! {
                pub const fn #fname() -> ::ormforge_models::RelationRef {
                    ::ormforge_models::RelationRef::new(#model_name, #fname_str)
                }
            });
            continue;
        }

        // Scalar column.
        let col_ty = match classify_shape(ty) {
            Shape::Option(inner) => inner,
            Shape::Vec(inner) => inner,
            Shape::Bare(inner) => inner,
        };
        marker_fields.push(quote! { pub #fname: ::ormforge_models::Col<#col_ty> });
        marker_init.push(quote! { #fname: ::ormforge_models::Col::new(#model_name, #fname_str) });

        let enum_mapping_tokens = if fattrs.enum_column {
            quote! { Some(<#col_ty as ::ormforge_models::EnumColumn>::enum_mapping()) }
        } else {
            quote! { None }
        };
        let rust_type = rust_type_tokens(ty);
        field_spec_entries.push(quote! {
            ::ormforge_models::FieldSpec {
                name: #fname_str,
                ty: #rust_type,
                default: #default_tokens,
                kind: ::ormforge_models::FieldKind::Column {
                    enum_mapping: #enum_mapping_tokens,
                },
            }
        });

        if fname_str == "id" && matches!(col_ty, Type::Path(ref p) if p.path.is_ident("i64")) {
            has_id_i64 = true;
        }

        if fattrs.primary_key {
            pk_field_refs.push(quote! { cols.#fname.as_ref() });
        }
        if fattrs.index {
            index_entries.push(quote! {
                ::ormforge_models::IndexSpec::non_unique(vec![cols.#fname.as_ref()])
            });
        }
        if fattrs.unique {
            unique_entries.push(quote! {
                ::ormforge_models::IndexSpec::unique(vec![cols.#fname.as_ref()])
            });
        }
    }

    let primary_key_is_explicit = !pk_field_refs.is_empty();
    let primary_key_body = if !pk_field_refs.is_empty() {
        quote! { ::ormforge_models::PrimaryKeySpec(vec![#(#pk_field_refs),*]) }
    } else if has_id_i64 {
        quote! { ::ormforge_models::PrimaryKeySpec(vec![cols.id.as_ref()]) }
    } else {
        // No explicit `#[model(primary_key)]` field and no conventional
        // `id: i64` column. ormforge-inspect raises `MissingPrimaryKey` for
        // an empty spec (§4.2) rather than panicking here — a derive macro
        // has no business deciding how model-time errors propagate.
        quote! { ::ormforge_models::PrimaryKeySpec(Vec::new()) }
    };

    let foreign_key_body = if model_attrs.has_foreign_keys {
        quote! { #ident::foreign_key(cols) }
    } else {
        quote! { Vec::new() }
    };

    let datasource_key_body = match model_attrs.datasource {
        Some(ds) => quote! { Some(#ds) },
        None => quote! { None },
    };

    let expanded = quote! {
        #[derive(Clone, Copy)]
        #[allow(non_snake_case)]
        pub struct #columns_ident {
            #(#marker_fields),*
        }

        impl ::ormforge_models::ColumnsMarker for #columns_ident {
            fn new() -> Self {
                #columns_ident {
                    #(#marker_init),*
                }
            }
        }

        pub struct #relations_ident;

        impl #relations_ident {
            #(#relation_const_fns)*
        }

        impl ::ormforge_models::ReflectedModel for #ident {
            type Columns = #columns_ident;

            const NAME: &'static str = #model_name;
            const TABLE_NAME: &'static str = #table_name;

            fn fields() -> Vec<::ormforge_models::FieldSpec> {
                vec![#(#field_spec_entries),*]
            }

            fn datasource_key() -> Option<&'static str> {
                #datasource_key_body
            }

            fn primary_key(cols: &Self::Columns) -> ::ormforge_models::PrimaryKeySpec {
                #primary_key_body
            }

            fn primary_key_is_explicit() -> bool {
                #primary_key_is_explicit
            }

            fn index(cols: &Self::Columns) -> Vec<::ormforge_models::IndexSpec> {
                vec![#(#index_entries),*]
            }

            fn unique(cols: &Self::Columns) -> Vec<::ormforge_models::IndexSpec> {
                vec![#(#unique_entries),*]
            }

            fn foreign_key(cols: &Self::Columns) -> Vec<::ormforge_models::ForeignKeyYield> {
                #foreign_key_body
            }
        }

        impl #ident {
            pub fn dyn_model() -> Box<dyn ::ormforge_models::DynModel> {
                Box::new(::ormforge_models::ModelAdapter::<#ident>::new())
            }
        }
    };

    Ok(expanded)
}

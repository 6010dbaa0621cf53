//! `#[lua(...)]` attribute parsing

use syn::{Attribute, ExprPath, Fields, LitStr, Result, Type};

/// How an absent struct field is filled in
pub enum FieldDefault {
    /// `#[lua(default)]`
    Trait,
    /// `#[lua(default = "path::to::fn")]`
    Path(ExprPath),
}

#[derive(Default)]
pub struct FieldAttrs {
    pub rename: Option<String>,
    pub default: Option<FieldDefault>,
}

#[derive(Default)]
pub struct VariantAttrs {
    pub rename: Option<String>,
}

pub fn field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("lua")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let name: LitStr = meta.value()?.parse()?;
                parsed.rename = Some(name.value());
                Ok(())
            } else if meta.path.is_ident("default") {
                if meta.input.peek(syn::Token![=]) {
                    let path: LitStr = meta.value()?.parse()?;
                    parsed.default = Some(FieldDefault::Path(path.parse()?));
                } else {
                    parsed.default = Some(FieldDefault::Trait);
                }
                Ok(())
            } else {
                Err(meta.error("expected `rename` or `default`"))
            }
        })?;
    }
    Ok(parsed)
}

pub fn variant_attrs(attrs: &[Attribute]) -> Result<VariantAttrs> {
    let mut parsed = VariantAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("lua")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let name: LitStr = meta.value()?.parse()?;
                parsed.rename = Some(name.value());
                Ok(())
            } else {
                Err(meta.error("expected `rename`"))
            }
        })?;
    }
    Ok(parsed)
}

/// A named field with its resolved table key
pub struct NamedField<'a> {
    pub ident: &'a syn::Ident,
    pub ty: &'a Type,
    pub key: String,
    pub default: Option<FieldDefault>,
}

pub fn named_fields(fields: &Fields) -> Result<Vec<NamedField<'_>>> {
    let mut out = Vec::new();
    for field in fields.iter() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = field_attrs(&field.attrs)?;
        let key = attrs
            .rename
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        out.push(NamedField {
            ident,
            ty: &field.ty,
            key,
            default: attrs.default,
        });
    }
    Ok(out)
}

/// Key used for a variant
pub fn variant_key(variant: &syn::Variant) -> Result<String> {
    let attrs = variant_attrs(&variant.attrs)?;
    Ok(attrs.rename.unwrap_or_else(|| variant.ident.to_string()))
}

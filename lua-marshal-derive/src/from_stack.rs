//! `#[derive(FromStack)]`

use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{parse_quote, Data, DeriveInput, Error, Fields, Lifetime, LifetimeParam, Result, Type};

use crate::attrs::{named_fields, variant_key, FieldDefault, NamedField};

pub fn expand(input: DeriveInput) -> Result<TokenStream2> {
    let name = &input.ident;
    let lua = match input.generics.lifetimes().next() {
        Some(param) => param.lifetime.clone(),
        None => Lifetime::new("'__lua", Span::call_site()),
    };

    let (body, missing) = match &input.data {
        Data::Struct(data) => struct_body(&data.fields, &lua)?,
        Data::Enum(data) => {
            let unit_only = data.variants.iter().all(|v| matches!(v.fields, Fields::Unit));
            let body = if unit_only {
                unit_enum_body(data)?
            } else {
                union_body(data, &lua)?
            };
            (body, None)
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                &input.ident,
                "FromStack cannot be derived for untagged unions",
            ))
        }
    };

    let has_lifetimes = input.generics.lifetimes().next().is_some();
    let type_params: Vec<_> = input.generics.type_params().map(|p| p.ident.clone()).collect();

    let mut generics = input.generics.clone();
    if !has_lifetimes {
        generics
            .params
            .insert(0, syn::GenericParam::Lifetime(LifetimeParam::new(lua.clone())));
    }
    {
        let other_lifetimes: Vec<_> = input
            .generics
            .lifetimes()
            .skip(1)
            .map(|p| p.lifetime.clone())
            .collect();
        let where_clause = generics.make_where_clause();
        // Borrowed fields tie every lifetime to the stack borrow
        for lifetime in other_lifetimes {
            where_clause.predicates.push(parse_quote!(#lua: #lifetime));
            where_clause.predicates.push(parse_quote!(#lifetime: #lua));
        }
        for param in &type_params {
            where_clause
                .predicates
                .push(parse_quote!(#param: ::lua_marshal::FromStack<#lua>));
        }
    }
    let (impl_generics, _, where_clause) = generics.split_for_impl();
    let (_, ty_generics, _) = input.generics.split_for_impl();

    let from_missing = missing.map(|missing| {
        quote! {
            fn from_missing() -> ::core::option::Option<Self> {
                #missing
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::lua_marshal::FromStack<#lua> for #name #ty_generics #where_clause {
            fn from_stack(
                stack: &#lua ::lua_marshal::Stack<'_>,
                index: ::std::ffi::c_int,
                cx: &mut ::lua_marshal::DecodeCx,
            ) -> ::lua_marshal::Result<Self> {
                #body
            }

            #from_missing
        }
    })
}

/// Expression producing a named field's value from the table at `table`
fn named_field_value(field: &NamedField<'_>, table: &TokenStream2, lua: &Lifetime) -> TokenStream2 {
    let ty = field.ty;
    let key = &field.key;
    let missing = match &field.default {
        Some(FieldDefault::Trait) => quote! { ::core::default::Default::default() },
        Some(FieldDefault::Path(path)) => quote! { #path() },
        None => quote! {
            <#ty as ::lua_marshal::FromStack<#lua>>::from_missing()
                .ok_or(::lua_marshal::Error::MissingValue { field: #key })?
        },
    };
    quote! {
        match ::lua_marshal::decode::composite::field::<#ty>(stack, #table, #key, cx)? {
            ::core::option::Option::Some(value) => value,
            ::core::option::Option::None => #missing,
        }
    }
}

fn element_values<'a>(types: impl Iterator<Item = &'a Type>, table: &TokenStream2) -> Vec<TokenStream2> {
    types
        .enumerate()
        .map(|(i, ty)| {
            let position = i + 1;
            quote! { ::lua_marshal::decode::composite::element::<#ty>(stack, #table, #position, cx)? }
        })
        .collect()
}

fn struct_body(fields: &Fields, lua: &Lifetime) -> Result<(TokenStream2, Option<TokenStream2>)> {
    let table = quote! { index };
    Ok(match fields {
        Fields::Named(_) => {
            let fields = named_fields(fields)?;
            let inits = fields.iter().map(|field| {
                let ident = field.ident;
                let value = named_field_value(field, &table, lua);
                quote! { #ident: #value }
            });
            let body = quote! {
                ::lua_marshal::decode::composite::expect_table(stack, index)?;
                ::core::result::Result::Ok(Self { #(#inits),* })
            };
            (body, None)
        }
        Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
            let ty = &unnamed.unnamed[0].ty;
            let body = quote! {
                <#ty as ::lua_marshal::FromStack<#lua>>::from_stack(stack, index, cx).map(Self)
            };
            let missing = quote! {
                <#ty as ::lua_marshal::FromStack<#lua>>::from_missing().map(Self)
            };
            (body, Some(missing))
        }
        Fields::Unnamed(unnamed) => {
            let values = element_values(unnamed.unnamed.iter().map(|f| &f.ty), &table);
            let body = quote! {
                ::lua_marshal::decode::composite::expect_table(stack, index)?;
                ::core::result::Result::Ok(Self(#(#values),*))
            };
            (body, None)
        }
        Fields::Unit => {
            let body = quote! {
                ::lua_marshal::decode::composite::expect_empty(stack, index)?;
                ::core::result::Result::Ok(Self)
            };
            (body, None)
        }
    })
}

fn unit_enum_body(data: &syn::DataEnum) -> Result<TokenStream2> {
    let mut arms = Vec::new();
    for variant in &data.variants {
        let ident = &variant.ident;
        let key = variant_key(variant)?;
        arms.push(quote! { #key => ::core::result::Result::Ok(Self::#ident), });
    }
    Ok(quote! {
        ::lua_marshal::decode::composite::enum_tag(stack, index, |tag| match tag {
            #(#arms)*
            other => ::core::result::Result::Err(::lua_marshal::Error::InvalidEnumTagName {
                name: ::std::string::ToString::to_string(other),
            }),
        })
    })
}

fn union_body(data: &syn::DataEnum, lua: &Lifetime) -> Result<TokenStream2> {
    let payload = quote! { payload };
    let mut arms = Vec::new();
    for variant in &data.variants {
        let ident = &variant.ident;
        let key = variant_key(variant)?;

        let decode = match &variant.fields {
            Fields::Unit => quote! {
                ::lua_marshal::decode::composite::expect_empty(stack, payload)?;
                ::core::result::Result::Ok(Self::#ident)
            },
            Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                let ty = &unnamed.unnamed[0].ty;
                quote! {
                    <#ty as ::lua_marshal::FromStack<#lua>>::from_stack(stack, payload, cx)
                        .map(Self::#ident)
                }
            }
            Fields::Unnamed(unnamed) => {
                let values = element_values(unnamed.unnamed.iter().map(|f| &f.ty), &payload);
                quote! {
                    ::lua_marshal::decode::composite::expect_table(stack, payload)?;
                    ::core::result::Result::Ok(Self::#ident(#(#values),*))
                }
            }
            Fields::Named(_) => {
                let fields = named_fields(&variant.fields)?;
                let inits = fields.iter().map(|field| {
                    let ident = field.ident;
                    let value = named_field_value(field, &payload, lua);
                    quote! { #ident: #value }
                });
                quote! {
                    ::lua_marshal::decode::composite::expect_table(stack, payload)?;
                    ::core::result::Result::Ok(Self::#ident { #(#inits),* })
                }
            }
        };

        arms.push(quote! { #key => { #decode } });
    }

    Ok(quote! {
        ::lua_marshal::decode::composite::union_entry(stack, index, cx, |tag, payload, cx| {
            match tag {
                #(#arms)*
                other => ::core::result::Result::Err(::lua_marshal::Error::InvalidTagName {
                    name: ::std::string::ToString::to_string(other),
                }),
            }
        })
    })
}

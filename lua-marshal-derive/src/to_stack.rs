//! `#[derive(ToStack)]`

use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_quote, Data, DeriveInput, Error, Fields, Result};

use crate::attrs::{named_fields, variant_key};

pub fn expand(input: DeriveInput) -> Result<TokenStream2> {
    let name = &input.ident;

    let body = match &input.data {
        Data::Struct(data) => struct_body(&data.fields)?,
        Data::Enum(data) => {
            let unit_only = data.variants.iter().all(|v| matches!(v.fields, Fields::Unit));
            if unit_only {
                unit_enum_body(data)?
            } else {
                union_body(data)?
            }
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                &input.ident,
                "ToStack cannot be derived for untagged unions",
            ))
        }
    };

    let mut generics = input.generics.clone();
    {
        let where_clause = generics.make_where_clause();
        for param in input.generics.type_params() {
            let ident = &param.ident;
            where_clause
                .predicates
                .push(parse_quote!(#ident: ::lua_marshal::ToStack));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::lua_marshal::ToStack for #name #ty_generics #where_clause {
            fn to_stack(
                self,
                stack: &mut ::lua_marshal::Stack<'_>,
            ) -> ::lua_marshal::Result<()> {
                #body
            }
        }
    })
}

fn struct_body(fields: &Fields) -> Result<TokenStream2> {
    Ok(match fields {
        Fields::Named(_) => {
            let fields = named_fields(fields)?;
            let count = fields.len();
            let sets = fields.iter().map(|field| {
                let ident = field.ident;
                let key = &field.key;
                quote! { stack.set_field(table, #key, self.#ident)?; }
            });
            quote! {
                let table = stack.new_table(0, #count)?;
                #(#sets)*
                ::core::result::Result::Ok(())
            }
        }
        Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
            quote! { ::lua_marshal::ToStack::to_stack(self.0, stack) }
        }
        Fields::Unnamed(unnamed) => {
            let count = unnamed.unnamed.len();
            let sets = (0..count).map(|i| {
                let member = syn::Index::from(i);
                let position = i + 1;
                quote! { stack.set_index(table, #position, self.#member)?; }
            });
            quote! {
                let table = stack.new_table(#count, 0)?;
                #(#sets)*
                ::core::result::Result::Ok(())
            }
        }
        Fields::Unit => quote! {
            stack.new_table(0, 0)?;
            ::core::result::Result::Ok(())
        },
    })
}

fn unit_enum_body(data: &syn::DataEnum) -> Result<TokenStream2> {
    let mut arms = Vec::new();
    for variant in &data.variants {
        let ident = &variant.ident;
        let key = variant_key(variant)?;
        arms.push(quote! { Self::#ident => stack.push_bytes(#key.as_bytes()), });
    }
    Ok(quote! {
        match self {
            #(#arms)*
        }
    })
}

fn union_body(data: &syn::DataEnum) -> Result<TokenStream2> {
    let mut arms = Vec::new();
    for variant in &data.variants {
        let ident = &variant.ident;
        let key = variant_key(variant)?;

        let (pattern, payload) = match &variant.fields {
            Fields::Unit => (
                quote! { Self::#ident },
                quote! { stack.new_table(0, 0)?; },
            ),
            Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => (
                quote! { Self::#ident(__field0) },
                quote! { ::lua_marshal::ToStack::to_stack(__field0, stack)?; },
            ),
            Fields::Unnamed(unnamed) => {
                let count = unnamed.unnamed.len();
                let bindings: Vec<_> = (0..count).map(|i| format_ident!("__field{}", i)).collect();
                let positions = 1..=count;
                (
                    quote! { Self::#ident(#(#bindings),*) },
                    quote! {
                        let payload = stack.new_table(#count, 0)?;
                        #(stack.set_index(payload, #positions, #bindings)?;)*
                    },
                )
            }
            Fields::Named(_) => {
                let fields = named_fields(&variant.fields)?;
                let count = fields.len();
                let idents: Vec<_> = fields.iter().map(|f| f.ident).collect();
                let keys: Vec<_> = fields.iter().map(|f| f.key.as_str()).collect();
                (
                    quote! { Self::#ident { #(#idents),* } },
                    quote! {
                        let payload = stack.new_table(0, #count)?;
                        #(stack.set_field(payload, #keys, #idents)?;)*
                    },
                )
            }
        };

        arms.push(quote! {
            #pattern => {
                let table = stack.new_table(0, 1)?;
                stack.push_bytes(#key.as_bytes())?;
                #payload
                stack.raw_set(table);
                ::core::result::Result::Ok(())
            }
        });
    }
    Ok(quote! {
        match self {
            #(#arms)*
        }
    })
}

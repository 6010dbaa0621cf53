//! `#[derive(ErrorName)]`

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Error, Result};

use crate::attrs::variant_key;

pub fn expand(input: DeriveInput) -> Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let mut arms = Vec::new();
            for variant in &data.variants {
                let ident = &variant.ident;
                let key = variant_key(variant)?;
                arms.push(quote! {
                    Self::#ident { .. } => ::std::borrow::Cow::Borrowed(#key),
                });
            }
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(_) => {
            let key = name.to_string();
            quote! { ::std::borrow::Cow::Borrowed(#key) }
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                &input.ident,
                "ErrorName cannot be derived for untagged unions",
            ))
        }
    };

    Ok(quote! {
        impl #impl_generics ::lua_marshal::ErrorName for #name #ty_generics #where_clause {
            fn error_name(&self) -> ::std::borrow::Cow<'_, str> {
                #body
            }
        }
    })
}

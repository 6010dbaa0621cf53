//! Derive macros for lua-marshal.
//!
//! - `ToStack` / `FromStack`: structs map to tables keyed by field name,
//!   tuple structs to sequences, newtypes to their inner value, unit-only
//!   enums to their variant name and other enums to single-key tables.
//! - `ErrorName`: the variant name used when a bound function fails.
//!
//! Field and variant attributes:
//!
//! ```ignore
//! #[derive(ToStack, FromStack)]
//! struct Config {
//!     #[lua(rename = "type")]
//!     kind: String,
//!     #[lua(default)]
//!     retries: u32,
//!     #[lua(default = "default_timeout")]
//!     timeout: f64,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod attrs;
mod error_name;
mod from_stack;
mod to_stack;

/// Derive `ToStack`
#[proc_macro_derive(ToStack, attributes(lua))]
pub fn derive_to_stack(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match to_stack::expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derive `FromStack`
#[proc_macro_derive(FromStack, attributes(lua))]
pub fn derive_from_stack(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match from_stack::expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derive `ErrorName`
#[proc_macro_derive(ErrorName, attributes(lua))]
pub fn derive_error_name(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match error_name::expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

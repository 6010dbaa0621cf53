//! lua-marshal - typed values across the Lua C API stack
//!
//! Native Rust values go onto a VM stack through [`ToStack`] and come back
//! through [`FromStack`]. Structs and enums get both through derive macros:
//!
//! - structs become tables keyed by field name
//! - unit-only enums become their variant name
//! - enums with data become single-key tables naming the active variant
//!
//! [`bind`] turns a native `Fn` into a VM-callable closure, and [`Module`]
//! collects such closures into a table for the VM.
//!
//! ```
//! use lua_marshal::{bind, FromStack, ToStack, Vm};
//!
//! #[derive(Debug, PartialEq, ToStack, FromStack)]
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! fn main() -> lua_marshal::Result<()> {
//!     let mut vm = Vm::new()?;
//!     vm.set_global("origin", Point { x: 3, y: 4 })?;
//!     vm.set_global("add", bind(|a: i64, b: i64| a + b))?;
//!
//!     let sum: i64 = vm.eval("return add(origin.x, origin.y)")?;
//!     assert_eq!(sum, 7);
//!
//!     let point: Point = vm.eval("return { x = 1, y = 2 }")?;
//!     assert_eq!(point, Point { x: 1, y: 2 });
//!     Ok(())
//! }
//! ```

extern crate self as lua_marshal;

pub mod bind;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod logging;
pub mod types;
pub mod vm;

pub use bind::{bind, stats, BindingStats, ErrorName, Function, Module, NativeFn, ReturnValue};
pub use config::{DecodeConfig, MarshalConfig, VmConfig};
pub use decode::{DecodeCx, FromStack, FromStackOwned, Parsed};
pub use encode::{PushArgs, ToStack};
pub use error::{Error, Result};
pub use types::{ByteStr, ByteString, Truthy, Void};
pub use vm::{LuaType, Stack, Vm};

pub use lua_marshal_derive::{ErrorName, FromStack, ToStack};

/// Raw VM bindings, for hosts that call the C API directly
pub use mlua_sys as ffi;

//! Value encoder - native values to stack values
//!
//! Every implementation pushes exactly one value. Shapes with no
//! implementation fail to compile; in particular `*const T` cannot be
//! encoded, because the VM may write through any userdata handle it holds:
//!
//! ```compile_fail
//! use lua_marshal::{Stack, ToStack};
//!
//! fn push_read_only(stack: &mut Stack<'_>, value: &u32) {
//!     let ptr: *const u32 = value;
//!     stack.encode(ptr).ok();
//! }
//! ```

#[cfg(test)]
mod tests;

use mlua_sys as ffi;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{c_int, c_void};
use std::hash::BuildHasher;
use std::mem;

use crate::error::{Error, Result};
use crate::types::{ByteStr, ByteString, Truthy, Void};
use crate::vm::Stack;

/// Conversion of a native value into one stack value
pub trait ToStack {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()>;
}

/// Push `value` as a float number only if the float holds it exactly
fn push_exact_number(stack: &mut Stack<'_>, value: i128, target: &'static str) -> Result<()> {
    let n = value as ffi::lua_Number;
    if n as i128 != value {
        return Err(Error::not_convertible(target));
    }
    stack.push_number(n)
}

macro_rules! impl_signed {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToStack for $ty {
                #[inline]
                fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
                    match ffi::lua_Integer::try_from(self) {
                        Ok(n) => stack.push_integer(n),
                        Err(_) => push_exact_number(stack, self as i128, "lua_Integer"),
                    }
                }
            }
        )*
    };
}

macro_rules! impl_unsigned {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToStack for $ty {
                #[inline]
                fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
                    match ffi::lua_Integer::try_from(self) {
                        Ok(n) => stack.push_integer(n),
                        // Same width: two's complement, read back by the unsigned decoders
                        Err(_) if mem::size_of::<$ty>() == mem::size_of::<ffi::lua_Integer>() => {
                            stack.push_integer(self as ffi::lua_Integer)
                        }
                        Err(_) => push_exact_number(stack, self as i128, "lua_Integer"),
                    }
                }
            }
        )*
    };
}

impl_signed!(i8, i16, i32, i64, isize);
impl_unsigned!(u8, u16, u32, u64, usize);

impl ToStack for f64 {
    #[inline]
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_number(self as ffi::lua_Number)
    }
}

impl ToStack for f32 {
    #[inline]
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_number(self as ffi::lua_Number)
    }
}

impl ToStack for bool {
    #[inline]
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bool(self)
    }
}

impl ToStack for Truthy {
    #[inline]
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bool(self.0)
    }
}

impl ToStack for &str {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bytes(self.as_bytes())
    }
}

impl ToStack for String {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bytes(self.as_bytes())
    }
}

impl ToStack for &String {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bytes(self.as_bytes())
    }
}

impl ToStack for ByteStr<'_> {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bytes(self.0)
    }
}

impl ToStack for ByteString {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_bytes(&self.0)
    }
}

impl<T: ToStack> ToStack for Option<T> {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        match self {
            Some(value) => value.to_stack(stack),
            None => stack.push_nil(),
        }
    }
}

impl<T: ToStack> ToStack for Box<T> {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        (*self).to_stack(stack)
    }
}

/// Light userdata holding the address
impl<T> ToStack for *mut T {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.push_light_userdata(self as *mut c_void)
    }
}

impl ToStack for Void {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.new_table(0, 0).map(drop)
    }
}

fn push_sequence<T, I>(stack: &mut Stack<'_>, len: usize, items: I) -> Result<()>
where
    T: ToStack,
    I: IntoIterator<Item = T>,
{
    let table = stack.new_table(len, 0)?;
    for (position, item) in items.into_iter().enumerate() {
        stack.set_index(table, position + 1, item)?;
    }
    Ok(())
}

impl<T: ToStack, const N: usize> ToStack for [T; N] {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        push_sequence(stack, N, self)
    }
}

impl<T: ToStack> ToStack for Vec<T> {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        let len = self.len();
        push_sequence(stack, len, self)
    }
}

impl<T: ToStack + Clone> ToStack for &[T] {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        push_sequence(stack, self.len(), self.iter().cloned())
    }
}

impl<K: ToStack, V: ToStack, S: BuildHasher> ToStack for HashMap<K, V, S> {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        let table = stack.new_table(0, self.len())?;
        for (key, value) in self {
            stack.set_entry(table, key, value)?;
        }
        Ok(())
    }
}

impl<K: ToStack, V: ToStack> ToStack for BTreeMap<K, V> {
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        let table = stack.new_table(0, self.len())?;
        for (key, value) in self {
            stack.set_entry(table, key, value)?;
        }
        Ok(())
    }
}

/// An argument list pushed as consecutive stack values
pub trait PushArgs {
    /// Push every argument and return how many were pushed
    fn push_args(self, stack: &mut Stack<'_>) -> Result<c_int>;
}

impl PushArgs for () {
    fn push_args(self, _stack: &mut Stack<'_>) -> Result<c_int> {
        Ok(0)
    }
}

macro_rules! impl_push_args {
    ($($arg:ident $value:ident),+) => {
        impl<$($arg: ToStack),+> PushArgs for ($($arg,)+) {
            fn push_args(self, stack: &mut Stack<'_>) -> Result<c_int> {
                let ($($value,)+) = self;
                let mut count = 0;
                $(
                    $value.to_stack(stack)?;
                    count += 1;
                )+
                Ok(count)
            }
        }
    };
}

impl_push_args!(A1 a1);
impl_push_args!(A1 a1, A2 a2);
impl_push_args!(A1 a1, A2 a2, A3 a3);
impl_push_args!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_push_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_push_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_push_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_push_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

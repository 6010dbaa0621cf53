//! Value decoder - stack values to native values
//!
//! Two modes share one trait. [`Stack::decode`] may hand out values that
//! borrow VM strings for as long as the stack stays shared.
//! [`Stack::decode_alloc`] needs the stack exclusively, accepts only owned
//! types and wraps the result in a [`Parsed`] capsule that records what the
//! decode allocated. Only the exclusive mode runs `__index` metamethods.

pub mod composite;


use mlua_sys as ffi;
use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{c_int, c_void};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;
use std::ops::Deref;

use crate::config::DecodeConfig;
use crate::error::{Error, Result};
use crate::logging;
use crate::types::{ByteStr, ByteString, Truthy, Void};
use crate::vm::{LuaType, Stack};

/// Conversion of the stack value at an absolute index into a native value
///
/// `'s` is the lifetime of the shared stack borrow; borrowed results such as
/// `&'s str` point into VM strings anchored in the stack.
pub trait FromStack<'s>: Sized {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self>;

    /// Value used for an absent struct field, if the type has one
    fn from_missing() -> Option<Self> {
        None
    }
}

/// Types that decode without borrowing from the stack
pub trait FromStackOwned: for<'s> FromStack<'s> {}

impl<T> FromStackOwned for T where T: for<'s> FromStack<'s> {}

/// Per-decode state: limits, current nesting depth and bytes allocated
#[derive(Debug, Clone)]
pub struct DecodeCx {
    config: DecodeConfig,
    depth: usize,
    allocated: usize,
    borrowing: bool,
}

impl DecodeCx {
    /// `borrowing` contexts never run VM code. Only exclusive decodes build
    /// one without it.
    pub(crate) fn new(config: DecodeConfig, borrowing: bool) -> Self {
        DecodeCx {
            config,
            depth: 0,
            allocated: 0,
            borrowing,
        }
    }

    pub fn config(&self) -> DecodeConfig {
        self.config
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes charged so far
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn is_borrowing(&self) -> bool {
        self.borrowing
    }

    /// Run `f` one nesting level deeper
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.config.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Count `bytes` against the allocation budget
    pub fn charge(&mut self, bytes: usize) -> Result<()> {
        let total = self.allocated.checked_add(bytes).ok_or(Error::OutOfMemory)?;
        if let Some(limit) = self.config.alloc_limit {
            if total > limit {
                return Err(Error::OutOfMemory);
            }
        }
        self.allocated = total;
        Ok(())
    }
}

/// Owned result of [`Stack::decode_alloc`]
///
/// Dropping the capsule frees everything the decode allocated.
pub struct Parsed<T> {
    value: T,
    allocated: usize,
}

impl<T> Parsed<T> {
    pub(crate) fn new(value: T, allocated: usize) -> Self {
        Parsed { value, allocated }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// Bytes of strings and sequences charged while decoding
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Drop the value now
    pub fn release(self) {
        logging::log_release(type_name::<T>(), self.allocated);
        drop(self.value);
    }
}

impl<T> Deref for Parsed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Parsed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parsed")
            .field("value", &self.value)
            .field("allocated", &self.allocated)
            .finish()
    }
}

// ============================================================================
// Scalars
// ============================================================================

pub(crate) fn wrong_type(stack: &Stack<'_>, index: c_int, expected: &'static str) -> Error {
    Error::wrong_type(expected, stack.type_of(index).name())
}

macro_rules! impl_integer {
    ($($ty:ty => $wrap:expr),* $(,)?) => {
        $(
            impl<'s> FromStack<'s> for $ty {
                fn from_stack(stack: &'s Stack<'_>, index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
                    let mut isnum = 0;
                    let n = unsafe { ffi::lua_tointegerx(stack.as_ptr(), index, &mut isnum) };
                    if isnum != 0 {
                        if let Ok(value) = <$ty>::try_from(n) {
                            return Ok(value);
                        }
                        // Unsigned values past the signed range arrive in two's complement
                        if $wrap && n < 0 && mem::size_of::<$ty>() == mem::size_of::<ffi::lua_Integer>() {
                            return Ok(n as $ty);
                        }
                        return Err(Error::not_convertible(stringify!($ty)));
                    }

                    // Integral floats outside the VM integer range
                    let n = unsafe { ffi::lua_tonumberx(stack.as_ptr(), index, &mut isnum) };
                    if isnum != 0
                        && n.fract() == 0.0
                        && n >= <$ty>::MIN as ffi::lua_Number
                        && n < <$ty>::MAX as ffi::lua_Number + 1.0
                    {
                        return Ok(n as $ty);
                    }
                    Err(Error::not_convertible(stringify!($ty)))
                }
            }
        )*
    };
}

impl_integer!(
    i8 => false,
    i16 => false,
    i32 => false,
    i64 => false,
    isize => false,
    u8 => true,
    u16 => true,
    u32 => true,
    u64 => true,
    usize => true,
);

impl<'s> FromStack<'s> for f64 {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
        let mut isnum = 0;
        let n = unsafe { ffi::lua_tonumberx(stack.as_ptr(), index, &mut isnum) };
        if isnum == 0 {
            return Err(Error::not_convertible("f64"));
        }
        Ok(n as f64)
    }
}

impl<'s> FromStack<'s> for f32 {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        let n = f64::from_stack(stack, index, cx).map_err(|_| Error::not_convertible("f32"))?;
        let narrowed = n as f32;
        if n.is_finite() && narrowed.is_infinite() {
            return Err(Error::not_convertible("f32"));
        }
        Ok(narrowed)
    }
}

impl<'s> FromStack<'s> for bool {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
        if stack.type_of(index) != LuaType::Boolean {
            return Err(wrong_type(stack, index, "boolean"));
        }
        Ok(unsafe { ffi::lua_toboolean(stack.as_ptr(), index) } != 0)
    }
}

impl<'s> FromStack<'s> for Truthy {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
        Ok(Truthy(unsafe { ffi::lua_toboolean(stack.as_ptr(), index) } != 0))
    }
}

/// Accepts any value, including none
impl<'s> FromStack<'s> for () {
    fn from_stack(_stack: &'s Stack<'_>, _index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
        Ok(())
    }
}

// ============================================================================
// Strings
// ============================================================================

/// Bytes of the string at `index`. Numbers are not coerced.
pub(crate) fn string_bytes<'s>(stack: &'s Stack<'_>, index: c_int) -> Result<&'s [u8]> {
    if stack.type_of(index) != LuaType::String {
        return Err(wrong_type(stack, index, "string"));
    }
    let mut len = 0usize;
    let ptr = unsafe { ffi::lua_tolstring(stack.as_ptr(), index, &mut len) };
    if ptr.is_null() {
        return Err(Error::not_convertible("string"));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr as *const u8, len) })
}

/// String bytes handed out past the decode. A context that may still run
/// metamethods could let VM code release them.
fn borrowed_bytes<'s>(stack: &'s Stack<'_>, index: c_int, cx: &DecodeCx) -> Result<&'s [u8]> {
    if !cx.is_borrowing() {
        return Err(Error::BorrowedTemporary);
    }
    string_bytes(stack, index)
}

fn owned_bytes(bytes: &[u8], cx: &mut DecodeCx) -> Result<Vec<u8>> {
    cx.charge(bytes.len())?;
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(bytes.len())
        .map_err(|_| Error::OutOfMemory)?;
    owned.extend_from_slice(bytes);
    Ok(owned)
}

impl<'s> FromStack<'s> for &'s str {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        let bytes = borrowed_bytes(stack, index, cx)?;
        std::str::from_utf8(bytes).map_err(|_| Error::not_convertible("str"))
    }
}

impl<'s> FromStack<'s> for ByteStr<'s> {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        borrowed_bytes(stack, index, cx).map(ByteStr)
    }
}

impl<'s> FromStack<'s> for String {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        let bytes = string_bytes(stack, index)?;
        std::str::from_utf8(bytes).map_err(|_| Error::not_convertible("String"))?;
        let owned = owned_bytes(bytes, cx)?;
        String::from_utf8(owned).map_err(|_| Error::not_convertible("String"))
    }
}

impl<'s> FromStack<'s> for ByteString {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        let bytes = string_bytes(stack, index)?;
        owned_bytes(bytes, cx).map(ByteString)
    }
}

// ============================================================================
// Wrappers
// ============================================================================

impl<'s, T: FromStack<'s>> FromStack<'s> for Option<T> {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        if stack.type_of(index).is_nil_or_none() {
            return Ok(None);
        }
        T::from_stack(stack, index, cx).map(Some)
    }

    fn from_missing() -> Option<Self> {
        Some(None)
    }
}

impl<'s, T: FromStack<'s>> FromStack<'s> for Box<T> {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        cx.charge(mem::size_of::<T>())?;
        T::from_stack(stack, index, cx).map(Box::new)
    }

    fn from_missing() -> Option<Self> {
        T::from_missing().map(Box::new)
    }
}

/// Address of a light or full userdata
impl<'s, T> FromStack<'s> for *mut T {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
        match stack.type_of(index) {
            LuaType::LightUserdata | LuaType::Userdata => {
                let ptr: *mut c_void = unsafe { ffi::lua_touserdata(stack.as_ptr(), index) };
                Ok(ptr as *mut T)
            }
            _ => Err(wrong_type(stack, index, "userdata")),
        }
    }
}

impl<'s> FromStack<'s> for Void {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, _cx: &mut DecodeCx) -> Result<Self> {
        composite::expect_empty(stack, index).map(|()| Void)
    }
}

// ============================================================================
// Collections
// ============================================================================

impl<'s, T: FromStack<'s>> FromStack<'s> for Vec<T> {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        composite::sequence(stack, index, cx)
    }
}

impl<'s, T: FromStack<'s>, const N: usize> FromStack<'s> for [T; N] {
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        composite::expect_table(stack, index)?;
        let mut items = Vec::new();
        items.try_reserve_exact(N).map_err(|_| Error::OutOfMemory)?;
        for position in 1..=N {
            items.push(composite::element(stack, index, position, cx)?);
        }
        <[T; N]>::try_from(items).map_err(|_| Error::not_convertible("array"))
    }
}

impl<'s, K, V, S> FromStack<'s> for HashMap<K, V, S>
where
    K: FromStack<'s> + Eq + Hash,
    V: FromStack<'s>,
    S: BuildHasher + Default,
{
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        let mut map = HashMap::default();
        composite::entries(stack, index, cx, |key, value, cx| {
            cx.charge(mem::size_of::<(K, V)>())?;
            let key = K::from_stack(stack, key, cx)?;
            let value = V::from_stack(stack, value, cx)?;
            map.insert(key, value);
            Ok(())
        })?;
        Ok(map)
    }
}

impl<'s, K, V> FromStack<'s> for BTreeMap<K, V>
where
    K: FromStack<'s> + Ord,
    V: FromStack<'s>,
{
    fn from_stack(stack: &'s Stack<'_>, index: c_int, cx: &mut DecodeCx) -> Result<Self> {
        let mut map = BTreeMap::new();
        composite::entries(stack, index, cx, |key, value, cx| {
            cx.charge(mem::size_of::<(K, V)>())?;
            let key = K::from_stack(stack, key, cx)?;
            let value = V::from_stack(stack, value, cx)?;
            map.insert(key, value);
            Ok(())
        })?;
        Ok(map)
    }
}

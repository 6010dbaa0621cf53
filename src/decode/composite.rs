//! Table walkers shared by collection decoders and derived code
//!
//! Every helper takes absolute indices, pushes its temporaries inside a
//! [`Slot`] and descends through [`DecodeCx::nested`], so a failing decode at
//! any depth leaves the stack where it started.

use mlua_sys as ffi;
use std::ffi::c_int;
use std::mem;

use super::{string_bytes, wrong_type, DecodeCx, FromStack};
use crate::error::{Error, Result};
use crate::vm::{LuaType, Stack};

/// Scratch region above the current top, truncated on drop
pub struct Slot<'a> {
    state: *mut ffi::lua_State,
    base: c_int,
    _stack: std::marker::PhantomData<&'a ()>,
}

impl<'a> Slot<'a> {
    pub fn new(stack: &'a Stack<'_>) -> Self {
        Slot {
            state: stack.as_ptr(),
            base: stack.top(),
            _stack: std::marker::PhantomData,
        }
    }

    /// Top when the slot was opened
    pub fn base(&self) -> c_int {
        self.base
    }

    /// Drop everything pushed since `base() + keep`
    pub fn truncate(&self, keep: c_int) {
        unsafe { ffi::lua_settop(self.state, self.base + keep) }
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        unsafe { ffi::lua_settop(self.state, self.base) }
    }
}

/// The value at `index` must be a table
pub fn expect_table(stack: &Stack<'_>, index: c_int) -> Result<()> {
    if stack.type_of(index) != LuaType::Table {
        return Err(wrong_type(stack, index, "table"));
    }
    Ok(())
}

/// The value at `index` must be a table with no entries
pub fn expect_empty(stack: &Stack<'_>, index: c_int) -> Result<()> {
    expect_table(stack, index)?;
    stack.check_stack(2)?;
    let _slot = Slot::new(stack);
    unsafe { ffi::lua_pushnil(stack.as_ptr()) };
    if unsafe { ffi::lua_next(stack.as_ptr(), index) } != 0 {
        return Err(Error::TableIsNotEmpty);
    }
    Ok(())
}

fn has_index_metamethod(stack: &Stack<'_>, table: c_int) -> bool {
    let state = stack.as_ptr();
    let _slot = Slot::new(stack);
    unsafe {
        if ffi::lua_getmetatable(state, table) == 0 {
            return false;
        }
        ffi::lua_pushlstring(state, c"__index".as_ptr(), "__index".len());
        ffi::lua_rawget(state, -2);
        ffi::lua_type(state, -1) != ffi::LUA_TNIL
    }
}

unsafe extern "C-unwind" fn index_table(state: *mut ffi::lua_State) -> c_int {
    ffi::lua_gettable(state, 1);
    1
}

/// With a key at the top, push `table[key]`. Plain tables are read raw;
/// an absent key on a table with `__index` goes through the metamethod
/// chain inside a protected call.
fn get(stack: &Stack<'_>, table: c_int, cx: &DecodeCx) -> Result<()> {
    let state = stack.as_ptr();
    let key = stack.top();
    unsafe {
        ffi::lua_pushvalue(state, key);
        ffi::lua_rawget(state, table);
        if ffi::lua_type(state, -1) != ffi::LUA_TNIL || !has_index_metamethod(stack, table) {
            return Ok(());
        }
    }

    if cx.is_borrowing() {
        return Err(Error::BorrowedTemporary);
    }

    unsafe {
        ffi::lua_settop(state, key);
        ffi::lua_pushcfunction(state, index_table);
        ffi::lua_pushvalue(state, table);
        ffi::lua_pushvalue(state, key);
        if ffi::lua_pcall(state, 2, 1, 0) != ffi::LUA_OK {
            let message = String::from_utf8_lossy(string_bytes(stack, -1).unwrap_or(b"error in __index"))
                .into_owned();
            return Err(Error::Runtime { message });
        }
    }
    Ok(())
}

/// Decode `table[name]`; `None` when the key is absent or nil
pub fn field<'s, T: FromStack<'s>>(
    stack: &'s Stack<'_>,
    table: c_int,
    name: &'static str,
    cx: &mut DecodeCx,
) -> Result<Option<T>> {
    cx.nested(|cx| {
        stack.check_stack(5)?;
        let _slot = Slot::new(stack);
        unsafe { ffi::lua_pushlstring(stack.as_ptr(), name.as_ptr().cast(), name.len()) };
        get(stack, table, cx)?;
        let value = stack.top();
        if stack.type_of(value).is_nil_or_none() {
            return Ok(None);
        }
        T::from_stack(stack, value, cx).map(Some)
    })
}

/// Decode `table[position]`, honouring `__index`
pub fn element<'s, T: FromStack<'s>>(
    stack: &'s Stack<'_>,
    table: c_int,
    position: usize,
    cx: &mut DecodeCx,
) -> Result<T> {
    let position = ffi::lua_Integer::try_from(position)
        .map_err(|_| Error::not_convertible("table index"))?;
    cx.nested(|cx| {
        stack.check_stack(5)?;
        let _slot = Slot::new(stack);
        unsafe { ffi::lua_pushinteger(stack.as_ptr(), position) };
        get(stack, table, cx)?;
        T::from_stack(stack, stack.top(), cx)
    })
}

/// Decode the raw sequence `1..=#table`
pub fn sequence<'s, T: FromStack<'s>>(
    stack: &'s Stack<'_>,
    table: c_int,
    cx: &mut DecodeCx,
) -> Result<Vec<T>> {
    expect_table(stack, table)?;
    let len = unsafe { ffi::lua_rawlen(stack.as_ptr(), table) };
    cx.charge(len.saturating_mul(mem::size_of::<T>()))?;

    let mut items = Vec::new();
    items.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    for position in 1..=len {
        let key = ffi::lua_Integer::try_from(position)
            .map_err(|_| Error::not_convertible("table index"))?;
        let item = cx.nested(|cx| {
            stack.check_stack(1)?;
            let _slot = Slot::new(stack);
            unsafe { ffi::lua_rawgeti(stack.as_ptr(), table, key) };
            T::from_stack(stack, stack.top(), cx)
        })?;
        items.push(item);
    }
    Ok(items)
}

/// Visit every key/value pair; `f` receives their absolute indices
pub fn entries<F>(stack: &Stack<'_>, table: c_int, cx: &mut DecodeCx, mut f: F) -> Result<()>
where
    F: FnMut(c_int, c_int, &mut DecodeCx) -> Result<()>,
{
    expect_table(stack, table)?;
    stack.check_stack(3)?;
    let slot = Slot::new(stack);
    let key = slot.base() + 1;
    unsafe { ffi::lua_pushnil(stack.as_ptr()) };
    while unsafe { ffi::lua_next(stack.as_ptr(), table) } != 0 {
        cx.nested(|cx| f(key, key + 1, cx))?;
        slot.truncate(1);
    }
    Ok(())
}

/// Decode a single-entry union table. `f` receives the entry's key and the
/// absolute index of its payload and must reject unknown tags.
pub fn union_entry<R, F>(stack: &Stack<'_>, table: c_int, cx: &mut DecodeCx, f: F) -> Result<R>
where
    F: FnOnce(&str, c_int, &mut DecodeCx) -> Result<R>,
{
    expect_table(stack, table)?;
    stack.check_stack(3)?;
    let slot = Slot::new(stack);
    let key = slot.base() + 1;
    unsafe { ffi::lua_pushnil(stack.as_ptr()) };
    if unsafe { ffi::lua_next(stack.as_ptr(), table) } == 0 {
        return Err(Error::TableIsEmpty);
    }

    let tag = match stack.type_of(key) {
        LuaType::String => {
            let bytes = string_bytes(stack, key)?;
            std::str::from_utf8(bytes).map_err(|_| Error::InvalidTagName {
                name: String::from_utf8_lossy(bytes).into_owned(),
            })?
        }
        other => {
            return Err(Error::InvalidTagName {
                name: format!("<{}>", other.name()),
            })
        }
    };

    let value = cx.nested(|cx| f(tag, key + 1, cx))?;

    slot.truncate(1);
    if unsafe { ffi::lua_next(stack.as_ptr(), table) } != 0 {
        return Err(Error::MultipleTags);
    }
    Ok(value)
}

/// Run `f` on the string at `index`, for enums encoded by variant name
pub fn enum_tag<R, F>(stack: &Stack<'_>, index: c_int, f: F) -> Result<R>
where
    F: FnOnce(&str) -> Result<R>,
{
    let bytes = string_bytes(stack, index)?;
    let tag = std::str::from_utf8(bytes).map_err(|_| Error::InvalidEnumTagName {
        name: String::from_utf8_lossy(bytes).into_owned(),
    })?;
    f(tag)
}

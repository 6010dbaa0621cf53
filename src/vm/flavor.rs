//! Interpreter flavor adapter
//!
//! The handful of operations whose shape differs between interpreter variants
//! live behind [`Flavor`]. The implementation is picked once by cargo feature
//! and exported as [`Active`].

use mlua_sys as ffi;
use std::any::type_name;
use std::ffi::c_int;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

#[cfg(not(any(
    feature = "lua54",
    feature = "lua53",
    feature = "lua52",
    feature = "lua51",
    feature = "luajit",
    feature = "luau"
)))]
compile_error!("enable one interpreter feature: lua54, lua53, lua52, lua51, luajit or luau");

mod sealed {
    pub trait Sealed {}
}

/// Variant-specific VM operations
pub trait Flavor: sealed::Sealed {
    /// Human-readable interpreter name
    const NAME: &'static str;

    /// Push a full userdata owning `value`. The value is dropped when the VM
    /// collects the userdata. The block holds a single `*mut T`.
    ///
    /// # Safety
    /// `state` must be a valid VM state with room for two more stack slots.
    unsafe fn push_boxed<T: 'static>(state: *mut ffi::lua_State, value: Box<T>);

    /// Read back a value stored by [`Flavor::push_boxed`]
    ///
    /// # Safety
    /// The value at `index` must be a userdata created by `push_boxed::<T>`.
    unsafe fn boxed_ref<'a, T: 'static>(state: *mut ffi::lua_State, index: c_int) -> Option<&'a T> {
        let slot = ffi::lua_touserdata(state, index) as *mut *mut T;
        if slot.is_null() || (*slot).is_null() {
            return None;
        }
        Some(&**slot)
    }
}

/// Drop the box behind a userdata slot. Runs inside a finalizer, so panics
/// must not cross back into the VM.
unsafe fn release_slot<T>(slot: *mut *mut T) {
    if slot.is_null() {
        return;
    }
    let raw = mem::replace(&mut *slot, ptr::null_mut());
    if raw.is_null() {
        return;
    }
    if catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(raw)))).is_err() {
        tracing::error!(
            event = "finalizer_panic",
            value_type = type_name::<T>(),
            "panic while dropping boxed value"
        );
    }
}

/// Reference interpreters (5.1 through 5.4, LuaJIT): `__gc` metamethod
#[cfg(not(feature = "luau"))]
pub struct Reference;

#[cfg(not(feature = "luau"))]
impl sealed::Sealed for Reference {}

#[cfg(not(feature = "luau"))]
unsafe extern "C-unwind" fn collect_boxed<T>(state: *mut ffi::lua_State) -> c_int {
    release_slot(ffi::lua_touserdata(state, 1) as *mut *mut T);
    0
}

#[cfg(not(feature = "luau"))]
impl Flavor for Reference {
    #[cfg(feature = "lua54")]
    const NAME: &'static str = "Lua 5.4";
    #[cfg(feature = "lua53")]
    const NAME: &'static str = "Lua 5.3";
    #[cfg(feature = "lua52")]
    const NAME: &'static str = "Lua 5.2";
    #[cfg(all(feature = "lua51", not(feature = "luajit")))]
    const NAME: &'static str = "Lua 5.1";
    #[cfg(feature = "luajit")]
    const NAME: &'static str = "LuaJIT";

    unsafe fn push_boxed<T: 'static>(state: *mut ffi::lua_State, value: Box<T>) {
        let slot = ffi::lua_newuserdata(state, mem::size_of::<*mut T>()) as *mut *mut T;
        ptr::write(slot, Box::into_raw(value));

        ffi::lua_createtable(state, 0, 1);
        ffi::lua_pushcfunction(state, collect_boxed::<T>);
        ffi::lua_setfield(state, -2, c"__gc".as_ptr());
        ffi::lua_setmetatable(state, -2);
    }
}

/// Luau: userdata destructors instead of `__gc`
#[cfg(feature = "luau")]
pub struct Luau;

#[cfg(feature = "luau")]
impl sealed::Sealed for Luau {}

#[cfg(feature = "luau")]
unsafe extern "C-unwind" fn destroy_boxed<T>(block: *mut std::ffi::c_void) {
    release_slot(block as *mut *mut T);
}

#[cfg(feature = "luau")]
impl Flavor for Luau {
    const NAME: &'static str = "Luau";

    unsafe fn push_boxed<T: 'static>(state: *mut ffi::lua_State, value: Box<T>) {
        let slot = ffi::lua_newuserdatadtor(state, mem::size_of::<*mut T>(), destroy_boxed::<T>)
            as *mut *mut T;
        ptr::write(slot, Box::into_raw(value));
    }
}

/// Flavor selected by cargo feature
#[cfg(not(feature = "luau"))]
pub type Active = Reference;

#[cfg(feature = "luau")]
pub type Active = Luau;

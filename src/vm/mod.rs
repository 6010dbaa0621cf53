//! Stack accessor
//!
//! [`Stack`] is a non-owning handle over a VM state pointer; [`Vm`] owns a
//! state and closes it on drop. Both are thin layers over the C primitives:
//! every method here is one or two calls into the interpreter plus the
//! bookkeeping needed to keep the stack balanced.

pub mod flavor;


use mlua_sys as ffi;
use std::ffi::{c_char, c_int, c_void, CString};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::config::{DecodeConfig, MarshalConfig};
use crate::decode::{DecodeCx, FromStack, FromStackOwned, Parsed};
use crate::encode::{PushArgs, ToStack};
use crate::error::{Error, Result};
use crate::logging;

pub use flavor::{Active as ActiveFlavor, Flavor};

/// Tag of a stack value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaType {
    /// Acceptable index past the top
    None,
    Nil,
    Boolean,
    LightUserdata,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
    #[cfg(feature = "luau")]
    Vector,
    #[cfg(feature = "luau")]
    Buffer,
}

impl LuaType {
    pub fn from_raw(tag: c_int) -> Self {
        match tag {
            ffi::LUA_TNIL => LuaType::Nil,
            ffi::LUA_TBOOLEAN => LuaType::Boolean,
            ffi::LUA_TLIGHTUSERDATA => LuaType::LightUserdata,
            ffi::LUA_TNUMBER => LuaType::Number,
            ffi::LUA_TSTRING => LuaType::String,
            ffi::LUA_TTABLE => LuaType::Table,
            ffi::LUA_TFUNCTION => LuaType::Function,
            ffi::LUA_TUSERDATA => LuaType::Userdata,
            ffi::LUA_TTHREAD => LuaType::Thread,
            #[cfg(feature = "luau")]
            ffi::LUA_TVECTOR => LuaType::Vector,
            #[cfg(feature = "luau")]
            ffi::LUA_TBUFFER => LuaType::Buffer,
            _ => LuaType::None,
        }
    }

    /// Name as reported by the VM's `type()` function
    pub fn name(self) -> &'static str {
        match self {
            LuaType::None => "no value",
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::LightUserdata | LuaType::Userdata => "userdata",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
            LuaType::Function => "function",
            LuaType::Thread => "thread",
            #[cfg(feature = "luau")]
            LuaType::Vector => "vector",
            #[cfg(feature = "luau")]
            LuaType::Buffer => "buffer",
        }
    }

    pub fn is_nil_or_none(self) -> bool {
        matches!(self, LuaType::Nil | LuaType::None)
    }
}

impl fmt::Display for LuaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to a VM evaluation stack
///
/// Decoding takes `&self`, so values borrowed out of the stack keep it
/// shared; anything that pushes or pops takes `&mut self`.
pub struct Stack<'vm> {
    state: NonNull<ffi::lua_State>,
    config: DecodeConfig,
    _vm: PhantomData<&'vm mut ffi::lua_State>,
}

impl<'vm> Stack<'vm> {
    /// Wrap a state owned elsewhere
    ///
    /// # Safety
    /// `state` must be non-null and valid for `'vm`, and no other `Stack`
    /// may be used on the same state while this one is alive.
    pub unsafe fn from_raw(state: *mut ffi::lua_State) -> Self {
        Stack {
            state: NonNull::new_unchecked(state),
            config: DecodeConfig::default(),
            _vm: PhantomData,
        }
    }

    pub fn with_config(mut self, config: DecodeConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.state.as_ptr()
    }

    #[inline]
    pub fn config(&self) -> DecodeConfig {
        self.config
    }

    // ========================================================================
    // Stack shape
    // ========================================================================

    #[inline]
    pub fn top(&self) -> c_int {
        unsafe { ffi::lua_gettop(self.as_ptr()) }
    }

    pub fn set_top(&mut self, top: c_int) {
        unsafe { ffi::lua_settop(self.as_ptr(), top) }
    }

    pub fn pop(&mut self, count: c_int) {
        unsafe { ffi::lua_pop(self.as_ptr(), count) }
    }

    /// Resolve a relative index against the current top
    #[inline]
    pub fn abs_index(&self, index: c_int) -> c_int {
        unsafe { ffi::lua_absindex(self.as_ptr(), index) }
    }

    #[inline]
    pub fn type_of(&self, index: c_int) -> LuaType {
        LuaType::from_raw(unsafe { ffi::lua_type(self.as_ptr(), index) })
    }

    /// Make room for `extra` more slots
    pub fn check_stack(&self, extra: c_int) -> Result<()> {
        if unsafe { ffi::lua_checkstack(self.as_ptr(), extra) } == 0 {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }

    /// Put the top back to a recorded value after a balanced operation
    #[inline]
    pub(crate) fn restore(&self, top: c_int) {
        unsafe { ffi::lua_settop(self.as_ptr(), top) }
    }

    // ========================================================================
    // Pushing
    // ========================================================================

    pub fn push_nil(&mut self) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushnil(self.as_ptr()) };
        Ok(())
    }

    pub fn push_bool(&mut self, value: bool) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushboolean(self.as_ptr(), value as c_int) };
        Ok(())
    }

    pub fn push_integer(&mut self, value: ffi::lua_Integer) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushinteger(self.as_ptr(), value) };
        Ok(())
    }

    pub fn push_number(&mut self, value: ffi::lua_Number) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushnumber(self.as_ptr(), value) };
        Ok(())
    }

    /// Push a string; the VM keeps its own copy
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushlstring(self.as_ptr(), bytes.as_ptr() as *const c_char, bytes.len()) };
        Ok(())
    }

    pub fn push_light_userdata(&mut self, ptr: *mut c_void) -> Result<()> {
        self.check_stack(1)?;
        unsafe { ffi::lua_pushlightuserdata(self.as_ptr(), ptr) };
        Ok(())
    }

    /// Push a copy of the value at `index`
    pub fn push_value(&mut self, index: c_int) -> Result<()> {
        let index = self.abs_index(index);
        self.check_stack(1)?;
        unsafe { ffi::lua_pushvalue(self.as_ptr(), index) };
        Ok(())
    }

    /// Push a new table and return its absolute index
    pub fn new_table(&mut self, array_len: usize, record_len: usize) -> Result<c_int> {
        self.check_stack(1)?;
        let narr = c_int::try_from(array_len).unwrap_or(0);
        let nrec = c_int::try_from(record_len).unwrap_or(0);
        unsafe { ffi::lua_createtable(self.as_ptr(), narr, nrec) };
        Ok(self.top())
    }

    /// Pop a key and a value and store them in the table at `table`
    /// without invoking metamethods
    pub fn raw_set(&mut self, table: c_int) {
        let table = self.abs_index(table);
        unsafe { ffi::lua_rawset(self.as_ptr(), table) }
    }

    /// `table[name] = value`, raw
    pub fn set_field<T: ToStack>(&mut self, table: c_int, name: &str, value: T) -> Result<()> {
        let table = self.abs_index(table);
        self.push_bytes(name.as_bytes())?;
        value.to_stack(self)?;
        self.raw_set(table);
        Ok(())
    }

    /// `table[position] = value`, raw
    pub fn set_index<T: ToStack>(&mut self, table: c_int, position: usize, value: T) -> Result<()> {
        let table = self.abs_index(table);
        let position = ffi::lua_Integer::try_from(position)
            .map_err(|_| Error::not_convertible("table index"))?;
        value.to_stack(self)?;
        unsafe { ffi::lua_rawseti(self.as_ptr(), table, position) };
        Ok(())
    }

    /// `table[key] = value`, raw
    pub fn set_entry<K: ToStack, V: ToStack>(&mut self, table: c_int, key: K, value: V) -> Result<()> {
        let table = self.abs_index(table);
        key.to_stack(self)?;
        value.to_stack(self)?;
        self.raw_set(table);
        Ok(())
    }

    // ========================================================================
    // Encoding and decoding
    // ========================================================================

    /// Push `value` as exactly one stack value. On failure the stack is left
    /// as it was.
    pub fn encode<T: ToStack>(&mut self, value: T) -> Result<()> {
        let top = self.top();
        value.to_stack(self).map_err(|e| {
            self.restore(top);
            e
        })
    }

    /// Decode the value at `index`. Borrowed parts of the result stay valid
    /// while the stack is shared.
    ///
    /// Shared decodes never run VM code: a value that only an `__index`
    /// metamethod can produce fails with [`Error::BorrowedTemporary`]. Use
    /// [`Stack::decode_alloc`] for those. Running a metamethod needs the
    /// stack exclusively, so it cannot happen while a borrow is alive:
    ///
    /// ```compile_fail
    /// use lua_marshal::Vm;
    ///
    /// let mut vm = Vm::new().unwrap();
    /// let mut stack = vm.stack();
    /// stack.push_bytes(b"name").unwrap();
    /// let name: &str = stack.decode(-1).unwrap();
    /// let count = stack.decode_alloc::<i64>(-1);
    /// println!("{name} {count:?}");
    /// ```
    pub fn decode<'s, T: FromStack<'s>>(&'s self, index: c_int) -> Result<T> {
        let mut cx = DecodeCx::new(self.config, true);
        self.decode_in(index, &mut cx)
    }

    /// Decode the value at `index` into an owned capsule, following
    /// `__index` metamethods where a key is absent
    pub fn decode_alloc<T: FromStackOwned>(&mut self, index: c_int) -> Result<Parsed<T>> {
        self.decode_alloc_with(index, self.config)
    }

    /// Like [`Stack::decode_alloc`] with explicit limits
    pub fn decode_alloc_with<T: FromStackOwned>(
        &mut self,
        index: c_int,
        config: DecodeConfig,
    ) -> Result<Parsed<T>> {
        let mut cx = DecodeCx::new(config, false);
        let value: T = self.decode_in(index, &mut cx)?;
        Ok(Parsed::new(value, cx.allocated()))
    }

    fn decode_in<'s, T: FromStack<'s>>(&'s self, index: c_int, cx: &mut DecodeCx) -> Result<T> {
        let top = self.top();
        let index = self.abs_index(index);
        let result = T::from_stack(self, index, cx);
        self.restore(top);
        if let Err(e) = &result {
            logging::log_decode_error(std::any::type_name::<T>(), index, e.name());
        }
        result
    }

    // ========================================================================
    // Calls and globals
    // ========================================================================

    /// Protected call of the function below `nargs` arguments. On failure the
    /// error value is popped and returned as [`Error::Runtime`].
    pub fn pcall(&mut self, nargs: c_int, nresults: c_int) -> Result<()> {
        let status = unsafe { ffi::lua_pcall(self.as_ptr(), nargs, nresults, 0) };
        if status == ffi::LUA_OK {
            return Ok(());
        }
        let message = self.error_message();
        self.pop(1);
        if status == ffi::LUA_ERRMEM {
            return Err(Error::OutOfMemory);
        }
        Err(Error::Runtime { message })
    }

    /// Load a chunk and leave it on the stack as a function
    pub fn load(&mut self, source: &[u8], name: &str) -> Result<()> {
        let name = c_string(name)?;
        self.check_stack(1)?;
        let status = unsafe {
            ffi::luaL_loadbufferx(
                self.as_ptr(),
                source.as_ptr() as *const c_char,
                source.len(),
                name.as_ptr(),
                std::ptr::null(),
            )
        };
        if status == ffi::LUA_OK {
            return Ok(());
        }
        let message = self.error_message();
        self.pop(1);
        match status {
            ffi::LUA_ERRSYNTAX => Err(Error::Syntax { message }),
            ffi::LUA_ERRMEM => Err(Error::OutOfMemory),
            _ => Err(Error::Runtime { message }),
        }
    }

    pub fn get_global(&mut self, name: &str) -> Result<LuaType> {
        let name = c_string(name)?;
        self.check_stack(1)?;
        let tag = unsafe { ffi::lua_getglobal(self.as_ptr(), name.as_ptr()) };
        Ok(LuaType::from_raw(tag))
    }

    pub fn set_global<T: ToStack>(&mut self, name: &str, value: T) -> Result<()> {
        let name = c_string(name)?;
        self.encode(value)?;
        unsafe { ffi::lua_setglobal(self.as_ptr(), name.as_ptr()) };
        Ok(())
    }

    /// Pop the top value into the global `name`
    pub fn store_global(&mut self, name: &str) -> Result<()> {
        let name = c_string(name)?;
        unsafe { ffi::lua_setglobal(self.as_ptr(), name.as_ptr()) };
        Ok(())
    }

    /// Call the global function `name` with `args` and decode its first result
    pub fn call<A: PushArgs, R: FromStackOwned>(&mut self, name: &str, args: A) -> Result<R> {
        let top = self.top();
        let result = self.call_inner(name, args);
        self.restore(top);
        result
    }

    fn call_inner<A: PushArgs, R: FromStackOwned>(&mut self, name: &str, args: A) -> Result<R> {
        self.get_global(name)?;
        let nargs = args.push_args(self)?;
        self.pcall(nargs, 1)?;
        self.decode_alloc(-1).map(Parsed::into_inner)
    }

    /// Run a chunk, discarding its results
    pub fn exec(&mut self, source: &str) -> Result<()> {
        let top = self.top();
        let result = self
            .load(source.as_bytes(), "=chunk")
            .and_then(|()| self.pcall(0, 0));
        self.restore(top);
        result
    }

    /// Run a chunk and decode its first result
    pub fn eval<R: FromStackOwned>(&mut self, source: &str) -> Result<R> {
        let top = self.top();
        let result = self
            .load(source.as_bytes(), "=chunk")
            .and_then(|()| self.pcall(0, 1))
            .and_then(|()| self.decode_alloc(-1))
            .map(Parsed::into_inner);
        self.restore(top);
        result
    }

    /// Error value at the top rendered as text
    fn error_message(&self) -> String {
        let mut len = 0usize;
        let ptr = unsafe { ffi::lua_tolstring(self.as_ptr(), -1, &mut len) };
        if ptr.is_null() {
            return format!("(error object is a {} value)", self.type_of(-1));
        }
        let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl fmt::Debug for Stack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("state", &self.state)
            .field("top", &self.top())
            .finish()
    }
}

fn c_string(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::not_convertible("C string"))
}

/// An owned VM state
pub struct Vm {
    state: NonNull<ffi::lua_State>,
    config: MarshalConfig,
}

impl Vm {
    pub fn new() -> Result<Self> {
        Self::with_config(MarshalConfig::default())
    }

    pub fn with_config(config: MarshalConfig) -> Result<Self> {
        let state = NonNull::new(unsafe { ffi::luaL_newstate() }).ok_or(Error::OutOfMemory)?;
        if config.vm.open_libs {
            unsafe { ffi::luaL_openlibs(state.as_ptr()) };
        }
        logging::log_vm_open(ActiveFlavor::NAME);
        Ok(Vm { state, config })
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.state.as_ptr()
    }

    /// Stack of the main thread
    pub fn stack(&mut self) -> Stack<'_> {
        unsafe { Stack::from_raw(self.state.as_ptr()) }.with_config(self.config.decode)
    }

    pub fn exec(&mut self, source: &str) -> Result<()> {
        self.stack().exec(source)
    }

    pub fn eval<R: FromStackOwned>(&mut self, source: &str) -> Result<R> {
        self.stack().eval(source)
    }

    pub fn set_global<T: ToStack>(&mut self, name: &str, value: T) -> Result<()> {
        self.stack().set_global(name, value)
    }

    pub fn get_global<R: FromStackOwned>(&mut self, name: &str) -> Result<R> {
        let mut stack = self.stack();
        let top = stack.top();
        let result = stack
            .get_global(name)
            .and_then(|_| stack.decode_alloc(-1))
            .map(Parsed::into_inner);
        stack.restore(top);
        result
    }

    pub fn call<A: PushArgs, R: FromStackOwned>(&mut self, name: &str, args: A) -> Result<R> {
        self.stack().call(name, args)
    }

    /// Store a module table as the global `name`
    pub fn register(&mut self, name: &str, module: crate::bind::Module) -> Result<()> {
        module.register(&mut self.stack(), name)
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        unsafe { ffi::lua_close(self.state.as_ptr()) };
        logging::log_vm_close();
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("flavor", &ActiveFlavor::NAME)
            .field("state", &self.state)
            .finish()
    }
}

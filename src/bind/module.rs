//! Module tables of bound functions and values
//!
//! A [`Module`] is built natively and handed to the VM explicitly, either as
//! a global ([`Module::register`]) or as the return value of a host loader
//! ([`Module::open`]).

use mlua_sys as ffi;
use std::ffi::{c_char, c_int};
use std::fmt;

use super::{bind, ErrorName, NativeFn};
use crate::encode::ToStack;
use crate::error::Result;
use crate::vm::Stack;

type Entry = Box<dyn FnOnce(&mut Stack<'_>) -> Result<()>>;

/// Builder for a table of named functions and values
#[derive(Default)]
pub struct Module {
    entries: Vec<(String, Entry)>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bound function
    pub fn function<F, Args>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: NativeFn<Args>,
        Args: 'static,
    {
        let name = name.into();
        let function = bind(func);
        self.entries.push((
            name,
            Box::new(move |stack: &mut Stack<'_>| stack.encode(function)),
        ));
        self
    }

    /// Add a constant value
    pub fn value<T: ToStack + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.entries.push((
            name.into(),
            Box::new(move |stack: &mut Stack<'_>| stack.encode(value)),
        ));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push the module as one table
    pub fn push(self, stack: &mut Stack<'_>) -> Result<()> {
        let top = stack.top();
        let result = self.push_entries(stack);
        if result.is_err() {
            stack.set_top(top);
        }
        result
    }

    fn push_entries(self, stack: &mut Stack<'_>) -> Result<()> {
        let count = self.entries.len();
        let table = stack.new_table(0, count)?;
        for (name, entry) in self.entries {
            stack.push_bytes(name.as_bytes())?;
            entry(stack)?;
            stack.raw_set(table);
        }
        tracing::debug!(event = "module_push", entries = count, "module table built");
        Ok(())
    }

    /// Store the module table as the global `name`
    pub fn register(self, stack: &mut Stack<'_>, name: &str) -> Result<()> {
        let top = stack.top();
        self.push(stack)?;
        stack.store_global(name).map_err(|e| {
            stack.set_top(top);
            e
        })?;
        tracing::info!(event = "module_register", name = name, "module registered");
        Ok(())
    }

    /// Body of a host `luaopen_*` function: pushes the table and returns 1
    ///
    /// # Safety
    /// `state` must be the valid state the loader was called with.
    pub unsafe fn open(self, state: *mut ffi::lua_State) -> c_int {
        let result = {
            let mut stack = Stack::from_raw(state);
            self.push(&mut stack)
        };
        let message = match result {
            Ok(()) => return 1,
            Err(e) => e.error_name().into_owned(),
        };
        ffi::lua_pushlstring(state, message.as_ptr() as *const c_char, message.len());
        drop(message);
        ffi::lua_error(state)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("entries", &self.entries.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish()
    }
}

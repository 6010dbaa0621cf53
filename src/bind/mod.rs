//! Function interface generator
//!
//! [`bind`] wraps any `Fn` whose parameters decode and whose result encodes
//! into a [`Function`]. Pushing it stores the closure in a userdata upvalue
//! and pushes a C closure around [`trampoline`], which:
//!
//! 1. decodes parameter `i` from stack position `i`
//! 2. calls the function
//! 3. pushes 0 or 1 results through [`ReturnValue`]
//!
//! Decode failures, `Err` results and panics all become VM errors raised
//! with the failure's name, after every Rust value has been dropped.

pub mod module;


use mlua_sys as ffi;
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::ffi::{c_char, c_int};
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DecodeConfig;
use crate::decode::{DecodeCx, FromStack, FromStackOwned};
use crate::encode::ToStack;
use crate::error::{Error, Result};
use crate::logging;
use crate::vm::{ActiveFlavor, Flavor, Stack};

pub use module::Module;

// ============================================================================
// Error names
// ============================================================================

/// Message used when a failure is raised inside the VM
pub trait ErrorName {
    fn error_name(&self) -> Cow<'_, str>;
}

impl ErrorName for Error {
    fn error_name(&self) -> Cow<'_, str> {
        match self {
            // Keep nested VM failures readable
            Error::Runtime { message } => Cow::Borrowed(message),
            other => Cow::Borrowed(other.name()),
        }
    }
}

impl ErrorName for String {
    fn error_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl ErrorName for &str {
    fn error_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

// ============================================================================
// Results
// ============================================================================

/// How a bound function's return value reaches the VM
pub trait ReturnValue {
    /// Push the results and return their count, or the message to raise
    fn push_results(self, stack: &mut Stack<'_>) -> std::result::Result<c_int, String>;
}

impl ReturnValue for () {
    fn push_results(self, _stack: &mut Stack<'_>) -> std::result::Result<c_int, String> {
        Ok(0)
    }
}

impl<T: ToStack> ReturnValue for T {
    fn push_results(self, stack: &mut Stack<'_>) -> std::result::Result<c_int, String> {
        match stack.encode(self) {
            Ok(()) => Ok(1),
            Err(e) => Err(e.error_name().into_owned()),
        }
    }
}

impl<T: ReturnValue, E: ErrorName> ReturnValue for std::result::Result<T, E> {
    fn push_results(self, stack: &mut Stack<'_>) -> std::result::Result<c_int, String> {
        match self {
            Ok(value) => value.push_results(stack),
            Err(e) => Err(e.error_name().into_owned()),
        }
    }
}

// ============================================================================
// Native functions
// ============================================================================

/// A native function callable from the VM with argument tuple `Args`
pub trait NativeFn<Args>: 'static {
    const ARITY: usize;
    type Output: ReturnValue;

    /// Decode the arguments from positions `1..=ARITY` and call the function
    fn invoke(&self, stack: &Stack<'_>, cx: &mut DecodeCx) -> Result<Self::Output>;
}

macro_rules! one {
    ($arg:ident) => {
        1
    };
}

macro_rules! impl_native_fn {
    ($($arg:ident $value:ident),*) => {
        impl<Func, Ret, $($arg,)*> NativeFn<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Ret + 'static,
            Ret: ReturnValue,
            $($arg: FromStackOwned,)*
        {
            const ARITY: usize = 0 $(+ one!($arg))*;
            type Output = Ret;

            #[allow(unused_variables, unused_mut)]
            fn invoke(&self, stack: &Stack<'_>, cx: &mut DecodeCx) -> Result<Ret> {
                let mut position: c_int = 0;
                $(
                    position += 1;
                    let $value = <$arg as FromStack<'_>>::from_stack(stack, position, cx)?;
                )*
                Ok((self)($($value),*))
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A1 a1);
impl_native_fn!(A1 a1, A2 a2);
impl_native_fn!(A1 a1, A2 a2, A3 a3);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

/// A native function ready to be pushed as a VM closure
pub struct Function<F, Args> {
    func: F,
    name: &'static str,
    _args: PhantomData<fn(Args)>,
}

/// Wrap `func` for the VM
pub fn bind<F, Args>(func: F) -> Function<F, Args>
where
    F: NativeFn<Args>,
{
    Function {
        func,
        name: type_name::<F>(),
        _args: PhantomData,
    }
}

impl<F, Args> Function<F, Args>
where
    F: NativeFn<Args>,
{
    /// Name reported in logs
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        F::ARITY
    }
}

/// Upvalue payload of a pushed function
struct Bound<F> {
    func: F,
    config: DecodeConfig,
    name: &'static str,
}

impl<F, Args> ToStack for Function<F, Args>
where
    F: NativeFn<Args>,
    Args: 'static,
{
    fn to_stack(self, stack: &mut Stack<'_>) -> Result<()> {
        stack.check_stack(3)?;
        let bound = Box::new(Bound {
            func: self.func,
            config: stack.config(),
            name: self.name,
        });
        unsafe {
            ActiveFlavor::push_boxed(stack.as_ptr(), bound);
            ffi::lua_pushcclosure(stack.as_ptr(), trampoline::<F, Args>, 1);
        }
        logging::log_bind(self.name, F::ARITY);
        Ok(())
    }
}

// ============================================================================
// Trampoline
// ============================================================================

static CALLS: AtomicU64 = AtomicU64::new(0);
static ERRORS: AtomicU64 = AtomicU64::new(0);
static PANICS: AtomicU64 = AtomicU64::new(0);

/// Counters across every bound function in the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStats {
    pub calls: u64,
    pub errors: u64,
    pub panics: u64,
}

pub fn stats() -> BindingStats {
    BindingStats {
        calls: CALLS.load(Ordering::Relaxed),
        errors: ERRORS.load(Ordering::Relaxed),
        panics: PANICS.load(Ordering::Relaxed),
    }
}

/// C entry point shared by every function pushed through [`bind`]
pub unsafe extern "C-unwind" fn trampoline<F, Args>(state: *mut ffi::lua_State) -> c_int
where
    F: NativeFn<Args>,
{
    let message = match catch_unwind(AssertUnwindSafe(|| dispatch::<F, Args>(state))) {
        Ok(Ok(count)) => return count,
        Ok(Err(message)) => message,
        Err(payload) => {
            PANICS.fetch_add(1, Ordering::Relaxed);
            let message = format!("panic: {}", panic_message(payload.as_ref()));
            logging::log_panic(type_name::<F>(), &message);
            message
        }
    };

    // Nothing owned may be live when the VM unwinds past this frame
    ffi::lua_settop(state, 0);
    ffi::lua_pushlstring(state, message.as_ptr() as *const c_char, message.len());
    drop(message);
    ffi::lua_error(state)
}

unsafe fn dispatch<F, Args>(state: *mut ffi::lua_State) -> std::result::Result<c_int, String>
where
    F: NativeFn<Args>,
{
    CALLS.fetch_add(1, Ordering::Relaxed);
    let bound = match ActiveFlavor::boxed_ref::<Bound<F>>(state, ffi::lua_upvalueindex(1)) {
        Some(bound) => bound,
        None => return Err("native function was released".to_string()),
    };

    let mut stack = Stack::from_raw(state).with_config(bound.config);
    logging::log_native_call(bound.name, stack.top());

    let mut cx = DecodeCx::new(bound.config, false);
    let result = match bound.func.invoke(&stack, &mut cx) {
        Ok(output) => output.push_results(&mut stack),
        Err(e) => Err(e.error_name().into_owned()),
    };

    if let Err(message) = &result {
        ERRORS.fetch_add(1, Ordering::Relaxed);
        logging::log_raise(bound.name, message);
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "Box<dyn Any>"
    }
}

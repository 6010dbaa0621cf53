//! Encoder: one pushed value per call, checked through the raw accessor

use super::*;
use crate::vm::{LuaType, Vm};
use std::collections::BTreeMap;

fn eval_string(vm: &mut Vm, source: &str) -> String {
    vm.eval::<String>(source).unwrap()
}

#[test]
fn test_integers_push_integers() {
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    stack.encode(42u8).unwrap();
    stack.encode(-7i64).unwrap();
    assert_eq!(stack.top(), 2);
    assert_eq!(stack.type_of(1), LuaType::Number);
    assert_eq!(stack.decode::<i64>(1).unwrap(), 42);
    assert_eq!(stack.decode::<i64>(2).unwrap(), -7);
}

#[cfg(any(feature = "lua54", feature = "lua53"))]
#[test]
fn test_integer_subtype() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("n", 3i32).unwrap();
    vm.set_global("x", 3.0f64).unwrap();
    assert_eq!(eval_string(&mut vm, "return math.type(n)"), "integer");
    assert_eq!(eval_string(&mut vm, "return math.type(x)"), "float");
}

#[test]
fn test_large_unsigned_wraps_to_integer() {
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    stack.encode(u64::MAX).unwrap();
    stack.encode((1u64 << 63) + 1).unwrap();

    assert_eq!(stack.decode::<i64>(1).unwrap(), -1);
    assert_eq!(stack.decode::<u64>(1).unwrap(), u64::MAX);
    assert_eq!(stack.decode::<u64>(2).unwrap(), (1u64 << 63) + 1);
}

#[cfg(any(feature = "lua54", feature = "lua53"))]
#[test]
fn test_large_unsigned_orders_with_ult() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("big", u64::MAX).unwrap();
    vm.set_global("small", 1u64).unwrap();
    assert!(vm.eval::<bool>("return math.ult(small, big)").unwrap());
}

#[test]
fn test_exact_number_or_error() {
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    push_exact_number(&mut stack, 1 << 40, "lua_Integer").unwrap();
    assert_eq!(stack.decode::<f64>(-1).unwrap(), (1u64 << 40) as f64);
    assert_eq!(
        push_exact_number(&mut stack, (1 << 60) + 1, "lua_Integer").unwrap_err(),
        Error::not_convertible("lua_Integer")
    );
    assert_eq!(stack.top(), 1);
}

#[test]
fn test_bool_and_truthy() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("a", true).unwrap();
    vm.set_global("b", Truthy(false)).unwrap();
    assert_eq!(eval_string(&mut vm, "return type(a) .. type(b)"), "booleanboolean");
    assert!(!vm.eval::<bool>("return b").unwrap());
}

#[test]
fn test_strings_are_copied() {
    let mut vm = Vm::new().unwrap();
    {
        let owned = String::from("temporary");
        vm.set_global("s", &owned).unwrap();
    }
    vm.set_global("bytes", ByteString(vec![0, 159, 146, 150])).unwrap();
    assert_eq!(eval_string(&mut vm, "return s"), "temporary");
    assert_eq!(vm.eval::<i64>("return #bytes").unwrap(), 4);
}

#[test]
fn test_option() {
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    stack.encode(None::<i32>).unwrap();
    stack.encode(Some(5)).unwrap();
    assert_eq!(stack.type_of(1), LuaType::Nil);
    assert_eq!(stack.type_of(2), LuaType::Number);
}

#[test]
fn test_sequences_are_one_based() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("arr", [10, 20, 30]).unwrap();
    vm.set_global("vec", vec!["a", "b"]).unwrap();
    let slice: &[i32] = &[4, 5];
    vm.set_global("slice", slice).unwrap();

    assert_eq!(vm.eval::<i64>("return arr[1] + arr[3] + #arr").unwrap(), 43);
    assert_eq!(eval_string(&mut vm, "return vec[1] .. vec[2]"), "ab");
    assert_eq!(vm.eval::<i64>("return slice[2]").unwrap(), 5);
    assert!(vm.eval::<bool>("return arr[0] == nil").unwrap());
}

#[test]
fn test_maps() {
    let mut vm = Vm::new().unwrap();
    let mut map = BTreeMap::new();
    map.insert("one", 1);
    map.insert("two", 2);
    vm.set_global("m", map).unwrap();
    assert_eq!(vm.eval::<i64>("return m.one + m.two").unwrap(), 3);
}

#[test]
fn test_void_is_empty_table() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("v", Void).unwrap();
    assert!(vm.eval::<bool>("return type(v) == 'table' and next(v) == nil").unwrap());
}

#[test]
fn test_mut_pointer_is_light_userdata() {
    let mut value = 11u32;
    let ptr: *mut u32 = &mut value;

    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    stack.encode(ptr).unwrap();
    assert_eq!(stack.type_of(-1), LuaType::LightUserdata);
    let back: *mut u32 = stack.decode(-1).unwrap();
    assert_eq!(back, ptr);
}

#[test]
fn test_push_args_counts() {
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    assert_eq!(().push_args(&mut stack).unwrap(), 0);
    assert_eq!((1, "two", 3.0).push_args(&mut stack).unwrap(), 3);
    assert_eq!(stack.top(), 3);
}

#[test]
fn test_nested_sequence() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("grid", vec![vec![1, 2], vec![3, 4]]).unwrap();
    assert_eq!(vm.eval::<i64>("return grid[2][1]").unwrap(), 3);
}

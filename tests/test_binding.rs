use lua_marshal::{bind, stats, Error, ErrorName, FromStack, Module, ToStack, Vm};

#[derive(Debug, Clone, PartialEq, ToStack, FromStack)]
struct Vec2 {
    x: f64,
    y: f64,
}

#[derive(Debug, ErrorName)]
enum ParseFailure {
    Empty,
    #[lua(rename = "too_long")]
    TooLong { max: usize },
    Invalid(char),
}

#[derive(Debug, ErrorName)]
struct Overflow;

fn parse_word(input: String) -> Result<String, ParseFailure> {
    if input.is_empty() {
        return Err(ParseFailure::Empty);
    }
    if input.len() > 8 {
        return Err(ParseFailure::TooLong { max: 8 });
    }
    if let Some(c) = input.chars().find(|c| !c.is_ascii_alphabetic()) {
        return Err(ParseFailure::Invalid(c));
    }
    Ok(input.to_uppercase())
}

fn caught(vm: &mut Vm, call: &str) -> String {
    let source = format!("local ok, err = pcall(function() return {} end); assert(not ok); return err", call);
    vm.eval(&source).unwrap()
}

#[test]
fn test_add() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("add", bind(|a: i64, b: i64| a + b)).unwrap();
    assert_eq!(vm.eval::<i64>("return add(2, 3)").unwrap(), 5);
    assert_eq!(vm.call::<_, i64>("add", (2, 3)).unwrap(), 5);
}

#[test]
fn test_err_is_observed_by_protected_call() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("parse_word", bind(parse_word)).unwrap();

    assert_eq!(vm.eval::<String>("return parse_word('lua')").unwrap(), "LUA");
    assert_eq!(caught(&mut vm, "parse_word('')"), "Empty");
    assert_eq!(caught(&mut vm, "parse_word('abcdefghijk')"), "too_long");
    assert_eq!(caught(&mut vm, "parse_word('a1')"), "Invalid");
}

#[test]
fn test_struct_error_name() {
    assert_eq!(Overflow.error_name(), "Overflow");
    assert_eq!(ParseFailure::TooLong { max: 1 }.error_name(), "too_long");

    let mut vm = Vm::new().unwrap();
    vm.set_global(
        "checked_add",
        bind(|a: u8, b: u8| a.checked_add(b).ok_or(Overflow)),
    )
    .unwrap();
    assert_eq!(vm.eval::<u8>("return checked_add(1, 2)").unwrap(), 3);
    assert_eq!(caught(&mut vm, "checked_add(200, 100)"), "Overflow");
}

#[test]
fn test_struct_arguments_and_results() {
    let mut vm = Vm::new().unwrap();
    vm.set_global(
        "scale",
        bind(|v: Vec2, k: f64| Vec2 {
            x: v.x * k,
            y: v.y * k,
        }),
    )
    .unwrap();

    let scaled: Vec2 = vm.eval("return scale({ x = 1, y = 2 }, 3)").unwrap();
    assert_eq!(scaled, Vec2 { x: 3.0, y: 6.0 });
    assert_eq!(caught(&mut vm, "scale({ x = 1 }, 3)"), "MissingValue");
}

#[test]
fn test_result_counts() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("none", bind(|| {})).unwrap();
    vm.set_global("one", bind(|| 1)).unwrap();
    vm.set_global("nil_result", bind(|| None::<i64>)).unwrap();

    let counts: Vec<i64> = vm
        .eval("return { select('#', none()), select('#', one()), select('#', nil_result()) }")
        .unwrap();
    assert_eq!(counts, vec![0, 1, 1]);
}

#[test]
fn test_panic_message() {
    let mut vm = Vm::new().unwrap();
    vm.set_global(
        "divide",
        bind(|a: i64, b: i64| {
            if b == 0 {
                panic!("division by zero");
            }
            a / b
        }),
    )
    .unwrap();

    let before = stats().panics;
    assert_eq!(caught(&mut vm, "divide(1, 0)"), "panic: division by zero");
    assert!(stats().panics > before);
    assert_eq!(vm.eval::<i64>("return divide(9, 3)").unwrap(), 3);
}

#[test]
fn test_nested_runtime_error_keeps_message() {
    let mut vm = Vm::new().unwrap();
    vm.set_global(
        "fail",
        bind(|message: String| -> Result<(), Error> { Err(Error::runtime(message)) }),
    )
    .unwrap();
    assert_eq!(caught(&mut vm, "fail('disk full')"), "disk full");
}

#[test]
fn test_module_registration() {
    let mut vm = Vm::new().unwrap();
    let module = Module::new()
        .function("length", |v: Vec2| (v.x * v.x + v.y * v.y).sqrt())
        .function("parse_word", parse_word)
        .value("origin", Vec2 { x: 0.0, y: 0.0 })
        .value("dimensions", 2u8);
    vm.register("geometry", module).unwrap();

    assert_eq!(
        vm.eval::<f64>("return geometry.length({ x = 3, y = 4 })").unwrap(),
        5.0
    );
    assert_eq!(vm.eval::<u8>("return geometry.dimensions").unwrap(), 2);
    assert_eq!(
        vm.eval::<Vec2>("return geometry.origin").unwrap(),
        Vec2 { x: 0.0, y: 0.0 }
    );
    assert_eq!(caught(&mut vm, "geometry.parse_word('')"), "Empty");
}

#[test]
fn test_bound_function_calls_back_into_vm_values() {
    let mut vm = Vm::new().unwrap();
    vm.set_global("sum", bind(|values: Vec<i64>| values.iter().sum::<i64>()))
        .unwrap();
    let total: i64 = vm
        .eval("local t = {} for i = 1, 100 do t[i] = i end return sum(t)")
        .unwrap();
    assert_eq!(total, 5050);
}

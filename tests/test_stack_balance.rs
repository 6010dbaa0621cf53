use lua_marshal::{ByteString, DecodeConfig, FromStack, Stack, Truthy, Vm, Void};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, FromStack)]
struct Record {
    id: i64,
    name: String,
    children: Vec<Record>,
}

#[derive(Debug, FromStack)]
enum Event {
    Open(String),
    Close { code: u16 },
}

/// Lua expressions covering every value shape the decoders look at
const SOURCES: &[&str] = &[
    "nil",
    "true",
    "42",
    "-1.5",
    "'text'",
    "'\\255\\254'",
    "{}",
    "{ 1, 2, 3 }",
    "{ 'a', 'b' }",
    "{ id = 1, name = 'root', children = {} }",
    "{ id = 1, name = 'root', children = { { id = 2 } } }",
    "{ Open = 'door' }",
    "{ Close = { code = 200 } }",
    "{ Open = 'a', Close = { code = 1 } }",
    "{ [true] = 1 }",
    "setmetatable({}, { __index = function(t, k) return k end })",
    "setmetatable({}, { __index = function() error('nope') end })",
    "(function() local t = { id = 1, name = 'loop' }; t.children = { t }; return t end)()",
    "print",
];

fn push_source(stack: &mut Stack<'_>, source: &str) {
    let chunk = format!("return {}", source);
    stack.load(chunk.as_bytes(), "=balance").unwrap();
    stack.pcall(0, 1).unwrap();
}

/// Decode the top value as one of several targets, discarding the outcome
fn decode_as(stack: &mut Stack<'_>, target: usize) {
    let _ = match target {
        0 => stack.decode::<i64>(-1).map(drop),
        1 => stack.decode::<f32>(-1).map(drop),
        2 => stack.decode::<bool>(-1).map(drop),
        3 => stack.decode::<Truthy>(-1).map(drop),
        4 => stack.decode::<&str>(-1).map(drop),
        5 => stack.decode::<ByteString>(-1).map(drop),
        6 => stack.decode::<Vec<i64>>(-1).map(drop),
        7 => stack.decode::<[String; 2]>(-1).map(drop),
        8 => stack.decode::<HashMap<String, i64>>(-1).map(drop),
        9 => stack.decode::<Record>(-1).map(drop),
        10 => stack.decode::<Event>(-1).map(drop),
        11 => stack.decode::<Void>(-1).map(drop),
        12 => stack.decode::<Option<Vec<&str>>>(-1).map(drop),
        13 => stack
            .decode_alloc_with::<Record>(-1, DecodeConfig::default().with_alloc_limit(64))
            .map(drop),
        14 => stack.decode_alloc::<Event>(-1).map(drop),
        _ => stack.decode_alloc::<[i64; 2]>(-1).map(drop),
    };
}

#[test]
fn test_every_source_every_target() {
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    for source in SOURCES {
        push_source(&mut stack, source);
        let top = stack.top();
        for target in 0..16 {
            decode_as(&mut stack, target);
            assert_eq!(stack.top(), top, "decoding {} as target {}", source, target);
        }
        stack.pop(1);
    }
    assert_eq!(stack.top(), 0);
}

proptest! {
    #[test]
    fn prop_decode_sequences_keep_balance(
        steps in proptest::collection::vec((0..SOURCES.len(), 0usize..16), 1..40),
        padding in 0i32..5,
    ) {
        let mut vm = Vm::new().unwrap();
        let mut stack = vm.stack();
        for _ in 0..padding {
            stack.push_nil().unwrap();
        }

        for (source, target) in steps {
            push_source(&mut stack, SOURCES[source]);
            let top = stack.top();
            decode_as(&mut stack, target);
            prop_assert_eq!(stack.top(), top);
            stack.pop(1);
        }
        prop_assert_eq!(stack.top(), padding);
    }
}

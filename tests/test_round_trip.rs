use lua_marshal::{ByteString, FromStack, FromStackOwned, ToStack, Truthy, Vm, Void};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

fn round_trip<T>(value: T) -> T
where
    T: ToStack + FromStackOwned + Clone + Debug,
{
    let mut vm = Vm::new().unwrap();
    let mut stack = vm.stack();
    stack.encode(value).unwrap();
    assert_eq!(stack.top(), 1);
    let back = stack.decode_alloc::<T>(-1).unwrap().into_inner();
    assert_eq!(stack.top(), 1);
    back
}

#[derive(Debug, Clone, PartialEq, ToStack, FromStack)]
struct Settings {
    name: String,
    retries: u8,
    ratio: f64,
    tags: Vec<String>,
    parent: Option<Box<Settings>>,
}

#[derive(Debug, Clone, Copy, PartialEq, ToStack, FromStack)]
enum Mode {
    Fast,
    Safe,
}

#[test]
fn test_scalars() {
    assert_eq!(round_trip(0i64), 0);
    assert_eq!(round_trip(i64::MIN), i64::MIN);
    assert_eq!(round_trip(-7i8), -7);
    assert_eq!(round_trip(u64::MAX), u64::MAX);
    assert_eq!(round_trip((1u64 << 63) + 1), (1u64 << 63) + 1);
    assert_eq!(round_trip(usize::MAX), usize::MAX);
    assert_eq!(round_trip(1.5f64), 1.5);
    assert_eq!(round_trip(-0.25f32), -0.25);
    assert!(round_trip(true));
    assert_eq!(round_trip(Truthy(false)), Truthy(false));
    assert_eq!(round_trip(String::from("marshal")), "marshal");
    assert_eq!(round_trip(Void), Void);
}

#[test]
fn test_bytes_with_nul() {
    let bytes = ByteString(vec![0, 159, 146, 150, 0]);
    assert_eq!(round_trip(bytes.clone()), bytes);
}

#[test]
fn test_collections() {
    assert_eq!(round_trip(vec![1u32, 2, 3]), vec![1, 2, 3]);
    assert_eq!(round_trip(Vec::<i32>::new()), Vec::<i32>::new());
    assert_eq!(round_trip([[1i16, 2], [3, 4]]), [[1, 2], [3, 4]]);

    let mut map = HashMap::new();
    map.insert(String::from("a"), vec![true]);
    map.insert(String::from("b"), vec![false, true]);
    assert_eq!(round_trip(map.clone()), map);

    let mut sparse = BTreeMap::new();
    sparse.insert(1i64, String::from("one"));
    sparse.insert(100, String::from("hundred"));
    assert_eq!(round_trip(sparse.clone()), sparse);
}

#[test]
fn test_nested_struct() {
    let settings = Settings {
        name: String::from("child"),
        retries: 3,
        ratio: 0.5,
        tags: vec![String::from("x")],
        parent: Some(Box::new(Settings {
            name: String::from("root"),
            retries: 0,
            ratio: 1.0,
            tags: Vec::new(),
            parent: None,
        })),
    };
    assert_eq!(round_trip(settings.clone()), settings);
}

#[test]
fn test_unit_enum_in_option() {
    assert_eq!(round_trip(Some(Mode::Safe)), Some(Mode::Safe));
    assert_eq!(round_trip(None::<Mode>), None);
    assert_eq!(round_trip(vec![Mode::Fast, Mode::Safe]), vec![Mode::Fast, Mode::Safe]);
}

proptest! {
    #[test]
    fn prop_integer_round_trip(value in any::<i64>()) {
        prop_assert_eq!(round_trip(value), value);
    }

    #[test]
    fn prop_u32_round_trip(value in any::<u32>()) {
        prop_assert_eq!(round_trip(value), value);
    }

    #[test]
    fn prop_u64_round_trip(value in any::<u64>()) {
        prop_assert_eq!(round_trip(value), value);
    }

    #[test]
    fn prop_float_round_trip(value in any::<f64>().prop_filter("nan", |v| !v.is_nan())) {
        prop_assert_eq!(round_trip(value), value);
    }

    #[test]
    fn prop_string_round_trip(value in ".*") {
        prop_assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn prop_optional_round_trip(value in proptest::option::of(any::<i32>())) {
        prop_assert_eq!(round_trip(value), value);
    }

    #[test]
    fn prop_sequence_round_trip(values in proptest::collection::vec(any::<i16>(), 0..64)) {
        prop_assert_eq!(round_trip(values.clone()), values);
    }

    #[test]
    fn prop_struct_round_trip(
        name in "[a-z]{0,12}",
        retries in any::<u8>(),
        ratio in -1.0e6f64..1.0e6,
        tags in proptest::collection::vec("[a-z]{1,4}", 0..4),
    ) {
        let settings = Settings { name, retries, ratio, tags, parent: None };
        prop_assert_eq!(round_trip(settings.clone()), settings);
    }
}

use std::rc::Rc;

use num_bigint::BigInt;
use pretty_assertions::assert_eq;

use gembridge::{
    GemError, HostValue, LoginParams, MAX_SMALL_INT, MIN_SMALL_INT, Session,
    gci::{OOP_CLASS_LARGE_INTEGER, OOP_CLASS_UNICODE7, OOP_CLASS_UNICODE16, OOP_CLASS_UNICODE32},
    sim::{SimStone, errors},
};

fn login(stone: &SimStone) -> Session {
    Session::builder()
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap()
}

/// Sends `value` to the stone and converts the resulting object back.
fn round_trip(session: &Session, value: &HostValue) -> HostValue {
    let object = session.from_host(value).unwrap();
    session.to_host(&object).unwrap()
}

fn eval(session: &Session, source: &str) -> HostValue {
    session.execute(source, None, None).unwrap().to_host().unwrap()
}

// === Immediates ===

#[test]
fn immediates_need_no_native_calls() {
    let stone = SimStone::new();
    let session = login(&stone);
    stone.clear_calls();

    for value in [
        HostValue::None,
        HostValue::Bool(true),
        HostValue::Bool(false),
        HostValue::Int(0),
        HostValue::Int(-1),
        HostValue::Int(MAX_SMALL_INT),
        HostValue::Int(MIN_SMALL_INT),
    ] {
        assert_eq!(round_trip(&session, &value), value);
    }
    assert_eq!(stone.calls(), Vec::<&str>::new());
}

#[test]
fn immediates_from_the_stone() {
    let stone = SimStone::new();
    let session = login(&stone);

    assert_eq!(eval(&session, "^nil"), HostValue::None);
    assert_eq!(eval(&session, "^true"), HostValue::Bool(true));
    assert_eq!(eval(&session, "^3 > 4"), HostValue::Bool(false));
    assert_eq!(eval(&session, "^3 + 4 * 2"), HostValue::Int(14));
    assert_eq!(eval(&session, "^-17"), HostValue::Int(-17));
}

// === Integers beyond the small integer range ===

#[test]
fn integers_just_outside_the_small_range_become_large_integers() {
    let stone = SimStone::new();
    let session = login(&stone);

    for value in [MAX_SMALL_INT + 1, MIN_SMALL_INT - 1, i64::MAX, i64::MIN] {
        let object = session.from_host(&HostValue::Int(value)).unwrap();
        assert!(!object.oop().is_small_integer());
        assert_eq!(session.class_of(&object).unwrap().oop().raw(), OOP_CLASS_LARGE_INTEGER);
        assert_eq!(session.to_host(&object).unwrap(), HostValue::Int(value));
    }
}

#[test]
fn big_integers_keep_every_digit() {
    let stone = SimStone::new();
    let session = login(&stone);

    let huge: BigInt = "123456789012345678901234567890".parse().unwrap();
    assert_eq!(
        round_trip(&session, &HostValue::BigInt(huge.clone())),
        HostValue::BigInt(huge.clone())
    );
    assert_eq!(
        round_trip(&session, &HostValue::BigInt(-huge.clone())),
        HostValue::BigInt(-huge)
    );
    // a BigInt that fits is answered as a plain integer
    assert_eq!(round_trip(&session, &HostValue::BigInt(BigInt::from(5))), HostValue::Int(5));
}

#[test]
fn large_integer_arithmetic_in_the_stone() {
    let stone = SimStone::new();
    let session = login(&stone);

    let expected = HostValue::from(BigInt::from(MAX_SMALL_INT) + 1);
    assert_eq!(eval(&session, "^1152921504606846975 + 1"), expected);
    let square: BigInt = BigInt::from(i64::MAX) * BigInt::from(i64::MAX);
    assert_eq!(
        eval(&session, "^9223372036854775807 * 9223372036854775807"),
        HostValue::BigInt(square)
    );
}

// === Floats ===

#[test]
fn floats_round_trip() {
    let stone = SimStone::new();
    let session = login(&stone);

    for value in [0.0, 1.5, -2.25, 1e300, f64::MIN_POSITIVE] {
        assert_eq!(round_trip(&session, &HostValue::Float(value)), HostValue::Float(value));
    }
    assert_eq!(eval(&session, "^1.5 * 2"), HostValue::Float(3.0));
}

// === Strings, symbols and characters ===

#[test]
fn strings_pick_the_narrowest_unicode_class() {
    let stone = SimStone::new();
    let session = login(&stone);

    for (text, class) in [
        ("plain ascii", OOP_CLASS_UNICODE7),
        ("caf\u{e9}", OOP_CLASS_UNICODE16),
        ("\u{65e5}\u{672c}\u{8a9e}", OOP_CLASS_UNICODE16),
        ("\u{1f980} crab", OOP_CLASS_UNICODE32),
    ] {
        let object = session.from_host(&HostValue::from(text)).unwrap();
        assert_eq!(session.class_of(&object).unwrap().oop().raw(), class, "{text}");
        assert_eq!(session.to_host(&object).unwrap(), HostValue::from(text));
    }
}

#[test]
fn empty_and_long_strings() {
    let stone = SimStone::new();
    let session = login(&stone);

    assert_eq!(round_trip(&session, &HostValue::from("")), HostValue::from(""));
    let long: String = "abcdefghij".repeat(250);
    assert_eq!(round_trip(&session, &HostValue::from(long.as_str())), HostValue::String(long));
}

#[test]
fn strings_with_nul_bytes_are_rejected() {
    let stone = SimStone::new();
    let session = login(&stone);

    let err = session.from_host(&HostValue::from("a\0b")).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
}

#[test]
fn byte_strings_from_the_stone_decode_as_latin1() {
    let stone = SimStone::new();
    let session = login(&stone);

    assert_eq!(eval(&session, "^'it''s'"), HostValue::from("it's"));
    assert_eq!(eval(&session, "^'caf\u{e9}'"), HostValue::from("caf\u{e9}"));
    assert_eq!(eval(&session, "^'ab' , 'cd'"), HostValue::from("abcd"));
}

#[test]
fn wide_strings_from_the_stone_decode_as_utf8() {
    let stone = SimStone::new();
    let session = login(&stone);

    assert_eq!(eval(&session, "^'\u{65e5}\u{672c}'"), HostValue::from("\u{65e5}\u{672c}"));
    assert_eq!(eval(&session, "^'\u{1f980}'"), HostValue::from("\u{1f980}"));
}

#[test]
fn symbols_and_characters_become_strings() {
    let stone = SimStone::new();
    let session = login(&stone);

    assert_eq!(eval(&session, "^#size"), HostValue::from("size"));
    assert_eq!(eval(&session, "^#at:put:"), HostValue::from("at:put:"));
    assert_eq!(eval(&session, "^$a"), HostValue::from("a"));
    let symbol = session.new_symbol("yourself").unwrap();
    assert!(symbol.is_symbol().unwrap());
    assert_eq!(symbol.to_host().unwrap(), HostValue::from("yourself"));
}

// === Collections ===

#[test]
fn lists_keep_order_and_nesting() {
    let stone = SimStone::new();
    let session = login(&stone);

    let value = HostValue::List(vec![
        HostValue::Int(1),
        HostValue::from("two"),
        HostValue::List(vec![HostValue::Float(3.5), HostValue::None]),
        HostValue::List(Vec::new()),
        HostValue::Bool(true),
    ]);
    assert_eq!(round_trip(&session, &value), value);
}

#[test]
fn dicts_round_trip() {
    let stone = SimStone::new();
    let session = login(&stone);

    let value = HostValue::Dict(vec![
        (HostValue::from("b"), HostValue::Int(2)),
        (HostValue::from("a"), HostValue::List(vec![HostValue::Int(1)])),
        (HostValue::Int(7), HostValue::Dict(Vec::new())),
    ]);
    assert_eq!(round_trip(&session, &value), value);
}

#[test]
fn sets_hold_each_element_once() {
    let stone = SimStone::new();
    let session = login(&stone);

    let value = HostValue::Set(vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(1)]);
    assert_eq!(
        round_trip(&session, &value),
        HostValue::Set(vec![HostValue::Int(1), HostValue::Int(2)])
    );
}

#[test]
fn sets_and_dicts_compare_in_any_order() {
    let stone = SimStone::new();
    let session = login(&stone);

    let set = HostValue::Set(vec![HostValue::Int(3), HostValue::from("x"), HostValue::Int(1)]);
    assert_eq!(
        round_trip(&session, &set),
        HostValue::Set(vec![HostValue::Int(1), HostValue::Int(3), HostValue::from("x")])
    );

    let dict = HostValue::Dict(vec![
        (HostValue::Int(1), HostValue::from("one")),
        (HostValue::Int(2), HostValue::from("two")),
    ]);
    assert_eq!(
        round_trip(&session, &dict),
        HostValue::Dict(vec![
            (HostValue::Int(2), HostValue::from("two")),
            (HostValue::Int(1), HostValue::from("one")),
        ])
    );
}

#[test]
fn remote_collections_are_real_collections() {
    let stone = SimStone::new();
    let session = login(&stone);

    let list = session
        .from_host(&HostValue::from(vec![HostValue::Int(10), HostValue::Int(20)]))
        .unwrap();
    assert_eq!(list.perform("size", &[]).unwrap().to_host().unwrap(), HostValue::Int(2));
    let three = session.from_host(&HostValue::Int(30)).unwrap();
    list.perform("add:", &[&three]).unwrap();
    assert_eq!(
        list.to_host().unwrap(),
        HostValue::List(vec![HostValue::Int(10), HostValue::Int(20), HostValue::Int(30)])
    );
}

#[test]
fn byte_arrays_come_back_as_bytes() {
    let stone = SimStone::new();
    let session = login(&stone);

    assert_eq!(eval(&session, "^ByteArray new"), HostValue::Bytes(Vec::new()));
}

// === Unsupported values ===

#[test]
fn host_bytes_have_no_remote_encoding() {
    let stone = SimStone::new();
    let session = login(&stone);

    let err = session.from_host(&HostValue::Bytes(vec![1, 2, 3])).unwrap_err();
    assert!(matches!(err, GemError::Unsupported(_)), "{err}");
    assert_eq!(err.to_string(), "unsupported: no remote encoding for host type bytes");
}

#[test]
fn unknown_classes_are_named_in_the_error() {
    let stone = SimStone::new();
    let session = login(&stone);

    let object = session.execute("^Object new", None, None).unwrap();
    let err = object.to_host().unwrap_err();
    assert!(matches!(err, GemError::Unsupported(_)), "{err}");
    assert_eq!(err.to_string(), "unsupported: no host conversion for remote class Object");

    let class = session.execute("^OrderedCollection", None, None).unwrap();
    let err = class.to_host().unwrap_err();
    assert_eq!(err.to_string(), "unsupported: no host conversion for remote class Class");
}

#[test]
fn unsupported_elements_fail_the_whole_collection() {
    let stone = SimStone::new();
    let session = login(&stone);

    let list = session.execute("^OrderedCollection new", None, None).unwrap();
    let object = session.execute("^Object new", None, None).unwrap();
    list.perform("add:", &[&object]).unwrap();
    assert!(matches!(list.to_host(), Err(GemError::Unsupported(_))));
}

#[test]
fn collections_that_contain_themselves_are_rejected() {
    let stone = SimStone::new();
    let session = login(&stone);

    let list = session.execute("^OrderedCollection new", None, None).unwrap();
    list.perform("add:", &[&list]).unwrap();
    let err = list.to_host().unwrap_err();
    assert!(matches!(&err, GemError::Unsupported(msg) if msg.contains("contains itself")), "{err}");

    let dict = session.execute("^KeyValueDictionary new", None, None).unwrap();
    let key = session.from_host(&HostValue::from("me")).unwrap();
    let outer = session.from_host(&HostValue::List(vec![HostValue::Object(dict.clone())])).unwrap();
    dict.perform("at:put:", &[&key, &outer]).unwrap();
    assert!(matches!(dict.to_host(), Err(GemError::Unsupported(_))));
    assert!(session.is_logged_in());
}

#[test]
fn shared_elements_are_not_cycles() {
    let stone = SimStone::new();
    let session = login(&stone);

    let inner = session.from_host(&HostValue::List(vec![HostValue::Int(1)])).unwrap();
    let outer = session.execute("^OrderedCollection new", None, None).unwrap();
    outer.perform("add:", &[&inner]).unwrap();
    outer.perform("add:", &[&inner]).unwrap();
    let one = HostValue::List(vec![HostValue::Int(1)]);
    assert_eq!(outer.to_host().unwrap(), HostValue::List(vec![one.clone(), one]));
}

#[test]
fn unresolvable_collection_classes_match_nothing() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = session.execute("^Object new", None, None).unwrap();

    stone.fail_next("GciTsResolveSymbol", errors::UNDEFINED_SYMBOL, "OrderedCollection is not visible");
    let err = object.to_host().unwrap_err();
    assert_eq!(err.to_string(), "unsupported: no host conversion for remote class Object");

    // the failed lookup is not remembered
    let list = HostValue::List(vec![HostValue::Int(4)]);
    assert_eq!(round_trip(&session, &list), list);
}

#[test]
fn collections_may_carry_existing_objects() {
    let stone = SimStone::new();
    let session = login(&stone);

    let object = session.execute("^Object new", None, None).unwrap();
    let list = session
        .from_host(&HostValue::List(vec![HostValue::Object(object.clone())]))
        .unwrap();
    let first = list.perform("at:", &[&session.from_host(&HostValue::Int(1)).unwrap()]).unwrap();
    assert!(first.ptr_eq(&object));
}

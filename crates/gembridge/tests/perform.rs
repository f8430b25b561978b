use std::rc::Rc;

use pretty_assertions::assert_eq;

use gembridge::{GemError, GemObject, HostValue, LoginParams, Session, sim::SimStone};

fn login(stone: &SimStone) -> Session {
    Session::builder()
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap()
}

fn int(session: &Session, value: i64) -> GemObject {
    session.from_host(&HostValue::Int(value)).unwrap()
}

fn arity_mismatch(err: &GemError) -> (String, usize, usize) {
    match err {
        GemError::ArityMismatch {
            selector,
            expected,
            given,
        } => (selector.clone(), *expected, *given),
        other => panic!("expected an arity mismatch, got {other}"),
    }
}

#[test]
fn unary_binary_and_keyword_sends() {
    let stone = SimStone::new();
    let session = login(&stone);
    let three = int(&session, 3);
    let four = int(&session, 4);

    let sum = three.perform("+", &[&four]).unwrap();
    assert_eq!(sum.to_host().unwrap(), HostValue::Int(7));
    let less = session.perform(&three, "<", &[&four]).unwrap();
    assert_eq!(less.to_host().unwrap(), HostValue::Bool(true));

    let dict = session.execute("^KeyValueDictionary new", None, None).unwrap();
    dict.perform("at:put:", &[&three, &four]).unwrap();
    assert_eq!(dict.perform("at:", &[&three]).unwrap().to_host().unwrap(), HostValue::Int(4));
    assert_eq!(dict.perform("size", &[]).unwrap().to_host().unwrap(), HostValue::Int(1));
}

#[test]
fn wrong_argument_counts_never_reach_the_stone() {
    let stone = SimStone::new();
    let session = login(&stone);
    let dict = session.execute("^KeyValueDictionary new", None, None).unwrap();
    let key = int(&session, 1);
    stone.clear_calls();

    let err = dict.perform("at:put:", &[&key]).unwrap_err();
    assert_eq!(arity_mismatch(&err), ("at:put:".to_owned(), 2, 1));
    assert_eq!(err.to_string(), "at:put: takes exactly 2 arguments (1 given)");

    let err = dict.perform("size", &[&key]).unwrap_err();
    assert_eq!(arity_mismatch(&err), ("size".to_owned(), 0, 1));

    let err = key.perform("+", &[]).unwrap_err();
    assert_eq!(arity_mismatch(&err), ("+".to_owned(), 1, 0));

    assert!(stone.calls().is_empty());
}

#[test]
fn symbol_selectors() {
    let stone = SimStone::new();
    let session = login(&stone);
    let list = session
        .from_host(&HostValue::List(vec![HostValue::Int(5), HostValue::Int(6)]))
        .unwrap();

    let size = session.new_symbol("size").unwrap();
    stone.clear_calls();
    let answer = list.perform(&size, &[]).unwrap();
    assert_eq!(answer.to_host().unwrap(), HostValue::Int(2));
    // the text of a symbol made by new_symbol is already known
    assert_eq!(stone.calls(), ["GciTsPerform"]);

    let add = session.new_symbol("add:").unwrap();
    let err = list.perform(&add, &[]).unwrap_err();
    assert_eq!(arity_mismatch(&err), ("add:".to_owned(), 1, 0));
}

#[test]
fn symbols_from_the_stone_are_read_once() {
    let stone = SimStone::new();
    let session = login(&stone);
    let list = session.execute("^OrderedCollection new", None, None).unwrap();
    let selector = session.execute("^#isEmpty", None, None).unwrap();
    stone.clear_calls();

    let first = list.perform(&selector, &[]).unwrap();
    assert_eq!(first.to_host().unwrap(), HostValue::Bool(true));
    let reads = stone.call_count("GciTsFetchBytes");
    assert_eq!(reads, 1);

    let second = list.perform(&selector, &[]).unwrap();
    assert_eq!(second.to_host().unwrap(), HostValue::Bool(true));
    assert_eq!(stone.call_count("GciTsFetchBytes"), reads);
}

#[test]
fn non_symbol_selectors_are_rejected() {
    let stone = SimStone::new();
    let session = login(&stone);
    let list = session.execute("^OrderedCollection new", None, None).unwrap();
    let number = int(&session, 12);

    let err = list.perform(&number, &[]).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
    assert_eq!(stone.call_count("GciTsPerform"), 0);
}

#[test]
fn strings_are_not_selectors() {
    let stone = SimStone::new();
    let session = login(&stone);
    let list = session.execute("^OrderedCollection new", None, None).unwrap();
    let text = session.from_host(&HostValue::from("size")).unwrap();

    for _ in 0..2 {
        let err = list.perform(&text, &[]).unwrap_err();
        assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
    }
    assert_eq!(stone.call_count("GciTsPerform"), 0);
    assert_eq!(stone.call_count("GciTsFetchUtf8Bytes"), 0);
    assert_eq!(stone.call_count("GciTsFetchBytes"), 0);
}

#[test]
fn arguments_from_another_session_are_rejected() {
    let stone = SimStone::new();
    let one = login(&stone);
    let two = login(&stone);
    let list = one.execute("^OrderedCollection new", None, None).unwrap();
    let foreign = two.execute("^Object new", None, None).unwrap();

    let err = list.perform("add:", &[&foreign]).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
    let foreign_symbol = two.new_symbol("size").unwrap();
    let err = list.perform(&foreign_symbol, &[]).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
}

#[test]
fn selectors_with_nul_bytes_are_rejected() {
    let stone = SimStone::new();
    let session = login(&stone);
    let list = session.execute("^OrderedCollection new", None, None).unwrap();

    let err = list.perform("si\0ze", &[]).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
}

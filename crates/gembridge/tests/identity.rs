use std::rc::Rc;

use gembridge::{GemError, HostValue, LoginParams, Oop, RecordingTracer, Session, TraceEvent, sim::SimStone};

fn login(stone: &SimStone) -> Session {
    Session::builder()
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap()
}

#[test]
fn same_oop_while_held_is_the_same_proxy() {
    let stone = SimStone::new();
    let session = login(&stone);

    let first = session.execute("^UserGlobals", None, None).unwrap();
    let second = session.execute("^UserGlobals", None, None).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first, second);
    assert_eq!(session.live_proxy_count(), 1);
}

#[test]
fn answers_of_message_sends_keep_identity() {
    let stone = SimStone::new();
    let session = login(&stone);

    let list = session.execute("^OrderedCollection new", None, None).unwrap();
    let same = list.perform("yourself", &[]).unwrap();
    assert!(same.ptr_eq(&list));

    let first = session.resolve_symbol("UserGlobals", None).unwrap();
    let second = session.resolve_symbol("UserGlobals", None).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(session.live_proxy_count(), 2);
}

#[test]
fn unreferenced_objects_get_a_fresh_proxy() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = Session::builder()
        .tracer(recorder.clone())
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap();

    let globals = session.execute("^UserGlobals", None, None).unwrap();
    let oop = globals.oop();
    drop(globals);
    assert_eq!(session.live_proxy_count(), 0);
    assert_eq!(session.pending_release_count(), 1);

    let again = session.execute("^UserGlobals", None, None).unwrap();
    assert_eq!(again.oop(), oop);
    assert_eq!(session.live_proxy_count(), 1);
    let created = recorder
        .events()
        .iter()
        .filter(|event| **event == TraceEvent::ProxyCreated { oop })
        .count();
    assert_eq!(created, 2);

    // the new proxy keeps the object exported
    session.flush_releases().unwrap();
    assert!(stone.is_exported(oop.raw()));
}

#[test]
fn clones_are_the_same_proxy() {
    let stone = SimStone::new();
    let session = login(&stone);

    let object = session.execute("^Object new", None, None).unwrap();
    let copy = object.clone();
    assert!(object.ptr_eq(&copy));
    assert_eq!(copy.oop(), object.oop());
}

#[test]
fn proxy_lookup_makes_no_native_call() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = session.execute("^Object new", None, None).unwrap();
    stone.clear_calls();

    let again = session.object(object.oop());
    assert!(again.ptr_eq(&object));
    let nil = session.object(Oop::NIL);
    assert!(nil.is_nil());
    assert!(stone.calls().is_empty());
}

#[test]
fn distinct_objects_get_distinct_proxies() {
    let stone = SimStone::new();
    let session = login(&stone);

    let a = session.execute("^Object new", None, None).unwrap();
    let b = session.execute("^Object new", None, None).unwrap();
    assert_ne!(a.oop(), b.oop());
    assert_ne!(a, b);
}

#[test]
fn sessions_do_not_share_proxies() {
    let stone = SimStone::new();
    let one = login(&stone);
    let two = login(&stone);

    let from_one = one.execute("^UserGlobals", None, None).unwrap();
    let from_two = two.execute("^UserGlobals", None, None).unwrap();
    assert_eq!(from_one.oop(), from_two.oop());
    assert!(!from_one.ptr_eq(&from_two));
    assert_eq!(from_one.session(), one);
    assert_ne!(from_one.session(), two);
}

#[test]
fn foreign_proxies_are_rejected_before_any_native_call() {
    let stone = SimStone::new();
    let one = login(&stone);
    let two = login(&stone);
    let foreign = one.execute("^OrderedCollection new", None, None).unwrap();
    stone.clear_calls();

    let err = two.perform(&foreign, "size", &[]).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
    let err = two.from_host(&HostValue::Object(foreign.clone())).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
    let err = two.to_host(&foreign).unwrap_err();
    assert!(matches!(err, GemError::ProtocolViolation(_)), "{err}");
    assert!(stone.calls().is_empty());
}

#[test]
fn host_object_values_pass_through() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = session.execute("^Object new", None, None).unwrap();

    let back = session.from_host(&HostValue::Object(object.clone())).unwrap();
    assert!(back.ptr_eq(&object));
}

#[test]
fn proxies_format_their_oop() {
    let stone = SimStone::new();
    let session = login(&stone);

    let nil = session.object(Oop::NIL);
    assert_eq!(format!("{nil:?}"), "GemObject(0x14)");
    assert_eq!(nil.to_string(), "<GemObject with oop 20>");
}

#[test]
fn proxies_keep_their_session_alive() {
    let stone = SimStone::new();
    let object = {
        let session = login(&stone);
        session.execute("^Object new", None, None).unwrap()
    };
    // the session handle is gone but the proxy still works
    assert_eq!(stone.session_count(), 1);
    assert!(object.session().is_logged_in());
    let class = object.gemstone_class().unwrap();
    assert_eq!(class.perform("name", &[]).unwrap().to_host().unwrap(), HostValue::from("Object"));

    drop(class);
    drop(object);
    assert_eq!(stone.session_count(), 0);
}

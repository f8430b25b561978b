use std::rc::Rc;

use gembridge::{HostValue, LoginParams, RecordingTracer, Session, SessionConfig, TraceEvent, sim::SimStone};

const CHUNK: usize = 10;

fn login(stone: &SimStone) -> Session {
    Session::builder()
        .config(SessionConfig::new().fetch_chunk_size(CHUNK))
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap()
}

#[test]
fn byte_strings_take_one_call_per_chunk_plus_the_short_one() {
    let stone = SimStone::new();
    let session = login(&stone);

    for len in [0, 1, 9, 10, 11, 25, 30] {
        let text = "x".repeat(len);
        let object = session.execute(format!("^'{text}'").as_str(), None, None).unwrap();
        stone.clear_calls();
        assert_eq!(object.to_host().unwrap(), HostValue::String(text));
        assert_eq!(stone.call_count("GciTsFetchBytes"), len / CHUNK + 1, "length {len}");
    }
}

#[test]
fn utf8_fetches_are_chunked_by_encoded_length() {
    let stone = SimStone::new();
    let session = login(&stone);

    // 12 characters, 24 bytes of UTF-8
    let text = "\u{e9}".repeat(12);
    let object = session.from_host(&HostValue::from(text.as_str())).unwrap();
    stone.clear_calls();
    assert_eq!(object.to_host().unwrap(), HostValue::String(text));
    assert_eq!(stone.call_count("GciTsFetchUtf8Bytes"), 3);
    assert_eq!(stone.call_count("GciTsFetchBytes"), 0);
}

#[test]
fn intermediate_utf8_objects_are_released_after_each_chunk() {
    let stone = SimStone::new();
    let session = login(&stone);

    let object = session.from_host(&HostValue::from("\u{3b1}\u{3b2}\u{3b3}".repeat(4).as_str())).unwrap();
    let exported = stone.export_count();
    stone.clear_calls();
    object.to_host().unwrap();

    let calls: Vec<_> = stone
        .calls()
        .into_iter()
        .filter(|&call| call != "GciTsFetchClass")
        .collect();
    assert_eq!(
        calls,
        [
            "GciTsFetchUtf8Bytes",
            "GciTsReleaseObjs",
            "GciTsFetchUtf8Bytes",
            "GciTsReleaseObjs",
            "GciTsFetchUtf8Bytes",
            "GciTsReleaseObjs",
        ]
    );
    // the class object is the only new export
    assert_eq!(stone.export_count(), exported + 1);
    for batch in stone.release_batches() {
        assert_eq!(batch.len(), 1);
        assert!(!stone.is_exported(batch[0]));
    }
}

#[test]
fn byte_strings_and_symbols_need_no_intermediate() {
    let stone = SimStone::new();
    let session = login(&stone);

    let object = session.execute("^'plain'", None, None).unwrap();
    let symbol = session.new_symbol("plain").unwrap();
    stone.clear_calls();
    assert_eq!(object.to_host().unwrap(), HostValue::from("plain"));
    assert_eq!(symbol.to_host().unwrap(), HostValue::from("plain"));
    assert_eq!(stone.call_count("GciTsReleaseObjs"), 0);
}

#[test]
fn chunk_size_of_one_still_terminates() {
    let stone = SimStone::new();
    let session = Session::builder()
        .config(SessionConfig::new().fetch_chunk_size(0))
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap();
    assert_eq!(session.config().fetch_chunk_size, 1);

    let object = session.execute("^'abc'", None, None).unwrap();
    stone.clear_calls();
    assert_eq!(object.to_host().unwrap(), HostValue::from("abc"));
    assert_eq!(stone.call_count("GciTsFetchBytes"), 4);
}

#[test]
fn large_integers_are_fetched_through_their_print_string() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = Session::builder()
        .config(SessionConfig::new().fetch_chunk_size(CHUNK))
        .tracer(recorder.clone())
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap();

    // 25 digits
    let object = session.execute("^1234567890123456789012345", None, None).unwrap();
    stone.clear_calls();
    let value = object.to_host().unwrap();
    assert_eq!(value.to_string(), "1234567890123456789012345");
    assert_eq!(
        stone.calls(),
        ["GciTsFetchClass", "GciTsPerform", "GciTsFetchBytes", "GciTsFetchBytes", "GciTsFetchBytes"]
    );
    assert!(recorder.events().iter().any(|event| matches!(event, TraceEvent::ProxyFinalized { .. })));
}

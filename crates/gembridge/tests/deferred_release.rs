use std::rc::Rc;

use gembridge::{
    GemError, GemObject, HostValue, LoginParams, NativeCall, Oop, RecordingTracer, Session, SessionConfig,
    TraceEvent,
    sim::{SimStone, errors},
};

fn login_with(stone: &SimStone, config: SessionConfig, recorder: &RecordingTracer) -> Session {
    Session::builder()
        .config(config)
        .tracer(recorder.clone())
        .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
        .unwrap()
}

fn login(stone: &SimStone) -> Session {
    login_with(stone, SessionConfig::new(), &RecordingTracer::new())
}

fn new_object(session: &Session) -> GemObject {
    session.execute("^Object new", None, None).unwrap()
}

fn flushes(recorder: &RecordingTracer) -> Vec<TraceEvent> {
    recorder
        .events()
        .into_iter()
        .filter(|event| matches!(event, TraceEvent::ReleaseFlush { .. }))
        .collect()
}

#[test]
fn dropped_proxies_wait_for_a_flush() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = new_object(&session);
    let oop = object.oop().raw();
    assert!(stone.is_exported(oop));

    drop(object);
    assert_eq!(session.pending_release_count(), 1);
    assert!(stone.is_exported(oop));
    assert_eq!(stone.call_count("GciTsReleaseObjs"), 0);

    session.flush_releases().unwrap();
    assert_eq!(session.pending_release_count(), 0);
    assert!(!stone.is_exported(oop));
    assert_eq!(stone.release_batches(), vec![vec![oop]]);
}

#[test]
fn clones_release_only_when_the_last_handle_goes() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = new_object(&session);
    let copy = object.clone();

    drop(object);
    assert_eq!(session.pending_release_count(), 0);
    drop(copy);
    assert_eq!(session.pending_release_count(), 1);
}

#[test]
fn special_oops_are_never_released() {
    let stone = SimStone::new();
    let session = login(&stone);

    for value in [HostValue::None, HostValue::Bool(true), HostValue::Int(42)] {
        drop(session.from_host(&value).unwrap());
    }
    drop(session.execute("^$x", None, None).unwrap());
    assert_eq!(session.pending_release_count(), 0);
    session.flush_releases().unwrap();
    assert_eq!(stone.call_count("GciTsReleaseObjs"), 0);
}

#[test]
fn flushing_nothing_makes_no_native_call() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = login_with(&stone, SessionConfig::new(), &recorder);
    stone.clear_calls();

    session.flush_releases().unwrap();
    assert!(stone.calls().is_empty());
    assert!(flushes(&recorder).is_empty());
}

#[test]
fn exceeding_the_batch_size_flushes_automatically() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = login_with(&stone, SessionConfig::new().release_batch_size(3), &recorder);
    let objects: Vec<_> = (0..4).map(|_| new_object(&session)).collect();
    let oops: Vec<_> = objects.iter().map(|o| o.oop().raw()).collect();

    let mut objects = objects.into_iter();
    for pending in 1..=3 {
        drop(objects.next());
        assert_eq!(session.pending_release_count(), pending);
    }
    assert_eq!(stone.call_count("GciTsReleaseObjs"), 0);

    drop(objects.next());
    assert_eq!(session.pending_release_count(), 0);
    assert_eq!(stone.release_batches(), vec![oops]);
    assert_eq!(
        flushes(&recorder),
        [TraceEvent::ReleaseFlush {
            released: 4,
            revived: 0
        }]
    );
}

#[test]
fn revived_oops_are_left_out_of_the_batch() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = login_with(&stone, SessionConfig::new(), &recorder);
    let kept = new_object(&session);
    let revived = new_object(&session);
    let kept_oop = kept.oop();
    let revived_oop = revived.oop();

    drop(kept);
    drop(revived);
    assert_eq!(session.pending_release_count(), 2);

    // the oop comes back, e.g. as the answer of another call
    let again = session.object(revived_oop);
    session.flush_releases().unwrap();
    assert_eq!(stone.release_batches(), vec![vec![kept_oop.raw()]]);
    assert!(stone.is_exported(revived_oop.raw()));
    assert_eq!(
        flushes(&recorder),
        [TraceEvent::ReleaseFlush {
            released: 1,
            revived: 1
        }]
    );

    drop(again);
    assert_eq!(session.pending_release_count(), 1);
}

#[test]
fn a_fully_revived_batch_skips_the_native_call() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = new_object(&session);
    let oop: Oop = object.oop();
    drop(object);

    let _again = session.object(oop);
    stone.clear_calls();
    session.flush_releases().unwrap();
    assert_eq!(stone.call_count("GciTsReleaseObjs"), 0);
    assert_eq!(session.pending_release_count(), 0);
}

#[test]
fn automatic_flush_failures_are_absorbed_and_traced() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = login_with(&stone, SessionConfig::new().release_batch_size(0), &recorder);
    let object = new_object(&session);
    let oop = object.oop().raw();

    stone.fail_next("GciTsReleaseObjs", errors::OBJECT_DOES_NOT_EXIST, "release refused");
    drop(object);

    // the batch is gone and the session keeps working
    assert_eq!(session.pending_release_count(), 0);
    assert!(stone.is_exported(oop));
    let failures: Vec<_> = recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            TraceEvent::ReleaseFailed { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(failures, ["release refused"]);
    assert_eq!(
        session.execute("^1 + 1", None, None).unwrap().to_host().unwrap(),
        HostValue::Int(2)
    );
}

#[test]
fn explicit_flush_failures_are_reported() {
    let stone = SimStone::new();
    let session = login(&stone);
    drop(new_object(&session));

    stone.fail_next("GciTsReleaseObjs", errors::OBJECT_DOES_NOT_EXIST, "release refused");
    let err = session.flush_releases().unwrap_err();
    let remote = err.as_remote().unwrap();
    assert_eq!(remote.number(), errors::OBJECT_DOES_NOT_EXIST);
    assert_eq!(remote.message(), "release refused");
    // the pending set is emptied either way
    assert_eq!(session.pending_release_count(), 0);
}

#[test]
fn logout_discards_pending_releases() {
    let stone = SimStone::new();
    let session = login(&stone);
    let object = new_object(&session);
    let survivor = new_object(&session);
    drop(object);
    assert_eq!(session.pending_release_count(), 1);

    session.logout().unwrap();
    assert_eq!(session.pending_release_count(), 0);
    drop(survivor);
    assert_eq!(session.pending_release_count(), 0);
    assert_eq!(stone.call_count("GciTsReleaseObjs"), 0);
    assert!(matches!(session.flush_releases(), Err(GemError::InvalidSession)));
}

#[test]
fn proxy_churn_is_traced() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = login_with(&stone, SessionConfig::new(), &recorder);
    recorder.clear();

    let object = new_object(&session);
    let oop = object.oop();
    drop(object);
    assert_eq!(
        recorder.events(),
        [
            TraceEvent::NativeCall {
                call: NativeCall::Execute
            },
            TraceEvent::ProxyCreated { oop },
            TraceEvent::ProxyFinalized { oop },
        ]
    );
}

use std::rc::Rc;

use gembridge::{
    HostValue, LoginParams, NativeCall, ProfilingTracer, RecordingTracer, Session, SessionConfig, StderrTracer,
    TraceEvent, sim::SimStone,
};

fn params() -> LoginParams {
    LoginParams::new("DataCurator", "swordfish")
}

#[test]
fn profiling_counts_calls_and_release_traffic() {
    let stone = SimStone::new();
    let profiler = ProfilingTracer::new();
    let session = Session::builder()
        .tracer(profiler.clone())
        .login_rpc(Rc::new(stone.clone()), &params())
        .unwrap();

    for _ in 0..3 {
        let object = session.execute("^Object new", None, None).unwrap();
        drop(object);
    }
    session.flush_releases().unwrap();
    let _ = session.execute("^nil foo", None, None);

    assert_eq!(profiler.call_count(NativeCall::Execute), 4);
    assert_eq!(profiler.call_count(NativeCall::ReleaseObjs), 1);
    let report = profiler.report();
    assert_eq!(report.call_counts[0], (NativeCall::Execute, 4));
    assert_eq!(report.total_calls, 7);
    assert_eq!(report.total_errors, 1);
    assert_eq!(report.proxies_created, 3);
    assert_eq!(report.proxies_finalized, 3);
    assert_eq!(report.flushes, 1);
    assert_eq!(report.oops_released, 3);
    assert_eq!(report.oops_revived, 0);

    let text = report.to_string();
    assert!(text.contains("=== Session Profiling Report ==="), "{text}");
    assert!(text.contains("Execute"), "{text}");
}

#[test]
fn recording_captures_a_whole_exchange() {
    let stone = SimStone::new();
    let recorder = RecordingTracer::new();
    let session = Session::builder()
        .config(SessionConfig::new().fetch_chunk_size(64))
        .tracer(recorder.clone())
        .login_rpc(Rc::new(stone.clone()), &params())
        .unwrap();
    recorder.clear();

    let text = session.execute("^'hi'", None, None).unwrap();
    assert_eq!(text.to_host().unwrap(), HostValue::from("hi"));
    let oop = text.oop();
    drop(text);

    assert_eq!(
        recorder.events(),
        [
            TraceEvent::NativeCall {
                call: NativeCall::Execute
            },
            TraceEvent::ProxyCreated { oop },
            TraceEvent::NativeCall {
                call: NativeCall::FetchClass
            },
            TraceEvent::NativeCall {
                call: NativeCall::FetchBytes
            },
            TraceEvent::ProxyFinalized { oop },
        ]
    );
}

#[test]
fn stderr_tracing_does_not_disturb_the_session() {
    let stone = SimStone::new();
    let session = Session::builder()
        .tracer(StderrTracer::with_limit(2))
        .login_rpc(Rc::new(stone.clone()), &params())
        .unwrap();

    let answer = session.execute("^2 + 2", None, None).unwrap();
    assert_eq!(answer.to_host().unwrap(), HostValue::Int(4));
    assert!(session.execute("^nil foo", None, None).is_err());
    session.logout().unwrap();
}

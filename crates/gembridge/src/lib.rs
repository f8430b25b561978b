#![doc = include_str!("../../../README.md")]
mod config;
mod error;
pub mod gci;
mod marshal;
pub mod native;
mod oop;
mod proxy;
mod remote_error;
mod session;
pub mod sim;
pub mod tracer;
mod value;

pub use crate::{
    config::{
        ConnectionConfig, DEFAULT_FETCH_CHUNK_SIZE, DEFAULT_RELEASE_BATCH_SIZE, LoginParams, SessionConfig,
        TransportKind,
    },
    error::{GemError, GemResult},
    native::dynamic::{GciLnkLibrary, GciTsLibrary},
    oop::{MAX_SMALL_INT, MIN_SMALL_INT, Oop, decode_small_integer, encode_small_integer, is_small_integer},
    proxy::GemObject,
    remote_error::RemoteError,
    session::{Session, SessionBuilder, SessionState, TextOrObject, linked_session_active, selector_arity},
    tracer::{
        NativeCall, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, SessionTracer, StderrTracer,
        TraceEvent,
    },
    value::HostValue,
};

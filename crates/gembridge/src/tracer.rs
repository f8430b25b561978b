//! Session tracing infrastructure.
//!
//! Provides a trait-based tracing system for sessions. A session owns one boxed
//! [`SessionTracer`] and reports key events to it: logins, native calls and their failures,
//! proxy creation and finalization, and export-set release batches.
//!
//! # Architecture
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Does nothing (default) |
//! | [`StderrTracer`] | Human-readable session log to stderr |
//! | [`ProfilingTracer`] | Native call counters and proxy/release statistics |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis or tests |
//!
//! # Usage
//!
//! ```ignore
//! // Debugging:
//! let session = Session::builder().tracer(StderrTracer::new()).login_rpc(gci, &params)?;
//!
//! // Profiling:
//! let profiler = ProfilingTracer::new();
//! let session = Session::builder().tracer(profiler.clone()).login_rpc(gci, &params)?;
//! // ... run ...
//! println!("{}", profiler.report());
//! ```
//!
//! [`ProfilingTracer`] and [`RecordingTracer`] share their state between clones, so keep a
//! clone to read the results after handing the tracer to a session.

use std::{cell::RefCell, fmt, rc::Rc};

use ahash::AHashMap;

use crate::{config::TransportKind, oop::Oop};

/// A native entry point, named independently of the transport that implements it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::IntoStaticStr, strum::Display)]
pub enum NativeCall {
    Encrypt,
    Login,
    Logout,
    Begin,
    Abort,
    Commit,
    IsRemote,
    Execute,
    Perform,
    ResolveSymbol,
    NewSymbol,
    IsKindOf,
    FetchClass,
    FetchBytes,
    FetchUtf8Bytes,
    OopToDouble,
    DoubleToOop,
    NewUtf8String,
    ReleaseObjs,
    ContinueWith,
    ClearStack,
}

/// Trace event emitted by a session.
///
/// Used by [`RecordingTracer`] to capture a full session history.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// A login completed.
    Login {
        transport: TransportKind,
        stone_name: String,
        username: String,
    },
    /// The login succeeded with a warning (degraded login or skipped session init).
    LoginWarning { message: String },
    /// The session logged out.
    Logout,
    /// A native entry point was called.
    NativeCall { call: NativeCall },
    /// A native entry point reported an error.
    NativeError {
        call: NativeCall,
        number: i32,
        message: String,
    },
    /// A new proxy entered the identity cache.
    ProxyCreated { oop: Oop },
    /// The last handle of a proxy was dropped.
    ProxyFinalized { oop: Oop },
    /// The pending-release set was flushed.
    ReleaseFlush {
        /// Oops handed to the native release call.
        released: usize,
        /// Oops dropped from the batch because a live proxy had been created for them again.
        revived: usize,
    },
    /// An automatic release flush failed; the batch was discarded.
    ReleaseFailed { message: String },
}

/// Trait for session tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] needs no code and
/// implementations only override the hooks they care about.
pub trait SessionTracer: fmt::Debug {
    /// Called after a successful login.
    fn on_login(&mut self, _transport: TransportKind, _stone_name: &str, _username: &str) {}

    /// Called when a login succeeds but the library reported a warning alongside it.
    fn on_login_warning(&mut self, _message: &str) {}

    /// Called after the session logged out.
    fn on_logout(&mut self) {}

    /// Called before each native entry point is invoked.
    ///
    /// This is the hottest hook; implementations should be lightweight.
    fn on_native_call(&mut self, _call: NativeCall) {}

    /// Called when a native entry point reports an error.
    fn on_native_error(&mut self, _call: NativeCall, _number: i32, _message: &str) {}

    /// Called when an oop gets its first live proxy.
    fn on_proxy_created(&mut self, _oop: Oop) {}

    /// Called when the last handle of a proxy is dropped.
    fn on_proxy_finalized(&mut self, _oop: Oop) {}

    /// Called after the pending-release set was flushed.
    ///
    /// # Arguments
    /// * `released` - Number of oops passed to the native release call
    /// * `revived` - Number of pending oops skipped because they are live again
    fn on_release_flush(&mut self, _released: usize, _revived: usize) {}

    /// Called when an automatic flush fails. The failure is not raised to any caller.
    fn on_release_failed(&mut self, _message: &str) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl SessionTracer for NoopTracer {}

// ============================================================================
// StderrTracer: human-readable session log
// ============================================================================

/// Tracer that prints a human-readable session log to stderr.
///
/// Output format:
/// ```text
/// === LOGIN rpc gs64stone as DataCurator
///   gci Execute
///   +++ proxy 0x1a2b01
///   gci Perform
///   !!! Perform failed: 2010 a MessageNotUnderstood occurred
///   --- proxy 0x1a2b01
///   >>> release 3 (0 revived)
/// === LOGOUT
/// ```
#[derive(Debug)]
pub struct StderrTracer {
    /// Maximum number of native calls to log before going quiet. None = unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no native call limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit: None,
            count: 0,
            stopped: false,
        }
    }

    /// Creates a new stderr tracer that stops logging native calls after `limit` of them.
    ///
    /// Login, logout and error lines are always printed.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
            stopped: false,
        }
    }
}

impl Default for StderrTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracer for StderrTracer {
    fn on_login(&mut self, transport: TransportKind, stone_name: &str, username: &str) {
        let kind = match transport {
            TransportKind::Linked => "linked",
            TransportKind::Rpc => "rpc",
        };
        eprintln!("=== LOGIN {kind} {stone_name} as {username}");
    }

    fn on_login_warning(&mut self, message: &str) {
        eprintln!("  ??? login warning: {message}");
    }

    fn on_logout(&mut self) {
        eprintln!("=== LOGOUT");
    }

    fn on_native_call(&mut self, call: NativeCall) {
        if self.stopped {
            return;
        }
        eprintln!("  gci {call}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} native calls) ---");
            self.stopped = true;
        }
    }

    fn on_native_error(&mut self, call: NativeCall, number: i32, message: &str) {
        eprintln!("  !!! {call} failed: {number} {message}");
    }

    fn on_proxy_created(&mut self, oop: Oop) {
        if self.stopped {
            return;
        }
        eprintln!("  +++ proxy {:#x}", oop.raw());
    }

    fn on_proxy_finalized(&mut self, oop: Oop) {
        if self.stopped {
            return;
        }
        eprintln!("  --- proxy {:#x}", oop.raw());
    }

    fn on_release_flush(&mut self, released: usize, revived: usize) {
        eprintln!("  >>> release {released} ({revived} revived)");
    }

    fn on_release_failed(&mut self, message: &str) {
        eprintln!("  !!! release failed: {message}");
    }
}

// ============================================================================
// ProfilingTracer: native call counts and proxy statistics
// ============================================================================

#[derive(Debug, Default)]
struct ProfilingState {
    call_counts: AHashMap<NativeCall, u64>,
    error_counts: AHashMap<NativeCall, u64>,
    proxies_created: u64,
    proxies_finalized: u64,
    flushes: u64,
    oops_released: u64,
    oops_revived: u64,
}

/// Tracer that collects session statistics for profiling.
///
/// Tracks per-entry-point native call and error counts, proxy churn, and how many oops the
/// deferred release protocol handed back. Retrieve results via [`ProfilingTracer::report`].
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ProfilingTracer {
    state: Rc<RefCell<ProfilingState>>,
}

/// Summary report from a profiling trace.
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-entry-point call counts, sorted by frequency (highest first).
    pub call_counts: Vec<(NativeCall, u64)>,
    /// Total native calls.
    pub total_calls: u64,
    /// Total native errors.
    pub total_errors: u64,
    pub proxies_created: u64,
    pub proxies_finalized: u64,
    /// Number of release flushes that reached the native layer or were skipped as empty.
    pub flushes: u64,
    pub oops_released: u64,
    pub oops_revived: u64,
}

impl ProfilingTracer {
    /// Creates a new profiling tracer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `call` was made so far.
    #[must_use]
    pub fn call_count(&self, call: NativeCall) -> u64 {
        self.state.borrow().call_counts.get(&call).copied().unwrap_or(0)
    }

    /// Generates a profiling report from the collected data.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let state = self.state.borrow();
        let mut call_counts: Vec<_> = state.call_counts.iter().map(|(&k, &v)| (k, v)).collect();
        call_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
        ProfilingReport {
            total_calls: call_counts.iter().map(|(_, n)| n).sum(),
            call_counts,
            total_errors: state.error_counts.values().sum(),
            proxies_created: state.proxies_created,
            proxies_finalized: state.proxies_finalized,
            flushes: state.flushes,
            oops_released: state.oops_released,
            oops_revived: state.oops_revived,
        }
    }
}

impl SessionTracer for ProfilingTracer {
    fn on_native_call(&mut self, call: NativeCall) {
        *self.state.borrow_mut().call_counts.entry(call).or_insert(0) += 1;
    }

    fn on_native_error(&mut self, call: NativeCall, _number: i32, _message: &str) {
        *self.state.borrow_mut().error_counts.entry(call).or_insert(0) += 1;
    }

    fn on_proxy_created(&mut self, _oop: Oop) {
        self.state.borrow_mut().proxies_created += 1;
    }

    fn on_proxy_finalized(&mut self, _oop: Oop) {
        self.state.borrow_mut().proxies_finalized += 1;
    }

    fn on_release_flush(&mut self, released: usize, revived: usize) {
        let mut state = self.state.borrow_mut();
        state.flushes += 1;
        state.oops_released += released as u64;
        state.oops_revived += revived as u64;
    }
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Session Profiling Report ===")?;
        writeln!(f, "Native calls:       {}", self.total_calls)?;
        writeln!(f, "Native errors:      {}", self.total_errors)?;
        writeln!(f, "Proxies created:    {}", self.proxies_created)?;
        writeln!(f, "Proxies finalized:  {}", self.proxies_finalized)?;
        writeln!(f, "Release flushes:    {}", self.flushes)?;
        writeln!(f, "Oops released:      {}", self.oops_released)?;
        writeln!(f, "Oops revived:       {}", self.oops_revived)?;
        writeln!(f)?;
        writeln!(f, "--- Native Call Frequency ---")?;
        for (call, count) in &self.call_counts {
            let pct = (*count as f64 / self.total_calls as f64) * 100.0;
            let name: &'static str = call.into();
            writeln!(f, "  {name:<20} {count:>10}  ({pct:>5.1}%)")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records every event.
///
/// Captures each trace event into a shared `Vec<TraceEvent>`; clones see the same buffer.
/// Allocates per event, so use it for debugging specific issues and in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a new recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::with_capacity(limit.min(1024)))),
            limit: Some(limit),
        }
    }

    /// Returns a copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    /// Returns the number of events recorded.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.borrow().len()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn record(&self, event: TraceEvent) {
        let mut events = self.events.borrow_mut();
        if self.limit.is_some_and(|l| events.len() >= l) {
            return;
        }
        events.push(event);
    }
}

impl SessionTracer for RecordingTracer {
    fn on_login(&mut self, transport: TransportKind, stone_name: &str, username: &str) {
        self.record(TraceEvent::Login {
            transport,
            stone_name: stone_name.to_owned(),
            username: username.to_owned(),
        });
    }

    fn on_login_warning(&mut self, message: &str) {
        self.record(TraceEvent::LoginWarning {
            message: message.to_owned(),
        });
    }

    fn on_logout(&mut self) {
        self.record(TraceEvent::Logout);
    }

    fn on_native_call(&mut self, call: NativeCall) {
        self.record(TraceEvent::NativeCall { call });
    }

    fn on_native_error(&mut self, call: NativeCall, number: i32, message: &str) {
        self.record(TraceEvent::NativeError {
            call,
            number,
            message: message.to_owned(),
        });
    }

    fn on_proxy_created(&mut self, oop: Oop) {
        self.record(TraceEvent::ProxyCreated { oop });
    }

    fn on_proxy_finalized(&mut self, oop: Oop) {
        self.record(TraceEvent::ProxyFinalized { oop });
    }

    fn on_release_flush(&mut self, released: usize, revived: usize) {
        self.record(TraceEvent::ReleaseFlush { released, revived });
    }

    fn on_release_failed(&mut self, message: &str) {
        self.record(TraceEvent::ReleaseFailed {
            message: message.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_clones_share_one_buffer() {
        let recorder = RecordingTracer::new();
        let mut handed_off: Box<dyn SessionTracer> = Box::new(recorder.clone());
        handed_off.on_native_call(NativeCall::Execute);
        handed_off.on_proxy_created(Oop::new(0x1000));
        assert_eq!(
            recorder.events(),
            vec![
                TraceEvent::NativeCall {
                    call: NativeCall::Execute
                },
                TraceEvent::ProxyCreated { oop: Oop::new(0x1000) },
            ]
        );
    }

    #[test]
    fn recording_limit_drops_later_events() {
        let mut recorder = RecordingTracer::with_limit(2);
        for _ in 0..5 {
            recorder.on_logout();
        }
        assert_eq!(recorder.event_count(), 2);
    }

    #[test]
    fn profiling_report_sorts_by_frequency() {
        let mut profiler = ProfilingTracer::new();
        profiler.on_native_call(NativeCall::FetchClass);
        profiler.on_native_call(NativeCall::Perform);
        profiler.on_native_call(NativeCall::Perform);
        profiler.on_native_error(NativeCall::Perform, 2010, "dnu");
        profiler.on_release_flush(3, 1);

        let report = profiler.report();
        assert_eq!(report.call_counts[0], (NativeCall::Perform, 2));
        assert_eq!(report.total_calls, 3);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.oops_released, 3);
        assert_eq!(report.oops_revived, 1);
        assert!(report.to_string().contains("Perform"));
    }
}

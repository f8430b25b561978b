//! An in-memory stone that implements both native interfaces.
//!
//! [`SimStone`] stands in for `libgcilnk` and `libgcits` in tests and demos. It keeps a small
//! object memory with the kernel classes at their well-known oops, understands a subset of
//! Smalltalk for `execute`, tracks the export set of every session, and records every entry
//! point called (by its C name, e.g. `"GciTsFetchBytes"`) so tests can count native calls.
//!
//! ```
//! use std::rc::Rc;
//! use gembridge::{HostValue, LoginParams, Session, sim::SimStone};
//!
//! let stone = SimStone::new();
//! let session = Session::builder()
//!     .login_rpc(Rc::new(stone.clone()), &LoginParams::new("DataCurator", "swordfish"))
//!     .unwrap();
//! let answer = session.execute("^6 * 7", None, None).unwrap();
//! assert_eq!(answer.to_host().unwrap(), HostValue::Int(42));
//! assert_eq!(stone.call_count("GciTsExecute"), 1);
//! ```
//!
//! Users `DataCurator` and `SystemUser` exist with password `swordfish`. The stone accepts
//! only encrypted passwords: encryption prefixes the text with `enc:`.

mod eval;
mod heap;

use std::{
    cell::RefCell,
    ffi::{CStr, c_void},
    ptr,
    rc::Rc,
};

use ahash::{AHashMap, AHashSet};

pub use heap::errors;
use heap::{Body, Heap, SimResult, oop_character};

use crate::{
    gci::{
        BoolType, GciErrSType, GciSession, GciSessionIdType, OOP_CLASS_STRING, OOP_CLASS_SYMBOL, OOP_CLASS_UTF8,
        OOP_ILLEGAL, OOP_NIL, OopType,
    },
    native::{LinkedGci, RpcGci, TsLogin},
    oop::Oop,
};

const ENCRYPTION_PREFIX: &str = "enc:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SessionKey {
    Linked,
    Rpc(usize),
}

#[derive(Debug, Default)]
struct SimSession {
    exports: AHashSet<OopType>,
}

/// Parameters of the most recent login attempt, as received by the stone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub stone_name: String,
    pub host_username: Option<String>,
    pub host_password: Option<String>,
    pub gem_service: String,
    pub username: String,
    pub password: String,
}

/// `GciSetNet` parameters waiting for the next linked login.
#[derive(Debug, Clone, Default)]
struct NetParams {
    stone_name: String,
    host_username: Option<String>,
    host_password: Option<String>,
    gem_service: String,
}

struct Failure {
    entry: &'static str,
    number: i32,
    message: String,
    fatal: bool,
}

struct StoneState {
    heap: Heap,
    users: AHashMap<String, String>,
    sessions: AHashMap<SessionKey, SimSession>,
    linked_session_id: GciSessionIdType,
    next_session_id: GciSessionIdType,
    next_handle: usize,
    net: NetParams,
    /// Pending error of the linked interface, read (and cleared) by `GciErr`.
    linked_error: Option<Box<GciErrSType>>,
    committed: Vec<(OopType, OopType)>,
    calls: Vec<&'static str>,
    failures: Vec<Failure>,
    release_batches: Vec<Vec<OopType>>,
    login_warning: Option<String>,
    last_login: Option<LoginRecord>,
}

impl StoneState {
    fn new() -> Self {
        let mut users = AHashMap::new();
        users.insert("DataCurator".to_owned(), "swordfish".to_owned());
        users.insert("SystemUser".to_owned(), "swordfish".to_owned());
        Self {
            heap: Heap::boot(),
            users,
            sessions: AHashMap::new(),
            linked_session_id: 0,
            next_session_id: 1,
            next_handle: 1,
            net: NetParams::default(),
            linked_error: None,
            committed: Vec::new(),
            calls: Vec::new(),
            failures: Vec::new(),
            release_batches: Vec::new(),
            login_warning: None,
            last_login: None,
        }
    }

    fn take_failure(&mut self, entry: &'static str) -> Option<Box<GciErrSType>> {
        let index = self.failures.iter().position(|f| f.entry == entry)?;
        let failure = self.failures.remove(index);
        let mut err = self.heap.error(failure.number, &failure.message);
        err.fatal = u8::from(failure.fatal);
        Some(err)
    }

    /// A fatal error ends the session it was reported on.
    fn end_if_fatal(&mut self, key: SessionKey, err: &GciErrSType) {
        if err.fatal == 0 {
            return;
        }
        self.sessions.remove(&key);
        if key == SessionKey::Linked {
            self.linked_session_id = 0;
        }
    }

    fn session(&mut self, key: SessionKey) -> SimResult<&mut SimSession> {
        self.sessions
            .get_mut(&key)
            .ok_or_else(|| self.heap.error(errors::INVALID_SESSION, "the session is not logged in"))
    }

    /// Adds `oop` to the session's export set and hands it out.
    fn export(&mut self, key: SessionKey, oop: OopType) -> SimResult<OopType> {
        if oop != OOP_ILLEGAL && !Oop::new(oop).is_special() {
            self.session(key)?.exports.insert(oop);
        }
        Ok(oop)
    }

    fn authenticate(&mut self, record: LoginRecord) -> SimResult<()> {
        let accepted = record
            .password
            .strip_prefix(ENCRYPTION_PREFIX)
            .is_some_and(|plain| self.users.get(&record.username).is_some_and(|pw| pw == plain));
        let username = record.username.clone();
        self.last_login = Some(record);
        if accepted {
            Ok(())
        } else {
            Err(self.heap.error(
                errors::LOGIN_DENIED,
                &format!("the userId/password combination is invalid or expired for {username}"),
            ))
        }
    }

    fn login_warning(&self) -> Option<Box<GciErrSType>> {
        self.login_warning
            .as_deref()
            .map(|message| Box::new(GciErrSType::new(0, message, "session initialization skipped")))
    }

    fn logout(&mut self, key: SessionKey) -> SimResult<()> {
        self.session(key)?;
        self.sessions.remove(&key);
        Ok(())
    }

    // =========================================================================
    // Operations shared by both interfaces
    // =========================================================================

    fn execute(&mut self, key: SessionKey, source: SourceArg<'_>, context: OopType) -> SimResult<OopType> {
        let text = match source {
            SourceArg::Text(text) => text_arg(text)?,
            SourceArg::Object(oop) => self.heap.text_of(oop).ok_or_else(|| {
                self.heap.error(errors::BAD_ARGUMENT, "source must be a String")
            })?,
        };
        let receiver = if context == OOP_ILLEGAL { OOP_NIL } else { context };
        let result = eval::evaluate(&mut self.heap, &text, receiver);
        self.export_result(key, result)
    }

    fn perform(&mut self, key: SessionKey, receiver: OopType, selector: SourceArg<'_>, args: &[OopType]) -> SimResult<OopType> {
        let selector = match selector {
            SourceArg::Text(text) => text_arg(text)?,
            SourceArg::Object(oop) => self
                .heap
                .text_of(oop)
                .filter(|_| self.heap.is_symbol(oop))
                .ok_or_else(|| self.heap.error(errors::BAD_ARGUMENT, "selector must be a Symbol"))?,
        };
        let result = self.heap.send(receiver, &selector, args);
        self.export_result(key, result)
    }

    /// Exports a successful result, or the exception and process of a failed one.
    fn export_result(&mut self, key: SessionKey, result: SimResult<OopType>) -> SimResult<OopType> {
        match result {
            Ok(oop) => self.export(key, oop),
            Err(err) => {
                self.export(key, err.context)?;
                self.export(key, err.exception_obj)?;
                Err(err)
            }
        }
    }

    fn resolve_symbol(&mut self, key: SessionKey, name: SourceArg<'_>) -> SimResult<OopType> {
        let name = match name {
            SourceArg::Text(text) => text_arg(text)?,
            SourceArg::Object(oop) => self
                .heap
                .text_of(oop)
                .ok_or_else(|| self.heap.error(errors::BAD_ARGUMENT, "name must be a String or Symbol"))?,
        };
        match self.heap.resolve(&name) {
            Some(oop) => self.export(key, oop),
            None => Err(self.heap.error(errors::UNDEFINED_SYMBOL, &format!("undefined symbol {name}"))),
        }
    }

    fn new_symbol(&mut self, key: SessionKey, text: &CStr) -> SimResult<OopType> {
        let symbol = self.heap.symbol(&text_arg(text)?);
        self.export(key, symbol)
    }

    fn fetch(&mut self, object: OopType, start_index: i64, buf: &mut [u8], utf8: bool) -> SimResult<usize> {
        let bytes = if utf8 {
            match oop_character(object) {
                Some(c) => c.to_string().into_bytes(),
                None => match self.heap.text_of(object) {
                    Some(text) => text.into_bytes(),
                    None => self.heap.byte_contents(object)?,
                },
            }
        } else {
            self.heap.byte_contents(object)?
        };
        let start = usize::try_from(start_index - 1)
            .map_err(|_| self.heap.error(errors::INDEX_OUT_OF_RANGE, &format!("start index {start_index}")))?;
        let available = bytes.get(start..).unwrap_or_default();
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        Ok(count)
    }

    /// UTF-8 fetch: anything that is not already UTF-8 (or plain ASCII) is transcoded
    /// through an intermediate Utf8 object exported to the caller.
    fn fetch_utf8(
        &mut self,
        key: SessionKey,
        object: OopType,
        start_index: i64,
        buf: &mut [u8],
        utf8_string: &mut OopType,
    ) -> SimResult<usize> {
        let count = self.fetch(object, start_index, buf, true)?;
        let class = self.heap.class_of(object)?;
        if !matches!(class, OOP_CLASS_UTF8 | OOP_CLASS_STRING | OOP_CLASS_SYMBOL) {
            let text = self.heap.text_of(object).unwrap_or_default();
            let intermediate = self.heap.alloc(OOP_CLASS_UTF8, Body::Text(text));
            *utf8_string = self.export(key, intermediate)?;
        }
        Ok(count)
    }

    fn new_utf8_string(&mut self, key: SessionKey, text: &CStr, convert: bool) -> SimResult<OopType> {
        let text = text_arg(text)?;
        let oop = if convert {
            self.heap.unicode_string(&text)
        } else {
            self.heap.alloc(OOP_CLASS_UTF8, Body::Text(text))
        };
        self.export(key, oop)
    }

    fn release(&mut self, key: SessionKey, oops: &[OopType]) -> SimResult<()> {
        let session = self.session(key)?;
        for oop in oops {
            session.exports.remove(oop);
        }
        self.release_batches.push(oops.to_vec());
        Ok(())
    }

    fn continue_with(
        &mut self,
        key: SessionKey,
        process: OopType,
        replace_top_of_stack: OopType,
        error: Option<&GciErrSType>,
    ) -> SimResult<OopType> {
        let top = self.heap.finish_process(process)?;
        if let Some(error) = error {
            return Err(Box::new(error.clone()));
        }
        let result = match (replace_top_of_stack, top) {
            (OOP_ILLEGAL, OOP_ILLEGAL) => OOP_NIL,
            (OOP_ILLEGAL, top) => top,
            (replacement, _) => replacement,
        };
        self.export(key, result)
    }

    fn commit(&mut self) {
        self.committed = self.heap.user_globals();
    }

    fn abort(&mut self) {
        let committed = self.committed.clone();
        self.heap.restore_user_globals(committed);
    }
}

#[derive(Clone, Copy)]
enum SourceArg<'a> {
    Text(&'a CStr),
    Object(OopType),
}

fn text_arg(text: &CStr) -> SimResult<String> {
    text.to_str().map(str::to_owned).map_err(|_| {
        Box::new(GciErrSType::new(errors::BAD_ARGUMENT, "argument is not valid UTF-8", ""))
    })
}

fn lossy(text: &CStr) -> String {
    text.to_string_lossy().into_owned()
}

/// Simulated stone; cloning shares the same stone.
#[derive(Clone)]
pub struct SimStone(Rc<RefCell<StoneState>>);

impl Default for SimStone {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimStone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("SimStone")
            .field("sessions", &state.sessions.len())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

impl SimStone {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(StoneState::new())))
    }

    /// Adds (or replaces) a user account.
    pub fn add_user(&self, username: &str, password: &str) {
        self.0
            .borrow_mut()
            .users
            .insert(username.to_owned(), password.to_owned());
    }

    /// Makes subsequent logins succeed with a warning carrying `message`.
    pub fn set_login_warning(&self, message: Option<&str>) {
        self.0.borrow_mut().login_warning = message.map(str::to_owned);
    }

    /// Makes the next call of `entry` (a C entry point name) fail with the given error.
    pub fn fail_next(&self, entry: &'static str, number: i32, message: &str) {
        self.0.borrow_mut().failures.push(Failure {
            entry,
            number,
            message: message.to_owned(),
            fatal: false,
        });
    }

    /// Like [`Self::fail_next`], but the error is fatal: the session calling `entry` is
    /// logged out by the stone.
    pub fn fail_next_fatal(&self, entry: &'static str, number: i32, message: &str) {
        self.0.borrow_mut().failures.push(Failure {
            entry,
            number,
            message: message.to_owned(),
            fatal: true,
        });
    }

    /// Every entry point called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.0.borrow().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, entry: &str) -> usize {
        self.0.borrow().calls.iter().filter(|&&call| call == entry).count()
    }

    pub fn clear_calls(&self) {
        self.0.borrow_mut().calls.clear();
    }

    /// The oop lists passed to each release call, in order.
    #[must_use]
    pub fn release_batches(&self) -> Vec<Vec<OopType>> {
        self.0.borrow().release_batches.clone()
    }

    /// Number of objects exported to all sessions combined.
    #[must_use]
    pub fn export_count(&self) -> usize {
        self.0.borrow().sessions.values().map(|s| s.exports.len()).sum()
    }

    /// True when some session still holds `oop` in its export set.
    #[must_use]
    pub fn is_exported(&self, oop: OopType) -> bool {
        self.0.borrow().sessions.values().any(|s| s.exports.contains(&oop))
    }

    /// Number of sessions currently logged in.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.0.borrow().sessions.len()
    }

    #[must_use]
    pub fn last_login(&self) -> Option<LoginRecord> {
        self.0.borrow().last_login.clone()
    }

    /// Linked entry point: checks injected failures and (except for the login itself) the
    /// linked session, runs `f`, and on failure stores the error for `GciErr` and returns
    /// `failed`.
    fn linked<T>(&self, entry: &'static str, failed: T, f: impl FnOnce(&mut StoneState) -> SimResult<T>) -> T {
        let mut state = self.0.borrow_mut();
        state.calls.push(entry);
        let result = match state.take_failure(entry) {
            Some(err) => {
                state.end_if_fatal(SessionKey::Linked, &err);
                Err(err)
            }
            None if entry == "GciLoginEx" => f(&mut state),
            None => state.session(SessionKey::Linked).map(drop).and_then(|()| f(&mut state)),
        };
        match result {
            Ok(value) => value,
            Err(err) => {
                state.linked_error = Some(err);
                failed
            }
        }
    }

    /// RPC entry point: like [`Self::linked`], but reports failures through `err`.
    fn rpc<T>(
        &self,
        entry: &'static str,
        session: GciSession,
        err: &mut GciErrSType,
        failed: T,
        f: impl FnOnce(&mut StoneState, SessionKey) -> SimResult<T>,
    ) -> T {
        let mut state = self.0.borrow_mut();
        state.calls.push(entry);
        let key = SessionKey::Rpc(session.addr());
        let result = match state.take_failure(entry) {
            Some(failure) => {
                state.end_if_fatal(key, &failure);
                Err(failure)
            }
            None => state.session(key).map(drop).and_then(|()| f(&mut state, key)),
        };
        match result {
            Ok(value) => value,
            Err(failure) => {
                *err = *failure;
                failed
            }
        }
    }
}

impl LinkedGci for SimStone {
    fn set_net(&self, stone_name: &CStr, host_username: Option<&CStr>, host_password: Option<&CStr>, gem_service: &CStr) {
        let mut state = self.0.borrow_mut();
        state.calls.push("GciSetNet");
        state.net = NetParams {
            stone_name: lossy(stone_name),
            host_username: host_username.map(lossy),
            host_password: host_password.map(lossy),
            gem_service: lossy(gem_service),
        };
    }

    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool {
        self.0.borrow_mut().calls.push("GciEncrypt");
        encrypt_into(password, out)
    }

    fn login_ex(&self, username: &CStr, password: &CStr, _login_flags: u32, _halt_on_error: i32) -> bool {
        self.linked("GciLoginEx", false, |state| {
            if state.sessions.contains_key(&SessionKey::Linked) {
                return Err(state.heap.error(errors::LOGIN_DENIED, "already logged in"));
            }
            let net = state.net.clone();
            state.authenticate(LoginRecord {
                stone_name: net.stone_name,
                host_username: net.host_username,
                host_password: net.host_password,
                gem_service: net.gem_service,
                username: lossy(username),
                password: lossy(password),
            })?;
            state.sessions.insert(SessionKey::Linked, SimSession::default());
            state.linked_session_id = state.next_session_id;
            state.next_session_id += 1;
            match state.login_warning() {
                Some(warning) => Err(warning),
                None => Ok(true),
            }
        })
    }

    fn get_session_id(&self) -> GciSessionIdType {
        let mut state = self.0.borrow_mut();
        state.calls.push("GciGetSessionId");
        if state.sessions.contains_key(&SessionKey::Linked) {
            state.linked_session_id
        } else {
            0
        }
    }

    fn logout(&self) {
        self.linked("GciLogout", (), |state| {
            state.logout(SessionKey::Linked)?;
            state.linked_session_id = 0;
            Ok(())
        });
    }

    fn err(&self, out: &mut GciErrSType) -> bool {
        let mut state = self.0.borrow_mut();
        state.calls.push("GciErr");
        match state.linked_error.take() {
            Some(err) => {
                *out = *err;
                true
            }
            None => false,
        }
    }

    fn begin(&self) {
        self.linked("GciBegin", (), |_| Ok(()));
    }

    fn abort(&self) {
        self.linked("GciAbort", (), |state| {
            state.abort();
            Ok(())
        });
    }

    fn commit(&self) -> bool {
        self.linked("GciCommit", false, |state| {
            state.commit();
            Ok(true)
        })
    }

    fn session_is_remote(&self) -> bool {
        self.linked("GciSessionIsRemote", false, |_| Ok(false))
    }

    fn release_oops(&self, oops: &[OopType]) {
        self.linked("GciReleaseOops", (), |state| state.release(SessionKey::Linked, oops));
    }

    fn is_kind_of(&self, object: OopType, class: OopType) -> bool {
        self.linked("GciIsKindOf", false, |state| {
            state.heap.is_kind_of(object, class)
        })
    }

    fn execute_str_from_context(&self, source: &CStr, context: OopType, _symbol_list: OopType) -> OopType {
        self.linked("GciExecuteStrFromContext", OOP_ILLEGAL, |state| {
            state.execute(SessionKey::Linked, SourceArg::Text(source), context)
        })
    }

    fn execute_from_context(&self, source: OopType, context: OopType, _symbol_list: OopType) -> OopType {
        self.linked("GciExecuteFromContext", OOP_ILLEGAL, |state| {
            state.execute(SessionKey::Linked, SourceArg::Object(source), context)
        })
    }

    fn perform(&self, receiver: OopType, selector: &CStr, args: &[OopType]) -> OopType {
        self.linked("GciPerform", OOP_ILLEGAL, |state| {
            state.perform(SessionKey::Linked, receiver, SourceArg::Text(selector), args)
        })
    }

    fn perform_sym_dbg(&self, receiver: OopType, selector: OopType, args: &[OopType], _flags: i32) -> OopType {
        self.linked("GciPerformSymDbg", OOP_ILLEGAL, |state| {
            state.perform(SessionKey::Linked, receiver, SourceArg::Object(selector), args)
        })
    }

    fn new_symbol(&self, text: &CStr) -> OopType {
        self.linked("GciNewSymbol", OOP_ILLEGAL, |state| state.new_symbol(SessionKey::Linked, text))
    }

    fn resolve_symbol(&self, name: &CStr, _symbol_list: OopType) -> OopType {
        self.linked("GciResolveSymbol", OOP_ILLEGAL, |state| {
            state.resolve_symbol(SessionKey::Linked, SourceArg::Text(name))
        })
    }

    fn resolve_symbol_obj(&self, name: OopType, _symbol_list: OopType) -> OopType {
        self.linked("GciResolveSymbolObj", OOP_ILLEGAL, |state| {
            state.resolve_symbol(SessionKey::Linked, SourceArg::Object(name))
        })
    }

    fn fetch_class(&self, object: OopType) -> OopType {
        self.linked("GciFetchClass", OOP_ILLEGAL, |state| {
            let class = state.heap.class_of(object)?;
            state.export(SessionKey::Linked, class)
        })
    }

    fn fetch_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8]) -> i64 {
        self.linked("GciFetchBytes_", -1, |state| {
            state.fetch(object, start_index, buf, false).map(count_i64)
        })
    }

    fn fetch_utf8_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8], utf8_string: &mut OopType, _flags: i32) -> i64 {
        self.linked("GciFetchUtf8Bytes_", -1, |state| {
            state
                .fetch_utf8(SessionKey::Linked, object, start_index, buf, utf8_string)
                .map(count_i64)
        })
    }

    fn oop_to_flt(&self, object: OopType) -> f64 {
        self.linked("GciOopToFlt", f64::NAN, |state| {
            state.heap.to_double(object)
        })
    }

    fn flt_to_oop(&self, value: f64) -> OopType {
        self.linked("GciFltToOop", OOP_ILLEGAL, |state| {
            let oop = state.heap.float(value);
            state.export(SessionKey::Linked, oop)
        })
    }

    fn new_utf8_string(&self, text: &CStr, convert_to_unicode: bool) -> OopType {
        self.linked("GciNewUtf8String", OOP_ILLEGAL, |state| {
            state.new_utf8_string(SessionKey::Linked, text, convert_to_unicode)
        })
    }

    fn continue_with(&self, process: OopType, replace_top_of_stack: OopType, _flags: i32, continue_with_error: Option<&GciErrSType>) -> OopType {
        self.linked("GciContinueWith", OOP_ILLEGAL, |state| {
            state.continue_with(SessionKey::Linked, process, replace_top_of_stack, continue_with_error)
        })
    }

    fn clear_stack(&self, process: OopType) {
        self.linked("GciClearStack", (), |state| {
            state.heap.finish_process(process).map(drop)
        });
    }
}

impl RpcGci for SimStone {
    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool {
        self.0.borrow_mut().calls.push("GciTsEncrypt");
        encrypt_into(password, out)
    }

    fn login(&self, login: &TsLogin<'_>, executed_session_init: &mut BoolType, err: &mut GciErrSType) -> GciSession {
        let mut state = self.0.borrow_mut();
        state.calls.push("GciTsLogin");
        let record = LoginRecord {
            stone_name: lossy(login.stone_name),
            host_username: login.host_username.map(lossy),
            host_password: login.host_password.map(lossy),
            gem_service: lossy(login.gem_service),
            username: lossy(login.username),
            password: login.password.map(lossy).unwrap_or_default(),
        };
        let authenticated = match state.take_failure("GciTsLogin") {
            Some(failure) => Err(failure),
            None => state.authenticate(record),
        };
        if let Err(failure) = authenticated {
            *err = *failure;
            return ptr::null_mut();
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.sessions.insert(SessionKey::Rpc(handle), SimSession::default());
        match state.login_warning() {
            Some(warning) => {
                *executed_session_init = 0;
                *err = *warning;
            }
            None => *executed_session_init = 1,
        }
        ptr::without_provenance_mut::<c_void>(handle)
    }

    fn logout(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        self.rpc("GciTsLogout", session, err, false, |state, key| {
            state.logout(key)?;
            Ok(true)
        })
    }

    fn session_is_remote(&self, session: GciSession) -> i32 {
        let mut state = self.0.borrow_mut();
        state.calls.push("GciTsSessionIsRemote");
        if state.sessions.contains_key(&SessionKey::Rpc(session.addr())) {
            1
        } else {
            -1
        }
    }

    fn execute(
        &self,
        session: GciSession,
        source_str: Option<&CStr>,
        source_oop: OopType,
        context: OopType,
        _symbol_list: OopType,
        _flags: i32,
        _environment_id: u16,
        err: &mut GciErrSType,
    ) -> OopType {
        self.rpc("GciTsExecute", session, err, OOP_ILLEGAL, |state, key| {
            let source = match source_str {
                Some(text) => SourceArg::Text(text),
                None => SourceArg::Object(source_oop),
            };
            state.execute(key, source, context)
        })
    }

    fn perform(
        &self,
        session: GciSession,
        receiver: OopType,
        selector_oop: OopType,
        selector_str: Option<&CStr>,
        args: &[OopType],
        _flags: i32,
        _environment_id: u16,
        err: &mut GciErrSType,
    ) -> OopType {
        self.rpc("GciTsPerform", session, err, OOP_ILLEGAL, |state, key| {
            let selector = match selector_str {
                Some(text) => SourceArg::Text(text),
                None => SourceArg::Object(selector_oop),
            };
            state.perform(key, receiver, selector, args)
        })
    }

    fn resolve_symbol(&self, session: GciSession, name: &CStr, _symbol_list: OopType, err: &mut GciErrSType) -> OopType {
        self.rpc("GciTsResolveSymbol", session, err, OOP_ILLEGAL, |state, key| {
            state.resolve_symbol(key, SourceArg::Text(name))
        })
    }

    fn resolve_symbol_obj(&self, session: GciSession, name: OopType, _symbol_list: OopType, err: &mut GciErrSType) -> OopType {
        self.rpc("GciTsResolveSymbolObj", session, err, OOP_ILLEGAL, |state, key| {
            state.resolve_symbol(key, SourceArg::Object(name))
        })
    }

    fn new_symbol(&self, session: GciSession, text: &CStr, err: &mut GciErrSType) -> OopType {
        self.rpc("GciTsNewSymbol", session, err, OOP_ILLEGAL, |state, key| state.new_symbol(key, text))
    }

    fn is_kind_of(&self, session: GciSession, object: OopType, class: OopType, err: &mut GciErrSType) -> i32 {
        self.rpc("GciTsIsKindOf", session, err, -1, |state, _| {
            state.heap.is_kind_of(object, class).map(i32::from)
        })
    }

    fn fetch_class(&self, session: GciSession, object: OopType, err: &mut GciErrSType) -> OopType {
        self.rpc("GciTsFetchClass", session, err, OOP_ILLEGAL, |state, key| {
            let class = state.heap.class_of(object)?;
            state.export(key, class)
        })
    }

    fn begin(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        self.rpc("GciTsBegin", session, err, false, |_, _| Ok(true))
    }

    fn abort(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        self.rpc("GciTsAbort", session, err, false, |state, _| {
            state.abort();
            Ok(true)
        })
    }

    fn commit(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        self.rpc("GciTsCommit", session, err, false, |state, _| {
            state.commit();
            Ok(true)
        })
    }

    fn oop_to_double(&self, session: GciSession, object: OopType, result: &mut f64, err: &mut GciErrSType) -> bool {
        self.rpc("GciTsOopToDouble", session, err, false, |state, _| {
            *result = state.heap.to_double(object)?;
            Ok(true)
        })
    }

    fn double_to_oop(&self, session: GciSession, value: f64, err: &mut GciErrSType) -> OopType {
        self.rpc("GciTsDoubleToOop", session, err, OOP_ILLEGAL, |state, key| {
            let oop = state.heap.float(value);
            state.export(key, oop)
        })
    }

    fn fetch_bytes(&self, session: GciSession, object: OopType, start_index: i64, buf: &mut [u8], err: &mut GciErrSType) -> i64 {
        self.rpc("GciTsFetchBytes", session, err, -1, |state, _| {
            state.fetch(object, start_index, buf, false).map(count_i64)
        })
    }

    fn fetch_utf8_bytes(
        &self,
        session: GciSession,
        object: OopType,
        start_index: i64,
        buf: &mut [u8],
        utf8_string: &mut OopType,
        err: &mut GciErrSType,
        _flags: i32,
    ) -> i64 {
        self.rpc("GciTsFetchUtf8Bytes", session, err, -1, |state, key| {
            state
                .fetch_utf8(key, object, start_index, buf, utf8_string)
                .map(count_i64)
        })
    }

    fn new_utf8_string(&self, session: GciSession, text: &CStr, convert_to_unicode: bool, err: &mut GciErrSType) -> OopType {
        self.rpc("GciTsNewUtf8String", session, err, OOP_ILLEGAL, |state, key| {
            state.new_utf8_string(key, text, convert_to_unicode)
        })
    }

    fn release_objs(&self, session: GciSession, oops: &[OopType], err: &mut GciErrSType) -> bool {
        self.rpc("GciTsReleaseObjs", session, err, false, |state, key| {
            state.release(key, oops)?;
            Ok(true)
        })
    }

    fn continue_with(
        &self,
        session: GciSession,
        process: OopType,
        replace_top_of_stack: OopType,
        continue_with_error: Option<&GciErrSType>,
        _flags: i32,
        err: &mut GciErrSType,
    ) -> OopType {
        self.rpc("GciTsContinueWith", session, err, OOP_ILLEGAL, |state, key| {
            state.continue_with(key, process, replace_top_of_stack, continue_with_error)
        })
    }

    fn clear_stack(&self, session: GciSession, process: OopType, err: &mut GciErrSType) -> bool {
        self.rpc("GciTsClearStack", session, err, false, |state, _| {
            state.heap.finish_process(process)?;
            Ok(true)
        })
    }
}

/// Writes `enc:<password>` and a NUL into `out`; false when it does not fit.
fn encrypt_into(password: &CStr, out: &mut [u8]) -> bool {
    let encrypted = format!("{ENCRYPTION_PREFIX}{}", password.to_string_lossy());
    let bytes = encrypted.as_bytes();
    if out.len() <= bytes.len() {
        return false;
    }
    out[..bytes.len()].copy_from_slice(bytes);
    out[bytes.len()] = 0;
    true
}

fn count_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

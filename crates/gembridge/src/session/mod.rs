//! Sessions: one authenticated connection to a stone, over either transport.
//!
//! A [`Session`] is a cheap-to-clone handle around a shared core. The core owns the transport
//! (linked or RPC), the proxy table, the session configuration and the tracer. Every
//! [`GemObject`] keeps its session core alive, so a session is only torn down (and logged out,
//! if still logged in) once the last session handle *and* the last proxy are gone.
//!
//! All operations validate the session before touching the native layer:
//! a linked session that is not the process's current session fails with
//! [`GemError::NotCurrentSession`], and any session that is not logged in fails with
//! [`GemError::InvalidSession`].

mod linked;
mod rpc;

use std::{
    borrow::Cow,
    cell::{Cell, RefCell},
    ffi::{CStr, CString},
    fmt,
    rc::Rc,
};

use ahash::AHashMap;
use smallvec::SmallVec;

pub use linked::linked_session_active;
use linked::LinkedTransport;
use rpc::RpcTransport;

use crate::{
    config::{ConnectionConfig, LoginParams, SessionConfig, TransportKind},
    error::{GemError, GemResult},
    gci::{
        GciErrSType, OOP_CLASS_DOUBLE_BYTE_SYMBOL, OOP_CLASS_QUAD_BYTE_SYMBOL, OOP_CLASS_SYMBOL, OopType,
    },
    marshal::CollectionClass,
    native::{
        LinkedGci, RpcGci,
        dynamic::{GciLnkLibrary, GciTsLibrary},
    },
    oop::Oop,
    proxy::{GemObject, ProxyTable},
    remote_error::RemoteError,
    tracer::{NativeCall, NoopTracer, SessionTracer},
    value::HostValue,
};

/// Passwords longer than this can not be encrypted.
const MAX_ENCRYPTED_PASSWORD_LEN: usize = 64 * 1024;

/// Native failure as reported by the library, before it is bound to a session.
pub(crate) type NativeResult<T> = Result<T, Box<GciErrSType>>;

/// A text argument or an existing remote object, at the native seam.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NativeName<'a> {
    Text(&'a CStr),
    Object(OopType),
}

/// Login arguments, already converted for the C interface.
pub(crate) struct LoginRequest {
    pub stone_name: CString,
    pub host_username: Option<CString>,
    /// Encrypted for RPC logins, plain for linked logins.
    pub host_password: Option<CString>,
    pub gem_service: CString,
    pub username: CString,
    /// Always encrypted.
    pub password: CString,
}

/// The uniform operation set both transports provide.
///
/// Each method performs one native call followed by that transport's error check. Failures
/// come back as the raw error record; [`Session`] binds them into a [`RemoteError`].
pub(crate) trait Transport {
    fn kind(&self) -> TransportKind;

    /// Takes whatever process-wide claim a login needs; false when someone else holds it.
    fn claim(&self) -> bool {
        true
    }

    /// Gives up the claim taken by [`Transport::claim`].
    fn release_claim(&self) {}

    /// True while this transport may issue calls on behalf of its session.
    fn is_current(&self) -> bool {
        true
    }

    /// Writes the encrypted form of `password` into `out`; false when `out` is too small.
    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool;

    /// Logs in. `Ok(Some(record))` is a login that succeeded with a warning.
    fn login(&self, request: &LoginRequest) -> NativeResult<Option<Box<GciErrSType>>>;
    fn logout(&self) -> NativeResult<()>;
    fn begin(&self) -> NativeResult<()>;
    fn abort(&self) -> NativeResult<()>;
    fn commit(&self) -> NativeResult<()>;
    /// `None` when the library no longer recognises the session.
    fn is_remote(&self) -> NativeResult<Option<bool>>;
    fn execute(
        &self,
        source: NativeName<'_>,
        context: Option<OopType>,
        symbol_list: Option<OopType>,
    ) -> NativeResult<OopType>;
    fn perform(&self, receiver: OopType, selector: NativeName<'_>, args: &[OopType]) -> NativeResult<OopType>;
    fn resolve_symbol(&self, name: NativeName<'_>, symbol_list: Option<OopType>) -> NativeResult<OopType>;
    fn new_symbol(&self, text: &CStr) -> NativeResult<OopType>;
    fn is_kind_of(&self, object: OopType, class: OopType) -> NativeResult<bool>;
    fn fetch_class(&self, object: OopType) -> NativeResult<OopType>;
    fn fetch_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8]) -> NativeResult<usize>;
    fn fetch_utf8_bytes(
        &self,
        object: OopType,
        start_index: i64,
        buf: &mut [u8],
        utf8_string: &mut OopType,
    ) -> NativeResult<usize>;
    fn oop_to_double(&self, object: OopType) -> NativeResult<f64>;
    fn double_to_oop(&self, value: f64) -> NativeResult<OopType>;
    fn new_utf8_string(&self, text: &CStr) -> NativeResult<OopType>;
    fn release(&self, oops: &[OopType]) -> NativeResult<()>;
    fn continue_with(
        &self,
        process: OopType,
        replace_top_of_stack: OopType,
        error: Option<&GciErrSType>,
    ) -> NativeResult<OopType>;
    fn clear_stack(&self, process: OopType) -> NativeResult<()>;
}

/// Lifecycle of a session. `LoggedOut` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Created,
    LoggedIn,
    LoggedOut,
}

/// Text or an existing remote object, for operations that accept either: the source of
/// [`Session::execute`], the selector of [`Session::perform`] and the name of
/// [`Session::resolve_symbol`].
#[derive(Debug, Clone, Copy)]
pub enum TextOrObject<'a> {
    Text(&'a str),
    Object(&'a GemObject),
}

impl<'a> From<&'a str> for TextOrObject<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for TextOrObject<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a GemObject> for TextOrObject<'a> {
    fn from(object: &'a GemObject) -> Self {
        Self::Object(object)
    }
}

/// Number of arguments a selector takes.
///
/// Keyword selectors take one per colon (`at:put:` takes 2), binary selectors made of
/// operator characters take 1 (`+`, `<=`, `->`), everything else is unary.
#[must_use]
pub fn selector_arity(selector: &str) -> usize {
    let colons = selector.bytes().filter(|&b| b == b':').count();
    if colons > 0 {
        colons
    } else if !selector.is_empty() && selector.chars().all(|c| "+-*/\\<>=~@%|&?,".contains(c)) {
        1
    } else {
        0
    }
}

pub(crate) fn c_string(text: &str, what: &str) -> GemResult<CString> {
    CString::new(text).map_err(|_| GemError::ProtocolViolation(format!("{what} contains a NUL byte: {text:?}")))
}

pub(crate) struct SessionCore {
    transport: Box<dyn Transport>,
    state: Cell<SessionState>,
    config: SessionConfig,
    pub(crate) proxies: ProxyTable,
    classes: RefCell<AHashMap<CollectionClass, Oop>>,
    tracer: RefCell<Box<dyn SessionTracer>>,
}

impl SessionCore {
    pub(crate) fn trace(&self, f: impl FnOnce(&mut dyn SessionTracer)) {
        f(self.tracer.borrow_mut().as_mut());
    }

    pub(crate) fn is_logged_in(&self) -> bool {
        self.state.get() == SessionState::LoggedIn && self.transport.is_current()
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        if !self.is_logged_in() {
            return;
        }
        let tracer = self.tracer.get_mut();
        tracer.on_native_call(NativeCall::Logout);
        match self.transport.logout() {
            Ok(()) => {
                self.state.set(SessionState::LoggedOut);
                self.transport.release_claim();
                tracer.on_logout();
            }
            Err(err) => tracer.on_native_error(NativeCall::Logout, err.number, &err.message_text()),
        }
    }
}

/// Configures and opens a [`Session`].
///
/// ```ignore
/// let session = Session::builder()
///     .config(SessionConfig::new().fetch_chunk_size(1024))
///     .tracer(StderrTracer::new())
///     .login_rpc(Rc::new(GciTsLibrary::load(path)?), &LoginParams::new("DataCurator", "swordfish"))?;
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    tracer: Option<Box<dyn SessionTracer>>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn tracer(mut self, tracer: impl SessionTracer + 'static) -> Self {
        self.tracer = Some(Box::new(tracer));
        self
    }

    /// Logs in through the linked library.
    ///
    /// Only one linked session may be logged in per process; a second attempt fails with
    /// [`GemError::SingletonViolation`] before any native call is made.
    pub fn login_linked(self, gci: Rc<dyn LinkedGci>, params: &LoginParams) -> GemResult<Session> {
        self.open(Box::new(LinkedTransport::new(gci)), params)
    }

    /// Logs in through the thread-safe (RPC) library. Any number of RPC sessions may coexist.
    pub fn login_rpc(self, gci: Rc<dyn RpcGci>, params: &LoginParams) -> GemResult<Session> {
        self.open(Box::new(RpcTransport::new(gci)), params)
    }

    /// Loads the library named by `connection` and logs in with its parameters.
    ///
    /// The connection's session section replaces any configuration set on the builder.
    pub fn connect(mut self, connection: &ConnectionConfig) -> GemResult<Session> {
        self.config = connection.session;
        match connection.transport {
            TransportKind::Linked => {
                let gci = Rc::new(GciLnkLibrary::load(&connection.library)?);
                self.login_linked(gci, &connection.login)
            }
            TransportKind::Rpc => {
                let gci = Rc::new(GciTsLibrary::load(&connection.library)?);
                self.login_rpc(gci, &connection.login)
            }
        }
    }

    fn open(self, transport: Box<dyn Transport>, params: &LoginParams) -> GemResult<Session> {
        let session = Session(Rc::new(SessionCore {
            transport,
            state: Cell::new(SessionState::Created),
            config: self.config,
            proxies: ProxyTable::default(),
            classes: RefCell::new(AHashMap::new()),
            tracer: RefCell::new(self.tracer.unwrap_or_else(|| Box::new(NoopTracer))),
        }));
        session.login(params)?;
        Ok(session)
    }
}

/// One authenticated connection to a stone.
///
/// Cloning the handle does not open a new connection.
#[derive(Clone)]
pub struct Session(pub(crate) Rc<SessionCore>);

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.0.transport.kind())
            .field("state", &self.0.state.get())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Session {}

impl Session {
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    // =========================================================================
    // Native call plumbing
    // =========================================================================

    /// Runs one native operation, tracing it and binding any failure to this session.
    ///
    /// A fatal error means the gem is gone: the session is marked logged out on the spot.
    pub(crate) fn native<T>(&self, call: NativeCall, f: impl FnOnce(&dyn Transport) -> NativeResult<T>) -> GemResult<T> {
        self.0.trace(|t| t.on_native_call(call));
        f(self.0.transport.as_ref()).map_err(|err| {
            self.0
                .trace(|t| t.on_native_error(call, err.number, &err.message_text()));
            if err.fatal != 0 && self.0.state.get() == SessionState::LoggedIn {
                self.end();
            }
            GemError::from(RemoteError::new(self.clone(), err))
        })
    }

    /// Fails unless the session may issue native calls right now.
    pub(crate) fn check_usable(&self) -> GemResult<()> {
        if !self.0.transport.is_current() {
            return Err(GemError::NotCurrentSession);
        }
        match self.0.state.get() {
            SessionState::LoggedIn => Ok(()),
            SessionState::Created | SessionState::LoggedOut => Err(GemError::InvalidSession),
        }
    }

    /// Returns the raw oop of `object`, rejecting proxies that belong to another session.
    pub(crate) fn own(&self, object: &GemObject) -> GemResult<OopType> {
        if object.belongs_to(self) {
            Ok(object.oop().raw())
        } else {
            Err(GemError::ProtocolViolation(format!(
                "{object} belongs to a different session"
            )))
        }
    }

    fn own_opt(&self, object: Option<&GemObject>) -> GemResult<Option<OopType>> {
        object.map(|o| self.own(o)).transpose()
    }

    fn native_name<'a>(&self, value: TextOrObject<'_>, text: &'a mut Option<CString>, what: &str) -> GemResult<NativeName<'a>> {
        match value {
            TextOrObject::Text(s) => Ok(NativeName::Text(text.insert(c_string(s, what)?))),
            TextOrObject::Object(object) => Ok(NativeName::Object(self.own(object)?)),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn login(&self, params: &LoginParams) -> GemResult<()> {
        let core = &self.0;
        let kind = core.transport.kind();
        if !core.transport.claim() {
            return Err(GemError::SingletonViolation);
        }
        let request = match self.login_request(params, kind) {
            Ok(request) => request,
            Err(err) => {
                core.transport.release_claim();
                return Err(err);
            }
        };
        match self.native(NativeCall::Login, |t| t.login(&request)) {
            Ok(warning) => {
                core.state.set(SessionState::LoggedIn);
                core.trace(|t| t.on_login(kind, &params.stone_name, &params.username));
                if let Some(record) = warning {
                    let message = format!(
                        "{}: {}, {}",
                        record.exception_obj,
                        record.message_text(),
                        record.reason_text()
                    )
                    .replace('\n', "");
                    core.trace(|t| t.on_login_warning(&message));
                }
                Ok(())
            }
            Err(err) => {
                core.transport.release_claim();
                Err(err)
            }
        }
    }

    fn login_request(&self, params: &LoginParams, kind: TransportKind) -> GemResult<LoginRequest> {
        let host_password = match (&params.host_password, kind) {
            (Some(password), TransportKind::Rpc) => Some(self.encrypt_password(password)?),
            (Some(password), TransportKind::Linked) => Some(c_string(password, "host password")?),
            (None, _) => None,
        };
        let gem_service = match kind {
            TransportKind::Linked => CString::default(),
            TransportKind::Rpc => c_string(&params.netldi_task, "NetLDI task")?,
        };
        Ok(LoginRequest {
            stone_name: c_string(&params.stone_name, "stone name")?,
            host_username: params
                .host_username
                .as_deref()
                .map(|name| c_string(name, "host username"))
                .transpose()?,
            host_password,
            gem_service,
            username: c_string(&params.username, "username")?,
            password: self.encrypt_password(&params.password)?,
        })
    }

    /// Encrypts a password, growing the output buffer by `fetch_chunk_size` until it fits.
    fn encrypt_password(&self, password: &str) -> GemResult<CString> {
        let plain = c_string(password, "password")?;
        let step = self.0.config.fetch_chunk_size.max(1);
        let mut size = 0;
        loop {
            size += step;
            if size > MAX_ENCRYPTED_PASSWORD_LEN {
                return Err(GemError::OutOfRange(format!(
                    "encrypted password does not fit in {MAX_ENCRYPTED_PASSWORD_LEN} bytes"
                )));
            }
            let mut out = vec![0u8; size];
            self.0.trace(|t| t.on_native_call(NativeCall::Encrypt));
            if self.0.transport.encrypt(&plain, &mut out) {
                let end = out.iter().position(|&b| b == 0).unwrap_or(out.len());
                out.truncate(end);
                return c_string(&String::from_utf8_lossy(&out), "encrypted password");
            }
        }
    }

    /// Logs out. The pending-release set is discarded: the remote export set goes away with
    /// the session.
    pub fn logout(&self) -> GemResult<()> {
        self.check_usable()?;
        self.native(NativeCall::Logout, |t| t.logout())?;
        self.end();
        Ok(())
    }

    /// Local side of a logout, also used when the stone ends the session.
    fn end(&self) {
        self.0.state.set(SessionState::LoggedOut);
        self.0.transport.release_claim();
        self.0.proxies.discard_pending();
        self.0.classes.borrow_mut().clear();
        self.0.trace(|t| t.on_logout());
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.0.state.get()
    }

    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.0.transport.kind()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.0.config
    }

    /// True while logged in and, for linked sessions, still the process's current session.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.0.is_logged_in()
    }

    /// True when this session may issue calls: always for RPC sessions, and for a linked
    /// session only while it holds the process-wide slot.
    #[must_use]
    pub fn is_current_session(&self) -> bool {
        self.0.transport.is_current()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn begin(&self) -> GemResult<()> {
        self.check_usable()?;
        self.native(NativeCall::Begin, |t| t.begin())
    }

    pub fn abort(&self) -> GemResult<()> {
        self.check_usable()?;
        self.native(NativeCall::Abort, |t| t.abort())
    }

    pub fn commit(&self) -> GemResult<()> {
        self.check_usable()?;
        self.native(NativeCall::Commit, |t| t.commit())
    }

    /// Whether the gem runs in a different process from this client.
    pub fn is_remote(&self) -> GemResult<bool> {
        self.check_usable()?;
        self.native(NativeCall::IsRemote, |t| t.is_remote())?
            .ok_or(GemError::InvalidSession)
    }

    // =========================================================================
    // Execution and message sends
    // =========================================================================

    /// Compiles and runs Smalltalk source, given as text or as a String object.
    ///
    /// `context` supplies `self` for the code; `symbol_list` overrides the user's symbol list.
    pub fn execute<'a>(
        &self,
        source: impl Into<TextOrObject<'a>>,
        context: Option<&GemObject>,
        symbol_list: Option<&GemObject>,
    ) -> GemResult<GemObject> {
        self.check_usable()?;
        let mut text = None;
        let source = self.native_name(source.into(), &mut text, "source")?;
        let context = self.own_opt(context)?;
        let symbol_list = self.own_opt(symbol_list)?;
        let oop = self.native(NativeCall::Execute, |t| t.execute(source, context, symbol_list))?;
        Ok(self.object(Oop::new(oop)))
    }

    /// Sends `selector` to `receiver`.
    ///
    /// The selector is text or a Symbol object. The number of `args` must match the selector
    /// ([`selector_arity`]), otherwise [`GemError::ArityMismatch`] is returned without
    /// contacting the stone.
    pub fn perform<'a>(
        &self,
        receiver: &GemObject,
        selector: impl Into<TextOrObject<'a>>,
        args: &[&GemObject],
    ) -> GemResult<GemObject> {
        self.check_usable()?;
        let selector = selector.into();
        let receiver = self.own(receiver)?;
        let arg_oops = args
            .iter()
            .map(|arg| self.own(arg))
            .collect::<GemResult<SmallVec<[OopType; 4]>>>()?;

        let selector_text: Cow<'_, str> = match selector {
            TextOrObject::Text(text) => Cow::Borrowed(text),
            TextOrObject::Object(symbol) => Cow::Owned(self.symbol_text(symbol)?),
        };
        let expected = selector_arity(&selector_text);
        if expected != args.len() {
            return Err(GemError::ArityMismatch {
                selector: selector_text.into_owned(),
                expected,
                given: args.len(),
            });
        }

        let mut text = None;
        let selector = self.native_name(selector, &mut text, "selector")?;
        let oop = self.native(NativeCall::Perform, |t| t.perform(receiver, selector, &arg_oops))?;
        Ok(self.object(Oop::new(oop)))
    }

    /// The text of a Symbol proxy, remembered on the proxy after the first lookup.
    fn symbol_text(&self, symbol: &GemObject) -> GemResult<String> {
        if let Some(text) = symbol.known_symbol_text() {
            return Ok(text.to_owned());
        }
        let class = self.fetch_class(symbol)?;
        if !matches!(
            class.raw(),
            OOP_CLASS_SYMBOL | OOP_CLASS_DOUBLE_BYTE_SYMBOL | OOP_CLASS_QUAD_BYTE_SYMBOL
        ) {
            return Err(GemError::ProtocolViolation(format!("selector {symbol} is not a Symbol")));
        }
        match self.to_host(symbol)? {
            HostValue::String(text) => {
                symbol.remember_symbol_text(&text);
                Ok(text)
            }
            other => Err(GemError::ProtocolViolation(format!(
                "Symbol {symbol} decoded as {}",
                other.type_name()
            ))),
        }
    }

    // =========================================================================
    // Symbols and classes
    // =========================================================================

    /// Looks a name up in the symbol list (the user's own when `symbol_list` is `None`).
    pub fn resolve_symbol<'a>(
        &self,
        name: impl Into<TextOrObject<'a>>,
        symbol_list: Option<&GemObject>,
    ) -> GemResult<GemObject> {
        self.check_usable()?;
        let mut text = None;
        let name = self.native_name(name.into(), &mut text, "symbol name")?;
        let symbol_list = self.own_opt(symbol_list)?;
        let oop = self.native(NativeCall::ResolveSymbol, |t| t.resolve_symbol(name, symbol_list))?;
        Ok(self.object(Oop::new(oop)))
    }

    /// Returns the canonical Symbol for `text`, creating it if needed.
    pub fn new_symbol(&self, text: &str) -> GemResult<GemObject> {
        self.check_usable()?;
        let c_text = c_string(text, "symbol")?;
        let oop = self.native(NativeCall::NewSymbol, |t| t.new_symbol(&c_text))?;
        let symbol = self.object(Oop::new(oop));
        symbol.remember_symbol_text(text);
        Ok(symbol)
    }

    pub fn is_kind_of(&self, object: &GemObject, class: &GemObject) -> GemResult<bool> {
        self.check_usable()?;
        let object = self.own(object)?;
        let class = self.own(class)?;
        self.native(NativeCall::IsKindOf, |t| t.is_kind_of(object, class))
    }

    pub fn class_of(&self, object: &GemObject) -> GemResult<GemObject> {
        let oop = self.fetch_class(object)?;
        Ok(self.object(oop))
    }

    pub(crate) fn fetch_class(&self, object: &GemObject) -> GemResult<Oop> {
        self.check_usable()?;
        let object = self.own(object)?;
        let class = self.native(NativeCall::FetchClass, |t| t.fetch_class(object))?;
        Ok(Oop::new(class))
    }

    pub(crate) fn is_symbol(&self, object: &GemObject) -> GemResult<bool> {
        let symbol_class = self.object(Oop::new(OOP_CLASS_SYMBOL));
        self.is_kind_of(object, &symbol_class)
    }

    /// The class object named by `class`, resolved once per login.
    pub(crate) fn collection_class(&self, class: CollectionClass) -> GemResult<Oop> {
        if let Some(&oop) = self.0.classes.borrow().get(&class) {
            return Ok(oop);
        }
        let name: &'static str = class.into();
        let resolved = self.resolve_symbol(name, None)?.oop();
        self.0.classes.borrow_mut().insert(class, resolved);
        Ok(resolved)
    }

    // =========================================================================
    // Debugging support (used by RemoteError)
    // =========================================================================

    pub(crate) fn continue_with(
        &self,
        process: OopType,
        replace_top_of_stack: OopType,
        error: Option<&GciErrSType>,
    ) -> GemResult<GemObject> {
        self.check_usable()?;
        let oop = self.native(NativeCall::ContinueWith, |t| {
            t.continue_with(process, replace_top_of_stack, error)
        })?;
        Ok(self.object(Oop::new(oop)))
    }

    pub(crate) fn clear_stack(&self, process: OopType) -> GemResult<()> {
        self.check_usable()?;
        self.native(NativeCall::ClearStack, |t| t.clear_stack(process))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_follows_selector_shape() {
        assert_eq!(selector_arity("size"), 0);
        assert_eq!(selector_arity("yourself"), 0);
        assert_eq!(selector_arity("add:"), 1);
        assert_eq!(selector_arity("at:put:"), 2);
        assert_eq!(selector_arity("+"), 1);
        assert_eq!(selector_arity("<="), 1);
        assert_eq!(selector_arity("->"), 1);
        assert_eq!(selector_arity(""), 0);
    }

    #[test]
    fn nul_bytes_are_rejected_before_the_native_layer() {
        assert!(matches!(c_string("a\0b", "source"), Err(GemError::ProtocolViolation(_))));
        assert_eq!(c_string("abc", "source").unwrap().as_bytes(), b"abc");
    }
}

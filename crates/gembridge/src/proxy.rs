//! Proxies for remote objects, the per-session identity cache, and deferred release.
//!
//! Every remote object a session hands out is wrapped in a [`GemObject`]. For a given session
//! and oop there is at most one live proxy: the session's proxy table maps oops to weak
//! references, so asking for the same oop twice while a proxy is held returns the same proxy.
//!
//! The stone keeps every object it exported to this session alive until told otherwise. When
//! the last handle of a proxy is dropped its oop goes into a pending-release set, which is
//! reported to the stone in one batch: explicitly via [`Session::flush_releases`], or
//! automatically once the set grows past the configured batch size. Oops that got a new proxy
//! between finalization and the flush are left out of the batch.

use std::{
    cell::{OnceCell, RefCell},
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

use ahash::AHashMap;
use indexmap::IndexSet;

use crate::{
    error::GemResult,
    oop::Oop,
    session::{Session, SessionCore, TextOrObject},
    tracer::NativeCall,
    value::HostValue,
};

pub(crate) struct ProxyInner {
    oop: Oop,
    session: Rc<SessionCore>,
    /// Text of a Symbol, once known.
    symbol_text: OnceCell<String>,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        Session(Rc::clone(&self.session)).proxy_finalized(self.oop);
    }
}

/// A local handle on one object inside the stone.
///
/// Clones are the same proxy: `==` compares identity, and two handles are equal exactly when
/// they came from the same session for the same oop while a handle was continuously held.
#[derive(Clone)]
pub struct GemObject(Rc<ProxyInner>);

impl GemObject {
    #[must_use]
    pub fn oop(&self) -> Oop {
        self.0.oop
    }

    /// The session this proxy belongs to.
    #[must_use]
    pub fn session(&self) -> Session {
        Session(Rc::clone(&self.0.session))
    }

    /// True when both handles are the same proxy.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.oop.is_nil()
    }

    pub fn is_symbol(&self) -> GemResult<bool> {
        self.session().is_symbol(self)
    }

    pub fn gemstone_class(&self) -> GemResult<Self> {
        self.session().class_of(self)
    }

    pub fn is_kind_of(&self, class: &Self) -> GemResult<bool> {
        self.session().is_kind_of(self, class)
    }

    /// Sends `selector` to this object; see [`Session::perform`].
    pub fn perform<'a>(&self, selector: impl Into<TextOrObject<'a>>, args: &[&Self]) -> GemResult<Self> {
        self.session().perform(self, selector, args)
    }

    /// Converts this object to a host value; see [`Session::to_host`].
    pub fn to_host(&self) -> GemResult<HostValue> {
        self.session().to_host(self)
    }

    pub(crate) fn belongs_to(&self, session: &Session) -> bool {
        Rc::ptr_eq(&self.0.session, &session.0)
    }

    pub(crate) fn known_symbol_text(&self) -> Option<&str> {
        self.0.symbol_text.get().map(String::as_str)
    }

    pub(crate) fn remember_symbol_text(&self, text: &str) {
        let _ = self.0.symbol_text.set(text.to_owned());
    }
}

impl PartialEq for GemObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for GemObject {}

impl Hash for GemObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.oop.hash(state);
    }
}

impl fmt::Debug for GemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GemObject({:#x})", self.0.oop.raw())
    }
}

impl fmt::Display for GemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<GemObject with oop {}>", self.0.oop)
    }
}

/// Identity cache and pending-release set of one session.
#[derive(Default)]
pub(crate) struct ProxyTable {
    live: RefCell<AHashMap<Oop, Weak<ProxyInner>>>,
    pending: RefCell<IndexSet<Oop, ahash::RandomState>>,
}

impl ProxyTable {
    fn lookup(&self, oop: Oop) -> Option<Rc<ProxyInner>> {
        self.live.borrow().get(&oop).and_then(Weak::upgrade)
    }

    fn is_live(&self, oop: Oop) -> bool {
        self.live
            .borrow()
            .get(&oop)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Drops the cache entry for `oop` unless a live proxy took its place.
    fn prune(&self, oop: Oop) {
        let mut live = self.live.borrow_mut();
        if live.get(&oop).is_some_and(|weak| weak.strong_count() == 0) {
            live.remove(&oop);
        }
    }

    /// Adds `oop` to the pending set and returns the new size.
    fn enqueue(&self, oop: Oop) -> usize {
        let mut pending = self.pending.borrow_mut();
        pending.insert(oop);
        pending.len()
    }

    pub(crate) fn discard_pending(&self) {
        self.pending.borrow_mut().clear();
    }

    fn live_count(&self) -> usize {
        self.live.borrow().values().filter(|weak| weak.strong_count() > 0).count()
    }
}

impl Session {
    /// The proxy for `oop`: the live one if this session already has it, otherwise a new one.
    ///
    /// No native call is made; `oop` is trusted to be valid for this session.
    #[must_use]
    pub fn object(&self, oop: Oop) -> GemObject {
        let core = &self.0;
        if let Some(inner) = core.proxies.lookup(oop) {
            return GemObject(inner);
        }
        let inner = Rc::new(ProxyInner {
            oop,
            session: Rc::clone(core),
            symbol_text: OnceCell::new(),
        });
        core.proxies.live.borrow_mut().insert(oop, Rc::downgrade(&inner));
        core.trace(|t| t.on_proxy_created(oop));
        GemObject(inner)
    }

    /// Reports every finalized oop that has no live proxy to the stone in one native call.
    ///
    /// The pending set is emptied whether or not the call succeeds. Nothing is sent when no
    /// oop qualifies.
    pub fn flush_releases(&self) -> GemResult<()> {
        self.check_usable()?;
        let pending = self.0.proxies.pending.take();
        if pending.is_empty() {
            return Ok(());
        }
        let (revived, dead): (Vec<Oop>, Vec<Oop>) = pending.into_iter().partition(|&oop| self.0.proxies.is_live(oop));
        self.0.trace(|t| t.on_release_flush(dead.len(), revived.len()));
        if dead.is_empty() {
            return Ok(());
        }
        let raw: Vec<_> = dead.into_iter().map(Oop::raw).collect();
        self.native(NativeCall::ReleaseObjs, |t| t.release(&raw))
    }

    /// Number of proxies currently held anywhere.
    #[must_use]
    pub fn live_proxy_count(&self) -> usize {
        self.0.proxies.live_count()
    }

    /// Number of finalized oops waiting to be released.
    #[must_use]
    pub fn pending_release_count(&self) -> usize {
        self.0.proxies.pending.borrow().len()
    }

    /// Finalization hook of [`ProxyInner`].
    fn proxy_finalized(&self, oop: Oop) {
        let core = &self.0;
        core.proxies.prune(oop);
        core.trace(|t| t.on_proxy_finalized(oop));
        if !core.is_logged_in() || oop.is_special() {
            return;
        }
        if core.proxies.enqueue(oop) > core.config().release_batch_size
            && let Err(err) = self.flush_releases()
        {
            let message = err.to_string();
            core.trace(|t| t.on_release_failed(&message));
        }
    }
}

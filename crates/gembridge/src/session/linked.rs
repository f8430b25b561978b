//! Transport over the linked library (`libgcilnk`).
//!
//! The linked library keeps one implicit session per process, so at most one linked
//! [`Session`](super::Session) may be logged in at a time. That is enforced with a single
//! process-wide slot: login claims it with a compare-and-swap before any native call, and
//! logout (or dropping the transport) gives it back. Every call is followed by `GciErr`.

use std::{
    cell::Cell,
    ffi::CStr,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use super::{LoginRequest, NativeName, NativeResult, Transport};
use crate::{
    config::TransportKind,
    gci::{
        GCI_INVALID_SESSION_ID, GCI_LOGIN_PW_ENCRYPTED, GCI_LOGIN_QUIET, GciErrSType, GciSessionIdType, OOP_NIL,
        OOP_NO_CONTEXT, OopType,
    },
    native::LinkedGci,
};

/// Token of the linked transport that currently holds the process's linked session; 0 if none.
static CURRENT_LINKED: AtomicU64 = AtomicU64::new(0);
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// True while some linked session in this process is logged in.
#[must_use]
pub fn linked_session_active() -> bool {
    CURRENT_LINKED.load(Ordering::SeqCst) != 0
}

pub(crate) struct LinkedTransport {
    gci: Rc<dyn LinkedGci>,
    token: u64,
    session_id: Cell<GciSessionIdType>,
}

impl LinkedTransport {
    pub(crate) fn new(gci: Rc<dyn LinkedGci>) -> Self {
        Self {
            gci,
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            session_id: Cell::new(GCI_INVALID_SESSION_ID),
        }
    }

    /// `GciErr`: turns a pending error into a failure.
    fn checked<T>(&self, value: T) -> NativeResult<T> {
        let mut err = GciErrSType::default();
        if self.gci.err(&mut err) {
            Err(Box::new(err))
        } else {
            Ok(value)
        }
    }

    fn fetch_count(&self, count: i64) -> NativeResult<usize> {
        let count = self.checked(count)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl Drop for LinkedTransport {
    fn drop(&mut self) {
        self.release_claim();
    }
}

impl Transport for LinkedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Linked
    }

    fn claim(&self) -> bool {
        CURRENT_LINKED
            .compare_exchange(0, self.token, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release_claim(&self) {
        // fails harmlessly when another transport holds the slot
        let _ = CURRENT_LINKED.compare_exchange(self.token, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn is_current(&self) -> bool {
        CURRENT_LINKED.load(Ordering::SeqCst) == self.token
    }

    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool {
        self.gci.encrypt(password, out)
    }

    fn login(&self, request: &LoginRequest) -> NativeResult<Option<Box<GciErrSType>>> {
        self.gci.set_net(
            &request.stone_name,
            request.host_username.as_deref(),
            request.host_password.as_deref(),
            &request.gem_service,
        );
        let clean = self.gci.login_ex(
            &request.username,
            &request.password,
            GCI_LOGIN_PW_ENCRYPTED | GCI_LOGIN_QUIET,
            0,
        );
        let session_id = self.gci.get_session_id();
        let mut err = GciErrSType::default();
        let reported = self.gci.err(&mut err);
        if session_id == GCI_INVALID_SESSION_ID {
            return Err(Box::new(err));
        }
        self.session_id.set(session_id);
        if clean && !reported {
            Ok(None)
        } else {
            Ok(Some(Box::new(err)))
        }
    }

    fn logout(&self) -> NativeResult<()> {
        self.gci.logout();
        self.checked(())?;
        self.session_id.set(GCI_INVALID_SESSION_ID);
        Ok(())
    }

    fn begin(&self) -> NativeResult<()> {
        self.gci.begin();
        self.checked(())
    }

    fn abort(&self) -> NativeResult<()> {
        self.gci.abort();
        self.checked(())
    }

    fn commit(&self) -> NativeResult<()> {
        let committed = self.gci.commit();
        self.checked(())?;
        if committed {
            Ok(())
        } else {
            Err(Box::new(GciErrSType::new(0, "commit failed without an error report", "")))
        }
    }

    fn is_remote(&self) -> NativeResult<Option<bool>> {
        let remote = self.gci.session_is_remote();
        self.checked(Some(remote))
    }

    fn execute(&self, source: NativeName<'_>, context: Option<OopType>, symbol_list: Option<OopType>) -> NativeResult<OopType> {
        let context = context.unwrap_or(OOP_NO_CONTEXT);
        let symbol_list = symbol_list.unwrap_or(OOP_NIL);
        let result = match source {
            NativeName::Text(text) => self.gci.execute_str_from_context(text, context, symbol_list),
            NativeName::Object(source) => self.gci.execute_from_context(source, context, symbol_list),
        };
        self.checked(result)
    }

    fn perform(&self, receiver: OopType, selector: NativeName<'_>, args: &[OopType]) -> NativeResult<OopType> {
        let result = match selector {
            NativeName::Text(text) => self.gci.perform(receiver, text, args),
            NativeName::Object(symbol) => self.gci.perform_sym_dbg(receiver, symbol, args, 0),
        };
        self.checked(result)
    }

    fn resolve_symbol(&self, name: NativeName<'_>, symbol_list: Option<OopType>) -> NativeResult<OopType> {
        let symbol_list = symbol_list.unwrap_or(OOP_NIL);
        let result = match name {
            NativeName::Text(text) => self.gci.resolve_symbol(text, symbol_list),
            NativeName::Object(symbol) => self.gci.resolve_symbol_obj(symbol, symbol_list),
        };
        self.checked(result)
    }

    fn new_symbol(&self, text: &CStr) -> NativeResult<OopType> {
        let result = self.gci.new_symbol(text);
        self.checked(result)
    }

    fn is_kind_of(&self, object: OopType, class: OopType) -> NativeResult<bool> {
        let result = self.gci.is_kind_of(object, class);
        self.checked(result)
    }

    fn fetch_class(&self, object: OopType) -> NativeResult<OopType> {
        let result = self.gci.fetch_class(object);
        self.checked(result)
    }

    fn fetch_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8]) -> NativeResult<usize> {
        let count = self.gci.fetch_bytes(object, start_index, buf);
        self.fetch_count(count)
    }

    fn fetch_utf8_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8], utf8_string: &mut OopType) -> NativeResult<usize> {
        let count = self.gci.fetch_utf8_bytes(object, start_index, buf, utf8_string, 0);
        self.fetch_count(count)
    }

    fn oop_to_double(&self, object: OopType) -> NativeResult<f64> {
        let result = self.gci.oop_to_flt(object);
        self.checked(result)
    }

    fn double_to_oop(&self, value: f64) -> NativeResult<OopType> {
        let result = self.gci.flt_to_oop(value);
        self.checked(result)
    }

    fn new_utf8_string(&self, text: &CStr) -> NativeResult<OopType> {
        let result = self.gci.new_utf8_string(text, true);
        self.checked(result)
    }

    fn release(&self, oops: &[OopType]) -> NativeResult<()> {
        self.gci.release_oops(oops);
        self.checked(())
    }

    fn continue_with(&self, process: OopType, replace_top_of_stack: OopType, error: Option<&GciErrSType>) -> NativeResult<OopType> {
        let result = self.gci.continue_with(process, replace_top_of_stack, 0, error);
        self.checked(result)
    }

    fn clear_stack(&self, process: OopType) -> NativeResult<()> {
        self.gci.clear_stack(process);
        self.checked(())
    }
}

//! Transport over the thread-safe library (`libgcits`).
//!
//! Each call carries the session handle and an error record; a sentinel return value
//! (`OOP_ILLEGAL`, `false`, `-1`) or a populated record means the call failed.

use std::{cell::Cell, ffi::CStr, ptr, rc::Rc};

use super::{LoginRequest, NativeName, NativeResult, Transport};
use crate::{
    config::TransportKind,
    gci::{
        BoolType, GCI_LOGIN_PW_ENCRYPTED, GCI_LOGIN_QUIET, GCI_PERFORM_FLAG_ENABLE_DEBUG, GciErrSType, GciSession,
        OOP_CLASS_UTF8, OOP_ILLEGAL, OOP_NIL, OopType,
    },
    native::{RpcGci, TsLogin},
};

pub(crate) struct RpcTransport {
    gci: Rc<dyn RpcGci>,
    handle: Cell<GciSession>,
}

impl RpcTransport {
    pub(crate) fn new(gci: Rc<dyn RpcGci>) -> Self {
        Self {
            gci,
            handle: Cell::new(ptr::null_mut()),
        }
    }

    fn handle(&self) -> GciSession {
        self.handle.get()
    }

    /// Runs `f` with a fresh error record; `failed` decides from the return value whether
    /// the call reported a failure.
    fn call<T>(&self, f: impl FnOnce(&mut GciErrSType) -> T, failed: impl FnOnce(&T) -> bool) -> NativeResult<T> {
        let mut err = GciErrSType::default();
        let result = f(&mut err);
        if failed(&result) || err.is_set() {
            Err(Box::new(err))
        } else {
            Ok(result)
        }
    }

    fn call_oop(&self, f: impl FnOnce(&mut GciErrSType) -> OopType) -> NativeResult<OopType> {
        self.call(f, |&oop| oop == OOP_ILLEGAL)
    }

    fn call_bool(&self, f: impl FnOnce(&mut GciErrSType) -> bool) -> NativeResult<()> {
        self.call(f, |&ok| !ok).map(drop)
    }

    fn call_count(&self, f: impl FnOnce(&mut GciErrSType) -> i64) -> NativeResult<usize> {
        let count = self.call(f, |&count| count < 0)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl Transport for RpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rpc
    }

    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool {
        self.gci.encrypt(password, out)
    }

    fn login(&self, request: &LoginRequest) -> NativeResult<Option<Box<GciErrSType>>> {
        let login = TsLogin {
            stone_name: &request.stone_name,
            host_username: request.host_username.as_deref(),
            host_password: request.host_password.as_deref(),
            host_password_is_encrypted: true,
            gem_service: &request.gem_service,
            username: &request.username,
            password: Some(&request.password),
            login_flags: GCI_LOGIN_PW_ENCRYPTED | GCI_LOGIN_QUIET,
            halt_on_error: 0,
        };
        let mut executed_session_init: BoolType = 0;
        let mut err = GciErrSType::default();
        let handle = self.gci.login(&login, &mut executed_session_init, &mut err);
        if handle.is_null() {
            return Err(Box::new(err));
        }
        self.handle.set(handle);
        if executed_session_init == 0 {
            Ok(Some(Box::new(err)))
        } else {
            Ok(None)
        }
    }

    fn logout(&self) -> NativeResult<()> {
        self.call_bool(|err| self.gci.logout(self.handle(), err))?;
        self.handle.set(ptr::null_mut());
        Ok(())
    }

    fn begin(&self) -> NativeResult<()> {
        self.call_bool(|err| self.gci.begin(self.handle(), err))
    }

    fn abort(&self) -> NativeResult<()> {
        self.call_bool(|err| self.gci.abort(self.handle(), err))
    }

    fn commit(&self) -> NativeResult<()> {
        self.call_bool(|err| self.gci.commit(self.handle(), err))
    }

    fn is_remote(&self) -> NativeResult<Option<bool>> {
        match self.gci.session_is_remote(self.handle()) {
            -1 => Ok(None),
            remote => Ok(Some(remote != 0)),
        }
    }

    fn execute(&self, source: NativeName<'_>, context: Option<OopType>, symbol_list: Option<OopType>) -> NativeResult<OopType> {
        let (source_str, source_oop) = match source {
            NativeName::Text(text) => (Some(text), OOP_CLASS_UTF8),
            NativeName::Object(source) => (None, source),
        };
        let context = context.unwrap_or(OOP_NIL);
        let symbol_list = symbol_list.unwrap_or(OOP_NIL);
        self.call_oop(|err| {
            self.gci
                .execute(self.handle(), source_str, source_oop, context, symbol_list, 0, 0, err)
        })
    }

    fn perform(&self, receiver: OopType, selector: NativeName<'_>, args: &[OopType]) -> NativeResult<OopType> {
        let (selector_oop, selector_str) = match selector {
            NativeName::Text(text) => (OOP_ILLEGAL, Some(text)),
            NativeName::Object(symbol) => (symbol, None),
        };
        self.call_oop(|err| {
            self.gci.perform(
                self.handle(),
                receiver,
                selector_oop,
                selector_str,
                args,
                GCI_PERFORM_FLAG_ENABLE_DEBUG,
                0,
                err,
            )
        })
    }

    fn resolve_symbol(&self, name: NativeName<'_>, symbol_list: Option<OopType>) -> NativeResult<OopType> {
        let symbol_list = symbol_list.unwrap_or(OOP_NIL);
        self.call_oop(|err| match name {
            NativeName::Text(text) => self.gci.resolve_symbol(self.handle(), text, symbol_list, err),
            NativeName::Object(symbol) => self.gci.resolve_symbol_obj(self.handle(), symbol, symbol_list, err),
        })
    }

    fn new_symbol(&self, text: &CStr) -> NativeResult<OopType> {
        self.call_oop(|err| self.gci.new_symbol(self.handle(), text, err))
    }

    fn is_kind_of(&self, object: OopType, class: OopType) -> NativeResult<bool> {
        let result = self.call(|err| self.gci.is_kind_of(self.handle(), object, class, err), |&r| r < 0)?;
        Ok(result != 0)
    }

    fn fetch_class(&self, object: OopType) -> NativeResult<OopType> {
        self.call_oop(|err| self.gci.fetch_class(self.handle(), object, err))
    }

    fn fetch_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8]) -> NativeResult<usize> {
        self.call_count(|err| self.gci.fetch_bytes(self.handle(), object, start_index, buf, err))
    }

    fn fetch_utf8_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8], utf8_string: &mut OopType) -> NativeResult<usize> {
        self.call_count(|err| {
            self.gci
                .fetch_utf8_bytes(self.handle(), object, start_index, buf, utf8_string, err, 0)
        })
    }

    fn oop_to_double(&self, object: OopType) -> NativeResult<f64> {
        let mut value = 0.0;
        self.call_bool(|err| self.gci.oop_to_double(self.handle(), object, &mut value, err))?;
        Ok(value)
    }

    fn double_to_oop(&self, value: f64) -> NativeResult<OopType> {
        self.call_oop(|err| self.gci.double_to_oop(self.handle(), value, err))
    }

    fn new_utf8_string(&self, text: &CStr) -> NativeResult<OopType> {
        self.call_oop(|err| self.gci.new_utf8_string(self.handle(), text, true, err))
    }

    fn release(&self, oops: &[OopType]) -> NativeResult<()> {
        self.call_bool(|err| self.gci.release_objs(self.handle(), oops, err))
    }

    fn continue_with(&self, process: OopType, replace_top_of_stack: OopType, error: Option<&GciErrSType>) -> NativeResult<OopType> {
        self.call_oop(|err| {
            self.gci
                .continue_with(self.handle(), process, replace_top_of_stack, error, 0, err)
        })
    }

    fn clear_stack(&self, process: OopType) -> NativeResult<()> {
        self.call_bool(|err| self.gci.clear_stack(self.handle(), process, err))
    }
}

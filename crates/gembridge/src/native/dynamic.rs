//! Bindings to the GemStone shared libraries, resolved at runtime with `libloading`.
//!
//! The libraries are versioned (`libgcilnk-3.7.0-64.so`, `libgcits-3.7.0-64.so`, ...) and are
//! located by the caller; picking the right file for an installation is not done here.

use std::{
    ffi::{CStr, OsStr, c_char, c_double, c_int, c_uint},
    ptr,
};

use libloading::Library;

use super::{LinkedGci, RpcGci, TsLogin};
use crate::{
    error::{GemError, GemResult},
    gci::{BoolType, GciErrSType, GciSession, GciSessionIdType, OopType},
};

/// Resolves `name` in `library` and copies the function pointer out.
///
/// # Safety
/// `T` must be the exact function-pointer type of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> GemResult<T> {
    let mut c_name = Vec::with_capacity(name.len() + 1);
    c_name.extend_from_slice(name.as_bytes());
    c_name.push(0);
    // SAFETY: the caller guarantees `T` matches the symbol's signature.
    unsafe { library.get::<T>(&c_name) }
        .map(|sym| *sym)
        .map_err(|e| GemError::Library(format!("missing entry point {name}: {e}")))
}

fn open(path: &OsStr) -> GemResult<Library> {
    // SAFETY: loading a GCI library runs no initialisers that depend on our state.
    unsafe { Library::new(path) }.map_err(|e| GemError::Library(format!("failed to load {}: {e}", path.display())))
}

fn opt_ptr(value: Option<&CStr>) -> *const c_char {
    value.map_or(ptr::null(), CStr::as_ptr)
}

fn c_len(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

fn i64_len(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

// =============================================================================
// Linked library
// =============================================================================

struct LnkFns {
    init: unsafe extern "C" fn() -> BoolType,
    shutdown: unsafe extern "C" fn(),
    set_net: unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *const c_char),
    encrypt: unsafe extern "C" fn(*const c_char, *mut c_char, c_uint) -> *mut c_char,
    login_ex: unsafe extern "C" fn(*const c_char, *const c_char, c_uint, c_int) -> BoolType,
    get_session_id: unsafe extern "C" fn() -> GciSessionIdType,
    logout: unsafe extern "C" fn(),
    err: unsafe extern "C" fn(*mut GciErrSType) -> BoolType,
    begin: unsafe extern "C" fn(),
    abort: unsafe extern "C" fn(),
    commit: unsafe extern "C" fn() -> BoolType,
    session_is_remote: unsafe extern "C" fn() -> BoolType,
    release_oops: unsafe extern "C" fn(*const OopType, c_int),
    is_kind_of: unsafe extern "C" fn(OopType, OopType) -> BoolType,
    execute_str_from_context: unsafe extern "C" fn(*const c_char, OopType, OopType) -> OopType,
    execute_from_context: unsafe extern "C" fn(OopType, OopType, OopType) -> OopType,
    perform: unsafe extern "C" fn(OopType, *const c_char, *const OopType, c_int) -> OopType,
    perform_sym_dbg: unsafe extern "C" fn(OopType, OopType, *const OopType, c_int, c_int) -> OopType,
    new_symbol: unsafe extern "C" fn(*const c_char) -> OopType,
    resolve_symbol: unsafe extern "C" fn(*const c_char, OopType) -> OopType,
    resolve_symbol_obj: unsafe extern "C" fn(OopType, OopType) -> OopType,
    fetch_class: unsafe extern "C" fn(OopType) -> OopType,
    fetch_bytes: unsafe extern "C" fn(OopType, i64, *mut u8, i64) -> i64,
    fetch_utf8_bytes: unsafe extern "C" fn(OopType, i64, *mut u8, i64, *mut OopType, c_int) -> i64,
    oop_to_flt: unsafe extern "C" fn(OopType) -> c_double,
    flt_to_oop: unsafe extern "C" fn(c_double) -> OopType,
    new_utf8_string: unsafe extern "C" fn(*const c_char, BoolType) -> OopType,
    continue_with: unsafe extern "C" fn(OopType, OopType, c_int, *const GciErrSType) -> OopType,
    clear_stack: unsafe extern "C" fn(OopType),
}

/// `libgcilnk`, loaded and initialised.
///
/// `GciInit` runs on load and `GciShutdown` when the value is dropped, so keep exactly one
/// instance alive for as long as linked sessions are in use.
pub struct GciLnkLibrary {
    fns: LnkFns,
    _library: Library,
}

impl GciLnkLibrary {
    pub fn load(path: impl AsRef<OsStr>) -> GemResult<Self> {
        let library = open(path.as_ref())?;
        // SAFETY: every type below matches the prototype in gci.hf.
        let fns = unsafe {
            LnkFns {
                init: symbol(&library, "GciInit")?,
                shutdown: symbol(&library, "GciShutdown")?,
                set_net: symbol(&library, "GciSetNet")?,
                encrypt: symbol(&library, "GciEncrypt")?,
                login_ex: symbol(&library, "GciLoginEx")?,
                get_session_id: symbol(&library, "GciGetSessionId")?,
                logout: symbol(&library, "GciLogout")?,
                err: symbol(&library, "GciErr")?,
                begin: symbol(&library, "GciBegin")?,
                abort: symbol(&library, "GciAbort")?,
                commit: symbol(&library, "GciCommit")?,
                session_is_remote: symbol(&library, "GciSessionIsRemote")?,
                release_oops: symbol(&library, "GciReleaseOops")?,
                is_kind_of: symbol(&library, "GciIsKindOf")?,
                execute_str_from_context: symbol(&library, "GciExecuteStrFromContext")?,
                execute_from_context: symbol(&library, "GciExecuteFromContext")?,
                perform: symbol(&library, "GciPerform")?,
                perform_sym_dbg: symbol(&library, "GciPerformSymDbg")?,
                new_symbol: symbol(&library, "GciNewSymbol")?,
                resolve_symbol: symbol(&library, "GciResolveSymbol")?,
                resolve_symbol_obj: symbol(&library, "GciResolveSymbolObj")?,
                fetch_class: symbol(&library, "GciFetchClass")?,
                fetch_bytes: symbol(&library, "GciFetchBytes_")?,
                fetch_utf8_bytes: symbol(&library, "GciFetchUtf8Bytes_")?,
                oop_to_flt: symbol(&library, "GciOopToFlt")?,
                flt_to_oop: symbol(&library, "GciFltToOop")?,
                new_utf8_string: symbol(&library, "GciNewUtf8String")?,
                continue_with: symbol(&library, "GciContinueWith")?,
                clear_stack: symbol(&library, "GciClearStack")?,
            }
        };
        // SAFETY: GciInit takes no arguments and may be called once per process.
        if unsafe { (fns.init)() } == 0 {
            let mut err = GciErrSType::default();
            // SAFETY: `err` is a valid, writable GciErrSType.
            unsafe { (fns.err)(&raw mut err) };
            return Err(GemError::Library(format!("GciInit failed: {}", err.message_text())));
        }
        Ok(Self {
            fns,
            _library: library,
        })
    }
}

impl Drop for GciLnkLibrary {
    fn drop(&mut self) {
        // SAFETY: the library is still loaded; `_library` is dropped after this runs.
        unsafe { (self.fns.shutdown)() };
    }
}

// SAFETY (all blocks in this impl): the function pointers were resolved against the
// prototypes in gci.hf, strings are NUL-terminated `CStr`s, and every buffer pointer is
// paired with the length of the slice it came from.
impl LinkedGci for GciLnkLibrary {
    fn set_net(&self, stone_name: &CStr, host_username: Option<&CStr>, host_password: Option<&CStr>, gem_service: &CStr) {
        // SAFETY: see impl comment.
        unsafe {
            (self.fns.set_net)(
                stone_name.as_ptr(),
                opt_ptr(host_username),
                opt_ptr(host_password),
                gem_service.as_ptr(),
            );
        }
    }

    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool {
        let size = c_uint::try_from(out.len()).unwrap_or(c_uint::MAX);
        // SAFETY: see impl comment.
        let result = unsafe { (self.fns.encrypt)(password.as_ptr(), out.as_mut_ptr().cast(), size) };
        !result.is_null()
    }

    fn login_ex(&self, username: &CStr, password: &CStr, login_flags: u32, halt_on_error: i32) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.login_ex)(username.as_ptr(), password.as_ptr(), login_flags, halt_on_error) != 0 }
    }

    fn get_session_id(&self) -> GciSessionIdType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.get_session_id)() }
    }

    fn logout(&self) {
        // SAFETY: see impl comment.
        unsafe { (self.fns.logout)() }
    }

    fn err(&self, out: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.err)(out) != 0 }
    }

    fn begin(&self) {
        // SAFETY: see impl comment.
        unsafe { (self.fns.begin)() }
    }

    fn abort(&self) {
        // SAFETY: see impl comment.
        unsafe { (self.fns.abort)() }
    }

    fn commit(&self) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.commit)() != 0 }
    }

    fn session_is_remote(&self) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.session_is_remote)() != 0 }
    }

    fn release_oops(&self, oops: &[OopType]) {
        // SAFETY: see impl comment.
        unsafe { (self.fns.release_oops)(oops.as_ptr(), c_len(oops.len())) }
    }

    fn is_kind_of(&self, object: OopType, class: OopType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.is_kind_of)(object, class) != 0 }
    }

    fn execute_str_from_context(&self, source: &CStr, context: OopType, symbol_list: OopType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.execute_str_from_context)(source.as_ptr(), context, symbol_list) }
    }

    fn execute_from_context(&self, source: OopType, context: OopType, symbol_list: OopType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.execute_from_context)(source, context, symbol_list) }
    }

    fn perform(&self, receiver: OopType, selector: &CStr, args: &[OopType]) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.perform)(receiver, selector.as_ptr(), args.as_ptr(), c_len(args.len())) }
    }

    fn perform_sym_dbg(&self, receiver: OopType, selector: OopType, args: &[OopType], flags: i32) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.perform_sym_dbg)(receiver, selector, args.as_ptr(), c_len(args.len()), flags) }
    }

    fn new_symbol(&self, text: &CStr) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.new_symbol)(text.as_ptr()) }
    }

    fn resolve_symbol(&self, name: &CStr, symbol_list: OopType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.resolve_symbol)(name.as_ptr(), symbol_list) }
    }

    fn resolve_symbol_obj(&self, name: OopType, symbol_list: OopType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.resolve_symbol_obj)(name, symbol_list) }
    }

    fn fetch_class(&self, object: OopType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.fetch_class)(object) }
    }

    fn fetch_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8]) -> i64 {
        // SAFETY: see impl comment.
        unsafe { (self.fns.fetch_bytes)(object, start_index, buf.as_mut_ptr(), i64_len(buf.len())) }
    }

    fn fetch_utf8_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8], utf8_string: &mut OopType, flags: i32) -> i64 {
        // SAFETY: see impl comment.
        unsafe {
            (self.fns.fetch_utf8_bytes)(object, start_index, buf.as_mut_ptr(), i64_len(buf.len()), utf8_string, flags)
        }
    }

    fn oop_to_flt(&self, object: OopType) -> f64 {
        // SAFETY: see impl comment.
        unsafe { (self.fns.oop_to_flt)(object) }
    }

    fn flt_to_oop(&self, value: f64) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.flt_to_oop)(value) }
    }

    fn new_utf8_string(&self, text: &CStr, convert_to_unicode: bool) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.new_utf8_string)(text.as_ptr(), BoolType::from(convert_to_unicode)) }
    }

    fn continue_with(&self, process: OopType, replace_top_of_stack: OopType, flags: i32, continue_with_error: Option<&GciErrSType>) -> OopType {
        let error_ptr = continue_with_error.map_or(ptr::null(), ptr::from_ref);
        // SAFETY: see impl comment.
        unsafe { (self.fns.continue_with)(process, replace_top_of_stack, flags, error_ptr) }
    }

    fn clear_stack(&self, process: OopType) {
        // SAFETY: see impl comment.
        unsafe { (self.fns.clear_stack)(process) }
    }
}

// =============================================================================
// Thread-safe (RPC) library
// =============================================================================

type TsLoginFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    BoolType,
    *const c_char,
    *const c_char,
    *const c_char,
    c_uint,
    c_int,
    *mut BoolType,
    *mut GciErrSType,
) -> GciSession;

type TsExecuteFn = unsafe extern "C" fn(
    GciSession,
    *const c_char,
    OopType,
    OopType,
    OopType,
    c_int,
    u16,
    *mut GciErrSType,
) -> OopType;

type TsPerformFn = unsafe extern "C" fn(
    GciSession,
    OopType,
    OopType,
    *const c_char,
    *const OopType,
    c_int,
    c_int,
    u16,
    *mut GciErrSType,
) -> OopType;

type TsFetchUtf8BytesFn =
    unsafe extern "C" fn(GciSession, OopType, i64, *mut u8, i64, *mut OopType, *mut GciErrSType, c_int) -> i64;

struct TsFns {
    encrypt: unsafe extern "C" fn(*const c_char, *mut c_char, usize) -> *mut c_char,
    login: TsLoginFn,
    logout: unsafe extern "C" fn(GciSession, *mut GciErrSType) -> BoolType,
    session_is_remote: unsafe extern "C" fn(GciSession) -> c_int,
    execute: TsExecuteFn,
    perform: TsPerformFn,
    resolve_symbol: unsafe extern "C" fn(GciSession, *const c_char, OopType, *mut GciErrSType) -> OopType,
    resolve_symbol_obj: unsafe extern "C" fn(GciSession, OopType, OopType, *mut GciErrSType) -> OopType,
    new_symbol: unsafe extern "C" fn(GciSession, *const c_char, *mut GciErrSType) -> OopType,
    is_kind_of: unsafe extern "C" fn(GciSession, OopType, OopType, *mut GciErrSType) -> c_int,
    fetch_class: unsafe extern "C" fn(GciSession, OopType, *mut GciErrSType) -> OopType,
    begin: unsafe extern "C" fn(GciSession, *mut GciErrSType) -> BoolType,
    abort: unsafe extern "C" fn(GciSession, *mut GciErrSType) -> BoolType,
    commit: unsafe extern "C" fn(GciSession, *mut GciErrSType) -> BoolType,
    oop_to_double: unsafe extern "C" fn(GciSession, OopType, *mut c_double, *mut GciErrSType) -> BoolType,
    double_to_oop: unsafe extern "C" fn(GciSession, c_double, *mut GciErrSType) -> OopType,
    fetch_bytes: unsafe extern "C" fn(GciSession, OopType, i64, *mut u8, i64, *mut GciErrSType) -> i64,
    fetch_utf8_bytes: TsFetchUtf8BytesFn,
    new_utf8_string: unsafe extern "C" fn(GciSession, *const c_char, BoolType, *mut GciErrSType) -> OopType,
    release_objs: unsafe extern "C" fn(GciSession, *const OopType, c_int, *mut GciErrSType) -> BoolType,
    continue_with:
        unsafe extern "C" fn(GciSession, OopType, OopType, *const GciErrSType, c_int, *mut GciErrSType) -> OopType,
    clear_stack: unsafe extern "C" fn(GciSession, OopType, *mut GciErrSType) -> BoolType,
}

/// `libgcits` (GemStone 3.5 and later login signature), loaded.
pub struct GciTsLibrary {
    fns: TsFns,
    _library: Library,
}

impl GciTsLibrary {
    pub fn load(path: impl AsRef<OsStr>) -> GemResult<Self> {
        let library = open(path.as_ref())?;
        // SAFETY: every type below matches the prototype in gcits.hf.
        let fns = unsafe {
            TsFns {
                encrypt: symbol(&library, "GciTsEncrypt")?,
                login: symbol(&library, "GciTsLogin")?,
                logout: symbol(&library, "GciTsLogout")?,
                session_is_remote: symbol(&library, "GciTsSessionIsRemote")?,
                execute: symbol(&library, "GciTsExecute")?,
                perform: symbol(&library, "GciTsPerform")?,
                resolve_symbol: symbol(&library, "GciTsResolveSymbol")?,
                resolve_symbol_obj: symbol(&library, "GciTsResolveSymbolObj")?,
                new_symbol: symbol(&library, "GciTsNewSymbol")?,
                is_kind_of: symbol(&library, "GciTsIsKindOf")?,
                fetch_class: symbol(&library, "GciTsFetchClass")?,
                begin: symbol(&library, "GciTsBegin")?,
                abort: symbol(&library, "GciTsAbort")?,
                commit: symbol(&library, "GciTsCommit")?,
                oop_to_double: symbol(&library, "GciTsOopToDouble")?,
                double_to_oop: symbol(&library, "GciTsDoubleToOop")?,
                fetch_bytes: symbol(&library, "GciTsFetchBytes")?,
                fetch_utf8_bytes: symbol(&library, "GciTsFetchUtf8Bytes")?,
                new_utf8_string: symbol(&library, "GciTsNewUtf8String")?,
                release_objs: symbol(&library, "GciTsReleaseObjs")?,
                continue_with: symbol(&library, "GciTsContinueWith")?,
                clear_stack: symbol(&library, "GciTsClearStack")?,
            }
        };
        Ok(Self {
            fns,
            _library: library,
        })
    }
}

// SAFETY (all blocks in this impl): the function pointers were resolved against the
// prototypes in gcits.hf, strings are NUL-terminated `CStr`s, buffer pointers are paired with
// the length of their slice, and `session` handles come from a successful `GciTsLogin`.
impl RpcGci for GciTsLibrary {
    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool {
        // SAFETY: see impl comment.
        let result = unsafe { (self.fns.encrypt)(password.as_ptr(), out.as_mut_ptr().cast(), out.len()) };
        !result.is_null()
    }

    fn login(&self, login: &TsLogin<'_>, executed_session_init: &mut BoolType, err: &mut GciErrSType) -> GciSession {
        // SAFETY: see impl comment.
        unsafe {
            (self.fns.login)(
                login.stone_name.as_ptr(),
                opt_ptr(login.host_username),
                opt_ptr(login.host_password),
                BoolType::from(login.host_password_is_encrypted),
                login.gem_service.as_ptr(),
                login.username.as_ptr(),
                opt_ptr(login.password),
                login.login_flags,
                login.halt_on_error,
                executed_session_init,
                err,
            )
        }
    }

    fn logout(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.logout)(session, err) != 0 }
    }

    fn session_is_remote(&self, session: GciSession) -> i32 {
        // SAFETY: see impl comment.
        unsafe { (self.fns.session_is_remote)(session) }
    }

    fn execute(
        &self,
        session: GciSession,
        source_str: Option<&CStr>,
        source_oop: OopType,
        context: OopType,
        symbol_list: OopType,
        flags: i32,
        environment_id: u16,
        err: &mut GciErrSType,
    ) -> OopType {
        // SAFETY: see impl comment.
        unsafe {
            (self.fns.execute)(
                session,
                opt_ptr(source_str),
                source_oop,
                context,
                symbol_list,
                flags,
                environment_id,
                err,
            )
        }
    }

    fn perform(
        &self,
        session: GciSession,
        receiver: OopType,
        selector_oop: OopType,
        selector_str: Option<&CStr>,
        args: &[OopType],
        flags: i32,
        environment_id: u16,
        err: &mut GciErrSType,
    ) -> OopType {
        // SAFETY: see impl comment.
        unsafe {
            (self.fns.perform)(
                session,
                receiver,
                selector_oop,
                opt_ptr(selector_str),
                args.as_ptr(),
                c_len(args.len()),
                flags,
                environment_id,
                err,
            )
        }
    }

    fn resolve_symbol(&self, session: GciSession, name: &CStr, symbol_list: OopType, err: &mut GciErrSType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.resolve_symbol)(session, name.as_ptr(), symbol_list, err) }
    }

    fn resolve_symbol_obj(&self, session: GciSession, name: OopType, symbol_list: OopType, err: &mut GciErrSType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.resolve_symbol_obj)(session, name, symbol_list, err) }
    }

    fn new_symbol(&self, session: GciSession, text: &CStr, err: &mut GciErrSType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.new_symbol)(session, text.as_ptr(), err) }
    }

    fn is_kind_of(&self, session: GciSession, object: OopType, class: OopType, err: &mut GciErrSType) -> i32 {
        // SAFETY: see impl comment.
        unsafe { (self.fns.is_kind_of)(session, object, class, err) }
    }

    fn fetch_class(&self, session: GciSession, object: OopType, err: &mut GciErrSType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.fetch_class)(session, object, err) }
    }

    fn begin(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.begin)(session, err) != 0 }
    }

    fn abort(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.abort)(session, err) != 0 }
    }

    fn commit(&self, session: GciSession, err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.commit)(session, err) != 0 }
    }

    fn oop_to_double(&self, session: GciSession, object: OopType, result: &mut f64, err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.oop_to_double)(session, object, result, err) != 0 }
    }

    fn double_to_oop(&self, session: GciSession, value: f64, err: &mut GciErrSType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.double_to_oop)(session, value, err) }
    }

    fn fetch_bytes(&self, session: GciSession, object: OopType, start_index: i64, buf: &mut [u8], err: &mut GciErrSType) -> i64 {
        // SAFETY: see impl comment.
        unsafe { (self.fns.fetch_bytes)(session, object, start_index, buf.as_mut_ptr(), i64_len(buf.len()), err) }
    }

    fn fetch_utf8_bytes(
        &self,
        session: GciSession,
        object: OopType,
        start_index: i64,
        buf: &mut [u8],
        utf8_string: &mut OopType,
        err: &mut GciErrSType,
        flags: i32,
    ) -> i64 {
        // SAFETY: see impl comment.
        unsafe {
            (self.fns.fetch_utf8_bytes)(
                session,
                object,
                start_index,
                buf.as_mut_ptr(),
                i64_len(buf.len()),
                utf8_string,
                err,
                flags,
            )
        }
    }

    fn new_utf8_string(&self, session: GciSession, text: &CStr, convert_to_unicode: bool, err: &mut GciErrSType) -> OopType {
        // SAFETY: see impl comment.
        unsafe { (self.fns.new_utf8_string)(session, text.as_ptr(), BoolType::from(convert_to_unicode), err) }
    }

    fn release_objs(&self, session: GciSession, oops: &[OopType], err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.release_objs)(session, oops.as_ptr(), c_len(oops.len()), err) != 0 }
    }

    fn continue_with(
        &self,
        session: GciSession,
        process: OopType,
        replace_top_of_stack: OopType,
        continue_with_error: Option<&GciErrSType>,
        flags: i32,
        err: &mut GciErrSType,
    ) -> OopType {
        let error_ptr = continue_with_error.map_or(ptr::null(), ptr::from_ref);
        // SAFETY: see impl comment.
        unsafe { (self.fns.continue_with)(session, process, replace_top_of_stack, error_ptr, flags, err) }
    }

    fn clear_stack(&self, session: GciSession, process: OopType, err: &mut GciErrSType) -> bool {
        // SAFETY: see impl comment.
        unsafe { (self.fns.clear_stack)(session, process, err) != 0 }
    }
}

//! The native call interface seam.
//!
//! GemStone ships two C libraries with different calling conventions:
//!
//! - `libgcilnk` (linked): one implicit session per process. Calls return a value or a
//!   sentinel and the caller must ask `GciErr` afterwards whether anything went wrong.
//! - `libgcits` (thread-safe / RPC): every call takes an explicit session handle and an
//!   error record out-parameter, and signals failure through a sentinel return value.
//!
//! [`LinkedGci`] and [`RpcGci`] describe those entry points with safe, C-shaped signatures:
//! strings are `&CStr`, arrays are slices and out-parameters are `&mut`. They are implemented
//! by [`dynamic`] (the real shared libraries) and by [`crate::sim::SimStone`] (in memory).
//! Nothing in this module interprets results; error checking and retry policy belong to the
//! session transports.

pub mod dynamic;

use std::ffi::CStr;

use crate::gci::{BoolType, GciErrSType, GciSession, GciSessionIdType, OopType};

/// Entry points of the linked (in-process) GCI library.
pub trait LinkedGci {
    /// `GciSetNet`: where the next login should connect.
    fn set_net(&self, stone_name: &CStr, host_username: Option<&CStr>, host_password: Option<&CStr>, gem_service: &CStr);
    /// `GciEncrypt`: writes the encrypted password into `out`; false when `out` is too small.
    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool;
    /// `GciLoginEx`: false on a failed or degraded login (check [`Self::err`]).
    fn login_ex(&self, username: &CStr, password: &CStr, login_flags: u32, halt_on_error: i32) -> bool;
    /// `GciGetSessionId`.
    fn get_session_id(&self) -> GciSessionIdType;
    /// `GciLogout`.
    fn logout(&self);
    /// `GciErr`: copies and clears the pending error; true when there was one.
    fn err(&self, out: &mut GciErrSType) -> bool;
    fn begin(&self);
    fn abort(&self);
    fn commit(&self) -> bool;
    fn session_is_remote(&self) -> bool;
    /// `GciReleaseOops`.
    fn release_oops(&self, oops: &[OopType]);
    fn is_kind_of(&self, object: OopType, class: OopType) -> bool;
    fn execute_str_from_context(&self, source: &CStr, context: OopType, symbol_list: OopType) -> OopType;
    fn execute_from_context(&self, source: OopType, context: OopType, symbol_list: OopType) -> OopType;
    fn perform(&self, receiver: OopType, selector: &CStr, args: &[OopType]) -> OopType;
    fn perform_sym_dbg(&self, receiver: OopType, selector: OopType, args: &[OopType], flags: i32) -> OopType;
    fn new_symbol(&self, text: &CStr) -> OopType;
    fn resolve_symbol(&self, name: &CStr, symbol_list: OopType) -> OopType;
    fn resolve_symbol_obj(&self, name: OopType, symbol_list: OopType) -> OopType;
    fn fetch_class(&self, object: OopType) -> OopType;
    /// `GciFetchBytes_`: copies up to `buf.len()` bytes starting at the 1-based `start_index`.
    fn fetch_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8]) -> i64;
    /// `GciFetchUtf8Bytes_`: like [`Self::fetch_bytes`] but transcodes to UTF-8 on the server.
    /// Any intermediate UTF-8 object created for the transfer is reported through `utf8_string`.
    fn fetch_utf8_bytes(&self, object: OopType, start_index: i64, buf: &mut [u8], utf8_string: &mut OopType, flags: i32) -> i64;
    fn oop_to_flt(&self, object: OopType) -> f64;
    fn flt_to_oop(&self, value: f64) -> OopType;
    fn new_utf8_string(&self, text: &CStr, convert_to_unicode: bool) -> OopType;
    /// `GciContinueWith`: resumes a suspended process.
    fn continue_with(&self, process: OopType, replace_top_of_stack: OopType, flags: i32, continue_with_error: Option<&GciErrSType>) -> OopType;
    fn clear_stack(&self, process: OopType);
}

/// Arguments of `GciTsLogin`.
#[derive(Debug, Clone, Copy)]
pub struct TsLogin<'a> {
    pub stone_name: &'a CStr,
    pub host_username: Option<&'a CStr>,
    pub host_password: Option<&'a CStr>,
    pub host_password_is_encrypted: bool,
    pub gem_service: &'a CStr,
    pub username: &'a CStr,
    pub password: Option<&'a CStr>,
    pub login_flags: u32,
    pub halt_on_error: i32,
}

/// Entry points of the thread-safe (RPC) GCI library.
///
/// Failures are signalled by a sentinel return (`OOP_ILLEGAL`, `false`, `-1`) with `err`
/// filled in.
pub trait RpcGci {
    /// `GciTsEncrypt`: false when `out` is too small.
    fn encrypt(&self, password: &CStr, out: &mut [u8]) -> bool;
    /// `GciTsLogin`: returns a null handle on failure. `executed_session_init` reports
    /// whether the server-side session initialisation ran.
    fn login(&self, login: &TsLogin<'_>, executed_session_init: &mut BoolType, err: &mut GciErrSType) -> GciSession;
    fn logout(&self, session: GciSession, err: &mut GciErrSType) -> bool;
    /// `GciTsSessionIsRemote`: 1, 0, or -1 for an invalid session.
    fn session_is_remote(&self, session: GciSession) -> i32;
    #[expect(clippy::too_many_arguments, reason = "mirrors the C signature")]
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
    ) -> OopType;
    #[expect(clippy::too_many_arguments, reason = "mirrors the C signature")]
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
    ) -> OopType;
    fn resolve_symbol(&self, session: GciSession, name: &CStr, symbol_list: OopType, err: &mut GciErrSType) -> OopType;
    fn resolve_symbol_obj(&self, session: GciSession, name: OopType, symbol_list: OopType, err: &mut GciErrSType) -> OopType;
    fn new_symbol(&self, session: GciSession, text: &CStr, err: &mut GciErrSType) -> OopType;
    /// `GciTsIsKindOf`: 1, 0, or -1 on error.
    fn is_kind_of(&self, session: GciSession, object: OopType, class: OopType, err: &mut GciErrSType) -> i32;
    fn fetch_class(&self, session: GciSession, object: OopType, err: &mut GciErrSType) -> OopType;
    fn begin(&self, session: GciSession, err: &mut GciErrSType) -> bool;
    fn abort(&self, session: GciSession, err: &mut GciErrSType) -> bool;
    fn commit(&self, session: GciSession, err: &mut GciErrSType) -> bool;
    fn oop_to_double(&self, session: GciSession, object: OopType, result: &mut f64, err: &mut GciErrSType) -> bool;
    fn double_to_oop(&self, session: GciSession, value: f64, err: &mut GciErrSType) -> OopType;
    /// `GciTsFetchBytes`: bytes copied, or -1 on error.
    fn fetch_bytes(&self, session: GciSession, object: OopType, start_index: i64, buf: &mut [u8], err: &mut GciErrSType) -> i64;
    /// `GciTsFetchUtf8Bytes`: bytes copied, or -1 on error.
    #[expect(clippy::too_many_arguments, reason = "mirrors the C signature")]
    fn fetch_utf8_bytes(
        &self,
        session: GciSession,
        object: OopType,
        start_index: i64,
        buf: &mut [u8],
        utf8_string: &mut OopType,
        err: &mut GciErrSType,
        flags: i32,
    ) -> i64;
    fn new_utf8_string(&self, session: GciSession, text: &CStr, convert_to_unicode: bool, err: &mut GciErrSType) -> OopType;
    fn release_objs(&self, session: GciSession, oops: &[OopType], err: &mut GciErrSType) -> bool;
    fn continue_with(
        &self,
        session: GciSession,
        process: OopType,
        replace_top_of_stack: OopType,
        continue_with_error: Option<&GciErrSType>,
        flags: i32,
        err: &mut GciErrSType,
    ) -> OopType;
    fn clear_stack(&self, session: GciSession, process: OopType, err: &mut GciErrSType) -> bool;
}

//! Data types and constants of the GemStone C interface (GCI).
//!
//! These mirror `gci.ht`, `gcioop.ht` and `gcoop.ht`. The values are a fixed external
//! protocol; nothing here is tunable.

use std::{
    ffi::{c_int, c_void},
    fmt,
};

/// Raw object reference as passed across the C boundary.
pub type OopType = u64;
/// Linked-interface session id.
pub type GciSessionIdType = c_int;
/// Thread-safe interface session handle (`GciSession` in `gcits.hf`).
pub type GciSession = *mut c_void;
/// C boolean.
pub type BoolType = c_int;

pub const GCI_INVALID_SESSION_ID: GciSessionIdType = 0;

pub const GCI_ERR_STR_SIZE: usize = 1024;
pub const GCI_ERR_REASON_SIZE: usize = GCI_ERR_STR_SIZE;
pub const GCI_MAX_ERR_ARGS: usize = 10;

// login flags for GciLoginEx / GciTsLogin
pub const GCI_LOGIN_PW_ENCRYPTED: u32 = 0x1;
pub const GCI_LOGIN_IS_SUBORDINATE: u32 = 0x2;
pub const GCI_LOGIN_QUIET: u32 = 0x10;

// GciTsPerform flags
pub const GCI_PERFORM_FLAG_ENABLE_DEBUG: i32 = 0x1;

// tag layout
pub const OOP_TAG_SPECIAL_MASK: OopType = 0x6;
pub const OOP_TAG_SMALLINT: OopType = 0x2;
pub const OOP_NUM_TAG_BITS: u32 = 3;

// well-known instances
pub const OOP_ILLEGAL: OopType = 0x01;
pub const OOP_NO_CONTEXT: OopType = OOP_ILLEGAL;
pub const OOP_NIL: OopType = 0x14;
pub const OOP_FALSE: OopType = 0x0C;
pub const OOP_TRUE: OopType = 0x10C;
pub const OOP_ASCII_NUL: OopType = 0x1C;

// well-known classes
pub const OOP_CLASS_INTEGER: OopType = 70145;
pub const OOP_CLASS_SMALL_INTEGER: OopType = 74241;
pub const OOP_CLASS_LARGE_INTEGER: OopType = 136_193;
pub const OOP_CLASS_SMALL_DOUBLE: OopType = 121_345;
pub const OOP_CLASS_FLOAT: OopType = 135_937;
pub const OOP_CLASS_SYMBOL: OopType = 110_849;
pub const OOP_CLASS_STRING: OopType = 74753;
pub const OOP_CLASS_DOUBLE_BYTE_STRING: OopType = 143_873;
pub const OOP_CLASS_DOUBLE_BYTE_SYMBOL: OopType = 144_129;
pub const OOP_CLASS_QUAD_BYTE_STRING: OopType = 144_385;
pub const OOP_CLASS_QUAD_BYTE_SYMBOL: OopType = 144_641;
pub const OOP_CLASS_CHARACTER: OopType = 68353;
pub const OOP_CLASS_UTF8: OopType = 154_113;
pub const OOP_CLASS_UNICODE7: OopType = 154_369;
pub const OOP_CLASS_UNICODE16: OopType = 154_625;
pub const OOP_CLASS_UNICODE32: OopType = 154_881;

/// Error report filled in by the C interface (`GciErrSType`).
///
/// Layout-compatible with the C struct so it can be handed to the library by pointer.
#[repr(C)]
#[derive(Clone)]
pub struct GciErrSType {
    pub category: OopType,
    pub context: OopType,
    pub exception_obj: OopType,
    pub args: [OopType; GCI_MAX_ERR_ARGS],
    pub number: c_int,
    pub arg_count: c_int,
    pub fatal: u8,
    pub message: [u8; GCI_ERR_STR_SIZE + 1],
    pub reason: [u8; GCI_ERR_REASON_SIZE + 1],
}

impl Default for GciErrSType {
    fn default() -> Self {
        let mut args = [OOP_NIL; GCI_MAX_ERR_ARGS];
        args[0] = OOP_ILLEGAL;
        Self {
            category: OOP_NIL,
            context: OOP_NIL,
            exception_obj: OOP_NIL,
            args,
            number: 0,
            arg_count: 0,
            fatal: 0,
            message: [0; GCI_ERR_STR_SIZE + 1],
            reason: [0; GCI_ERR_REASON_SIZE + 1],
        }
    }
}

impl GciErrSType {
    /// Builds a report from its parts; used by in-process implementations of the interface.
    #[must_use]
    pub fn new(number: c_int, message: &str, reason: &str) -> Self {
        let mut err = Self {
            number,
            ..Self::default()
        };
        copy_c_string(&mut err.message, message);
        copy_c_string(&mut err.reason, reason);
        err
    }

    /// True once the C side has written an error into the record.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.number != 0
    }

    /// The message text up to the first NUL, decoded leniently as UTF-8.
    #[must_use]
    pub fn message_text(&self) -> String {
        c_string_text(&self.message)
    }

    /// The reason text up to the first NUL, decoded leniently as UTF-8.
    #[must_use]
    pub fn reason_text(&self) -> String {
        c_string_text(&self.reason)
    }

    /// The argument oops actually populated (`arg_count` of them, capped at the array size).
    #[must_use]
    pub fn arg_oops(&self) -> &[OopType] {
        let count = usize::try_from(self.arg_count).unwrap_or(0).min(GCI_MAX_ERR_ARGS);
        &self.args[..count]
    }
}

impl fmt::Debug for GciErrSType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GciErrSType")
            .field("number", &self.number)
            .field("category", &self.category)
            .field("context", &self.context)
            .field("exception_obj", &self.exception_obj)
            .field("args", &self.arg_oops())
            .field("fatal", &(self.fatal != 0))
            .field("message", &self.message_text())
            .field("reason", &self.reason_text())
            .finish()
    }
}

fn copy_c_string(dest: &mut [u8], text: &str) {
    let len = text.len().min(dest.len() - 1);
    dest[..len].copy_from_slice(&text.as_bytes()[..len]);
    dest[len] = 0;
}

fn c_string_text(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

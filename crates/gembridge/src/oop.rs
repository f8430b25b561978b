//! Tagged object references ("oops") and the immediate-value codec.
//!
//! The remote VM hands out 64-bit object references. Bits 1 and 2 (mask `0x6`) carry a tag:
//!
//! | tag   | meaning                                           |
//! |-------|---------------------------------------------------|
//! | `0x0` | object-table reference (exported, must be released) |
//! | `0x2` | small integer, value stored in the upper 61 bits  |
//! | `0x4` | special: nil, true, false, characters             |
//! | `0x6` | small double                                      |
//!
//! Everything here is pure bit manipulation; nothing touches a session.

use std::fmt;

use crate::{
    error::{GemError, GemResult},
    gci::{
        OOP_FALSE, OOP_ILLEGAL, OOP_NIL, OOP_NUM_TAG_BITS, OOP_TAG_SMALLINT, OOP_TAG_SPECIAL_MASK, OOP_TRUE,
        OopType,
    },
};

/// Largest integer that fits in a small-integer oop.
pub const MAX_SMALL_INT: i64 = (1 << 60) - 1;
/// Smallest integer that fits in a small-integer oop.
pub const MIN_SMALL_INT: i64 = -(1 << 60);

/// An object reference issued by the remote VM.
///
/// `Oop` is a plain value: copying it does not create or release anything on the
/// remote side. Lifetime management happens through [`GemObject`](crate::GemObject).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Oop(OopType);

impl Oop {
    /// The remote `nil`.
    pub const NIL: Self = Self(OOP_NIL);
    /// The remote `true`.
    pub const TRUE: Self = Self(OOP_TRUE);
    /// The remote `false`.
    pub const FALSE: Self = Self(OOP_FALSE);
    /// Marker for "no object"; also used as "no context" for execution.
    pub const ILLEGAL: Self = Self(OOP_ILLEGAL);

    /// Wraps a raw oop.
    #[must_use]
    pub const fn new(raw: OopType) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> OopType {
        self.0
    }

    /// Returns the sentinel for a boolean.
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        if value { Self::TRUE } else { Self::FALSE }
    }

    /// True when any of the special tag bits are set, i.e. the value is immediate
    /// and has no object-table entry to release.
    #[must_use]
    pub const fn is_special(self) -> bool {
        self.0 & OOP_TAG_SPECIAL_MASK != 0
    }

    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.0 == OOP_NIL
    }

    #[must_use]
    pub const fn is_illegal(self) -> bool {
        self.0 == OOP_ILLEGAL
    }

    /// See [`is_small_integer`].
    #[must_use]
    pub const fn is_small_integer(self) -> bool {
        is_small_integer(self)
    }
}

impl fmt::Debug for Oop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oop({:#x})", self.0)
    }
}

impl fmt::Display for Oop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Oop> for OopType {
    fn from(oop: Oop) -> Self {
        oop.0
    }
}

/// True iff the tag bits mark `oop` as an immediate small integer.
#[must_use]
pub const fn is_small_integer(oop: Oop) -> bool {
    oop.0 & OOP_TAG_SPECIAL_MASK == OOP_TAG_SMALLINT
}

/// Extracts the integer stored in a small-integer oop.
///
/// Uses an arithmetic shift so negative values come back with their sign.
pub fn decode_small_integer(oop: Oop) -> GemResult<i64> {
    if !is_small_integer(oop) {
        return Err(GemError::ProtocolViolation(format!(
            "expected a small integer oop, got {oop:?}"
        )));
    }
    #[expect(clippy::cast_possible_wrap, reason = "two's complement reinterpretation of the tagged word")]
    let signed = oop.0 as i64;
    Ok(signed >> OOP_NUM_TAG_BITS)
}

/// Builds the small-integer oop for `value`.
///
/// Returns [`GemError::OutOfRange`] outside `MIN_SMALL_INT..=MAX_SMALL_INT`; callers fall back
/// to constructing a LargeInteger on the remote side.
pub fn encode_small_integer(value: i64) -> GemResult<Oop> {
    if !(MIN_SMALL_INT..=MAX_SMALL_INT).contains(&value) {
        return Err(GemError::OutOfRange(format!("{value} does not fit in a small integer")));
    }
    #[expect(clippy::cast_sign_loss, reason = "two's complement reinterpretation of the tagged word")]
    let raw = ((value << OOP_NUM_TAG_BITS) as u64) | OOP_TAG_SMALLINT;
    Ok(Oop(raw))
}

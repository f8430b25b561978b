//! Errors raised inside the stone, bound to the session that received them.
//!
//! A [`RemoteError`] keeps the raw error record from the C interface. Its object fields
//! (category, context, exception, arguments) are turned into proxies of the owning session on
//! demand, so inspecting an error can itself talk to the stone. Non-fatal errors leave a
//! suspended process in `context` which can be resumed with [`RemoteError::continue_with`] or
//! discarded with [`RemoteError::clear_stack`].

use std::fmt;

use crate::{
    error::GemResult,
    gci::{GciErrSType, OOP_ILLEGAL, OOP_NIL, OopType},
    oop::Oop,
    proxy::GemObject,
    session::Session,
    value::HostValue,
};

#[derive(Clone)]
pub struct RemoteError {
    session: Session,
    record: Box<GciErrSType>,
}

impl RemoteError {
    pub(crate) fn new(session: Session, record: Box<GciErrSType>) -> Self {
        Self { session, record }
    }

    /// The session the error was reported on.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The raw error record.
    #[must_use]
    pub fn record(&self) -> &GciErrSType {
        &self.record
    }

    /// Proxy for one of the record's object fields; nil and illegal mean there is none.
    fn field(&self, oop: OopType) -> Option<GemObject> {
        match oop {
            OOP_NIL | OOP_ILLEGAL => None,
            oop => Some(self.session.object(Oop::new(oop))),
        }
    }

    /// The error dictionary the number belongs to.
    #[must_use]
    pub fn category(&self) -> Option<GemObject> {
        self.field(self.record.category)
    }

    /// The suspended GsProcess of a non-fatal error.
    #[must_use]
    pub fn context(&self) -> Option<GemObject> {
        self.field(self.record.context)
    }

    /// The signalled exception, if there was one.
    #[must_use]
    pub fn exception_object(&self) -> Option<GemObject> {
        self.field(self.record.exception_obj)
    }

    /// The error's arguments, or `None` when it has none.
    #[must_use]
    pub fn arguments(&self) -> Option<Vec<GemObject>> {
        let oops = self.record.arg_oops();
        if oops.is_empty() {
            return None;
        }
        Some(oops.iter().map(|&oop| self.session.object(Oop::new(oop))).collect())
    }

    #[must_use]
    pub fn number(&self) -> i32 {
        self.record.number
    }

    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.record.arg_oops().len()
    }

    /// True when the session can not continue after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.record.fatal != 0
    }

    #[must_use]
    pub fn reason(&self) -> String {
        self.record.reason_text()
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.record.message_text()
    }

    /// The exception's own description (`asString`). Falls back to [`Self::message`] when
    /// there is no exception or the stone can not be asked, e.g. after a logout.
    #[must_use]
    pub fn description(&self) -> String {
        let description = self
            .exception_object()
            .map(|exception| exception.perform("asString", &[]).and_then(|text| text.to_host()));
        match description {
            Some(Ok(HostValue::String(description))) => description,
            _ => self.message(),
        }
    }

    /// Resumes the suspended process.
    ///
    /// With `error`, the process continues by signalling that error instead. Otherwise
    /// `replace_top_of_stack` (when given) becomes the value of the interrupted expression.
    /// Returns the result of the resumed computation.
    pub fn continue_with(
        &self,
        error: Option<&Self>,
        replace_top_of_stack: Option<&GemObject>,
    ) -> GemResult<GemObject> {
        let top = match replace_top_of_stack {
            Some(object) => self.session.own(object)?,
            None => OOP_ILLEGAL,
        };
        let error = error.map(|e| e.record.as_ref());
        self.session.continue_with(self.record.context, top, error)
    }

    /// Discards the suspended process.
    pub fn clear_stack(&self) -> GemResult<()> {
        self.session.clear_stack(self.record.context)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.record.message_text();
        if message.is_empty() {
            write!(f, "remote error {}", self.record.number)
        } else {
            f.write_str(&message)
        }
    }
}

impl fmt::Debug for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteError")
            .field("number", &self.record.number)
            .field("fatal", &self.is_fatal())
            .field("message", &self.record.message_text())
            .field("context", &self.record.context)
            .finish_non_exhaustive()
    }
}

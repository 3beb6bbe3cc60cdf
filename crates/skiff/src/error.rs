//! Error taxonomy: compile-time syntax errors, runtime errors, and the
//! public exception type handed to embedders.
//!
//! Inside the VM, errors travel as [`RunError`] through `RunResult<T>` — the
//! dispatch loop returns an explicit `Result` at each step rather than using
//! unwinding as control flow. Engine-raised errors stay as a lightweight
//! kind + message pair until a `catch` handler or the embedder needs a real
//! JS Error object.

use std::fmt::{self, Display, Write};

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// JS-level error classes raised by the engine itself.
///
/// `strum` derives give the canonical `name` property string for free
/// (e.g. `JsErrorKind::TypeError` -> `"TypeError"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum JsErrorKind {
    /// Malformed source, reported by the lexer, parser, or code generator.
    SyntaxError,
    /// Unresolved global, uninitialised binding, TDZ violation.
    ReferenceError,
    /// Non-callable call, property access on null/undefined, wrong receiver.
    TypeError,
    /// Numeric out-of-range: call depth, array length, invalid repeat count.
    RangeError,
    /// Generic runtime error (`Error`).
    Error,
}

/// A compile-time failure with the byte position it was detected at.
///
/// Raised by the lexer, parser, and code generator. Converted to a public
/// [`Exception`] (with line/column from the module's line table) at the
/// embedding boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// Byte offset into the source where the error was detected.
    pub pos: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, pos: u32) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {} (at byte {})", self.message, self.pos)
    }
}

impl std::error::Error for SyntaxError {}

/// One resolved frame of a stack trace.
///
/// Positions are resolved eagerly at capture time (the VM has the module's
/// line table in hand while unwinding); native frames carry no location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Function name, or `<module>` for top-level code, or `<native>`.
    pub function: String,
    /// Module name, empty for native frames.
    pub module: String,
    /// 1-based line, 0 for native frames.
    pub line: u32,
    /// 1-based column, 0 for native frames.
    pub column: u32,
}

impl TraceFrame {
    pub fn native() -> Self {
        Self {
            function: "<native>".to_owned(),
            module: String::new(),
            line: 0,
            column: 0,
        }
    }
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            write!(f, "{}", self.function)
        } else {
            write!(f, "{} ({}:{}:{})", self.function, self.module, self.line, self.column)
        }
    }
}

/// An engine-raised exception that has not been materialised as a JS object.
///
/// Staying off the GC heap until a handler actually observes the error keeps
/// the unwind path allocation-free.
#[derive(Debug, Clone)]
pub(crate) struct JsException {
    pub kind: JsErrorKind,
    pub message: String,
    /// Innermost-first frames, appended as the unwind crosses frames.
    pub frames: Vec<TraceFrame>,
}

impl JsException {
    pub fn new(kind: JsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }
}

/// Runtime error propagated through the interpreter.
#[derive(Debug)]
pub(crate) enum RunError {
    /// Engine-raised JS error (TypeError, ReferenceError, ...).
    Exc(JsException),
    /// A user `throw` of an arbitrary value.
    Throw(Value, Vec<TraceFrame>),
    /// Engine invariant violation. Never catchable by JS handlers; indicates
    /// a VM or codegen bug.
    Internal(String),
    /// Cooperative interrupt requested by the host.
    Interrupted,
}

impl RunError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Exc(JsException::new(JsErrorKind::TypeError, message))
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::Exc(JsException::new(JsErrorKind::ReferenceError, message))
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::Exc(JsException::new(JsErrorKind::RangeError, message))
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::Exc(JsException::new(JsErrorKind::SyntaxError, message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Appends a trace frame if this error carries a stack.
    pub fn push_frame(&mut self, frame: TraceFrame) {
        match self {
            Self::Exc(exc) => exc.frames.push(frame),
            Self::Throw(_, frames) => frames.push(frame),
            Self::Internal(_) | Self::Interrupted => {}
        }
    }
}

/// The public exception type returned by `Context::eval` and friends.
///
/// `stack` is innermost-first; `Display` renders the conventional
/// `Name: message` line followed by one `    at frame` line per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// The `name` property: `"TypeError"`, `"SyntaxError"`, a custom error
    /// class name, or `"Uncaught"` for non-Error thrown values.
    pub name: String,
    pub message: String,
    pub stack: Vec<TraceFrame>,
    /// True when the host's cooperative interrupt flag stopped execution.
    pub interrupted: bool,
    /// True for engine invariant violations (never produced by well-formed
    /// bytecode).
    pub internal: bool,
}

impl Exception {
    pub(crate) fn from_kind(kind: JsErrorKind, message: String, stack: Vec<TraceFrame>) -> Self {
        Self {
            name: kind.to_string(),
            message,
            stack,
            interrupted: false,
            internal: false,
        }
    }

    pub(crate) fn internal(message: String) -> Self {
        Self {
            name: "InternalError".to_owned(),
            message,
            stack: Vec::new(),
            interrupted: false,
            internal: true,
        }
    }

    pub(crate) fn interrupted() -> Self {
        Self {
            name: "Interrupted".to_owned(),
            message: "execution interrupted by host".to_owned(),
            stack: Vec::new(),
            interrupted: true,
            internal: false,
        }
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)?;
        } else {
            write!(f, "{}: {}", self.name, self.message)?;
        }
        for frame in &self.stack {
            f.write_char('\n')?;
            write!(f, "    at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_names() {
        assert_eq!(JsErrorKind::TypeError.to_string(), "TypeError");
        assert_eq!(JsErrorKind::SyntaxError.to_string(), "SyntaxError");
    }

    #[test]
    fn exception_display_with_stack() {
        let exc = Exception::from_kind(
            JsErrorKind::TypeError,
            "x is not a function".to_owned(),
            vec![
                TraceFrame {
                    function: "inner".to_owned(),
                    module: "main".to_owned(),
                    line: 3,
                    column: 5,
                },
                TraceFrame::native(),
            ],
        );
        let rendered = exc.to_string();
        assert_eq!(
            rendered,
            "TypeError: x is not a function\n    at inner (main:3:5)\n    at <native>"
        );
    }
}

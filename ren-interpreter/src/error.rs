use crate::vm_objects::context::{Context, ContextError};
use ren_core::{Interner, SeriesError};
use std::fmt;

/// What went wrong, as the language sees it.
///
/// Each variant carries the words needed to explain it, already spelled out, so an error can be
/// reported after the universe that raised it is gone.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorId {
    #[error("{0} has no value")]
    NoValue(String),
    #[error("{0} word is not bound to a context")]
    NotBound(String),
    #[error("{label} is missing its {param} argument")]
    NoArg { label: String, param: String },
    #[error("{label} does not allow {kind} for its {param} argument")]
    ArgType { label: String, param: String, kind: String },
    #[error("{label} has no refinement called {refinement}")]
    BadRefine { label: String, refinement: String },
    #[error("return type {0} not allowed by the function")]
    BadReturnType(String),
    #[error("duplicate variable name: {0}")]
    DupVars(String),
    #[error("protected variable - cannot modify: {0}")]
    Protected(String),
    #[error("cannot use {0} on this value")]
    BadPath(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("math or number overflow")]
    Overflow,
    #[error("attempt to divide by zero")]
    ZeroDivide,
    #[error("stack overflow, more than {0} nested calls")]
    StackOverflow(usize),
    #[error("{0} needs a value")]
    NeedValue(String),
    #[error("{0} is not running")]
    NotRunning(String),
    #[error("frame was already invoked")]
    FrameUsed,
    #[error("no catch for throw: {0}")]
    NoCatch(String),
    #[error("cannot make {0}")]
    BadMake(String),
    #[error("cannot convert to {0}")]
    BadCast(String),
    #[error("cannot compare {0} with {1}")]
    Incomparable(String, String),
    #[error("invalid function spec: {0}")]
    BadFuncDef(String),
    #[error("{0}")]
    User(String),
    #[error("{0}")]
    Scan(String),
    #[error("halted by user or script")]
    Halted,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorId {
    /// The error category, as reported in `** <Category> Error`.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorId::Overflow | ErrorId::ZeroDivide => "math",
            ErrorId::Protected(_) => "access",
            ErrorId::Scan(_) => "syntax",
            ErrorId::User(_) => "user",
            ErrorId::StackOverflow(_) | ErrorId::Internal(_) => "internal",
            ErrorId::Halted => "halt",
            _ => "script",
        }
    }

    /// The id word of the error, as stored in an ERROR! context.
    pub fn id_name(&self) -> &'static str {
        match self {
            ErrorId::NoValue(_) => "no-value",
            ErrorId::NotBound(_) => "not-bound",
            ErrorId::NoArg { .. } => "no-arg",
            ErrorId::ArgType { .. } => "arg-type",
            ErrorId::BadRefine { .. } => "bad-refine",
            ErrorId::BadReturnType(_) => "bad-return-type",
            ErrorId::DupVars(_) => "dup-vars",
            ErrorId::Protected(_) => "protected-word",
            ErrorId::BadPath(_) => "bad-path-pick",
            ErrorId::OutOfRange(_) => "out-of-range",
            ErrorId::Overflow => "overflow",
            ErrorId::ZeroDivide => "zero-divide",
            ErrorId::StackOverflow(_) => "stack-overflow",
            ErrorId::NeedValue(_) => "need-non-null",
            ErrorId::NotRunning(_) => "frame-not-on-stack",
            ErrorId::FrameUsed => "frame-already-used",
            ErrorId::NoCatch(_) => "no-catch",
            ErrorId::BadMake(_) => "bad-make-arg",
            ErrorId::BadCast(_) => "bad-cast",
            ErrorId::Incomparable(..) => "invalid-compare",
            ErrorId::BadFuncDef(_) => "bad-func-def",
            ErrorId::User(_) => "message",
            ErrorId::Scan(_) => "scan-invalid",
            ErrorId::Halted => "halted",
            ErrorId::Internal(_) => "internal",
        }
    }
}

impl From<SeriesError> for ErrorId {
    fn from(err: SeriesError) -> Self {
        match err {
            SeriesError::OutOfRange { index, .. } => ErrorId::OutOfRange(index.to_string()),
            other => ErrorId::Protected(other.to_string()),
        }
    }
}

impl ContextError {
    /// Spells the error out for the language, naming the variable involved.
    pub fn explain(self, interner: &Interner) -> ErrorId {
        match self {
            ContextError::Duplicate(symbol) => ErrorId::DupVars(interner.reverse_lookup(symbol).to_string()),
            ContextError::Protected(symbol) => ErrorId::Protected(interner.reverse_lookup(symbol).to_string()),
            ContextError::Expired => ErrorId::NotRunning("expired frame".to_string()),
            ContextError::OutOfRange(index) => ErrorId::OutOfRange(index.to_string()),
            ContextError::Series(err) => err.into(),
        }
    }
}

/// An error raised while evaluating, with what is known about where it happened.
#[derive(Debug, Clone)]
pub struct RenError {
    pub id: ErrorId,
    /// The source around the failing expression, molded.
    pub near: Option<String>,
    /// Labels of the calls the error went through, innermost first.
    pub where_: Vec<String>,
    pub file: Option<String>,
    pub line: u32,
    /// The ERROR! value this was raised from, if user code made one.
    pub context: Option<Context>,
}

impl RenError {
    pub fn new(id: ErrorId) -> RenError {
        RenError { id, near: None, where_: Vec::new(), file: None, line: 0, context: None }
    }

    pub fn user(message: impl Into<String>) -> RenError {
        Self::new(ErrorId::User(message.into()))
    }

    pub fn is_halt(&self) -> bool {
        self.id == ErrorId::Halted
    }
}

impl From<ErrorId> for RenError {
    fn from(id: ErrorId) -> Self {
        RenError::new(id)
    }
}

impl fmt::Display for RenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = self.id.category();
        let mut chars = category.chars();
        let category: String = chars.next().map(|first| first.to_uppercase().chain(chars).collect()).unwrap_or_default();
        write!(f, "** {} Error: {}", category, self.id)?;
        if !self.where_.is_empty() {
            write!(f, "\n** Where: {}", self.where_.join(" "))?;
        }
        if let Some(near) = &self.near {
            write!(f, "\n** Near: {}", near)?;
        }
        if let Some(file) = &self.file {
            write!(f, "\n** File: {}", file)?;
        }
        if self.line > 0 {
            write!(f, "\n** Line: {}", self.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_like_a_console_report() {
        let mut err = RenError::new(ErrorId::NoValue("foo".to_string()));
        err.where_ = vec!["f".to_string(), "g".to_string()];
        err.near = Some("[foo + 1]".to_string());
        err.line = 3;
        assert_eq!(err.to_string(), "** Script Error: foo has no value\n** Where: f g\n** Near: [foo + 1]\n** Line: 3");
    }

    #[test]
    fn categories() {
        assert_eq!(ErrorId::ZeroDivide.category(), "math");
        assert_eq!(ErrorId::User("x".to_string()).to_string(), "x");
        assert_eq!(RenError::user("boom").to_string(), "** User Error: boom");
    }
}

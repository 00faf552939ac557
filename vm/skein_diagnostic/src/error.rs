//! Error values and factory constructors.

use std::fmt;

use skein_ir::SourcePos;

/// Result of evaluating one operation or native body.
pub type EvalResult<T = ()> = Result<T, Error>;

/// Structured error category.
///
/// Each failure mode of the VM maps to exactly one kind, enabling
/// programmatic matching (catch filters, tests) without string parsing.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorKind {
    /// Pop, peek, or return-count on an empty or too-small stack.
    StackUnderflow,
    /// Unresolved variable or constant.
    UnknownSymbol,
    /// No implementation matches the live argument types.
    DispatchFailure,
    /// Argument, return, binding, or comparison check failed in safe mode.
    TypeMismatch,
    /// Return count does not match the declaration.
    ArityMismatch,
    /// A recall's target no longer matches the live scope.
    RecallNotApplicable,
    /// Division by zero.
    DivisionByZero,
    /// Fewer handlers present than requested.
    HandlerPopFailure,
    /// A protocol operation the value's type does not support.
    UnsupportedOp,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::StackUnderflow => "stack underflow",
            ErrorKind::UnknownSymbol => "unknown symbol",
            ErrorKind::DispatchFailure => "dispatch failure",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::ArityMismatch => "arity mismatch",
            ErrorKind::RecallNotApplicable => "recall not applicable",
            ErrorKind::DivisionByZero => "division by zero",
            ErrorKind::HandlerPopFailure => "handler pop failure",
            ErrorKind::UnsupportedOp => "unsupported operation",
        };
        write!(f, "{s}")
    }
}

/// A reported runtime failure.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub pos: SourcePos,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, pos: SourcePos, message: impl Into<String>) -> Self {
        Error {
            kind,
            pos,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.message)
    }
}

impl std::error::Error for Error {}

// Factory constructors. Message wording follows the runtime's user-visible
// vocabulary and is asserted on by tests; change with care.

pub fn stack_underflow(pos: SourcePos) -> Error {
    Error::new(ErrorKind::StackUnderflow, pos, "Stack is empty")
}

pub fn unknown_var(pos: SourcePos, name: &str) -> Error {
    Error::new(ErrorKind::UnknownSymbol, pos, format!("Unknown var: {name}"))
}

pub fn unknown_const(pos: SourcePos, name: &str) -> Error {
    Error::new(
        ErrorKind::UnknownSymbol,
        pos,
        format!("Unknown const: {name}"),
    )
}

pub fn func_not_applicable(pos: SourcePos, name: &str) -> Error {
    Error::new(
        ErrorKind::DispatchFailure,
        pos,
        format!("Func not applicable: {name}"),
    )
}

pub fn type_mismatch(pos: SourcePos, expected: &str, actual: &str) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        pos,
        format!("Expected type {expected}, actual: {actual}"),
    )
}

pub fn return_type_mismatch(pos: SourcePos, expected: &str, actual: &str) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        pos,
        format!("Invalid return type.\nExpected {expected}, actual: {actual}"),
    )
}

pub fn comparison_failed(pos: SourcePos, left: &str, right: &str) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        pos,
        format!("Failed comparing {left} to {right}"),
    )
}

pub fn stack_not_empty_on_return(pos: SourcePos) -> Error {
    Error::new(ErrorKind::ArityMismatch, pos, "Stack not empty on return")
}

pub fn not_enough_return_values(pos: SourcePos) -> Error {
    Error::new(
        ErrorKind::ArityMismatch,
        pos,
        "Not enough return values on stack",
    )
}

pub fn recall_not_applicable(pos: SourcePos) -> Error {
    Error::new(ErrorKind::RecallNotApplicable, pos, "Recall not applicable")
}

pub fn recall_outside_call(pos: SourcePos) -> Error {
    Error::new(
        ErrorKind::RecallNotApplicable,
        pos,
        "Recall outside function call",
    )
}

pub fn division_by_zero(pos: SourcePos) -> Error {
    Error::new(ErrorKind::DivisionByZero, pos, "Division by zero")
}

pub fn handler_pop_failure(pos: SourcePos) -> Error {
    Error::new(ErrorKind::HandlerPopFailure, pos, "Failed popping catch")
}

pub fn op_not_supported(pos: SourcePos, op: &str, type_name: &str) -> Error {
    Error::new(
        ErrorKind::UnsupportedOp,
        pos,
        format!("Operation {op} not supported for type {type_name}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn factory_messages() {
        let pos = SourcePos::new(1, 2);
        assert_eq!(stack_underflow(pos).message, "Stack is empty");
        assert_eq!(unknown_var(pos, "x").message, "Unknown var: x");
        assert_eq!(
            func_not_applicable(pos, "+").message,
            "Func not applicable: +"
        );
        assert_eq!(
            type_mismatch(pos, "Int", "Sym").message,
            "Expected type Int, actual: Sym"
        );
        assert_eq!(division_by_zero(pos).kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn display_includes_position() {
        let err = stack_underflow(SourcePos::new(3, 4));
        assert_eq!(err.to_string(), "row 3, col 4: Stack is empty");
    }
}

//! Skein Diagnostic - error taxonomy and reporting for the Skein VM.
//!
//! Every runtime failure is an [`Error`]: a structured [`ErrorKind`], the
//! source position it occurred at, and a rendered message. Failures are
//! appended to the VM's accumulating [`Errors`] list; the interpreter loop
//! checks that list's emptiness to decide overall success.
//!
//! Factory functions (e.g. [`stack_underflow`], [`func_not_applicable`])
//! are the public construction API; they keep message wording in one place.

mod error;
mod errors;

pub use error::{Error, ErrorKind, EvalResult};
pub use errors::Errors;

pub use error::{
    comparison_failed, division_by_zero, func_not_applicable, handler_pop_failure,
    not_enough_return_values, op_not_supported, recall_not_applicable, recall_outside_call,
    return_type_mismatch, stack_not_empty_on_return, stack_underflow, type_mismatch,
    unknown_const, unknown_var,
};

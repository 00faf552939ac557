//! C Code Emission Backend for the Skein VM
//!
//! The secondary realization of operation semantics: instead of executing
//! ops, emit equivalent procedural C that calls the same runtime entry
//! points the interpreter uses — so compiled output cannot diverge from
//! interpreted behavior. Emission also computes the referenced funcs,
//! implementations, types, and symbols per op, so a minimal self-contained
//! translation unit can be assembled for the reachable code.
//!
//! # Architecture
//!
//! ```text
//! Bin (op sequence)
//!       ↓
//!   CEmitter        (per-op C statements, labeled by pc)
//!       ↓
//! CodegenResult     (C source + any errors)
//!       +
//! CodegenContext    (referenced funcs/fimps/types/syms)
//! ```
//!
//! Operation kinds the interpreter supports but emission does not (ELSE,
//! JUMP, FIMPDEF, STASH) report "Emit not implemented" rather than
//! inventing behavior the interpreter lacks.

mod c;
mod context;

pub use c::CEmitter;
pub use context::CodegenContext;

/// Result of code generation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodegenResult {
    /// Generated C code (empty if errors occurred).
    pub code: String,
    /// Errors encountered during codegen.
    pub errors: Vec<CodegenError>,
    /// Whether codegen succeeded.
    pub success: bool,
}

impl CodegenResult {
    /// Create a successful result with generated code.
    pub fn success(code: String) -> Self {
        Self {
            code,
            errors: Vec::new(),
            success: true,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: String::new(),
            errors: vec![CodegenError {
                message: message.into(),
            }],
            success: false,
        }
    }

    /// Check if codegen failed.
    pub fn has_errors(&self) -> bool {
        !self.success || !self.errors.is_empty()
    }
}

/// A code generation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodegenError {
    pub message: String,
}

impl std::fmt::Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CodegenError {}

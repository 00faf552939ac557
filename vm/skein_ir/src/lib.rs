//! Skein IR - shared instruction-stream types for the Skein VM.
//!
//! This crate holds the vocabulary every other VM crate speaks:
//!
//! - `Sym` / `SymTable`: interned symbol identifiers
//! - `SourcePos`: row/column positions for diagnostics
//! - `TypeId`, `FuncId`, `FimpId`: compact registry handles
//! - `Op` / `OpKind` / `Lit`: tagged operation records
//! - `Bin`: the linear, append-only operation sequence
//!
//! The compiler stage that produces `Bin`s is an external collaborator;
//! this crate only defines the format it targets.

mod bin;
mod ids;
mod interner;
mod op;
mod pos;
mod sym;

pub use bin::Bin;
pub use ids::{FimpId, FuncId, TypeId};
pub use interner::SymTable;
pub use op::{Lit, Op, OpKind};
pub use pos::SourcePos;
pub use sym::Sym;

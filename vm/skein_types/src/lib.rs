//! Skein Types - the runtime type graph and multimethod dispatch.
//!
//! # Architecture
//!
//! - `TagSet`: the bit-vector subtype cache, the performance-critical
//!   derived structure behind O(1) `is` queries
//! - `ProtoOps`: per-type protocol capability flags, computed at
//!   registration time
//! - `TypeStore`: tag allocation, multiple-inheritance `derive` with full
//!   transitive-closure maintenance, `is`, and the narrow `reinit` teardown
//! - `Func` / `Fimp`: named multimethods and their type-guarded
//!   implementations, with specificity-based resolution
//!
//! The type graph is a DAG, not a tree: diamond inheritance is legal, and
//! `derive` must produce the same closure regardless of edge-insertion
//! order.

mod func;
mod graph;
mod proto;
mod tag_set;

pub use func::{Arg, Fimp, FimpBody, Func, FuncStore, NativeId, Ret};
pub use graph::{Type, TypeStore};
pub use proto::ProtoOps;
pub use tag_set::TagSet;

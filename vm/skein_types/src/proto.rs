//! Per-type protocol capability flags.
//!
//! Computed once at type registration, queried O(1). A type that does not
//! carry the flag for a protocol operation causes an explicit reported
//! failure when that operation is attempted, never a silent default.

use bitflags::bitflags;

bitflags! {
    /// Which protocol operations a type supports.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct ProtoOps: u16 {
        /// Default construction.
        const NEW = 1 << 0;
        /// Value equality.
        const EQVAL = 1 << 1;
        /// Identity equality.
        const EQUID = 1 << 2;
        /// Ordering comparison.
        const CMP = 1 << 3;
        /// Truthiness.
        const OK = 1 << 4;
        /// Invocation through the call protocol.
        const CALL = 1 << 5;
        /// Reference copy.
        const COPY = 1 << 6;
        /// Deep copy.
        const CLONE = 1 << 7;
        /// Element iteration.
        const ITER = 1 << 8;
        /// Serialized (re-readable) output.
        const WRITE = 1 << 9;
        /// Readable debug output.
        const DUMP = 1 << 10;
        /// Raw display output.
        const PRINT = 1 << 11;
        /// Literal emission in the codegen backend.
        const EMIT = 1 << 12;
        /// Reference release.
        const DEINIT = 1 << 13;
    }
}

impl ProtoOps {
    /// The baseline every registered type gets: comparison-free value
    /// plumbing (copy, equality, truthiness, rendering).
    pub fn baseline() -> Self {
        ProtoOps::EQVAL
            | ProtoOps::EQUID
            | ProtoOps::OK
            | ProtoOps::COPY
            | ProtoOps::WRITE
            | ProtoOps::DUMP
            | ProtoOps::PRINT
            | ProtoOps::DEINIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_excludes_call_and_iter() {
        let base = ProtoOps::baseline();
        assert!(base.contains(ProtoOps::COPY));
        assert!(!base.contains(ProtoOps::CALL));
        assert!(!base.contains(ProtoOps::ITER));
    }
}

//! Activation records.

use skein_ir::{FimpId, SourcePos};

/// One activation of a function implementation.
#[derive(Copy, Clone, Debug)]
pub struct Call {
    /// The implementation being executed.
    pub target: FimpId,
    /// Where the call happened, for diagnostics.
    pub pos: SourcePos,
    /// Where to resume on normal return; `None` halts the driving loop
    /// (top-level or nested-invocation boundary).
    pub return_pc: Option<usize>,
    /// Pending self-recursive retries; nonzero makes the next RETURN
    /// restart the body instead of returning.
    pub recalls: u32,
}

impl Call {
    pub fn new(target: FimpId, pos: SourcePos, return_pc: Option<usize>) -> Self {
        Call {
            target,
            pos,
            return_pc,
            recalls: 0,
        }
    }
}

//! Closures.

use std::rc::Rc;

use skein_ir::Bin;

use crate::Scope;

/// A closure: an op range within a compiled sequence plus the scope it
/// closes over.
///
/// The range is skipped during normal flow and only executed when the
/// closure is invoked; invocation runs the body *in* the captured scope
/// (the body's own BEGIN/END ops create any nested scopes it needs).
pub struct Lambda {
    pub bin: Rc<Bin>,
    pub start: usize,
    pub len: usize,
    pub scope: Rc<Scope>,
}

impl Lambda {
    pub fn new(bin: Rc<Bin>, start: usize, len: usize, scope: Rc<Scope>) -> Self {
        Lambda {
            bin,
            start,
            len,
            scope,
        }
    }

    /// One past the last op of the body.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

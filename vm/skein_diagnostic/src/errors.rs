//! The accumulating error list.

use crate::Error;

/// Process-wide (per-VM) accumulating error list.
///
/// Every failure is appended here in addition to propagating as a
/// `Result`; embedders inspect the list after a run for full context.
#[derive(Default, Debug)]
pub struct Errors {
    list: Vec<Error>,
}

impl Errors {
    pub fn new() -> Self {
        Errors { list: Vec::new() }
    }

    pub fn push(&mut self, err: Error) {
        self.list.push(err);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.list.iter()
    }

    pub fn last(&self) -> Option<&Error> {
        self.list.last()
    }

    /// Drain all recorded errors, leaving the list empty.
    pub fn take(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.list)
    }
}

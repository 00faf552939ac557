//! Lexical execution contexts.
//!
//! A scope owns its operand stack and variable bindings exclusively;
//! values are shared across scopes only through the copy/clone protocol.
//! Scopes themselves are reference counted (`Rc`): captured by closures
//! and implementation definitions, released on block exit, finalized when
//! the last reference drops.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use skein_diagnostic::ErrorKind;
use skein_ir::Sym;

use crate::Value;

/// A pending error handler.
///
/// Pushed with a handler value, an optional error-kind filter (`None`
/// catches everything), and the pc to resume at when the handler arms.
/// `armed` is set by the loop's recovery pass; armed handlers run as they
/// are discarded by `pop_catch`, so they fire even when control leaves the
/// scope abnormally.
pub struct Catch {
    pub kind: Option<ErrorKind>,
    pub handler: Value,
    pub resume_pc: usize,
    pub armed: bool,
}

/// A lexically chained execution context.
pub struct Scope {
    stack: RefCell<Vec<Value>>,
    vars: RefCell<FxHashMap<Sym, Value>>,
    parents: RefCell<SmallVec<[Rc<Scope>; 1]>>,
    catches: RefCell<Vec<Catch>>,
    safe: bool,
}

impl Scope {
    /// Create a root scope with an explicit safety mode.
    pub fn root(safe: bool) -> Rc<Scope> {
        Rc::new(Scope {
            stack: RefCell::new(Vec::new()),
            vars: RefCell::new(FxHashMap::default()),
            parents: RefCell::new(SmallVec::new()),
            catches: RefCell::new(Vec::new()),
            safe,
        })
    }

    /// Create a child scope.
    ///
    /// The safe flag is supplied by the VM from the currently innermost
    /// live scope (not necessarily `parent`) and never changes afterward.
    pub fn new(parent: Option<Rc<Scope>>, safe: bool) -> Rc<Scope> {
        let scope = Scope::root(safe);
        if let Some(p) = parent {
            scope.add_parent(p);
        }
        scope
    }

    /// Add another ancestor; lexical nesting is not strictly tree-shaped.
    pub fn add_parent(&self, parent: Rc<Scope>) {
        self.parents.borrow_mut().push(parent);
    }

    /// Whether runtime type-conformance checks apply in this scope.
    #[inline]
    pub fn safe(&self) -> bool {
        self.safe
    }

    // Operand stack

    pub fn push(&self, v: Value) {
        self.stack.borrow_mut().push(v);
    }

    /// Remove and return the top value, or `None` on an empty stack (the
    /// VM turns that into a reported StackUnderflow unless silent).
    pub fn pop(&self) -> Option<Value> {
        self.stack.borrow_mut().pop()
    }

    /// Read the top value without removing it.
    pub fn peek(&self) -> Option<Value> {
        self.stack.borrow().last().cloned()
    }

    #[inline]
    pub fn stack_len(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Move the entire operand stack out, leaving it empty.
    pub fn take_stack(&self) -> Vec<Value> {
        std::mem::take(&mut *self.stack.borrow_mut())
    }

    /// Drop every value on the operand stack.
    pub fn clear_stack(&self) {
        self.stack.borrow_mut().clear();
    }

    /// Append values in order, preserving their relative positions.
    pub fn push_all(&self, values: Vec<Value>) {
        self.stack.borrow_mut().extend(values);
    }

    /// Run a closure over the live stack contents.
    pub fn with_stack<R>(&self, f: impl FnOnce(&[Value]) -> R) -> R {
        f(&self.stack.borrow())
    }

    // Variables

    /// Find the nearest binding: local first, then each parent depth-first.
    /// Returns a copy (reference increment for heap payloads).
    pub fn get_var(&self, id: Sym) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(&id) {
            return Some(v.clone());
        }
        for parent in self.parents.borrow().iter() {
            if let Some(v) = parent.get_var(id) {
                return Some(v);
            }
        }
        None
    }

    /// Insert or replace in the local mapping only; a replaced value is
    /// finalized here.
    pub fn put_var(&self, id: Sym, v: Value) {
        self.vars.borrow_mut().insert(id, v);
    }

    pub fn var_count(&self) -> usize {
        self.vars.borrow().len()
    }

    // Error handlers

    pub fn push_catch(&self, catch: Catch) {
        self.catches.borrow_mut().push(catch);
    }

    /// Remove and return the top handler record.
    pub fn pop_catch_record(&self) -> Option<Catch> {
        self.catches.borrow_mut().pop()
    }

    #[inline]
    pub fn catches_len(&self) -> usize {
        self.catches.borrow().len()
    }

    /// Arm the topmost un-armed handler matching `kind`, returning its
    /// resume pc.
    pub fn arm_catch(&self, kind: ErrorKind) -> Option<usize> {
        let mut catches = self.catches.borrow_mut();
        for c in catches.iter_mut().rev() {
            if c.armed {
                continue;
            }
            if c.kind.is_none() || c.kind == Some(kind) {
                c.armed = true;
                return Some(c.resume_pc);
            }
        }
        None
    }
}

//! Runtime values and the type-protocol operations.
//!
//! `Value` is a closed enum; protocol operations dispatch by `match`
//! instead of per-type function-pointer tables. Heap payloads (`Str`,
//! `Stack`, `Lambda`) are `Rc`-counted: the protocol `copy` is an `Rc`
//! clone and dropping a value releases one reference, finalizing the
//! payload exactly once when the count reaches zero.
//!
//! Operations that can fail on unsupported types (`call`, `iter`) are VM
//! entry points gated by the type's `ProtoOps`; the total operations
//! (`ok`, equality, `cmp`, rendering) live here.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use skein_ir::{FimpId, FuncId, Lit, Sym, SymTable, TypeId};

use crate::vm::CoreTypes;
use crate::{Lambda, Rat};

/// Comparison outcome of the `cmp` protocol operation.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Cmp {
    Lt,
    Eq,
    Gt,
    /// The operands have no defined order.
    Unordered,
}

/// A runtime value: payload plus (via `type_of`) its owning type.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Sym(Sym),
    Rat(Rat),
    Str(Rc<str>),
    Stack(Rc<RefCell<Vec<Value>>>),
    Lambda(Rc<Lambda>),
    /// A registered type, as a first-class value.
    Type(TypeId),
    /// A multimethod reference.
    Func(FuncId),
    /// A single-implementation reference.
    Fimp(FimpId),
}

impl Value {
    /// Box a vector of values into a stack value.
    pub fn stack_of(items: Vec<Value>) -> Value {
        Value::Stack(Rc::new(RefCell::new(items)))
    }

    /// Rehydrate an op-stream literal.
    pub fn from_lit(lit: &Lit) -> Value {
        match lit {
            Lit::Nil => Value::Nil,
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Int(i) => Value::Int(*i),
            Lit::Sym(s) => Value::Sym(*s),
            Lit::Str(s) => Value::Str(Rc::from(&**s)),
            Lit::Func(id) => Value::Func(*id),
            Lit::Fimp(id) => Value::Fimp(*id),
            Lit::Type(id) => Value::Type(*id),
        }
    }

    /// The value's owning type. Exactly one type per value at any time.
    pub fn type_of(&self, core: &CoreTypes) -> TypeId {
        match self {
            Value::Nil => core.nil,
            Value::Bool(_) => core.bool_,
            Value::Int(_) => core.int,
            Value::Sym(_) => core.sym,
            Value::Rat(_) => core.rat,
            Value::Str(_) => core.str_,
            Value::Stack(_) => core.stack,
            Value::Lambda(_) => core.lambda,
            Value::Type(_) => core.meta,
            Value::Func(_) => core.func,
            Value::Fimp(_) => core.fimp,
        }
    }

    /// Truthiness. Each type defines its own "empty"/"absent" notion.
    pub fn ok(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Rat(r) => !r.is_zero(),
            Value::Str(s) => !s.is_empty(),
            Value::Stack(s) => !s.borrow().is_empty(),
            Value::Sym(_) | Value::Lambda(_) | Value::Type(_) | Value::Func(_) | Value::Fimp(_) => {
                true
            }
        }
    }

    /// Identity equality: pointer equality for heap payloads, bit equality
    /// for primitives.
    pub fn eq_id(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Sym(a), Value::Sym(b)) => a == b,
            (Value::Rat(a), Value::Rat(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Stack(a), Value::Stack(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a == b,
            (Value::Fimp(a), Value::Fimp(b)) => a == b,
            _ => false,
        }
    }

    /// Value equality: structural where the payload allows it, identity
    /// where it does not (closures).
    pub fn eq_val(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Stack(a), Value::Stack(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_val(y))
            }
            _ => self.eq_id(other),
        }
    }

    /// Ordering comparison; values of different kinds are unordered.
    pub fn cmp_val(&self, other: &Value) -> Cmp {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.cmp(b) {
                std::cmp::Ordering::Less => Cmp::Lt,
                std::cmp::Ordering::Equal => Cmp::Eq,
                std::cmp::Ordering::Greater => Cmp::Gt,
            },
            (Value::Rat(a), Value::Rat(b)) => a.cmp_rat(b),
            (Value::Str(a), Value::Str(b)) => match a.cmp(b) {
                std::cmp::Ordering::Less => Cmp::Lt,
                std::cmp::Ordering::Equal => Cmp::Eq,
                std::cmp::Ordering::Greater => Cmp::Gt,
            },
            (Value::Bool(a), Value::Bool(b)) => match a.cmp(b) {
                std::cmp::Ordering::Less => Cmp::Lt,
                std::cmp::Ordering::Equal => Cmp::Eq,
                std::cmp::Ordering::Greater => Cmp::Gt,
            },
            _ => Cmp::Unordered,
        }
    }

    /// Deep copy: new payload for values with mutable interior, reference
    /// copy otherwise.
    pub fn clone_deep(&self) -> Value {
        match self {
            Value::Stack(s) => {
                let items = s.borrow().iter().map(Value::clone_deep).collect();
                Value::stack_of(items)
            }
            Value::Str(s) => Value::Str(Rc::from(&**s)),
            other => other.clone(),
        }
    }

    /// Readable rendering; the symbol table is needed to render `Sym`s and
    /// registry references by name.
    pub fn dump(&self, syms: &SymTable) -> String {
        match self {
            Value::Nil => "#nil".to_string(),
            Value::Bool(b) => if *b { "#t" } else { "#f" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Sym(s) => format!("`{}", syms.resolve(*s)),
            Value::Rat(r) => r.to_string(),
            Value::Str(s) => format!("'{s}'"),
            Value::Stack(s) => {
                let inner: Vec<String> = s.borrow().iter().map(|v| v.dump(syms)).collect();
                format!("[{}]", inner.join(" "))
            }
            Value::Lambda(l) => format!("Lambda({}@{})", l.start, l.len),
            Value::Type(t) => format!("Type({})", t.raw()),
            Value::Func(f) => format!("Func({})", f.raw()),
            Value::Fimp(f) => format!("Fimp({} {})", f.func.raw(), f.idx),
        }
    }

    /// Raw rendering: like `dump`, but strings print without quoting.
    pub fn print(&self, syms: &SymTable) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.dump(syms),
        }
    }

    /// Re-readable rendering. Currently the same surface as `dump`.
    pub fn write_form(&self, syms: &SymTable) -> String {
        self.dump(syms)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_val(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Sym(s) => write!(f, "Sym({})", s.raw()),
            Value::Rat(r) => write!(f, "Rat({r})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Stack(s) => write!(f, "Stack({:?})", s.borrow()),
            Value::Lambda(l) => write!(f, "Lambda({}+{})", l.start, l.len),
            Value::Type(t) => write!(f, "{t:?}"),
            Value::Func(id) => write!(f, "{id:?}"),
            Value::Fimp(id) => write!(f, "{id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.ok());
        assert!(!Value::Int(0).ok());
        assert!(Value::Int(-1).ok());
        assert!(!Value::stack_of(vec![]).ok());
        assert!(Value::stack_of(vec![Value::Nil]).ok());
        assert!(!Value::Str(Rc::from("")).ok());
    }

    #[test]
    fn identity_vs_value_equality() {
        let a = Value::stack_of(vec![Value::Int(1)]);
        let b = Value::stack_of(vec![Value::Int(1)]);
        assert!(a.eq_val(&b));
        assert!(!a.eq_id(&b));
        let c = a.clone(); // protocol copy
        assert!(a.eq_id(&c));
    }

    #[test]
    fn clone_deep_detaches_payload() {
        let a = Value::stack_of(vec![Value::Int(1)]);
        let b = a.clone_deep();
        if let (Value::Stack(x), Value::Stack(y)) = (&a, &b) {
            assert!(!Rc::ptr_eq(x, y));
            x.borrow_mut().push(Value::Int(2));
            assert_eq!(y.borrow().len(), 1);
        } else {
            panic!("expected stacks");
        }
    }

    #[test]
    fn cross_kind_comparison_is_unordered() {
        let sym = Value::Sym(Sym::EMPTY);
        assert_eq!(Value::Int(1).cmp_val(&sym), Cmp::Unordered);
        assert_eq!(Value::Int(1).cmp_val(&Value::Int(2)), Cmp::Lt);
    }
}

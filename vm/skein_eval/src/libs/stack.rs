//! Stack-value and stack-manipulation natives.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use skein_diagnostic::{comparison_failed, type_mismatch, Error, ErrorKind, EvalResult};
use skein_types::{Arg, Ret};

use crate::{Cmp, Value, Vm};

fn pop_stack(vm: &mut Vm) -> EvalResult<Rc<RefCell<Vec<Value>>>> {
    let pos = vm.pos();
    match vm.pop()? {
        Value::Stack(s) => Ok(s),
        other => {
            let t = vm.type_of(&other);
            Err(type_mismatch(pos, "Stack", vm.type_name(t)))
        }
    }
}

fn len_imp(vm: &mut Vm) -> EvalResult {
    let s = pop_stack(vm)?;
    let len = s.borrow().len();
    vm.push(Value::Int(len as i64));
    Ok(())
}

fn push_imp(vm: &mut Vm) -> EvalResult {
    let val = vm.pop()?;
    let s = pop_stack(vm)?;
    s.borrow_mut().push(val);
    Ok(())
}

fn pop_imp(vm: &mut Vm) -> EvalResult {
    let s = pop_stack(vm)?;
    let out = s.borrow_mut().pop().unwrap_or(Value::Nil);
    vm.push(out);
    Ok(())
}

fn seq_imp(vm: &mut Vm) -> EvalResult {
    let v = vm.pop()?;
    let items = vm.iter_value(&v)?;
    vm.push(Value::stack_of(items));
    Ok(())
}

fn clear_imp(vm: &mut Vm) -> EvalResult {
    let s = pop_stack(vm)?;
    s.borrow_mut().clear();
    Ok(())
}

fn sort_imp(vm: &mut Vm) -> EvalResult {
    let cmp = vm.pop()?;
    let s = pop_stack(vm)?;

    let mut items: Vec<Value> = s.borrow_mut().drain(..).collect();
    let lt = vm.syms.intern("<");
    let gt = vm.syms.intern(">");
    let safe = vm.scope().safe();
    let mut first_err: Option<Error> = None;

    items.sort_by(|x, y| {
        if first_err.is_some() {
            return Ordering::Equal;
        }
        if matches!(cmp, Value::Nil) {
            // default comparison: in safe mode the operands must be
            // mutually subtyped, otherwise the sort is ill-formed
            let (tx, ty) = (vm.type_of(x), vm.type_of(y));
            if safe && !(vm.types.is(tx, ty) || vm.types.is(ty, tx)) {
                first_err = Some(comparison_failed(
                    vm.pos(),
                    vm.type_name(tx),
                    vm.type_name(ty),
                ));
                return Ordering::Equal;
            }
            match x.cmp_val(y) {
                Cmp::Lt => Ordering::Less,
                Cmp::Gt => Ordering::Greater,
                Cmp::Eq | Cmp::Unordered => Ordering::Equal,
            }
        } else {
            // comparator callback: returns an order symbol, `<` or `>`
            vm.push(x.clone());
            vm.push(y.clone());
            if let Err(e) = vm.call_value(&cmp) {
                first_err = Some(e);
                return Ordering::Equal;
            }
            match vm.pop() {
                Ok(Value::Sym(s)) if s == lt => Ordering::Less,
                Ok(Value::Sym(s)) if s == gt => Ordering::Greater,
                Ok(Value::Sym(_)) => Ordering::Equal,
                Ok(other) => {
                    let t = vm.type_of(&other);
                    first_err = Some(type_mismatch(vm.pos(), "Sym", vm.type_name(t)));
                    Ordering::Equal
                }
                Err(e) => {
                    first_err = Some(e);
                    Ordering::Equal
                }
            }
        }
    });

    s.borrow_mut().extend(items);
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn reset_imp(vm: &mut Vm) -> EvalResult {
    vm.scope().clear_stack();
    Ok(())
}

fn zap_imp(vm: &mut Vm) -> EvalResult {
    vm.pop()?;
    Ok(())
}

fn copy_imp(vm: &mut Vm) -> EvalResult {
    let v = vm.peek()?;
    vm.push(v);
    Ok(())
}

fn clone_imp(vm: &mut Vm) -> EvalResult {
    let v = vm.peek()?;
    vm.push(v.clone_deep());
    Ok(())
}

fn flip_imp(vm: &mut Vm) -> EvalResult {
    let pos = vm.pos();
    if vm.scope().stack_len() < 2 {
        return Err(Error::new(ErrorKind::StackUnderflow, pos, "Nothing to flip"));
    }
    let y = vm.pop()?;
    let x = vm.pop()?;
    vm.push(y);
    vm.push(x);
    Ok(())
}

/// Register the stack funcs.
pub fn install(vm: &mut Vm) {
    let any = vm.core.any;
    let opt = vm.core.opt;
    let int = vm.core.int;
    let seq = vm.core.seq;
    let stack = vm.core.stack;
    let vec = vm.syms.intern("vec");
    let val = vm.syms.intern("val");
    let inn = vm.syms.intern("in");
    let cmp = vm.syms.intern("cmp");
    let v = vm.syms.intern("v");
    let x = vm.syms.intern("x");
    let y = vm.syms.intern("y");

    vm.add_cfunc("len", [Arg::new(vec, stack)], [Ret::Type(int)], len_imp);
    vm.add_cfunc(
        "push",
        [Arg::new(vec, stack), Arg::new(val, any)],
        [],
        push_imp,
    );
    vm.add_cfunc("pop", [Arg::new(vec, stack)], [Ret::Type(opt)], pop_imp);
    vm.add_cfunc("stack", [Arg::new(inn, seq)], [Ret::Type(stack)], seq_imp);
    vm.add_cfunc("clear", [Arg::new(vec, stack)], [], clear_imp);
    vm.add_cfunc(
        "sort",
        [Arg::new(vec, stack), Arg::new(cmp, opt)],
        [],
        sort_imp,
    );

    vm.add_cfunc("|", [], [], reset_imp);
    vm.add_cfunc("_", [], [], zap_imp);
    vm.add_cfunc("%", [Arg::new(v, opt)], [Ret::SameAsArg(0)], copy_imp);
    vm.add_cfunc("%%", [Arg::new(v, opt)], [Ret::SameAsArg(0)], clone_imp);
    vm.add_cfunc(
        "~",
        [Arg::new(x, opt), Arg::new(y, opt)],
        [Ret::SameAsArg(1), Ret::SameAsArg(0)],
        flip_imp,
    );
}

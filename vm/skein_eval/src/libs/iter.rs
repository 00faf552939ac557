//! Iteration natives.

use skein_diagnostic::EvalResult;
use skein_types::{Arg, Ret};

use crate::{Value, Vm};

fn for_imp(vm: &mut Vm) -> EvalResult {
    let act = vm.pop()?;
    let seq = vm.pop()?;

    for v in vm.iter_value(&seq)? {
        vm.push(v);
        vm.call_value(&act)?;
    }
    Ok(())
}

fn sum_imp(vm: &mut Vm) -> EvalResult {
    let seq = vm.pop()?;
    let mut total: i64 = 0;
    for v in vm.iter_value(&seq)? {
        if let Value::Int(i) = v {
            total += i;
        }
    }
    vm.push(Value::Int(total));
    Ok(())
}

/// Register the iteration funcs.
pub fn install(vm: &mut Vm) {
    let seq = vm.core.seq;
    let any = vm.core.any;
    let int = vm.core.int;
    let inn = vm.syms.intern("in");
    let act = vm.syms.intern("act");

    vm.add_cfunc(
        "for",
        [Arg::new(inn, seq), Arg::new(act, any)],
        [],
        for_imp,
    );
    vm.add_cfunc("sum", [Arg::new(inn, seq)], [Ret::Type(int)], sum_imp);
}

//! Integer and rational arithmetic natives.

use skein_diagnostic::{division_by_zero, EvalResult};
use skein_types::{Arg, Ret};

use crate::{Rat, Value, Vm};

fn inc_imp(vm: &mut Vm) -> EvalResult {
    let v = vm.pop_int()?;
    vm.push(Value::Int(v + 1));
    Ok(())
}

fn dec_imp(vm: &mut Vm) -> EvalResult {
    let v = vm.pop_int()?;
    vm.push(Value::Int(v - 1));
    Ok(())
}

fn int_add_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_int()?;
    let x = vm.pop_int()?;
    vm.push(Value::Int(x + y));
    Ok(())
}

fn int_sub_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_int()?;
    let x = vm.pop_int()?;
    vm.push(Value::Int(x - y));
    Ok(())
}

fn int_mul_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_int()?;
    let x = vm.pop_int()?;
    vm.push(Value::Int(x * y));
    Ok(())
}

fn int_div_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_int()?;
    let x = vm.pop_int()?;

    if y == 0 {
        return Err(division_by_zero(vm.pos()));
    }

    let neg = (x >= 0 || y > 0) && (x < 0 || y < 0);
    vm.push(Value::Rat(Rat::new(x.unsigned_abs(), y.unsigned_abs(), neg)));
    Ok(())
}

fn int_mod_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_int()?;
    let x = vm.pop_int()?;

    if y == 0 {
        return Err(division_by_zero(vm.pos()));
    }

    vm.push(Value::Int(x % y));
    Ok(())
}

fn int_abs_imp(vm: &mut Vm) -> EvalResult {
    let v = vm.pop_int()?;
    vm.push(Value::Int(v.abs()));
    Ok(())
}

fn rat_add_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_rat()?;
    let x = vm.pop_rat()?;
    vm.push(Value::Rat(x.add(y)));
    Ok(())
}

fn rat_mul_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_rat()?;
    let x = vm.pop_rat()?;
    vm.push(Value::Rat(x.mul(y)));
    Ok(())
}

fn rat_scale_imp(vm: &mut Vm) -> EvalResult {
    let y = vm.pop_int()?;
    let x = vm.pop_rat()?;
    vm.push(Value::Rat(x.scale(y)));
    Ok(())
}

fn rat_int_imp(vm: &mut Vm) -> EvalResult {
    let r = vm.pop_rat()?;
    vm.push(Value::Int(r.trunc()));
    Ok(())
}

/// Register the arithmetic funcs.
pub fn install(vm: &mut Vm) {
    let int = vm.core.int;
    let rat = vm.core.rat;
    let v = vm.syms.intern("v");
    let x = vm.syms.intern("x");
    let y = vm.syms.intern("y");
    let n = vm.syms.intern("n");
    let r = vm.syms.intern("r");

    vm.add_cfunc("++", [Arg::new(v, int)], [Ret::Type(int)], inc_imp);
    vm.add_cfunc("--", [Arg::new(v, int)], [Ret::Type(int)], dec_imp);

    vm.add_cfunc(
        "+",
        [Arg::new(x, int), Arg::new(y, int)],
        [Ret::Type(int)],
        int_add_imp,
    );
    vm.add_cfunc(
        "-",
        [Arg::new(x, int), Arg::new(y, int)],
        [Ret::Type(int)],
        int_sub_imp,
    );
    vm.add_cfunc(
        "*",
        [Arg::new(x, int), Arg::new(y, int)],
        [Ret::Type(int)],
        int_mul_imp,
    );
    vm.add_cfunc(
        "/",
        [Arg::new(x, int), Arg::new(y, int)],
        [Ret::Type(rat)],
        int_div_imp,
    );
    vm.add_cfunc(
        "mod",
        [Arg::new(x, int), Arg::new(y, int)],
        [Ret::Type(int)],
        int_mod_imp,
    );
    vm.add_cfunc("abs", [Arg::new(n, int)], [Ret::Type(int)], int_abs_imp);

    vm.add_cfunc(
        "+",
        [Arg::new(x, rat), Arg::new(y, rat)],
        [Ret::Type(rat)],
        rat_add_imp,
    );
    vm.add_cfunc(
        "*",
        [Arg::new(x, rat), Arg::new(y, rat)],
        [Ret::Type(rat)],
        rat_mul_imp,
    );
    vm.add_cfunc(
        "*",
        [Arg::new(x, rat), Arg::new(y, int)],
        [Ret::Type(rat)],
        rat_scale_imp,
    );
    vm.add_cfunc("int", [Arg::new(r, rat)], [Ret::Type(int)], rat_int_imp);
}

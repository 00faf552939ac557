//! Type-protocol natives.

use skein_diagnostic::{type_mismatch, EvalResult};
use skein_types::{Arg, Ret};

use crate::{Value, Vm};

fn new_imp(vm: &mut Vm) -> EvalResult {
    let pos = vm.pos();
    match vm.pop()? {
        Value::Type(t) => {
            let v = vm.new_value(t)?;
            vm.push(v);
            Ok(())
        }
        other => {
            let actual = vm.type_of(&other);
            Err(type_mismatch(pos, "Type", vm.type_name(actual)))
        }
    }
}

/// Register `new`: construct a default instance of a type value.
pub fn install(vm: &mut Vm) {
    let meta = vm.core.meta;
    let any = vm.core.any;
    let t = vm.syms.intern("t");

    vm.add_cfunc("new", [Arg::new(t, meta)], [Ret::Type(any)], new_imp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skein_diagnostic::ErrorKind;

    #[test]
    fn new_builds_default_instances() {
        let mut vm = Vm::new();
        install(&mut vm);

        vm.push(Value::Type(vm.core.int));
        let new = vm.syms.intern("new");
        let id = vm.funcs.lookup(new).unwrap_or_else(|| panic!("no new"));
        vm.call_value(&Value::Func(id)).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().pop(), Some(Value::Int(0)));
    }

    #[test]
    fn traits_cannot_be_constructed() {
        let mut vm = Vm::new();
        let num = vm.core.num;
        let err = vm.new_value(num).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOp);
        assert_eq!(err.message, "Operation new not supported for type Num");
    }
}

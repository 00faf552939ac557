//! Function-control natives.

use skein_diagnostic::EvalResult;

use crate::Vm;

fn recall_imp(vm: &mut Vm) -> EvalResult {
    vm.request_recall()
}

/// Register `recall`: flag a bounded self-recursive retry of the current
/// call. The retry happens when the implementation's RETURN runs, reusing
/// the same call record and scope instead of pushing a new frame.
pub fn install(vm: &mut Vm) {
    vm.add_cfunc("recall", [], [], recall_imp);
}

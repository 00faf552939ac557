//! Code generation context and referenced-entity tracking.

use rustc_hash::FxHashSet;

use skein_ir::{FimpId, FuncId, Lit, OpKind, Sym, TypeId};
use skein_types::{FuncStore, Ret};

/// Output buffer plus the sets of entities the emitted code references.
///
/// The sets drive minimal-output assembly: only referenced funcs,
/// implementations, types, and symbols need declarations in the generated
/// translation unit.
#[derive(Default)]
pub struct CodegenContext {
    output: String,
    indent: usize,
    pub funcs: FxHashSet<FuncId>,
    pub fimps: FxHashSet<FimpId>,
    pub syms: FxHashSet<Sym>,
    pub types: FxHashSet<TypeId>,
}

impl CodegenContext {
    pub fn new() -> Self {
        CodegenContext {
            output: String::with_capacity(4096),
            indent: 0,
            funcs: FxHashSet::default(),
            fimps: FxHashSet::default(),
            syms: FxHashSet::default(),
            types: FxHashSet::default(),
        }
    }

    // Output buffer

    /// Increase indentation level.
    pub fn indent(&mut self) {
        self.indent += 1;
    }

    /// Decrease indentation level.
    pub fn dedent(&mut self) {
        debug_assert!(self.indent > 0, "dedent called with zero indent");
        self.indent = self.indent.saturating_sub(1);
    }

    /// Write a line to output (with indentation and newline).
    pub fn writeln(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
        self.output.push_str(s);
        self.output.push('\n');
    }

    /// Take the generated output.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    // Referenced entities

    fn record_fimp(&mut self, imp: FimpId) {
        self.funcs.insert(imp.func);
        self.fimps.insert(imp);
    }

    /// Record everything `kind` references; the func store resolves the
    /// argument and return declarations of referenced implementations.
    pub fn record_refs(&mut self, kind: &OpKind, funcs: &FuncStore) {
        match kind {
            OpKind::Begin { fimp: Some(imp) } => self.record_fimp(*imp),
            OpKind::Fimp { imp, .. } => self.record_fimp(*imp),
            OpKind::Funcall { func, imp } => {
                self.funcs.insert(*func);
                if let Some(imp) = imp {
                    self.record_fimp(*imp);
                }
            }
            OpKind::GetConst { id } | OpKind::GetVar { id } => {
                if *id != Sym::EMPTY {
                    self.syms.insert(*id);
                }
            }
            OpKind::Push { value } => match value {
                Lit::Sym(s) => {
                    self.syms.insert(*s);
                }
                Lit::Func(f) => {
                    self.funcs.insert(*f);
                }
                Lit::Fimp(imp) => self.record_fimp(*imp),
                Lit::Type(t) => {
                    self.types.insert(*t);
                }
                _ => {}
            },
            OpKind::PutArgs { imp } => {
                self.record_fimp(*imp);
                for arg in &funcs.fimp(*imp).args {
                    if let Some(name) = arg.name {
                        self.syms.insert(name);
                    }
                }
            }
            OpKind::PutVar { id, typ } => {
                self.syms.insert(*id);
                if let Some(t) = typ {
                    self.types.insert(*t);
                }
            }
            OpKind::Return { imp, .. } => {
                self.record_fimp(*imp);
                for ret in &funcs.fimp(*imp).rets {
                    if let Ret::Type(t) = ret {
                        self.types.insert(*t);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_ir::SymTable;
    use skein_types::{Arg, FimpBody, ProtoOps, TypeStore};

    #[test]
    fn records_funcall_and_putvar_refs() {
        let syms = SymTable::new();
        let mut types = TypeStore::new();
        let int = types.register(syms.intern("Int"), false, ProtoOps::baseline());

        let mut funcs = FuncStore::new();
        let plus = funcs.define(syms.intern("+"));
        let imp = funcs.get_mut(plus).add_imp(
            [Arg::new(syms.intern("x"), int)],
            [Ret::Type(int)],
            FimpBody::Defined,
        );

        let mut ctx = CodegenContext::new();
        ctx.record_refs(&OpKind::Funcall { func: plus, imp: Some(imp) }, &funcs);
        let x = syms.intern("v");
        ctx.record_refs(&OpKind::PutVar { id: x, typ: Some(int) }, &funcs);

        assert!(ctx.funcs.contains(&plus));
        assert!(ctx.fimps.contains(&imp));
        assert!(ctx.syms.contains(&x));
        assert!(ctx.types.contains(&int));
    }

    #[test]
    fn putargs_records_parameter_names() {
        let syms = SymTable::new();
        let mut types = TypeStore::new();
        let int = types.register(syms.intern("Int"), false, ProtoOps::baseline());

        let mut funcs = FuncStore::new();
        let f = funcs.define(syms.intern("f"));
        let n = syms.intern("n");
        let imp = funcs
            .get_mut(f)
            .add_imp([Arg::new(n, int), Arg::anon(int)], [], FimpBody::Defined);

        let mut ctx = CodegenContext::new();
        ctx.record_refs(&OpKind::PutArgs { imp }, &funcs);
        assert!(ctx.syms.contains(&n));
        assert_eq!(ctx.syms.len(), 1);
    }

    #[test]
    fn indentation_shapes_output() {
        let mut ctx = CodegenContext::new();
        ctx.writeln("a");
        ctx.indent();
        ctx.writeln("b");
        ctx.dedent();
        ctx.writeln("c");
        assert_eq!(ctx.take_output(), "a\n  b\nc\n");
    }
}

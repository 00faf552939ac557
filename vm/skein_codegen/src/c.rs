//! Per-operation C emission.
//!
//! Each op becomes a labeled block of C statements calling the same
//! runtime entry points the interpreter uses (`sk_begin`, `sk_pop`,
//! `sk_fimp_match`, ...), so the compiled form cannot diverge from
//! interpreted behavior. Jumps become `goto` between op labels.

use skein_ir::{Bin, FimpId, FuncId, Lit, OpKind, Sym, TypeId};
use skein_types::{FimpBody, FuncStore, Ret};

use crate::{CodegenContext, CodegenResult};

fn fimp_ref(imp: FimpId) -> String {
    format!("fimp{}_{}", imp.func.raw(), imp.idx)
}

fn func_ref(f: FuncId) -> String {
    format!("func{}", f.raw())
}

fn type_ref(t: TypeId) -> String {
    format!("type{}", t.raw())
}

fn sym_ref(s: Sym) -> String {
    format!("sym{}", s.raw())
}

fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// The C backend: drives per-op emission over a `Bin`.
pub struct CEmitter<'a> {
    funcs: &'a FuncStore,
    ctx: CodegenContext,
}

impl<'a> CEmitter<'a> {
    pub fn new(funcs: &'a FuncStore) -> Self {
        CEmitter {
            funcs,
            ctx: CodegenContext::new(),
        }
    }

    /// The referenced-entity sets accumulated so far.
    pub fn context(&self) -> &CodegenContext {
        &self.ctx
    }

    /// Emit the whole sequence as labeled statement blocks.
    ///
    /// Stops at the first op whose kind has no emission semantics.
    pub fn emit_bin(&mut self, bin: &Bin) -> CodegenResult {
        for (pc, op) in bin.ops().iter().enumerate() {
            self.ctx.record_refs(&op.kind, self.funcs);
            self.ctx.writeln(&format!("op{pc}: {{"));
            self.ctx.indent();
            let emitted = self.emit_op(pc, &op.kind, bin);
            self.ctx.dedent();
            if let Err(msg) = emitted {
                return CodegenResult::error(msg);
            }
            self.ctx.writeln("}");
        }
        // landing label for jumps past the last op
        self.ctx.writeln(&format!("op{}: ;", bin.len()));
        CodegenResult::success(self.ctx.take_output())
    }

    fn emit_op(&mut self, pc: usize, kind: &OpKind, bin: &Bin) -> Result<(), String> {
        match kind {
            OpKind::Begin { fimp } => {
                match fimp {
                    None => self
                        .ctx
                        .writeln("struct sk_scope *parent = sk_scope(vm, 0);"),
                    Some(imp) => self
                        .ctx
                        .writeln(&format!("struct sk_scope *parent = {}->scope;", fimp_ref(*imp))),
                }
                self.ctx.writeln("sk_begin(vm, parent);");
                Ok(())
            }
            OpKind::End => {
                self.ctx.writeln("sk_end(vm);");
                Ok(())
            }
            OpKind::Fimp {
                imp,
                inline_call,
                len,
            } => {
                if *inline_call {
                    self.ctx.writeln("struct sk_scope *s = sk_scope(vm, 0);");
                    self.ctx
                        .writeln(&format!("struct sk_fimp *imp = {};", fimp_ref(*imp)));
                    self.ctx.writeln("if (s->safe && !sk_fimp_match(imp, s)) {");
                    self.ctx.writeln(
                        "  sk_error(vm, vm->row, vm->col, \"Func not applicable: %s\", imp->func->id);",
                    );
                    self.ctx.writeln("  return false;");
                    self.ctx.writeln("}");
                    self.ctx.writeln(&format!(
                        "sk_call_init(sk_call_push(vm), vm->row, vm->col, imp, {});",
                        pc + 1 + len
                    ));
                } else {
                    let target = pc + 1 + len;
                    self.ctx.writeln(&format!("vm->pc = {target};"));
                    self.ctx.writeln(&format!("goto op{target};"));
                }
                Ok(())
            }
            OpKind::Funcall { func, imp } => {
                self.ctx.writeln("struct sk_scope *s = sk_scope(vm, 0);");
                self.ctx
                    .writeln(&format!("struct sk_func *func = {};", func_ref(*func)));
                match imp {
                    Some(imp) => {
                        self.ctx
                            .writeln(&format!("struct sk_fimp *imp = {};", fimp_ref(*imp)));
                        self.ctx
                            .writeln("if (s->safe && !sk_fimp_match(imp, s)) { imp = NULL; }");
                    }
                    None => self
                        .ctx
                        .writeln("struct sk_fimp *imp = sk_func_match_imp(func, s, 0);"),
                }
                self.ctx.writeln("if (!imp) {");
                self.ctx.writeln(
                    "  sk_error(vm, vm->row, vm->col, \"Func not applicable: %s\", func->id);",
                );
                self.ctx.writeln("  return false;");
                self.ctx.writeln("}");

                let entry = (*imp).and_then(|imp_id| {
                    matches!(self.funcs.fimp(imp_id).body, FimpBody::Defined)
                        .then(|| bin.fimp_entry(imp_id))
                        .flatten()
                });
                match entry {
                    Some(start) => {
                        self.ctx.writeln(&format!(
                            "sk_call_init(sk_call_push(vm), vm->row, vm->col, imp, {});",
                            pc + 1
                        ));
                        self.ctx.writeln(&format!("vm->pc = {start};"));
                        self.ctx.writeln(&format!("goto op{start};"));
                    }
                    None => self
                        .ctx
                        .writeln("if (!sk_fimp_call(imp, s)) { return false; }"),
                }
                Ok(())
            }
            OpKind::GetConst { id } => {
                self.ctx.writeln(&format!(
                    "struct sk_box *v = sk_get_const(vm, {}, false);",
                    sym_ref(*id)
                ));
                self.ctx.writeln("if (!v) { return false; }");
                self.ctx.writeln("sk_copy(sk_push(sk_scope(vm, 0)), v);");
                Ok(())
            }
            OpKind::GetVar { id } => {
                self.ctx.writeln("struct sk_scope *s = sk_scope(vm, 0);");
                self.ctx.writeln(&format!(
                    "struct sk_box *v = sk_get_var(s, {}, false);",
                    sym_ref(*id)
                ));
                self.ctx.writeln("if (!v) { return false; }");
                self.ctx.writeln("sk_copy(sk_push(s), v);");
                Ok(())
            }
            OpKind::Lambda { start, len } => {
                self.ctx.writeln("struct sk_scope *s = sk_scope(vm, 0);");
                self.ctx.writeln(&format!(
                    "struct sk_lambda *l = sk_lambda_new(s, {start}, {len});"
                ));
                self.ctx
                    .writeln("sk_box_init(sk_push(s), vm->lambda_type)->as_ptr = l;");
                let target = pc + 1 + len;
                self.ctx.writeln(&format!("vm->pc = {target};"));
                self.ctx.writeln(&format!("goto op{target};"));
                Ok(())
            }
            OpKind::Push { value } => {
                self.emit_lit(value);
                Ok(())
            }
            OpKind::PutArgs { imp } => {
                self.ctx.writeln("struct sk_scope *ds = sk_scope(vm, 0);");
                self.ctx
                    .writeln("struct sk_scope *ss = ds->stack.count ? ds : sk_scope(vm, 1);");
                let args = self.funcs.fimp(*imp).args.clone();
                for arg in args.iter().rev() {
                    match arg.name {
                        Some(name) => self.ctx.writeln(&format!(
                            "*sk_put_var(ds, {}) = *sk_pop(ss, false);",
                            sym_ref(name)
                        )),
                        None => self.ctx.writeln("sk_box_deinit(sk_pop(ss, false));"),
                    }
                }
                Ok(())
            }
            OpKind::PutVar { id, typ } => {
                self.ctx.writeln("struct sk_scope *s = sk_scope(vm, 0);");
                self.ctx.writeln("struct sk_box *src = sk_pop(s, false);");
                self.ctx.writeln("if (!src) { return false; }");
                if let Some(t) = typ {
                    self.ctx.writeln(&format!(
                        "if (s->safe && !sk_is(src->type, {})) {{",
                        type_ref(*t)
                    ));
                    self.ctx.writeln(&format!(
                        "  sk_error(vm, vm->row, vm->col, \"Expected type %s, actual: %s\", {}->id, src->type->id);",
                        type_ref(*t)
                    ));
                    self.ctx.writeln("  return false;");
                    self.ctx.writeln("}");
                }
                self.ctx
                    .writeln(&format!("*sk_put_var(s, {}) = *src;", sym_ref(*id)));
                Ok(())
            }
            OpKind::Return { imp, rebind_pc } => {
                self.emit_return(*imp, *rebind_pc);
                Ok(())
            }
            OpKind::Stop => {
                self.ctx.writeln("vm->stop = true;");
                Ok(())
            }
            // kinds the interpreter evaluates but emission never learned
            OpKind::Else { .. } | OpKind::Jump { .. } | OpKind::FimpDef { .. } | OpKind::Stash => {
                Err(format!("Emit not implemented: {}", kind.id()))
            }
        }
    }

    fn emit_return(&mut self, imp: FimpId, rebind_pc: usize) {
        let (rets, args) = {
            let fimp = self.funcs.fimp(imp);
            (fimp.rets.clone(), fimp.args.clone())
        };
        let n = rets.len();

        self.ctx
            .writeln("struct sk_call *call = sk_call_peek(vm);");
        self.ctx.writeln("struct sk_scope *s = sk_scope(vm, 0);");
        self.ctx.writeln("if (call->recalls) {");
        self.ctx.writeln(&format!(
            "  if (s->safe && !sk_fimp_match({}, s)) {{",
            fimp_ref(imp)
        ));
        self.ctx
            .writeln("    sk_error(vm, vm->row, vm->col, \"Recall not applicable\");");
        self.ctx.writeln("    return false;");
        self.ctx.writeln("  }");
        self.ctx.writeln("  call->recalls--;");
        self.ctx.writeln(&format!("  vm->pc = {rebind_pc};"));
        self.ctx.writeln(&format!("  goto op{rebind_pc};"));
        self.ctx.writeln("} else {");
        self.ctx.writeln(&format!(
            "  if (s->stack.count > {n}) {{ sk_error(vm, vm->row, vm->col, \"Stack not empty on return\"); return false; }}"
        ));
        self.ctx.writeln(&format!(
            "  if (s->stack.count < {n}) {{ sk_error(vm, vm->row, vm->col, \"Not enough return values on stack\"); return false; }}"
        ));

        if n > 0 {
            self.ctx.writeln("  struct sk_scope *ds = sk_scope(vm, 1);");
            self.ctx
                .writeln("  struct sk_box *v = sk_vec_start(&s->stack);");
            for (i, ret) in rets.iter().enumerate() {
                self.ctx.writeln("  if (s->safe) {");
                match ret {
                    Ret::Type(t) => self
                        .ctx
                        .writeln(&format!("    struct sk_type *t = {};", type_ref(*t))),
                    Ret::SameAsArg(narg) => {
                        // the argument's *current* runtime type in the
                        // returning scope
                        let name = args
                            .get(*narg)
                            .and_then(|a| a.name)
                            .map_or_else(|| "0".to_string(), sym_ref);
                        self.ctx.writeln(&format!(
                            "    struct sk_type *t = sk_var_type(s, {name});"
                        ));
                    }
                }
                self.ctx.writeln(
                    "    if (t && !sk_is(v->type, t)) { sk_error(vm, vm->row, vm->col, \"Invalid return type.\\nExpected %s, actual: %s\", t->id, v->type->id); return false; }",
                );
                self.ctx.writeln("  }");
                self.ctx.writeln("  *sk_stack_push(ds) = *v;");
                if i + 1 < n {
                    self.ctx.writeln("  v++;");
                }
            }
        }

        self.ctx.writeln("  sk_stack_clear(s);");
        self.ctx
            .writeln("  struct sk_call *done = sk_call_pop(vm);");
        self.ctx.writeln("  sk_end(vm);");
        self.ctx.writeln("  if (done->return_pc > -1) {");
        self.ctx.writeln("    vm->pc = done->return_pc;");
        self.ctx.writeln("    goto *op_labels[vm->pc];");
        self.ctx.writeln("  }");
        self.ctx.writeln("  vm->stop = true;");
        self.ctx.writeln("}");
    }

    fn emit_lit(&mut self, lit: &Lit) {
        match lit {
            Lit::Nil => self
                .ctx
                .writeln("sk_box_init(sk_push(sk_scope(vm, 0)), vm->nil_type);"),
            Lit::Bool(b) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->bool_type)->as_bool = {};",
                i32::from(*b)
            )),
            Lit::Int(i) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->int_type)->as_int = {i};"
            )),
            Lit::Sym(s) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->sym_type)->as_sym = {};",
                sym_ref(*s)
            )),
            Lit::Str(s) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->str_type)->as_str = sk_str_new(\"{}\");",
                escape_c(s)
            )),
            Lit::Func(f) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->func_type)->as_ptr = {};",
                func_ref(*f)
            )),
            Lit::Fimp(imp) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->fimp_type)->as_ptr = {};",
                fimp_ref(*imp)
            )),
            Lit::Type(t) => self.ctx.writeln(&format!(
                "sk_box_init(sk_push(sk_scope(vm, 0)), vm->meta_type)->as_ptr = {};",
                type_ref(*t)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skein_ir::{SourcePos, SymTable};
    use skein_types::{Arg, ProtoOps, TypeStore};

    const P: SourcePos = SourcePos::UNKNOWN;

    struct Fixture {
        syms: SymTable,
        types: TypeStore,
        funcs: FuncStore,
    }

    fn fixture() -> Fixture {
        Fixture {
            syms: SymTable::new(),
            types: TypeStore::new(),
            funcs: FuncStore::new(),
        }
    }

    #[test]
    fn emits_labeled_blocks_for_simple_ops() {
        let fx = fixture();
        let mut bin = Bin::new();
        bin.push(OpKind::Begin { fimp: None }, P);
        bin.push(OpKind::Push { value: Lit::Int(42) }, P);
        bin.push(OpKind::End, P);
        bin.push(OpKind::Stop, P);

        let mut emitter = CEmitter::new(&fx.funcs);
        let result = emitter.emit_bin(&bin);
        assert!(result.success, "{:?}", result.errors);

        assert!(result.code.contains("op0: {"));
        assert!(result.code.contains("sk_begin(vm, parent);"));
        assert!(result.code.contains("->as_int = 42;"));
        assert!(result.code.contains("vm->stop = true;"));
        // landing label for jumps past the end
        assert!(result.code.contains("op4: ;"));
    }

    #[test]
    fn uninterpretable_kinds_report() {
        let fx = fixture();
        let mut bin = Bin::new();
        bin.push(OpKind::Else { skip: 1 }, P);

        let mut emitter = CEmitter::new(&fx.funcs);
        let result = emitter.emit_bin(&bin);
        assert!(result.has_errors());
        assert_eq!(result.errors[0].message, "Emit not implemented: else");
        assert!(result.code.is_empty());
    }

    #[test]
    fn defined_call_emits_entry_jump_and_records_refs() {
        let mut fx = fixture();
        let int = fx
            .types
            .register(fx.syms.intern("Int"), false, ProtoOps::baseline());
        let v = fx.syms.intern("v");
        let fid = fx.funcs.define(fx.syms.intern("ident"));
        let imp = fx.funcs.get_mut(fid).add_imp(
            [Arg::new(v, int)],
            [Ret::Type(int)],
            FimpBody::Defined,
        );

        let mut bin = Bin::new();
        bin.push(OpKind::Push { value: Lit::Int(5) }, P);
        bin.push(
            OpKind::Funcall {
                func: fid,
                imp: Some(imp),
            },
            P,
        );
        bin.push(OpKind::Stop, P);
        // body compiled further down the sequence
        let begin = bin.push(OpKind::Begin { fimp: Some(imp) }, P);
        let putargs = bin.push(OpKind::PutArgs { imp }, P);
        bin.push(OpKind::GetVar { id: v }, P);
        bin.push(
            OpKind::Return {
                imp,
                rebind_pc: putargs,
            },
            P,
        );
        bin.add_fimp(imp, begin);

        let mut emitter = CEmitter::new(&fx.funcs);
        let result = emitter.emit_bin(&bin);
        assert!(result.success, "{:?}", result.errors);
        assert!(result.code.contains(&format!("goto op{begin};")));
        assert!(result.code.contains("Recall not applicable"));
        assert!(result.code.contains("Stack not empty on return"));

        let ctx = emitter.context();
        assert!(ctx.funcs.contains(&fid));
        assert!(ctx.fimps.contains(&imp));
        assert!(ctx.syms.contains(&v));
        assert!(ctx.types.contains(&int));
    }

    #[test]
    fn string_literals_are_escaped() {
        let fx = fixture();
        let mut bin = Bin::new();
        bin.push(
            OpKind::Push {
                value: Lit::Str("a\"b\nc".into()),
            },
            P,
        );

        let mut emitter = CEmitter::new(&fx.funcs);
        let result = emitter.emit_bin(&bin);
        assert!(result.success);
        assert!(result.code.contains("sk_str_new(\"a\\\"b\\nc\")"));
    }
}

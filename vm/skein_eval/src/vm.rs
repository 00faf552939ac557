//! The interpreter: session context, lexical and activation stacks, and
//! the op-dispatch loop.
//!
//! `Vm` is the explicit context value threaded through every call — it
//! owns the symbol table, the type and func registries, the accumulating
//! error list, and the two stacks (lexical scopes and activation records).
//! There are no ambient globals.
//!
//! The loop fetches the op at the program counter, advances past it, then
//! dispatches; jump distances are therefore relative to the already
//! advanced counter. A failing op appends to the error list and unwinds
//! unless an armed catch recovers at a recorded pc.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use skein_diagnostic::{
    func_not_applicable, handler_pop_failure, not_enough_return_values, op_not_supported,
    recall_not_applicable, recall_outside_call, return_type_mismatch, stack_not_empty_on_return,
    stack_underflow, type_mismatch, unknown_const, unknown_var, Error, ErrorKind, Errors,
    EvalResult,
};
use skein_ir::{Bin, FimpId, FuncId, OpKind, SourcePos, Sym, SymTable, TypeId};
use skein_types::{Arg, FimpBody, FuncStore, NativeId, ProtoOps, Ret, TypeStore};

use crate::{ensure_sufficient_stack, Call, Catch, Lambda, Scope, Value};

/// A native routine: pops its own arguments from the calling scope.
pub type Native = fn(&mut Vm) -> EvalResult;

/// Handles of the built-in types registered by every session.
pub struct CoreTypes {
    pub opt: TypeId,
    pub any: TypeId,
    pub num: TypeId,
    pub seq: TypeId,
    pub nil: TypeId,
    pub bool_: TypeId,
    pub int: TypeId,
    pub sym: TypeId,
    pub rat: TypeId,
    pub str_: TypeId,
    pub stack: TypeId,
    pub lambda: TypeId,
    pub func: TypeId,
    pub fimp: TypeId,
    pub meta: TypeId,
}

fn register_core(syms: &SymTable, types: &mut TypeStore) -> CoreTypes {
    let base = ProtoOps::baseline();

    let opt = types.register(syms.intern("Opt"), true, base);
    let any = types.register(syms.intern("Any"), true, base);
    let num = types.register(syms.intern("Num"), true, base | ProtoOps::CMP);
    let seq = types.register(syms.intern("Seq"), true, base | ProtoOps::ITER);

    let nil = types.register(syms.intern("Nil"), false, base | ProtoOps::EMIT);
    let bool_ = types.register(
        syms.intern("Bool"),
        false,
        base | ProtoOps::NEW | ProtoOps::CMP | ProtoOps::EMIT,
    );
    let int = types.register(
        syms.intern("Int"),
        false,
        base | ProtoOps::NEW | ProtoOps::CMP | ProtoOps::EMIT,
    );
    let sym = types.register(syms.intern("Sym"), false, base | ProtoOps::EMIT);
    let rat = types.register(
        syms.intern("Rat"),
        false,
        base | ProtoOps::NEW | ProtoOps::CMP,
    );
    let str_ = types.register(
        syms.intern("Str"),
        false,
        base | ProtoOps::NEW | ProtoOps::CMP | ProtoOps::CLONE | ProtoOps::EMIT,
    );
    let stack = types.register(
        syms.intern("Stack"),
        false,
        base | ProtoOps::NEW | ProtoOps::CLONE | ProtoOps::ITER,
    );
    let lambda = types.register(
        syms.intern("Lambda"),
        false,
        base.difference(ProtoOps::EQVAL) | ProtoOps::CALL,
    );
    let func = types.register(syms.intern("Func"), false, base | ProtoOps::CALL);
    let fimp = types.register(syms.intern("Fimp"), false, base | ProtoOps::CALL);
    let meta = types.register(
        syms.intern("Type"),
        false,
        base.difference(ProtoOps::EQVAL) | ProtoOps::EMIT,
    );

    types.derive(any, opt);
    types.derive(nil, opt);
    types.derive(num, any);
    types.derive(seq, any);
    types.derive(int, num);
    types.derive(rat, num);
    types.derive(str_, seq);
    types.derive(stack, seq);
    for t in [bool_, sym, lambda, func, fimp, meta] {
        types.derive(t, any);
    }

    CoreTypes {
        opt,
        any,
        num,
        seq,
        nil,
        bool_,
        int,
        sym,
        rat,
        str_,
        stack,
        lambda,
        func,
        fimp,
        meta,
    }
}

/// The VM session: all registries plus interpreter state.
pub struct Vm {
    pub syms: SymTable,
    pub types: TypeStore,
    pub funcs: FuncStore,
    pub errors: Errors,
    pub core: CoreTypes,
    consts: FxHashMap<Sym, Value>,
    natives: Vec<Native>,
    /// Enclosing scopes captured by FIMPDEF, per implementation.
    fimp_scopes: FxHashMap<FimpId, Rc<Scope>>,
    root: Rc<Scope>,
    scopes: Vec<Rc<Scope>>,
    calls: Vec<Call>,
    calls_peak: usize,
    bin: Option<Rc<Bin>>,
    pc: usize,
    pos: SourcePos,
    stop: bool,
}

impl Vm {
    /// Create a session in safe mode.
    pub fn new() -> Self {
        Self::with_safety(true)
    }

    /// Create a session with an explicit safety mode for the root scope.
    ///
    /// Scopes copy their safe flag from the innermost live scope at
    /// creation, so this choice propagates to the whole session unless a
    /// root scope is replaced.
    pub fn with_safety(safe: bool) -> Self {
        let syms = SymTable::new();
        let mut types = TypeStore::new();
        let core = register_core(&syms, &mut types);
        let root = Scope::root(safe);

        let mut vm = Vm {
            syms,
            types,
            funcs: FuncStore::new(),
            errors: Errors::new(),
            core,
            consts: FxHashMap::default(),
            natives: Vec::new(),
            fimp_scopes: FxHashMap::default(),
            root: root.clone(),
            scopes: vec![root],
            calls: Vec::new(),
            calls_peak: 0,
            bin: None,
            pc: 0,
            pos: SourcePos::UNKNOWN,
            stop: false,
        };

        // core types double as global constants
        let entries = [
            ("Opt", vm.core.opt),
            ("Any", vm.core.any),
            ("Num", vm.core.num),
            ("Seq", vm.core.seq),
            ("Nil", vm.core.nil),
            ("Bool", vm.core.bool_),
            ("Int", vm.core.int),
            ("Sym", vm.core.sym),
            ("Rat", vm.core.rat),
            ("Str", vm.core.str_),
            ("Stack", vm.core.stack),
            ("Lambda", vm.core.lambda),
            ("Func", vm.core.func),
            ("Fimp", vm.core.fimp),
            ("Type", vm.core.meta),
        ];
        for (name, id) in entries {
            let sym = vm.syms.intern(name);
            vm.consts.insert(sym, Value::Type(id));
        }
        vm
    }

    // Session state

    /// The position of the op currently being evaluated.
    #[inline]
    pub fn pos(&self) -> SourcePos {
        self.pos
    }

    /// The innermost live scope.
    #[inline]
    pub fn scope(&self) -> &Rc<Scope> {
        self.scopes.last().unwrap_or(&self.root)
    }

    /// The scope `depth` levels below the innermost (0 = innermost).
    pub fn scope_at(&self, depth: usize) -> Option<&Rc<Scope>> {
        let idx = self.scopes.len().checked_sub(depth + 1)?;
        self.scopes.get(idx)
    }

    pub fn scopes_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn calls_depth(&self) -> usize {
        self.calls.len()
    }

    /// High-water mark of the activation stack over the session.
    pub fn calls_peak(&self) -> usize {
        self.calls_peak
    }

    #[inline]
    fn note_calls_peak(&mut self) {
        self.calls_peak = self.calls_peak.max(self.calls.len());
    }

    /// Push a fresh child scope; its safe flag copies from the innermost
    /// live scope.
    pub fn begin(&mut self, parent: Option<Rc<Scope>>) -> Rc<Scope> {
        let safe = self.scope().safe();
        let scope = Scope::new(parent, safe);
        self.scopes.push(scope.clone());
        scope
    }

    /// Pop and release the innermost scope; the root stays.
    pub fn end(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Push an existing scope (closure invocation).
    pub fn push_scope(&mut self, scope: Rc<Scope>) {
        self.scopes.push(scope);
    }

    // Operand stack of the innermost scope

    pub fn push(&self, v: Value) {
        self.scope().push(v);
    }

    pub fn pop(&mut self) -> EvalResult<Value> {
        let pos = self.pos;
        self.scope().pop().ok_or_else(|| stack_underflow(pos))
    }

    pub fn peek(&mut self) -> EvalResult<Value> {
        let pos = self.pos;
        self.scope().peek().ok_or_else(|| stack_underflow(pos))
    }

    /// Pop an `Int`, failing with a type mismatch otherwise.
    pub fn pop_int(&mut self) -> EvalResult<i64> {
        let pos = self.pos;
        match self.pop()? {
            Value::Int(i) => Ok(i),
            other => {
                let actual = self.type_of(&other);
                Err(type_mismatch(pos, "Int", self.type_name(actual)))
            }
        }
    }

    /// Pop a `Rat`, failing with a type mismatch otherwise.
    pub fn pop_rat(&mut self) -> EvalResult<crate::Rat> {
        let pos = self.pos;
        match self.pop()? {
            Value::Rat(r) => Ok(r),
            other => {
                let actual = self.type_of(&other);
                Err(type_mismatch(pos, "Rat", self.type_name(actual)))
            }
        }
    }

    // Registry plumbing

    pub fn put_const(&mut self, id: Sym, v: Value) {
        self.consts.insert(id, v);
    }

    pub fn get_const(&self, id: Sym) -> Option<&Value> {
        self.consts.get(&id)
    }

    /// Register a native routine.
    pub fn add_native(&mut self, f: Native) -> NativeId {
        let id = NativeId::new(
            u32::try_from(self.natives.len()).unwrap_or_else(|_| panic!("native id overflow")),
        );
        self.natives.push(f);
        id
    }

    /// Define a func (idempotent by name) and add a native implementation.
    pub fn add_cfunc(
        &mut self,
        name: &str,
        args: impl IntoIterator<Item = Arg>,
        rets: impl IntoIterator<Item = Ret>,
        f: Native,
    ) -> FimpId {
        let nid = self.add_native(f);
        let sym = self.syms.intern(name);
        let fid = self.funcs.define(sym);
        self.funcs
            .get_mut(fid)
            .add_imp(args, rets, FimpBody::Native(nid))
    }

    /// The value's owning type.
    #[inline]
    pub fn type_of(&self, v: &Value) -> TypeId {
        v.type_of(&self.core)
    }

    /// A type's registered name.
    pub fn type_name(&self, id: TypeId) -> &'static str {
        self.syms.resolve(self.types.get(id).name)
    }

    fn func_name(&self, id: FuncId) -> &'static str {
        self.syms.resolve(self.funcs.get(id).name)
    }

    /// Runtime types of the innermost scope's operand stack, bottom to top.
    pub fn stack_types(&self) -> Vec<TypeId> {
        let core = &self.core;
        self.scope()
            .with_stack(|items| items.iter().map(|v| v.type_of(core)).collect())
    }

    // The call protocol

    /// Invoke a callable value (lambda, fimp, or func reference).
    ///
    /// Values whose type does not carry the CALL capability fail with an
    /// explicit "operation not supported" report.
    pub fn call_value(&mut self, v: &Value) -> EvalResult {
        let t = self.type_of(v);
        if !self.types.get(t).proto.contains(ProtoOps::CALL) {
            return Err(op_not_supported(self.pos, "call", self.type_name(t)));
        }
        match v {
            Value::Lambda(l) => {
                let l = l.clone();
                self.call_lambda(&l)
            }
            Value::Fimp(id) => self.call_fimp(*id),
            Value::Func(id) => {
                let live = self.stack_types();
                let resolved = self
                    .funcs
                    .get(*id)
                    .resolve(&live, &self.types)
                    .map(|imp| imp.id);
                match resolved {
                    Some(imp) => self.call_fimp(imp),
                    None => Err(func_not_applicable(self.pos, self.func_name(*id))),
                }
            }
            _ => Err(op_not_supported(self.pos, "call", self.type_name(t))),
        }
    }

    /// Run a closure body in its captured scope (synchronous re-entrancy).
    pub fn call_lambda(&mut self, l: &Rc<Lambda>) -> EvalResult {
        self.push_scope(l.scope.clone());
        let bin = l.bin.clone();
        let (start, end) = (l.start, l.end());
        let result = ensure_sufficient_stack(|| self.eval_span(&bin, start, end));
        if self.scopes.len() > 1 && Rc::ptr_eq(self.scope(), &l.scope) {
            self.scopes.pop();
        }
        result
    }

    /// Invoke one implementation directly: natives run in place; defined
    /// bodies run through a nested loop over their op range.
    pub fn call_fimp(&mut self, id: FimpId) -> EvalResult {
        let body = self.funcs.fimp(id).body;
        match body {
            FimpBody::Native(nid) => {
                let f = self.natives[nid.index()];
                f(self)
            }
            FimpBody::Defined => {
                let Some(bin) = self.bin.clone() else {
                    return Err(func_not_applicable(self.pos, self.func_name(id.func)));
                };
                let Some(start) = bin.fimp_entry(id) else {
                    return Err(func_not_applicable(self.pos, self.func_name(id.func)));
                };
                self.calls.push(Call::new(id, self.pos, None));
                self.note_calls_peak();
                let len = bin.len();
                ensure_sufficient_stack(|| self.eval_span(&bin, start, len))
            }
        }
    }

    /// Construct a default instance of a type through the `new` protocol
    /// operation. Traits and types without the NEW capability fail.
    pub fn new_value(&mut self, t: TypeId) -> EvalResult<Value> {
        let rec = self.types.get(t);
        if rec.is_trait || !rec.proto.contains(ProtoOps::NEW) {
            return Err(op_not_supported(self.pos, "new", self.type_name(t)));
        }
        if t == self.core.int {
            Ok(Value::Int(0))
        } else if t == self.core.bool_ {
            Ok(Value::Bool(false))
        } else if t == self.core.rat {
            Ok(Value::Rat(crate::Rat::new(0, 1, false)))
        } else if t == self.core.str_ {
            Ok(Value::Str(Rc::from("")))
        } else if t == self.core.stack {
            Ok(Value::stack_of(Vec::new()))
        } else {
            Err(op_not_supported(self.pos, "new", self.type_name(t)))
        }
    }

    /// Collect element values of an iterable.
    pub fn iter_value(&self, v: &Value) -> EvalResult<Vec<Value>> {
        let t = self.type_of(v);
        if !self.types.get(t).proto.contains(ProtoOps::ITER) {
            return Err(op_not_supported(self.pos, "iter", self.type_name(t)));
        }
        match v {
            Value::Stack(items) => Ok(items.borrow().iter().cloned().collect()),
            _ => Err(op_not_supported(self.pos, "iter", self.type_name(t))),
        }
    }

    /// Flag a pending self-recursive retry on the innermost call.
    pub fn request_recall(&mut self) -> EvalResult {
        let pos = self.pos;
        match self.calls.last_mut() {
            Some(call) => {
                call.recalls += 1;
                Ok(())
            }
            None => Err(recall_outside_call(pos)),
        }
    }

    // Error handlers

    /// Register a handler on the innermost scope.
    pub fn push_catch(&mut self, handler: Value, kind: Option<ErrorKind>, resume_pc: usize) {
        self.scope().push_catch(Catch {
            kind,
            handler,
            resume_pc,
            armed: false,
        });
    }

    /// Pop `n` handlers from the innermost scope, invoking any armed one
    /// as it is discarded. Fails if fewer than `n` are present.
    pub fn pop_catch(&mut self, n: usize) -> EvalResult {
        if n == 0 {
            return Ok(());
        }
        let pos = self.pos;
        let scope = self.scope().clone();
        if scope.catches_len() < n {
            return Err(handler_pop_failure(pos));
        }
        for _ in 0..n {
            if let Some(c) = scope.pop_catch_record() {
                if c.armed {
                    self.call_value(&c.handler)?;
                }
            }
        }
        Ok(())
    }

    /// Find and arm the innermost handler matching the error, unwinding
    /// the lexical scopes above it. `None` leaves the stacks untouched.
    fn recover(&mut self, err: &Error) -> Option<usize> {
        let hit = self
            .scopes
            .iter()
            .rev()
            .enumerate()
            .find_map(|(depth, s)| s.arm_catch(err.kind).map(|pc| (depth, pc)));

        let (depth, pc) = hit?;
        for _ in 0..depth {
            if self.scopes.len() > 1 {
                self.scopes.pop();
            }
        }
        Some(pc)
    }

    // The loop

    /// Drive an op sequence from `start` until STOP, a top-level return,
    /// or the end of the sequence.
    pub fn eval(&mut self, bin: &Rc<Bin>, start: usize) -> EvalResult {
        self.eval_span(bin, start, bin.len())
    }

    /// Drive the span `[start, end)`; nested invocations save and restore
    /// the surrounding loop's state.
    fn eval_span(&mut self, bin: &Rc<Bin>, start: usize, end: usize) -> EvalResult {
        let prev_bin = self.bin.replace(bin.clone());
        let prev_pc = self.pc;
        let prev_stop = self.stop;
        self.pc = start;
        self.stop = false;

        let result = self.run(bin, end);

        self.bin = prev_bin;
        self.pc = prev_pc;
        self.stop = prev_stop;
        result
    }

    fn run(&mut self, bin: &Rc<Bin>, end: usize) -> EvalResult {
        while !self.stop && self.pc != end {
            let Some(op) = bin.op_at(self.pc) else { break };
            self.pc += 1;
            self.pos = op.pos;
            trace!(pc = self.pc - 1, op = op.kind.id(), "dispatch");

            if let Err(err) = self.eval_op(bin, &op.kind) {
                self.errors.push(err.clone());
                match self.recover(&err) {
                    Some(pc) => self.pc = pc,
                    None => return Err(err),
                }
            }
        }
        Ok(())
    }

    fn eval_op(&mut self, bin: &Rc<Bin>, kind: &OpKind) -> EvalResult {
        match kind {
            OpKind::Begin { fimp } => {
                let parent = match fimp {
                    None => Some(self.scope().clone()),
                    Some(imp) => self
                        .fimp_scopes
                        .get(imp)
                        .cloned()
                        .or_else(|| Some(self.scope().clone())),
                };
                self.begin(parent);
                Ok(())
            }
            OpKind::Else { skip } => {
                let v = self.pop()?;
                if !v.ok() {
                    self.pc += skip;
                }
                Ok(())
            }
            OpKind::End => {
                self.end();
                Ok(())
            }
            OpKind::Fimp {
                imp,
                inline_call,
                len,
            } => {
                if *inline_call {
                    if self.scope().safe() {
                        let live = self.stack_types();
                        if !self.funcs.fimp(*imp).matches(&live, &self.types) {
                            return Err(func_not_applicable(self.pos, self.func_name(imp.func)));
                        }
                    }
                    self.calls.push(Call::new(*imp, self.pos, Some(self.pc + len)));
                    self.note_calls_peak();
                } else {
                    self.pc += len;
                }
                Ok(())
            }
            OpKind::FimpDef { imp } => {
                self.fimp_scopes.insert(*imp, self.scope().clone());
                Ok(())
            }
            OpKind::Funcall { func, imp } => self.funcall(bin, *func, *imp),
            OpKind::GetConst { id } => {
                let Some(v) = self.consts.get(id).cloned() else {
                    return Err(unknown_const(self.pos, self.syms.resolve(*id)));
                };
                self.push(v);
                Ok(())
            }
            OpKind::GetVar { id } => {
                let Some(v) = self.scope().get_var(*id) else {
                    return Err(unknown_var(self.pos, self.syms.resolve(*id)));
                };
                self.push(v);
                Ok(())
            }
            OpKind::Jump { skip } => {
                self.pc += skip;
                Ok(())
            }
            OpKind::Lambda { start, len } => {
                let l = Lambda::new(bin.clone(), *start, *len, self.scope().clone());
                self.push(Value::Lambda(Rc::new(l)));
                self.pc += len;
                Ok(())
            }
            OpKind::Push { value } => {
                self.push(Value::from_lit(value));
                Ok(())
            }
            OpKind::PutArgs { imp } => self.put_args(*imp),
            OpKind::PutVar { id, typ } => {
                let v = self.pop()?;
                if let Some(t) = typ {
                    if self.scope().safe() {
                        let actual = self.type_of(&v);
                        if !self.types.is(actual, *t) {
                            return Err(type_mismatch(
                                self.pos,
                                self.type_name(*t),
                                self.type_name(actual),
                            ));
                        }
                    }
                }
                self.scope().put_var(*id, v);
                Ok(())
            }
            OpKind::Return { imp, rebind_pc } => self.do_return(*imp, *rebind_pc),
            OpKind::Stash => {
                let items = self.scope().take_stack();
                self.push(Value::stack_of(items));
                Ok(())
            }
            OpKind::Stop => {
                self.stop = true;
                Ok(())
            }
        }
    }

    fn funcall(&mut self, bin: &Rc<Bin>, func: FuncId, bound: Option<FimpId>) -> EvalResult {
        let live = self.stack_types();

        let resolved = match bound {
            // a pre-resolved call only re-validates in safe mode; if the
            // binding no longer applies it fails dispatch, it does not rescan
            Some(imp_id) => {
                let ok = !self.scope().safe() || self.funcs.fimp(imp_id).matches(&live, &self.types);
                ok.then_some(imp_id)
            }
            None => self
                .funcs
                .get(func)
                .resolve(&live, &self.types)
                .map(|imp| imp.id),
        };

        let Some(imp_id) = resolved else {
            return Err(func_not_applicable(self.pos, self.func_name(func)));
        };

        let body = self.funcs.fimp(imp_id).body;
        match body {
            FimpBody::Defined => match bin.fimp_entry(imp_id) {
                Some(start) => {
                    self.calls.push(Call::new(imp_id, self.pos, Some(self.pc)));
                    self.note_calls_peak();
                    self.pc = start;
                    Ok(())
                }
                None => Err(func_not_applicable(self.pos, self.func_name(func))),
            },
            FimpBody::Native(nid) => {
                let f = self.natives[nid.index()];
                f(self)
            }
        }
    }

    /// Bind parameters right-to-left: from the callee's own stack when it
    /// already holds values (the recall case), else from the enclosing
    /// scope's stack (the initial call). Unnamed parameters are popped and
    /// discarded.
    fn put_args(&mut self, imp_id: FimpId) -> EvalResult {
        let args = self.funcs.fimp(imp_id).args.clone();
        let pos = self.pos;

        let ds = self.scope().clone();
        let ss = if ds.stack_len() > 0 {
            ds.clone()
        } else {
            self.scope_at(1).cloned().unwrap_or_else(|| ds.clone())
        };

        for arg in args.iter().rev() {
            let Some(v) = ss.pop() else {
                return Err(stack_underflow(pos));
            };
            match arg.name {
                Some(name) => ds.put_var(name, v),
                None => drop(v),
            }
        }
        Ok(())
    }

    fn do_return(&mut self, imp_id: FimpId, rebind_pc: usize) -> EvalResult {
        let pos = self.pos;

        if self.calls.is_empty() {
            return Err(Error::new(
                ErrorKind::StackUnderflow,
                pos,
                "Return without pending call",
            ));
        }

        let recalls = self.calls.last().map_or(0, |c| c.recalls);
        if recalls > 0 {
            if let Some(call) = self.calls.last_mut() {
                call.recalls -= 1;
            }
            if self.scope().safe() {
                let live = self.stack_types();
                if !self.funcs.fimp(imp_id).matches(&live, &self.types) {
                    return Err(recall_not_applicable(pos));
                }
            }
            // restart the body at its argument binding; the values left on
            // the callee's own stack become the fresh arguments
            self.pc = rebind_pc;
            return Ok(());
        }

        let (rets, args) = {
            let imp = self.funcs.fimp(imp_id);
            (imp.rets.clone(), imp.args.clone())
        };

        let ss = self.scope().clone();
        if ss.stack_len() > rets.len() {
            return Err(stack_not_empty_on_return(pos));
        }
        if ss.stack_len() < rets.len() {
            return Err(not_enough_return_values(pos));
        }

        let values = ss.take_stack();

        if ss.safe() {
            for (v, ret) in values.iter().zip(rets.iter()) {
                let expect = match ret {
                    Ret::Type(t) => Some(*t),
                    // "same type as argument n": resolved against the
                    // argument's *current* runtime type in this scope
                    Ret::SameAsArg(n) => args
                        .get(*n)
                        .and_then(|a| a.name)
                        .and_then(|name| ss.get_var(name))
                        .map(|av| self.type_of(&av)),
                };
                if let Some(t) = expect {
                    let actual = self.type_of(v);
                    if !self.types.is(actual, t) {
                        return Err(return_type_mismatch(
                            pos,
                            self.type_name(t),
                            self.type_name(actual),
                        ));
                    }
                }
            }
        }

        // move, not copy, onto the caller's scope in original order
        let ds = self.scope_at(1).cloned().unwrap_or_else(|| ss.clone());
        ds.push_all(values);

        if let Some(call) = self.calls.pop() {
            match call.return_pc {
                Some(pc) => self.pc = pc,
                None => self.stop = true,
            }
        }
        self.end();
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skein_ir::Lit;

    fn bin() -> Bin {
        Bin::new()
    }

    fn eval(vm: &mut Vm, b: Bin) -> EvalResult {
        vm.eval(&Rc::new(b), 0)
    }

    #[test]
    fn push_and_stop() {
        let mut vm = Vm::new();
        let mut b = bin();
        b.push(OpKind::Push { value: Lit::Int(42) }, SourcePos::UNKNOWN);
        b.push(OpKind::Stop, SourcePos::UNKNOWN);
        b.push(OpKind::Push { value: Lit::Int(7) }, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().pop(), Some(Value::Int(42)));
        assert_eq!(vm.scope().pop(), None);
    }

    #[test]
    fn else_skips_on_falsey() {
        let mut vm = Vm::new();
        let mut b = bin();
        b.push(OpKind::Push { value: Lit::Int(0) }, SourcePos::UNKNOWN);
        b.push(OpKind::Else { skip: 1 }, SourcePos::UNKNOWN);
        b.push(OpKind::Push { value: Lit::Int(1) }, SourcePos::UNKNOWN);
        b.push(OpKind::Push { value: Lit::Int(2) }, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().take_stack(), vec![Value::Int(2)]);
    }

    #[test]
    fn else_continues_on_truthy() {
        let mut vm = Vm::new();
        let mut b = bin();
        b.push(OpKind::Push { value: Lit::Int(5) }, SourcePos::UNKNOWN);
        b.push(OpKind::Else { skip: 1 }, SourcePos::UNKNOWN);
        b.push(OpKind::Push { value: Lit::Int(1) }, SourcePos::UNKNOWN);
        b.push(OpKind::Push { value: Lit::Int(2) }, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().take_stack(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn begin_end_scopes() {
        let mut vm = Vm::new();
        let mut b = bin();
        b.push(OpKind::Begin { fimp: None }, SourcePos::UNKNOWN);
        b.push(OpKind::End, SourcePos::UNKNOWN);
        assert_eq!(vm.scopes_depth(), 1);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scopes_depth(), 1);
    }

    #[test]
    fn getvar_reads_through_parents() {
        let mut vm = Vm::new();
        let x = vm.syms.intern("x");
        vm.scope().put_var(x, Value::Int(9));

        let mut b = bin();
        b.push(OpKind::Begin { fimp: None }, SourcePos::UNKNOWN);
        b.push(OpKind::GetVar { id: x }, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().pop(), Some(Value::Int(9)));
    }

    #[test]
    fn unknown_var_reports() {
        let mut vm = Vm::new();
        let x = vm.syms.intern("nope");
        let mut b = bin();
        b.push(OpKind::GetVar { id: x }, SourcePos::new(2, 5));
        let err = eval(&mut vm, b).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownSymbol);
        assert_eq!(err.message, "Unknown var: nope");
        assert_eq!(err.pos, SourcePos::new(2, 5));
        assert_eq!(vm.errors.len(), 1);
    }

    #[test]
    fn putvar_checks_type_in_safe_mode() {
        let mut vm = Vm::new();
        let x = vm.syms.intern("x");
        let int = vm.core.int;
        let mut b = bin();
        b.push(
            OpKind::Push { value: Lit::Sym(Sym::EMPTY) },
            SourcePos::UNKNOWN,
        );
        b.push(OpKind::PutVar { id: x, typ: Some(int) }, SourcePos::UNKNOWN);
        let err = eval(&mut vm, b).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "Expected type Int, actual: Sym");
    }

    #[test]
    fn putvar_skips_check_in_unsafe_mode() {
        let mut vm = Vm::with_safety(false);
        let x = vm.syms.intern("x");
        let int = vm.core.int;
        let mut b = bin();
        b.push(
            OpKind::Push { value: Lit::Sym(Sym::EMPTY) },
            SourcePos::UNKNOWN,
        );
        b.push(OpKind::PutVar { id: x, typ: Some(int) }, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().get_var(x), Some(Value::Sym(Sym::EMPTY)));
    }

    #[test]
    fn getconst_finds_core_types() {
        let mut vm = Vm::new();
        let int = vm.syms.intern("Int");
        let mut b = bin();
        b.push(OpKind::GetConst { id: int }, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        let core_int = vm.core.int;
        assert!(matches!(vm.scope().pop(), Some(Value::Type(t)) if t == core_int));
    }

    #[test]
    fn stash_boxes_whole_stack() {
        let mut vm = Vm::new();
        let mut b = bin();
        b.push(OpKind::Push { value: Lit::Int(1) }, SourcePos::UNKNOWN);
        b.push(OpKind::Push { value: Lit::Int(2) }, SourcePos::UNKNOWN);
        b.push(OpKind::Stash, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().stack_len(), 1);
        let v = vm.scope().pop();
        assert_eq!(
            v,
            Some(Value::stack_of(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn lambda_captures_and_runs_in_scope() {
        let mut vm = Vm::new();
        let x = vm.syms.intern("x");
        vm.scope().put_var(x, Value::Int(3));

        let mut b = bin();
        // lambda body: push x
        b.push(OpKind::Lambda { start: 1, len: 1 }, SourcePos::UNKNOWN);
        b.push(OpKind::GetVar { id: x }, SourcePos::UNKNOWN);
        b.push(OpKind::Stop, SourcePos::UNKNOWN);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));

        let l = vm.scope().pop();
        let Some(lambda) = l else { panic!("expected lambda") };
        vm.call_value(&lambda).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(vm.scope().pop(), Some(Value::Int(3)));
    }

    #[test]
    fn catch_recovers_and_runs_on_pop() {
        let mut vm = Vm::new();

        // handler: a native that marks itself by binding a var in root
        fn handler(vm: &mut Vm) -> EvalResult {
            let hit = vm.syms.intern("hit");
            vm.scope().put_var(hit, Value::Bool(true));
            Ok(())
        }
        let imp = vm.add_cfunc("on-err", [], [], handler);

        let mut b = bin();
        // 0: getvar of an unknown symbol fails; resume past it at pc 1
        let nope = vm.syms.intern("nope");
        b.push(OpKind::GetVar { id: nope }, SourcePos::UNKNOWN);
        b.push(OpKind::Stop, SourcePos::UNKNOWN);

        vm.push_catch(Value::Fimp(imp), Some(ErrorKind::UnknownSymbol), 1);
        eval(&mut vm, b).unwrap_or_else(|e| panic!("{e}"));

        // error recorded but recovered
        assert_eq!(vm.errors.len(), 1);

        // popping the armed catch invokes the handler
        vm.pop_catch(1).unwrap_or_else(|e| panic!("{e}"));
        let hit = vm.syms.intern("hit");
        assert_eq!(vm.scope().get_var(hit), Some(Value::Bool(true)));
    }

    #[test]
    fn pop_catch_underflow_reports() {
        let mut vm = Vm::new();
        let err = vm.pop_catch(2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HandlerPopFailure);
        assert_eq!(err.message, "Failed popping catch");
    }

    #[test]
    fn call_on_uncallable_value_is_unsupported() {
        let mut vm = Vm::new();
        let err = vm.call_value(&Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOp);
        assert_eq!(err.message, "Operation call not supported for type Int");
    }
}

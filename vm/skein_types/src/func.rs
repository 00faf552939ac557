//! Multimethods and their implementations.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use skein_ir::{FimpId, FuncId, Sym, TypeId};

use crate::TypeStore;

/// Index into the VM's native-routine table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct NativeId(u32);

impl NativeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        NativeId(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One declared parameter: an optional binding name and the required type.
///
/// Unnamed parameters are still popped during argument binding, then
/// discarded.
#[derive(Copy, Clone, Debug)]
pub struct Arg {
    pub name: Option<Sym>,
    pub typ: TypeId,
}

impl Arg {
    pub fn new(name: Sym, typ: TypeId) -> Self {
        Arg {
            name: Some(name),
            typ,
        }
    }

    pub fn anon(typ: TypeId) -> Self {
        Arg { name: None, typ }
    }
}

/// One declared return value.
#[derive(Copy, Clone, Debug)]
pub enum Ret {
    /// A fixed declared type.
    Type(TypeId),
    /// The same type as argument `n` carries at return time.
    SameAsArg(usize),
}

/// What runs when an implementation is entered.
#[derive(Copy, Clone, Debug)]
pub enum FimpBody {
    /// A registered native routine.
    Native(NativeId),
    /// A defined body: an op range recorded in the `Bin`'s entry table.
    Defined,
}

/// One type-guarded implementation of a multimethod.
#[derive(Debug)]
pub struct Fimp {
    pub id: FimpId,
    pub args: SmallVec<[Arg; 2]>,
    pub rets: SmallVec<[Ret; 1]>,
    pub body: FimpBody,
}

impl Fimp {
    /// Check applicability against live operand types.
    ///
    /// `stack` lists the runtime types of the scope's operand stack in
    /// stack order: the last element is the top of the stack and must
    /// satisfy the last declared parameter.
    pub fn matches(&self, stack: &[TypeId], types: &TypeStore) -> bool {
        if stack.len() < self.args.len() {
            return false;
        }
        let base = stack.len() - self.args.len();
        self.args
            .iter()
            .enumerate()
            .all(|(i, arg)| types.is(stack[base + i], arg.typ))
    }

    /// Specificity score: the sum of declared parameter levels.
    ///
    /// Deeper types score higher, so `(Int, Int)` out-ranks `(Num, Num)`
    /// when both apply.
    pub fn specificity(&self, types: &TypeStore) -> u32 {
        self.args.iter().map(|arg| types.level(arg.typ)).sum()
    }
}

/// A named multimethod: an ordered list of implementations.
///
/// Created once per distinct name and never removed.
#[derive(Debug)]
pub struct Func {
    pub name: Sym,
    pub id: FuncId,
    imps: Vec<Fimp>,
}

impl Func {
    /// Add an implementation, returning its handle.
    ///
    /// Declaration order is significant: it is the dispatch tie-break.
    pub fn add_imp(
        &mut self,
        args: impl IntoIterator<Item = Arg>,
        rets: impl IntoIterator<Item = Ret>,
        body: FimpBody,
    ) -> FimpId {
        let idx = u32::try_from(self.imps.len())
            .unwrap_or_else(|_| panic!("implementation index overflow"));
        let id = FimpId::new(self.id, idx);
        self.imps.push(Fimp {
            id,
            args: args.into_iter().collect(),
            rets: rets.into_iter().collect(),
            body,
        });
        id
    }

    pub fn imps(&self) -> &[Fimp] {
        &self.imps
    }

    pub fn imp(&self, idx: u32) -> Option<&Fimp> {
        self.imps.get(idx as usize)
    }

    /// Resolve a call against live operand types.
    ///
    /// Every applicable implementation competes; the greatest specificity
    /// wins. Equally-specific candidates resolve to the earliest-declared
    /// one (lowest implementation index) — the documented deterministic
    /// tie-break.
    pub fn resolve(&self, stack: &[TypeId], types: &TypeStore) -> Option<&Fimp> {
        let mut best: Option<(&Fimp, u32)> = None;

        for imp in &self.imps {
            if !imp.matches(stack, types) {
                continue;
            }
            let score = imp.specificity(types);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((imp, score)),
            }
        }

        debug!(
            func = self.id.raw(),
            resolved = best.map(|(imp, _)| imp.id.idx),
            "multimethod resolution"
        );
        best.map(|(imp, _)| imp)
    }
}

/// Registry of all multimethods in a VM session.
#[derive(Default)]
pub struct FuncStore {
    funcs: Vec<Func>,
    by_name: FxHashMap<Sym, FuncId>,
}

impl FuncStore {
    pub fn new() -> Self {
        FuncStore {
            funcs: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Define a multimethod, or return the existing one with this name.
    pub fn define(&mut self, name: Sym) -> FuncId {
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = FuncId::new(
            u32::try_from(self.funcs.len()).unwrap_or_else(|_| panic!("func id overflow")),
        );
        self.funcs.push(Func {
            name,
            id,
            imps: Vec::new(),
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn lookup(&self, name: Sym) -> Option<FuncId> {
        self.by_name.get(&name).copied()
    }

    /// Borrow a multimethod.
    ///
    /// # Panics
    /// Panics on an id this registry never produced.
    #[inline]
    pub fn get(&self, id: FuncId) -> &Func {
        &self.funcs[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: FuncId) -> &mut Func {
        &mut self.funcs[id.index()]
    }

    /// Borrow one implementation.
    ///
    /// # Panics
    /// Panics on a handle this registry never produced.
    pub fn fimp(&self, id: FimpId) -> &Fimp {
        self.funcs[id.func.index()]
            .imp(id.idx)
            .unwrap_or_else(|| panic!("unknown implementation index {}", id.idx))
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtoOps;
    use pretty_assertions::assert_eq;
    use skein_ir::SymTable;

    struct Fixture {
        types: TypeStore,
        funcs: FuncStore,
        num: TypeId,
        int: TypeId,
        sym: TypeId,
    }

    fn fixture() -> Fixture {
        let syms = SymTable::new();
        let mut types = TypeStore::new();
        let any = types.register(syms.intern("Any"), true, ProtoOps::baseline());
        let num = types.register(syms.intern("Num"), true, ProtoOps::baseline());
        let int = types.register(syms.intern("Int"), false, ProtoOps::baseline());
        let sym = types.register(syms.intern("Sym"), false, ProtoOps::baseline());
        types.derive(num, any);
        types.derive(int, num);
        types.derive(sym, any);
        Fixture {
            types,
            funcs: FuncStore::new(),
            num,
            int,
            sym,
        }
    }

    #[test]
    fn define_is_idempotent() {
        let syms = SymTable::new();
        let mut funcs = FuncStore::new();
        let plus = syms.intern("+");
        assert_eq!(funcs.define(plus), funcs.define(plus));
        assert_eq!(funcs.len(), 1);
    }

    #[test]
    fn more_specific_implementation_wins() {
        let mut fx = fixture();
        let syms = SymTable::new();
        let id = fx.funcs.define(syms.intern("+"));
        let f = fx.funcs.get_mut(id);
        let wide = f.add_imp(
            [Arg::anon(fx.num), Arg::anon(fx.num)],
            [Ret::Type(fx.num)],
            FimpBody::Defined,
        );
        let narrow = f.add_imp(
            [Arg::anon(fx.int), Arg::anon(fx.int)],
            [Ret::Type(fx.int)],
            FimpBody::Defined,
        );

        let f = fx.funcs.get(id);
        let live = [fx.int, fx.int];
        let resolved = f.resolve(&live, &fx.types).map(|imp| imp.id);
        assert_eq!(resolved, Some(narrow));

        // only the wide implementation accepts a bare Num
        let live = [fx.num, fx.num];
        let resolved = f.resolve(&live, &fx.types).map(|imp| imp.id);
        assert_eq!(resolved, Some(wide));
    }

    #[test]
    fn no_match_is_none() {
        let mut fx = fixture();
        let syms = SymTable::new();
        let id = fx.funcs.define(syms.intern("+"));
        fx.funcs.get_mut(id).add_imp(
            [Arg::anon(fx.int), Arg::anon(fx.int)],
            [Ret::Type(fx.int)],
            FimpBody::Defined,
        );

        let f = fx.funcs.get(id);
        assert!(f.resolve(&[fx.sym, fx.int], &fx.types).is_none());
        assert!(f.resolve(&[fx.int], &fx.types).is_none());
    }

    #[test]
    fn ties_resolve_to_declaration_order() {
        let mut fx = fixture();
        let syms = SymTable::new();
        let id = fx.funcs.define(syms.intern("pick"));
        let f = fx.funcs.get_mut(id);
        let first = f.add_imp([Arg::anon(fx.int)], [Ret::Type(fx.int)], FimpBody::Defined);
        f.add_imp([Arg::anon(fx.int)], [Ret::Type(fx.int)], FimpBody::Defined);

        let f = fx.funcs.get(id);
        let resolved = f.resolve(&[fx.int], &fx.types).map(|imp| imp.id);
        assert_eq!(resolved, Some(first));
    }

    #[test]
    fn top_of_stack_matches_last_parameter() {
        let mut fx = fixture();
        let syms = SymTable::new();
        let id = fx.funcs.define(syms.intern("scale"));
        fx.funcs.get_mut(id).add_imp(
            [Arg::anon(fx.num), Arg::anon(fx.int)],
            [Ret::Type(fx.num)],
            FimpBody::Defined,
        );

        let f = fx.funcs.get(id);
        // deeper stack entries below the parameters are ignored
        assert!(f.resolve(&[fx.sym, fx.num, fx.int], &fx.types).is_some());
        // Sym on top cannot satisfy the trailing Int parameter
        assert!(f.resolve(&[fx.num, fx.sym], &fx.types).is_none());
    }
}

//! The type registry and inheritance graph.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use skein_ir::{Sym, TypeId};

use crate::{ProtoOps, TagSet};

/// A node in the multiple-inheritance subtype DAG.
///
/// The `is` set is the transitive closure of the parent edges (plus self);
/// it is maintained eagerly by [`TypeStore::derive`] so subtype queries
/// never traverse the graph.
#[derive(Debug)]
pub struct Type {
    pub name: Sym,
    tag: TypeId,
    /// Longest inheritance chain to a root.
    level: u32,
    /// Abstract, dispatch-only types cannot be constructed directly.
    pub is_trait: bool,
    /// Protocol operations this type supports.
    pub proto: ProtoOps,
    parents: SmallVec<[TypeId; 2]>,
    children: SmallVec<[TypeId; 4]>,
    is: TagSet,
}

impl Type {
    #[inline]
    pub fn tag(&self) -> TypeId {
        self.tag
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Direct parents, in edge-insertion order.
    pub fn parents(&self) -> &[TypeId] {
        &self.parents
    }

    /// Direct children, in edge-insertion order.
    pub fn children(&self) -> &[TypeId] {
        &self.children
    }
}

/// Registry of all types in a VM session.
///
/// Tags are assigned monotonically and types are never destroyed
/// individually; [`TypeStore::reinit`] clears a type's edges while
/// preserving its tag for library teardown.
#[derive(Default)]
pub struct TypeStore {
    types: Vec<Type>,
    by_name: FxHashMap<Sym, TypeId>,
}

impl TypeStore {
    pub fn new() -> Self {
        TypeStore {
            types: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Register a new type, assigning the next tag.
    ///
    /// Self-membership in the subtype set is established here and survives
    /// for the registry's lifetime.
    pub fn register(&mut self, name: Sym, is_trait: bool, proto: ProtoOps) -> TypeId {
        let tag = TypeId::new(u32::try_from(self.types.len()).unwrap_or_else(|_| {
            // the registry would exhaust memory long before 4 billion types
            panic!("type tag overflow")
        }));
        let mut is = TagSet::new();
        is.insert(tag.raw());
        self.types.push(Type {
            name,
            tag,
            level: 0,
            is_trait,
            proto,
            parents: SmallVec::new(),
            children: SmallVec::new(),
            is,
        });
        self.by_name.insert(name, tag);
        tag
    }

    /// Look up a type by name.
    pub fn lookup(&self, name: Sym) -> Option<TypeId> {
        self.by_name.get(&name).copied()
    }

    /// Borrow a type record.
    ///
    /// # Panics
    /// Panics on a tag this registry never produced.
    #[inline]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    #[inline]
    pub fn level(&self, id: TypeId) -> u32 {
        self.types[id.index()].level
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// O(1) subtype query: is `child` a `parent`?
    ///
    /// Always true for `child == parent`; false for tags beyond the child's
    /// current bit-vector size.
    #[inline]
    pub fn is(&self, child: TypeId, parent: TypeId) -> bool {
        self.types[child.index()].is.contains(parent.raw())
    }

    /// Add an inheritance edge `child -> parent` and restore the transitive
    /// closure.
    ///
    /// The parent's entire ancestor set propagates into the child and into
    /// every existing descendant of the child, and `level` is recomputed as
    /// `max(level, parent.level + 1)` along the way. Correct for DAGs in
    /// any edge-insertion order; diamonds are legal.
    pub fn derive(&mut self, child: TypeId, parent: TypeId) {
        trace!(child = child.raw(), parent = parent.raw(), "derive edge");

        let c = &mut self.types[child.index()];
        if !c.parents.contains(&parent) {
            c.parents.push(parent);
        }
        let p = &mut self.types[parent.index()];
        if !p.children.contains(&child) {
            p.children.push(child);
        }

        self.propagate(child, parent);
    }

    fn propagate(&mut self, child: TypeId, parent: TypeId) {
        let (p_level, p_parents) = {
            let p = &self.types[parent.index()];
            (p.level, p.parents.clone())
        };

        {
            let c = &mut self.types[child.index()];
            c.is.insert(parent.raw());
            c.level = c.level.max(p_level + 1);
        }

        for gp in p_parents {
            self.propagate(child, gp);
        }

        let kids = self.types[child.index()].children.clone();
        for k in kids {
            self.propagate(k, parent);
        }
    }

    /// Detach a type from the graph while preserving its tag and
    /// self-membership.
    ///
    /// Edges to parents and children are removed and each direct child's
    /// level is recomputed from its remaining parents. This is a narrow
    /// teardown aid: derived bits in deeper descendants are left to their
    /// own reinit, exactly as in general library teardown where every type
    /// is reinitialized in turn.
    pub fn reinit(&mut self, id: TypeId) {
        let parents = std::mem::take(&mut self.types[id.index()].parents);
        for p in parents {
            self.types[p.index()].children.retain(|t| *t != id);
        }

        let children = std::mem::take(&mut self.types[id.index()].children);

        {
            let t = &mut self.types[id.index()];
            t.level = 0;
            t.is.clear_except(id.raw());
        }

        for c in children {
            let ct = &mut self.types[c.index()];
            ct.parents.retain(|t| *t != id);
            ct.is.remove(id.raw());
            let remaining = ct.parents.clone();
            let mut level = 0;
            for p in &remaining {
                level = level.max(self.types[p.index()].level + 1);
            }
            self.types[c.index()].level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skein_ir::SymTable;

    fn store_with(names: &[&str]) -> (SymTable, TypeStore, Vec<TypeId>) {
        let syms = SymTable::new();
        let mut store = TypeStore::new();
        let ids = names
            .iter()
            .map(|n| store.register(syms.intern(n), false, ProtoOps::baseline()))
            .collect();
        (syms, store, ids)
    }

    #[test]
    fn self_membership() {
        let (_syms, store, ids) = store_with(&["A"]);
        assert!(store.is(ids[0], ids[0]));
    }

    #[test]
    fn transitive_closure() {
        let (_syms, mut store, ids) = store_with(&["A", "B", "C"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        store.derive(b, a);
        store.derive(c, b);
        assert!(store.is(c, a));
        assert!(store.is(c, b));
        assert!(store.is(b, a));
        assert!(!store.is(a, c));
        assert_eq!(store.level(a), 0);
        assert_eq!(store.level(b), 1);
        assert_eq!(store.level(c), 2);
    }

    #[test]
    fn closure_holds_for_reversed_edge_order() {
        // derive(C,B) before derive(B,A): the new ancestor set of B must
        // still flow down into C.
        let (syms, mut store, ids) = store_with(&["A", "B", "C"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        store.derive(c, b);
        store.derive(b, a);
        assert!(store.is(c, a));
        assert_eq!(store.level(c), 2);

        // later edges keep extending downward
        let d = store.register(syms.intern("D"), false, ProtoOps::baseline());
        store.derive(d, c);
        assert!(store.is(d, a));
        assert_eq!(store.level(d), 3);
    }

    #[test]
    fn diamond_inheritance() {
        let (_syms, mut store, ids) = store_with(&["Top", "L", "R", "Bottom"]);
        let (top, l, r, bottom) = (ids[0], ids[1], ids[2], ids[3]);
        store.derive(l, top);
        store.derive(r, top);
        store.derive(bottom, l);
        store.derive(bottom, r);
        assert!(store.is(bottom, top));
        assert!(store.is(bottom, l));
        assert!(store.is(bottom, r));
        assert!(!store.is(l, r));
        assert_eq!(store.level(bottom), 2);
    }

    #[test]
    fn unrelated_types_are_not_subtypes() {
        let (_syms, mut store, ids) = store_with(&["A", "B"]);
        store.derive(ids[1], ids[0]);
        assert!(!store.is(ids[0], ids[1]));
    }

    #[test]
    fn reinit_detaches_edges() {
        let (_syms, mut store, ids) = store_with(&["A", "B", "C"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        store.derive(b, a);
        store.derive(c, b);

        store.reinit(b);

        assert!(store.is(b, b)); // tag and self-membership survive
        assert!(!store.is(b, a));
        assert!(!store.is(c, b));
        assert_eq!(store.level(b), 0);
        assert_eq!(store.level(c), 0);
        assert!(store.get(a).children().is_empty());
    }
}

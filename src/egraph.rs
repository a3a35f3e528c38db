//! L2 e-graph façade: stitches the union-find, memo, term bank relations,
//! and the ephemeral side-map into the public surface of `spec.md` §6
//! (`add_expr`, `add_enode`, `canonicalize`, `unify`, `lookup`, `is_equiv`).
//!
//! Grounded on `original_source/src/egraph.{h,cpp}` (`insert_term`/`unify`'s
//! shape) and `src/egraph_di.{h,cpp}` (the `EGraphLookupDI`/`EGraphEquivalenceDI`
//! capability split and the exact ephemeral-id scheme,
//! `id = ephemeral_map.size() | 0x80000000`).

use crate::error::InsertError;
use crate::id::ClassId;
use crate::language::{ENode, Expr};
use crate::multiset::Multiset;
use crate::symbol::{Arity, Symbol, Theory};
use crate::term_bank::{ACRelation, Memo, RebuildHandle, Relation, Row, RowStore};
use crate::union_find::UnionFind;
use crate::utils::log_macros::*;
use crate::utils::HashMap;
use std::fmt::Write as _;

/// Thin capability object over the union-find, passed to relation
/// `rebuild` calls so term-bank code can trigger unifications without a
/// direct, bidirectional dependency on [`EGraph`] (`spec.md` §9).
pub struct Handle<'a> {
    uf: &'a mut UnionFind,
}

impl RebuildHandle for Handle<'_> {
    fn find(&mut self, id: ClassId) -> ClassId {
        self.uf.find(id)
    }

    fn unify(&mut self, a: ClassId, b: ClassId) -> ClassId {
        self.uf.unify(a, b)
    }
}

/// The hash-consed e-graph: union-find, memo, per-operator relations, and
/// the ephemeral map for not-yet-materialised AC sub-terms.
pub struct EGraph {
    arities: HashMap<Symbol, Arity>,
    union_find: UnionFind,
    memo: Memo,
    relations: HashMap<Symbol, Relation>,
    ephemeral: Vec<Option<ENode>>,
}

impl EGraph {
    /// Builds an e-graph over `theory`'s declared operators. The theory's
    /// rewrite rules are not consulted here — they are compiled separately
    /// by [`crate::compiler::Compiler`] and driven by
    /// [`crate::saturate::Runner`].
    pub fn new(theory: &Theory) -> Self {
        let mut arities = HashMap::default();
        for (name_sym, arity) in theory.symbols().all_arities() {
            arities.insert(name_sym, arity);
        }
        EGraph {
            arities,
            union_find: UnionFind::new(),
            memo: Memo::new(),
            relations: HashMap::default(),
            ephemeral: Vec::new(),
        }
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    /// Total number of hash-consed e-nodes — a proxy for e-graph size used
    /// by the saturation driver's node-limit check and run report.
    pub fn node_count(&self) -> usize {
        self.memo.len()
    }

    /// Number of distinct e-classes currently live (after path compression
    /// this walks every allocated id, so it is `O(n)`, not cached).
    pub fn class_count(&self) -> usize {
        let mut roots = HashMap::default();
        for i in 0..self.union_find.len() as u32 {
            roots.insert(self.union_find.find_const(ClassId::new(i)), ());
        }
        roots.len()
    }

    pub fn relations(&self) -> &HashMap<Symbol, Relation> {
        &self.relations
    }

    pub fn relations_mut(&mut self) -> &mut HashMap<Symbol, Relation> {
        &mut self.relations
    }

    fn relation_mut(&mut self, op: Symbol) -> &mut Relation {
        let arity = *self.arities.get(&op).unwrap_or_else(|| panic!("unknown operator {op:?}"));
        self.relations.entry(op).or_insert_with(|| match arity {
            Arity::Ac => Relation::Ac(ACRelation::new(op)),
            Arity::Fixed(n) => Relation::Row(RowStore::new(op, n)),
        })
    }

    /// Canonicalizes a class id through the union-find. Ephemeral ids are
    /// returned unchanged — they are not yet part of the union-find.
    pub fn canonicalize(&mut self, id: ClassId) -> ClassId {
        if id.is_ephemeral() {
            id
        } else {
            self.union_find.find(id)
        }
    }

    pub fn is_equiv(&mut self, a: ClassId, b: ClassId) -> bool {
        assert!(!a.is_ephemeral() && !b.is_ephemeral(), "is_equiv on an ephemeral id");
        self.canonicalize(a) == self.canonicalize(b)
    }

    /// Unifies two real (non-ephemeral) classes. Ephemeral ids must be
    /// resolved via [`Self::resolve_ephemeral`] first.
    pub fn unify(&mut self, a: ClassId, b: ClassId) -> ClassId {
        assert!(!a.is_ephemeral() && !b.is_ephemeral(), "unify on an ephemeral id");
        self.union_find.unify(a, b)
    }

    /// Canonical memo key for `(op, children)`: AC operators compare with
    /// sorted children, ordinary operators element-wise.
    fn canonical_key(&self, op: Symbol, mut children: Vec<ClassId>) -> ENode {
        if self.arities.get(&op).copied() == Some(Arity::Ac) {
            children.sort_unstable();
        }
        ENode::new(op, children)
    }

    pub fn lookup(&self, op: Symbol, children: Vec<ClassId>) -> Option<ClassId> {
        self.memo.lookup(&self.canonical_key(op, children))
    }

    /// Inserts `(op, children)`, resolving any ephemeral child ids to real
    /// classes first, hash-consing against the memo, and allocating a
    /// fresh class (and term-bank row/term) on a miss.
    pub fn add_enode(&mut self, op: Symbol, children: Vec<ClassId>) -> ClassId {
        let children: Vec<ClassId> =
            children.into_iter().map(|c| self.resolve_ephemeral(c)).collect();
        let key = self.canonical_key(op, children.clone());
        if let Some(class) = self.memo.lookup(&key) {
            return class;
        }
        let class = self.union_find.make();
        self.memo.insert(key, class);
        let arity = self.arities.get(&op).copied().unwrap_or_else(|| panic!("unknown operator {op:?}"));
        match arity {
            Arity::Ac => {
                let multiset = Multiset::from_iter(children);
                let rel = self.relation_mut(op).as_ac_mut().expect("AC relation");
                rel.add_tuple(class, multiset, &mut self.memo);
            }
            Arity::Fixed(_) => {
                let mut row = Row::from_vec(children);
                row.push(class);
                self.relation_mut(op).as_row_mut().expect("row relation").add_tuple(row);
            }
        }
        trace!("add_enode {op:?} -> {class:?}");
        class
    }

    /// Adds a ground expression tree, rejecting pattern variables.
    pub fn add_expr(&mut self, expr: &Expr) -> Result<ClassId, InsertError> {
        match expr {
            Expr::Var(sym) => Err(InsertError::PatternVariable(*sym)),
            Expr::App(op, children) => {
                let mut ids = Vec::with_capacity(children.len());
                for c in children {
                    ids.push(self.add_expr(c)?);
                }
                Ok(self.add_enode(*op, ids))
            }
        }
    }

    /// Looks up the canonical e-node in the memo, returning its class if
    /// present, or allocating a fresh **ephemeral** class otherwise — used
    /// by the query engine to bind a variable to a sub-term that has not
    /// been materialised for real yet (`spec.md` §4.5/§4.7).
    pub fn lookup_or_ephemeral(&mut self, op: Symbol, children: Vec<ClassId>) -> ClassId {
        let key = self.canonical_key(op, children.clone());
        if let Some(class) = self.memo.lookup(&key) {
            return class;
        }
        let idx = self.ephemeral.len() as u32;
        self.ephemeral.push(Some(ENode::new(op, children)));
        ClassId::ephemeral(idx)
    }

    /// Resolves an ephemeral id to a real class: reuses an existing memo
    /// entry if one now exists, otherwise materialises the e-node for
    /// real. Ordinary ids pass through [`Self::canonicalize`] unchanged.
    pub fn resolve_ephemeral(&mut self, id: ClassId) -> ClassId {
        if !id.is_ephemeral() {
            return self.canonicalize(id);
        }
        let enode = self.ephemeral[id.ephemeral_index()]
            .take()
            .expect("ephemeral id resolved more than once");
        let children: Vec<ClassId> =
            enode.children.iter().map(|&c| self.resolve_ephemeral(c)).collect();
        self.add_enode(enode.op, children)
    }

    /// True once every outstanding ephemeral id has been resolved —
    /// checked at the end of a match/apply cycle (R4 of `spec.md` §4.8).
    pub fn ephemeral_is_empty(&self) -> bool {
        self.ephemeral.iter().all(Option::is_none)
    }

    /// Drops the (already-resolved) ephemeral slots, readying the map for
    /// the next saturation iteration.
    pub fn clear_ephemeral(&mut self) {
        assert!(self.ephemeral_is_empty(), "ephemeral id escaped an iteration (R4 violation)");
        self.ephemeral.clear();
    }

    /// Runs every relation's `rebuild` to a fixpoint, then rebuilds the
    /// memo wholesale from the (now-canonical) relations — the recommended
    /// Open Question (a) resolution of `spec.md` §9.
    pub fn rebuild(&mut self) -> bool {
        assert!(self.ephemeral_is_empty(), "rebuild entered with a live ephemeral id (R4 violation)");
        let mut any_changed = false;
        let mut passes = 0u32;
        loop {
            let mut changed = false;
            let mut handle = Handle { uf: &mut self.union_find };
            for relation in self.relations.values_mut() {
                if relation.rebuild(&mut handle) {
                    changed = true;
                }
            }
            any_changed |= changed;
            passes += 1;
            assert!(passes <= 1000, "rebuild did not reach a fixpoint within 1000 passes");
            if !changed {
                break;
            }
        }
        self.rebuild_memo();
        debug!("rebuild converged after {passes} pass(es), changed={any_changed}");
        any_changed
    }

    fn rebuild_memo(&mut self) {
        let mut fresh = HashMap::default();
        for relation in self.relations.values() {
            match relation {
                Relation::Row(rs) => {
                    for row in rs.rows() {
                        let (args, class) = row.split_at(row.len() - 1);
                        fresh.insert(ENode::new(rs.operator, args.to_vec()), class[0]);
                    }
                }
                Relation::Ac(ac) => {
                    for (_term, mset, class) in ac.iter() {
                        fresh.entry(ENode::new(ac.operator, mset.collect())).or_insert(class);
                    }
                }
            }
        }
        self.memo.replace(fresh);
    }

    /// Deterministic textual dump: a union-find block (root: members…)
    /// followed by one block per relation — `eclass:termid: mset` lines
    /// for AC relations, raw tuples for row stores — mirroring
    /// `original_source`'s `union_find.cpp`/`relation_ac.cpp`/`row_store.cpp`
    /// dump formats.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        writeln!(out, "# union-find").unwrap();
        out.push_str(&self.union_find.dump());

        let mut ops: Vec<&Symbol> = self.relations.keys().collect();
        ops.sort_unstable();
        for op in ops {
            let relation = &self.relations[op];
            writeln!(out, "# relation {op:?}").unwrap();
            match relation {
                Relation::Row(rs) => {
                    let mut rows: Vec<String> =
                        rs.rows().iter().map(|r| format!("{r:?}")).collect();
                    rows.sort();
                    for r in rows {
                        writeln!(out, "{r}").unwrap();
                    }
                }
                Relation::Ac(ac) => {
                    let mut lines: Vec<String> = ac
                        .iter()
                        .map(|(t, m, c)| format!("{c:?}:{t:?}: {:?}", m.iter_nonzero().collect::<Vec<_>>()))
                        .collect();
                    lines.sort();
                    for l in lines {
                        writeln!(out, "{l}").unwrap();
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theory_with_mul_one(ac: bool) -> (Theory, Symbol, Symbol, Symbol) {
        let mut t = Theory::new();
        let one = t.add_operator("one", Arity::Fixed(0));
        let var = t.add_operator("var", Arity::Fixed(0));
        let mul = t.add_operator("mul", if ac { Arity::Ac } else { Arity::Fixed(2) });
        (t, one, var, mul)
    }

    #[test]
    fn hash_consing_returns_same_class() {
        let (theory, one, _var, _mul) = theory_with_mul_one(false);
        let mut g = EGraph::new(&theory);
        let a = g.add_enode(one, vec![]);
        let b = g.add_enode(one, vec![]);
        assert_eq!(a, b);
    }

    #[test]
    fn ac_hash_consing_ignores_argument_order() {
        let (theory, _one, var, mul) = theory_with_mul_one(true);
        let mut g = EGraph::new(&theory);
        let v = g.add_enode(var, vec![]);
        let a = g.add_enode(mul, vec![v, v]);
        let b = g.add_enode(mul, vec![v, v]);
        assert_eq!(a, b);
    }

    #[test]
    fn reflexivity_holds() {
        let (theory, one, _, _) = theory_with_mul_one(false);
        let mut g = EGraph::new(&theory);
        let a = g.add_enode(one, vec![]);
        assert!(g.is_equiv(a, a));
    }

    #[test]
    fn congruence_after_unify() {
        let mut t = Theory::new();
        let a = t.add_operator("a", Arity::Fixed(0));
        let b = t.add_operator("b", Arity::Fixed(0));
        let f = t.add_operator("f", Arity::Fixed(1));
        let mut g = EGraph::new(&t);
        let ca = g.add_enode(a, vec![]);
        let cb = g.add_enode(b, vec![]);
        let fa = g.add_enode(f, vec![ca]);
        let fb = g.add_enode(f, vec![cb]);
        assert!(!g.is_equiv(fa, fb));
        g.unify(ca, cb);
        g.rebuild();
        assert!(g.is_equiv(fa, fb));
    }

    #[test]
    fn ephemeral_lookup_materialises_on_resolve() {
        let (theory, _one, var, mul) = theory_with_mul_one(true);
        let mut g = EGraph::new(&theory);
        let v = g.add_enode(var, vec![]);
        let eph = g.lookup_or_ephemeral(mul, vec![v]);
        assert!(eph.is_ephemeral());
        let real = g.resolve_ephemeral(eph);
        assert!(!real.is_ephemeral());
        assert!(g.ephemeral_is_empty());
        let direct = g.add_enode(mul, vec![v]);
        assert_eq!(real, direct);
    }
}

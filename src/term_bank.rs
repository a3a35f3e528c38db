//! L1 term store: [`RowStore`] for ordinary operators, [`ACRelation`] for
//! AC operators, and the [`Memo`] hash-cons table that sits alongside them.
//!
//! Grounded on `original_source/src/relations/{row_store,relation_ac,abstract_relation}.{h,cpp}`:
//! `RowStore::rebuild` is the sort-merge-unify-dedupe walk from `row_store.cpp`;
//! `ACRelation::add_tuple`'s two-pass decomposition worklist and `rebuild`'s
//! congruent-duplicate compaction are ported from `relation_ac.cpp`. The
//! `std::variant<RowStore, RelationAC>` tagged union becomes the `Relation`
//! enum here, per `spec.md` §9's "closed sum, not virtual dispatch" note.

use crate::id::{ClassId, TermId};
use crate::language::ENode;
use crate::multiset::Multiset;
use crate::symbol::Symbol;
use crate::utils::HashMap;
use smallvec::SmallVec;

/// Capability a relation's `rebuild` needs from the e-graph, without
/// depending on the e-graph type itself — the "handle" of `spec.md` §9.
pub trait RebuildHandle {
    fn find(&mut self, id: ClassId) -> ClassId;
    fn unify(&mut self, a: ClassId, b: ClassId) -> ClassId;
}

/// Hash-cons table: canonical e-node (AC children pre-sorted by the
/// caller) to class id.
#[derive(Debug, Default)]
pub struct Memo {
    map: HashMap<ENode, ClassId>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, enode: &ENode) -> Option<ClassId> {
        self.map.get(enode).copied()
    }

    pub fn insert(&mut self, enode: ENode, class: ClassId) {
        self.map.insert(enode, class);
    }

    pub fn remove(&mut self, enode: &ENode) -> Option<ClassId> {
        self.map.remove(enode)
    }

    pub fn contains(&self, enode: &ENode) -> bool {
        self.map.contains_key(enode)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ENode, &ClassId)> {
        self.map.iter()
    }

    /// Wholesale replacement, used by the rebuild loop's recommended
    /// option (a): rebuild the memo from relations after every rebuild
    /// pass rather than track a staleness worklist (`spec.md` §9).
    pub fn replace(&mut self, map: HashMap<ENode, ClassId>) {
        self.map = map;
    }
}

/// A row: `arity` child class ids followed by the owning class id.
pub type Row = SmallVec<[ClassId; 5]>;

/// Flat tuple array for a non-AC operator: each row is `(args…, class_id)`.
#[derive(Debug, Clone)]
pub struct RowStore {
    pub operator: Symbol,
    pub arity: u32,
    rows: Vec<Row>,
}

impl RowStore {
    pub fn new(operator: Symbol, arity: u32) -> Self {
        RowStore { operator, arity, rows: Vec::new() }
    }

    pub fn add_tuple(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.arity as usize + 1);
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Canonicalizes every id, sorts by argument columns, merges rows that
    /// agree on arguments but disagree on class id (unifying the
    /// survivors), and compacts duplicate rows. Returns whether anything
    /// changed.
    pub fn rebuild<H: RebuildHandle>(&mut self, handle: &mut H) -> bool {
        let mut changed = false;
        for row in self.rows.iter_mut() {
            for id in row.iter_mut() {
                let c = handle.find(*id);
                if c != *id {
                    *id = c;
                    changed = true;
                }
            }
        }
        let n = self.arity as usize;
        self.rows.sort_unstable_by(|a, b| a[..n].cmp(&b[..n]));

        let mut i = 0;
        while i + 1 < self.rows.len() {
            if self.rows[i][..n] == self.rows[i + 1][..n] {
                let a = self.rows[i][n];
                let b = self.rows[i + 1][n];
                if a != b {
                    let survivor = handle.unify(a, b);
                    self.rows[i][n] = survivor;
                    self.rows[i + 1][n] = survivor;
                    changed = true;
                }
            }
            i += 1;
        }
        let before = self.rows.len();
        self.rows.dedup();
        if self.rows.len() != before {
            changed = true;
        }
        changed
    }
}

/// AC term store: `TermId -> Multiset<ClassId>` plus `TermId -> ClassId`.
#[derive(Debug, Clone)]
pub struct ACRelation {
    pub operator: Symbol,
    terms: Vec<Multiset>,
    classes: Vec<ClassId>,
}

impl ACRelation {
    pub fn new(operator: Symbol) -> Self {
        ACRelation { operator, terms: Vec::new(), classes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn multiset(&self, term: TermId) -> &Multiset {
        &self.terms[term.index()]
    }

    pub fn class_of(&self, term: TermId) -> ClassId {
        self.classes[term.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (TermId, &Multiset, ClassId)> {
        self.terms
            .iter()
            .zip(self.classes.iter())
            .enumerate()
            .map(|(i, (m, &c))| (TermId::new(i as u32), m, c))
    }

    fn enode_of(&self, multiset: &Multiset) -> ENode {
        ENode::new(self.operator, multiset.collect())
    }

    /// Installs a derived decomposition multiset under `class_id` if no
    /// equivalent e-node is memoised yet, appending a fresh `TermId`.
    fn install_decomposition(&mut self, derived: Multiset, class_id: ClassId, memo: &mut Memo) {
        let enode = self.enode_of(&derived);
        if memo.lookup(&enode).is_some() {
            return;
        }
        memo.insert(enode, class_id);
        self.terms.push(derived);
        self.classes.push(class_id);
    }

    /// The core AC insertion algorithm (`spec.md` §4.3): decomposes the
    /// new multiset against every existing entry it strictly contains or
    /// is strictly contained by, pre-installing shared sub-bag structure
    /// into the memo so congruence fires on simple lookups later. Then
    /// appends `(class_id, multiset)` as a fresh term.
    pub fn add_tuple(&mut self, class_id: ClassId, multiset: Multiset, memo: &mut Memo) -> TermId {
        let existing = self.terms.len();

        for i in 0..existing {
            let other = &self.terms[i];
            if *other != multiset && other.includes(&multiset) {
                let other_class = self.classes[i];
                let mut derived = other.msetdiff(&multiset);
                derived.insert(class_id, 1);
                self.install_decomposition(derived, other_class, memo);
            }
        }
        for i in 0..existing {
            let inner = &self.terms[i];
            if *inner != multiset && multiset.includes(inner) {
                let inner_class = self.classes[i];
                let mut derived = multiset.msetdiff(inner);
                derived.insert(inner_class, 1);
                self.install_decomposition(derived, class_id, memo);
            }
        }

        let id = TermId::new(self.terms.len() as u32);
        self.terms.push(multiset);
        self.classes.push(class_id);
        id
    }

    /// Canonicalizes class ids and every multiset entry, unifies
    /// AC-congruent duplicates (equal multisets, different classes), and
    /// compacts the term list so each distinct multiset keeps exactly one
    /// representative `TermId`.
    pub fn rebuild<H: RebuildHandle>(&mut self, handle: &mut H) -> bool {
        let mut changed = false;
        for i in 0..self.terms.len() {
            let c = handle.find(self.classes[i]);
            if c != self.classes[i] {
                self.classes[i] = c;
                changed = true;
            }
            if self.terms[i].map(|id| handle.find(id)) {
                changed = true;
            }
        }

        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::default();
        for (i, m) in self.terms.iter().enumerate() {
            buckets.entry(m.hash()).or_default().push(i);
        }
        for idxs in buckets.values() {
            for w in 1..idxs.len() {
                let a = idxs[0];
                let b = idxs[w];
                if self.terms[a] == self.terms[b] {
                    let ca = self.classes[a];
                    let cb = self.classes[b];
                    if ca != cb {
                        let survivor = handle.unify(ca, cb);
                        self.classes[a] = survivor;
                        self.classes[b] = survivor;
                        changed = true;
                    }
                }
            }
        }

        let mut new_terms: Vec<Multiset> = Vec::new();
        let mut new_classes: Vec<ClassId> = Vec::new();
        let mut reps: HashMap<u64, Vec<usize>> = HashMap::default();
        for i in 0..self.terms.len() {
            let fp = self.terms[i].hash();
            let bucket = reps.entry(fp).or_default();
            let found = bucket.iter().find(|&&j| new_terms[j] == self.terms[i]).copied();
            match found {
                Some(_) => {}
                None => {
                    bucket.push(new_terms.len());
                    new_terms.push(self.terms[i].clone());
                    new_classes.push(self.classes[i]);
                }
            }
        }
        if new_terms.len() != self.terms.len() {
            changed = true;
        }
        self.terms = new_terms;
        self.classes = new_classes;
        changed
    }
}

/// Closed sum over the two relation flavours — a tagged union with inline
/// dispatch, not an open trait-object hierarchy (`spec.md` §9).
#[derive(Debug, Clone)]
pub enum Relation {
    Row(RowStore),
    Ac(ACRelation),
}

impl Relation {
    pub fn operator(&self) -> Symbol {
        match self {
            Relation::Row(r) => r.operator,
            Relation::Ac(r) => r.operator,
        }
    }

    pub fn rebuild<H: RebuildHandle>(&mut self, handle: &mut H) -> bool {
        match self {
            Relation::Row(r) => r.rebuild(handle),
            Relation::Ac(r) => r.rebuild(handle),
        }
    }

    pub fn as_row(&self) -> Option<&RowStore> {
        match self {
            Relation::Row(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_row_mut(&mut self) -> Option<&mut RowStore> {
        match self {
            Relation::Row(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ac(&self) -> Option<&ACRelation> {
        match self {
            Relation::Ac(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ac_mut(&mut self) -> Option<&mut ACRelation> {
        match self {
            Relation::Ac(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ClassId {
        ClassId::new(n)
    }
    fn mset(ids: &[u32]) -> Multiset {
        Multiset::from_iter(ids.iter().map(|&n| id(n)))
    }

    struct Unifier {
        surv: ClassId,
    }
    impl RebuildHandle for Unifier {
        fn find(&mut self, id: ClassId) -> ClassId {
            id
        }
        fn unify(&mut self, _a: ClassId, _b: ClassId) -> ClassId {
            self.surv
        }
    }

    #[test]
    fn row_store_merges_matching_args() {
        let op = Symbol(0);
        let mut rs = RowStore::new(op, 1);
        rs.add_tuple(Row::from_slice(&[id(1), id(10)]));
        rs.add_tuple(Row::from_slice(&[id(1), id(20)]));
        let mut u = Unifier { surv: id(10) };
        let changed = rs.rebuild(&mut u);
        assert!(changed);
        assert!(rs.rows().iter().all(|r| r[1] == id(10)));
    }

    #[test]
    fn ac_relation_decomposes_superset_insertion() {
        let op = Symbol(1);
        let mut ac = ACRelation::new(op);
        let mut memo = Memo::new();
        ac.add_tuple(id(100), mset(&[1, 2, 3]), &mut memo);
        // inserting {1,2} (a strict subset of {1,2,3}) should derive a
        // decomposition op(100_sub, 3) memoised under class 100.
        ac.add_tuple(id(200), mset(&[1, 2]), &mut memo);
        assert_eq!(ac.len(), 3); // original, derived decomposition, new term
        assert!(memo.len() >= 1);
    }

    #[test]
    fn ac_relation_rebuild_unifies_congruent_duplicates() {
        let op = Symbol(2);
        let mut ac = ACRelation::new(op);
        let mut memo = Memo::new();
        ac.add_tuple(id(5), mset(&[1, 2]), &mut memo);
        ac.add_tuple(id(6), mset(&[1, 2]), &mut memo);
        struct U;
        impl RebuildHandle for U {
            fn find(&mut self, id: ClassId) -> ClassId {
                id
            }
            fn unify(&mut self, a: ClassId, b: ClassId) -> ClassId {
                if a.raw() < b.raw() { a } else { b }
            }
        }
        let changed = ac.rebuild(&mut U);
        assert!(changed);
        assert_eq!(ac.len(), 1);
    }
}

//! L2 indices: [`TrieIndex`] over a permuted [`RowStore`], [`MultisetIndex`]
//! over an [`ACRelation`]. Both expose the uniform cursor API of
//! `spec.md` §4.5: `project`/`select`/`unselect`/`reset`/`make_enode`.
//!
//! Grounded on `original_source/src/indices/{trie_index,multiset_index,abstract_index}.{h,cpp}`
//! and `src/trie.h`/`src/sets/*`: the trie is rebuilt from an arena of
//! sorted-child nodes (the C++ `TrieNode{keys, children}` pair, ported here
//! as a safe index-based arena rather than `shared_ptr<TrieNode>` children —
//! Rust has no use for the original's reference counting since an index's
//! arena is owned outright and rebuilt wholesale, never shared); the
//! `MultisetIndex`'s history-stack decrement/increment is ported from
//! `multiset_index.cpp`'s `select`/`unselect`.

use crate::id::{ClassId, TermId};
use crate::language::ENode;
use crate::multiset::Multiset;
use crate::symbol::Symbol;
use crate::term_bank::{ACRelation, RowStore};

/// The uniform index cursor contract of `spec.md` §4.5. `project` reports
/// the ids still consistent with commitments so far; `select`/`unselect`
/// move the cursor one level down/up; `make_enode` reconstructs the
/// concrete e-node the cursor currently represents (used to materialise
/// ephemeral AC sub-terms).
pub trait Cursor {
    fn project(&self) -> Vec<ClassId>;
    fn select(&mut self, id: ClassId);
    fn unselect(&mut self);
    fn reset(&mut self);
    fn at_leaf(&self) -> bool;
    fn make_enode(&self) -> ENode;
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    entries: Vec<(ClassId, usize)>,
}

/// A trie over a permutation of a [`RowStore`]'s columns. `perm[d]` names
/// which physical row column is read at trie depth `d`.
#[derive(Debug, Clone)]
pub struct TrieIndex {
    operator: Symbol,
    arity: usize,
    perm: Vec<usize>,
    arena: Vec<TrieNode>,
    stack: Vec<usize>,
    path: Vec<ClassId>,
}

impl TrieIndex {
    /// Builds a fresh trie from `store`'s current rows, permuted by `perm`
    /// (length `arity + 1`, `perm[d]` = physical column visited at depth `d`).
    pub fn build(store: &RowStore, perm: Vec<usize>) -> Self {
        debug_assert_eq!(perm.len(), store.arity as usize + 1);
        let mut idx = TrieIndex {
            operator: store.operator,
            arity: store.arity as usize,
            perm,
            arena: vec![TrieNode::default()],
            stack: vec![0],
            path: Vec::new(),
        };
        for row in store.rows() {
            idx.insert_path(row);
        }
        idx
    }

    fn insert_path(&mut self, row: &[ClassId]) {
        let mut cur = 0usize;
        for &col in &self.perm {
            let key = row[col];
            let pos = self.arena[cur].entries.binary_search_by_key(&key, |&(k, _)| k);
            cur = match pos {
                Ok(i) => self.arena[cur].entries[i].1,
                Err(i) => {
                    let new_idx = self.arena.len();
                    self.arena.push(TrieNode::default());
                    self.arena[cur].entries.insert(i, (key, new_idx));
                    new_idx
                }
            };
        }
    }

    fn current(&self) -> usize {
        *self.stack.last().expect("trie cursor stack is never empty")
    }
}

impl Cursor for TrieIndex {
    fn project(&self) -> Vec<ClassId> {
        self.arena[self.current()].entries.iter().map(|&(k, _)| k).collect()
    }

    fn select(&mut self, id: ClassId) {
        let cur = self.current();
        let pos = self.arena[cur]
            .entries
            .binary_search_by_key(&id, |&(k, _)| k)
            .expect("select: id not present in project() set");
        let child = self.arena[cur].entries[pos].1;
        self.stack.push(child);
        self.path.push(id);
    }

    fn unselect(&mut self) {
        assert!(self.stack.len() > 1, "unselect past the trie root");
        self.stack.pop();
        self.path.pop();
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(0);
        self.path.clear();
    }

    fn at_leaf(&self) -> bool {
        self.path.len() == self.perm.len()
    }

    fn make_enode(&self) -> ENode {
        debug_assert!(self.at_leaf());
        let mut row = vec![ClassId::new(0); self.perm.len()];
        for (d, &col) in self.perm.iter().enumerate() {
            row[col] = self.path[d];
        }
        ENode::new(self.operator, row[..self.arity].to_vec())
    }
}

impl TrieIndex {
    /// The class-id column's value at the current leaf (only meaningful
    /// when `at_leaf()`).
    pub fn class_id(&self) -> ClassId {
        let d = self.perm.iter().position(|&c| c == self.arity).expect("perm covers class-id column");
        self.path[d]
    }
}

/// Two-level cursor over an [`ACRelation`]: the first `select` picks a
/// `TermId` (encoded as a `ClassId` whose raw value is the term id, never
/// ephemeral); subsequent `select`s pick argument class ids from that
/// term's multiset, decrementing counts and pushing a history entry so
/// `unselect` can restore them.
#[derive(Debug, Clone)]
pub struct MultisetIndex {
    operator: Symbol,
    entries: Vec<(TermId, Multiset, ClassId)>,
    term_cursor: Option<usize>,
    working: Option<Multiset>,
    history: Vec<ClassId>,
}

impl MultisetIndex {
    pub fn build(relation: &ACRelation) -> Self {
        let entries = relation.iter().map(|(t, m, c)| (t, m.clone(), c)).collect();
        MultisetIndex { operator: relation.operator, entries, term_cursor: None, working: None, history: Vec::new() }
    }

    pub fn is_at_term_level(&self) -> bool {
        self.term_cursor.is_none()
    }

    /// The `TermId` currently selected (after the first `select`).
    pub fn current_term(&self) -> Option<TermId> {
        self.term_cursor.map(|i| self.entries[i].0)
    }

    /// The owning class id of the currently selected term (the un-decomposed
    /// whole, used when the residual is fully consumed).
    pub fn current_term_class(&self) -> Option<ClassId> {
        self.term_cursor.map(|i| self.entries[i].2)
    }

    /// How many argument elements remain unconsumed in the working multiset.
    pub fn residual(&self) -> Option<&Multiset> {
        self.working.as_ref()
    }

    pub fn residual_is_empty(&self) -> bool {
        self.working.as_ref().map(Multiset::is_empty).unwrap_or(true)
    }
}

impl Cursor for MultisetIndex {
    fn project(&self) -> Vec<ClassId> {
        match self.term_cursor {
            None => {
                let mut ids: Vec<ClassId> =
                    self.entries.iter().map(|(t, _, _)| ClassId::new(t.0)).collect();
                ids.sort_unstable();
                ids
            }
            Some(_) => {
                let mset = self.working.as_ref().expect("term selected implies working set");
                let mut ids: Vec<ClassId> = mset.iter_nonzero().map(|(id, _)| id).collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        }
    }

    fn select(&mut self, id: ClassId) {
        match self.term_cursor {
            None => {
                let term = TermId::new(id.raw());
                let i = self
                    .entries
                    .iter()
                    .position(|(t, _, _)| *t == term)
                    .expect("select: term id not present in project() set");
                self.term_cursor = Some(i);
                self.working = Some(self.entries[i].1.clone());
            }
            Some(_) => {
                let mset = self.working.as_mut().expect("term selected implies working set");
                assert!(mset.contains(id), "select: argument id not present in residual");
                mset.remove(id);
                self.history.push(id);
            }
        }
    }

    fn unselect(&mut self) {
        if let Some(id) = self.history.pop() {
            let mset = self.working.as_mut().expect("history implies working set");
            mset.insert(id, 1);
        } else {
            self.term_cursor = None;
            self.working = None;
        }
    }

    fn reset(&mut self) {
        self.term_cursor = None;
        self.working = None;
        self.history.clear();
    }

    fn at_leaf(&self) -> bool {
        // Leaf-ness for a MultisetIndex is query-dependent (how many direct
        // children the AC pattern node has); the query engine tracks depth
        // itself and calls `make_enode` only once all direct children are
        // selected. See `query_engine.rs`.
        self.term_cursor.is_some()
    }

    /// The consumed-so-far sub-term: `op` applied to the history of
    /// selected argument ids (sorted), the AC-canonical form.
    fn make_enode(&self) -> ENode {
        let mut children = self.history.clone();
        children.sort_unstable();
        ENode::new(self.operator, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term_bank::Memo;

    fn id(n: u32) -> ClassId {
        ClassId::new(n)
    }

    #[test]
    fn trie_round_trips_a_row() {
        let op = Symbol(9);
        let mut rs = RowStore::new(op, 2);
        rs.add_tuple(crate::term_bank::Row::from_slice(&[id(1), id(2), id(100)]));
        let trie = TrieIndex::build(&rs, vec![0, 1, 2]);
        assert_eq!(trie.project(), vec![id(1)]);
    }

    #[test]
    fn trie_select_descends_and_unselect_restores() {
        let op = Symbol(9);
        let mut rs = RowStore::new(op, 1);
        rs.add_tuple(crate::term_bank::Row::from_slice(&[id(1), id(10)]));
        rs.add_tuple(crate::term_bank::Row::from_slice(&[id(2), id(20)]));
        let mut trie = TrieIndex::build(&rs, vec![0, 1]);
        let before = trie.project();
        trie.select(id(1));
        assert_eq!(trie.project(), vec![id(10)]);
        trie.unselect();
        assert_eq!(trie.project(), before);
    }

    #[test]
    fn multiset_index_term_then_argument_selection() {
        let op = Symbol(3);
        let mut ac = ACRelation::new(op);
        let mut memo = Memo::new();
        let t = ac.add_tuple(id(50), Multiset::from_iter([id(1), id(1), id(2)]), &mut memo);
        let mut mi = MultisetIndex::build(&ac);
        mi.select(ClassId::new(t.0));
        assert_eq!(mi.current_term(), Some(t));
        let available = mi.project();
        assert!(available.contains(&id(1)));
        mi.select(id(1));
        assert!(!mi.residual_is_empty());
        mi.select(id(1));
        mi.select(id(2));
        assert!(mi.residual_is_empty());
        mi.unselect();
        assert!(!mi.residual_is_empty());
    }
}

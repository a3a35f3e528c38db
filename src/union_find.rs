//! Disjoint-set over [`ClassId`]s with path halving and "smaller id wins"
//! merging, per `spec.md` §4.1.
//!
//! Grounded on `original_source/src/union_find.{h,cpp}`: `find_root` halves
//! paths (each visited node is repointed to its grandparent, not the root),
//! `unify` always makes the smaller root the survivor, and `dump_to_file`'s
//! root-to-sorted-members shape is kept in [`UnionFind::dump`].

use crate::id::ClassId;
use crate::utils::HashMap;
use std::fmt::Write as _;

/// Dense disjoint-set forest over [`ClassId`]s.
#[derive(Debug, Default)]
pub struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Allocates a fresh class whose own parent is itself.
    pub fn make(&mut self) -> ClassId {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        ClassId::new(id)
    }

    /// Finds the canonical representative of `id`'s class, halving the path
    /// as it walks: every visited node is repointed to its grandparent.
    pub fn find(&mut self, id: ClassId) -> ClassId {
        debug_assert!(!id.is_ephemeral(), "find() on an ephemeral id");
        let mut cur = id.index();
        while self.parent[cur] as usize != cur {
            let grandparent = self.parent[self.parent[cur] as usize];
            self.parent[cur] = grandparent;
            cur = grandparent as usize;
        }
        ClassId::new(cur as u32)
    }

    /// Read-only find: does not halve the path. Used where `&mut self` is
    /// unavailable (dump, property-law tests that want to observe the
    /// forest without mutating it).
    pub fn find_const(&self, id: ClassId) -> ClassId {
        let mut cur = id.index();
        while self.parent[cur] as usize != cur {
            cur = self.parent[cur] as usize;
        }
        ClassId::new(cur as u32)
    }

    /// Unifies the classes of `a` and `b`; the smaller of the two roots
    /// survives. Returns the surviving root. No-op (besides `find`) if
    /// already equivalent.
    pub fn unify(&mut self, a: ClassId, b: ClassId) -> ClassId {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        let (small, big) = if ra.raw() < rb.raw() { (ra, rb) } else { (rb, ra) };
        self.parent[big.index()] = small.raw();
        small
    }

    pub fn equiv(&mut self, a: ClassId, b: ClassId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Deterministic text dump: one line per class, `root: member member …`
    /// with members sorted ascending, classes sorted by root id.
    pub fn dump(&self) -> String {
        let mut groups: HashMap<u32, Vec<u32>> = HashMap::default();
        for i in 0..self.parent.len() as u32 {
            let root = self.find_const(ClassId::new(i)).raw();
            groups.entry(root).or_default().push(i);
        }
        let mut roots: Vec<u32> = groups.keys().copied().collect();
        roots.sort_unstable();
        let mut out = String::new();
        for root in roots {
            let mut members = groups.remove(&root).unwrap();
            members.sort_unstable();
            write!(out, "{root}:").unwrap();
            for m in members {
                write!(out, " {m}").unwrap();
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_class_is_its_own_root() {
        let mut uf = UnionFind::new();
        let a = uf.make();
        assert_eq!(uf.find(a), a);
    }

    #[test]
    fn unify_picks_smaller_root() {
        let mut uf = UnionFind::new();
        let a = uf.make();
        let b = uf.make();
        let root = uf.unify(b, a);
        assert_eq!(root, a);
        assert!(uf.equiv(a, b));
    }

    #[test]
    fn unify_is_idempotent() {
        let mut uf = UnionFind::new();
        let a = uf.make();
        let b = uf.make();
        uf.unify(a, b);
        let root_again = uf.unify(a, b);
        assert_eq!(root_again, a);
    }

    #[test]
    fn transitive_chains_collapse() {
        let mut uf = UnionFind::new();
        let ids: Vec<_> = (0..5).map(|_| uf.make()).collect();
        for w in ids.windows(2) {
            uf.unify(w[0], w[1]);
        }
        for &id in &ids {
            assert!(uf.equiv(ids[0], id));
        }
    }
}

//! Identifier types threaded through every layer: [`ClassId`] (union-find /
//! e-class), [`TermId`] (a row in an [`crate::term_bank::ACRelation`]),
//! [`VarId`] (a compiled query's variable numbering), and [`Symbol`] (an
//! interned operator name).

use std::fmt;

/// High bit of a [`ClassId`]; set, the id is ephemeral (see `spec.md` §3).
const EPHEMERAL_BIT: u32 = 0x8000_0000;

/// A 32-bit e-class identifier. The high bit marks an *ephemeral* id:
/// a class conjured by the query engine for a not-yet-materialised AC
/// sub-term, valid only for the remainder of the current match/apply cycle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(u32);

impl ClassId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        debug_assert!(raw & EPHEMERAL_BIT == 0, "raw class id must not set the ephemeral bit");
        ClassId(raw)
    }

    /// Builds an ephemeral id from a dense counter (the ephemeral map's length).
    #[inline]
    pub(crate) const fn ephemeral(counter: u32) -> Self {
        ClassId(counter | EPHEMERAL_BIT)
    }

    #[inline]
    pub const fn is_ephemeral(self) -> bool {
        self.0 & EPHEMERAL_BIT != 0
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into the ephemeral map's backing vector (meaningless unless `is_ephemeral`).
    #[inline]
    pub(crate) const fn ephemeral_index(self) -> usize {
        (self.0 & !EPHEMERAL_BIT) as usize
    }

    /// Index into a dense union-find `parent` vector (meaningless on ephemeral ids).
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ephemeral() {
            write!(f, "e{}", self.ephemeral_index())
        } else {
            write!(f, "c{}", self.0)
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identifies a row of an [`crate::term_bank::ACRelation`] — one distinct
/// multiset of arguments for an AC operator. Many `TermId`s may resolve to
/// the same [`ClassId`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub(crate) u32);

impl TermId {
    #[inline]
    pub(crate) const fn new(raw: u32) -> Self {
        TermId(raw)
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A compiled query's variable numbering, assigned post-order by the compiler.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) u32);

impl VarId {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An interned operator/variable name. Two symbols compare equal iff they
/// were interned from equal strings (or are both opaque with the same id).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub(crate) u32);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_roundtrip() {
        let id = ClassId::ephemeral(7);
        assert!(id.is_ephemeral());
        assert_eq!(id.ephemeral_index(), 7);
    }

    #[test]
    fn ordinary_is_not_ephemeral() {
        let id = ClassId::new(7);
        assert!(!id.is_ephemeral());
        assert_eq!(id.raw(), 7);
    }
}

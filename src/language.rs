//! The user-facing expression tree, the e-node shape stored by the term
//! bank, and a compact DAG form (`RecExpr`) used for dumps and extraction.
//!
//! `Expr`/`ENode` are this spec's own vocabulary (`spec.md` §3); the
//! `Construct`/`RecExpr` split and its `operands`/`matches`/`fold`/`map_operands`
//! machinery is kept from the teacher's `egraph/construct.rs`, generalized
//! from the teacher's fixed `Node` enum to a generic node parameter so it
//! can host both `ENode` (class-id children, used by the egraph) and
//! `AstNode` (`RecExpr`-local children, used by `dump`/`Extractor`).

use crate::id::{ClassId, Symbol};
use crate::symbol::SymbolTable;
use smallvec::SmallVec;
use std::fmt::{self, Debug};
use std::hash::Hash;

/// A user-facing recursive structure: either a pattern variable or an
/// operator application. Pattern variables may only appear in rule
/// LHS/RHS; [`crate::egraph::EGraph::add_expr`] rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Var(Symbol),
    App(Symbol, Vec<Expr>),
}

impl Expr {
    pub fn var(sym: Symbol) -> Self {
        Expr::Var(sym)
    }

    pub fn op(sym: Symbol, children: Vec<Expr>) -> Self {
        Expr::App(sym, children)
    }

    pub fn leaf(sym: Symbol) -> Self {
        Expr::App(sym, Vec::new())
    }

    /// True if this tree contains no pattern variable below (or at) this node.
    pub fn is_ground(&self) -> bool {
        match self {
            Expr::Var(_) => false,
            Expr::App(_, children) => children.iter().all(Expr::is_ground),
        }
    }

    /// Collects every pattern variable symbol appearing in the tree, in
    /// first-appearance pre-order (duplicates included).
    pub fn variables(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Symbol>) {
        match self {
            Expr::Var(sym) => out.push(*sym),
            Expr::App(_, children) => children.iter().for_each(|c| c.collect_variables(out)),
        }
    }
}

/// A node generic over its child-reference type `T`: operator symbol plus
/// an ordered list of children. Used both as the e-graph's e-node
/// (`T = ClassId`) and as a `RecExpr`'s internal node (`T = RecId`).
///
/// Per `spec.md` §3: two e-nodes are equal iff their ops agree and their
/// child lists agree element-wise; for AC operators the children must be
/// sorted by the caller before comparison/hashing (the term bank, which
/// knows which operators are AC, is responsible for that — `AstNode`
/// itself is order-preserving).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AstNode<T> {
    pub op: Symbol,
    pub children: SmallVec<[T; 4]>,
}

impl<T: Debug> Debug for AstNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.op, self.children)
    }
}

impl<T> AstNode<T> {
    pub fn new(op: Symbol, children: impl IntoIterator<Item = T>) -> Self {
        AstNode { op, children: children.into_iter().collect() }
    }

    pub fn leaf(op: Symbol) -> Self {
        AstNode { op, children: SmallVec::new() }
    }

    pub fn arity(&self) -> usize {
        self.children.len()
    }
}

/// The e-graph's e-node: an operator application over canonical (or
/// ephemeral) class ids.
pub type ENode = AstNode<ClassId>;

impl ENode {
    /// Sorts children in place — the AC canonicalisation step applied
    /// before a memo lookup/insert for an AC operator.
    pub fn sort_ac_children(&mut self) {
        self.children.sort_unstable();
    }
}

/// Construct/operand-folding interface shared by [`ENode`] and `RecExpr`
/// node types, mirroring the teacher's `Construct` trait.
pub trait Construct: Debug + Clone + Eq + Hash {
    type Id: Copy + Eq;

    fn op(&self) -> Symbol;
    fn operands(&self) -> &[Self::Id];
    fn operands_mut(&mut self) -> &mut [Self::Id];

    fn matches(&self, other: &Self) -> bool {
        self.op() == other.op() && self.operands().len() == other.operands().len()
    }

    fn is_leaf(&self) -> bool {
        self.operands().is_empty()
    }

    fn for_each_operand<F: FnMut(Self::Id)>(&self, f: F) {
        self.operands().iter().copied().for_each(f)
    }

    fn update_operands<F: FnMut(Self::Id) -> Self::Id>(&mut self, mut f: F) {
        self.operands_mut().iter_mut().for_each(|id| *id = f(*id))
    }
}

impl<T: Copy + Eq + Debug + Hash> Construct for AstNode<T> {
    type Id = T;

    fn op(&self) -> Symbol {
        self.op
    }

    fn operands(&self) -> &[T] {
        &self.children
    }

    fn operands_mut(&mut self) -> &mut [T] {
        &mut self.children
    }
}

/// Dense index into a [`RecExpr`]'s node vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecId(u32);

impl RecId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compact DAG form of an expression: a flat vector of nodes where a
/// node's children are indices of strictly earlier nodes, and the last
/// node is the root. Used for `dump`, `Extractor` output, and pretty
/// printing — kept from the teacher's `construct.rs` `RecExpr<L>`.
#[derive(Debug, Clone, Default)]
pub struct RecExpr {
    nodes: Vec<AstNode<RecId>>,
}

impl RecExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `node` and returns its id. Caller must ensure every child
    /// id already exists (strictly less than the new node's id).
    pub fn add(&mut self, node: AstNode<RecId>) -> RecId {
        debug_assert!(node.operands().iter().all(|c| c.index() < self.nodes.len()));
        self.nodes.push(node);
        RecId((self.nodes.len() - 1) as u32)
    }

    pub fn root(&self) -> Option<RecId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(RecId((self.nodes.len() - 1) as u32))
        }
    }

    pub fn get(&self, id: RecId) -> &AstNode<RecId> {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True iff some node is shared by more than one parent — i.e. this is
    /// a genuine DAG, not just a tree serialized compactly.
    pub fn is_dag(&self) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for &c in node.operands() {
                if seen[c.index()] {
                    return true;
                }
                seen[c.index()] = true;
            }
        }
        false
    }

    pub fn to_sexpr(&self, symbols: &SymbolTable) -> String {
        match self.root() {
            Some(root) => self.to_sexpr_rec(root, symbols),
            None => String::new(),
        }
    }

    fn to_sexpr_rec(&self, id: RecId, symbols: &SymbolTable) -> String {
        let node = self.get(id);
        let name = symbols.name(node.op).unwrap_or("?").to_string();
        if node.is_leaf() {
            format!("({name})")
        } else {
            let parts: Vec<String> =
                node.operands().iter().map(|&c| self.to_sexpr_rec(c, symbols)).collect();
            format!("({name} {})", parts.join(" "))
        }
    }

    pub fn pretty(&self, symbols: &SymbolTable) -> String {
        self.to_sexpr(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_collects_variables_in_order() {
        let x = Symbol(1);
        let y = Symbol(2);
        let f = Symbol(3);
        let e = Expr::op(f, vec![Expr::var(x), Expr::var(y), Expr::var(x)]);
        assert_eq!(e.variables(), vec![x, y, x]);
    }

    #[test]
    fn ground_expr_has_no_variables() {
        let f = Symbol(0);
        let e = Expr::op(f, vec![Expr::leaf(Symbol(1))]);
        assert!(e.is_ground());
    }

    #[test]
    fn recexpr_sharing_is_detected() {
        let mut r = RecExpr::new();
        let leaf = r.add(AstNode::leaf(Symbol(0)));
        let parent = r.add(AstNode::new(Symbol(1), [leaf, leaf]));
        assert_eq!(r.root(), Some(parent));
        assert!(r.is_dag());
    }

    #[test]
    fn recexpr_tree_is_not_dag() {
        let mut r = RecExpr::new();
        let a = r.add(AstNode::leaf(Symbol(0)));
        let b = r.add(AstNode::leaf(Symbol(0)));
        r.add(AstNode::new(Symbol(1), [a, b]));
        assert!(!r.is_dag());
    }
}

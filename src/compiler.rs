//! L3 rule compiler: lowers a linear rewrite rule into a conjunctive
//! [`Query`] over the term bank plus a [`Subst`] template for the RHS, per
//! `spec.md` §4.6.
//!
//! Grounded on `original_source/src/compiler.{h,cpp}` and `src/query.{h,cpp}`:
//! post-order variable numbering (children before parent), the prepended
//! `TermId` slot for AC nodes, and `Subst::instantiate`'s RHS walk are
//! ported one-for-one. The original's `Constraint::permutation` (a
//! Lehmer-code index into the out-of-scope external permutation helper,
//! `original_source/src/permutation.{h,cpp}`) is replaced here by simply
//! keeping each constraint's variable list in numbering order and asking
//! `query_engine`/`EGraph` to build a `TrieIndex` keyed on that exact
//! `Vec<usize>` column order — equivalent information, simpler Rust-native
//! bookkeeping, no factorial arithmetic.

use crate::error::{TheoryError, TheoryResult};
use crate::id::VarId;
use crate::language::Expr;
use crate::symbol::{RewriteRule, Symbol, Theory};
use crate::utils::HashMap;

/// One relational constraint emitted per operator node in the LHS pattern.
/// `vars` is `(term_var, child_vars…, class_var)` for an AC operator, or
/// `(child_vars…, class_var)` otherwise — the class var is always last.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub op: Symbol,
    pub is_ac: bool,
    pub vars: Vec<VarId>,
}

impl Constraint {
    /// Number of direct pattern children (excludes the term-id slot, if
    /// any, and the trailing class-id slot).
    pub fn child_count(&self) -> usize {
        self.vars.len() - if self.is_ac { 2 } else { 1 }
    }

    pub fn term_var(&self) -> Option<VarId> {
        self.is_ac.then(|| self.vars[0])
    }

    pub fn child_vars(&self) -> &[VarId] {
        let start = if self.is_ac { 1 } else { 0 };
        &self.vars[start..self.vars.len() - 1]
    }

    pub fn class_var(&self) -> VarId {
        *self.vars.last().unwrap()
    }
}

/// Whether a variable's binding is read directly off an index's
/// projection, or derived (for an AC constraint's trailing class slot) via
/// `EGraph::lookup_or_ephemeral` over the already-committed child bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Generic,
    AcClass { constraint: usize },
}

/// A compiled conjunctive query: one constraint per LHS operator node, plus
/// the head (pattern variables in first-appearance order, then the LHS
/// root's class variable last).
#[derive(Debug, Clone)]
pub struct Query {
    pub name: String,
    pub constraints: Vec<Constraint>,
    pub head: Vec<VarId>,
    pub var_kinds: Vec<VarKind>,
    pub nvars: u32,
}

impl Query {
    pub fn kind_of(&self, v: VarId) -> VarKind {
        self.var_kinds[v.index()]
    }

    /// Indices (into `constraints`) of every constraint mentioning `v`.
    pub fn constraints_mentioning(&self, v: VarId) -> Vec<usize> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.vars.contains(&v))
            .map(|(i, _)| i)
            .collect()
    }
}

/// The RHS instantiation template: walks the RHS expression tree, looking
/// up each pattern variable's bound class id by its position in the
/// match's head tuple, and calling `alloc` for every operator application.
#[derive(Debug, Clone)]
pub struct Subst {
    pub rhs: Expr,
    env: HashMap<Symbol, usize>,
    pub head_len: usize,
}

impl Subst {
    /// The position in a match tuple holding the LHS root's class id —
    /// always the tuple's last slot.
    pub fn root_position(&self) -> usize {
        self.head_len - 1
    }

    pub fn instantiate(
        &self,
        matched: &[crate::id::ClassId],
        alloc: &mut dyn FnMut(Symbol, Vec<crate::id::ClassId>) -> crate::id::ClassId,
    ) -> crate::id::ClassId {
        self.instantiate_rec(&self.rhs, matched, alloc)
    }

    fn instantiate_rec(
        &self,
        e: &Expr,
        matched: &[crate::id::ClassId],
        alloc: &mut dyn FnMut(Symbol, Vec<crate::id::ClassId>) -> crate::id::ClassId,
    ) -> crate::id::ClassId {
        match e {
            Expr::Var(sym) => {
                let pos = *self
                    .env
                    .get(sym)
                    .unwrap_or_else(|| panic!("RHS references unbound variable {sym:?}"));
                matched[pos]
            }
            Expr::App(op, children) => {
                let ids: Vec<_> =
                    children.iter().map(|c| self.instantiate_rec(c, matched, alloc)).collect();
                alloc(*op, ids)
            }
        }
    }
}

/// Compiles linear rewrite rules into `(Query, Subst)` pairs. One compiler
/// instance may compile many rules; each call to [`Self::compile`] resets
/// the variable counter.
pub struct Compiler<'a> {
    theory: &'a Theory,
    next_var: u32,
}

impl<'a> Compiler<'a> {
    pub fn new(theory: &'a Theory) -> Self {
        Compiler { theory, next_var: 0 }
    }

    pub fn compile_many(&mut self, rules: &[RewriteRule]) -> TheoryResult<Vec<(Query, Subst)>> {
        rules.iter().map(|r| self.compile(r)).collect()
    }

    pub fn compile(&mut self, rule: &RewriteRule) -> TheoryResult<(Query, Subst)> {
        self.next_var = 0;
        let mut constraints = Vec::new();
        let mut var_kinds: Vec<VarKind> = Vec::new();
        let mut var_of_symbol: HashMap<Symbol, VarId> = HashMap::default();
        let mut first_appearance: Vec<VarId> = Vec::new();

        let root_var = self.compile_rec(
            &rule.lhs,
            &mut constraints,
            &mut var_kinds,
            &mut var_of_symbol,
            &mut first_appearance,
        )?;

        let mut head = first_appearance;
        head.push(root_var);

        let mut head_position: HashMap<VarId, usize> = HashMap::default();
        for (i, &v) in head.iter().enumerate() {
            head_position.insert(v, i);
        }
        let env: HashMap<Symbol, usize> = var_of_symbol
            .into_iter()
            .map(|(sym, v)| (sym, head_position[&v]))
            .collect();

        let query = Query {
            name: rule.name.clone(),
            constraints,
            head,
            var_kinds,
            nvars: self.next_var,
        };
        let subst = Subst { rhs: rule.rhs.clone(), env, head_len: query.head.len() };
        Ok((query, subst))
    }

    fn fresh_var(&mut self, var_kinds: &mut Vec<VarKind>) -> VarId {
        let v = VarId(self.next_var);
        self.next_var += 1;
        var_kinds.push(VarKind::Generic);
        v
    }

    fn compile_rec(
        &mut self,
        e: &Expr,
        constraints: &mut Vec<Constraint>,
        var_kinds: &mut Vec<VarKind>,
        var_of_symbol: &mut HashMap<Symbol, VarId>,
        first_appearance: &mut Vec<VarId>,
    ) -> TheoryResult<VarId> {
        match e {
            Expr::Var(sym) => {
                if let Some(&v) = var_of_symbol.get(sym) {
                    return Ok(v);
                }
                let v = self.fresh_var(var_kinds);
                var_of_symbol.insert(*sym, v);
                first_appearance.push(v);
                Ok(v)
            }
            Expr::App(op, children) => {
                let arity =
                    self.theory.get_arity(*op).ok_or(TheoryError::UnknownSymbol(*op))?;
                let is_ac = arity.is_ac();

                let mut vars = Vec::new();
                if is_ac {
                    // Prepended ahead of the children so the engine binds
                    // the whole AC term before descending into its args.
                    vars.push(self.fresh_var(var_kinds));
                }
                for c in children {
                    vars.push(self.compile_rec(
                        c,
                        constraints,
                        var_kinds,
                        var_of_symbol,
                        first_appearance,
                    )?);
                }
                let class_var = self.fresh_var(var_kinds);
                vars.push(class_var);

                let constraint_idx = constraints.len();
                constraints.push(Constraint { op: *op, is_ac, vars });
                if is_ac {
                    var_kinds[class_var.index()] = VarKind::AcClass { constraint: constraint_idx };
                }
                Ok(class_var)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Arity;

    #[test]
    fn compiles_non_ac_rule_with_expected_shape() {
        let mut theory = Theory::new();
        let x = theory.add_operator("?x", Arity::Fixed(0));
        let one = theory.add_operator("one", Arity::Fixed(0));
        let mul = theory.add_operator("mul", Arity::Fixed(2));
        let lhs = Expr::op(mul, vec![Expr::var(x), Expr::leaf(one)]);
        let rhs = Expr::var(x);
        theory.add_rewrite_rule("mul_one", lhs, rhs).unwrap();

        let mut compiler = Compiler::new(&theory);
        let (query, subst) = compiler.compile(&theory.rules()[0]).unwrap();
        assert_eq!(query.constraints.len(), 2); // `one` leaf, `mul` application
        assert_eq!(query.head.len(), 2); // ?x, then the mul root
        assert_eq!(subst.root_position(), 1);
    }

    #[test]
    fn ac_node_prepends_term_var() {
        let mut theory = Theory::new();
        let x = theory.add_operator("?x", Arity::Fixed(0));
        let one = theory.add_operator("one", Arity::Fixed(0));
        let mul = theory.add_operator("mul", Arity::Ac);
        let lhs = Expr::op(mul, vec![Expr::var(x), Expr::leaf(one)]);
        theory.add_rewrite_rule("mul_one_ac", lhs, Expr::var(x)).unwrap();

        let mut compiler = Compiler::new(&theory);
        let (query, _subst) = compiler.compile(&theory.rules()[0]).unwrap();
        let mul_constraint = query.constraints.iter().find(|c| c.is_ac).unwrap();
        assert_eq!(mul_constraint.vars.len(), 4); // term, x, one, class
        assert!(matches!(
            query.kind_of(mul_constraint.class_var()),
            VarKind::AcClass { .. }
        ));
    }
}

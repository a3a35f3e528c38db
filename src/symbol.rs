//! A minimal symbol interner owning operator names and arities.
//!
//! Grounded on `original_source/src/symbol_table.{h,cpp}`: that table is an
//! *external* collaborator (parser-facing) per `spec.md` §1, but the theory
//! itself is required to "own symbols, arities, and rules", so it carries
//! its own interner of the same shape. Unlike the C++ original's linear
//! `get_string` scan, display names are kept in a reverse `Vec` for O(1)
//! lookup — the original's simplification is not worth reproducing.

use crate::error::{ArityDisplay, TheoryError, TheoryResult};
use crate::language::Expr;
use crate::utils::HashMap;

/// The arity of an operator: either a fixed, non-negative number of
/// children, or the AC sentinel (associative-commutative, variadic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(u32),
    Ac,
}

impl Arity {
    pub fn is_ac(self) -> bool {
        matches!(self, Arity::Ac)
    }

    pub fn matches(self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => n as u32 == k,
            Arity::Ac => true,
        }
    }
}

pub use crate::id::Symbol;

/// Interns operator/variable names to dense [`Symbol`] ids and records each
/// symbol's declared [`Arity`].
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, Symbol>,
    names: Vec<Option<String>>,
    arities: Vec<Arity>,
    next_opaque: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name` with the given arity, reusing the existing symbol if
    /// `name` was already interned (its arity must match, or this is a bug
    /// on the caller's part — callers are expected to declare an operator
    /// exactly once; see `Theory::add_operator`).
    pub(crate) fn intern(&mut self, name: &str, arity: Arity) -> Symbol {
        if let Some(&sym) = self.by_name.get(name) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        self.names.push(Some(name.to_owned()));
        self.arities.push(arity);
        self.by_name.insert(name.to_owned(), sym);
        sym
    }

    /// Creates a symbol with no printable name (generated free variables,
    /// benchmark fixtures — mirrors `add_opaque_operator` in `spec.md` §6).
    pub(crate) fn create_opaque(&mut self, arity: Arity) -> Symbol {
        let sym = Symbol(self.names.len() as u32);
        self.names.push(None);
        self.arities.push(arity);
        self.next_opaque += 1;
        sym
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.by_name.get(name).copied()
    }

    pub fn arity(&self, sym: Symbol) -> Option<Arity> {
        self.arities.get(sym.0 as usize).copied()
    }

    pub fn name(&self, sym: Symbol) -> Option<&str> {
        self.names.get(sym.0 as usize).and_then(|n| n.as_deref())
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    pub fn all_arities(&self) -> impl Iterator<Item = (Symbol, Arity)> + '_ {
        self.arities.iter().enumerate().map(|(i, &a)| (Symbol(i as u32), a))
    }
}

/// A single linear rewrite rule, `lhs -> rhs`, as stored by a [`Theory`].
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub name: String,
    pub lhs: Expr,
    pub rhs: Expr,
}

/// Owns the operator signature and the ordered list of rewrite rules, per
/// `spec.md` §3. Grounded on `original_source/src/theory.{h,cpp}`:
/// `Theory::add_operator`/`add_rewrite_rule` and `Expr::is_linear`'s
/// "no repeated variable among the *direct* children of one operator node"
/// check are ported one-for-one.
#[derive(Debug, Default)]
pub struct Theory {
    symbols: SymbolTable,
    rules: Vec<RewriteRule>,
}

impl Theory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operator(&mut self, name: &str, arity: Arity) -> Symbol {
        self.symbols.intern(name, arity)
    }

    pub fn add_opaque_operator(&mut self, arity: Arity) -> Symbol {
        self.symbols.create_opaque(arity)
    }

    pub fn has_operator(&self, sym: Symbol) -> bool {
        self.symbols.arity(sym).is_some()
    }

    pub fn get_arity(&self, sym: Symbol) -> Option<Arity> {
        self.symbols.arity(sym)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn variable(&self, sym: Symbol) -> Expr {
        Expr::var(sym)
    }

    pub fn operator(&self, sym: Symbol, children: Vec<Expr>) -> Expr {
        Expr::op(sym, children)
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Registers `lhs -> rhs` under `name`, rejecting non-linear or
    /// undeclared-symbol patterns. Every operator reachable from `lhs`/`rhs`
    /// must already have been declared via [`Self::add_operator`].
    pub fn add_rewrite_rule(&mut self, name: &str, lhs: Expr, rhs: Expr) -> TheoryResult<()> {
        self.check_symbols(&lhs)?;
        self.check_symbols(&rhs)?;
        self.check_linear(&lhs)?;
        self.rules.push(RewriteRule { name: name.to_owned(), lhs, rhs });
        Ok(())
    }

    fn check_symbols(&self, e: &Expr) -> TheoryResult<()> {
        match e {
            Expr::Var(_) => Ok(()),
            Expr::App(sym, children) => {
                let arity =
                    self.symbols.arity(*sym).ok_or(TheoryError::UnknownSymbol(*sym))?;
                if !arity.matches(children.len()) {
                    return Err(TheoryError::ArityMismatch {
                        symbol: *sym,
                        declared: match arity {
                            Arity::Fixed(n) => ArityDisplay::Fixed(n),
                            Arity::Ac => ArityDisplay::Ac,
                        },
                        used: children.len(),
                    });
                }
                children.iter().try_for_each(|c| self.check_symbols(c))
            }
        }
    }

    /// A variable may appear at most once as a *direct* child of any single
    /// operator node; nested re-occurrences are allowed (`(mul ?x (inv ?x))`
    /// is linear, `(mul ?x ?x)` is not).
    fn check_linear(&self, e: &Expr) -> TheoryResult<()> {
        if let Expr::App(sym, children) = e {
            let mut seen = std::collections::HashSet::new();
            for c in children {
                if let Expr::Var(v) = c {
                    if !seen.insert(*v) {
                        return Err(TheoryError::NonLinearPattern { symbol: *sym, var: *v });
                    }
                }
            }
            children.iter().try_for_each(|c| self.check_linear(c))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut t = SymbolTable::new();
        let a = t.intern("mul", Arity::Ac);
        let b = t.intern("mul", Arity::Ac);
        assert_eq!(a, b);
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn opaque_symbols_have_no_name() {
        let mut t = SymbolTable::new();
        let s = t.create_opaque(Arity::Fixed(0));
        assert_eq!(t.name(s), None);
    }

    #[test]
    fn distinct_names_get_distinct_symbols() {
        let mut t = SymbolTable::new();
        let a = t.intern("a", Arity::Fixed(0));
        let b = t.intern("b", Arity::Fixed(0));
        assert_ne!(a, b);
    }

    #[test]
    fn non_linear_direct_children_rejected() {
        let mut theory = Theory::new();
        let x = theory.add_operator("?x", Arity::Fixed(0));
        let mul = theory.add_operator("mul", Arity::Fixed(2));
        let lhs = Expr::op(mul, vec![Expr::var(x), Expr::var(x)]);
        let rhs = Expr::var(x);
        assert!(theory.add_rewrite_rule("bad", lhs, rhs).is_err());
    }

    #[test]
    fn nested_reoccurrence_is_linear() {
        let mut theory = Theory::new();
        let x = theory.add_operator("?x", Arity::Fixed(0));
        let inv = theory.add_operator("inv", Arity::Fixed(1));
        let mul = theory.add_operator("mul", Arity::Fixed(2));
        let lhs = Expr::op(mul, vec![Expr::var(x), Expr::op(inv, vec![Expr::var(x)])]);
        let rhs = Expr::var(x);
        assert!(theory.add_rewrite_rule("inv_law", lhs, rhs).is_ok());
    }

    #[test]
    fn undeclared_symbol_is_rejected() {
        let mut theory = Theory::new();
        let ghost = Symbol(999);
        assert!(theory.add_rewrite_rule("bad", Expr::leaf(ghost), Expr::leaf(ghost)).is_err());
    }
}

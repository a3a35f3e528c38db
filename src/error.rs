//! Error taxonomy for theory construction and term insertion.
//!
//! Saturation-time invariant violations (dangling ids, ephemeral leaks, memo
//! inconsistency) are not represented here: per the failure model, they are
//! unrecoverable and are raised as panics where they are discovered, not
//! propagated as `Result`s.

use crate::id::Symbol;
use thiserror::Error;

/// Errors raised while building a [`crate::theory::Theory`] or compiling a rewrite rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TheoryError {
    #[error("unknown symbol: {0:?}")]
    UnknownSymbol(Symbol),

    #[error("symbol {symbol:?} has arity {declared}, but was used with {used} children")]
    ArityMismatch {
        symbol: Symbol,
        declared: ArityDisplay,
        used: usize,
    },

    #[error("non-linear pattern: variable {var:?} repeats as a direct child of {symbol:?}")]
    NonLinearPattern { symbol: Symbol, var: Symbol },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Arity, formatted for error messages (`Fixed(n)` prints as `n`, `AC` as `AC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityDisplay {
    Fixed(u32),
    Ac,
}

impl std::fmt::Display for ArityDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArityDisplay::Fixed(n) => write!(f, "{n}"),
            ArityDisplay::Ac => write!(f, "AC"),
        }
    }
}

/// Errors raised when handing an already-built [`crate::language::Expr`] to the e-graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("cannot insert a pattern variable {0:?} as a ground expression")]
    PatternVariable(Symbol),
}

pub type TheoryResult<T> = Result<T, TheoryError>;
pub type InsertResult<T> = Result<T, InsertError>;

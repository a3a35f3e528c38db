#![allow(dead_code)]

mod compiler;
mod egraph;
mod error;
mod id;
mod index;
mod language;
mod multiset;
mod parser;
mod query_engine;
mod saturate;
mod symbol;
mod term_bank;
mod union_find;
mod utils;

pub use egraph::EGraph;
pub use error::{ArityDisplay, InsertError, InsertResult, TheoryError, TheoryResult};
pub use id::{ClassId, Symbol, TermId, VarId};
pub use language::{AstNode, Construct, ENode, Expr, RecExpr, RecId};
pub use parser::{parse_rule, parse_sexpr};
pub use saturate::{
    AstDepth, AstSize, BackoffScheduler, CostFunction, Extractor, Iteration, Report, Runner,
    RewriteScheduler, SaturationOutcome, SimpleScheduler, StopReason,
};
pub use symbol::{Arity, RewriteRule, SymbolTable, Theory};

pub mod prelude {
    pub use crate::egraph::EGraph;
    pub use crate::language::Expr;
    pub use crate::parser::parse_sexpr;
    pub use crate::saturate::{AstSize, Extractor, Runner};
    pub use crate::symbol::{Arity, Theory};
}

//! A minimal S-expression reader for rewrite-rule patterns, per `spec.md`
//! §6's grammar: `expr := variable | '(' operator-name expr* ')'`,
//! `variable := '?' identifier`.
//!
//! Grounded on `original_source/src/parser.{h,cpp}`: the tokenizer's
//! identifier-character class and the `LPAREN`/`RPAREN`/`IDENTIFIER` token
//! set are ported one-for-one, as is `parse_expr`'s three-way dispatch
//! (variable / operator application / error). The original interns operator
//! *and* variable names into one shared `SymbolTable` on the fly; here,
//! operators must already be declared on the `Theory` (so arity is known at
//! parse time rather than deferred to `Theory::add_rewrite_rule`), while
//! variable names are freshly opaque-interned per call to [`parse_sexpr`],
//! reusing one [`crate::id::Symbol`] per distinct name within that call. Not
//! load-bearing for saturation correctness — only `Theory`/`EGraph`/
//! `Runner` are.

use crate::error::{TheoryError, TheoryResult};
use crate::language::Expr;
use crate::symbol::Theory;
use crate::utils::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    Identifier,
    EndOfInput,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    position: usize,
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '*' | '/' | '?' | '=')
}

fn tokenize(input: &str) -> TheoryResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token { kind: TokenKind::LParen, text: "(".to_owned(), position: i });
            i += 1;
            continue;
        }
        if c == ')' {
            tokens.push(Token { kind: TokenKind::RParen, text: ")".to_owned(), position: i });
            i += 1;
            continue;
        }
        if is_identifier_char(c) {
            let start = i;
            let mut ident = String::new();
            while i < chars.len() && is_identifier_char(chars[i]) {
                ident.push(chars[i]);
                i += 1;
            }
            tokens.push(Token { kind: TokenKind::Identifier, text: ident, position: start });
            continue;
        }
        return Err(TheoryError::Parse(format!("unexpected character '{c}' at position {i}")));
    }

    tokens.push(Token { kind: TokenKind::EndOfInput, text: String::new(), position: chars.len() });
    Ok(tokens)
}

struct Parser<'a> {
    theory: &'a mut Theory,
    tokens: Vec<Token>,
    current: usize,
    vars: HashMap<String, crate::id::Symbol>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::EndOfInput
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.current].clone();
        if !self.at_end() {
            self.current += 1;
        }
        tok
    }

    fn expect(&self, kind: TokenKind, message: &str) -> TheoryResult<()> {
        if self.peek().kind != kind {
            return Err(TheoryError::Parse(message.to_owned()));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> TheoryResult<Expr> {
        let token = self.peek().clone();

        if token.kind == TokenKind::Identifier && token.text.starts_with('?') {
            self.advance();
            let name = &token.text[1..];
            if name.is_empty() {
                return Err(TheoryError::Parse(
                    "variable name cannot be empty after '?'".to_owned(),
                ));
            }
            let sym = *self
                .vars
                .entry(name.to_owned())
                .or_insert_with(|| self.theory.add_opaque_operator(crate::symbol::Arity::Fixed(0)));
            return Ok(Expr::var(sym));
        }

        if token.kind == TokenKind::LParen {
            self.advance();
            self.expect(TokenKind::Identifier, "expected operator name after '('")?;
            let op_token = self.advance();
            if op_token.text.starts_with('?') {
                return Err(TheoryError::Parse("operator name cannot start with '?'".to_owned()));
            }
            let op_sym = self
                .theory
                .symbols()
                .lookup(&op_token.text)
                .ok_or_else(|| TheoryError::Parse(format!("undeclared operator '{}'", op_token.text)))?;

            let mut children = Vec::new();
            while self.peek().kind != TokenKind::RParen && !self.at_end() {
                children.push(self.parse_expr()?);
            }
            self.expect(TokenKind::RParen, "expected ')' to close expression")?;
            self.advance();

            let arity = self.theory.get_arity(op_sym).ok_or(TheoryError::UnknownSymbol(op_sym))?;
            if !arity.matches(children.len()) {
                return Err(TheoryError::ArityMismatch {
                    symbol: op_sym,
                    declared: match arity {
                        crate::symbol::Arity::Fixed(n) => crate::error::ArityDisplay::Fixed(n),
                        crate::symbol::Arity::Ac => crate::error::ArityDisplay::Ac,
                    },
                    used: children.len(),
                });
            }

            return Ok(Expr::op(op_sym, children));
        }

        if token.kind == TokenKind::Identifier {
            return Err(TheoryError::Parse(format!(
                "unexpected identifier '{}'; variables must start with '?', operators must be wrapped in parentheses",
                token.text
            )));
        }

        Err(TheoryError::Parse(format!("unexpected token at position {}", token.position)))
    }
}

fn parse_one(
    theory: &mut Theory,
    vars: HashMap<String, crate::id::Symbol>,
    input: &str,
) -> TheoryResult<(Expr, HashMap<String, crate::id::Symbol>)> {
    if input.trim().is_empty() {
        return Err(TheoryError::Parse("cannot parse empty string".to_owned()));
    }

    let tokens = tokenize(input)?;
    let mut parser = Parser { theory, tokens, current: 0, vars };
    let expr = parser.parse_expr()?;

    if !parser.at_end() {
        return Err(TheoryError::Parse(format!(
            "unexpected tokens after expression at position {}",
            parser.peek().position
        )));
    }

    Ok((expr, parser.vars))
}

/// Parses a single S-expression against `theory`'s declared operators,
/// returning the resulting pattern or ground [`Expr`]. Every distinct `?name`
/// appearing in `input` is opaque-interned once and reused for repeated
/// occurrences within this call; operator names must already be declared via
/// [`Theory::add_operator`].
pub fn parse_sexpr(theory: &mut Theory, input: &str) -> TheoryResult<Expr> {
    parse_one(theory, HashMap::default(), input).map(|(expr, _)| expr)
}

/// Parses a rewrite rule's `lhs` and `rhs` as a pair, sharing one variable
/// scope between them so that `?x` in `lhs` and `?x` in `rhs` resolve to the
/// same pattern-variable symbol — required for
/// [`Theory::add_rewrite_rule`]'s substitution to bind correctly. Prefer
/// this over two independent [`parse_sexpr`] calls whenever `rhs`
/// references a variable bound in `lhs`.
pub fn parse_rule(theory: &mut Theory, lhs: &str, rhs: &str) -> TheoryResult<(Expr, Expr)> {
    let (lhs_expr, vars) = parse_one(theory, HashMap::default(), lhs)?;
    let (rhs_expr, _) = parse_one(theory, vars, rhs)?;
    Ok((lhs_expr, rhs_expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Arity;

    #[test]
    fn parses_nullary_operator() {
        let mut theory = Theory::new();
        theory.add_operator("one", Arity::Fixed(0));
        let expr = parse_sexpr(&mut theory, "(one)").unwrap();
        assert!(matches!(expr, Expr::App(_, ref c) if c.is_empty()));
    }

    #[test]
    fn parses_nested_application_with_shared_variable() {
        let mut theory = Theory::new();
        theory.add_operator("inv", Arity::Fixed(1));
        theory.add_operator("mul", Arity::Fixed(2));
        let expr = parse_sexpr(&mut theory, "(mul ?x (inv ?x))").unwrap();
        let Expr::App(_, children) = &expr else { panic!("expected application") };
        let (Expr::Var(a), Expr::App(_, inv_children)) = (&children[0], &children[1]) else {
            panic!("unexpected shape")
        };
        let Expr::Var(b) = &inv_children[0] else { panic!("expected variable") };
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_undeclared_operator() {
        let mut theory = Theory::new();
        assert!(parse_sexpr(&mut theory, "(ghost)").is_err());
    }

    #[test]
    fn rejects_arity_mismatch() {
        let mut theory = Theory::new();
        theory.add_operator("mul", Arity::Fixed(2));
        assert!(parse_sexpr(&mut theory, "(mul ?x)").is_err());
    }

    #[test]
    fn rejects_empty_variable_name() {
        let mut theory = Theory::new();
        assert!(parse_sexpr(&mut theory, "?").is_err());
    }

    #[test]
    fn rejects_bare_identifier() {
        let mut theory = Theory::new();
        theory.add_operator("foo", Arity::Fixed(0));
        assert!(parse_sexpr(&mut theory, "foo").is_err());
    }

    #[test]
    fn rejects_trailing_tokens() {
        let mut theory = Theory::new();
        theory.add_operator("one", Arity::Fixed(0));
        assert!(parse_sexpr(&mut theory, "(one) (one)").is_err());
    }

    #[test]
    fn parse_rule_shares_variable_symbols_between_lhs_and_rhs() {
        let mut theory = Theory::new();
        theory.add_operator("one", Arity::Fixed(0));
        theory.add_operator("mul", Arity::Fixed(2));
        let (lhs, rhs) = parse_rule(&mut theory, "(mul ?x (one))", "?x").unwrap();
        let Expr::App(_, lhs_children) = &lhs else { panic!("expected application") };
        let Expr::Var(lhs_var) = &lhs_children[0] else { panic!("expected variable") };
        let Expr::Var(rhs_var) = &rhs else { panic!("expected variable") };
        assert_eq!(lhs_var, rhs_var);
        assert!(theory.add_rewrite_rule("mul_one", lhs, rhs).is_ok());
    }

    #[test]
    fn ac_operator_accepts_any_arity() {
        let mut theory = Theory::new();
        theory.add_operator("mul", Arity::Ac);
        assert!(parse_sexpr(&mut theory, "(mul)").is_ok());
        assert!(parse_sexpr(&mut theory, "(mul ?x)").is_ok());
        let mut theory2 = Theory::new();
        theory2.add_operator("mul", Arity::Ac);
        assert!(parse_sexpr(&mut theory2, "(mul ?x ?y ?z)").is_ok());
    }
}

//! Boolean rule expressions over identity atoms
//!
//! A [`RuleExpression`] gates one action of a darc. It is stored in its
//! canonical text form — identity atoms combined with `|` (OR), `&` (AND)
//! and parentheses, where `&` binds tighter than `|` — and parsed on
//! demand. The empty expression is always false.
//!
//! Mutation is deliberately lenient in one place: OR-append is
//! idempotent when the atom already sits in the top-level disjunction,
//! and removal silently ignores atoms that are not present.

use crate::errors::{CoreError, Result};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an identity is combined with an existing expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Either side may satisfy the rule
    Or,
    /// Both sides must satisfy the rule
    And,
}

/// A boolean formula over identity atoms, in canonical text form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RuleExpression(String);

impl RuleExpression {
    /// The empty (always-false) expression
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// An expression satisfied by exactly one identity
    pub fn single(identity: &Identity) -> Self {
        Self(identity.to_string())
    }

    /// An expression satisfied by any of the given identities
    pub fn any_of(identities: &[Identity]) -> Self {
        let text = identities
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        Self(text)
    }

    /// Parse and validate an expression from its text form
    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        let expr = Self(text.into());
        expr.parse_tree()?;
        Ok(expr)
    }

    /// The canonical text of this expression
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this expression can never be satisfied
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Evaluate this expression against a set of signing identities
    ///
    /// The expression is satisfied iff the combinator tree evaluates to
    /// true when each atom is true exactly when it appears in `signers`.
    pub fn matches(&self, signers: &[Identity]) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        Ok(self.parse_tree()?.eval(signers))
    }

    /// Combine this expression with `identity` using `combinator`
    ///
    /// OR-append returns the expression unchanged when the identity is
    /// already present in the top-level disjunction. Malformed existing
    /// text is a hard failure.
    pub fn append(&self, identity: &Identity, combinator: Combinator) -> Result<Self> {
        if self.is_empty() {
            return Ok(Self::single(identity));
        }
        let tree = self.parse_tree()?;
        match combinator {
            Combinator::Or => {
                if tree.top_level_atoms().contains(identity) {
                    return Ok(self.clone());
                }
                Ok(Self(format!("{} | {}", self.0, identity)))
            }
            Combinator::And => {
                // Parenthesize an existing disjunction so the appended
                // conjunct applies to the whole of it.
                let left = if matches!(tree, Expr::Or(_)) {
                    format!("({})", self.0)
                } else {
                    self.0.clone()
                };
                Ok(Self(format!("{left} & {identity}")))
            }
        }
    }

    /// Remove the atom matching `identity` from the top-level disjunction
    ///
    /// Atoms nested under a conjunction or parentheses are left alone.
    /// Removing an absent identity is a no-op, not an error.
    pub fn remove(&self, identity: &Identity) -> Result<Self> {
        if self.is_empty() {
            return Ok(self.clone());
        }
        let tree = self.parse_tree()?;
        let terms = match tree {
            Expr::Or(terms) => terms,
            other => vec![other],
        };
        let before = terms.len();
        let kept: Vec<Expr> = terms
            .into_iter()
            .filter(|t| !matches!(t, Expr::Atom(id) if id == identity))
            .collect();
        if kept.len() == before {
            return Ok(self.clone());
        }
        if kept.is_empty() {
            return Ok(Self::empty());
        }
        let text = kept
            .iter()
            .map(Expr::render_term)
            .collect::<Vec<_>>()
            .join(" | ");
        Ok(Self(text))
    }

    fn parse_tree(&self) -> Result<Expr> {
        Parser::new(&self.0)?.parse()
    }
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Parsed form ──────────────────────────────────────────────────────────

/// Combinator tree of one parsed expression
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Atom(Identity),
    Or(Vec<Expr>),
    And(Vec<Expr>),
}

impl Expr {
    fn eval(&self, signers: &[Identity]) -> bool {
        match self {
            Self::Atom(id) => signers.contains(id),
            Self::Or(terms) => terms.iter().any(|t| t.eval(signers)),
            Self::And(terms) => terms.iter().all(|t| t.eval(signers)),
        }
    }

    /// Atoms of the top-level disjunction (a bare atom counts as one)
    fn top_level_atoms(&self) -> Vec<Identity> {
        match self {
            Self::Atom(id) => vec![*id],
            Self::Or(terms) => terms
                .iter()
                .filter_map(|t| match t {
                    Self::Atom(id) => Some(*id),
                    _ => None,
                })
                .collect(),
            Self::And(_) => Vec::new(),
        }
    }

    /// Render one disjunction term; conjunctions need no parens since
    /// `&` binds tighter, but nested disjunctions keep theirs.
    fn render_term(&self) -> String {
        match self {
            Self::Atom(id) => id.to_string(),
            Self::And(terms) => terms
                .iter()
                .map(|t| match t {
                    Self::Or(_) => format!("({})", t.render_term()),
                    _ => t.render_term(),
                })
                .collect::<Vec<_>>()
                .join(" & "),
            Self::Or(terms) => terms
                .iter()
                .map(Self::render_term)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

// ── Parser ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(Identity),
    Or,
    And,
    Open,
    Close,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(tok) => Err(CoreError::rule_parse(format!(
                "unexpected trailing token {tok:?}"
            ))),
        }
    }

    // expr := term ('|' term)*
    fn parse_or(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            match self.parse_and()? {
                // Flatten associative nesting so the top-level
                // disjunction is one flat list.
                Expr::Or(inner) => terms.extend(inner),
                term => terms.push(term),
            }
        }
        if terms.len() == 1 {
            Ok(terms.remove(0))
        } else {
            Ok(Expr::Or(terms))
        }
    }

    // term := factor ('&' factor)*
    fn parse_and(&mut self) -> Result<Expr> {
        let mut factors = vec![self.parse_factor()?];
        while self.eat(&Token::And) {
            match self.parse_factor()? {
                Expr::And(inner) => factors.extend(inner),
                factor => factors.push(factor),
            }
        }
        if factors.len() == 1 {
            Ok(factors.remove(0))
        } else {
            Ok(Expr::And(factors))
        }
    }

    // factor := atom | '(' expr ')'
    fn parse_factor(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Atom(id)) => Ok(Expr::Atom(id)),
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::Close) {
                    return Err(CoreError::rule_parse("missing closing parenthesis"));
                }
                Ok(inner)
            }
            Some(tok) => Err(CoreError::rule_parse(format!("unexpected token {tok:?}"))),
            None => Err(CoreError::rule_parse("unexpected end of expression")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if c.is_alphanumeric() || c == ':' || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == ':' || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let id = word.parse::<Identity>().map_err(|e| {
                    CoreError::rule_parse(format!("bad identity atom '{word}': {e}"))
                })?;
                tokens.push(Token::Atom(id));
            }
            other => {
                return Err(CoreError::rule_parse(format!(
                    "unexpected character '{other}' in expression"
                )));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeyPair;

    fn id(n: u8) -> Identity {
        KeyPair::from_seed([n; 32]).identity()
    }

    #[test]
    fn empty_expression_is_never_satisfied() {
        let expr = RuleExpression::empty();
        assert!(!expr.matches(&[id(1)]).unwrap());
    }

    #[test]
    fn single_atom_matches_its_signer() {
        let expr = RuleExpression::single(&id(1));
        assert!(expr.matches(&[id(1)]).unwrap());
        assert!(!expr.matches(&[id(2)]).unwrap());
    }

    #[test]
    fn or_requires_any_and_requires_all() {
        let expr = RuleExpression::single(&id(1))
            .append(&id(2), Combinator::Or)
            .unwrap()
            .append(&id(3), Combinator::And)
            .unwrap();
        // (1 | 2) & 3
        assert!(expr.matches(&[id(1), id(3)]).unwrap());
        assert!(expr.matches(&[id(2), id(3)]).unwrap());
        assert!(!expr.matches(&[id(1), id(2)]).unwrap());
        assert!(!expr.matches(&[id(3)]).unwrap());
    }

    #[test]
    fn or_append_is_idempotent() {
        let expr = RuleExpression::any_of(&[id(1), id(2)]);
        let appended = expr.append(&id(2), Combinator::Or).unwrap();
        assert_eq!(expr, appended);
    }

    #[test]
    fn append_then_remove_restores_expression() {
        let expr = RuleExpression::any_of(&[id(1), id(2)]);
        let round_trip = expr
            .append(&id(3), Combinator::Or)
            .unwrap()
            .remove(&id(3))
            .unwrap();
        assert_eq!(expr, round_trip);
    }

    #[test]
    fn remove_absent_identity_is_a_noop() {
        let expr = RuleExpression::any_of(&[id(1), id(2)]);
        assert_eq!(expr, expr.remove(&id(9)).unwrap());
    }

    #[test]
    fn remove_last_atom_leaves_empty_expression() {
        let expr = RuleExpression::single(&id(1));
        let removed = expr.remove(&id(1)).unwrap();
        assert!(removed.is_empty());
        assert!(!removed.matches(&[id(1)]).unwrap());
    }

    #[test]
    fn remove_does_not_touch_conjunction_members() {
        // 1 & 2 stays intact when removing 2 from the disjunction level.
        let expr = RuleExpression::single(&id(1))
            .append(&id(2), Combinator::And)
            .unwrap();
        assert_eq!(expr, expr.remove(&id(2)).unwrap());
    }

    #[test]
    fn malformed_expression_is_a_hard_failure() {
        for bad in ["ed25519:zz", "(ed25519:00", "notascheme", "| |"] {
            assert!(
                RuleExpression::from_text(bad).is_err(),
                "expected parse failure for {bad:?}"
            );
        }
    }

    #[test]
    fn parenthesized_groups_evaluate() {
        let a = id(1);
        let b = id(2);
        let c = id(3);
        let text = format!("({a} | {b}) & {c}");
        let expr = RuleExpression::from_text(text).unwrap();
        assert!(expr.matches(&[b, c]).unwrap());
        assert!(!expr.matches(&[a, b]).unwrap());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Appending an absent atom and removing it again is
            /// semantically invisible for any signer subset.
            #[test]
            fn append_remove_round_trip_is_semantic_identity(
                seeds in proptest::collection::vec(1u8..20, 1..5),
                probe in 1u8..20,
            ) {
                let ids: Vec<Identity> = seeds.iter().map(|&n| id(n)).collect();
                let fresh = id(200);
                let expr = RuleExpression::any_of(&ids);
                let round = expr
                    .append(&fresh, Combinator::Or).unwrap()
                    .remove(&fresh).unwrap();
                let signers = vec![id(probe)];
                prop_assert_eq!(
                    expr.matches(&signers).unwrap(),
                    round.matches(&signers).unwrap()
                );
            }
        }
    }
}

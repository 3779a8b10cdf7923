// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event expressions: the `start on` / `stop on` attribute language.
//!
//! An expression is a tree of `and`/`or` nodes over operands. An operand
//! names an event and zero or more matchers; a bare positional argument
//! matches the emission's `JOB` key, a `KEY=GLOB` argument matches the named
//! environment variable as a shell glob.
//!
//! Matching is *sticky per cycle*: [`ExpressionState`] carries one match slot
//! per operand, filled as emissions are fed in and cleared only when the
//! expression fires or the owning instance returns to `waiting`. This lets
//! `A and B` fire even when A and B are emitted separately.

use crate::glob::glob_match;
use ember_core::event::keys;
use ember_core::{Emission, EmissionId};
use std::fmt;
use thiserror::Error;

/// A single event-with-matchers leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub event: String,
    /// `(key, glob)` pairs; bare positionals are recorded under `JOB`.
    pub matchers: Vec<(String, String)>,
}

impl Operand {
    /// Whether this operand accepts the given emission.
    pub fn matches(&self, emission: &Emission) -> bool {
        if self.event != emission.name {
            return false;
        }
        self.matchers.iter().all(|(key, pattern)| {
            emission
                .var(key)
                .is_some_and(|value| glob_match(pattern, value))
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event)?;
        for (key, value) in &self.matchers {
            if key == keys::JOB {
                write!(f, " {}", value)?;
            } else {
                write!(f, " {}={}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Boolean combination of operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Operand(usize, Operand),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

impl Expression {
    /// Number of operand leaves (slots in an [`ExpressionState`]).
    pub fn operand_count(&self) -> usize {
        self.operands().len()
    }

    /// Operand leaves in left-to-right AST order.
    pub fn operands(&self) -> Vec<&Operand> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Operand>) {
        match self {
            Expression::Operand(_, op) => out.push(op),
            Expression::And(a, b) | Expression::Or(a, b) => {
                a.collect(out);
                b.collect(out);
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Operand(_, op) => write!(f, "{}", op),
            Expression::And(a, b) => write!(f, "({} and {})", a, b),
            Expression::Or(a, b) => write!(f, "({} or {})", a, b),
        }
    }
}

/// The environment an expression satisfaction hands to the triggered
/// instance: contributing emission ids in match order, and the concatenated
/// environment (first occurrence of a key wins).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerEnv {
    pub emissions: Vec<EmissionId>,
    pub env: Vec<(String, String)>,
}

/// One captured operand match.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct MatchSlot {
    emission: EmissionId,
    env: Vec<(String, String)>,
}

/// Per-cycle evaluation state: one sticky slot per operand.
///
/// Serializable so partially matched expressions survive re-exec.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ExpressionState {
    slots: Vec<Option<MatchSlot>>,
}

impl ExpressionState {
    pub fn new(expr: &Expression) -> Self {
        Self {
            slots: vec![None; expr.operand_count()],
        }
    }

    /// Feed one emission; unmatched operands that accept it record it.
    pub fn feed(&mut self, expr: &Expression, emission: &Emission) {
        self.feed_inner(expr, emission);
    }

    fn feed_inner(&mut self, expr: &Expression, emission: &Emission) {
        match expr {
            Expression::Operand(index, op) => {
                if self.slots[*index].is_none() && op.matches(emission) {
                    self.slots[*index] = Some(MatchSlot {
                        emission: emission.id,
                        env: emission.env.clone(),
                    });
                }
            }
            Expression::And(a, b) | Expression::Or(a, b) => {
                self.feed_inner(a, emission);
                self.feed_inner(b, emission);
            }
        }
    }

    /// Whether the root evaluates true under the current slots.
    pub fn satisfied(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Operand(index, _) => self.slots[*index].is_some(),
            Expression::And(a, b) => self.satisfied(a) && self.satisfied(b),
            Expression::Or(a, b) => self.satisfied(a) || self.satisfied(b),
        }
    }

    /// The trigger environment of a satisfied expression.
    ///
    /// Contributing operands are visited left-to-right; `or` contributes only
    /// its first satisfied branch. Returns `None` while unsatisfied.
    pub fn trigger(&self, expr: &Expression) -> Option<TriggerEnv> {
        if !self.satisfied(expr) {
            return None;
        }
        let mut trigger = TriggerEnv::default();
        self.collect_trigger(expr, &mut trigger);
        Some(trigger)
    }

    fn collect_trigger(&self, expr: &Expression, out: &mut TriggerEnv) {
        match expr {
            Expression::Operand(index, _) => {
                if let Some(slot) = &self.slots[*index] {
                    if !out.emissions.contains(&slot.emission) {
                        out.emissions.push(slot.emission);
                    }
                    for (key, value) in &slot.env {
                        if !out.env.iter().any(|(k, _)| k == key) {
                            out.env.push((key.clone(), value.clone()));
                        }
                    }
                }
            }
            Expression::And(a, b) => {
                self.collect_trigger(a, out);
                self.collect_trigger(b, out);
            }
            Expression::Or(a, b) => {
                if self.satisfied(a) {
                    self.collect_trigger(a, out);
                } else {
                    self.collect_trigger(b, out);
                }
            }
        }
    }

    /// Number of operand slots this state was built for.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Clear every slot (the `waiting` boundary, or after a fire).
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

/// Errors from expression parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprParseError {
    #[error("empty expression")]
    Empty,
    #[error("expected event name, found {0:?}")]
    ExpectedEvent(String),
    #[error("unbalanced parenthesis")]
    Unbalanced,
    #[error("trailing tokens after expression: {0:?}")]
    Trailing(String),
    #[error("invalid matcher {0:?}")]
    InvalidMatcher(String),
}

/// Parse an expression: `expr := term (or term)*`,
/// `term := factor (and factor)*`, `factor := '(' expr ')' | operand`.
pub fn parse_expression(input: &str) -> Result<Expression, ExprParseError> {
    let tokens = tokenize(input);
    let mut parser = Parser {
        tokens,
        pos: 0,
        next_operand: 0,
    };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprParseError::Trailing(
            parser.tokens[parser.pos..].join(" "),
        ));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in input.chars() {
        match c {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
    next_operand: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn expr(&mut self) -> Result<Expression, ExprParseError> {
        let mut left = self.term()?;
        while self.peek() == Some("or") {
            self.pos += 1;
            let right = self.term()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expression, ExprParseError> {
        let mut left = self.factor()?;
        while self.peek() == Some("and") {
            self.pos += 1;
            let right = self.factor()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expression, ExprParseError> {
        match self.peek() {
            None => Err(ExprParseError::Empty),
            Some("(") => {
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(")") {
                    return Err(ExprParseError::Unbalanced);
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(")") => Err(ExprParseError::Unbalanced),
            Some(_) => self.operand(),
        }
    }

    fn operand(&mut self) -> Result<Expression, ExprParseError> {
        let event = match self.peek() {
            Some(tok) if !is_keyword(tok) => tok.to_string(),
            Some(tok) => return Err(ExprParseError::ExpectedEvent(tok.to_string())),
            None => return Err(ExprParseError::Empty),
        };
        self.pos += 1;

        let mut matchers = Vec::new();
        let mut positional = 0usize;
        while let Some(tok) = self.peek() {
            if is_keyword(tok) || tok == "(" || tok == ")" {
                break;
            }
            if let Some((key, value)) = tok.split_once('=') {
                if key.is_empty() {
                    return Err(ExprParseError::InvalidMatcher(tok.to_string()));
                }
                matchers.push((key.to_string(), value.to_string()));
            } else {
                // First positional argument names the job
                if positional > 0 {
                    return Err(ExprParseError::InvalidMatcher(tok.to_string()));
                }
                matchers.push((keys::JOB.to_string(), tok.to_string()));
                positional += 1;
            }
            self.pos += 1;
        }

        let index = self.next_operand;
        self.next_operand += 1;
        Ok(Expression::Operand(index, Operand { event, matchers }))
    }
}

fn is_keyword(token: &str) -> bool {
    token == "and" || token == "or"
}

#[cfg(test)]
#[path = "expression_tests.rs"]
mod tests;

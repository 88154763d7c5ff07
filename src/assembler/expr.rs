// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression trees, parsing, and evaluation.
//!
//! All arithmetic is performed on signed 64-bit integers. Operator
//! precedence, high to low: unary `+ - ~`; `* / %`; `+ -`; `<< >>`; `&`;
//! `^`; `|`. The `%hi`/`%lo` modifiers implement the sign-adjusted
//! 20/12-bit decomposition used by `lui`/`addi` pairs; `%position` and
//! `%offset` resolve against the label table once layout has assigned
//! offsets.

use std::collections::HashMap;

use crate::registers;
use crate::scanner::{Operator, Token, TokenKind};

use super::error::{AsmError, AsmErrorKind, Diagnostic, Origin};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Char(char),
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Hi(Box<Expr>),
    Lo(Box<Expr>),
    Position { label: String, base: Box<Expr> },
    OffsetOf { label: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
}

/// Error from parsing an expression out of a token stream.
#[derive(Debug, Clone)]
pub struct ExprParseError {
    pub column: usize,
    pub message: String,
}

impl ExprParseError {
    fn new(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            message: message.into(),
        }
    }
}

/// Error returned from expression evaluation.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    /// Set when the failure was an unresolvable identifier.
    pub missing_symbol: Option<String>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            missing_symbol: None,
        }
    }

    fn missing(name: &str) -> Self {
        Self {
            message: format!("Undefined symbol: {name}"),
            missing_symbol: Some(name.to_string()),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Context for expression evaluation.
#[derive(Clone, Copy)]
pub struct EvalScope<'a> {
    pub consts: &'a HashMap<String, i64>,
    pub labels: Option<&'a HashMap<String, u32>>,
    pub position: Option<u32>,
}

impl<'a> EvalScope<'a> {
    pub fn constants(consts: &'a HashMap<String, i64>) -> Self {
        Self {
            consts,
            labels: None,
            position: None,
        }
    }

    pub fn at(
        consts: &'a HashMap<String, i64>,
        labels: &'a HashMap<String, u32>,
        position: u32,
    ) -> Self {
        Self {
            consts,
            labels: Some(labels),
            position: Some(position),
        }
    }
}

/// Evaluate an expression to a signed 64-bit value.
pub fn eval(expr: &Expr, scope: &EvalScope<'_>) -> Result<i64, EvalError> {
    match expr {
        Expr::Int(value) => Ok(*value),
        Expr::Char(ch) => Ok(*ch as i64),
        Expr::Ident(name) => {
            if let Some(value) = scope.consts.get(name) {
                return Ok(*value);
            }
            if let Some(labels) = scope.labels {
                if let Some(offset) = labels.get(name) {
                    return Ok(*offset as i64);
                }
            }
            Err(EvalError::missing(name))
        }
        Expr::Unary(op, inner) => {
            let value = eval(inner, scope)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => value.wrapping_neg(),
                UnaryOp::BitNot => !value,
            })
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, scope)?;
            let r = eval(rhs, scope)?;
            apply_binary(*op, l, r)
        }
        Expr::Hi(inner) => Ok(relocate_hi(eval(inner, scope)?)),
        Expr::Lo(inner) => Ok(relocate_lo(eval(inner, scope)?)),
        Expr::Position { label, base } => {
            let labels = scope
                .labels
                .ok_or_else(|| EvalError::new("Label offsets are not available here"))?;
            let offset = labels
                .get(label)
                .ok_or_else(|| EvalError::missing(label))?;
            let base = eval(base, scope)?;
            Ok(base.wrapping_add(*offset as i64))
        }
        Expr::OffsetOf { label } => {
            let labels = scope
                .labels
                .ok_or_else(|| EvalError::new("Label offsets are not available here"))?;
            let position = scope
                .position
                .ok_or_else(|| EvalError::new("Current position is not available here"))?;
            let offset = labels
                .get(label)
                .ok_or_else(|| EvalError::missing(label))?;
            Ok(*offset as i64 - position as i64)
        }
    }
}

fn apply_binary(op: BinaryOp, l: i64, r: i64) -> Result<i64, EvalError> {
    Ok(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => {
            if r == 0 {
                return Err(EvalError::new("Division by zero"));
            }
            l.wrapping_div(r)
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err(EvalError::new("Modulo by zero"));
            }
            l.wrapping_rem(r)
        }
        BinaryOp::Shl => l.wrapping_shl((r & 0x3f) as u32),
        BinaryOp::Shr => ((l as u64).wrapping_shr((r & 0x3f) as u32)) as i64,
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::BitOr => l | r,
    })
}

/// Sign-extend the low `bits` of `value`.
pub fn sign_extend(value: u32, bits: u32) -> i64 {
    let value = value as u64;
    let sign_bit = 1u64 << (bits - 1);
    ((value & (sign_bit - 1)) as i64) - ((value & sign_bit) as i64)
}

/// Sign-adjusted upper 20 bits of a 32-bit value.
pub fn relocate_hi(value: i64) -> i64 {
    let v = (value as u32).wrapping_add(0x800);
    sign_extend((v >> 12) & 0x000f_ffff, 20)
}

/// Sign-adjusted lower 12 bits, consistent with `relocate_hi`.
pub fn relocate_lo(value: i64) -> i64 {
    sign_extend((value as u32) & 0xfff, 12)
}

/// Returns true if the expression references `%position` or `%offset`.
pub fn uses_position(expr: &Expr) -> bool {
    match expr {
        Expr::Int(_) | Expr::Char(_) | Expr::Ident(_) => false,
        Expr::Unary(_, inner) | Expr::Hi(inner) | Expr::Lo(inner) => uses_position(inner),
        Expr::Binary(_, lhs, rhs) => uses_position(lhs) || uses_position(rhs),
        Expr::Position { .. } | Expr::OffsetOf { .. } => true,
    }
}

/// Precedence-climbing expression parser over a token slice.
///
/// The parser stops at the first token that cannot continue the
/// expression (commas, closing parens, operands of the enclosing item).
pub struct ExprParser<'a> {
    tokens: &'a [Token],
    pub pos: usize,
}

impl<'a> ExprParser<'a> {
    pub fn new(tokens: &'a [Token], pos: usize) -> Self {
        Self { tokens, pos }
    }

    pub fn parse(&mut self) -> Result<Expr, ExprParseError> {
        self.parse_bitor()
    }

    fn parse_bitor(&mut self) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat_op(Operator::Or) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_bitand()?;
        while self.eat_op(Operator::Xor) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary(BinaryOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_shift()?;
        while self.eat_op(Operator::And) {
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_sum()?;
        loop {
            if self.eat_op(Operator::Shl) {
                let rhs = self.parse_sum()?;
                lhs = Expr::Binary(BinaryOp::Shl, Box::new(lhs), Box::new(rhs));
            } else if self.eat_op(Operator::Shr) {
                let rhs = self.parse_sum()?;
                lhs = Expr::Binary(BinaryOp::Shr, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_factor()?;
        loop {
            if self.eat_op(Operator::Plus) {
                let rhs = self.parse_factor()?;
                lhs = Expr::Binary(BinaryOp::Add, Box::new(lhs), Box::new(rhs));
            } else if self.eat_op(Operator::Minus) {
                let rhs = self.parse_factor()?;
                lhs = Expr::Binary(BinaryOp::Subtract, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, ExprParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat_op(Operator::Star) {
                let rhs = self.parse_unary()?;
                lhs = Expr::Binary(BinaryOp::Multiply, Box::new(lhs), Box::new(rhs));
            } else if self.eat_op(Operator::Slash) {
                let rhs = self.parse_unary()?;
                lhs = Expr::Binary(BinaryOp::Divide, Box::new(lhs), Box::new(rhs));
            } else if self.eat_op(Operator::Percent) {
                let rhs = self.parse_unary()?;
                lhs = Expr::Binary(BinaryOp::Mod, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprParseError> {
        if self.eat_op(Operator::Plus) {
            return Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.parse_unary()?)));
        }
        if self.eat_op(Operator::Minus) {
            return Ok(Expr::Unary(UnaryOp::Minus, Box::new(self.parse_unary()?)));
        }
        if self.eat_op(Operator::Tilde) {
            return Ok(Expr::Unary(UnaryOp::BitNot, Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprParseError> {
        let token = self.peek().ok_or_else(|| {
            ExprParseError::new(self.end_column(), "Unexpected end of expression")
        })?;
        let column = token.column;
        match token.kind.clone() {
            TokenKind::Int(value) => {
                self.pos += 1;
                Ok(Expr::Int(value))
            }
            TokenKind::Char(ch) => {
                self.pos += 1;
                Ok(Expr::Char(ch))
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                Ok(Expr::Ident(name))
            }
            TokenKind::OpenParen => {
                self.pos += 1;
                let inner = self.parse()?;
                self.expect_close_paren()?;
                Ok(inner)
            }
            TokenKind::Modifier(name) => {
                self.pos += 1;
                self.parse_modifier(&name, column)
            }
            TokenKind::Float(_) => Err(ExprParseError::new(
                column,
                "Float literal is not allowed in an integer expression",
            )),
            _ => Err(ExprParseError::new(
                column,
                "Expected a value in expression",
            )),
        }
    }

    fn parse_modifier(&mut self, name: &str, column: usize) -> Result<Expr, ExprParseError> {
        match name {
            "hi" | "lo" => {
                let inner = if self.eat_open_paren() {
                    let inner = self.parse()?;
                    self.expect_close_paren()?;
                    inner
                } else {
                    // Bare form absorbs the rest of the expression:
                    // `lui t0 %hi ADDR`, `lui t0 %hi %position main ADDR`.
                    self.parse()?
                };
                Ok(if name == "hi" {
                    Expr::Hi(Box::new(inner))
                } else {
                    Expr::Lo(Box::new(inner))
                })
            }
            "position" => {
                if self.eat_open_paren() {
                    let label = self.expect_label(column)?;
                    self.skip_comma();
                    let base = self.parse()?;
                    self.expect_close_paren()?;
                    Ok(Expr::Position {
                        label,
                        base: Box::new(base),
                    })
                } else {
                    let label = self.expect_label(column)?;
                    self.skip_comma();
                    let base = self.parse()?;
                    Ok(Expr::Position {
                        label,
                        base: Box::new(base),
                    })
                }
            }
            "offset" => {
                if self.eat_open_paren() {
                    let label = self.expect_label(column)?;
                    self.expect_close_paren()?;
                    Ok(Expr::OffsetOf { label })
                } else {
                    let label = self.expect_label(column)?;
                    Ok(Expr::OffsetOf { label })
                }
            }
            _ => Err(ExprParseError::new(
                column,
                format!("Unknown expression modifier: %{name}"),
            )),
        }
    }

    fn expect_label(&mut self, column: usize) -> Result<String, ExprParseError> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(ExprParseError::new(column, "Expected a label name")),
        }
    }

    fn expect_close_paren(&mut self) -> Result<(), ExprParseError> {
        match self.peek().map(|t| (t.kind.clone(), t.column)) {
            Some((TokenKind::CloseParen, _)) => {
                self.pos += 1;
                Ok(())
            }
            Some((_, column)) => Err(ExprParseError::new(column, "Expected ')'")),
            None => Err(ExprParseError::new(
                self.end_column(),
                "Expected ')' before end of line",
            )),
        }
    }

    fn eat_open_paren(&mut self) -> bool {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::OpenParen)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_comma(&mut self) {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
            self.pos += 1;
        }
    }

    fn eat_op(&mut self, op: Operator) -> bool {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Op(found)) if *found == op => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn end_column(&self) -> usize {
        self.tokens.last().map(|t| t.column + 1).unwrap_or(1)
    }
}

/// Resolve constant definitions over the register-seeded constant scope.
///
/// Forward references between constants are handled by repeatedly
/// evaluating whatever has become resolvable; if a round makes no progress
/// the leftovers are either cyclic or reference unknown names.
pub fn resolve_constants(
    defs: &[(String, Expr, Origin)],
) -> (HashMap<String, i64>, Vec<Diagnostic>) {
    let mut consts: HashMap<String, i64> = HashMap::new();
    let mut diagnostics = Vec::new();

    for (name, value) in registers::REGISTER_NAMES {
        consts.insert((*name).to_string(), *value as i64);
    }

    let mut pending: Vec<&(String, Expr, Origin)> = Vec::new();
    let mut seen: HashMap<&str, ()> = HashMap::new();
    for def in defs {
        let (name, expr, origin) = def;
        if registers::is_register(name) {
            diagnostics.push(
                Diagnostic::error(AsmError::new(
                    AsmErrorKind::Name,
                    "Constant name shadows register name",
                    Some(name),
                ))
                .with_origin(origin.clone()),
            );
            continue;
        }
        if seen.insert(name.as_str(), ()).is_some() {
            diagnostics.push(
                Diagnostic::error(AsmError::new(
                    AsmErrorKind::Name,
                    "Duplicate constant definition",
                    Some(name),
                ))
                .with_origin(origin.clone()),
            );
            continue;
        }
        if uses_position(expr) {
            diagnostics.push(
                Diagnostic::error(AsmError::new(
                    AsmErrorKind::Name,
                    "%position/%offset are not permitted in a constant definition",
                    Some(name),
                ))
                .with_origin(origin.clone()),
            );
            continue;
        }
        pending.push(def);
    }

    loop {
        let mut progressed = false;
        let mut still_pending = Vec::new();
        for def in pending {
            let (name, expr, _) = def;
            match eval(expr, &EvalScope::constants(&consts)) {
                Ok(value) => {
                    consts.insert(name.clone(), value);
                    progressed = true;
                }
                Err(_) => still_pending.push(def),
            }
        }
        pending = still_pending;
        if pending.is_empty() || !progressed {
            break;
        }
    }

    let pending_names: Vec<&str> = pending.iter().map(|(name, _, _)| name.as_str()).collect();
    for (name, expr, origin) in pending {
        let err = eval(expr, &EvalScope::constants(&consts))
            .err()
            .unwrap_or_else(|| EvalError::new("Unresolvable constant"));
        let cyclic = err
            .missing_symbol
            .as_deref()
            .map(|missing| pending_names.contains(&missing))
            .unwrap_or(false);
        let diag = if cyclic {
            AsmError::new(
                AsmErrorKind::Name,
                "Cycle in constant expressions",
                Some(name),
            )
        } else {
            AsmError::new(AsmErrorKind::Name, &err.message, Some(name))
        };
        diagnostics.push(Diagnostic::error(diag).with_origin(origin.clone()));
    }

    (consts, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tokenize;
    use proptest::prelude::*;

    fn parse(text: &str) -> Expr {
        let tokens = tokenize(text).expect("tokenize");
        let mut parser = ExprParser::new(&tokens, 0);
        let expr = parser.parse().expect("parse");
        assert_eq!(parser.pos, tokens.len(), "expression must consume all tokens");
        expr
    }

    fn eval_with(text: &str, consts: &[(&str, i64)]) -> i64 {
        let map: HashMap<String, i64> = consts
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect();
        eval(&parse(text), &EvalScope::constants(&map)).expect("eval")
    }

    #[test]
    fn precedence_matches_c_family() {
        assert_eq!(eval_with("1 + 2 * 3", &[]), 7);
        assert_eq!(eval_with("(1 + 2) * 3", &[]), 9);
        assert_eq!(eval_with("1 | 2 ^ 3 & 2", &[]), 1 | (2 ^ (3 & 2)));
        assert_eq!(eval_with("1 << 4 >> 2", &[]), 4);
        assert_eq!(eval_with("7 % 3 + 1", &[]), 2);
        assert_eq!(eval_with("-8 / 2", &[]), -4);
        assert_eq!(eval_with("~0", &[]), -1);
        assert_eq!(eval_with("1 + 2 << 3", &[]), 24);
    }

    #[test]
    fn char_literals_evaluate_to_scalar_values() {
        assert_eq!(eval_with("'A'", &[]), 65);
        assert_eq!(eval_with("'é'", &[]), 0xe9);
    }

    #[test]
    fn identifiers_resolve_from_scope() {
        assert_eq!(eval_with("FOO * 2", &[("FOO", 21)]), 42);
        assert_eq!(
            eval_with("BAR >> 1 & 0b11111", &[("BAR", 84)]),
            (84 >> 1) & 0b11111
        );
    }

    #[test]
    fn division_by_zero_is_reported() {
        let consts = HashMap::new();
        let err = eval(&parse("1 / 0"), &EvalScope::constants(&consts)).unwrap_err();
        assert!(err.message.contains("Division by zero"));
    }

    #[test]
    fn hi_lo_match_reference_vectors() {
        for (value, expected) in [
            (0x0000_0000i64, 0i64),
            (0x0000_1000, 1),
            (0x7fff_f000, 0x7ffff),
            (0xffff_f000u32 as i64, -1),
            (0x8000_0000u32 as i64, -0x80000),
            (0x0000_0800, 1),
            (0x0000_1800, 2),
            (0x7fff_f800, -0x80000),
            (0xffff_f800u32 as i64, 0),
            (0x8000_0800u32 as i64, -0x7ffff),
        ] {
            assert_eq!(relocate_hi(value), expected, "hi({value:#x})");
        }
        for (value, expected) in [
            (0x0000_0000i64, 0i64),
            (0x0000_0001, 1),
            (0x0000_07ff, 2047),
            (0x0000_0fff, -1),
            (0x0000_0800, -2048),
            (0xffff_f000u32 as i64, 0),
            (0xffff_ffffu32 as i64, -1),
            (0xffff_f800u32 as i64, -2048),
        ] {
            assert_eq!(relocate_lo(value), expected, "lo({value:#x})");
        }
    }

    #[test]
    fn sign_extend_vectors() {
        assert_eq!(sign_extend(0b0000_0110, 8), 6);
        assert_eq!(sign_extend(0b0000_0110, 3), -2);
        assert_eq!(sign_extend(0xffff_ffff, 32), -1);
        assert_eq!(sign_extend(0x0000_0fff, 12), -1);
        assert_eq!(sign_extend(0b1000_0000, 8), -128);
    }

    proptest! {
        #[test]
        fn hi_lo_reconstruct_the_value(value in any::<u32>()) {
            let hi = relocate_hi(value as i64);
            let lo = relocate_lo(value as i64);
            let sum = ((hi << 12) + lo) as i32;
            prop_assert_eq!(sum, value as i32);
        }

        #[test]
        fn lo_ignores_upper_bits(value in any::<u32>()) {
            prop_assert_eq!(relocate_lo(value as i64), relocate_lo((value & 0xfff) as i64));
        }
    }

    #[test]
    fn position_requires_label_scope() {
        let consts = HashMap::new();
        let expr = parse("%position(data, 0x08000000)");
        assert!(eval(&expr, &EvalScope::constants(&consts)).is_err());

        let mut labels = HashMap::new();
        labels.insert("data".to_string(), 0u32);
        let scope = EvalScope::at(&consts, &labels, 4);
        assert_eq!(eval(&expr, &scope).unwrap(), 0x0800_0000);
    }

    #[test]
    fn offset_is_position_relative() {
        let consts = HashMap::new();
        let mut labels = HashMap::new();
        labels.insert("loop".to_string(), 8u32);
        let scope = EvalScope::at(&consts, &labels, 20);
        assert_eq!(eval(&parse("%offset(loop)"), &scope).unwrap(), -12);
        assert_eq!(eval(&parse("%offset loop"), &scope).unwrap(), -12);
    }

    #[test]
    fn bare_modifier_forms_nest() {
        let expr = parse("%hi %position main ADDR");
        match expr {
            Expr::Hi(inner) => match *inner {
                Expr::Position { ref label, .. } => assert_eq!(label, "main"),
                other => panic!("expected %position inside %hi, got {other:?}"),
            },
            other => panic!("expected %hi, got {other:?}"),
        }
    }

    #[test]
    fn constants_resolve_topologically() {
        let origin = Origin::new("<test>", 1, 1);
        let defs = vec![
            (
                "BAR".to_string(),
                parse("FOO * 2"),
                origin.clone(),
            ),
            ("FOO".to_string(), parse("42"), origin.clone()),
            ("IP".to_string(), parse("gp"), origin.clone()),
        ];
        let (consts, diags) = resolve_constants(&defs);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(consts["FOO"], 42);
        assert_eq!(consts["BAR"], 84);
        assert_eq!(consts["IP"], 3);
    }

    #[test]
    fn constant_cycles_are_errors() {
        let origin = Origin::new("<test>", 1, 1);
        let defs = vec![
            ("A".to_string(), parse("B + 1"), origin.clone()),
            ("B".to_string(), parse("A + 1"), origin.clone()),
        ];
        let (_, diags) = resolve_constants(&defs);
        assert_eq!(diags.len(), 2);
        assert!(diags[0].message().contains("Cycle"));
    }

    #[test]
    fn duplicate_and_shadowing_constants_are_errors() {
        let origin = Origin::new("<test>", 1, 1);
        let defs = vec![
            ("X".to_string(), parse("1"), origin.clone()),
            ("X".to_string(), parse("2"), origin.clone()),
            ("sp".to_string(), parse("3"), origin.clone()),
        ];
        let (consts, diags) = resolve_constants(&defs);
        assert_eq!(diags.len(), 2);
        assert_eq!(consts["X"], 1);
        assert_eq!(consts["sp"], 2, "register value must survive");
    }

    #[test]
    fn position_is_rejected_in_constant_definitions() {
        let origin = Origin::new("<test>", 1, 1);
        let defs = vec![(
            "P".to_string(),
            parse("%position(main, 0)"),
            origin.clone(),
        )];
        let (_, diags) = resolve_constants(&defs);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message().contains("not permitted"));
    }
}

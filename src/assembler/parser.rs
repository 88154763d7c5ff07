// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Parser: token stream to program items.
//!
//! Each source line yields at most one item. Instruction operands are
//! parsed by the mnemonic's form; loads, stores, and `jalr` additionally
//! accept the `imm(rs)` memory-operand sugar. Commas separate operands but
//! otherwise behave as whitespace.

use crate::instructions::{self, Form};
use crate::registers;
use crate::scanner::{self, Operator, Token, TokenKind};

use super::error::{AsmError, AsmErrorKind, Diagnostic, Origin};
use super::expr::{Expr, ExprParser, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Signed,
    Unsigned,
    /// Signedness chosen from the resolved value (negative => signed).
    Infer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackFmt {
    Int { width: u8, sign: Sign },
    Float { width: u8 },
}

impl PackFmt {
    pub fn width(&self) -> u8 {
        match self {
            PackFmt::Int { width, .. } => *width,
            PackFmt::Float { width } => *width,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PackValue {
    Expr(Expr),
    Float(f64),
}

/// A register slot before resolution: a name, a literal number, or a
/// constant that aliases a register.
#[derive(Debug, Clone, PartialEq)]
pub enum RegOperand {
    Name(String),
    Num(i64),
}

/// Branch/jump destination. A bare identifier is PC-relative to the named
/// label; any other expression is a literal byte offset.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Label(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    R {
        name: String,
        rd: RegOperand,
        rs1: RegOperand,
        rs2: RegOperand,
    },
    Shift {
        name: String,
        rd: RegOperand,
        rs1: RegOperand,
        shamt: Expr,
    },
    I {
        name: String,
        rd: RegOperand,
        rs1: RegOperand,
        imm: Expr,
    },
    S {
        name: String,
        rs1: RegOperand,
        rs2: RegOperand,
        imm: Expr,
    },
    B {
        name: String,
        rs1: RegOperand,
        rs2: RegOperand,
        target: Target,
    },
    U {
        name: String,
        rd: RegOperand,
        imm: Expr,
    },
    J {
        name: String,
        rd: RegOperand,
        target: Target,
    },
    Fence {
        pred: u8,
        succ: u8,
    },
    FenceI,
    Ecall,
    Ebreak,
    Amo {
        name: String,
        rd: RegOperand,
        rs1: RegOperand,
        rs2: Option<RegOperand>,
        aq: bool,
        rl: bool,
    },
    C(CInst),
}

/// Explicit compressed instructions (also produced by the compressor).
#[derive(Debug, Clone, PartialEq)]
pub enum CInst {
    Addi4spn { rd: RegOperand, imm: Expr },
    Lw { rd: RegOperand, rs1: RegOperand, imm: Expr },
    Sw { rs1: RegOperand, rs2: RegOperand, imm: Expr },
    Nop,
    Addi { rd: RegOperand, imm: Expr },
    Jal { target: Target },
    Li { rd: RegOperand, imm: Expr },
    Addi16sp { imm: Expr },
    Lui { rd: RegOperand, imm: Expr },
    Srli { rd: RegOperand, shamt: Expr },
    Srai { rd: RegOperand, shamt: Expr },
    Andi { rd: RegOperand, imm: Expr },
    Sub { rd: RegOperand, rs2: RegOperand },
    Xor { rd: RegOperand, rs2: RegOperand },
    Or { rd: RegOperand, rs2: RegOperand },
    And { rd: RegOperand, rs2: RegOperand },
    J { target: Target },
    Beqz { rs1: RegOperand, target: Target },
    Bnez { rs1: RegOperand, target: Target },
    Slli { rd: RegOperand, shamt: Expr },
    Lwsp { rd: RegOperand, imm: Expr },
    Jr { rs1: RegOperand },
    Jalr { rs1: RegOperand },
    Mv { rd: RegOperand, rs2: RegOperand },
    Add { rd: RegOperand, rs2: RegOperand },
    Ebreak,
    Swsp { rs2: RegOperand, imm: Expr },
}

/// Pseudo-instructions and shorthand directives, expanded before layout.
/// `Li`/`Call`/`Tail` survive into layout because their width depends on
/// resolved values and label distances.
#[derive(Debug, Clone, PartialEq)]
pub enum Pseudo {
    Nop,
    Mv { rd: RegOperand, rs: RegOperand },
    Not { rd: RegOperand, rs: RegOperand },
    Neg { rd: RegOperand, rs: RegOperand },
    Seqz { rd: RegOperand, rs: RegOperand },
    Snez { rd: RegOperand, rs: RegOperand },
    Sltz { rd: RegOperand, rs: RegOperand },
    Sgtz { rd: RegOperand, rs: RegOperand },
    Beqz { rs: RegOperand, target: Target },
    Bnez { rs: RegOperand, target: Target },
    Blez { rs: RegOperand, target: Target },
    Bgez { rs: RegOperand, target: Target },
    Bltz { rs: RegOperand, target: Target },
    Bgtz { rs: RegOperand, target: Target },
    Bgt { rs: RegOperand, rt: RegOperand, target: Target },
    Ble { rs: RegOperand, rt: RegOperand, target: Target },
    Bgtu { rs: RegOperand, rt: RegOperand, target: Target },
    Bleu { rs: RegOperand, rt: RegOperand, target: Target },
    J { target: Target },
    Jal { target: Target },
    Jr { rs: RegOperand },
    Jalr { rs: RegOperand },
    Ret,
    Li { rd: RegOperand, imm: Expr },
    Call { target: Target },
    Tail { target: Target },
    Db { expr: Expr },
    Dh { expr: Expr },
    Dw { expr: Expr },
    Dd { expr: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Constant { name: String, expr: Expr },
    Label { name: String },
    Inst(Inst),
    Pseudo(Pseudo),
    Bytes { values: Vec<Expr> },
    Shorts { values: Vec<Expr> },
    Ints { values: Vec<Expr> },
    Longs { values: Vec<Expr> },
    LongLongs { values: Vec<Expr> },
    Floats { values: Vec<f64> },
    Doubles { values: Vec<f64> },
    Str { data: Vec<u8> },
    Pack { endian: Endian, fmt: PackFmt, value: PackValue },
    Align { expr: Expr },
    ErrorDirective { message: String },
    IncludeBytes { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub item: Item,
    pub origin: Origin,
}

struct ParseError {
    column: usize,
    kind: AsmErrorKind,
    message: String,
}

impl ParseError {
    fn syntax(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            kind: AsmErrorKind::Syntax,
            message: message.into(),
        }
    }

    fn form(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            kind: AsmErrorKind::Form,
            message: message.into(),
        }
    }
}

/// Parse one source line into an item, if the line holds one.
pub fn parse_line(line: &str, origin: &Origin) -> Result<Option<SourceItem>, Diagnostic> {
    let tokens = scanner::tokenize(line).map_err(|err| {
        Diagnostic::error(AsmError::new(AsmErrorKind::Syntax, &err.message, None))
            .with_origin(origin.with_column(err.column))
    })?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = LineParser {
        tokens: &tokens,
        pos: 0,
    };
    match parser.parse_item() {
        Ok(item) => Ok(Some(SourceItem {
            item,
            origin: origin.clone(),
        })),
        Err(err) => Err(
            Diagnostic::error(AsmError::new(err.kind, &err.message, None))
                .with_origin(origin.with_column(err.column)),
        ),
    }
}

struct LineParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> LineParser<'a> {
    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let first = &self.tokens[0];
        let name = match &first.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => {
                return Err(ParseError::syntax(
                    first.column,
                    "Expected label, constant, directive, or instruction",
                ))
            }
        };

        if matches!(self.tokens.get(1).map(|t| &t.kind), Some(TokenKind::Colon)) {
            if self.tokens.len() != 2 {
                return Err(ParseError::syntax(
                    self.tokens[2].column,
                    "Label must be alone on its line",
                ));
            }
            return Ok(Item::Label { name });
        }

        if matches!(self.tokens.get(1).map(|t| &t.kind), Some(TokenKind::Equals)) {
            self.pos = 2;
            let expr = self.parse_expr_rest()?;
            return Ok(Item::Constant { name, expr });
        }

        self.pos = 1;
        let lc = name.to_ascii_lowercase();
        match lc.as_str() {
            "bytes" => Ok(Item::Bytes {
                values: self.parse_value_list(&lc)?,
            }),
            "shorts" => Ok(Item::Shorts {
                values: self.parse_value_list(&lc)?,
            }),
            "ints" => Ok(Item::Ints {
                values: self.parse_value_list(&lc)?,
            }),
            "longs" => Ok(Item::Longs {
                values: self.parse_value_list(&lc)?,
            }),
            "longlongs" => Ok(Item::LongLongs {
                values: self.parse_value_list(&lc)?,
            }),
            "floats" => Ok(Item::Floats {
                values: self.parse_float_list(&lc)?,
            }),
            "doubles" => Ok(Item::Doubles {
                values: self.parse_float_list(&lc)?,
            }),
            "string" => Ok(Item::Str {
                data: self.take_capture()?.into_bytes(),
            }),
            "error" => Ok(Item::ErrorDirective {
                message: self.take_capture()?,
            }),
            "pack" => self.parse_pack(),
            "align" => Ok(Item::Align {
                expr: self.parse_expr_rest()?,
            }),
            "db" => Ok(Item::Pseudo(Pseudo::Db {
                expr: self.parse_expr_rest()?,
            })),
            "dh" => Ok(Item::Pseudo(Pseudo::Dh {
                expr: self.parse_expr_rest()?,
            })),
            "dw" => Ok(Item::Pseudo(Pseudo::Dw {
                expr: self.parse_expr_rest()?,
            })),
            "dd" => Ok(Item::Pseudo(Pseudo::Dd {
                expr: self.parse_expr_rest()?,
            })),
            _ => self.parse_instruction(&lc),
        }
    }

    fn parse_instruction(&mut self, name: &str) -> Result<Item, ParseError> {
        if let Some(item) = self.parse_pseudo(name)? {
            return Ok(item);
        }
        if let Some(rest) = name.strip_prefix("c.") {
            return self.parse_compressed(name, rest);
        }
        let spec = match instructions::instruction_spec(name) {
            Some(spec) => spec,
            None => {
                return Err(ParseError::syntax(
                    self.tokens[0].column,
                    format!("Unknown mnemonic or directive: {name}"),
                ))
            }
        };
        let item = match spec.form {
            Form::R => {
                let rd = self.parse_reg("rd")?;
                let rs1 = self.parse_reg("rs1")?;
                let rs2 = self.parse_reg("rs2")?;
                self.expect_end()?;
                Inst::R {
                    name: name.to_string(),
                    rd,
                    rs1,
                    rs2,
                }
            }
            Form::Shift => {
                let rd = self.parse_reg("rd")?;
                let rs1 = self.parse_reg("rs1")?;
                let shamt = self.parse_expr_rest()?;
                Inst::Shift {
                    name: name.to_string(),
                    rd,
                    rs1,
                    shamt,
                }
            }
            Form::I => {
                let rd = self.parse_reg("rd")?;
                let rs1 = self.parse_reg("rs1")?;
                let imm = self.parse_expr_rest()?;
                Inst::I {
                    name: name.to_string(),
                    rd,
                    rs1,
                    imm,
                }
            }
            Form::Load => {
                let rd = self.parse_reg("rd")?;
                if name == "jalr" && self.at_end() {
                    return Ok(Item::Pseudo(Pseudo::Jalr { rs: rd }));
                }
                self.parse_load_rest(name, rd)?
            }
            Form::S => {
                let first = self.parse_reg("rs1")?;
                self.skip_commas();
                let second = self.parse_expr_stop()?;
                if self.eat_open_paren() {
                    let base = self.parse_reg("base register")?;
                    self.expect_close_paren()?;
                    self.expect_end()?;
                    Inst::S {
                        name: name.to_string(),
                        rs1: base,
                        rs2: first,
                        imm: second,
                    }
                } else {
                    let rs2 = self.expr_to_reg(second)?;
                    let imm = self.parse_expr_rest()?;
                    Inst::S {
                        name: name.to_string(),
                        rs1: first,
                        rs2,
                        imm,
                    }
                }
            }
            Form::B => {
                let rs1 = self.parse_reg("rs1")?;
                let rs2 = self.parse_reg("rs2")?;
                let target = self.parse_target_rest()?;
                Inst::B {
                    name: name.to_string(),
                    rs1,
                    rs2,
                    target,
                }
            }
            Form::U => {
                let rd = self.parse_reg("rd")?;
                let imm = self.parse_expr_rest()?;
                Inst::U {
                    name: name.to_string(),
                    rd,
                    imm,
                }
            }
            Form::J => return self.parse_jal(),
            Form::Fence => {
                if self.at_end() {
                    Inst::Fence { pred: 0b1111, succ: 0b1111 }
                } else {
                    let pred = self.parse_fence_mask()?;
                    let succ = self.parse_fence_mask()?;
                    self.expect_end()?;
                    Inst::Fence { pred, succ }
                }
            }
            Form::FenceI => {
                self.expect_end()?;
                Inst::FenceI
            }
            Form::Ecall => {
                self.expect_end()?;
                Inst::Ecall
            }
            Form::Ebreak => {
                self.expect_end()?;
                Inst::Ebreak
            }
            Form::AmoLr => {
                let rd = self.parse_reg("rd")?;
                let rs1 = self.parse_reg("rs1")?;
                let (aq, rl) = self.parse_aq_rl()?;
                Inst::Amo {
                    name: name.to_string(),
                    rd,
                    rs1,
                    rs2: None,
                    aq,
                    rl,
                }
            }
            Form::Amo => {
                let rd = self.parse_reg("rd")?;
                let rs1 = self.parse_reg("rs1")?;
                let rs2 = self.parse_reg("rs2")?;
                let (aq, rl) = self.parse_aq_rl()?;
                Inst::Amo {
                    name: name.to_string(),
                    rd,
                    rs1,
                    rs2: Some(rs2),
                    aq,
                    rl,
                }
            }
        };
        Ok(Item::Inst(item))
    }

    fn parse_pseudo(&mut self, name: &str) -> Result<Option<Item>, ParseError> {
        let item = match name {
            "nop" => {
                self.expect_end()?;
                Item::Pseudo(Pseudo::Nop)
            }
            "ret" => {
                self.expect_end()?;
                Item::Pseudo(Pseudo::Ret)
            }
            "mv" | "not" | "neg" | "seqz" | "snez" | "sltz" | "sgtz" => {
                let rd = self.parse_reg("rd")?;
                let rs = self.parse_reg("rs")?;
                self.expect_end()?;
                Item::Pseudo(match name {
                    "mv" => Pseudo::Mv { rd, rs },
                    "not" => Pseudo::Not { rd, rs },
                    "neg" => Pseudo::Neg { rd, rs },
                    "seqz" => Pseudo::Seqz { rd, rs },
                    "snez" => Pseudo::Snez { rd, rs },
                    "sltz" => Pseudo::Sltz { rd, rs },
                    _ => Pseudo::Sgtz { rd, rs },
                })
            }
            "beqz" | "bnez" | "blez" | "bgez" | "bltz" | "bgtz" => {
                let rs = self.parse_reg("rs")?;
                let target = self.parse_target_rest()?;
                Item::Pseudo(match name {
                    "beqz" => Pseudo::Beqz { rs, target },
                    "bnez" => Pseudo::Bnez { rs, target },
                    "blez" => Pseudo::Blez { rs, target },
                    "bgez" => Pseudo::Bgez { rs, target },
                    "bltz" => Pseudo::Bltz { rs, target },
                    _ => Pseudo::Bgtz { rs, target },
                })
            }
            "bgt" | "ble" | "bgtu" | "bleu" => {
                let rs = self.parse_reg("rs")?;
                let rt = self.parse_reg("rt")?;
                let target = self.parse_target_rest()?;
                Item::Pseudo(match name {
                    "bgt" => Pseudo::Bgt { rs, rt, target },
                    "ble" => Pseudo::Ble { rs, rt, target },
                    "bgtu" => Pseudo::Bgtu { rs, rt, target },
                    _ => Pseudo::Bleu { rs, rt, target },
                })
            }
            "j" => {
                let target = self.parse_target_rest()?;
                Item::Pseudo(Pseudo::J { target })
            }
            "jr" => {
                let rs = self.parse_reg("rs")?;
                self.expect_end()?;
                Item::Pseudo(Pseudo::Jr { rs })
            }
            "li" => {
                let rd = self.parse_reg("rd")?;
                let imm = self.parse_expr_rest()?;
                Item::Pseudo(Pseudo::Li { rd, imm })
            }
            "call" => {
                let target = self.parse_target_rest()?;
                Item::Pseudo(Pseudo::Call { target })
            }
            "tail" => {
                let target = self.parse_target_rest()?;
                Item::Pseudo(Pseudo::Tail { target })
            }
            _ => return Ok(None),
        };
        Ok(Some(item))
    }

    fn parse_jal(&mut self) -> Result<Item, ParseError> {
        self.skip_commas();
        let save = self.pos;
        if let Some(rd) = self.try_reg() {
            self.skip_commas();
            if !self.at_end() {
                let target = self.parse_target_rest()?;
                return Ok(Item::Inst(Inst::J {
                    name: "jal".to_string(),
                    rd,
                    target,
                }));
            }
            self.pos = save;
        }
        let target = self.parse_target_rest()?;
        Ok(Item::Pseudo(Pseudo::Jal { target }))
    }

    fn parse_compressed(&mut self, full: &str, rest: &str) -> Result<Item, ParseError> {
        let inst = match rest {
            "addi4spn" => CInst::Addi4spn {
                rd: self.parse_reg("rd")?,
                imm: self.parse_expr_rest()?,
            },
            "lw" => {
                let rd = self.parse_reg("rd")?;
                let rs1 = self.parse_reg("rs1")?;
                CInst::Lw {
                    rd,
                    rs1,
                    imm: self.parse_expr_rest()?,
                }
            }
            "sw" => {
                let rs1 = self.parse_reg("rs1")?;
                let rs2 = self.parse_reg("rs2")?;
                CInst::Sw {
                    rs1,
                    rs2,
                    imm: self.parse_expr_rest()?,
                }
            }
            "nop" => {
                self.expect_end()?;
                CInst::Nop
            }
            "addi" => CInst::Addi {
                rd: self.parse_reg("rd")?,
                imm: self.parse_expr_rest()?,
            },
            "jal" => CInst::Jal {
                target: self.parse_target_rest()?,
            },
            "li" => CInst::Li {
                rd: self.parse_reg("rd")?,
                imm: self.parse_expr_rest()?,
            },
            "addi16sp" => CInst::Addi16sp {
                imm: self.parse_expr_rest()?,
            },
            "lui" => CInst::Lui {
                rd: self.parse_reg("rd")?,
                imm: self.parse_expr_rest()?,
            },
            "srli" => CInst::Srli {
                rd: self.parse_reg("rd")?,
                shamt: self.parse_expr_rest()?,
            },
            "srai" => CInst::Srai {
                rd: self.parse_reg("rd")?,
                shamt: self.parse_expr_rest()?,
            },
            "andi" => CInst::Andi {
                rd: self.parse_reg("rd")?,
                imm: self.parse_expr_rest()?,
            },
            "sub" | "xor" | "or" | "and" | "mv" | "add" => {
                let rd = self.parse_reg("rd")?;
                let rs2 = self.parse_reg("rs2")?;
                self.expect_end()?;
                match rest {
                    "sub" => CInst::Sub { rd, rs2 },
                    "xor" => CInst::Xor { rd, rs2 },
                    "or" => CInst::Or { rd, rs2 },
                    "and" => CInst::And { rd, rs2 },
                    "mv" => CInst::Mv { rd, rs2 },
                    _ => CInst::Add { rd, rs2 },
                }
            }
            "j" => CInst::J {
                target: self.parse_target_rest()?,
            },
            "beqz" => CInst::Beqz {
                rs1: self.parse_reg("rs1")?,
                target: self.parse_target_rest()?,
            },
            "bnez" => CInst::Bnez {
                rs1: self.parse_reg("rs1")?,
                target: self.parse_target_rest()?,
            },
            "slli" => CInst::Slli {
                rd: self.parse_reg("rd")?,
                shamt: self.parse_expr_rest()?,
            },
            "lwsp" => CInst::Lwsp {
                rd: self.parse_reg("rd")?,
                imm: self.parse_expr_rest()?,
            },
            "jr" => {
                let rs1 = self.parse_reg("rs1")?;
                self.expect_end()?;
                CInst::Jr { rs1 }
            }
            "jalr" => {
                let rs1 = self.parse_reg("rs1")?;
                self.expect_end()?;
                CInst::Jalr { rs1 }
            }
            "ebreak" => {
                self.expect_end()?;
                CInst::Ebreak
            }
            "swsp" => CInst::Swsp {
                rs2: self.parse_reg("rs2")?,
                imm: self.parse_expr_rest()?,
            },
            _ => {
                return Err(ParseError::syntax(
                    self.tokens[0].column,
                    format!("Unknown mnemonic or directive: {full}"),
                ))
            }
        };
        Ok(Item::Inst(Inst::C(inst)))
    }

    fn parse_load_rest(&mut self, name: &str, rd: RegOperand) -> Result<Inst, ParseError> {
        self.skip_commas();
        let first = self.parse_expr_stop()?;
        if self.eat_open_paren() {
            let base = self.parse_reg("base register")?;
            self.expect_close_paren()?;
            self.expect_end()?;
            Ok(Inst::I {
                name: name.to_string(),
                rd,
                rs1: base,
                imm: first,
            })
        } else {
            let rs1 = self.expr_to_reg(first)?;
            let imm = self.parse_expr_rest()?;
            Ok(Inst::I {
                name: name.to_string(),
                rd,
                rs1,
                imm,
            })
        }
    }

    fn parse_pack(&mut self) -> Result<Item, ParseError> {
        let (word, column) = match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Word(word),
                column,
            }) => (word.clone(), *column),
            Some(token) => {
                return Err(ParseError::syntax(token.column, "Expected pack format"))
            }
            None => {
                return Err(ParseError::syntax(
                    self.end_column(),
                    "pack expects a format and a value",
                ))
            }
        };
        self.pos += 1;
        let (endian, fmt) = parse_pack_format(&word, column)?;

        self.skip_commas();
        let negative = self.eat_minus_before_float();
        if let Some(TokenKind::Float(value)) = self.tokens.get(self.pos).map(|t| t.kind.clone()) {
            self.pos += 1;
            self.expect_end()?;
            let value = if negative { -value } else { value };
            return Ok(Item::Pack {
                endian,
                fmt,
                value: PackValue::Float(value),
            });
        }
        let expr = self.parse_expr_rest()?;
        Ok(Item::Pack {
            endian,
            fmt,
            value: PackValue::Expr(expr),
        })
    }

    fn eat_minus_before_float(&mut self) -> bool {
        let minus = matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            Some(TokenKind::Op(Operator::Minus))
        );
        let float_next = matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Float(_))
        );
        if minus && float_next {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_value_list(&mut self, directive: &str) -> Result<Vec<Expr>, ParseError> {
        let mut values = Vec::new();
        loop {
            self.skip_commas();
            if self.at_end() {
                break;
            }
            values.push(self.parse_list_value()?);
        }
        if values.is_empty() {
            return Err(ParseError::syntax(
                self.end_column(),
                format!("{directive} expects at least one value"),
            ));
        }
        Ok(values)
    }

    /// One value in a data list: an optionally signed literal or identifier,
    /// or a parenthesized/modifier expression.
    fn parse_list_value(&mut self) -> Result<Expr, ParseError> {
        let token = match self.tokens.get(self.pos) {
            Some(token) => token,
            None => {
                return Err(ParseError::syntax(
                    self.end_column(),
                    "Expected a value",
                ))
            }
        };
        match &token.kind {
            TokenKind::Op(Operator::Minus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Minus, Box::new(self.parse_list_value()?)))
            }
            TokenKind::Op(Operator::Plus) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.parse_list_value()?)))
            }
            TokenKind::Op(Operator::Tilde) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::BitNot, Box::new(self.parse_list_value()?)))
            }
            TokenKind::Int(value) => {
                self.pos += 1;
                Ok(Expr::Int(*value))
            }
            TokenKind::Char(ch) => {
                self.pos += 1;
                Ok(Expr::Char(*ch))
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                Ok(Expr::Ident(name.clone()))
            }
            TokenKind::OpenParen | TokenKind::Modifier(_) => self.run_expr_parser(),
            _ => Err(ParseError::syntax(token.column, "Expected a value")),
        }
    }

    fn parse_float_list(&mut self, directive: &str) -> Result<Vec<f64>, ParseError> {
        let mut values = Vec::new();
        loop {
            self.skip_commas();
            if self.at_end() {
                break;
            }
            let negative = matches!(
                self.tokens.get(self.pos).map(|t| &t.kind),
                Some(TokenKind::Op(Operator::Minus))
            );
            if negative {
                self.pos += 1;
            }
            let token = self.tokens.get(self.pos).ok_or_else(|| {
                ParseError::syntax(self.end_column(), "Expected a numeric literal")
            })?;
            let value = match &token.kind {
                TokenKind::Float(value) => *value,
                TokenKind::Int(value) => *value as f64,
                _ => {
                    return Err(ParseError::syntax(
                        token.column,
                        "Expected a numeric literal",
                    ))
                }
            };
            self.pos += 1;
            values.push(if negative { -value } else { value });
        }
        if values.is_empty() {
            return Err(ParseError::syntax(
                self.end_column(),
                format!("{directive} expects at least one value"),
            ));
        }
        Ok(values)
    }

    fn parse_fence_mask(&mut self) -> Result<u8, ParseError> {
        self.skip_commas();
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| ParseError::form(self.end_column(), "fence expects two masks"))?;
        let mask = match &token.kind {
            TokenKind::Int(value) if (0..=15).contains(value) => *value as u8,
            TokenKind::Ident(name) if !name.is_empty() => {
                let mut mask = 0u8;
                for ch in name.chars() {
                    mask |= match ch {
                        'i' => 0b1000,
                        'o' => 0b0100,
                        'r' => 0b0010,
                        'w' => 0b0001,
                        _ => {
                            return Err(ParseError::form(
                                token.column,
                                format!("fence mask may only contain iorw: {name}"),
                            ))
                        }
                    };
                }
                mask
            }
            _ => {
                return Err(ParseError::form(
                    token.column,
                    "fence expects an iorw set or a value between 0 and 15",
                ))
            }
        };
        self.pos += 1;
        Ok(mask)
    }

    fn parse_aq_rl(&mut self) -> Result<(bool, bool), ParseError> {
        self.skip_commas();
        if self.at_end() {
            return Ok((false, false));
        }
        let aq = self.parse_bit("aq")?;
        let rl = self.parse_bit("rl")?;
        self.expect_end()?;
        Ok((aq, rl))
    }

    fn parse_bit(&mut self, what: &str) -> Result<bool, ParseError> {
        self.skip_commas();
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Int(value),
                ..
            }) if *value == 0 || *value == 1 => {
                self.pos += 1;
                Ok(*value == 1)
            }
            Some(token) => Err(ParseError::form(
                token.column,
                format!("Expected 0 or 1 for {what}"),
            )),
            None => Err(ParseError::form(
                self.end_column(),
                format!("Expected 0 or 1 for {what}"),
            )),
        }
    }

    fn parse_reg(&mut self, what: &str) -> Result<RegOperand, ParseError> {
        self.skip_commas();
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => {
                let reg = RegOperand::Name(name.clone());
                self.pos += 1;
                Ok(reg)
            }
            Some(Token {
                kind: TokenKind::Int(value),
                ..
            }) => {
                let reg = RegOperand::Num(*value);
                self.pos += 1;
                Ok(reg)
            }
            Some(token) => Err(ParseError::form(
                token.column,
                format!("Expected register for {what}"),
            )),
            None => Err(ParseError::form(
                self.end_column(),
                format!("Expected register for {what}"),
            )),
        }
    }

    /// Consume an Ident that names a register, or an integer literal.
    fn try_reg(&mut self) -> Option<RegOperand> {
        match self.tokens.get(self.pos).map(|t| t.kind.clone()) {
            Some(TokenKind::Ident(name)) if registers::is_register(&name) => {
                self.pos += 1;
                Some(RegOperand::Name(name))
            }
            Some(TokenKind::Int(value)) => {
                self.pos += 1;
                Some(RegOperand::Num(value))
            }
            _ => None,
        }
    }

    fn expr_to_reg(&self, expr: Expr) -> Result<RegOperand, ParseError> {
        match expr {
            Expr::Ident(name) => Ok(RegOperand::Name(name)),
            Expr::Int(value) => Ok(RegOperand::Num(value)),
            _ => Err(ParseError::form(
                self.end_column(),
                "Expected a register or imm(base) operand",
            )),
        }
    }

    fn parse_target_rest(&mut self) -> Result<Target, ParseError> {
        self.skip_commas();
        if let Some(Token {
            kind: TokenKind::Ident(name),
            ..
        }) = self.tokens.get(self.pos)
        {
            if self.pos + 1 == self.tokens.len() {
                let name = name.clone();
                self.pos += 1;
                return Ok(Target::Label(name));
            }
        }
        let expr = self.parse_expr_rest()?;
        Ok(Target::Expr(expr))
    }

    fn parse_expr_rest(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr_stop()?;
        self.expect_end()?;
        Ok(expr)
    }

    fn parse_expr_stop(&mut self) -> Result<Expr, ParseError> {
        self.skip_commas();
        self.run_expr_parser()
    }

    fn run_expr_parser(&mut self) -> Result<Expr, ParseError> {
        let mut parser = ExprParser::new(self.tokens, self.pos);
        let expr = parser
            .parse()
            .map_err(|err| ParseError::syntax(err.column, err.message))?;
        self.pos = parser.pos;
        Ok(expr)
    }

    fn take_capture(&mut self) -> Result<String, ParseError> {
        match self.tokens.get(self.pos).map(|t| t.kind.clone()) {
            Some(TokenKind::Str(payload)) => {
                self.pos += 1;
                Ok(payload)
            }
            _ => Err(ParseError::syntax(
                self.end_column(),
                "Missing captured payload",
            )),
        }
    }

    fn skip_commas(&mut self) {
        while matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            Some(TokenKind::Comma)
        ) {
            self.pos += 1;
        }
    }

    fn eat_open_paren(&mut self) -> bool {
        if matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            Some(TokenKind::OpenParen)
        ) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_close_paren(&mut self) -> Result<(), ParseError> {
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::CloseParen,
                ..
            }) => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(ParseError::syntax(token.column, "Expected ')'")),
            None => Err(ParseError::syntax(self.end_column(), "Expected ')'")),
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_commas();
        self.pos >= self.tokens.len()
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            let token = &self.tokens[self.pos];
            Err(ParseError::syntax(
                token.column,
                "Unexpected token after item",
            ))
        }
    }

    fn end_column(&self) -> usize {
        self.tokens.last().map(|t| t.column + 1).unwrap_or(1)
    }
}

/// Resolve a register slot: a register name, a literal number, or a
/// constant whose value is a valid register number.
pub fn resolve_reg(
    op: &RegOperand,
    consts: &std::collections::HashMap<String, i64>,
) -> Result<u8, String> {
    let value = match op {
        RegOperand::Name(name) => {
            if let Some(reg) = registers::lookup(name) {
                return Ok(reg);
            }
            match consts.get(name) {
                Some(value) => *value,
                None => {
                    return Err(format!("Register is not a number or valid name: {name}"));
                }
            }
        }
        RegOperand::Num(value) => *value,
    };
    if !(0..=31).contains(&value) {
        return Err(format!("Register must be between 0 and 31: {value}"));
    }
    Ok(value as u8)
}

fn parse_pack_format(word: &str, column: usize) -> Result<(Endian, PackFmt), ParseError> {
    let mut chars = word.chars();
    let endian = match chars.next() {
        Some('<') => Endian::Little,
        Some('>') => Endian::Big,
        _ => {
            return Err(ParseError::syntax(
                column,
                format!("Pack format must start with '<' or '>': {word}"),
            ))
        }
    };
    let type_ch = chars.next().ok_or_else(|| {
        ParseError::syntax(column, format!("Pack format is missing a type character: {word}"))
    })?;
    if chars.next().is_some() {
        return Err(ParseError::syntax(
            column,
            format!("Pack format must be an endianness and one type character: {word}"),
        ));
    }
    let fmt = match type_ch {
        'B' => PackFmt::Int { width: 1, sign: Sign::Unsigned },
        'b' => PackFmt::Int { width: 1, sign: Sign::Signed },
        'H' => PackFmt::Int { width: 2, sign: Sign::Unsigned },
        'h' => PackFmt::Int { width: 2, sign: Sign::Signed },
        'I' => PackFmt::Int { width: 4, sign: Sign::Unsigned },
        'i' => PackFmt::Int { width: 4, sign: Sign::Signed },
        'Q' => PackFmt::Int { width: 8, sign: Sign::Unsigned },
        'q' => PackFmt::Int { width: 8, sign: Sign::Signed },
        'f' => PackFmt::Float { width: 4 },
        'd' => PackFmt::Float { width: 8 },
        other => {
            return Err(ParseError::syntax(
                column,
                format!("Unsupported pack format character: {other}"),
            ))
        }
    };
    Ok((endian, fmt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::new("<test>", 1, 1)
    }

    fn parse(line: &str) -> Item {
        parse_line(line, &origin())
            .expect("line should parse")
            .expect("line should hold an item")
            .item
    }

    fn parse_err(line: &str) -> Diagnostic {
        parse_line(line, &origin()).expect_err("line should fail")
    }

    #[test]
    fn empty_and_comment_lines_yield_nothing() {
        assert!(parse_line("", &origin()).unwrap().is_none());
        assert!(parse_line("   # just a comment", &origin()).unwrap().is_none());
    }

    #[test]
    fn parses_labels_and_constants() {
        assert_eq!(parse("main:"), Item::Label { name: "main".to_string() });
        match parse("FOO = 42") {
            Item::Constant { name, expr } => {
                assert_eq!(name, "FOO");
                assert_eq!(expr, Expr::Int(42));
            }
            other => panic!("expected constant, got {other:?}"),
        }
        assert!(parse_err("main: addi x0 x0 0").message().contains("alone"));
    }

    #[test]
    fn parses_r_type() {
        assert_eq!(
            parse("add x1, x2, x3"),
            Item::Inst(Inst::R {
                name: "add".to_string(),
                rd: RegOperand::Name("x1".to_string()),
                rs1: RegOperand::Name("x2".to_string()),
                rs2: RegOperand::Name("x3".to_string()),
            })
        );
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        assert_eq!(parse("ADDI t0 zero 1"), parse("addi t0 zero 1"));
    }

    #[test]
    fn load_accepts_both_offset_syntaxes() {
        let flat = parse("lw t3, sp, 8");
        let sugar = parse("lw t3, 8(sp)");
        match (&flat, &sugar) {
            (
                Item::Inst(Inst::I { rs1: a, imm: ia, .. }),
                Item::Inst(Inst::I { rs1: b, imm: ib, .. }),
            ) => {
                assert_eq!(a, b);
                assert_eq!(ia, ib);
            }
            other => panic!("expected loads, got {other:?}"),
        }
    }

    #[test]
    fn store_operand_order_matches_reference() {
        // sb a0 t3 0  <=>  sb t3, 0(a0)
        let flat = parse("sb a0 t3 0");
        let sugar = parse("sb t3, 0(a0)");
        assert_eq!(flat, sugar);
        match flat {
            Item::Inst(Inst::S { rs1, rs2, .. }) => {
                assert_eq!(rs1, RegOperand::Name("a0".to_string()));
                assert_eq!(rs2, RegOperand::Name("t3".to_string()));
            }
            other => panic!("expected store, got {other:?}"),
        }
    }

    #[test]
    fn jal_with_one_operand_is_a_pseudo() {
        assert!(matches!(
            parse("jal 16"),
            Item::Pseudo(Pseudo::Jal { target: Target::Expr(Expr::Int(16)) })
        ));
        assert!(matches!(
            parse("jal main"),
            Item::Pseudo(Pseudo::Jal { target: Target::Label(_) })
        ));
        assert!(matches!(
            parse("jal zero, end"),
            Item::Inst(Inst::J { .. })
        ));
    }

    #[test]
    fn jalr_with_one_operand_is_a_pseudo() {
        assert!(matches!(parse("jalr t0"), Item::Pseudo(Pseudo::Jalr { .. })));
        assert!(matches!(parse("jalr x0, x1, 0"), Item::Inst(Inst::I { .. })));
        assert!(matches!(parse("jalr x0, 0(x1)"), Item::Inst(Inst::I { .. })));
    }

    #[test]
    fn branch_targets_are_labels_or_literal_offsets() {
        assert!(matches!(
            parse("beq t0 zero main"),
            Item::Inst(Inst::B { target: Target::Label(_), .. })
        ));
        assert!(matches!(
            parse("beqz t0 16"),
            Item::Pseudo(Pseudo::Beqz { target: Target::Expr(Expr::Int(16)), .. })
        ));
    }

    #[test]
    fn fence_defaults_and_masks() {
        assert_eq!(
            parse("fence"),
            Item::Inst(Inst::Fence { pred: 0b1111, succ: 0b1111 })
        );
        assert_eq!(
            parse("fence 0b1111 0b1111"),
            Item::Inst(Inst::Fence { pred: 0b1111, succ: 0b1111 })
        );
        assert_eq!(
            parse("fence rw, w"),
            Item::Inst(Inst::Fence { pred: 0b0011, succ: 0b0001 })
        );
        assert!(parse_err("fence xyz abc").message().contains("iorw"));
    }

    #[test]
    fn atomics_take_optional_aq_rl() {
        assert_eq!(
            parse("sc.w zero zero zero 1 0"),
            Item::Inst(Inst::Amo {
                name: "sc.w".to_string(),
                rd: RegOperand::Name("zero".to_string()),
                rs1: RegOperand::Name("zero".to_string()),
                rs2: Some(RegOperand::Name("zero".to_string())),
                aq: true,
                rl: false,
            })
        );
        assert!(matches!(
            parse("lr.w zero zero"),
            Item::Inst(Inst::Amo { rs2: None, aq: false, rl: false, .. })
        ));
    }

    #[test]
    fn data_directives_take_value_lists() {
        match parse("bytes 1 2 0x03 0b100") {
            Item::Bytes { values } => assert_eq!(values.len(), 4),
            other => panic!("expected bytes, got {other:?}"),
        }
        match parse("bytes -1 0xff") {
            Item::Bytes { values } => {
                assert!(matches!(values[0], Expr::Unary(UnaryOp::Minus, _)));
                assert_eq!(values[1], Expr::Int(0xff));
            }
            other => panic!("expected bytes, got {other:?}"),
        }
        assert!(parse_err("bytes").message().contains("at least one"));
    }

    #[test]
    fn float_directives_take_float_lists() {
        match parse("floats 3.141 -2.345") {
            Item::Floats { values } => {
                assert_eq!(values.len(), 2);
                assert!(values[1] < 0.0);
            }
            other => panic!("expected floats, got {other:?}"),
        }
    }

    #[test]
    fn pack_formats_parse() {
        match parse("pack <I 0x01020304") {
            Item::Pack { endian, fmt, value } => {
                assert_eq!(endian, Endian::Little);
                assert_eq!(fmt, PackFmt::Int { width: 4, sign: Sign::Unsigned });
                assert_eq!(value, PackValue::Expr(Expr::Int(0x01020304)));
            }
            other => panic!("expected pack, got {other:?}"),
        }
        match parse("pack >H 0xffff") {
            Item::Pack { endian, .. } => assert_eq!(endian, Endian::Big),
            other => panic!("expected pack, got {other:?}"),
        }
        match parse("pack <f 3.14159") {
            Item::Pack { fmt, value, .. } => {
                assert_eq!(fmt, PackFmt::Float { width: 4 });
                assert!(matches!(value, PackValue::Float(_)));
            }
            other => panic!("expected pack, got {other:?}"),
        }
        assert!(parse_err("pack <Z 1").message().contains("Unsupported"));
        assert!(parse_err("pack I 1").message().contains("start with"));
    }

    #[test]
    fn string_and_error_capture_payloads() {
        assert_eq!(
            parse("string hello\\nworld"),
            Item::Str { data: b"hello\\nworld".to_vec() }
        );
        assert_eq!(
            parse("error out of space"),
            Item::ErrorDirective { message: "out of space".to_string() }
        );
    }

    #[test]
    fn explicit_compressed_mnemonics_parse() {
        assert!(matches!(parse("c.nop"), Item::Inst(Inst::C(CInst::Nop))));
        assert!(matches!(
            parse("c.addi x1 1"),
            Item::Inst(Inst::C(CInst::Addi { .. }))
        ));
        assert!(matches!(
            parse("c.lwsp x1 0"),
            Item::Inst(Inst::C(CInst::Lwsp { .. }))
        ));
        assert!(matches!(
            parse("c.beqz x8 0"),
            Item::Inst(Inst::C(CInst::Beqz { .. }))
        ));
    }

    #[test]
    fn unknown_mnemonics_are_syntax_errors() {
        let diag = parse_err("frobnicate x0");
        assert!(diag.message().contains("Unknown mnemonic"));
        assert_eq!(diag.kind(), AsmErrorKind::Syntax);
    }

    #[test]
    fn wrong_operand_shapes_are_form_errors() {
        assert_eq!(parse_err("add x1, x2").kind(), AsmErrorKind::Form);
        assert!(parse_err("add x1, x2, x3, x4").message().contains("Unexpected"));
    }
}

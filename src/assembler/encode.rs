// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Final encoding pass: laid-out items to bytes.
//!
//! Every immediate is re-evaluated against the final label table, so the
//! range checks here are the authoritative ones. Instruction words are
//! always little-endian; data directives honor the configured endianness.

use std::collections::HashMap;

use crate::compressed;
use crate::instructions::{self, EncodeError, EncodeErrorKind};

use super::error::{AsmError, AsmErrorKind, Diagnostic, Origin};
use super::expr::{self, EvalScope};
use super::layout::Layout;
use super::parser::{
    resolve_reg, CInst, Endian, Inst, Item, PackFmt, PackValue, RegOperand, Sign, Target,
};
use super::Config;

/// Encode the laid-out program into its flat byte image.
pub fn emit(
    layout: &Layout,
    consts: &HashMap<String, i64>,
    config: &Config,
) -> Result<Vec<u8>, Vec<Diagnostic>> {
    let mut out: Vec<u8> = Vec::new();
    let mut diagnostics = Vec::new();

    for laid in &layout.items {
        let origin = &laid.item.origin;
        let scope = EvalScope::at(consts, &layout.labels, laid.offset);
        match &laid.item.item {
            Item::Constant { .. } | Item::Label { .. } => {}
            Item::ErrorDirective { message } => {
                diagnostics.push(
                    Diagnostic::error(AsmError::new(AsmErrorKind::Abort, message, None))
                        .with_origin(origin.clone()),
                );
                return Err(diagnostics);
            }
            Item::Inst(inst) => match encode_inst(inst, consts, &scope) {
                Ok(Encoded::Word(code)) => out.extend_from_slice(&code.to_le_bytes()),
                Ok(Encoded::Half(code)) => out.extend_from_slice(&code.to_le_bytes()),
                Err(err) => diagnostics.push(instruction_diagnostic(err, origin)),
            },
            Item::Pseudo(_) => {
                diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Internal,
                        "Pseudo-instruction reached the encoder",
                        None,
                    ))
                    .with_origin(origin.clone()),
                );
            }
            Item::Bytes { values } => {
                emit_list(&mut out, &mut diagnostics, values, 1, config.endian, origin, consts, &layout.labels, laid.offset);
            }
            Item::Shorts { values } => {
                emit_list(&mut out, &mut diagnostics, values, 2, config.endian, origin, consts, &layout.labels, laid.offset);
            }
            Item::Ints { values } | Item::Longs { values } => {
                emit_list(&mut out, &mut diagnostics, values, 4, config.endian, origin, consts, &layout.labels, laid.offset);
            }
            Item::LongLongs { values } => {
                emit_list(&mut out, &mut diagnostics, values, 8, config.endian, origin, consts, &layout.labels, laid.offset);
            }
            Item::Floats { values } => {
                for value in values {
                    emit_float(&mut out, *value, 4, config.endian);
                }
            }
            Item::Doubles { values } => {
                for value in values {
                    emit_float(&mut out, *value, 8, config.endian);
                }
            }
            Item::Str { data } | Item::IncludeBytes { data } => out.extend_from_slice(data),
            Item::Pack { endian, fmt, value } => {
                if let Err(err) = emit_pack(&mut out, *endian, *fmt, value, &scope) {
                    diagnostics.push(instruction_diagnostic(err, origin));
                }
            }
            Item::Align { .. } => {
                out.resize(out.len() + laid.size as usize, 0);
            }
        }
    }

    if diagnostics.is_empty() {
        Ok(out)
    } else {
        Err(diagnostics)
    }
}

enum Encoded {
    Word(u32),
    Half(u16),
}

fn instruction_diagnostic(err: EncodeError, origin: &Origin) -> Diagnostic {
    let kind = match err.kind {
        EncodeErrorKind::Form => AsmErrorKind::Form,
        EncodeErrorKind::Range => AsmErrorKind::Range,
        EncodeErrorKind::Name => AsmErrorKind::Name,
    };
    Diagnostic::error(AsmError::new(kind, &err.message, None)).with_origin(origin.clone())
}

fn eval_error(err: expr::EvalError) -> EncodeError {
    if err.missing_symbol.is_some() {
        EncodeError::name(err.message)
    } else {
        EncodeError::form(err.message)
    }
}

fn encode_inst(
    inst: &Inst,
    consts: &HashMap<String, i64>,
    scope: &EvalScope<'_>,
) -> Result<Encoded, EncodeError> {
    let reg = |op: &RegOperand| resolve_reg(op, consts).map_err(EncodeError::form);
    let value = |expr: &expr::Expr| expr::eval(expr, scope).map_err(eval_error);

    let code = match inst {
        Inst::R { name, rd, rs1, rs2 } => {
            let spec = spec_for(name)?;
            instructions::encode_r(spec, reg(rd)?, reg(rs1)?, reg(rs2)?)
        }
        Inst::Shift {
            name,
            rd,
            rs1,
            shamt,
        } => {
            let spec = spec_for(name)?;
            instructions::encode_shift(spec, reg(rd)?, reg(rs1)?, value(shamt)?)?
        }
        Inst::I { name, rd, rs1, imm } => {
            let spec = spec_for(name)?;
            instructions::encode_i(spec, reg(rd)?, reg(rs1)?, value(imm)?)?
        }
        Inst::S {
            name,
            rs1,
            rs2,
            imm,
        } => {
            let spec = spec_for(name)?;
            instructions::encode_s(spec, reg(rs1)?, reg(rs2)?, value(imm)?)?
        }
        Inst::B {
            name,
            rs1,
            rs2,
            target,
        } => {
            let spec = spec_for(name)?;
            let dist = target_value(target, scope)?;
            instructions::encode_b(spec, reg(rs1)?, reg(rs2)?, dist)?
        }
        Inst::U { name, rd, imm } => {
            let spec = spec_for(name)?;
            instructions::encode_u(spec, reg(rd)?, value(imm)?)?
        }
        Inst::J { name, rd, target } => {
            let spec = spec_for(name)?;
            let dist = target_value(target, scope)?;
            instructions::encode_j(spec, reg(rd)?, dist)?
        }
        Inst::Fence { pred, succ } => instructions::encode_fence(*pred, *succ),
        Inst::FenceI => instructions::FENCE_I,
        Inst::Ecall => instructions::ECALL,
        Inst::Ebreak => instructions::EBREAK,
        Inst::Amo {
            name,
            rd,
            rs1,
            rs2,
            aq,
            rl,
        } => {
            let spec = spec_for(name)?;
            let rs2 = match rs2 {
                Some(rs2) => reg(rs2)?,
                None => 0,
            };
            instructions::encode_amo(spec, reg(rd)?, reg(rs1)?, rs2, *aq, *rl)
        }
        Inst::C(cinst) => return encode_cinst(cinst, consts, scope).map(Encoded::Half),
    };
    Ok(Encoded::Word(code))
}

fn encode_cinst(
    inst: &CInst,
    consts: &HashMap<String, i64>,
    scope: &EvalScope<'_>,
) -> Result<u16, EncodeError> {
    let reg = |op: &RegOperand| resolve_reg(op, consts).map_err(EncodeError::form);
    let value = |expr: &expr::Expr| expr::eval(expr, scope).map_err(eval_error);

    match inst {
        CInst::Addi4spn { rd, imm } => compressed::c_addi4spn(reg(rd)?, value(imm)?),
        CInst::Lw { rd, rs1, imm } => compressed::c_lw(reg(rd)?, reg(rs1)?, value(imm)?),
        CInst::Sw { rs1, rs2, imm } => compressed::c_sw(reg(rs1)?, reg(rs2)?, value(imm)?),
        CInst::Nop => Ok(compressed::c_nop()),
        CInst::Addi { rd, imm } => compressed::c_addi(reg(rd)?, value(imm)?),
        CInst::Jal { target } => compressed::c_jal(target_value(target, scope)?),
        CInst::Li { rd, imm } => compressed::c_li(reg(rd)?, value(imm)?),
        CInst::Addi16sp { imm } => compressed::c_addi16sp(value(imm)?),
        CInst::Lui { rd, imm } => compressed::c_lui(reg(rd)?, value(imm)?),
        CInst::Srli { rd, shamt } => compressed::c_srli(reg(rd)?, value(shamt)?),
        CInst::Srai { rd, shamt } => compressed::c_srai(reg(rd)?, value(shamt)?),
        CInst::Andi { rd, imm } => compressed::c_andi(reg(rd)?, value(imm)?),
        CInst::Sub { rd, rs2 } => compressed::c_sub(reg(rd)?, reg(rs2)?),
        CInst::Xor { rd, rs2 } => compressed::c_xor(reg(rd)?, reg(rs2)?),
        CInst::Or { rd, rs2 } => compressed::c_or(reg(rd)?, reg(rs2)?),
        CInst::And { rd, rs2 } => compressed::c_and(reg(rd)?, reg(rs2)?),
        CInst::J { target } => compressed::c_j(target_value(target, scope)?),
        CInst::Beqz { rs1, target } => {
            compressed::c_beqz(reg(rs1)?, target_value(target, scope)?)
        }
        CInst::Bnez { rs1, target } => {
            compressed::c_bnez(reg(rs1)?, target_value(target, scope)?)
        }
        CInst::Slli { rd, shamt } => compressed::c_slli(reg(rd)?, value(shamt)?),
        CInst::Lwsp { rd, imm } => compressed::c_lwsp(reg(rd)?, value(imm)?),
        CInst::Jr { rs1 } => compressed::c_jr(reg(rs1)?),
        CInst::Jalr { rs1 } => compressed::c_jalr(reg(rs1)?),
        CInst::Mv { rd, rs2 } => compressed::c_mv(reg(rd)?, reg(rs2)?),
        CInst::Add { rd, rs2 } => compressed::c_add(reg(rd)?, reg(rs2)?),
        CInst::Ebreak => Ok(compressed::c_ebreak()),
        CInst::Swsp { rs2, imm } => compressed::c_swsp(reg(rs2)?, value(imm)?),
    }
}

fn spec_for(name: &str) -> Result<&'static instructions::InstSpec, EncodeError> {
    instructions::instruction_spec(name)
        .ok_or_else(|| EncodeError::form(format!("Unknown mnemonic: {name}")))
}

/// A bare label target is PC-relative; any other expression is a literal
/// byte offset.
fn target_value(target: &Target, scope: &EvalScope<'_>) -> Result<i64, EncodeError> {
    match target {
        Target::Label(name) => {
            let labels = scope
                .labels
                .ok_or_else(|| EncodeError::form("Label offsets are not available here"))?;
            let position = scope
                .position
                .ok_or_else(|| EncodeError::form("Current position is not available here"))?;
            match labels.get(name) {
                Some(offset) => Ok(*offset as i64 - position as i64),
                None => match scope.consts.get(name) {
                    Some(value) => Ok(*value - position as i64),
                    None => Err(EncodeError::name(format!("Undefined label: {name}"))),
                },
            }
        }
        Target::Expr(expr) => {
            expr::eval(expr, scope).map_err(eval_error)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_list(
    out: &mut Vec<u8>,
    diagnostics: &mut Vec<Diagnostic>,
    values: &[expr::Expr],
    width: u8,
    endian: Endian,
    origin: &Origin,
    consts: &HashMap<String, i64>,
    labels: &HashMap<String, u32>,
    item_offset: u32,
) {
    for (ix, value_expr) in values.iter().enumerate() {
        let position = item_offset.wrapping_add(ix as u32 * width as u32);
        let scope = EvalScope::at(consts, labels, position);
        let value = match expr::eval(value_expr, &scope) {
            Ok(value) => value,
            Err(err) => {
                diagnostics.push(instruction_diagnostic(eval_error(err), origin));
                continue;
            }
        };
        if let Err(message) = check_int_range(value, width, Sign::Infer) {
            diagnostics.push(
                Diagnostic::error(AsmError::new(AsmErrorKind::Range, &message, None))
                    .with_origin(origin.clone()),
            );
            continue;
        }
        emit_int(out, value, width, endian);
    }
}

fn emit_pack(
    out: &mut Vec<u8>,
    endian: Endian,
    fmt: PackFmt,
    value: &PackValue,
    scope: &EvalScope<'_>,
) -> Result<(), EncodeError> {
    match fmt {
        PackFmt::Int { width, sign } => {
            let value = match value {
                PackValue::Expr(expr) => {
                    expr::eval(expr, scope).map_err(eval_error)?
                }
                PackValue::Float(_) => {
                    return Err(EncodeError::form(
                        "Float value requires an f or d pack format",
                    ))
                }
            };
            check_int_range(value, width, sign).map_err(EncodeError::range)?;
            emit_int(out, value, width, endian);
            Ok(())
        }
        PackFmt::Float { width } => {
            let value = match value {
                PackValue::Float(value) => *value,
                PackValue::Expr(expr) => {
                    expr::eval(expr, scope).map_err(eval_error)? as f64
                }
            };
            emit_float(out, value, width, endian);
            Ok(())
        }
    }
}

fn check_int_range(value: i64, width: u8, sign: Sign) -> Result<(), String> {
    if width == 8 {
        // Any 64-bit pattern is representable at this width.
        return Ok(());
    }
    let bits = width as u32 * 8;
    let (min, max) = match sign {
        Sign::Signed => (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1),
        Sign::Unsigned => (0, (1i64 << bits) - 1),
        Sign::Infer => (-(1i64 << (bits - 1)), (1i64 << bits) - 1),
    };
    if value < min || value > max {
        return Err(format!(
            "{bits}-bit value must be between {min} and {max}: {value}"
        ));
    }
    Ok(())
}

fn emit_int(out: &mut Vec<u8>, value: i64, width: u8, endian: Endian) {
    let bytes = (value as u64).to_le_bytes();
    match endian {
        Endian::Little => out.extend_from_slice(&bytes[..width as usize]),
        Endian::Big => out.extend(bytes[..width as usize].iter().rev()),
    }
}

fn emit_float(out: &mut Vec<u8>, value: f64, width: u8, endian: Endian) {
    if width == 4 {
        match endian {
            Endian::Little => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Endian::Big => out.extend_from_slice(&(value as f32).to_be_bytes()),
        }
    } else {
        match endian {
            Endian::Little => out.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_range_checks_follow_signedness() {
        assert!(check_int_range(255, 1, Sign::Infer).is_ok());
        assert!(check_int_range(-128, 1, Sign::Infer).is_ok());
        assert!(check_int_range(256, 1, Sign::Infer).is_err());
        assert!(check_int_range(-129, 1, Sign::Infer).is_err());
        assert!(check_int_range(255, 1, Sign::Signed).is_err());
        assert!(check_int_range(-1, 1, Sign::Unsigned).is_err());
        assert!(check_int_range(-1, 8, Sign::Unsigned).is_ok());
    }

    #[test]
    fn endianness_orders_bytes() {
        let mut little = Vec::new();
        emit_int(&mut little, 0x01020304, 4, Endian::Little);
        assert_eq!(little, vec![0x04, 0x03, 0x02, 0x01]);

        let mut big = Vec::new();
        emit_int(&mut big, 0x01020304, 4, Endian::Big);
        assert_eq!(big, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn negative_values_emit_twos_complement() {
        let mut out = Vec::new();
        emit_int(&mut out, -1, 2, Endian::Little);
        assert_eq!(out, vec![0xff, 0xff]);
    }

    #[test]
    fn floats_emit_ieee754() {
        let mut out = Vec::new();
        emit_float(&mut out, std::f64::consts::PI, 4, Endian::Little);
        assert_eq!(out, (std::f64::consts::PI as f32).to_le_bytes().to_vec());
    }
}

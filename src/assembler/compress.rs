// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! C-extension compression pass.
//!
//! After layout converges, eligible 32-bit instructions are replaced by
//! their 16-bit equivalents in a second fixed point: each sweep replaces
//! everything eligible at the current offsets, then offsets are
//! recomputed. Replacements only shrink distances, so a PC-relative
//! immediate that fits when chosen still fits after later sweeps; chosen
//! replacements are never reverted.

use std::collections::HashMap;

use super::expr::{self, Expr, EvalScope};
use super::layout::{self, Layout};
use super::parser::{resolve_reg, CInst, Inst, Item, RegOperand, Target};

/// Run the compression fixed point. Offsets and labels are final on
/// return.
pub fn run(layout: &mut Layout, consts: &HashMap<String, i64>) {
    loop {
        let mut changed = false;
        for idx in 0..layout.items.len() {
            let offset = layout.items[idx].offset;
            let replacement = match &layout.items[idx].item.item {
                Item::Inst(inst) => match inst {
                    Inst::C(_) => None,
                    _ => try_compress(inst, offset, consts, &layout.labels),
                },
                _ => None,
            };
            if let Some(cinst) = replacement {
                layout.items[idx].item.item = Item::Inst(Inst::C(cinst));
                layout.items[idx].size = 2;
                changed = true;
            }
        }
        // Label movement can disturb a li whose value had zero low bits.
        if layout::widen_pseudos(layout, consts) {
            changed = true;
        }
        if !changed {
            break;
        }
        if layout::place(layout).is_err() {
            break;
        }
    }
}

fn try_compress(
    inst: &Inst,
    offset: u32,
    consts: &HashMap<String, i64>,
    labels: &HashMap<String, u32>,
) -> Option<CInst> {
    let scope = EvalScope::at(consts, labels, offset);
    match inst {
        Inst::I { name, rd, rs1, imm } => {
            let rd = resolve_reg(rd, consts).ok()?;
            let rs1 = resolve_reg(rs1, consts).ok()?;
            let value = expr::eval(imm, &scope).ok()?;
            match name.as_str() {
                "addi" => compress_addi(rd, rs1, value, imm),
                "andi" if rd == rs1 && (8..=15).contains(&rd) && fits6(value) => {
                    Some(CInst::Andi {
                        rd: RegOperand::Num(rd as i64),
                        imm: imm.clone(),
                    })
                }
                "jalr" if value == 0 && rs1 != 0 => match rd {
                    0 => Some(CInst::Jr {
                        rs1: RegOperand::Num(rs1 as i64),
                    }),
                    1 => Some(CInst::Jalr {
                        rs1: RegOperand::Num(rs1 as i64),
                    }),
                    _ => None,
                },
                "lw" => {
                    if rs1 == 2 && rd != 0 && (0..=252).contains(&value) && value % 4 == 0 {
                        Some(CInst::Lwsp {
                            rd: RegOperand::Num(rd as i64),
                            imm: imm.clone(),
                        })
                    } else if (8..=15).contains(&rd)
                        && (8..=15).contains(&rs1)
                        && (0..=124).contains(&value)
                        && value % 4 == 0
                    {
                        Some(CInst::Lw {
                            rd: RegOperand::Num(rd as i64),
                            rs1: RegOperand::Num(rs1 as i64),
                            imm: imm.clone(),
                        })
                    } else {
                        None
                    }
                }
                _ => None,
            }
        }
        Inst::R { name, rd, rs1, rs2 } => {
            let rd = resolve_reg(rd, consts).ok()?;
            let rs1 = resolve_reg(rs1, consts).ok()?;
            let rs2 = resolve_reg(rs2, consts).ok()?;
            match name.as_str() {
                "add" => {
                    if rs1 == 0 && rd != 0 && rs2 != 0 {
                        Some(CInst::Mv {
                            rd: RegOperand::Num(rd as i64),
                            rs2: RegOperand::Num(rs2 as i64),
                        })
                    } else if rs2 == 0 && rd != 0 && rs1 != 0 {
                        Some(CInst::Mv {
                            rd: RegOperand::Num(rd as i64),
                            rs2: RegOperand::Num(rs1 as i64),
                        })
                    } else if rd == rs1 && rd != 0 && rs2 != 0 {
                        Some(CInst::Add {
                            rd: RegOperand::Num(rd as i64),
                            rs2: RegOperand::Num(rs2 as i64),
                        })
                    } else if rd == rs2 && rd != 0 && rs1 != 0 {
                        Some(CInst::Add {
                            rd: RegOperand::Num(rd as i64),
                            rs2: RegOperand::Num(rs1 as i64),
                        })
                    } else {
                        None
                    }
                }
                "sub" | "xor" | "or" | "and" => {
                    if rd == rs1 && (8..=15).contains(&rd) && (8..=15).contains(&rs2) {
                        let rd = RegOperand::Num(rd as i64);
                        let rs2 = RegOperand::Num(rs2 as i64);
                        Some(match name.as_str() {
                            "sub" => CInst::Sub { rd, rs2 },
                            "xor" => CInst::Xor { rd, rs2 },
                            "or" => CInst::Or { rd, rs2 },
                            _ => CInst::And { rd, rs2 },
                        })
                    } else {
                        None
                    }
                }
                _ => None,
            }
        }
        Inst::Shift {
            name,
            rd,
            rs1,
            shamt,
        } => {
            let rd = resolve_reg(rd, consts).ok()?;
            let rs1 = resolve_reg(rs1, consts).ok()?;
            let value = expr::eval(shamt, &scope).ok()?;
            if rd != rs1 || !(1..=31).contains(&value) {
                return None;
            }
            match name.as_str() {
                "slli" if rd != 0 => Some(CInst::Slli {
                    rd: RegOperand::Num(rd as i64),
                    shamt: shamt.clone(),
                }),
                "srli" if (8..=15).contains(&rd) => Some(CInst::Srli {
                    rd: RegOperand::Num(rd as i64),
                    shamt: shamt.clone(),
                }),
                "srai" if (8..=15).contains(&rd) => Some(CInst::Srai {
                    rd: RegOperand::Num(rd as i64),
                    shamt: shamt.clone(),
                }),
                _ => None,
            }
        }
        Inst::U { name, rd, imm } => {
            let rd = resolve_reg(rd, consts).ok()?;
            let value = expr::eval(imm, &scope).ok()?;
            if name == "lui" && rd != 0 && rd != 2 && value != 0 && fits6(value) {
                Some(CInst::Lui {
                    rd: RegOperand::Num(rd as i64),
                    imm: imm.clone(),
                })
            } else {
                None
            }
        }
        Inst::J { name, rd, target } => {
            if name != "jal" {
                return None;
            }
            let rd = resolve_reg(rd, consts).ok()?;
            let dist = target_distance(target, &scope)?;
            if !(-2048..=2046).contains(&dist) || dist % 2 != 0 {
                return None;
            }
            match rd {
                0 => Some(CInst::J {
                    target: target.clone(),
                }),
                1 => Some(CInst::Jal {
                    target: target.clone(),
                }),
                _ => None,
            }
        }
        Inst::B {
            name,
            rs1,
            rs2,
            target,
        } => {
            if name != "beq" && name != "bne" {
                return None;
            }
            let rs1 = resolve_reg(rs1, consts).ok()?;
            let rs2 = resolve_reg(rs2, consts).ok()?;
            let reg = match (rs1, rs2) {
                (reg, 0) => reg,
                (0, reg) => reg,
                _ => return None,
            };
            if !(8..=15).contains(&reg) {
                return None;
            }
            let dist = target_distance(target, &scope)?;
            if !(-256..=254).contains(&dist) || dist % 2 != 0 {
                return None;
            }
            let rs1 = RegOperand::Num(reg as i64);
            Some(if name == "beq" {
                CInst::Beqz {
                    rs1,
                    target: target.clone(),
                }
            } else {
                CInst::Bnez {
                    rs1,
                    target: target.clone(),
                }
            })
        }
        Inst::S {
            name,
            rs1,
            rs2,
            imm,
        } => {
            if name != "sw" {
                return None;
            }
            let rs1 = resolve_reg(rs1, consts).ok()?;
            let rs2 = resolve_reg(rs2, consts).ok()?;
            let value = expr::eval(imm, &scope).ok()?;
            if rs1 == 2 && (0..=252).contains(&value) && value % 4 == 0 {
                Some(CInst::Swsp {
                    rs2: RegOperand::Num(rs2 as i64),
                    imm: imm.clone(),
                })
            } else if (8..=15).contains(&rs1)
                && (8..=15).contains(&rs2)
                && (0..=124).contains(&value)
                && value % 4 == 0
            {
                Some(CInst::Sw {
                    rs1: RegOperand::Num(rs1 as i64),
                    rs2: RegOperand::Num(rs2 as i64),
                    imm: imm.clone(),
                })
            } else {
                None
            }
        }
        Inst::Ebreak => Some(CInst::Ebreak),
        _ => None,
    }
}

fn compress_addi(rd: u8, rs1: u8, value: i64, imm: &Expr) -> Option<CInst> {
    if rd == 0 && rs1 == 0 && value == 0 {
        return Some(CInst::Nop);
    }
    if rs1 == 0 && rd != 0 && fits6(value) {
        return Some(CInst::Li {
            rd: RegOperand::Num(rd as i64),
            imm: imm.clone(),
        });
    }
    if rd == rs1 && rd != 0 && value != 0 && fits6(value) {
        return Some(CInst::Addi {
            rd: RegOperand::Num(rd as i64),
            imm: imm.clone(),
        });
    }
    if rd == 2 && rs1 == 2 && value != 0 && (-512..=496).contains(&value) && value % 16 == 0 {
        return Some(CInst::Addi16sp { imm: imm.clone() });
    }
    if rs1 == 2
        && (8..=15).contains(&rd)
        && (4..=1020).contains(&value)
        && value % 4 == 0
    {
        return Some(CInst::Addi4spn {
            rd: RegOperand::Num(rd as i64),
            imm: imm.clone(),
        });
    }
    None
}

fn fits6(value: i64) -> bool {
    (-32..=31).contains(&value)
}

fn target_distance(target: &Target, scope: &EvalScope<'_>) -> Option<i64> {
    match target {
        Target::Label(name) => {
            let labels = scope.labels?;
            let position = scope.position?;
            let offset = labels.get(name)?;
            Some(*offset as i64 - position as i64)
        }
        Target::Expr(expr) => expr::eval(expr, scope).ok(),
    }
}

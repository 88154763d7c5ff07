// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pseudo-instruction expansion.
//!
//! Fixed-shape pseudos rewrite into their canonical instructions before
//! layout. `li`, `call`, and `tail` keep their pseudo form through the
//! layout and compression fixed points (their width depends on resolved
//! values and label distances) and are expanded here afterwards, once
//! every offset is final.

use std::collections::HashMap;

use super::error::{AsmError, AsmErrorKind, Diagnostic};
use super::expr::{self, Expr, EvalScope};
use super::layout::{LaidItem, Layout};
use super::parser::{Inst, Item, PackFmt, PackValue, Pseudo, RegOperand, Sign, SourceItem, Target};
use super::Config;

fn reg(num: i64) -> RegOperand {
    RegOperand::Num(num)
}

fn inst(inst: Inst) -> Item {
    Item::Inst(inst)
}

/// Rewrite fixed-shape pseudo-instructions and shorthand data directives.
pub fn expand(items: Vec<SourceItem>, config: &Config) -> Vec<SourceItem> {
    items
        .into_iter()
        .map(|source_item| {
            let SourceItem { item, origin } = source_item;
            let item = match item {
                Item::Pseudo(pseudo) => expand_one(pseudo, config),
                other => other,
            };
            SourceItem { item, origin }
        })
        .collect()
}

fn expand_one(pseudo: Pseudo, config: &Config) -> Item {
    match pseudo {
        Pseudo::Nop => inst(Inst::I {
            name: "addi".to_string(),
            rd: reg(0),
            rs1: reg(0),
            imm: Expr::Int(0),
        }),
        Pseudo::Mv { rd, rs } => inst(Inst::I {
            name: "addi".to_string(),
            rd,
            rs1: rs,
            imm: Expr::Int(0),
        }),
        Pseudo::Not { rd, rs } => inst(Inst::I {
            name: "xori".to_string(),
            rd,
            rs1: rs,
            imm: Expr::Int(-1),
        }),
        Pseudo::Neg { rd, rs } => inst(Inst::R {
            name: "sub".to_string(),
            rd,
            rs1: reg(0),
            rs2: rs,
        }),
        Pseudo::Seqz { rd, rs } => inst(Inst::I {
            name: "sltiu".to_string(),
            rd,
            rs1: rs,
            imm: Expr::Int(1),
        }),
        Pseudo::Snez { rd, rs } => inst(Inst::R {
            name: "sltu".to_string(),
            rd,
            rs1: reg(0),
            rs2: rs,
        }),
        Pseudo::Sltz { rd, rs } => inst(Inst::R {
            name: "slt".to_string(),
            rd,
            rs1: rs,
            rs2: reg(0),
        }),
        Pseudo::Sgtz { rd, rs } => inst(Inst::R {
            name: "slt".to_string(),
            rd,
            rs1: reg(0),
            rs2: rs,
        }),
        Pseudo::Beqz { rs, target } => branch("beq", rs, reg(0), target),
        Pseudo::Bnez { rs, target } => branch("bne", rs, reg(0), target),
        Pseudo::Blez { rs, target } => branch("bge", reg(0), rs, target),
        Pseudo::Bgez { rs, target } => branch("bge", rs, reg(0), target),
        Pseudo::Bltz { rs, target } => branch("blt", rs, reg(0), target),
        Pseudo::Bgtz { rs, target } => branch("blt", reg(0), rs, target),
        Pseudo::Bgt { rs, rt, target } => branch("blt", rt, rs, target),
        Pseudo::Ble { rs, rt, target } => branch("bge", rt, rs, target),
        Pseudo::Bgtu { rs, rt, target } => branch("bltu", rt, rs, target),
        Pseudo::Bleu { rs, rt, target } => branch("bgeu", rt, rs, target),
        Pseudo::J { target } => inst(Inst::J {
            name: "jal".to_string(),
            rd: reg(0),
            target,
        }),
        Pseudo::Jal { target } => inst(Inst::J {
            name: "jal".to_string(),
            rd: reg(1),
            target,
        }),
        Pseudo::Jr { rs } => inst(Inst::I {
            name: "jalr".to_string(),
            rd: reg(0),
            rs1: rs,
            imm: Expr::Int(0),
        }),
        Pseudo::Jalr { rs } => inst(Inst::I {
            name: "jalr".to_string(),
            rd: reg(1),
            rs1: rs,
            imm: Expr::Int(0),
        }),
        Pseudo::Ret => inst(Inst::I {
            name: "jalr".to_string(),
            rd: reg(0),
            rs1: reg(1),
            imm: Expr::Int(0),
        }),
        Pseudo::Db { expr } => shorthand_pack(config, 1, expr),
        Pseudo::Dh { expr } => shorthand_pack(config, 2, expr),
        Pseudo::Dw { expr } => shorthand_pack(config, 4, expr),
        Pseudo::Dd { expr } => shorthand_pack(config, 8, expr),
        // Variable-width pseudos survive until offsets are final.
        keep @ (Pseudo::Li { .. } | Pseudo::Call { .. } | Pseudo::Tail { .. }) => {
            Item::Pseudo(keep)
        }
    }
}

fn branch(name: &str, rs1: RegOperand, rs2: RegOperand, target: Target) -> Item {
    inst(Inst::B {
        name: name.to_string(),
        rs1,
        rs2,
        target,
    })
}

fn shorthand_pack(config: &Config, width: u8, expr: Expr) -> Item {
    Item::Pack {
        endian: config.endian,
        fmt: PackFmt::Int {
            width,
            sign: Sign::Infer,
        },
        value: PackValue::Expr(expr),
    }
}

/// Expand the remaining `li`/`call`/`tail` items against final offsets.
///
/// The two-instruction forms anchor both halves at the pseudo item's own
/// address, so the `%hi`/`%lo` pair reconstructs the exact value.
pub fn expand_final(
    layout: &mut Layout,
    consts: &HashMap<String, i64>,
) -> Result<(), Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    let mut items = Vec::with_capacity(layout.items.len());

    for laid in layout.items.drain(..) {
        let LaidItem {
            item: source_item,
            offset,
            size,
            align,
        } = laid;
        let pseudo = match source_item.item {
            Item::Pseudo(pseudo) => pseudo,
            other => {
                items.push(LaidItem {
                    item: SourceItem {
                        item: other,
                        origin: source_item.origin,
                    },
                    offset,
                    size,
                    align,
                });
                continue;
            }
        };
        let origin = source_item.origin;
        let scope = EvalScope::at(consts, &layout.labels, offset);
        match pseudo {
            Pseudo::Li { rd, imm } => {
                let value = match expr::eval(&imm, &scope) {
                    Ok(value) => value,
                    Err(err) => {
                        diagnostics.push(
                            Diagnostic::error(AsmError::new(
                                AsmErrorKind::Name,
                                &err.message,
                                None,
                            ))
                            .with_origin(origin),
                        );
                        continue;
                    }
                };
                if !(-0x8000_0000..=0xffff_ffff).contains(&value) {
                    diagnostics.push(
                        Diagnostic::error(AsmError::new(
                            AsmErrorKind::Range,
                            "li immediate does not fit in 32 bits",
                            Some(&value.to_string()),
                        ))
                        .with_origin(origin),
                    );
                    continue;
                }
                if size == 4 {
                    let item = if (-0x800..=0x7ff).contains(&value) {
                        Inst::I {
                            name: "addi".to_string(),
                            rd,
                            rs1: reg(0),
                            imm: Expr::Int(value),
                        }
                    } else {
                        Inst::U {
                            name: "lui".to_string(),
                            rd,
                            imm: Expr::Int(expr::relocate_hi(value)),
                        }
                    };
                    items.push(LaidItem {
                        item: SourceItem {
                            item: inst(item),
                            origin,
                        },
                        offset,
                        size: 4,
                        align,
                    });
                } else {
                    items.push(LaidItem {
                        item: SourceItem {
                            item: inst(Inst::U {
                                name: "lui".to_string(),
                                rd: rd.clone(),
                                imm: Expr::Int(expr::relocate_hi(value)),
                            }),
                            origin: origin.clone(),
                        },
                        offset,
                        size: 4,
                        align: None,
                    });
                    items.push(LaidItem {
                        item: SourceItem {
                            item: inst(Inst::I {
                                name: "addi".to_string(),
                                rd: rd.clone(),
                                rs1: rd,
                                imm: Expr::Int(expr::relocate_lo(value)),
                            }),
                            origin,
                        },
                        offset: offset + 4,
                        size: 4,
                        align: None,
                    });
                }
            }
            Pseudo::Call { target } => {
                expand_far_jump(
                    &mut items,
                    &mut diagnostics,
                    FarJump { link: 1, tmp: 1 },
                    target,
                    origin,
                    offset,
                    size,
                    align,
                    &scope,
                );
            }
            Pseudo::Tail { target } => {
                expand_far_jump(
                    &mut items,
                    &mut diagnostics,
                    FarJump { link: 0, tmp: 6 },
                    target,
                    origin,
                    offset,
                    size,
                    align,
                    &scope,
                );
            }
            _ => {
                diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Internal,
                        "Pseudo-instruction survived expansion",
                        None,
                    ))
                    .with_origin(origin),
                );
            }
        }
    }

    layout.items = items;
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

struct FarJump {
    link: i64,
    tmp: i64,
}

/// Distance from a pseudo item to its target, at final offsets.
pub(super) fn far_jump_distance(
    target: &Target,
    scope: &EvalScope<'_>,
) -> Result<i64, expr::EvalError> {
    match target {
        Target::Label(name) => {
            let labels = scope
                .labels
                .ok_or_else(|| expr::EvalError::new("Label offsets are not available here"))?;
            let position = scope
                .position
                .ok_or_else(|| expr::EvalError::new("Current position is not available here"))?;
            let offset = labels
                .get(name)
                .ok_or_else(|| expr::EvalError::new(format!("Undefined label: {name}")))?;
            Ok(*offset as i64 - position as i64)
        }
        Target::Expr(expr) => expr::eval(expr, scope),
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_far_jump(
    items: &mut Vec<LaidItem>,
    diagnostics: &mut Vec<Diagnostic>,
    far: FarJump,
    target: Target,
    origin: super::error::Origin,
    offset: u32,
    size: u32,
    align: Option<u64>,
    scope: &EvalScope<'_>,
) {
    let dist = match far_jump_distance(&target, scope) {
        Ok(dist) => dist,
        Err(err) => {
            diagnostics.push(
                Diagnostic::error(AsmError::new(AsmErrorKind::Name, &err.message, None))
                    .with_origin(origin),
            );
            return;
        }
    };
    if size == 4 {
        items.push(LaidItem {
            item: SourceItem {
                item: inst(Inst::J {
                    name: "jal".to_string(),
                    rd: reg(far.link),
                    target: Target::Expr(Expr::Int(dist)),
                }),
                origin,
            },
            offset,
            size: 4,
            align,
        });
    } else {
        items.push(LaidItem {
            item: SourceItem {
                item: inst(Inst::U {
                    name: "auipc".to_string(),
                    rd: reg(far.tmp),
                    imm: Expr::Int(expr::relocate_hi(dist)),
                }),
                origin: origin.clone(),
            },
            offset,
            size: 4,
            align: None,
        });
        items.push(LaidItem {
            item: SourceItem {
                item: inst(Inst::I {
                    name: "jalr".to_string(),
                    rd: reg(far.link),
                    rs1: reg(far.tmp),
                    imm: Expr::Int(expr::relocate_lo(dist)),
                }),
                origin,
            },
            offset: offset + 4,
            size: 4,
            align: None,
        });
    }
}

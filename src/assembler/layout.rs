// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Layout resolution.
//!
//! Assigns a byte offset to every item through a fixed-point iteration:
//! label offsets feed the sizes of the variable-width pseudos (`li`,
//! `call`, `tail`), whose sizes feed the offsets. Widening is monotone, so
//! the iteration converges in at most one pass per item.

use std::collections::{HashMap, HashSet};

use super::error::{AsmError, AsmErrorKind, Diagnostic};
use super::expr::{self, EvalScope};
use super::parser::{Item, Pseudo, SourceItem};
use super::pseudo;
use super::Config;

#[derive(Debug)]
pub struct LaidItem {
    pub item: SourceItem,
    pub offset: u32,
    pub size: u32,
    /// Evaluated alignment for `Item::Align` entries.
    pub align: Option<u64>,
}

#[derive(Debug)]
pub struct Layout {
    pub items: Vec<LaidItem>,
    pub labels: HashMap<String, u32>,
}

/// Run the layout fixed point over the expanded item list.
pub fn resolve(
    items: Vec<SourceItem>,
    consts: &HashMap<String, i64>,
    config: &Config,
) -> Result<Layout, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();

    let mut seen_labels: HashSet<&str> = HashSet::new();
    for item in &items {
        if let Item::Label { name } = &item.item {
            if !seen_labels.insert(name.as_str()) {
                diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Name,
                        "Duplicate label",
                        Some(name),
                    ))
                    .with_origin(item.origin.clone()),
                );
            }
        }
    }

    let mut laid_items = Vec::with_capacity(items.len());
    for source_item in items {
        let align = match &source_item.item {
            Item::Align { expr } => {
                match expr::eval(expr, &EvalScope::constants(consts)) {
                    Ok(n) if n >= 1 && n <= 0x8000_0000 && (n & (n - 1)) == 0 => Some(n as u64),
                    Ok(n) => {
                        diagnostics.push(
                            Diagnostic::error(AsmError::new(
                                AsmErrorKind::Alignment,
                                "Alignment must be a positive power of two",
                                Some(&n.to_string()),
                            ))
                            .with_origin(source_item.origin.clone()),
                        );
                        None
                    }
                    Err(err) => {
                        diagnostics.push(
                            Diagnostic::error(AsmError::new(
                                AsmErrorKind::Name,
                                &err.message,
                                None,
                            ))
                            .with_origin(source_item.origin.clone()),
                        );
                        None
                    }
                }
            }
            _ => None,
        };
        let size = initial_size(&source_item.item);
        laid_items.push(LaidItem {
            item: source_item,
            offset: 0,
            size,
            align,
        });
    }
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let mut layout = Layout {
        items: laid_items,
        labels: HashMap::new(),
    };

    let limit = layout.items.len() + 8;
    let mut converged = false;
    for _ in 0..limit {
        place(&mut layout).map_err(|diag| vec![diag])?;
        if !widen_pseudos(&mut layout, consts) {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(vec![Diagnostic::error(AsmError::new(
            AsmErrorKind::Internal,
            "Layout did not converge",
            None,
        ))]);
    }

    let required: u32 = if config.compress { 2 } else { 4 };
    for laid in &layout.items {
        let is_instruction = matches!(laid.item.item, Item::Inst(_) | Item::Pseudo(_));
        if is_instruction && laid.offset % required != 0 {
            diagnostics.push(
                Diagnostic::error(AsmError::new(
                    AsmErrorKind::Alignment,
                    &format!(
                        "Instruction at offset {:#x} is not {}-byte aligned (insert an align directive)",
                        laid.offset, required
                    ),
                    None,
                ))
                .with_origin(laid.item.origin.clone()),
            );
        }
    }
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    Ok(layout)
}

/// One walk: assign offsets, bind labels, size alignment padding.
pub(super) fn place(layout: &mut Layout) -> Result<(), Diagnostic> {
    layout.labels.clear();
    let mut offset: u32 = 0;
    for laid in &mut layout.items {
        laid.offset = offset;
        match &laid.item.item {
            Item::Label { name } => {
                layout.labels.insert(name.clone(), offset);
            }
            Item::Align { .. } => {
                let n = laid.align.unwrap_or(1) as u32;
                laid.size = (n - offset % n) % n;
            }
            _ => {}
        }
        offset = offset.checked_add(laid.size).ok_or_else(|| {
            Diagnostic::error(AsmError::new(
                AsmErrorKind::Range,
                "Program image exceeds the 32-bit address space",
                None,
            ))
            .with_origin(laid.item.origin.clone())
        })?;
    }
    Ok(())
}

/// Recompute `li`/`call`/`tail` sizes against the current label table.
/// Returns true if any item widened.
pub(super) fn widen_pseudos(layout: &mut Layout, consts: &HashMap<String, i64>) -> bool {
    let mut changed = false;
    for idx in 0..layout.items.len() {
        let offset = layout.items[idx].offset;
        let current = layout.items[idx].size;
        let new_size = match &layout.items[idx].item.item {
            Item::Pseudo(p) => pseudo_size(p, offset, consts, &layout.labels, current),
            _ => continue,
        };
        if new_size != current {
            layout.items[idx].size = new_size;
            changed = true;
        }
    }
    changed
}

/// Width of a variable pseudo at `offset`, never narrower than `current`.
fn pseudo_size(
    pseudo: &Pseudo,
    offset: u32,
    consts: &HashMap<String, i64>,
    labels: &HashMap<String, u32>,
    current: u32,
) -> u32 {
    let scope = EvalScope::at(consts, labels, offset);
    let needed = match pseudo {
        Pseudo::Li { imm, .. } => match expr::eval(imm, &scope) {
            Ok(value) => {
                if (-0x800..=0x7ff).contains(&value) || (value & 0xfff) == 0 {
                    4
                } else {
                    8
                }
            }
            Err(_) => current,
        },
        Pseudo::Call { target } | Pseudo::Tail { target } => {
            match pseudo::far_jump_distance(target, &scope) {
                Ok(dist) => {
                    if (-0x100000..=0xfffff).contains(&dist) && dist % 2 == 0 {
                        4
                    } else {
                        8
                    }
                }
                Err(_) => current,
            }
        }
        _ => current,
    };
    needed.max(current)
}

fn initial_size(item: &Item) -> u32 {
    match item {
        Item::Constant { .. } | Item::Label { .. } | Item::ErrorDirective { .. } => 0,
        Item::Inst(super::parser::Inst::C(_)) => 2,
        Item::Inst(_) => 4,
        // Optimistic short-form seed; the fixed point widens as needed.
        Item::Pseudo(_) => 4,
        Item::Bytes { values } => list_size(values.len(), 1),
        Item::Shorts { values } => list_size(values.len(), 2),
        Item::Ints { values } | Item::Longs { values } => list_size(values.len(), 4),
        Item::LongLongs { values } => list_size(values.len(), 8),
        Item::Floats { values } => list_size(values.len(), 4),
        Item::Doubles { values } => list_size(values.len(), 8),
        Item::Str { data } => list_size(data.len(), 1),
        Item::IncludeBytes { data } => list_size(data.len(), 1),
        Item::Pack { fmt, .. } => fmt.width() as u32,
        Item::Align { .. } => 0,
    }
}

fn list_size(count: usize, width: u64) -> u32 {
    u32::try_from(count as u64 * width).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::error::Origin;
    use crate::assembler::expr::Expr;
    use crate::assembler::parser::{self, Target};

    fn origin(line: u32) -> Origin {
        Origin::new("<test>", line, 1)
    }

    fn item(line: u32, item: Item) -> SourceItem {
        SourceItem {
            item,
            origin: origin(line),
        }
    }

    fn consts() -> HashMap<String, i64> {
        HashMap::new()
    }

    #[test]
    fn labels_bind_to_current_offsets() {
        let items = vec![
            item(1, Item::Bytes { values: vec![Expr::Int(1), Expr::Int(2)] }),
            item(2, Item::Label { name: "data".to_string() }),
            item(3, Item::Align { expr: Expr::Int(4) }),
            item(4, Item::Label { name: "main".to_string() }),
            item(
                5,
                Item::Inst(parser::Inst::J {
                    name: "jal".to_string(),
                    rd: parser::RegOperand::Num(0),
                    target: Target::Label("main".to_string()),
                }),
            ),
        ];
        let layout = resolve(items, &consts(), &Config::default()).expect("layout");
        assert_eq!(layout.labels["data"], 2);
        assert_eq!(layout.labels["main"], 4);
        assert_eq!(layout.items.last().unwrap().offset, 4);
    }

    #[test]
    fn align_pads_to_boundary_and_align_one_is_noop() {
        let items = vec![
            item(1, Item::Bytes { values: vec![Expr::Int(1)] }),
            item(2, Item::Align { expr: Expr::Int(1) }),
            item(3, Item::Align { expr: Expr::Int(4) }),
            item(4, Item::Label { name: "end".to_string() }),
        ];
        let layout = resolve(items, &consts(), &Config::default()).expect("layout");
        assert_eq!(layout.items[1].size, 0);
        assert_eq!(layout.items[2].size, 3);
        assert_eq!(layout.labels["end"], 4);
    }

    #[test]
    fn align_zero_and_non_power_of_two_are_errors() {
        for bad in [0i64, 3, 6] {
            let items = vec![item(1, Item::Align { expr: Expr::Int(bad) })];
            let err = resolve(items, &consts(), &Config::default()).unwrap_err();
            assert!(err[0].message().contains("power of two"), "align {bad}");
        }
    }

    #[test]
    fn duplicate_labels_are_errors() {
        let items = vec![
            item(1, Item::Label { name: "x".to_string() }),
            item(2, Item::Label { name: "x".to_string() }),
        ];
        let err = resolve(items, &consts(), &Config::default()).unwrap_err();
        assert!(err[0].message().contains("Duplicate label"));
    }

    #[test]
    fn unaligned_instructions_are_rejected() {
        let items = vec![
            item(1, Item::Bytes { values: vec![Expr::Int(0x42)] }),
            item(
                2,
                Item::Inst(parser::Inst::I {
                    name: "addi".to_string(),
                    rd: parser::RegOperand::Num(0),
                    rs1: parser::RegOperand::Num(0),
                    imm: Expr::Int(0),
                }),
            ),
        ];
        let err = resolve(items, &consts(), &Config::default()).unwrap_err();
        assert!(err[0].message().contains("aligned"));

        // 2-byte alignment suffices when compression is enabled.
        let items = vec![
            item(1, Item::Bytes { values: vec![Expr::Int(0x42), Expr::Int(0x43)] }),
            item(
                2,
                Item::Inst(parser::Inst::I {
                    name: "addi".to_string(),
                    rd: parser::RegOperand::Num(0),
                    rs1: parser::RegOperand::Num(0),
                    imm: Expr::Int(0),
                }),
            ),
        ];
        let config = Config {
            compress: true,
            ..Config::default()
        };
        assert!(resolve(items, &consts(), &config).is_ok());
    }

    #[test]
    fn forward_li_widens_when_the_target_needs_it() {
        // li t0, %position(far, 0x100) with far at a low offset fits addi,
        // so the pseudo stays short.
        let near = vec![
            item(
                1,
                Item::Pseudo(Pseudo::Li {
                    rd: parser::RegOperand::Num(5),
                    imm: Expr::Position {
                        label: "far".to_string(),
                        base: Box::new(Expr::Int(0x100)),
                    },
                }),
            ),
            item(2, Item::Label { name: "far".to_string() }),
        ];
        let layout = resolve(near, &consts(), &Config::default()).expect("layout");
        assert_eq!(layout.items[0].size, 4);

        // With a large base the value needs lui+addi.
        let far = vec![
            item(
                1,
                Item::Pseudo(Pseudo::Li {
                    rd: parser::RegOperand::Num(5),
                    imm: Expr::Position {
                        label: "far".to_string(),
                        base: Box::new(Expr::Int(0x0800_0001)),
                    },
                }),
            ),
            item(2, Item::Label { name: "far".to_string() }),
        ];
        let layout = resolve(far, &consts(), &Config::default()).expect("layout");
        assert_eq!(layout.items[0].size, 8);
        assert_eq!(layout.labels["far"], 8);
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! RV32IMAC assembler - pipeline driver.
//!
//! Assembly is a fixed ordered sequence of passes over one in-memory item
//! list: load, parse, constant resolution, pseudo expansion, layout
//! (fixed point), optional compression (fixed point), final pseudo
//! expansion, and encoding. Each pass consumes its input and yields a
//! representation with fewer unresolved constructs.

mod compress;
mod encode;
mod layout;
mod pseudo;
mod source;

pub mod cli;
pub mod error;
pub mod expr;
pub mod output;
pub mod parser;
mod passes;

use std::path::PathBuf;

use cli::Cli;
use error::{AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic};
use parser::{Endian, Item, SourceItem};
use source::{Line, LineContent};

use crate::imagestore::ImageStore;

pub use cli::VERSION;
pub use error::{AsmRunError as RunError, AsmRunReport as RunReport};

/// Immutable assembler configuration threaded through the passes.
#[derive(Debug, Clone)]
pub struct Config {
    pub include_dirs: Vec<PathBuf>,
    pub compress: bool,
    /// Endianness of data directives (instruction words are always
    /// little-endian).
    pub endian: Endian,
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            compress: false,
            endian: Endian::Little,
            verbosity: 0,
        }
    }
}

/// Result of assembling a program: the flat image and the label table.
#[derive(Debug)]
pub struct AsmOutput {
    pub bytes: Vec<u8>,
    /// Labels with their byte offsets, sorted by offset.
    pub labels: Vec<(String, u32)>,
}

/// Run the assembler with parsed command-line arguments.
pub fn run_with_cli(cli: &Cli) -> Result<AsmRunReport, AsmRunError> {
    passes::run_with_cli(cli)
}

/// Assemble in-memory source text with the given configuration.
pub fn assemble_source(source_text: &str, config: &Config) -> Result<AsmOutput, Vec<Diagnostic>> {
    let lines = source::load_source(source_text, &config.include_dirs)?;
    assemble_lines(lines, config)
}

/// Assemble a loaded line list through the full pass pipeline.
pub fn assemble_lines(lines: Vec<Line>, config: &Config) -> Result<AsmOutput, Vec<Diagnostic>> {
    let mut items: Vec<SourceItem> = Vec::new();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    for line in lines {
        match line.content {
            LineContent::Text(text) => match parser::parse_line(&text, &line.origin) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(diag) => diagnostics.push(diag),
            },
            LineContent::Blob(data) => items.push(SourceItem {
                item: Item::IncludeBytes { data },
                origin: line.origin,
            }),
        }
    }
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let defs: Vec<(String, expr::Expr, error::Origin)> = items
        .iter()
        .filter_map(|item| match &item.item {
            Item::Constant { name, expr } => {
                Some((name.clone(), expr.clone(), item.origin.clone()))
            }
            _ => None,
        })
        .collect();
    let (consts, const_diags) = expr::resolve_constants(&defs);
    if !const_diags.is_empty() {
        return Err(const_diags);
    }

    let items = pseudo::expand(items, config);
    let mut layout = layout::resolve(items, &consts, config)?;
    if config.compress {
        compress::run(&mut layout, &consts);
    }
    pseudo::expand_final(&mut layout, &consts)?;
    let bytes = encode::emit(&layout, &consts, config)?;

    let mut labels: Vec<(String, u32)> = layout
        .labels
        .iter()
        .map(|(name, offset)| (name.clone(), *offset))
        .collect();
    labels.sort_by(|left, right| left.1.cmp(&right.1).then_with(|| left.0.cmp(&right.0)));

    Ok(AsmOutput { bytes, labels })
}

/// Convenience wrapper used by tests and library callers: assemble with
/// the default configuration.
pub fn assemble(source_text: &str) -> Result<Vec<u8>, Vec<Diagnostic>> {
    assemble_source(source_text, &Config::default()).map(|output| output.bytes)
}

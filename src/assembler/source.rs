// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source loading and include resolution.
//!
//! Reads the entry file and recursively splices `include` directives,
//! searching first next to the including file and then the configured
//! include path. `include_bytes` reads raw file contents into a blob
//! line. Circular includes are detected against the in-progress stack.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{AsmError, AsmErrorKind, Diagnostic, Origin};

#[derive(Debug, Clone, PartialEq)]
pub enum LineContent {
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub origin: Origin,
    pub content: LineContent,
}

/// Load the entry file and materialize all includes.
pub fn load_program(entry: &Path, include_dirs: &[PathBuf]) -> Result<Vec<Line>, Vec<Diagnostic>> {
    let mut lines = Vec::new();
    let mut diagnostics = Vec::new();
    let mut stack = Vec::new();
    load_file(entry, None, include_dirs, &mut stack, &mut lines, &mut diagnostics);
    if diagnostics.is_empty() {
        Ok(lines)
    } else {
        Err(diagnostics)
    }
}

/// Load in-memory source (no backing file); includes resolve against the
/// search path only.
pub fn load_source(source: &str, include_dirs: &[PathBuf]) -> Result<Vec<Line>, Vec<Diagnostic>> {
    let mut lines = Vec::new();
    let mut diagnostics = Vec::new();
    let mut stack = Vec::new();
    load_text(
        source,
        "<source>",
        None,
        include_dirs,
        &mut stack,
        &mut lines,
        &mut diagnostics,
    );
    if diagnostics.is_empty() {
        Ok(lines)
    } else {
        Err(diagnostics)
    }
}

fn load_file(
    path: &Path,
    include_origin: Option<&Origin>,
    include_dirs: &[PathBuf],
    stack: &mut Vec<PathBuf>,
    lines: &mut Vec<Line>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if stack.contains(&canonical) {
        let diag = Diagnostic::error(AsmError::new(
            AsmErrorKind::Include,
            "Circular include",
            Some(&path.display().to_string()),
        ));
        diagnostics.push(match include_origin {
            Some(origin) => diag.with_origin(origin.clone()),
            None => diag,
        });
        return;
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            let diag = Diagnostic::error(AsmError::new(
                AsmErrorKind::Io,
                &format!("Unable to read {}: {err}", path.display()),
                None,
            ));
            diagnostics.push(match include_origin {
                Some(origin) => diag.with_origin(origin.clone()),
                None => diag,
            });
            return;
        }
    };

    stack.push(canonical);
    load_text(
        &text,
        &path.display().to_string(),
        path.parent(),
        include_dirs,
        stack,
        lines,
        diagnostics,
    );
    stack.pop();
}

fn load_text(
    text: &str,
    file: &str,
    dir: Option<&Path>,
    include_dirs: &[PathBuf],
    stack: &mut Vec<PathBuf>,
    lines: &mut Vec<Line>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (ix, raw) in text.lines().enumerate() {
        let origin = Origin::new(file, ix as u32 + 1, 1);
        let stripped = strip_comment(raw).trim();

        if let Some(spec) = directive_path(stripped, "include") {
            if spec.is_empty() {
                diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Syntax,
                        "include expects a file path",
                        None,
                    ))
                    .with_origin(origin),
                );
                continue;
            }
            match resolve_include(spec, dir, include_dirs) {
                Some(resolved) => {
                    load_file(&resolved, Some(&origin), include_dirs, stack, lines, diagnostics);
                }
                None => diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Include,
                        "Include file not found on search path",
                        Some(spec),
                    ))
                    .with_origin(origin),
                ),
            }
            continue;
        }

        if let Some(spec) = directive_path(stripped, "include_bytes") {
            if spec.is_empty() {
                diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Syntax,
                        "include_bytes expects a file path",
                        None,
                    ))
                    .with_origin(origin),
                );
                continue;
            }
            match resolve_include(spec, dir, include_dirs) {
                Some(resolved) => match fs::read(&resolved) {
                    Ok(data) => lines.push(Line {
                        origin,
                        content: LineContent::Blob(data),
                    }),
                    Err(err) => diagnostics.push(
                        Diagnostic::error(AsmError::new(
                            AsmErrorKind::Io,
                            &format!("Unable to read {}: {err}", resolved.display()),
                            None,
                        ))
                        .with_origin(origin),
                    ),
                },
                None => diagnostics.push(
                    Diagnostic::error(AsmError::new(
                        AsmErrorKind::Include,
                        "Include file not found on search path",
                        Some(spec),
                    ))
                    .with_origin(origin),
                ),
            }
            continue;
        }

        lines.push(Line {
            origin,
            content: LineContent::Text(raw.to_string()),
        });
    }
}

/// If `line` starts with the given directive word, return the path text
/// after it.
fn directive_path<'a>(line: &'a str, directive: &str) -> Option<&'a str> {
    let first = line.split_whitespace().next()?;
    if !first.eq_ignore_ascii_case(directive) {
        return None;
    }
    Some(line[first.len()..].trim())
}

fn resolve_include(name: &str, dir: Option<&Path>, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    if let Some(dir) = dir {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    for dir in include_dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    // Absolute paths and cwd-relative paths still resolve without a hit in
    // the search path.
    let candidate = PathBuf::from(name);
    if candidate.is_file() {
        return Some(candidate);
    }
    None
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(ix) => &line[..ix],
        None => line,
    }
}

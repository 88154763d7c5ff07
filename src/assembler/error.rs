// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.

use std::fmt;
use std::path::PathBuf;

use serde_json::json;

/// Where a token or item came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub file: String,
    pub line: u32,
    pub column: usize,
}

impl Origin {
    pub fn new(file: impl Into<String>, line: u32, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn with_column(&self, column: usize) -> Self {
        Self {
            file: self.file.clone(),
            line: self.line,
            column,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Cli,
    Syntax,
    Include,
    Name,
    Range,
    Alignment,
    Form,
    Abort,
    Io,
    Internal,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    origin: Option<Origin>,
    code: String,
    severity: Severity,
    error: AsmError,
}

impl Diagnostic {
    pub fn new(severity: Severity, error: AsmError) -> Self {
        Self {
            origin: None,
            code: default_diagnostic_code(error.kind()).to_string(),
            severity,
            error,
        }
    }

    pub fn error(error: AsmError) -> Self {
        Self::new(Severity::Error, error)
    }

    pub fn warning(error: AsmError) -> Self {
        Self::new(Severity::Warning, error)
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn render(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        match &self.origin {
            Some(origin) => format!("{origin}: {sev} [{}] {}", self.code, self.error.message()),
            None => format!("{sev} [{}] {}", self.code, self.error.message()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "severity": match self.severity {
                Severity::Warning => "warning",
                Severity::Error => "error",
            },
            "code": self.code,
            "message": self.error.message(),
            "file": self.origin.as_ref().map(|o| o.file.clone()),
            "line": self.origin.as_ref().map(|o| o.line),
            "column": self.origin.as_ref().map(|o| o.column),
        })
    }
}

/// Report from a successful assembly run.
#[derive(Debug)]
pub struct AsmRunReport {
    diagnostics: Vec<Diagnostic>,
    output: PathBuf,
    bytes_written: usize,
    labels: Vec<(String, u32)>,
}

impl AsmRunReport {
    pub fn new(
        diagnostics: Vec<Diagnostic>,
        output: PathBuf,
        bytes_written: usize,
        labels: Vec<(String, u32)>,
    ) -> Self {
        Self {
            diagnostics,
            output,
            bytes_written,
            labels,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn output(&self) -> &PathBuf {
        &self.output
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn labels(&self) -> &[(String, u32)] {
        &self.labels
    }
}

/// Error from a failed assembly run.
#[derive(Debug)]
pub struct AsmRunError {
    error: AsmError,
    diagnostics: Vec<Diagnostic>,
}

impl AsmRunError {
    pub fn new(error: AsmError, diagnostics: Vec<Diagnostic>) -> Self {
        Self { error, diagnostics }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for AsmRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AsmRunError {}

fn default_diagnostic_code(kind: AsmErrorKind) -> &'static str {
    match kind {
        AsmErrorKind::Cli => "asm001",
        AsmErrorKind::Syntax => "asm101",
        AsmErrorKind::Include => "asm102",
        AsmErrorKind::Name => "asm201",
        AsmErrorKind::Range => "asm301",
        AsmErrorKind::Alignment => "asm302",
        AsmErrorKind::Form => "asm401",
        AsmErrorKind::Abort => "asm501",
        AsmErrorKind::Io => "asm601",
        AsmErrorKind::Internal => "asm901",
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_render_includes_origin_and_code() {
        let err = AsmError::new(AsmErrorKind::Range, "Immediate out of range", Some("4096"));
        let diag = Diagnostic::error(err).with_origin(Origin::new("prog.asm", 12, 5));
        assert_eq!(
            diag.render(),
            "prog.asm:12:5: ERROR [asm301] Immediate out of range: 4096"
        );
    }

    #[test]
    fn diagnostic_render_without_origin() {
        let err = AsmError::new(AsmErrorKind::Cli, "Include path is not a directory", None);
        let diag = Diagnostic::error(err);
        assert_eq!(
            diag.render(),
            "ERROR [asm001] Include path is not a directory"
        );
    }

    #[test]
    fn diagnostic_json_carries_location() {
        let err = AsmError::new(AsmErrorKind::Syntax, "Illegal character", Some("?"));
        let diag = Diagnostic::error(err).with_origin(Origin::new("prog.asm", 3, 7));
        let value = diag.to_json();
        assert_eq!(value["severity"], "error");
        assert_eq!(value["code"], "asm101");
        assert_eq!(value["file"], "prog.asm");
        assert_eq!(value["line"], 3);
        assert_eq!(value["column"], 7);
    }
}

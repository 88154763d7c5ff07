// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for rvforge.

use clap::Parser;

use rvforge::assembler::cli::{Cli, OutputFormat};
use rvforge::assembler::error::Diagnostic;

fn emit_diagnostics(format: OutputFormat, diagnostics: &[Diagnostic]) {
    match format {
        OutputFormat::Text => {
            for diag in diagnostics {
                eprintln!("{}", diag.render());
            }
        }
        OutputFormat::Json => {
            let list: Vec<serde_json::Value> = diagnostics.iter().map(|d| d.to_json()).collect();
            eprintln!("{}", serde_json::json!({ "diagnostics": list }));
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format = cli.format;
    match rvforge::assembler::run_with_cli(&cli) {
        Ok(report) => {
            emit_diagnostics(format, report.diagnostics());
        }
        Err(err) => {
            emit_diagnostics(format, err.diagnostics());
            if format == OutputFormat::Text {
                eprintln!("{err}");
            }
            std::process::exit(1);
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler run orchestration.
//!
//! Drives the CLI-facing flow: validate arguments, load and assemble the
//! program, and write the requested output files. No output file is
//! produced once any error has been recorded.

use std::fs::File;

use super::*;

pub(super) fn run_with_cli(cli: &Cli) -> Result<AsmRunReport, AsmRunError> {
    let cli_config = cli::validate_cli(cli)?;
    let config = Config {
        include_dirs: cli_config.include_dirs.clone(),
        compress: cli_config.compress,
        endian: Endian::Little,
        verbosity: cli_config.verbosity,
    };

    if config.verbosity >= 1 {
        eprintln!("rvforge: assembling {}", cli_config.input.display());
    }
    let lines = source::load_program(&cli_config.input, &config.include_dirs)
        .map_err(|diags| run_error("Errors detected in source. No output file written.", diags))?;
    if config.verbosity >= 2 {
        eprintln!("rvforge: loaded {} source lines", lines.len());
    }

    let output = assemble_lines(lines, &config)
        .map_err(|diags| run_error("Errors detected in source. No output file written.", diags))?;
    if config.verbosity >= 2 {
        eprintln!(
            "rvforge: assembled {} bytes, {} labels",
            output.bytes.len(),
            output.labels.len()
        );
    }

    let image = ImageStore::from_bytes(output.bytes);
    let bin_file = File::create(&cli_config.output).map_err(|err| {
        io_error("Error opening output file for write", &cli_config.output, err)
    })?;
    image
        .write_bin_file(bin_file)
        .map_err(|err| io_error("Error writing output file", &cli_config.output, err))?;
    if config.verbosity >= 1 {
        eprintln!(
            "rvforge: wrote {} bytes to {}",
            image.len(),
            cli_config.output.display()
        );
    }

    if let Some(offset) = cli_config.hex_offset {
        let hex_path = cli::hex_output_path(&cli_config.output);
        let hex_file = File::create(&hex_path)
            .map_err(|err| io_error("Error opening hex file for write", &hex_path, err))?;
        image
            .write_hex_file(hex_file, offset)
            .map_err(|err| io_error("Error writing hex file", &hex_path, err))?;
        if config.verbosity >= 1 {
            eprintln!("rvforge: wrote hex image to {}", hex_path.display());
        }
    }

    if let Some(labels_path) = &cli_config.labels_path {
        output::emit_labels_file(labels_path, cli_config.format, &output.labels)?;
        if config.verbosity >= 1 {
            eprintln!("rvforge: wrote labels to {}", labels_path.display());
        }
    }

    Ok(AsmRunReport::new(
        cli_config.warnings,
        cli_config.output,
        image.len(),
        output.labels,
    ))
}

fn run_error(message: &str, diagnostics: Vec<Diagnostic>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Syntax, message, None),
        diagnostics,
    )
}

fn io_error(message: &str, path: &std::path::Path, err: std::io::Error) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(
            AsmErrorKind::Io,
            &format!("{message}: {err}"),
            Some(&path.display().to_string()),
        ),
        Vec::new(),
    )
}

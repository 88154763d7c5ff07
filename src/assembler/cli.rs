// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use super::error::{AsmError, AsmErrorKind, AsmRunError, Diagnostic};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "RISC-V assembler targeting RV32I with the M, A, and C standard \
extensions, producing a flat binary image suitable for flashing onto bare-metal \
microcontrollers.

The output is a raw image with no header or metadata (default name bb.out). An Intel HEX \
rendition can be emitted alongside it with --hex-offset.";

#[derive(Parser, Debug)]
#[command(
    name = "rvforge",
    version = VERSION,
    about = "RV32IMAC assembler producing flat binary images",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(value_name = "INPUT", help = "Assembly source file")]
    pub input: PathBuf,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        default_value = "bb.out",
        long_help = "Output binary path."
    )]
    pub output: PathBuf,
    #[arg(
        short = 'c',
        long = "compress",
        action = ArgAction::SetTrue,
        long_help = "Enable the C-extension compression pass. Eligible 32-bit instructions are \
replaced by their 16-bit equivalents."
    )]
    pub compress: bool,
    #[arg(
        short = 'i',
        long = "include",
        value_name = "DIR",
        action = ArgAction::Append,
        long_help = "Append DIR to the include search path (repeatable). Includes resolve first \
relative to the including file, then against the search path in order."
    )]
    pub include: Vec<PathBuf>,
    #[arg(
        short = 'l',
        long = "labels",
        value_name = "PATH",
        long_help = "Write a two-column labels-to-addresses listing to PATH."
    )]
    pub labels: Option<PathBuf>,
    #[arg(
        long = "hex-offset",
        value_name = "N",
        value_parser = parse_address,
        long_help = "Also emit an Intel HEX file at load offset N (decimal, 0x hex, or 0b \
binary). The file name is the output name with a .hex suffix appended."
    )]
    pub hex_offset: Option<u32>,
    #[arg(
        long = "include-definitions",
        action = ArgAction::SetTrue,
        long_help = "Extend the search path with the bundled chip/peripheral definitions \
directory next to the executable."
    )]
    pub include_definitions: bool,
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        long_help = "Diagnostic verbosity; repeat (-vv) for per-pass detail."
    )]
    pub verbose: u8,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select diagnostic/labels output format. text is default; json enables \
machine-readable output."
    )]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Validated CLI configuration.
#[derive(Debug)]
pub struct CliConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub compress: bool,
    pub labels_path: Option<PathBuf>,
    pub hex_offset: Option<u32>,
    pub verbosity: u8,
    pub format: OutputFormat,
    pub warnings: Vec<Diagnostic>,
}

pub fn parse_address(text: &str) -> Result<u32, String> {
    let stripped: String = text.chars().filter(|&c| c != '_').collect();
    let parsed = if let Some(hex) = stripped
        .strip_prefix("0x")
        .or_else(|| stripped.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else if let Some(bin) = stripped
        .strip_prefix("0b")
        .or_else(|| stripped.strip_prefix("0B"))
    {
        u32::from_str_radix(bin, 2)
    } else {
        stripped.parse::<u32>()
    };
    parsed.map_err(|_| format!("Invalid address: {text}"))
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    let mut warnings = Vec::new();
    let mut include_dirs = Vec::new();
    for dir in &cli.include {
        if !dir.is_dir() {
            return Err(AsmRunError::new(
                AsmError::new(
                    AsmErrorKind::Cli,
                    "Include path is not a directory",
                    Some(&dir.display().to_string()),
                ),
                Vec::new(),
            ));
        }
        include_dirs.push(dir.clone());
    }

    if cli.include_definitions {
        match bundled_definitions_dir() {
            Some(dir) => include_dirs.push(dir),
            None => warnings.push(Diagnostic::warning(AsmError::new(
                AsmErrorKind::Cli,
                "No bundled definitions directory found next to the executable",
                None,
            ))),
        }
    }

    Ok(CliConfig {
        input: cli.input.clone(),
        output: cli.output.clone(),
        include_dirs,
        compress: cli.compress,
        labels_path: cli.labels.clone(),
        hex_offset: cli.hex_offset,
        verbosity: cli.verbose,
        format: cli.format,
        warnings,
    })
}

fn bundled_definitions_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?.join("definitions");
    if dir.is_dir() {
        Some(dir)
    } else {
        None
    }
}

/// Name of the secondary Intel HEX output for a given binary output path.
pub fn hex_output_path(output: &PathBuf) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".hex");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_declaration_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_addresses_in_all_bases() {
        assert_eq!(parse_address("4096"), Ok(4096));
        assert_eq!(parse_address("0x08000000"), Ok(0x0800_0000));
        assert_eq!(parse_address("0b1000"), Ok(8));
        assert_eq!(parse_address("0x0800_0000"), Ok(0x0800_0000));
        assert!(parse_address("eight").is_err());
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["rvforge", "prog.asm"]);
        assert_eq!(cli.output, PathBuf::from("bb.out"));
        assert!(!cli.compress);
        assert!(cli.include.is_empty());
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from([
            "rvforge",
            "prog.asm",
            "-o",
            "image.bin",
            "-c",
            "-i",
            "/tmp",
            "-l",
            "labels.txt",
            "--hex-offset",
            "0x08000000",
            "-vv",
        ]);
        assert_eq!(cli.output, PathBuf::from("image.bin"));
        assert!(cli.compress);
        assert_eq!(cli.include, vec![PathBuf::from("/tmp")]);
        assert_eq!(cli.labels, Some(PathBuf::from("labels.txt")));
        assert_eq!(cli.hex_offset, Some(0x0800_0000));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn hex_output_name_appends_suffix() {
        assert_eq!(
            hex_output_path(&PathBuf::from("bb.out")),
            PathBuf::from("bb.out.hex")
        );
    }
}

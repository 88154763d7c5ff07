// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use std::fs;
use std::path::Path;

use serde_json::json;

use super::cli::OutputFormat;
use super::error::{AsmError, AsmErrorKind, AsmRunError};

/// Write the two-column labels-to-addresses listing, sorted by offset.
pub(super) fn emit_labels_file(
    path: &Path,
    format: OutputFormat,
    labels: &[(String, u32)],
) -> Result<(), AsmRunError> {
    let mut entries = labels.to_vec();
    entries.sort_by(|left, right| left.1.cmp(&right.1).then_with(|| left.0.cmp(&right.0)));

    let output = match format {
        OutputFormat::Json => {
            let labels: Vec<serde_json::Value> = entries
                .into_iter()
                .map(|(name, offset)| {
                    json!({
                        "name": name,
                        "offset": offset,
                    })
                })
                .collect();
            let mut text = json!({ "labels": labels }).to_string();
            text.push('\n');
            text
        }
        OutputFormat::Text => {
            let mut output = String::new();
            for (name, offset) in entries {
                output.push_str(&format!("{offset:08x} {name}\n"));
            }
            output
        }
    };

    fs::write(path, output).map_err(|err| {
        AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Io,
                &format!("Error writing labels file: {err}"),
                Some(&path.display().to_string()),
            ),
            Vec::new(),
        )
    })
}

//! Writing algorithm results

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use tinystan::StanDraws;
use tinystan_config::OutputFormat;

/// Render draws in the requested format
pub fn render(draws: &StanDraws, format: OutputFormat, pretty: bool) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut text = if pretty {
                serde_json::to_string_pretty(draws)?
            } else {
                serde_json::to_string(draws)?
            };
            text.push('\n');
            Ok(text)
        }
        OutputFormat::Csv => {
            if draws.metric.is_some() {
                tracing::warn!("CSV output does not include the adapted metric; use --format json");
            }
            Ok(to_csv(draws))
        }
    }
}

/// One header line of parameter names, then one line per draw
fn to_csv(draws: &StanDraws) -> String {
    let mut out = String::new();
    let header: Vec<String> = draws.param_names.iter().map(|n| csv_field(n)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for i in 0..draws.num_draws() {
        let Some(row) = draws.row(i) else { break };
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}", value);
        }
        out.push('\n');
    }
    out
}

fn csv_field(name: &str) -> String {
    if name.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// Write to `path`, or to stdout when no path is given
pub fn write(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write output to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|_| stdout.flush())
                .context("Failed to write output")
        }
    }
}

//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::schema::SkiffConfig;

/// Parse skiff.toml with detailed error messages
pub fn parse_skiff_toml(path: &Path) -> Result<SkiffConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_skiff_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse skiff.toml content from string
pub fn parse_skiff_toml_str(content: &str) -> Result<SkiffConfig> {
    let config: SkiffConfig =
        toml::from_str(content).map_err(|e| describe_toml_error(&e, content))?;
    config.validate()?;
    Ok(config)
}

/// Point at the offending line when the error carries a span.
fn describe_toml_error(error: &toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message();
    let Some(span) = error.span() else {
        return anyhow::anyhow!("TOML parsing error: {}", message);
    };

    let line_num = content[..span.start.min(content.len())]
        .matches('\n')
        .count()
        + 1;
    anyhow::anyhow!(
        "TOML parsing error at line {}:\n{}\n\nError: {}",
        line_num,
        line_context(content, line_num),
        message
    )
}

/// The error line with one line of context either side.
fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &SkiffConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

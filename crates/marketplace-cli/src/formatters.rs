//! Output formatters for CLI commands.
//!
//! Every command builds a serializable report and hands it to
//! [`format_output`]. JSON is for machines, text is one `key=value` pair per
//! line for shell scripts, pretty is aligned and colorized for terminals.

use anyhow::Result;
use colored::Colorize;
use marketplace_core::cli::OutputFormat;
use serde::Serialize;
use serde_json::Value;

/// Format data according to the specified output format.
///
/// # Errors
///
/// Returns an error if the data cannot be serialized.
///
/// # Examples
///
/// ```
/// use marketplace_cli::formatters::format_output;
/// use marketplace_core::cli::OutputFormat;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Report {
///     path: String,
///     size: u64,
/// }
///
/// let report = Report { path: "plugin.zip".to_string(), size: 42 };
///
/// let output = format_output(&report, OutputFormat::Text)?;
/// assert_eq!(output, "path=plugin.zip\nsize=42");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn format_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::format(data),
        OutputFormat::Text => text::format(data),
        OutputFormat::Pretty => pretty::format(data),
    }
}

/// Flattens a JSON value into `(dotted.key, value)` leaves in field order.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, nested, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

/// JSON output formatting.
pub mod json {
    use super::{Result, Serialize};

    /// Format data as JSON with 2-space indentation.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }
}

/// Plain text output formatting.
pub mod text {
    use super::{Result, Serialize, Value, flatten};

    /// Format data as `key=value` lines.
    ///
    /// Nested objects use dotted keys. Strings are printed unquoted and
    /// nulls are omitted.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let mut leaves = Vec::new();
        flatten("", &serde_json::to_value(data)?, &mut leaves);

        let lines: Vec<String> = leaves
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Pretty (human-readable) output formatting.
pub mod pretty {
    use super::{Colorize, Result, Serialize, Value, flatten};

    /// Format data as aligned, colorized `key: value` rows.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let mut leaves = Vec::new();
        flatten("", &serde_json::to_value(data)?, &mut leaves);

        let width = leaves.iter().map(|(key, _)| key.len() + 1).max().unwrap_or(0);
        let rows: Vec<String> = leaves
            .iter()
            .map(|(key, value)| {
                let label = format!("{:<width$}", format!("{key}:"));
                format!("{}  {}", label.bold(), render(value))
            })
            .collect();
        Ok(rows.join("\n"))
    }

    fn render(value: &Value) -> String {
        match value {
            Value::Null => "-".dimmed().to_string(),
            Value::Bool(true) => "yes".green().to_string(),
            Value::Bool(false) => "no".yellow().to_string(),
            Value::Number(n) => n.to_string().cyan().to_string(),
            Value::String(s) => s.green().to_string(),
            Value::Array(items) => items
                .iter()
                .map(render)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => String::new(),
        }
    }
}

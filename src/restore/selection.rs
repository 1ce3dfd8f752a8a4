// dgraph-backup/src/restore/selection.rs
use anyhow::Context;
use regex::Regex;
use std::io::{BufRead, Write};

use crate::errors::{AppError, Result};
use crate::storage::RemoteObject;

const KEY_PATTERN: &str = r#"Key[:]\s"(.*)""#;

/// Presents rendered candidates and returns the chosen line, or `None` when
/// the operator cancels.
pub trait SnapshotSelector {
    fn select(&self, label: &str, items: &[String]) -> anyhow::Result<Option<String>>;
}

/// One display line per backup; the key is recoverable with [`parse_selected_key`].
pub fn render_candidate(object: &RemoteObject) -> String {
    let modified = object
        .last_modified
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Key: \"{}\" ({} bytes, last modified {})",
        object.key, object.size_bytes, modified
    )
}

pub fn parse_selected_key(selection: &str) -> Option<String> {
    let re = Regex::new(KEY_PATTERN).ok()?;
    re.captures(selection)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|key| !key.is_empty())
}

/// Picks one backup key out of `candidates` through `selector`.
pub fn choose(candidates: &[RemoteObject], selector: &dyn SnapshotSelector) -> Result<String> {
    if candidates.is_empty() {
        return Err(AppError::Selection("no backups found in bucket".into()));
    }

    let items: Vec<String> = candidates.iter().map(render_candidate).collect();
    let selection = selector
        .select("Select backup to restore", &items)
        .map_err(|e| AppError::Selection(format!("{:#}", e)))?
        .ok_or_else(|| AppError::Selection("selection cancelled".into()))?;

    let key = parse_selected_key(&selection)
        .ok_or_else(|| AppError::Selection(format!("cannot parse key from {:?}", selection)))?;
    if !candidates.iter().any(|c| c.key == key) {
        return Err(AppError::Selection(format!("{} is not in the bucket listing", key)));
    }
    Ok(key)
}

/// Numbered list on stdout, choice read from stdin.
///
/// Must run on the multi-threaded runtime: the blocking read is handed off
/// with `block_in_place` so other tasks keep running.
pub struct TerminalSelector;

impl SnapshotSelector for TerminalSelector {
    fn select(&self, label: &str, items: &[String]) -> anyhow::Result<Option<String>> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        prompt_off_runtime(label, items, &mut stdin.lock(), &mut stdout)
    }
}

fn prompt_off_runtime(
    label: &str,
    items: &[String],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> anyhow::Result<Option<String>> {
    tokio::task::block_in_place(|| prompt_selection(label, items, input, output))
}

fn prompt_selection(
    label: &str,
    items: &[String],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> anyhow::Result<Option<String>> {
    writeln!(output, "{}:", label)?;
    for (i, item) in items.iter().enumerate() {
        writeln!(output, "{:>3}. {}", i + 1, item)?;
    }
    write!(output, "Enter a number (empty to cancel): ")?;
    output.flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read user input")?;
    let choice = line.trim();
    if choice.is_empty() {
        return Ok(None);
    }

    let index: usize = choice
        .parse()
        .with_context(|| format!("{:?} is not a number", choice))?;
    match index.checked_sub(1).and_then(|i| items.get(i)) {
        Some(item) => Ok(Some(item.clone())),
        None => anyhow::bail!("{} is out of range 1..={}", index, items.len()),
    }
}

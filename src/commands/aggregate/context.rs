use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

// Label text is a fixed contract with the tool that produced the context
// files; matching tolerates surrounding whitespace and a trailing colon.
const TEXT_BEFORE_LABEL: &str = "Text Before";
const FULL_CAPTION_LABEL: &str = "Full Caption";
const TEXT_AFTER_LABEL: &str = "Text After";

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct FigureContext {
    pub before: Vec<String>,
    pub caption: String,
    pub after: Vec<String>,
}

pub(crate) fn parse_context_file(path: &Path) -> Result<FigureContext> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_context_text(&text))
}

/// Splits a context file into its three delimited blocks. A missing
/// delimiter yields an empty block for that field, never an error.
pub(crate) fn parse_context_text(text: &str) -> FigureContext {
    let lines = text.lines().collect::<Vec<&str>>();
    let delimiter_indices = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            is_delimiter(line, TEXT_BEFORE_LABEL)
                || is_delimiter(line, FULL_CAPTION_LABEL)
                || is_delimiter(line, TEXT_AFTER_LABEL)
        })
        .map(|(index, _)| index)
        .collect::<Vec<usize>>();

    FigureContext {
        before: block_lines(&lines, &delimiter_indices, TEXT_BEFORE_LABEL),
        caption: block_lines(&lines, &delimiter_indices, FULL_CAPTION_LABEL)
            .into_iter()
            .next()
            .unwrap_or_default(),
        after: block_lines(&lines, &delimiter_indices, TEXT_AFTER_LABEL),
    }
}

fn is_delimiter(line: &str, label: &str) -> bool {
    let trimmed = line.trim();
    trimmed == label || trimmed.strip_suffix(':').map(str::trim_end) == Some(label)
}

/// Non-empty lines strictly between a block's delimiter and the next
/// delimiter (or end of file), in original order.
fn block_lines(lines: &[&str], delimiter_indices: &[usize], label: &str) -> Vec<String> {
    let Some(start) = lines.iter().position(|line| is_delimiter(line, label)) else {
        return Vec::new();
    };

    let end = delimiter_indices
        .iter()
        .copied()
        .find(|index| *index > start)
        .unwrap_or(lines.len());

    lines[start + 1..end]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use regex::Regex;

use crate::model::SectionSpec;

/// Strips layout artifacts from raw per-page text and segments the result
/// into paragraphs. Regexes are compiled once per run.
pub(crate) struct PageCleaner {
    page_number: Regex,
    toc_dot_leader: Regex,
    toc_gap: Regex,
    section_prefix: Regex,
}

impl PageCleaner {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            page_number: Regex::new(r"^\d{1,4}$")
                .context("failed to compile page number regex")?,
            toc_dot_leader: Regex::new(r"^.{1,80}?\.{2,}\s*\d{1,4}$")
                .context("failed to compile dot-leader regex")?,
            toc_gap: Regex::new(r"^(?:\d+(?:\.\d+)*\s+)?\S.{0,46}\s{2,}\d{1,4}$")
                .context("failed to compile contents-line regex")?,
            section_prefix: Regex::new(r"^[0-9]\.?(?:\s+|$)")
                .context("failed to compile section prefix regex")?,
        })
    }

    /// Cleans ordered per-page text blocks into a flat paragraph list.
    pub(crate) fn clean_pages(&self, pages: &[String]) -> Vec<String> {
        let header_candidates = detect_repeated_edge_lines(pages, true);
        let footer_candidates = detect_repeated_edge_lines(pages, false);

        let mut cleaned_lines = Vec::new();
        for page in pages {
            let mut lines = page
                .lines()
                .map(|line| line.to_string())
                .collect::<Vec<String>>();

            lines.retain(|line| !self.line_is_noise(line));

            if let Some(index) = first_nonempty_line_index(&lines) {
                let candidate = normalize_edge_line(&lines[index]);
                if !candidate.is_empty() && header_candidates.contains(&candidate) {
                    lines.remove(index);
                }
            }

            if let Some(index) = last_nonempty_line_index(&lines) {
                let candidate = normalize_edge_line(&lines[index]);
                if !candidate.is_empty() && footer_candidates.contains(&candidate) {
                    lines.remove(index);
                }
            }

            cleaned_lines.extend(lines);
            cleaned_lines.push(String::new());
        }

        let collapsed = collapse_blank_runs(cleaned_lines);
        self.split_paragraphs(&collapsed)
    }

    fn line_is_noise(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }

        self.page_number.is_match(trimmed)
            || self.toc_dot_leader.is_match(trimmed)
            || self.toc_gap.is_match(trimmed)
    }

    fn split_paragraphs(&self, lines: &[String]) -> Vec<String> {
        let mut paragraphs = Vec::new();
        let mut current = Vec::<&str>::new();

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join(" "));
                    current.clear();
                }
                continue;
            }
            current.push(trimmed);
        }
        if !current.is_empty() {
            paragraphs.push(current.join(" "));
        }

        paragraphs
            .into_iter()
            .filter(|paragraph| !paragraph.is_empty() && !self.page_number.is_match(paragraph))
            .collect()
    }

    /// Emits the paragraphs between a section's start marker (inclusive)
    /// and end marker (exclusive). Leading single-digit section numbers are
    /// stripped and short residual paragraphs dropped.
    pub(crate) fn extract_section(
        &self,
        paragraphs: &[String],
        spec: &SectionSpec,
        min_chars: usize,
    ) -> Vec<String> {
        let start_needle = spec.start_marker.to_lowercase();
        let end_needle = spec.end_marker.to_lowercase();

        let Some(start) = paragraphs
            .iter()
            .position(|paragraph| paragraph.to_lowercase().contains(&start_needle))
        else {
            return Vec::new();
        };

        let end = paragraphs[start + 1..]
            .iter()
            .position(|paragraph| paragraph.to_lowercase().contains(&end_needle))
            .map(|offset| start + 1 + offset)
            .unwrap_or(paragraphs.len());

        paragraphs[start..end]
            .iter()
            .map(|paragraph| {
                self.section_prefix
                    .replace(paragraph, "")
                    .trim()
                    .to_string()
            })
            .filter(|paragraph| paragraph.len() >= min_chars)
            .collect()
    }
}

/// Three or more consecutive blank lines become exactly one.
fn collapse_blank_runs(lines: Vec<String>) -> Vec<String> {
    let mut collapsed = Vec::with_capacity(lines.len());
    let mut blank_run = 0usize;

    for line in lines {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }

        if blank_run > 0 {
            let kept = if blank_run >= 3 { 1 } else { blank_run };
            for _ in 0..kept {
                collapsed.push(String::new());
            }
            blank_run = 0;
        }
        collapsed.push(line);
    }

    collapsed
}

/// First or last non-empty lines that recur on three or more pages are
/// running headers/footers.
fn detect_repeated_edge_lines(pages: &[String], header: bool) -> HashSet<String> {
    let mut counts = HashMap::<String, usize>::new();
    for page in pages {
        let lines = page.lines().map(str::trim).collect::<Vec<&str>>();
        let candidate = if header {
            lines.iter().copied().find(|line| !line.is_empty())
        } else {
            lines.iter().rev().copied().find(|line| !line.is_empty())
        };

        let Some(candidate) = candidate else {
            continue;
        };

        let normalized = normalize_edge_line(candidate);
        if normalized.is_empty() || normalized.len() > 120 {
            continue;
        }
        *counts.entry(normalized).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .filter_map(|(candidate, count)| if count >= 3 { Some(candidate) } else { None })
        .collect()
}

fn normalize_edge_line(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn first_nonempty_line_index(lines: &[String]) -> Option<usize> {
    lines.iter().position(|line| !line.trim().is_empty())
}

fn last_nonempty_line_index(lines: &[String]) -> Option<usize> {
    lines.iter().rposition(|line| !line.trim().is_empty())
}

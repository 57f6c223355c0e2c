//! Line-level correspondence between an original and a suggested text.
//!
//! Matching is exact-line and greedy; it is not an LCS and makes no claim to
//! minimality. Lines are split on `\n` only, so a trailing newline yields a
//! final empty line on both sides.

use std::path::Path;

/// Split a snapshot into lines.
pub fn lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Partial one-to-one matching between original and suggested line indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondence {
    original: Vec<Option<usize>>,
    suggested: Vec<Option<usize>>,
}

impl Correspondence {
    pub fn new(original_len: usize, suggested_len: usize) -> Self {
        Self {
            original: vec![None; original_len],
            suggested: vec![None; suggested_len],
        }
    }

    /// Record a match. Both indices must be unmatched and in range.
    pub fn link(&mut self, original: usize, suggested: usize) {
        debug_assert!(self.original[original].is_none() && self.suggested[suggested].is_none());
        self.original[original] = Some(suggested);
        self.suggested[suggested] = Some(original);
    }

    /// Matched pairs in original order.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.original
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| (i, j)))
            .collect()
    }

    pub fn original_match(&self, original: usize) -> Option<usize> {
        self.original.get(original).copied().flatten()
    }

    pub fn suggested_match(&self, suggested: usize) -> Option<usize> {
        self.suggested.get(suggested).copied().flatten()
    }

    pub fn original_len(&self) -> usize {
        self.original.len()
    }

    pub fn suggested_len(&self) -> usize {
        self.suggested.len()
    }

    /// Suggested lines with no counterpart.
    pub fn additions(&self) -> usize {
        self.suggested.iter().filter(|m| m.is_none()).count()
    }

    /// Original lines with no counterpart.
    pub fn deletions(&self) -> usize {
        self.original.iter().filter(|m| m.is_none()).count()
    }
}

pub trait LineMatcher {
    fn correspond(&self, original: &[&str], suggested: &[&str]) -> Correspondence;
}

/// For each original line in order, take the first unused suggested line with
/// the same text. Matches may cross: a moved line still counts as matched.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMatcher;

impl LineMatcher for GreedyMatcher {
    fn correspond(&self, original: &[&str], suggested: &[&str]) -> Correspondence {
        let mut c = Correspondence::new(original.len(), suggested.len());
        for (i, line) in original.iter().enumerate() {
            let found = suggested
                .iter()
                .enumerate()
                .find(|(j, candidate)| c.suggested[*j].is_none() && *candidate == line);
            if let Some((j, _)) = found {
                c.link(i, j);
            }
        }
        c
    }
}

// ---------------------------------------------------------------------------
// Highlights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    /// Rows of the suggested text.
    Addition,
    /// Rows of the original text; not drawn into the editor.
    Deletion,
}

/// A maximal run of unmatched rows, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightSpan {
    pub kind: HighlightKind,
    pub start: usize,
    pub end: usize,
}

impl HighlightSpan {
    pub fn rows(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

fn unmatched_runs(matches: &[Option<usize>], kind: HighlightKind) -> Vec<HighlightSpan> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (row, m) in matches.iter().enumerate() {
        match (m, open) {
            (None, None) => open = Some(row),
            (Some(_), Some(start)) => {
                spans.push(HighlightSpan {
                    kind,
                    start,
                    end: row - 1,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        spans.push(HighlightSpan {
            kind,
            start,
            end: matches.len() - 1,
        });
    }
    spans
}

/// Addition spans over suggested rows, then deletion spans over original rows.
pub fn compute_highlights(c: &Correspondence) -> Vec<HighlightSpan> {
    let mut spans = unmatched_runs(&c.suggested, HighlightKind::Addition);
    spans.extend(unmatched_runs(&c.original, HighlightKind::Deletion));
    spans
}

/// Suggested rows that carry an "Added/Modified" annotation.
pub fn addition_rows(c: &Correspondence) -> Vec<usize> {
    (0..c.suggested_len())
        .filter(|&j| c.suggested_match(j).is_none())
        .collect()
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffStats {
    pub file_name: String,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffStats {
    pub fn new(path: &str, c: &Correspondence) -> Self {
        let file_name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Self {
            file_name,
            additions: c.additions(),
            deletions: c.deletions(),
        }
    }
}

impl std::fmt::Display for DiffStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} +{} -{}", self.file_name, self.additions, self.deletions)
    }
}

/// Unified-style listing. Unmatched original lines are emitted as `-` just
/// before the next matched line that follows them; crossed matches print as
/// context where they land in the suggested text.
pub fn unified_listing(path: &str, original: &[&str], suggested: &[&str], c: &Correspondence) -> String {
    let mut out = format!("--- a/{path}\n+++ b/{path}\n");
    let mut next_original = 0;

    let flush_deletions = |out: &mut String, next: &mut usize, upto: usize| {
        while *next < upto {
            if c.original_match(*next).is_none() {
                out.push('-');
                out.push_str(original[*next]);
                out.push('\n');
            }
            *next += 1;
        }
    };

    for (j, line) in suggested.iter().enumerate() {
        match c.suggested_match(j) {
            Some(i) => {
                flush_deletions(&mut out, &mut next_original, i);
                next_original = next_original.max(i + 1);
                out.push(' ');
            }
            None => out.push('+'),
        }
        out.push_str(line);
        out.push('\n');
    }
    flush_deletions(&mut out, &mut next_original, original.len());
    out
}

//! The editor surface the change engine drives.

use crate::backend::SelectedRange;
use crate::diff::HighlightSpan;

/// Row and column, both 0-based. Columns count chars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

impl Position {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Same range with `start <= end`.
    pub fn ordered(self) -> Self {
        if self.end < self.start {
            Self {
                start: self.end,
                end: self.start,
            }
        } else {
            self
        }
    }
}

impl From<SelectedRange> for TextRange {
    fn from(r: SelectedRange) -> Self {
        Self {
            start: Position::new(r.start_row, r.start_col),
            end: Position::new(r.end_row, r.end_col),
        }
    }
}

impl From<TextRange> for SelectedRange {
    fn from(r: TextRange) -> Self {
        Self {
            start_row: r.start.row,
            start_col: r.start.column,
            end_row: r.end.row,
            end_col: r.end.column,
        }
    }
}

/// Gutter note on one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub row: usize,
    pub text: String,
}

pub trait DocumentView {
    fn text(&self) -> String;

    /// Replace the whole text. Drops the selection.
    fn set_text(&mut self, text: &str);

    fn read_range(&self, range: TextRange) -> String;

    fn replace_range(&mut self, range: TextRange, text: &str);

    fn selection(&self) -> Option<TextRange>;

    fn set_selection(&mut self, range: Option<TextRange>);

    fn set_markers(&mut self, spans: &[HighlightSpan]);

    fn set_annotations(&mut self, annotations: &[Annotation]);

    /// Remove every marker and annotation.
    fn clear_markers(&mut self);
}

// ---------------------------------------------------------------------------
// In-memory document
// ---------------------------------------------------------------------------

/// Plain-text document. Positions past the end of a line or of the text clamp
/// to the nearest valid offset.
#[derive(Debug, Clone, Default)]
pub struct TextDocument {
    text: String,
    selection: Option<TextRange>,
    markers: Vec<HighlightSpan>,
    annotations: Vec<Annotation>,
}

impl TextDocument {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn markers(&self) -> &[HighlightSpan] {
        &self.markers
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Whether `pos` names an existing row and a column within (or at the end of) it.
    pub fn contains(&self, pos: Position) -> bool {
        self.text
            .split('\n')
            .nth(pos.row)
            .is_some_and(|line| pos.column <= line.chars().count())
    }

    fn offset(&self, pos: Position) -> usize {
        let mut line_start = 0;
        for (row, line) in self.text.split('\n').enumerate() {
            if row == pos.row {
                let col = line
                    .char_indices()
                    .nth(pos.column)
                    .map_or(line.len(), |(i, _)| i);
                return line_start + col;
            }
            line_start += line.len() + 1;
        }
        self.text.len()
    }

    fn span(&self, range: TextRange) -> std::ops::Range<usize> {
        let range = range.ordered();
        self.offset(range.start)..self.offset(range.end)
    }
}

impl DocumentView for TextDocument {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.selection = None;
    }

    fn read_range(&self, range: TextRange) -> String {
        self.text[self.span(range)].to_string()
    }

    fn replace_range(&mut self, range: TextRange, text: &str) {
        let span = self.span(range);
        self.text.replace_range(span, text);
    }

    fn selection(&self) -> Option<TextRange> {
        self.selection
    }

    fn set_selection(&mut self, range: Option<TextRange>) {
        self.selection = range;
    }

    fn set_markers(&mut self, spans: &[HighlightSpan]) {
        self.markers = spans.to_vec();
    }

    fn set_annotations(&mut self, annotations: &[Annotation]) {
        self.annotations = annotations.to_vec();
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
        self.annotations.clear();
    }
}

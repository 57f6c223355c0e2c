//! Review and application of suggested edits.
//!
//! At most one suggestion is pending. While pending, the document shows either
//! the suggested text (with addition markers) or the original; accepting or
//! rejecting returns the engine to idle. Markers are cleared on every
//! transition so nothing drawn for an older suggestion survives.

use lazy_static::lazy_static;
use regex::Regex;

use crate::diff::{
    Correspondence, GreedyMatcher, HighlightKind, HighlightSpan, LineMatcher, addition_rows,
    compute_highlights, lines,
};
use crate::document::{Annotation, DocumentView, TextDocument, TextRange};
use crate::error::ApplyFailure;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:\w+)?\s*([\s\S]*?)\s*```").unwrap();
}

pub const CHANGE_ANNOTATION: &str = "Added/Modified";

/// Body of the first fenced code block, or the text unchanged when there is none.
pub fn extract_code_block(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionScope {
    Whole,
    /// Only `range` of the original is replaced.
    Selection {
        range: TextRange,
        replacement: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSuggestion {
    pub original: String,
    /// Full document text once the suggestion is applied.
    pub suggested: String,
    pub scope: SuggestionScope,
}

impl PendingSuggestion {
    pub fn whole(original: impl Into<String>, suggested: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            suggested: suggested.into(),
            scope: SuggestionScope::Whole,
        }
    }

    /// A suggestion replacing `range` of `original`. The full suggested text is
    /// derived by splicing, so the preview is exactly what accepting produces.
    pub fn scoped(
        original: impl Into<String>,
        range: TextRange,
        replacement: impl Into<String>,
    ) -> Result<Self, ApplyFailure> {
        let original = original.into();
        let replacement = replacement.into();
        let suggested = splice(&original, range, &replacement)?;
        Ok(Self {
            original,
            suggested,
            scope: SuggestionScope::Selection { range, replacement },
        })
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self.scope, SuggestionScope::Selection { .. })
    }
}

fn splice(original: &str, range: TextRange, replacement: &str) -> Result<String, ApplyFailure> {
    let mut doc = TextDocument::new(original);
    if !doc.contains(range.start) || !doc.contains(range.end) {
        return Err(ApplyFailure::InvalidRange);
    }
    doc.replace_range(range, replacement);
    Ok(doc.text())
}

/// Document text after accepting `suggestion`.
pub fn apply_suggestion(suggestion: &PendingSuggestion) -> Result<String, ApplyFailure> {
    match &suggestion.scope {
        SuggestionScope::Whole => Ok(suggestion.suggested.clone()),
        SuggestionScope::Selection { range, replacement } => {
            splice(&suggestion.original, *range, replacement)
        }
    }
}

/// Document text after rejecting `suggestion`.
pub fn reject_suggestion(suggestion: &PendingSuggestion) -> String {
    suggestion.original.clone()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preview {
    Suggested,
    Original,
}

#[derive(Debug, Default)]
enum EngineState {
    #[default]
    Idle,
    Pending {
        suggestion: PendingSuggestion,
        preview: Preview,
    },
}

#[derive(Debug, Default)]
pub struct ChangeEngine<M: LineMatcher = GreedyMatcher> {
    matcher: M,
    state: EngineState,
}

impl ChangeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M: LineMatcher> ChangeEngine<M> {
    pub fn with_matcher(matcher: M) -> Self {
        Self {
            matcher,
            state: EngineState::Idle,
        }
    }

    pub fn correspond(&self, original: &str, suggested: &str) -> Correspondence {
        self.matcher.correspond(&lines(original), &lines(suggested))
    }

    pub fn compute_highlights(&self, original: &str, suggested: &str) -> Vec<HighlightSpan> {
        compute_highlights(&self.correspond(original, suggested))
    }

    pub fn pending(&self) -> Option<&PendingSuggestion> {
        match &self.state {
            EngineState::Pending { suggestion, .. } => Some(suggestion),
            EngineState::Idle => None,
        }
    }

    pub fn preview(&self) -> Option<Preview> {
        match &self.state {
            EngineState::Pending { preview, .. } => Some(*preview),
            EngineState::Idle => None,
        }
    }

    fn pending_or_fail(&self) -> Result<&PendingSuggestion, ApplyFailure> {
        self.pending().ok_or(ApplyFailure::NoPendingSuggestion)
    }

    /// Show `suggested` with addition markers and per-row annotations.
    fn draw<D: DocumentView>(&self, doc: &mut D, original: &str, suggested: &str) -> Vec<HighlightSpan> {
        doc.set_text(suggested);
        let c = self.correspond(original, suggested);
        let spans = compute_highlights(&c);
        let additions: Vec<HighlightSpan> = spans
            .iter()
            .filter(|s| s.kind == HighlightKind::Addition)
            .copied()
            .collect();
        let annotations: Vec<Annotation> = addition_rows(&c)
            .into_iter()
            .map(|row| Annotation {
                row,
                text: CHANGE_ANNOTATION.to_string(),
            })
            .collect();
        doc.set_markers(&additions);
        doc.set_annotations(&annotations);
        spans
    }

    /// Make `suggestion` the pending one and preview it. Replaces any
    /// suggestion already pending. Returns every highlight span, deletions
    /// included.
    pub fn receive<D: DocumentView>(
        &mut self,
        doc: &mut D,
        suggestion: PendingSuggestion,
    ) -> Vec<HighlightSpan> {
        doc.clear_markers();
        if self.pending().is_some() {
            tracing::debug!("replacing pending suggestion");
        }
        let spans = self.draw(doc, &suggestion.original, &suggestion.suggested);
        tracing::debug!(scoped = suggestion.is_scoped(), spans = spans.len(), "suggestion received");
        self.state = EngineState::Pending {
            suggestion,
            preview: Preview::Suggested,
        };
        spans
    }

    pub fn show_original<D: DocumentView>(&mut self, doc: &mut D) -> Result<(), ApplyFailure> {
        let original = self.pending_or_fail()?.original.clone();
        doc.clear_markers();
        doc.set_text(&original);
        self.set_preview(Preview::Original);
        Ok(())
    }

    pub fn show_suggested<D: DocumentView>(&mut self, doc: &mut D) -> Result<(), ApplyFailure> {
        let pending = self.pending_or_fail()?;
        let (original, suggested) = (pending.original.clone(), pending.suggested.clone());
        doc.clear_markers();
        self.draw(doc, &original, &suggested);
        self.set_preview(Preview::Suggested);
        Ok(())
    }

    fn set_preview(&mut self, next: Preview) {
        if let EngineState::Pending { preview, .. } = &mut self.state {
            *preview = next;
        }
    }

    /// Write the suggestion into the document and go idle. A scoped
    /// suggestion is rebuilt from the original text, so only its range
    /// changes regardless of which preview is showing.
    pub fn accept<D: DocumentView>(&mut self, doc: &mut D) -> Result<String, ApplyFailure> {
        let pending = self.pending_or_fail()?;
        let result = apply_suggestion(pending)?;
        doc.clear_markers();
        match &pending.scope {
            SuggestionScope::Whole => doc.set_text(&result),
            SuggestionScope::Selection { range, replacement } => {
                doc.set_text(&pending.original);
                doc.replace_range(*range, replacement);
            }
        }
        self.state = EngineState::Idle;
        tracing::debug!("suggestion accepted");
        Ok(result)
    }

    /// Restore the original text (and, for a scoped suggestion, its
    /// selection) and go idle.
    pub fn reject<D: DocumentView>(&mut self, doc: &mut D) -> Result<String, ApplyFailure> {
        let pending = self.pending_or_fail()?;
        let original = reject_suggestion(pending);
        doc.clear_markers();
        doc.set_text(&original);
        if let SuggestionScope::Selection { range, .. } = &pending.scope {
            doc.set_selection(Some(*range));
        }
        self.state = EngineState::Idle;
        tracing::debug!("suggestion rejected");
        Ok(original)
    }

    /// Drop any pending suggestion without touching the document text.
    pub fn discard<D: DocumentView>(&mut self, doc: &mut D) {
        if self.pending().is_some() {
            doc.clear_markers();
            self.state = EngineState::Idle;
            tracing::debug!("pending suggestion discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Position;

    fn range(sr: usize, sc: usize, er: usize, ec: usize) -> TextRange {
        TextRange::new(Position::new(sr, sc), Position::new(er, ec))
    }

    const ORIGINAL: &str = "a = 1\nb = 2\nc = 3\n";

    #[test]
    fn code_block_extraction() {
        assert_eq!(extract_code_block("Here:\n```python\nx = 1\n```\nDone."), "x = 1");
        assert_eq!(extract_code_block("```\nfirst\n```\n```\nsecond\n```"), "first");
        assert_eq!(extract_code_block("no fences"), "no fences");
    }

    #[test]
    fn receive_previews_with_markers_and_annotations() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        let suggested = "a = 1\nb = 20\nc = 3\n";
        let spans = engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, suggested));

        assert_eq!(doc.text(), suggested);
        assert_eq!(engine.preview(), Some(Preview::Suggested));
        assert_eq!(spans.len(), 2);
        assert_eq!(doc.markers().len(), 1);
        assert_eq!(doc.markers()[0].rows(), 1..=1);
        assert_eq!(
            doc.annotations(),
            [Annotation {
                row: 1,
                text: CHANGE_ANNOTATION.into()
            }]
        );
    }

    #[test]
    fn preview_toggle_clears_and_redraws() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, "x\n"));

        engine.show_original(&mut doc).unwrap();
        assert_eq!(doc.text(), ORIGINAL);
        assert!(doc.markers().is_empty() && doc.annotations().is_empty());
        assert_eq!(engine.preview(), Some(Preview::Original));

        engine.show_suggested(&mut doc).unwrap();
        assert_eq!(doc.text(), "x\n");
        assert!(!doc.markers().is_empty());
        assert_eq!(engine.preview(), Some(Preview::Suggested));
    }

    #[test]
    fn accept_whole_replaces_text_and_goes_idle() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, "new\n"));
        engine.show_original(&mut doc).unwrap();

        assert_eq!(engine.accept(&mut doc).unwrap(), "new\n");
        assert_eq!(doc.text(), "new\n");
        assert!(doc.markers().is_empty());
        assert!(engine.pending().is_none());
    }

    #[test]
    fn accept_scoped_replaces_only_the_range() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        let s = PendingSuggestion::scoped(ORIGINAL, range(1, 4, 1, 5), "22").unwrap();
        assert_eq!(s.suggested, "a = 1\nb = 22\nc = 3\n");

        engine.receive(&mut doc, s);
        // Accepting from the suggested preview must not apply the range twice
        assert_eq!(engine.accept(&mut doc).unwrap(), "a = 1\nb = 22\nc = 3\n");
        assert_eq!(doc.text(), "a = 1\nb = 22\nc = 3\n");
    }

    #[test]
    fn reject_scoped_restores_text_and_selection() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        let sel = range(0, 0, 1, 5);
        doc.set_selection(Some(sel));
        engine.receive(
            &mut doc,
            PendingSuggestion::scoped(ORIGINAL, sel, "z = 0").unwrap(),
        );
        assert_eq!(doc.text(), "z = 0\nc = 3\n");

        assert_eq!(engine.reject(&mut doc).unwrap(), ORIGINAL);
        assert_eq!(doc.text(), ORIGINAL);
        assert_eq!(doc.selection(), Some(sel));
        assert!(doc.markers().is_empty());
        assert!(engine.pending().is_none());
    }

    #[test]
    fn transitions_without_pending_fail_and_change_nothing() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        assert_eq!(engine.accept(&mut doc), Err(ApplyFailure::NoPendingSuggestion));
        assert_eq!(engine.reject(&mut doc), Err(ApplyFailure::NoPendingSuggestion));
        assert_eq!(engine.show_original(&mut doc), Err(ApplyFailure::NoPendingSuggestion));
        assert_eq!(engine.show_suggested(&mut doc), Err(ApplyFailure::NoPendingSuggestion));
        assert_eq!(doc.text(), ORIGINAL);
    }

    #[test]
    fn new_suggestion_replaces_pending_one() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, "first\n"));
        engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, "second\n"));
        assert_eq!(engine.accept(&mut doc).unwrap(), "second\n");
    }

    #[test]
    fn reject_after_earlier_accept_keeps_accepted_text() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, "v2\n"));
        engine.accept(&mut doc).unwrap();

        let current = doc.text();
        engine.receive(&mut doc, PendingSuggestion::whole(current, "v3\n"));
        engine.reject(&mut doc).unwrap();
        assert_eq!(doc.text(), "v2\n");
    }

    #[test]
    fn out_of_range_selection_is_refused() {
        assert_eq!(
            PendingSuggestion::scoped("one line", range(3, 0, 3, 1), "x"),
            Err(ApplyFailure::InvalidRange)
        );
    }

    #[test]
    fn pure_helpers_agree_with_engine() {
        let s = PendingSuggestion::scoped(ORIGINAL, range(2, 0, 2, 5), "c = 30").unwrap();
        assert_eq!(apply_suggestion(&s).unwrap(), s.suggested);
        assert_eq!(reject_suggestion(&s), ORIGINAL);
    }

    #[test]
    fn discard_clears_markers_only() {
        let mut engine = ChangeEngine::new();
        let mut doc = TextDocument::new(ORIGINAL);
        engine.receive(&mut doc, PendingSuggestion::whole(ORIGINAL, "x\n"));
        engine.discard(&mut doc);
        assert!(engine.pending().is_none());
        assert!(doc.markers().is_empty());
        assert_eq!(doc.text(), "x\n");
    }
}

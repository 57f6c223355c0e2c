//! User actions routed to the console session and the change engine.
//!
//! The controller is the only owner of [`WorkspaceState`]; the session and
//! the engine see just what each call hands them.

use std::path::Path;
use std::sync::Arc;

use crate::backend::{AssistReply, AssistRequest, AssistantService, ExecutionBackend, WorkspaceStore};
use crate::diff::{DiffStats, lines, unified_listing};
use crate::document::{DocumentView, TextDocument};
use crate::error::{ApplyFailure, WorkbenchError};
use crate::feedback::{FeedbackLog, Sender};
use crate::history::HistoryDirection;
use crate::render::Renderer;
use crate::session::SessionSync;
use crate::suggestion::{ChangeEngine, PendingSuggestion, SuggestionScope, extract_code_block};

const ASSIST_ERROR_MAX_CHARS: usize = 150;

pub const MSG_APPLIED: &str = "Changes applied! Click Save to make them permanent.";
pub const MSG_SELECTION_APPLIED: &str = "Selection changes applied! Click Save to make them permanent.";
pub const MSG_REJECTED: &str = "Changes rejected. The original code has been restored.";
pub const MSG_SELECTION_REJECTED: &str =
    "Selection changes rejected. The original code has been restored.";
pub const MSG_APPLY_FAILED: &str = "Error: Could not apply changes.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceState {
    pub current_file: Option<String>,
    pub current_project: Option<Project>,
    /// Document differs from what was last loaded or saved
    pub unsaved: bool,
}

pub struct WorkspaceController<B, R, D = TextDocument>
where
    B: ExecutionBackend + WorkspaceStore + AssistantService + 'static,
    R: Renderer + 'static,
    D: DocumentView,
{
    backend: Arc<B>,
    session: SessionSync<B, R>,
    engine: ChangeEngine,
    document: D,
    state: WorkspaceState,
    feedback: FeedbackLog,
}

impl<B, R, D> WorkspaceController<B, R, D>
where
    B: ExecutionBackend + WorkspaceStore + AssistantService + 'static,
    R: Renderer + 'static,
    D: DocumentView,
{
    pub fn new(backend: Arc<B>, session: SessionSync<B, R>, document: D) -> Self {
        Self {
            backend,
            session,
            engine: ChangeEngine::new(),
            document,
            state: WorkspaceState::default(),
            feedback: FeedbackLog::default(),
        }
    }

    pub fn state(&self) -> &WorkspaceState {
        &self.state
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Direct editor access. Callers that change the text should follow up
    /// with [`mark_edited`](Self::mark_edited).
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn session(&self) -> &SessionSync<B, R> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionSync<B, R> {
        &mut self.session
    }

    pub fn engine(&self) -> &ChangeEngine {
        &self.engine
    }

    pub fn feedback(&self) -> &FeedbackLog {
        &self.feedback
    }

    /// Editor tab title: file name plus ` *` while unsaved.
    pub fn title(&self) -> String {
        let name = self
            .state
            .current_file
            .as_deref()
            .map(|f| {
                Path::new(f)
                    .file_name()
                    .map_or_else(|| f.to_string(), |n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "untitled".to_string());
        if self.state.unsaved {
            format!("{name} *")
        } else {
            name
        }
    }

    // -- files and projects ---------------------------------------------------

    /// Load `path` into the editor. A pending suggestion belongs to the file it
    /// was made for, so it is discarded.
    pub async fn open_file(&mut self, path: &str) -> Result<(), WorkbenchError> {
        let content = match self.backend.load_file(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path, error = %e, "failed to load file");
                self.feedback
                    .push(Sender::System, format!("Error loading file: {e}"));
                return Err(e.into());
            }
        };
        self.engine.discard(&mut self.document);
        self.document.set_text(&content);
        self.state.current_file = Some(path.to_string());
        self.state.unsaved = false;
        tracing::info!(path, "file opened");
        Ok(())
    }

    pub fn mark_edited(&mut self) {
        if self.state.current_file.is_some() {
            self.state.unsaved = true;
        }
    }

    pub async fn save_current_file(&mut self) -> Result<(), WorkbenchError> {
        let Some(path) = self.state.current_file.clone() else {
            return Err(ApplyFailure::NoDocument.into());
        };
        self.backend.save_file(&path, &self.document.text()).await?;
        self.state.unsaved = false;
        tracing::info!(path, "file saved");
        Ok(())
    }

    pub fn select_project(&mut self, name: &str, dir: &str) {
        self.state.current_project = Some(Project {
            name: name.to_string(),
            dir: dir.to_string(),
        });
        self.session.set_working_dir(Some(dir.to_string()));
    }

    // -- console ----------------------------------------------------------------

    /// Save the open file, then run it.
    pub async fn run_current_file(&mut self) -> Result<(), WorkbenchError> {
        let project_dir = self.state.current_project.as_ref().map(|p| p.dir.as_str());
        let Some(path) = self
            .session
            .runnable_path(self.state.current_file.as_deref(), project_dir)
        else {
            return Err(WorkbenchError::InputRejected);
        };
        if let Err(e) = self.save_current_file().await {
            self.session.print(&format!("Error saving file: {e}\n"));
            return Err(e);
        }
        self.session.run_file(&path).await
    }

    pub async fn submit_command(&mut self, raw: &str) -> Result<(), WorkbenchError> {
        self.session.submit_command(raw).await
    }

    pub fn navigate_history(&mut self, direction: HistoryDirection) -> String {
        self.session.navigate_history(direction)
    }

    pub async fn clear_console(&mut self) -> Result<(), WorkbenchError> {
        let result = self.session.clear().await;
        if let Err(e) = &result {
            self.feedback
                .push(Sender::System, format!("Could not clear the console: {e}"));
        }
        result
    }

    pub fn start_polling(&mut self) {
        self.session.start_polling();
    }

    pub fn stop_polling(&mut self) {
        self.session.stop_polling();
    }

    // -- assistant ----------------------------------------------------------------

    fn assist_request(&self, prompt: &str) -> AssistRequest {
        let mut request = AssistRequest {
            prompt: prompt.to_string(),
            ..Default::default()
        };
        let Some(path) = &self.state.current_file else {
            return request;
        };
        request.file_path = Some(path.clone());

        // While a suggestion is pending the editor shows its preview; the
        // next request is still about the text the file actually holds
        let (content, selection) = match self.engine.pending() {
            Some(pending) => {
                let selection = match &pending.scope {
                    SuggestionScope::Selection { range, .. } => Some((
                        *range,
                        TextDocument::new(&pending.original).read_range(*range),
                    )),
                    SuggestionScope::Whole => None,
                };
                (pending.original.clone(), selection)
            }
            None => (
                self.document.text(),
                self.document
                    .selection()
                    .map(|range| (range, self.document.read_range(range))),
            ),
        };
        request.file_content = Some(content);
        if let Some((range, selected)) = selection
            && !selected.is_empty()
        {
            request.selected_text = Some(selected);
            request.selected_range = Some(range.ordered().into());
        }
        if let Some(project) = &self.state.current_project {
            request.project_structure = Some(serde_json::json!({
                "name": project.name,
                "path": project.dir,
            }));
        }
        request
    }

    /// Ask the assistant about the open file (or in general when none is
    /// open). A reply carrying code becomes the pending suggestion.
    pub async fn send_prompt(&mut self, prompt: &str) -> Result<(), WorkbenchError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(WorkbenchError::InputRejected);
        }
        self.feedback.push(Sender::User, prompt);

        let request = self.assist_request(prompt);
        let original = request.file_content.clone();
        let reply = match self.backend.suggest(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "assistant request failed");
                let msg = truncate_chars(&e.to_string(), ASSIST_ERROR_MAX_CHARS);
                self.feedback.push(
                    Sender::Assistant,
                    format!("Sorry, I encountered an error: {msg}"),
                );
                return Err(e.into());
            }
        };
        self.feedback.push(Sender::Assistant, reply.response.clone());

        match (original, self.state.current_file.clone()) {
            (Some(original), Some(path)) if reply.has_code_suggestion => {
                self.stage_suggestion(&path, original, &reply)
            }
            _ => Ok(()),
        }
    }

    fn stage_suggestion(
        &mut self,
        path: &str,
        original: String,
        reply: &AssistReply,
    ) -> Result<(), WorkbenchError> {
        let scoped = match (
            reply.selection_only,
            &reply.selection_replacement,
            reply.selected_range,
        ) {
            (true, Some(replacement), Some(range)) => Some(PendingSuggestion::scoped(
                original.clone(),
                range.into(),
                extract_code_block(replacement),
            )),
            _ => None,
        };
        let pending = match scoped {
            Some(Ok(pending)) => pending,
            Some(Err(e)) => {
                self.feedback.push(Sender::System, MSG_APPLY_FAILED);
                return Err(e.into());
            }
            None => {
                let Some(suggested) = reply.suggestion.as_deref() else {
                    return Ok(());
                };
                PendingSuggestion::whole(original, extract_code_block(suggested))
            }
        };

        let c = self.engine.correspond(&pending.original, &pending.suggested);
        let stats = reply
            .stats
            .as_ref()
            .map(|s| DiffStats {
                file_name: s.file_name.clone(),
                additions: s.additions,
                deletions: s.deletions,
            })
            .unwrap_or_else(|| DiffStats::new(path, &c));
        let listing = match reply.diff.as_deref() {
            Some(diff) if !diff.trim().is_empty() => diff.to_string(),
            _ => unified_listing(
                path,
                &lines(&pending.original),
                &lines(&pending.suggested),
                &c,
            ),
        };

        let spans = self.engine.receive(&mut self.document, pending);
        tracing::info!(path, %stats, spans = spans.len(), "suggestion staged");
        self.feedback
            .push(Sender::System, format!("{stats}\n{listing}"));
        Ok(())
    }

    pub fn show_original(&mut self) -> Result<(), WorkbenchError> {
        self.engine
            .show_original(&mut self.document)
            .map_err(|e| self.apply_failed(e))
    }

    pub fn show_suggested(&mut self) -> Result<(), WorkbenchError> {
        self.engine
            .show_suggested(&mut self.document)
            .map_err(|e| self.apply_failed(e))
    }

    pub fn accept_suggestion(&mut self) -> Result<(), WorkbenchError> {
        if self.state.current_file.is_none() {
            return Err(self.apply_failed(ApplyFailure::NoDocument));
        }
        let scoped = self.engine.pending().is_some_and(PendingSuggestion::is_scoped);
        self.engine
            .accept(&mut self.document)
            .map_err(|e| self.apply_failed(e))?;
        self.state.unsaved = true;
        let msg = if scoped { MSG_SELECTION_APPLIED } else { MSG_APPLIED };
        self.feedback.push(Sender::Assistant, msg);
        Ok(())
    }

    pub fn reject_suggestion(&mut self) -> Result<(), WorkbenchError> {
        let scoped = self.engine.pending().is_some_and(PendingSuggestion::is_scoped);
        self.engine
            .reject(&mut self.document)
            .map_err(|e| self.apply_failed(e))?;
        let msg = if scoped { MSG_SELECTION_REJECTED } else { MSG_REJECTED };
        self.feedback.push(Sender::Assistant, msg);
        Ok(())
    }

    fn apply_failed(&mut self, failure: ApplyFailure) -> WorkbenchError {
        tracing::debug!(%failure, "suggestion transition refused");
        self.feedback.push(Sender::System, MSG_APPLY_FAILED);
        failure.into()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

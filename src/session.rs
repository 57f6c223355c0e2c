//! Console session: command submission, history and output synchronisation.
//!
//! The backend owns the output buffer. The session keeps a mirror of the last
//! snapshot it rendered and re-renders the whole display only when a fetched
//! snapshot differs from it. Every fetch carries a sequence number; a response
//! older than the newest one already applied is dropped, so an out-of-order
//! reply can never roll the display back.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::{BufferSnapshot, ExecutionBackend};
use crate::dispatch::{CommandDispatcher, Dispatch, is_runnable, resolve_in_project};
use crate::error::{BackendError, WorkbenchError};
use crate::history::{CommandHistory, HistoryDirection};
use crate::render::Renderer;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a completed fetch did to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Rendered,
    Unchanged,
    /// An equal or newer response was already applied, or a clear happened since.
    Stale,
    /// Backend answered but the buffer is not readable yet.
    NotReady,
    Failed,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct SyncShared<R> {
    mirror: String,
    /// Last sequence number handed to a fetch.
    issued: u64,
    /// Responses with a sequence number at or below this are stale.
    applied: u64,
    poll_failing: bool,
    renderer: R,
}

impl<R: Renderer> SyncShared<R> {
    fn print(&mut self, text: &str) {
        let markup = self.renderer.translate(text);
        self.renderer.append(&markup);
    }

    fn apply(&mut self, seq: u64, result: Result<BufferSnapshot, BackendError>) -> PollOutcome {
        if seq <= self.applied {
            return PollOutcome::Stale;
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // One console line per failure streak; the poller keeps going
                if !self.poll_failing {
                    self.poll_failing = true;
                    tracing::warn!(error = %e, "terminal poll failed");
                    self.print(&format!("Error: {e}\n"));
                }
                return PollOutcome::Failed;
            }
        };
        self.poll_failing = false;
        if !snapshot.status.is_empty() && snapshot.status != "success" {
            return PollOutcome::NotReady;
        }
        self.applied = seq;
        if snapshot.buffer == self.mirror {
            return PollOutcome::Unchanged;
        }
        self.mirror = snapshot.buffer;
        let markup = self.renderer.translate(&self.mirror);
        self.renderer.replace(&markup);
        PollOutcome::Rendered
    }
}

struct Poller {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// SessionSync
// ---------------------------------------------------------------------------

pub struct SessionSync<B: ExecutionBackend + 'static, R: Renderer + 'static> {
    backend: Arc<B>,
    shared: Arc<Mutex<SyncShared<R>>>,
    history: CommandHistory,
    dispatcher: CommandDispatcher,
    runnable_extensions: Vec<String>,
    working_dir: Option<String>,
    poll_interval: Duration,
    poller: Option<Poller>,
}

impl<B: ExecutionBackend + 'static, R: Renderer + 'static> SessionSync<B, R> {
    pub fn new(backend: Arc<B>, renderer: R) -> Self {
        Self {
            backend,
            shared: Arc::new(Mutex::new(SyncShared {
                mirror: String::new(),
                issued: 0,
                applied: 0,
                poll_failing: false,
                renderer,
            })),
            history: CommandHistory::new(),
            dispatcher: CommandDispatcher::new(vec!["python".into(), "py".into()]),
            runnable_extensions: vec![".py".into()],
            working_dir: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poller: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: CommandDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_runnable_extensions(mut self, extensions: Vec<String>) -> Self {
        self.runnable_extensions = extensions;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Directory commands and files run in. Follows the selected project.
    pub fn set_working_dir(&mut self, dir: Option<String>) {
        self.working_dir = dir;
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Snapshot last rendered from the backend.
    pub fn mirror(&self) -> String {
        self.shared.lock().mirror.clone()
    }

    pub fn with_renderer<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.shared.lock().renderer)
    }

    /// Append a local line to the display without touching the mirror.
    pub fn print(&self, text: &str) {
        self.shared.lock().print(text);
    }

    // -- commands -----------------------------------------------------------

    pub async fn submit_command(&mut self, raw: &str) -> Result<(), WorkbenchError> {
        let command = raw.trim();
        if command.is_empty() {
            return Err(WorkbenchError::InputRejected);
        }
        self.history.push(command);
        self.print(&format!("$ {command}\n"));

        match self.dispatcher.classify(command) {
            Dispatch::RunFile(path) => self.run_file(&path).await,
            Dispatch::Shell(line) => {
                tracing::debug!(command = %line, "running shell command");
                let result = self
                    .backend
                    .run_command(&line, self.working_dir.as_deref())
                    .await;
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "command failed to start");
                    self.print(&format!("Error: {e}\n"));
                }
                result.map(|_| ()).map_err(Into::into)
            }
        }
    }

    pub async fn run_file(&self, path: &str) -> Result<(), WorkbenchError> {
        if path.is_empty() {
            self.print("Error: No file path provided\n");
            return Err(WorkbenchError::InputRejected);
        }

        match self.backend.file_exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                self.print(&format!("Error: File not found at path: {path}\n"));
                return Err(WorkbenchError::NotFound(path.to_string()));
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "file probe failed");
                self.print(&format!("Error checking file: {e}\n"));
                return Err(e.into());
            }
        }

        tracing::info!(path, working_dir = ?self.working_dir, "running file");
        if let Err(e) = self
            .backend
            .run_file(path, self.working_dir.as_deref())
            .await
        {
            tracing::warn!(path, error = %e, "file execution failed");
            self.print(&format!("Error executing file: {e}\n"));
            return Err(e.into());
        }
        Ok(())
    }

    /// Check that `file` can be run and resolve it against the project
    /// directory. Prints the reason and returns `None` otherwise.
    pub fn runnable_path(&self, file: Option<&str>, project_dir: Option<&str>) -> Option<String> {
        let Some(file) = file else {
            self.print("No file is currently open.\n");
            return None;
        };
        if !is_runnable(file, &self.runnable_extensions) {
            self.print("Only Python files can be executed directly.\n");
            return None;
        }
        Some(resolve_in_project(file, project_dir))
    }

    pub async fn run_current_file(
        &self,
        file: Option<&str>,
        project_dir: Option<&str>,
    ) -> Result<(), WorkbenchError> {
        match self.runnable_path(file, project_dir) {
            Some(path) => self.run_file(&path).await,
            None => Err(WorkbenchError::InputRejected),
        }
    }

    pub async fn run_code(&self, code: &str) -> Result<(), WorkbenchError> {
        if let Err(e) = self
            .backend
            .run_code(code, self.working_dir.as_deref())
            .await
        {
            tracing::warn!(error = %e, "code execution failed");
            self.print(&format!("Error: {e}\n"));
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop the running process, printing a notice when there is none.
    pub async fn kill(&self) -> Result<(), WorkbenchError> {
        match self.backend.kill().await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.print("No process is running.\n");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "kill failed");
                self.print(&format!("Error: {e}\n"));
                Err(e.into())
            }
        }
    }

    pub fn navigate_history(&mut self, direction: HistoryDirection) -> String {
        self.history.navigate(direction).to_string()
    }

    /// Clear the backend buffer. The display and mirror are reset only once
    /// the backend confirms, and every poll issued before that is invalidated.
    pub async fn clear(&self) -> Result<(), WorkbenchError> {
        match self.backend.clear().await {
            Ok(()) => {
                let mut shared = self.shared.lock();
                shared.mirror.clear();
                shared.renderer.replace("");
                shared.applied = shared.issued;
                tracing::debug!(watermark = shared.applied, "terminal cleared");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "clear failed, display left as is");
                Err(e.into())
            }
        }
    }

    // -- polling ------------------------------------------------------------

    /// Hand out the sequence number for a new fetch.
    pub fn issue_poll(&self) -> u64 {
        let mut shared = self.shared.lock();
        shared.issued += 1;
        shared.issued
    }

    /// Apply the response of fetch `seq`.
    pub fn complete_poll(
        &self,
        seq: u64,
        result: Result<BufferSnapshot, BackendError>,
    ) -> PollOutcome {
        self.shared.lock().apply(seq, result)
    }

    /// One fetch, start to finish.
    pub async fn poll(&self) -> PollOutcome {
        let seq = self.issue_poll();
        let result = self.backend.fetch_buffer().await;
        self.complete_poll(seq, result)
    }

    /// Poll on a fixed interval until stopped. Replaces any running poller.
    /// Each tick's fetch runs on its own task, so a slow response never
    /// delays the next tick.
    pub fn start_polling(&mut self) {
        self.stop_polling();

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let backend = self.backend.clone();
        let shared = self.shared.clone();
        let period = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let seq = {
                            let mut s = shared.lock();
                            s.issued += 1;
                            s.issued
                        };
                        let backend = backend.clone();
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            let result = backend.fetch_buffer().await;
                            let outcome = shared.lock().apply(seq, result);
                            tracing::trace!(seq, ?outcome, "poll completed");
                        });
                    }
                }
            }
            tracing::debug!("terminal poller stopped");
        });

        tracing::debug!(interval_ms = period.as_millis() as u64, "terminal poller started");
        self.poller = Some(Poller { shutdown, handle });
    }

    pub fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            let _ = poller.shutdown.send(());
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }
}

impl<B: ExecutionBackend + 'static, R: Renderer + 'static> Drop for SessionSync<B, R> {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{Call, FakeBackend};
    use crate::markup::render_markup;
    use crate::render::HtmlRenderer;

    fn session() -> (Arc<FakeBackend>, SessionSync<FakeBackend, HtmlRenderer>) {
        let backend = Arc::new(FakeBackend::new());
        let session = SessionSync::new(backend.clone(), HtmlRenderer::new());
        (backend, session)
    }

    fn html(session: &SessionSync<FakeBackend, HtmlRenderer>) -> String {
        session.with_renderer(|r| r.html().to_string())
    }

    fn snapshot(buffer: &str) -> Result<BufferSnapshot, BackendError> {
        Ok(BufferSnapshot {
            status: "success".into(),
            buffer: buffer.into(),
        })
    }

    // -- submission ---------------------------------------------------------

    #[tokio::test]
    async fn blank_command_is_ignored() {
        let (backend, mut session) = session();
        for raw in ["", "   ", "\t\n"] {
            assert_eq!(
                session.submit_command(raw).await,
                Err(WorkbenchError::InputRejected)
            );
        }
        assert!(session.history().is_empty());
        assert!(backend.calls().is_empty());
        assert_eq!(html(&session), "");
    }

    #[tokio::test]
    async fn shell_command_echoes_and_runs_in_working_dir() {
        let (backend, mut session) = session();
        session.set_working_dir(Some("uploaded_projects/Game".into()));
        session.submit_command("  ls -la ").await.unwrap();

        assert_eq!(session.history().entries(), ["ls -la"]);
        assert_eq!(session.history().cursor(), 1);
        assert_eq!(html(&session), render_markup("$ ls -la\n"));
        assert_eq!(
            backend.calls(),
            vec![Call::RunCommand {
                command: "ls -la".into(),
                working_dir: Some("uploaded_projects/Game".into()),
            }]
        );
    }

    #[tokio::test]
    async fn interpreter_command_probes_then_runs_file() {
        let (backend, mut session) = session();
        backend.add_file("main.py", "print('hi')");
        session.submit_command("python main.py").await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                Call::Exists("main.py".into()),
                Call::RunFile {
                    path: "main.py".into(),
                    working_dir: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn interpreter_command_with_args_goes_to_shell() {
        let (backend, mut session) = session();
        session.submit_command("python main.py --fast").await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![Call::RunCommand {
                command: "python main.py --fast".into(),
                working_dir: None,
            }]
        );
    }

    #[tokio::test]
    async fn missing_file_never_reaches_execute() {
        let (backend, mut session) = session();
        let err = session.submit_command("python gone.py").await.unwrap_err();
        assert_eq!(err, WorkbenchError::NotFound("gone.py".into()));
        assert_eq!(backend.calls(), vec![Call::Exists("gone.py".into())]);
        assert!(html(&session).ends_with(&render_markup("Error: File not found at path: gone.py\n")));
    }

    #[tokio::test]
    async fn probe_and_execute_failures_are_reported() {
        let (backend, session) = session();
        backend.fail_probe(Some(BackendError::Transport("connection refused".into())));
        assert!(session.run_file("a.py").await.is_err());
        assert!(html(&session).contains(&render_markup("Error checking file: connection refused\n")));

        backend.fail_probe(None);
        backend.add_file("a.py", "");
        backend.fail_run(Some(BackendError::Status(500)));
        assert!(session.run_file("a.py").await.is_err());
        assert!(html(&session).contains(&render_markup("Error executing file: Server error: 500\n")));
    }

    #[tokio::test]
    async fn empty_path_is_reported_without_backend_call() {
        let (backend, session) = session();
        assert!(session.run_file("").await.is_err());
        assert!(backend.calls().is_empty());
        assert_eq!(html(&session), render_markup("Error: No file path provided\n"));
    }

    #[tokio::test]
    async fn shell_failure_is_reported() {
        let (backend, mut session) = session();
        backend.fail_run(Some(BackendError::Rejected("No command provided".into())));
        assert!(session.submit_command("ls").await.is_err());
        assert!(html(&session).ends_with(&render_markup("Error: No command provided\n")));
    }

    #[tokio::test]
    async fn run_current_file_checks_and_resolves() {
        let (backend, session) = session();
        assert!(session.run_current_file(None, None).await.is_err());
        assert!(html(&session).contains(&render_markup("No file is currently open.\n")));

        assert!(session.run_current_file(Some("notes.md"), None).await.is_err());
        assert!(html(&session).contains(&render_markup("Only Python files can be executed directly.\n")));
        assert!(backend.calls().is_empty());

        backend.add_file("proj/main.py", "");
        session
            .run_current_file(Some("main.py"), Some("proj"))
            .await
            .unwrap();
        assert_eq!(
            backend.actions().last(),
            Some(&Call::RunFile {
                path: "proj/main.py".into(),
                working_dir: None,
            })
        );
    }

    #[tokio::test]
    async fn run_code_submits_snippet() {
        let (backend, session) = session();
        session.run_code("print(1)").await.unwrap();
        assert_eq!(backend.calls(), vec![Call::RunCode { code: "print(1)".into() }]);
    }

    #[tokio::test]
    async fn history_navigation_through_session() {
        let (_backend, mut session) = session();
        session.submit_command("ls").await.unwrap();
        session.submit_command("pwd").await.unwrap();
        assert_eq!(session.navigate_history(HistoryDirection::Up), "pwd");
        assert_eq!(session.navigate_history(HistoryDirection::Up), "ls");
        assert_eq!(session.navigate_history(HistoryDirection::Down), "pwd");
        assert_eq!(session.navigate_history(HistoryDirection::Down), "");
    }

    // -- polling ------------------------------------------------------------

    #[tokio::test]
    async fn poll_renders_only_when_buffer_changes() {
        let (backend, session) = session();
        backend.set_buffer("hello\n");
        assert_eq!(session.poll().await, PollOutcome::Rendered);
        assert_eq!(session.poll().await, PollOutcome::Unchanged);
        assert_eq!(session.with_renderer(|r| r.replacements()), 1);
        assert_eq!(html(&session), render_markup("hello\n"));

        backend.set_buffer("hello\nworld\n");
        assert_eq!(session.poll().await, PollOutcome::Rendered);
        assert_eq!(session.mirror(), "hello\nworld\n");
        assert_eq!(session.with_renderer(|r| r.replacements()), 2);
    }

    #[test]
    fn out_of_order_response_is_discarded() {
        let (_backend, session) = session();
        let first = session.issue_poll();
        let second = session.issue_poll();
        assert_eq!(session.complete_poll(second, snapshot("a\nb\n")), PollOutcome::Rendered);
        assert_eq!(session.complete_poll(first, snapshot("a\n")), PollOutcome::Stale);
        assert_eq!(session.mirror(), "a\nb\n");
    }

    #[test]
    fn in_order_responses_under_overlap_still_apply() {
        let (_backend, session) = session();
        let first = session.issue_poll();
        let second = session.issue_poll();
        let third = session.issue_poll();
        assert_eq!(session.complete_poll(first, snapshot("1")), PollOutcome::Rendered);
        assert_eq!(session.complete_poll(second, snapshot("12")), PollOutcome::Rendered);
        assert_eq!(session.complete_poll(third, snapshot("12")), PollOutcome::Unchanged);
    }

    #[test]
    fn not_ready_status_leaves_display() {
        let (_backend, session) = session();
        let seq = session.issue_poll();
        let result = Ok(BufferSnapshot {
            status: "pending".into(),
            buffer: "x".into(),
        });
        assert_eq!(session.complete_poll(seq, result), PollOutcome::NotReady);
        assert_eq!(session.mirror(), "");
    }

    #[tokio::test]
    async fn poll_failures_print_once_per_streak() {
        let (backend, session) = session();
        backend.fail_fetch(Some(BackendError::Transport("connection refused".into())));
        assert_eq!(session.poll().await, PollOutcome::Failed);
        assert_eq!(session.poll().await, PollOutcome::Failed);
        let line = render_markup("Error: connection refused\n");
        assert_eq!(html(&session), line);

        backend.fail_fetch(None);
        backend.set_buffer("back\n");
        assert_eq!(session.poll().await, PollOutcome::Rendered);

        backend.fail_fetch(Some(BackendError::Transport("connection refused".into())));
        session.poll().await;
        assert!(html(&session).ends_with(&line));
    }

    // -- clear --------------------------------------------------------------

    #[tokio::test]
    async fn clear_resets_display_after_success() {
        let (backend, session) = session();
        backend.set_buffer("old output\n");
        session.poll().await;

        session.clear().await.unwrap();
        assert_eq!(html(&session), "");
        assert_eq!(session.mirror(), "");
        assert_eq!(backend.calls().last(), Some(&Call::Clear));
    }

    #[tokio::test]
    async fn clear_invalidates_polls_issued_before_it() {
        let (_backend, session) = session();
        let before = session.issue_poll();
        session.clear().await.unwrap();
        assert_eq!(session.complete_poll(before, snapshot("pre-clear\n")), PollOutcome::Stale);
        assert_eq!(html(&session), "");

        let after = session.issue_poll();
        assert_eq!(session.complete_poll(after, snapshot("fresh\n")), PollOutcome::Rendered);
    }

    #[tokio::test]
    async fn failed_clear_leaves_display_and_mirror() {
        let (backend, session) = session();
        backend.set_buffer("keep me\n");
        session.poll().await;
        let before = html(&session);

        backend.fail_clear(Some(BackendError::Status(500)));
        let err = session.clear().await.unwrap_err();
        assert_eq!(err, WorkbenchError::Backend(BackendError::Status(500)));
        assert_eq!(html(&session), before);
        assert_eq!(session.mirror(), "keep me\n");
    }

    #[tokio::test]
    async fn kill_stops_running_process_quietly() {
        let (backend, mut session) = session();
        session.submit_command("sleep 10").await.unwrap();
        session.kill().await.unwrap();
        assert_eq!(html(&session), render_markup("$ sleep 10\n"));

        session.kill().await.unwrap();
        assert_eq!(
            html(&session),
            render_markup("$ sleep 10\nNo process is running.\n")
        );
        assert_eq!(
            backend.actions().iter().filter(|c| **c == Call::Kill).count(),
            2
        );
    }

    #[tokio::test]
    async fn failed_kill_is_printed() {
        let (backend, session) = session();
        backend.fail_kill(Some(BackendError::Status(502)));
        let err = session.kill().await.unwrap_err();
        assert_eq!(err, WorkbenchError::Backend(BackendError::Status(502)));
        assert_eq!(html(&session), render_markup("Error: Server error: 502\n"));
    }

    // -- poller lifecycle -----------------------------------------------------

    #[tokio::test]
    async fn poller_tracks_buffer_until_stopped() {
        let (backend, session) = session();
        let mut session = session.with_poll_interval(Duration::from_millis(10));
        backend.set_buffer("tick\n");

        session.start_polling();
        assert!(session.is_polling());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(session.mirror(), "tick\n");

        session.stop_polling();
        assert!(!session.is_polling());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fetches = backend.calls().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.calls().len(), fetches);
    }

    #[tokio::test]
    async fn restarting_keeps_a_single_poller() {
        let (backend, session) = session();
        let mut session = session.with_poll_interval(Duration::from_millis(20));
        session.start_polling();
        session.start_polling();
        tokio::time::sleep(Duration::from_millis(110)).await;
        session.stop_polling();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // One poller at 20ms fires about six times in 110ms; two would double that
        let fetches = backend.calls().iter().filter(|c| **c == Call::Fetch).count();
        assert!((3..=8).contains(&fetches), "fetches = {fetches}");
    }
}

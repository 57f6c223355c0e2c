//! Scripted in-memory backend for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AssistReply, AssistRequest, AssistantService, BufferSnapshot, ExecutionBackend, RunOutcome,
    WorkspaceStore,
};
use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    RunCommand {
        command: String,
        working_dir: Option<String>,
    },
    RunFile {
        path: String,
        working_dir: Option<String>,
    },
    RunCode {
        code: String,
    },
    Fetch,
    Clear,
    Kill,
    Exists(String),
    Load(String),
    Save {
        path: String,
        content: String,
    },
    Suggest(AssistRequest),
}

#[derive(Default)]
struct FakeState {
    buffer: String,
    fetch_error: Option<BackendError>,
    clear_error: Option<BackendError>,
    run_error: Option<BackendError>,
    kill_error: Option<BackendError>,
    running: bool,
    probe_error: Option<BackendError>,
    save_error: Option<BackendError>,
    existing: HashSet<String>,
    files: HashMap<String, String>,
    replies: VecDeque<Result<AssistReply, BackendError>>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_buffer(&self, text: &str) {
        self.state.lock().buffer = text.to_string();
    }

    pub(crate) fn fail_fetch(&self, err: Option<BackendError>) {
        self.state.lock().fetch_error = err;
    }

    pub(crate) fn fail_clear(&self, err: Option<BackendError>) {
        self.state.lock().clear_error = err;
    }

    pub(crate) fn fail_run(&self, err: Option<BackendError>) {
        self.state.lock().run_error = err;
    }

    pub(crate) fn fail_kill(&self, err: Option<BackendError>) {
        self.state.lock().kill_error = err;
    }

    pub(crate) fn fail_probe(&self, err: Option<BackendError>) {
        self.state.lock().probe_error = err;
    }

    pub(crate) fn fail_save(&self, err: Option<BackendError>) {
        self.state.lock().save_error = err;
    }

    pub(crate) fn add_file(&self, path: &str, content: &str) {
        let mut state = self.state.lock();
        state.existing.insert(path.to_string());
        state.files.insert(path.to_string(), content.to_string());
    }

    pub(crate) fn file(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    pub(crate) fn push_reply(&self, reply: Result<AssistReply, BackendError>) {
        self.state.lock().replies.push_back(reply);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Calls other than buffer fetches, which pollers issue continuously.
    pub(crate) fn actions(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| *c != Call::Fetch).collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn started(&self) -> Result<RunOutcome, BackendError> {
        let mut state = self.state.lock();
        match state.run_error.clone() {
            Some(e) => Err(e),
            None => {
                state.running = true;
                Ok(RunOutcome { pid: Some(1) })
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        self.record(Call::RunCommand {
            command: command.to_string(),
            working_dir: working_dir.map(str::to_string),
        });
        self.started()
    }

    async fn run_file(
        &self,
        path: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        self.record(Call::RunFile {
            path: path.to_string(),
            working_dir: working_dir.map(str::to_string),
        });
        self.started()
    }

    async fn run_code(
        &self,
        code: &str,
        _working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        self.record(Call::RunCode {
            code: code.to_string(),
        });
        self.started()
    }

    async fn fetch_buffer(&self) -> Result<BufferSnapshot, BackendError> {
        self.record(Call::Fetch);
        let state = self.state.lock();
        match &state.fetch_error {
            Some(e) => Err(e.clone()),
            None => Ok(BufferSnapshot {
                status: "success".into(),
                buffer: state.buffer.clone(),
            }),
        }
    }

    async fn clear(&self) -> Result<(), BackendError> {
        self.record(Call::Clear);
        let mut state = self.state.lock();
        if let Some(e) = state.clear_error.clone() {
            return Err(e);
        }
        state.buffer.clear();
        Ok(())
    }

    async fn kill(&self) -> Result<bool, BackendError> {
        self.record(Call::Kill);
        let mut state = self.state.lock();
        if let Some(e) = state.kill_error.clone() {
            return Err(e);
        }
        Ok(std::mem::take(&mut state.running))
    }

    async fn file_exists(&self, path: &str) -> Result<bool, BackendError> {
        self.record(Call::Exists(path.to_string()));
        let state = self.state.lock();
        match &state.probe_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.existing.contains(path)),
        }
    }
}

#[async_trait]
impl WorkspaceStore for FakeBackend {
    async fn load_file(&self, path: &str) -> Result<String, BackendError> {
        self.record(Call::Load(path.to_string()));
        self.state
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or(BackendError::Status(404))
    }

    async fn save_file(&self, path: &str, content: &str) -> Result<(), BackendError> {
        self.record(Call::Save {
            path: path.to_string(),
            content: content.to_string(),
        });
        let mut state = self.state.lock();
        if let Some(e) = &state.save_error {
            return Err(e.clone());
        }
        state.existing.insert(path.to_string());
        state.files.insert(path.to_string(), content.to_string());
        Ok(())
    }
}

#[async_trait]
impl AssistantService for FakeBackend {
    async fn suggest(&self, request: AssistRequest) -> Result<AssistReply, BackendError> {
        self.record(Call::Suggest(request));
        self.state
            .lock()
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(AssistReply::default()))
    }
}

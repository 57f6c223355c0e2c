//! Capabilities the workbench consumes from its execution host.
//!
//! Two hosts exist: [`http::HttpBackend`] talks to a remote workbench server,
//! [`local::LocalBackend`] runs processes in-process. Both own the
//! authoritative output buffer; the client only ever reads snapshots of it.

pub mod http;
pub mod local;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Acknowledgement of a started process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    #[serde(default)]
    pub pid: Option<u32>,
}

/// One read of the authoritative output buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub buffer: String,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError>;

    async fn run_file(&self, path: &str, working_dir: Option<&str>)
    -> Result<RunOutcome, BackendError>;

    async fn run_code(&self, code: &str, working_dir: Option<&str>)
    -> Result<RunOutcome, BackendError>;

    async fn fetch_buffer(&self) -> Result<BufferSnapshot, BackendError>;

    async fn clear(&self) -> Result<(), BackendError>;

    async fn file_exists(&self, path: &str) -> Result<bool, BackendError>;

    /// Stop the process feeding the buffer. Returns whether one was running.
    /// Hosts without process control have nothing to stop.
    async fn kill(&self) -> Result<bool, BackendError> {
        Ok(false)
    }
}

/// File load/save for the editor.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn load_file(&self, path: &str) -> Result<String, BackendError>;

    async fn save_file(&self, path: &str, content: &str) -> Result<(), BackendError>;
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// Editor selection as sent over the wire (rows and columns are 0-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_range: Option<SelectedRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_structure: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistStats {
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistReply {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub has_code_suggestion: bool,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub selection_only: bool,
    #[serde(default)]
    pub selection_replacement: Option<String>,
    #[serde(default)]
    pub selected_range: Option<SelectedRange>,
    #[serde(default)]
    pub stats: Option<AssistStats>,
}

#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn suggest(&self, request: AssistRequest) -> Result<AssistReply, BackendError>;
}

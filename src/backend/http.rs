//! Remote workbench server over HTTP/JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{
    AssistReply, AssistRequest, AssistantService, BufferSnapshot, ExecutionBackend, RunOutcome,
    WorkspaceStore,
};
use crate::error::BackendError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct CommandBody<'a> {
    command: &'a str,
    working_dir: Option<&'a str>,
}

#[derive(Serialize)]
struct FileBody<'a> {
    file_path: &'a str,
    working_dir: Option<&'a str>,
}

#[derive(Serialize)]
struct CodeBody<'a> {
    code: &'a str,
    working_dir: Option<&'a str>,
}

#[derive(Serialize)]
struct SaveBody<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct SaveResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| BackendError::Transport(format!("Invalid backend URL {base_url}: {e}")))?;
        // Url::join replaces the last path segment unless the base ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, route: &str) -> Result<Url, BackendError> {
        self.base
            .join(route)
            .map_err(|e| BackendError::Transport(format!("Invalid route {route}: {e}")))
    }

    fn file_url(&self, path: &str) -> Result<Url, BackendError> {
        let mut url = self.endpoint("file")?;
        url.query_pairs_mut().append_pair("path", path);
        Ok(url)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(route)?;
        tracing::debug!(%url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, BackendError> {
        tracing::debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        decode(response).await
    }
}

/// Status check, then the `{"status": "error"}` convention, then the typed body.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Status(status.as_u16()));
    }
    let value: Value = response.json().await?;
    if value.get("status").and_then(Value::as_str) == Some("error") {
        let msg = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(BackendError::Rejected(msg.to_string()));
    }
    serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl ExecutionBackend for HttpBackend {
    async fn run_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        self.post("api/execute-command", &CommandBody { command, working_dir })
            .await
    }

    async fn run_file(
        &self,
        path: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        self.post(
            "api/execute-file",
            &FileBody {
                file_path: path,
                working_dir,
            },
        )
        .await
    }

    async fn run_code(
        &self,
        code: &str,
        working_dir: Option<&str>,
    ) -> Result<RunOutcome, BackendError> {
        self.post("api/execute-code", &CodeBody { code, working_dir })
            .await
    }

    async fn fetch_buffer(&self) -> Result<BufferSnapshot, BackendError> {
        self.get(self.endpoint("api/terminal-output")?).await
    }

    async fn clear(&self) -> Result<(), BackendError> {
        let _: Value = self.post("api/clear-terminal", &Value::Null).await?;
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool, BackendError> {
        let url = self.file_url(path)?;
        tracing::debug!(%url, "HEAD");
        let response = self.client.head(url).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(BackendError::Status(s.as_u16())),
        }
    }
}

#[async_trait]
impl WorkspaceStore for HttpBackend {
    async fn load_file(&self, path: &str) -> Result<String, BackendError> {
        let file: FileContent = self.get(self.file_url(path)?).await?;
        Ok(file.content)
    }

    async fn save_file(&self, path: &str, content: &str) -> Result<(), BackendError> {
        let result: SaveResult = self.post("save", &SaveBody { path, content }).await?;
        if result.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl AssistantService for HttpBackend {
    async fn suggest(&self, request: AssistRequest) -> Result<AssistReply, BackendError> {
        self.post("api/ai-assistant", &request).await
    }
}

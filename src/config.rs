use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::buffer::OUTPUT_BUFFER_MAX_CHARS;
use crate::session::DEFAULT_POLL_INTERVAL;

pub const CONFIG_FILE: &str = "workbench.json";
pub const BACKEND_URL_ENV: &str = "WORKBENCH_BACKEND_URL";

/// Polls faster than this would hammer the backend for no visible gain.
const MIN_POLL_INTERVAL_MS: u64 = 50;

/// Get the config directory using the platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/workbench/`
/// - Linux: `~/.config/workbench/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/workbench/`
///
/// Falls back to `~/.workbench/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("workbench"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".workbench")
        })
}

/// Load a JSON config file from `dir`, returning Default if missing or corrupt.
/// Unreadable or corrupt files are logged so a silent reset is visible.
pub(crate) fn load_json_config<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read config");
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "corrupt config, using defaults");
            T::default()
        }
    }
}

/// Write `value` as pretty JSON to `dir/filename`. The bytes go to a staging
/// file first (owner-only on Unix) that is renamed over the target.
pub(crate) fn save_json_config<T: Serialize>(
    dir: &Path,
    filename: &str,
    value: &T,
) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_vec_pretty(value)?;
    let target = dir.join(filename);
    let staging = dir.join(format!(".{filename}.{}", std::process::id()));

    write_owner_only(&staging, &json)
        .and_then(|()| std::fs::rename(&staging, &target))
        .inspect_err(|_| {
            let _ = std::fs::remove_file(&staging);
        })
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// WorkbenchConfig
// ---------------------------------------------------------------------------

/// Which execution host the console talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote workbench server
    #[default]
    Http,
    /// Child processes of this binary
    Local,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// First tokens that route `<prefix> <file>` through the run-file path
    #[serde(default = "default_interpreter_prefixes")]
    pub interpreter_prefixes: Vec<String>,
    #[serde(default = "default_runnable_extensions")]
    pub runnable_extensions: Vec<String>,
    /// Interpreter the local backend runs files and snippets with
    #[serde(default = "default_python_executable")]
    pub python_executable: String,
    #[serde(default = "default_max_buffer_chars")]
    pub max_buffer_chars: usize,
    #[serde(default)]
    pub working_dir: Option<String>,
    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_request_timeout_secs() -> u64 {
    crate::backend::http::DEFAULT_TIMEOUT_SECS
}

fn default_interpreter_prefixes() -> Vec<String> {
    vec!["python".to_string(), "py".to_string()]
}

fn default_runnable_extensions() -> Vec<String> {
    vec![".py".to_string()]
}

fn default_python_executable() -> String {
    "python3".to_string()
}

fn default_max_buffer_chars() -> usize {
    OUTPUT_BUFFER_MAX_CHARS
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            backend_url: default_backend_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            interpreter_prefixes: default_interpreter_prefixes(),
            runnable_extensions: default_runnable_extensions(),
            python_executable: default_python_executable(),
            max_buffer_chars: default_max_buffer_chars(),
            working_dir: None,
            log_filter: default_log_filter(),
        }
    }
}

impl WorkbenchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Apply environment overrides. Takes the values rather than reading the
/// environment so callers and tests stay in control.
pub fn apply_env_overrides(mut config: WorkbenchConfig, backend_url: Option<String>) -> WorkbenchConfig {
    if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
        config.backend_url = url.trim().to_string();
    }
    config
}

pub fn load_config() -> WorkbenchConfig {
    let config = load_json_config(&config_dir(), CONFIG_FILE);
    apply_env_overrides(config, std::env::var(BACKEND_URL_ENV).ok())
}

/// Record the console's working directory in the config file. Only that field
/// changes; environment overrides are never written back.
pub fn save_working_dir(working_dir: Option<String>) -> io::Result<()> {
    store_working_dir(&config_dir(), working_dir)
}

fn store_working_dir(dir: &Path, working_dir: Option<String>) -> io::Result<()> {
    let mut config: WorkbenchConfig = load_json_config(dir, CONFIG_FILE);
    config.working_dir = working_dir;
    save_json_config(dir, CONFIG_FILE, &config)
}

pub mod backend;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod diff;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod feedback;
pub mod history;
pub mod markup;
pub mod render;
pub mod session;
pub mod suggestion;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::backend::ExecutionBackend;
use crate::backend::http::HttpBackend;
use crate::backend::local::LocalBackend;
use crate::config::{BackendKind, WorkbenchConfig};
use crate::dispatch::CommandDispatcher;
use crate::error::WorkbenchError;
use crate::render::AnsiRenderer;
use crate::session::SessionSync;

/// One line typed at the console prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleInput {
    Clear,
    Kill,
    Run(String),
    Cd(String),
    History,
    Quit,
    Command(String),
}

fn parse_input(line: &str) -> ConsoleInput {
    let trimmed = line.trim();
    match trimmed {
        ":clear" => ConsoleInput::Clear,
        ":kill" => ConsoleInput::Kill,
        ":history" => ConsoleInput::History,
        ":quit" | ":q" => ConsoleInput::Quit,
        _ => {
            if let Some(file) = meta_argument(trimmed, ":run") {
                ConsoleInput::Run(file)
            } else if let Some(dir) = meta_argument(trimmed, ":cd") {
                ConsoleInput::Cd(dir)
            } else {
                ConsoleInput::Command(trimmed.to_string())
            }
        }
    }
}

/// `name` alone or followed by whitespace and an argument.
fn meta_argument(line: &str, name: &str) -> Option<String> {
    let rest = line.strip_prefix(name)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then(|| rest.trim().to_string())
}

/// Logs go to stderr so they never interleave with console output on stdout.
/// `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &WorkbenchConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

async fn console<B: ExecutionBackend + 'static>(
    backend: Arc<B>,
    config: &WorkbenchConfig,
) -> anyhow::Result<()> {
    let mut session = SessionSync::new(backend, AnsiRenderer::new(std::io::stdout()))
        .with_dispatcher(CommandDispatcher::new(config.interpreter_prefixes.clone()))
        .with_runnable_extensions(config.runnable_extensions.clone())
        .with_poll_interval(config.poll_interval());
    session.set_working_dir(config.working_dir.clone());
    session.start_polling();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let input = parse_input(&line);
        let clearing = input == ConsoleInput::Clear;
        let result = match input {
            ConsoleInput::Quit => break,
            ConsoleInput::Clear => session.clear().await,
            ConsoleInput::Kill => session.kill().await,
            ConsoleInput::Cd(dir) => {
                let dir = (!dir.is_empty()).then_some(dir);
                session.print(&format!(
                    "Working directory: {}\n",
                    dir.as_deref().unwrap_or("(default)")
                ));
                session.set_working_dir(dir.clone());
                if let Err(e) = crate::config::save_working_dir(dir) {
                    tracing::warn!(error = %e, "could not persist working directory");
                    session.print(&format!("Could not save settings: {e}\n"));
                }
                Ok(())
            }
            ConsoleInput::Run(file) => {
                let file = (!file.is_empty()).then_some(file);
                let project_dir = session.working_dir().map(str::to_string);
                session
                    .run_current_file(file.as_deref(), project_dir.as_deref())
                    .await
            }
            ConsoleInput::History => {
                let listing: String = session
                    .history()
                    .entries()
                    .iter()
                    .enumerate()
                    .map(|(i, cmd)| format!("{:>4}  {cmd}\n", i + 1))
                    .collect();
                session.print(&listing);
                Ok(())
            }
            ConsoleInput::Command(cmd) => session.submit_command(&cmd).await,
        };
        match result {
            Ok(()) | Err(WorkbenchError::InputRejected) => {}
            Err(WorkbenchError::Backend(e)) if clearing => {
                session.print(&format!("Could not clear the console: {e}\n"));
            }
            Err(e) => tracing::debug!(error = %e, "console input failed"),
        }
    }

    session.stop_polling();
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let config = config::load_config();
    init_tracing(&config);
    tracing::info!(backend = ?config.backend, url = %config.backend_url, "workbench console starting");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(async {
        match config.backend {
            BackendKind::Http => {
                let backend = HttpBackend::new(&config.backend_url, config.request_timeout())
                    .with_context(|| format!("invalid backend url {}", config.backend_url))?;
                console(Arc::new(backend), &config).await
            }
            BackendKind::Local => {
                let backend = LocalBackend::new(&config.python_executable, config.max_buffer_chars);
                console(Arc::new(backend), &config).await
            }
        }
    })
}

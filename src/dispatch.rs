//! Lexical routing of console input.
//!
//! `python main.py` goes through the dedicated run-file path so the file can be
//! probed first; anything with trailing arguments, or any other program, is
//! forwarded verbatim as a shell command.

/// Where a submitted command should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    RunFile(String),
    Shell(String),
}

#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    interpreters: Vec<String>,
}

impl CommandDispatcher {
    pub fn new(interpreters: Vec<String>) -> Self {
        Self { interpreters }
    }

    pub fn classify(&self, command: &str) -> Dispatch {
        let trimmed = command.trim();
        let mut tokens = trimmed.split_whitespace();

        let is_interpreter = tokens
            .next()
            .is_some_and(|program| self.interpreters.iter().any(|i| i == program));
        if !is_interpreter {
            return Dispatch::Shell(trimmed.to_string());
        }

        match (tokens.next(), tokens.next()) {
            // Interpreter flags (`python -V`) are not file paths
            (Some(path), None) if !path.starts_with('-') => Dispatch::RunFile(path.to_string()),
            _ => Dispatch::Shell(trimmed.to_string()),
        }
    }
}

/// Whether `path` ends in one of the runnable extensions (case-insensitive).
pub(crate) fn is_runnable(path: &str, extensions: &[String]) -> bool {
    let lower = path.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_lowercase()))
}

/// Prefix a project-relative path with the project directory.
pub(crate) fn resolve_in_project(file: &str, project_dir: Option<&str>) -> String {
    match project_dir {
        Some(dir) if !dir.is_empty() && !file.starts_with(dir) => {
            format!("{}/{}", dir.trim_end_matches('/'), file.trim_start_matches('/'))
        }
        _ => file.to_string(),
    }
}

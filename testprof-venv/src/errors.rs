//! Structured error types for testprof-venv

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VenvError {
    #[error("Failed to create workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command {command} failed ({status}){}", format_stderr(.stderr))]
    CommandFailed { command: String, status: ExitStatus, stderr: String },

    #[error("VIRTUALENV_FIXTURE_EXECUTABLE is set but empty")]
    EmptyVirtualenvCommand,

    #[error("Invalid package type {0:?} (expected ANY, DEV, SRC or REL)")]
    InvalidPackageType(String),

    #[error("Unexpected package listing line: {0:?}")]
    MalformedPackageLine(String),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_stderr(stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{stderr}")
    }
}

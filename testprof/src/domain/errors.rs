//! Structured error types for testprof
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use testprof_common::ProfileFormatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilingError {
    #[error("Failed to create profile directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write profile {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: ProfileFormatError,
    },

    #[error("Failed to read profile {path}: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: ProfileFormatError,
    },

    #[error("A profiler is already recording on this thread")]
    AlreadyRecording,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Setting {name} expects {expected}, got {found}")]
    TypeMismatch { name: String, expected: &'static str, found: String },

    #[error("Invalid value {value:?} for {name} (possible values: {choices})")]
    InvalidChoice { name: String, value: String, choices: String },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("[profiling] in {0} must be a table")]
    SectionNotATable(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

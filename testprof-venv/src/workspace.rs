//! Disposable working directory for out-of-process tests
//!
//! A [`Workspace`] is a fresh temporary directory that commands run in. It
//! is removed on drop, unless the `DEBUG` environment variable is set, in
//! which case it is kept for inspection and its path is logged.

use crate::errors::VenvError;
use log::{debug, info};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Environment variable that keeps workspaces around and makes installers
/// verbose.
pub const DEBUG_ENV: &str = "DEBUG";

/// Environment passed to child processes, replacing the inherited one.
pub type EnvMap = BTreeMap<OsString, OsString>;

#[derive(Debug)]
enum Root {
    Temp(TempDir),
    Kept(PathBuf),
}

#[derive(Debug)]
pub struct Workspace {
    root: Root,
    debug: bool,
}

/// How to run a command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions<'a> {
    /// Working directory; the workspace when `None`
    pub cwd: Option<&'a Path>,
    /// Complete child environment; inherited when `None`
    pub env: Option<&'a EnvMap>,
    /// Return stdout instead of letting the child write to ours
    pub capture: bool,
}

impl Workspace {
    /// # Errors
    /// Fails when the temporary directory cannot be created.
    pub fn new() -> Result<Self, VenvError> {
        Self::with_debug(debug_enabled())
    }

    /// Workspace that is kept on drop when `debug` is set.
    ///
    /// # Errors
    /// Fails when the temporary directory cannot be created.
    pub fn with_debug(debug: bool) -> Result<Self, VenvError> {
        let dir = tempfile::Builder::new().prefix("testprof-ws-").tempdir().map_err(VenvError::Workspace)?;
        let root = if debug {
            let path = dir.keep();
            info!("DEBUG set, keeping workspace {}", path.display());
            Root::Kept(path)
        } else {
            Root::Temp(dir)
        };
        let workspace = Self { root, debug };
        debug!("Created workspace {}", workspace.path().display());
        Ok(workspace)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.root {
            Root::Temp(dir) => dir.path(),
            Root::Kept(path) => path,
        }
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Run `args[0]` with the remaining items as arguments.
    ///
    /// Returns captured stdout, or an empty string when not capturing.
    ///
    /// # Errors
    /// Fails when the command cannot be started or exits unsuccessfully.
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S], options: RunOptions<'_>) -> Result<String, VenvError> {
        let command_line = display_command(args);
        let Some((program, rest)) = args.split_first() else {
            return Err(VenvError::Spawn {
                command: command_line,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(options.cwd.unwrap_or_else(|| self.path()));
        if let Some(env) = options.env {
            cmd.env_clear().envs(env);
        }
        debug!("Running {command_line}");

        if options.capture {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .map_err(|source| VenvError::Spawn { command: command_line.clone(), source })?;
            if !output.status.success() {
                return Err(VenvError::CommandFailed {
                    command: command_line,
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let status = cmd
                .stdin(Stdio::null())
                .status()
                .map_err(|source| VenvError::Spawn { command: command_line.clone(), source })?;
            if !status.success() {
                return Err(VenvError::CommandFailed { command: command_line, status, stderr: String::new() });
            }
            Ok(String::new())
        }
    }

    /// Remove the workspace now, reporting failures instead of ignoring them.
    ///
    /// # Errors
    /// Fails when the directory cannot be removed.
    pub fn teardown(self) -> Result<(), VenvError> {
        match self.root {
            Root::Temp(dir) => {
                debug!("Removing workspace {}", dir.path().display());
                dir.close()?;
            }
            Root::Kept(path) => info!("Leaving workspace {} in place", path.display()),
        }
        Ok(())
    }
}

/// `DEBUG` is set to anything but an empty string.
#[must_use]
pub fn debug_enabled() -> bool {
    std::env::var_os(DEBUG_ENV).is_some_and(|v| !v.is_empty())
}

/// Space-joined command line for logs and errors.
pub(crate) fn display_command<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect::<Vec<_>>().join(" ")
}

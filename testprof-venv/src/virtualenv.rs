//! Throwaway Python virtual environments
//!
//! [`VirtualEnv`] creates an environment inside a fresh [`Workspace`] and
//! runs commands with that environment activated: `VIRTUAL_ENV` points at
//! it, its script directory leads `PATH` and `PYTHONPATH` is dropped so the
//! host interpreter's packages do not leak in.
//!
//! The environment is created with `VIRTUALENV_FIXTURE_EXECUTABLE` (split
//! on whitespace), or `python3 -m virtualenv` when unset.

use crate::errors::VenvError;
use crate::package::{parse_listing, PackageEntry, PackageType};
use crate::workspace::{display_command, EnvMap, RunOptions, Workspace};
use log::{debug, info};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Overrides the command that creates environments.
pub const VIRTUALENV_EXECUTABLE_ENV: &str = "VIRTUALENV_FIXTURE_EXECUTABLE";

/// Environment directory name inside the workspace.
pub const DEFAULT_ENV_NAME: &str = ".env";

#[cfg(windows)]
const SCRIPTS_DIR: &str = "Scripts";
#[cfg(not(windows))]
const SCRIPTS_DIR: &str = "bin";

#[cfg(windows)]
const DEFAULT_PYTHON: &str = "python";
#[cfg(not(windows))]
const DEFAULT_PYTHON: &str = "python3";

const LIST_PACKAGES: &str = "import importlib.metadata as md\n\
for d in md.distributions(): print(d.metadata['Name'], d.version, d.locate_file(''))";

/// Options for [`VirtualEnv::create`].
#[derive(Debug, Clone)]
pub struct VirtualEnvOptions {
    /// Base environment of child processes; the current one when `None`
    pub env: Option<EnvMap>,
    /// Directory name of the environment inside the workspace
    pub name: String,
    /// Interpreter the environment is based on
    pub python: Option<PathBuf>,
    /// Extra arguments for the virtualenv command
    pub args: Vec<String>,
}

impl Default for VirtualEnvOptions {
    fn default() -> Self {
        Self { env: None, name: DEFAULT_ENV_NAME.to_string(), python: None, args: Vec::new() }
    }
}

/// Package installer used by [`VirtualEnv::install_package`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Installer {
    /// `python -m pip install`
    #[default]
    Pip,
    /// A script from the environment's script directory, run as
    /// `python <script> <args...>`
    Script { name: String, args: Vec<String> },
}

/// Options for [`VirtualEnv::run_with_coverage`].
#[derive(Debug, Clone, Default)]
pub struct CoverageOptions<'a> {
    /// Packages or directories to measure; everything when empty
    pub source: Vec<String>,
    pub cwd: Option<&'a Path>,
}

#[derive(Debug)]
pub struct VirtualEnv {
    workspace: Workspace,
    root: PathBuf,
    python: PathBuf,
    coverage: PathBuf,
    env: EnvMap,
}

impl VirtualEnv {
    /// Environment with default options.
    ///
    /// # Errors
    /// See [`VirtualEnv::create`].
    pub fn new() -> Result<Self, VenvError> {
        Self::create(VirtualEnvOptions::default())
    }

    /// Create a workspace and an environment inside it.
    ///
    /// # Errors
    /// Fails when the workspace cannot be created or the virtualenv command
    /// fails.
    pub fn create(options: VirtualEnvOptions) -> Result<Self, VenvError> {
        let workspace = Workspace::new()?;
        let root = workspace.path().join(&options.name);
        let scripts = root.join(SCRIPTS_DIR);
        let base = options.env.unwrap_or_else(|| std::env::vars_os().collect());
        let env = activated_env(base, &root, &scripts)?;

        let venv = Self {
            python: executable(&scripts, "python"),
            coverage: executable(&scripts, "coverage"),
            workspace,
            root,
            env,
        };

        let python = options.python.unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON));
        let configured = std::env::var(VIRTUALENV_EXECUTABLE_ENV).ok();
        let cmd = creation_command(configured.as_deref(), &python, &options.args, &venv.root)?;
        info!("Creating virtualenv {}", venv.root.display());
        venv.run(&cmd)?;
        Ok(venv)
    }

    /// Base directory of the environment.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn python(&self) -> &Path {
        &self.python
    }

    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Environment variables commands run with.
    #[must_use]
    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Run a command with the environment activated, letting it write to our
    /// stdout and stderr.
    ///
    /// # Errors
    /// Fails when the command cannot be started or exits unsuccessfully.
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<(), VenvError> {
        self.workspace.run(args, RunOptions { env: Some(&self.env), ..RunOptions::default() }).map(drop)
    }

    /// Run a command with the environment activated and return its stdout.
    ///
    /// # Errors
    /// Fails when the command cannot be started or exits unsuccessfully.
    pub fn run_captured<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String, VenvError> {
        self.workspace.run(args, RunOptions { env: Some(&self.env), capture: true, ..RunOptions::default() })
    }

    /// Run a Python script under `coverage run -p`, writing a parallel-mode
    /// data file into the working directory.
    ///
    /// `coverage` must already be installed in the environment.
    ///
    /// # Errors
    /// Fails when the command cannot be started or exits unsuccessfully.
    pub fn run_with_coverage<S: AsRef<OsStr>>(&self, args: &[S], options: &CoverageOptions<'_>) -> Result<String, VenvError> {
        let cmd = coverage_command(&self.python, &self.coverage, &options.source, args);
        self.workspace.run(&cmd, RunOptions { cwd: options.cwd, env: Some(&self.env), capture: true })
    }

    /// Install a package by name.
    ///
    /// Installer output is quiet unless the workspace is in debug mode.
    ///
    /// # Errors
    /// Fails when the installer fails.
    pub fn install_package(&self, name: &str, installer: &Installer) -> Result<(), VenvError> {
        let cmd = install_command(&self.python, &self.root.join(SCRIPTS_DIR), installer, !self.workspace.debug(), name);
        debug!("Installing {name}: {}", display_command(&cmd));
        self.run(&cmd)
    }

    /// Install a local source checkout, in editable mode when `editable`.
    ///
    /// # Errors
    /// Fails when `src_dir` is not a directory or pip fails.
    pub fn install_local(&self, src_dir: &Path, editable: bool) -> Result<(), VenvError> {
        if !src_dir.is_dir() {
            return Err(VenvError::NotADirectory(src_dir.to_path_buf()));
        }
        let src_dir = std::path::absolute(src_dir)?;
        let mut cmd: Vec<OsString> = vec![self.python.clone().into(), "-m".into(), "pip".into(), "install".into()];
        if !self.workspace.debug() {
            cmd.push("-q".into());
        }
        if editable {
            cmd.push("-e".into());
        }
        cmd.push(src_dir.into());
        self.run(&cmd)
    }

    /// Installed distributions matching `package_type`, keyed by name.
    ///
    /// # Errors
    /// Fails when the interpreter cannot list its distributions.
    pub fn installed_packages(&self, package_type: PackageType) -> Result<BTreeMap<String, PackageEntry>, VenvError> {
        let python = self.python.as_os_str();
        let listing = self.run_captured(&[python, OsStr::new("-c"), OsStr::new(LIST_PACKAGES)])?;
        let mut packages = parse_listing(&listing)?;
        packages.retain(|_, entry| entry.matches(package_type));
        Ok(packages)
    }

    /// Remove the workspace and the environment in it.
    ///
    /// # Errors
    /// Fails when the workspace cannot be removed.
    pub fn teardown(self) -> Result<(), VenvError> {
        self.workspace.teardown()
    }
}

fn executable(scripts: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        scripts.join(format!("{name}.exe"))
    } else {
        scripts.join(name)
    }
}

/// `base` with the environment at `root` activated.
///
/// # Errors
/// Fails when the script directory cannot be joined into `PATH`.
pub fn activated_env(mut base: EnvMap, root: &Path, scripts: &Path) -> Result<EnvMap, VenvError> {
    base.insert("VIRTUAL_ENV".into(), root.as_os_str().to_owned());

    let mut paths = vec![scripts.to_path_buf()];
    if let Some(existing) = base.get(OsStr::new("PATH")) {
        paths.extend(std::env::split_paths(existing));
    }
    let joined = std::env::join_paths(paths)
        .map_err(|e| VenvError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
    base.insert("PATH".into(), joined);

    base.remove(OsStr::new("PYTHONPATH"));
    Ok(base)
}

/// `<virtualenv command> -p <python> <args...> <root>`.
///
/// `configured` is the raw `VIRTUALENV_FIXTURE_EXECUTABLE` value, if set.
///
/// # Errors
/// Fails when `configured` holds no command.
pub fn creation_command(configured: Option<&str>, python: &Path, args: &[String], root: &Path) -> Result<Vec<OsString>, VenvError> {
    let mut cmd: Vec<OsString> = match configured {
        Some(value) => {
            let words: Vec<OsString> = value.split_whitespace().map(OsString::from).collect();
            if words.is_empty() {
                return Err(VenvError::EmptyVirtualenvCommand);
            }
            words
        }
        None => vec![DEFAULT_PYTHON.into(), "-m".into(), "virtualenv".into()],
    };
    cmd.push("-p".into());
    cmd.push(python.into());
    cmd.extend(args.iter().map(OsString::from));
    cmd.push(root.into());
    Ok(cmd)
}

/// `python coverage run -p [--source=a,b] <args...>`
///
/// The coverage script is run through the interpreter, not its shebang.
pub fn coverage_command<S: AsRef<OsStr>>(python: &Path, coverage: &Path, source: &[String], args: &[S]) -> Vec<OsString> {
    let mut cmd: Vec<OsString> = vec![python.into(), coverage.into(), "run".into(), "-p".into()];
    if !source.is_empty() {
        cmd.push(format!("--source={}", source.join(",")).into());
    }
    cmd.extend(args.iter().map(|a| a.as_ref().to_owned()));
    cmd
}

/// Command installing `name` with `installer`.
pub fn install_command(python: &Path, scripts: &Path, installer: &Installer, quiet: bool, name: &str) -> Vec<OsString> {
    let mut cmd: Vec<OsString> = vec![python.into()];
    match installer {
        Installer::Pip => {
            cmd.extend(["-m", "pip", "install"].map(OsString::from));
            if quiet {
                cmd.push("-q".into());
            }
        }
        Installer::Script { name: script, args } => {
            cmd.push(executable(scripts, script).into());
            cmd.extend(args.iter().map(OsString::from));
        }
    }
    cmd.push(name.into());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> EnvMap {
        pairs.iter().map(|(k, v)| (OsString::from(k), OsString::from(v))).collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_activated_env() {
        let base = env_of(&[("PATH", "/usr/bin:/bin"), ("PYTHONPATH", "/somewhere"), ("HOME", "/home/me")]);
        let env = activated_env(base, Path::new("/ws/.env"), Path::new("/ws/.env/bin")).unwrap();

        assert_eq!(env.get(OsStr::new("VIRTUAL_ENV")).unwrap(), "/ws/.env");
        assert_eq!(env.get(OsStr::new("PATH")).unwrap(), "/ws/.env/bin:/usr/bin:/bin");
        assert!(!env.contains_key(OsStr::new("PYTHONPATH")));
        assert_eq!(env.get(OsStr::new("HOME")).unwrap(), "/home/me");
    }

    #[test]
    fn test_activated_env_without_path() {
        let env = activated_env(EnvMap::new(), Path::new("venv"), Path::new("venv/bin")).unwrap();
        assert_eq!(env.get(OsStr::new("PATH")).unwrap(), "venv/bin");
    }

    #[test]
    fn test_creation_command() {
        let root = Path::new("/ws/.env");
        let cmd = creation_command(None, Path::new("/usr/bin/python3.12"), &["--clear".into()], root).unwrap();
        let expected: Vec<OsString> =
            [DEFAULT_PYTHON, "-m", "virtualenv", "-p", "/usr/bin/python3.12", "--clear", "/ws/.env"].map(OsString::from).into();
        assert_eq!(cmd, expected);

        let cmd = creation_command(Some("  /opt/bin/virtualenv --no-download "), Path::new("python3"), &[], root).unwrap();
        let expected: Vec<OsString> =
            ["/opt/bin/virtualenv", "--no-download", "-p", "python3", "/ws/.env"].map(OsString::from).into();
        assert_eq!(cmd, expected);

        assert!(matches!(creation_command(Some("  "), Path::new("python3"), &[], root), Err(VenvError::EmptyVirtualenvCommand)));
    }

    #[test]
    fn test_coverage_command() {
        let cmd = coverage_command(Path::new("py"), Path::new("cov"), &["mylib".into(), "tests".into()], &["script.py", "--flag"]);
        let expected: Vec<OsString> =
            ["py", "cov", "run", "-p", "--source=mylib,tests", "script.py", "--flag"].map(OsString::from).into();
        assert_eq!(cmd, expected);

        let cmd = coverage_command(Path::new("py"), Path::new("cov"), &[], &["script.py"]);
        assert!(!cmd.iter().any(|a| a.to_string_lossy().starts_with("--source")));
    }

    #[cfg(unix)]
    #[test]
    fn test_install_command() {
        let python = Path::new("/ws/.env/bin/python");
        let scripts = Path::new("/ws/.env/bin");

        let cmd = install_command(python, scripts, &Installer::Pip, true, "requests");
        let expected: Vec<OsString> =
            ["/ws/.env/bin/python", "-m", "pip", "install", "-q", "requests"].map(OsString::from).into();
        assert_eq!(cmd, expected);

        let cmd = install_command(python, scripts, &Installer::Pip, false, "requests");
        assert!(!cmd.contains(&OsString::from("-q")));

        let installer = Installer::Script { name: "uv-install".into(), args: vec!["--offline".into()] };
        let cmd = install_command(python, scripts, &installer, true, "requests");
        let expected: Vec<OsString> =
            ["/ws/.env/bin/python", "/ws/.env/bin/uv-install", "--offline", "requests"].map(OsString::from).into();
        assert_eq!(cmd, expected);
    }
}

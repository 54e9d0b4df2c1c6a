//! # testprof-venv - Disposable Python Environments for Integration Tests
//!
//! Out-of-process tests sometimes need a real Python environment: install a
//! package, run a script, collect coverage, look at what got installed. This
//! crate provides that as a throwaway [`VirtualEnv`] living in a temporary
//! [`Workspace`].
//!
//! ```no_run
//! use testprof_venv::{Installer, PackageType, VirtualEnv};
//!
//! # fn main() -> Result<(), testprof_venv::VenvError> {
//! let venv = VirtualEnv::new()?;
//! venv.install_package("six", &Installer::Pip)?;
//! let packages = venv.installed_packages(PackageType::Rel)?;
//! assert!(packages.contains_key("six"));
//! venv.teardown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variables
//!
//! - `VIRTUALENV_FIXTURE_EXECUTABLE`: command creating environments
//!   (default `python3 -m virtualenv`)
//! - `DEBUG`: keep workspaces after the test and let installers be verbose

pub mod errors;
pub mod package;
pub mod virtualenv;
pub mod workspace;

pub use errors::VenvError;
pub use package::{PackageEntry, PackageType};
pub use virtualenv::{CoverageOptions, Installer, VirtualEnv, VirtualEnvOptions};
pub use workspace::{RunOptions, Workspace};

//! Session-end merge of per-test profiles.

use crate::domain::ProfilingError;
use crate::profiling::ensure_dir;
use log::{debug, info};
use std::path::{Path, PathBuf};
use testprof_common::{ProfileData, COMBINED_PROFILE_NAME, PROFILE_EXTENSION};

/// The merged profile of a session and where it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedProfile {
    /// Absolute path of `combined.prof`
    pub path: PathBuf,
    pub data: ProfileData,
}

/// Merge `profiles` in order and write `<dir>/combined.prof`.
///
/// Returns `None` (and writes nothing) when there are no profiles.
///
/// # Errors
/// Fails when a profile cannot be read or the combined file cannot be
/// written.
pub fn combine(profiles: &[PathBuf], dir: &Path) -> Result<Option<CombinedProfile>, ProfilingError> {
    let Some((first, rest)) = profiles.split_first() else {
        debug!("No profiles recorded, skipping combined profile");
        return Ok(None);
    };

    let mut data = load(first)?;
    for path in rest {
        data.merge(&load(path)?);
    }

    let dir = absolute(dir)?;
    ensure_dir(&dir)?;
    let path = dir.join(COMBINED_PROFILE_NAME);
    data.dump(&path).map_err(|source| ProfilingError::PersistFailed { path: path.clone(), source })?;
    info!("Combined {} profile(s) into {}", profiles.len(), path.display());

    Ok(Some(CombinedProfile { path, data }))
}

/// Expand `inputs` into profile files.
///
/// Files are taken as given. Directories contribute every `*.prof` file
/// they hold, sorted by name, except a previous `combined.prof`.
///
/// # Errors
/// Fails when an input does not exist or a directory cannot be read.
pub fn collect_profiles(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ProfilingError> {
    let mut profiles = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            if !input.exists() {
                return Err(ProfilingError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", input.display()),
                )));
            }
            profiles.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(input)? {
            let path = entry?.path();
            let is_profile = path.extension().is_some_and(|ext| ext == PROFILE_EXTENSION);
            let is_combined = path.file_name().is_some_and(|name| name == COMBINED_PROFILE_NAME);
            if is_profile && !is_combined && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        debug!("Found {} profile(s) in {}", found.len(), input.display());
        profiles.extend(found);
    }
    Ok(profiles)
}

fn load(path: &Path) -> Result<ProfileData, ProfilingError> {
    ProfileData::load(path).map_err(|source| ProfilingError::LoadFailed { path: path.to_path_buf(), source })
}

/// `path` made absolute against the current directory.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf, ProfilingError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

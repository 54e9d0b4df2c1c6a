//! Per-test profile persistence
//!
//! A test's profile is written to `<dir>/<sanitized test name>.prof`. Test
//! names can carry characters that are illegal in file names and can be
//! longer than the filesystem allows; the first problem is solved by
//! [`clean_filename`], the second by falling back to a short hash of the name.

use crate::domain::ProfilingError;
use log::{debug, warn};
use md5::{Digest, Md5};
use std::io;
use std::path::{Path, PathBuf};
use testprof_common::{ProfileData, ProfileFormatError, PROFILE_EXTENSION};

/// Hex characters kept from the MD5 digest for fallback file names.
pub const LARGE_FILENAME_HASH_LEN: usize = 8;

const FORBIDDEN_CHARS: &[char] = &['/', '?', '<', '>', '\\', ':', '*', '|', '"'];

/// Replace every path-hostile or non-ASCII character with `_`.
///
/// One character in, one character out: the result has as many characters
/// as the input.
#[must_use]
pub fn clean_filename(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) || u32::from(c) >= 127 { '_' } else { c })
        .collect()
}

/// First [`LARGE_FILENAME_HASH_LEN`] hex digits of the MD5 of `name`.
#[must_use]
pub fn hashed_filename(name: &str) -> String {
    let mut digest = format!("{:x}", Md5::digest(name.as_bytes()));
    digest.truncate(LARGE_FILENAME_HASH_LEN);
    digest
}

/// Create `dir` and its parents. An existing directory is fine.
///
/// # Errors
/// Any failure other than "already exists".
pub fn ensure_dir(dir: &Path) -> Result<(), ProfilingError> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(ProfilingError::CreateDirFailed { path: dir.to_path_buf(), source }),
    }
}

/// Write a test's profile and return the path it was written to.
///
/// When the sanitized name is too long for the filesystem and the test name
/// is at least [`LARGE_FILENAME_HASH_LEN`] characters, the profile is written
/// once more under the hashed name instead.
///
/// # Errors
/// Directory creation or write failures, including a second "name too long".
pub fn persist_profile(dir: &Path, test_name: &str, data: &ProfileData) -> Result<PathBuf, ProfilingError> {
    ensure_dir(dir)?;

    let path = dir.join(format!("{}.{PROFILE_EXTENSION}", clean_filename(test_name)));
    match data.dump(&path) {
        Ok(()) => {
            debug!("Wrote profile {}", path.display());
            Ok(path)
        }
        Err(source) if is_name_too_long(&source) && test_name.chars().count() >= LARGE_FILENAME_HASH_LEN => {
            let fallback = dir.join(format!("{}.{PROFILE_EXTENSION}", hashed_filename(test_name)));
            warn!("Profile name for {test_name} is too long, writing {} instead", fallback.display());
            data.dump(&fallback).map_err(|source| ProfilingError::PersistFailed { path: fallback.clone(), source })?;
            Ok(fallback)
        }
        Err(source) => Err(ProfilingError::PersistFailed { path, source }),
    }
}

fn is_name_too_long(err: &ProfileFormatError) -> bool {
    let ProfileFormatError::Io(io) = err else {
        return false;
    };
    #[cfg(unix)]
    {
        io.raw_os_error() == Some(libc::ENAMETOOLONG)
    }
    #[cfg(windows)]
    {
        // ERROR_FILENAME_EXCED_RANGE
        io.raw_os_error() == Some(206)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = io;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testprof_common::FunctionKey;

    fn sample() -> ProfileData {
        let mut data = ProfileData::new();
        data.entry_mut(FunctionKey::new("src/lib.rs", 3, "run")).stats.total_calls = 1;
        data
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("a:b/c\u{256}d"), "a_b_c_d");
        assert_eq!(clean_filename(r#"x?<>\*|"y"#), "x_______y");
        assert_eq!(clean_filename("test_ok[1-2]"), "test_ok[1-2]");
    }

    #[test]
    fn test_clean_filename_preserves_length() {
        let name = "tést::ünïcode/名前";
        assert_eq!(clean_filename(name).chars().count(), name.chars().count());
        assert!(clean_filename(name).is_ascii());
    }

    #[test]
    fn test_hashed_filename() {
        assert_eq!(hashed_filename("The quick brown fox jumps over the lazy dog"), "9e107d9d");
        assert_eq!(hashed_filename("same"), hashed_filename("same"));
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("prof");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_persist_uses_sanitized_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = persist_profile(tmp.path(), "tests::parse:ok", &sample()).unwrap();
        assert_eq!(path, tmp.path().join("tests__parse_ok.prof"));
        assert_eq!(ProfileData::load(&path).unwrap(), sample());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_persist_falls_back_to_hash_for_long_names() {
        let tmp = tempfile::tempdir().unwrap();
        let name = "t".repeat(300);
        let path = persist_profile(tmp.path(), &name, &sample()).unwrap();
        assert_eq!(path, tmp.path().join(format!("{}.prof", hashed_filename(&name))));
        assert!(path.is_file());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_short_name_too_long_is_fatal() {
        // Directory just under PATH_MAX, so any file inside it is too long
        let tmp = tempfile::tempdir().unwrap();
        let mut dir = tmp.path().to_path_buf();
        while dir.as_os_str().len() + 1 < 4090 {
            let segment = (4090 - dir.as_os_str().len() - 1).min(200);
            dir.push("d".repeat(segment));
        }
        ensure_dir(&dir).unwrap();

        let err = persist_profile(&dir, "abcdefg", &sample()).unwrap_err();
        match err {
            ProfilingError::PersistFailed { path, .. } => assert!(path.ends_with("abcdefg.prof")),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_dir_creation_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = persist_profile(&blocker.join("prof"), "test", &sample()).unwrap_err();
        assert!(matches!(err, ProfilingError::CreateDirFailed { .. }));
    }
}

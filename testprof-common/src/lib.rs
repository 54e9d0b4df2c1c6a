//! # Shared Profile Data Structures
//!
//! Defines the profile model shared by the per-test hook (which records it),
//! the session aggregator (which merges it) and the report binary (which
//! reads it back). A profile is a table keyed by function identity, holding
//! call counts and timings plus per-caller edge statistics.
//!
//! ## Key Types
//!
//! - [`FunctionKey`] - `(file, line, name)` identity of a profiled function
//! - [`CallStats`] - primitive/total call counts, inline and cumulative time
//! - [`FunctionProfile`] - stats of one function plus its incoming call edges
//! - [`ProfileData`] - the whole table, with merge/load/dump
//!
//! ## On-disk Format
//!
//! Profiles are stored as JSON (one `.prof` file per test). The file carries a
//! format version so readers can reject files from incompatible writers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Version written into every profile file.
pub const PROFILE_FORMAT_VERSION: u32 = 1;

/// File extension of per-test and combined profiles.
pub const PROFILE_EXTENSION: &str = "prof";

/// File name of the merged session profile.
pub const COMBINED_PROFILE_NAME: &str = "combined.prof";

/// Pseudo file name used for functions without a source location.
const BUILTIN_FILE: &str = "~";

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ProfileFormatError {
    #[error("Unsupported profile format version {found} (expected {PROFILE_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Function identity
// ============================================================================

/// Identity of a profiled function.
///
/// Ordering is `(file, line, name)`, which is also the order used when
/// listing callers and callees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionKey {
    pub file: String,
    pub line: u32,
    pub name: String,
}

impl FunctionKey {
    pub fn new(file: impl Into<String>, line: u32, name: impl Into<String>) -> Self {
        Self { file: file.into(), line, name: name.into() }
    }

    /// Key for a function with no source location.
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new(BUILTIN_FILE, 0, name)
    }

    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.file == BUILTIN_FILE && self.line == 0
    }

    /// Same function with the leading directories removed from its file.
    #[must_use]
    pub fn stripped(&self) -> Self {
        let file = Path::new(&self.file)
            .file_name()
            .map_or_else(|| self.file.clone(), |n| n.to_string_lossy().into_owned());
        Self { file, line: self.line, name: self.name.clone() }
    }
}

/// Renders as `file:line(name)`, or `{name}` for builtins.
impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_builtin() {
            if self.name.starts_with('<') && self.name.ends_with('>') {
                write!(f, "{{{}}}", &self.name[1..self.name.len() - 1])
            } else {
                write!(f, "{}", self.name)
            }
        } else {
            write!(f, "{}:{}({})", self.file, self.line, self.name)
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Call counts and timings (seconds) for a function or a call edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    /// Calls that were not recursive activations.
    pub primitive_calls: u64,
    /// All calls, recursive ones included.
    pub total_calls: u64,
    /// Time spent in the function itself, excluding callees.
    pub inline_time: f64,
    /// Time spent in the function and everything it called.
    pub cumulative_time: f64,
}

impl CallStats {
    pub fn add(&mut self, other: &CallStats) {
        self.primitive_calls += other.primitive_calls;
        self.total_calls += other.total_calls;
        self.inline_time += other.inline_time;
        self.cumulative_time += other.cumulative_time;
    }

    /// True when some of the calls were recursive.
    #[must_use]
    pub fn has_recursion(&self) -> bool {
        self.primitive_calls != self.total_calls
    }
}

/// Statistics of one function plus the edges that lead into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionProfile {
    pub stats: CallStats,
    /// Incoming edges: caller -> statistics of calls made by that caller.
    pub callers: BTreeMap<FunctionKey, CallStats>,
}

impl FunctionProfile {
    fn add(&mut self, other: &FunctionProfile) {
        self.stats.add(&other.stats);
        for (caller, edge) in &other.callers {
            self.callers.entry(caller.clone()).or_default().add(edge);
        }
    }
}

// ============================================================================
// Profile table
// ============================================================================

/// A profile: every recorded function with its statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileData {
    functions: BTreeMap<FunctionKey, FunctionProfile>,
}

impl ProfileData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn functions(&self) -> &BTreeMap<FunctionKey, FunctionProfile> {
        &self.functions
    }

    #[must_use]
    pub fn get(&self, key: &FunctionKey) -> Option<&FunctionProfile> {
        self.functions.get(key)
    }

    /// Entry for `key`, created empty if absent.
    pub fn entry_mut(&mut self, key: FunctionKey) -> &mut FunctionProfile {
        self.functions.entry(key).or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Add every statistic of `other` into `self`.
    ///
    /// Counts and times are summed per function and per edge, so merging
    /// `[a, b]` and `[b, a]` produces the same table.
    pub fn merge(&mut self, other: &ProfileData) {
        for (key, profile) in &other.functions {
            self.functions.entry(key.clone()).or_default().add(profile);
        }
    }

    /// Rebuild the table with `map` applied to every key (function and caller
    /// keys alike). Keys that collide after mapping are merged.
    #[must_use]
    pub fn map_keys(&self, map: impl Fn(&FunctionKey) -> FunctionKey) -> ProfileData {
        let mut out = ProfileData::new();
        for (key, profile) in &self.functions {
            let entry = out.entry_mut(map(key));
            entry.stats.add(&profile.stats);
            for (caller, edge) in &profile.callers {
                entry.callers.entry(map(caller)).or_default().add(edge);
            }
        }
        out
    }

    /// Sum of all call counts.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.functions.values().map(|f| f.stats.total_calls).sum()
    }

    /// Sum of all primitive call counts.
    #[must_use]
    pub fn primitive_calls(&self) -> u64 {
        self.functions.values().map(|f| f.stats.primitive_calls).sum()
    }

    /// Total profiled time: the sum of every function's inline time.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        self.functions.values().map(|f| f.stats.inline_time).sum()
    }

    /// Outgoing edges of every function: callee lists keyed by caller.
    #[must_use]
    pub fn callees(&self) -> BTreeMap<&FunctionKey, BTreeMap<&FunctionKey, CallStats>> {
        let mut callees: BTreeMap<&FunctionKey, BTreeMap<&FunctionKey, CallStats>> =
            BTreeMap::new();
        for (callee, profile) in &self.functions {
            for (caller, edge) in &profile.callers {
                callees.entry(caller).or_default().insert(callee, *edge);
            }
        }
        callees
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Load a profile file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileFormatError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Write the profile to `path`, replacing any existing file.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), ProfileFormatError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ProfileFormatError> {
        let file: ProfileFile = serde_json::from_reader(reader)?;
        if file.version != PROFILE_FORMAT_VERSION {
            return Err(ProfileFormatError::UnsupportedVersion { found: file.version });
        }

        let mut data = ProfileData::new();
        for entry in file.functions {
            let profile = data.entry_mut(entry.key);
            profile.stats.add(&entry.stats);
            for caller in entry.callers {
                profile.callers.entry(caller.key).or_default().add(&caller.stats);
            }
        }
        Ok(data)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), ProfileFormatError> {
        let file = ProfileFile {
            version: PROFILE_FORMAT_VERSION,
            functions: self
                .functions
                .iter()
                .map(|(key, profile)| FunctionEntry {
                    key: key.clone(),
                    stats: profile.stats,
                    callers: profile
                        .callers
                        .iter()
                        .map(|(caller, stats)| CallerEntry { key: caller.clone(), stats: *stats })
                        .collect(),
                })
                .collect(),
        };
        serde_json::to_writer(writer, &file)?;
        Ok(())
    }
}

// ============================================================================
// Serialized layout
// ============================================================================

#[derive(Serialize, Deserialize)]
struct ProfileFile {
    version: u32,
    functions: Vec<FunctionEntry>,
}

#[derive(Serialize, Deserialize)]
struct FunctionEntry {
    #[serde(flatten)]
    key: FunctionKey,
    #[serde(flatten)]
    stats: CallStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    callers: Vec<CallerEntry>,
}

#[derive(Serialize, Deserialize)]
struct CallerEntry {
    #[serde(flatten)]
    key: FunctionKey,
    #[serde(flatten)]
    stats: CallStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(calls: u64, tt: f64, ct: f64) -> CallStats {
        CallStats { primitive_calls: calls, total_calls: calls, inline_time: tt, cumulative_time: ct }
    }

    fn profile_with(key: &FunctionKey, caller: Option<&FunctionKey>, calls: u64) -> ProfileData {
        let mut data = ProfileData::new();
        let entry = data.entry_mut(key.clone());
        entry.stats = stats(calls, 0.25, 0.5);
        if let Some(caller) = caller {
            entry.callers.insert(caller.clone(), stats(calls, 0.25, 0.5));
        }
        data
    }

    #[test]
    fn test_function_key_display() {
        let key = FunctionKey::new("src/lib.rs", 12, "parse");
        assert_eq!(key.to_string(), "src/lib.rs:12(parse)");
        assert_eq!(FunctionKey::builtin("<alloc>").to_string(), "{alloc}");
        assert_eq!(FunctionKey::builtin("sleep").to_string(), "sleep");
    }

    #[test]
    fn test_stripped_keeps_basename() {
        let key = FunctionKey::new("/home/dev/project/src/lib.rs", 3, "run");
        assert_eq!(key.stripped(), FunctionKey::new("lib.rs", 3, "run"));
    }

    #[test]
    fn test_merge_sums_functions_and_edges() {
        let parse = FunctionKey::new("src/lib.rs", 12, "parse");
        let main = FunctionKey::new("src/main.rs", 1, "main");

        let mut combined = profile_with(&parse, Some(&main), 2);
        combined.merge(&profile_with(&parse, Some(&main), 3));

        let entry = combined.get(&parse).unwrap();
        assert_eq!(entry.stats.total_calls, 5);
        assert!((entry.stats.cumulative_time - 1.0).abs() < 1e-9);
        assert_eq!(entry.callers[&main].total_calls, 5);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a_key = FunctionKey::new("a.rs", 1, "a");
        let b_key = FunctionKey::new("b.rs", 2, "b");
        let a = profile_with(&a_key, Some(&b_key), 2);
        let b = profile_with(&b_key, None, 7);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.total_calls(), 9);
    }

    #[test]
    fn test_map_keys_merges_collisions() {
        let mut data = ProfileData::new();
        data.entry_mut(FunctionKey::new("/a/util.rs", 1, "f")).stats = stats(1, 0.1, 0.1);
        data.entry_mut(FunctionKey::new("/b/util.rs", 1, "f")).stats = stats(2, 0.1, 0.1);

        let stripped = data.map_keys(FunctionKey::stripped);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped.get(&FunctionKey::new("util.rs", 1, "f")).unwrap().stats.total_calls, 3);
    }

    #[test]
    fn test_dump_and_load_preserve_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.prof");
        let parse = FunctionKey::new("src/lib.rs", 12, "parse");
        let main = FunctionKey::new("src/main.rs", 1, "main");
        let data = profile_with(&parse, Some(&main), 4);

        data.dump(&path).unwrap();
        assert_eq!(ProfileData::load(&path).unwrap(), data);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let json = r#"{"version": 99, "functions": []}"#;
        let err = ProfileData::from_reader(json.as_bytes()).unwrap_err();
        assert!(matches!(err, ProfileFormatError::UnsupportedVersion { found: 99 }));
    }
}

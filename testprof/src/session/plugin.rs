//! Session lifecycle of per-test profiling.
//!
//! One [`ProfilingPlugin`] lives for one test session:
//!
//! ```text
//! session_start ──► run_test × N ──► session_finish ──► terminal_summary
//!   (mkdir dir)     (profile +        (merge, write      (listing + SVG
//!                    persist)          combined, render)  outcome)
//! ```
//!
//! All state is per instance, so independent sessions (e.g. in tests) do not
//! share profile lists.

use crate::config::ProfilingConfig;
use crate::domain::ProfilingError;
use crate::profiling::{ensure_dir, persist_profile, Profiler};
use crate::render::{render_svg, RenderOutcome, RenderPrograms, RenderRequest};
use crate::report;
use crate::session::aggregator::{absolute, combine, CombinedProfile};
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ProfilingPlugin {
    config: ProfilingConfig,
    /// Absolute profile directory
    dir: PathBuf,
    programs: RenderPrograms,
    /// Per-test profile files in completion order
    profiles: Vec<PathBuf>,
    combined: Option<CombinedProfile>,
    render: RenderOutcome,
}

impl ProfilingPlugin {
    /// # Errors
    /// Fails when the current directory is needed to make the profile
    /// directory absolute and cannot be determined.
    pub fn new(config: ProfilingConfig) -> Result<Self, ProfilingError> {
        let dir = absolute(&config.dir)?;
        Ok(Self {
            config,
            dir,
            programs: RenderPrograms::discover(),
            profiles: Vec::new(),
            combined: None,
            render: RenderOutcome::NotRequested,
        })
    }

    #[must_use]
    pub fn with_render_programs(mut self, programs: RenderPrograms) -> Self {
        self.programs = programs;
        self
    }

    /// Create the profile directory.
    ///
    /// # Errors
    /// Any directory creation failure other than "already exists".
    pub fn session_start(&mut self) -> Result<(), ProfilingError> {
        debug!("Profiling into {}", self.dir.display());
        ensure_dir(&self.dir)
    }

    /// Run one test under the profiler and persist its profile.
    ///
    /// `f` must not unwind; callers that need panic isolation catch it
    /// inside `f` so the profile is still written.
    ///
    /// # Errors
    /// Fails when a profiler is already active on this thread or the profile
    /// cannot be written.
    pub fn run_test<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> Result<T, ProfilingError> {
        let profiler = Profiler::enable()?;
        let output = f();
        let data = profiler.disable();

        let path = persist_profile(&self.dir, name, &data)?;
        self.profiles.push(path);
        Ok(output)
    }

    /// Add already persisted profiles to the session.
    pub fn extend_profiles(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.profiles.extend(paths);
    }

    /// Merge the session's profiles and render the SVG if requested.
    ///
    /// Render failures are recorded, not returned.
    ///
    /// # Errors
    /// Fails when a profile cannot be read or the combined file cannot be
    /// written.
    pub fn session_finish(&mut self) -> Result<(), ProfilingError> {
        self.combined = combine(&self.profiles, &self.dir)?;

        self.render = match (&self.combined, self.config.svg) {
            (Some(combined), true) => render_svg(
                &combined.data,
                &RenderRequest {
                    dir: &self.dir,
                    options: &self.config.gprof2dot_options,
                    programs: &self.programs,
                    timeout: self.config.render_timeout,
                },
            ),
            _ => RenderOutcome::NotRequested,
        };
        Ok(())
    }

    /// Write the profiling summary.
    ///
    /// # Errors
    /// Write failures.
    pub fn terminal_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        report::write_summary(out, &self.config, self.combined.as_ref(), &self.render)
    }

    #[must_use]
    pub fn config(&self) -> &ProfilingConfig {
        &self.config
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn profiles(&self) -> &[PathBuf] {
        &self.profiles
    }

    #[must_use]
    pub fn combined(&self) -> Option<&CombinedProfile> {
        self.combined.as_ref()
    }

    #[must_use]
    pub fn render_outcome(&self) -> &RenderOutcome {
        &self.render
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::scope;
    use testprof_common::{FunctionKey, COMBINED_PROFILE_NAME};

    fn plugin_in(dir: &Path) -> ProfilingPlugin {
        let config = ProfilingConfig { enabled: true, dir: dir.to_path_buf(), ..ProfilingConfig::default() };
        ProfilingPlugin::new(config).unwrap()
    }

    #[test]
    fn test_profiles_tracked_in_completion_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plugin = plugin_in(&tmp.path().join("prof"));
        plugin.session_start().unwrap();

        for name in ["test_b", "test_a"] {
            plugin
                .run_test(name, || {
                    let _guard = scope(FunctionKey::new("src/lib.rs", 1, "work"));
                })
                .unwrap();
        }

        let names: Vec<_> = plugin.profiles().iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["test_b.prof", "test_a.prof"]);

        plugin.session_finish().unwrap();
        let combined = plugin.combined().unwrap();
        assert_eq!(combined.path, tmp.path().join("prof").join(COMBINED_PROFILE_NAME));
        assert_eq!(combined.data.total_calls(), 2);
        assert_eq!(plugin.render_outcome(), &RenderOutcome::NotRequested);
    }

    #[test]
    fn test_empty_session_prints_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plugin = plugin_in(tmp.path());
        plugin.session_start().unwrap();
        plugin.session_finish().unwrap();

        let mut out = Vec::new();
        plugin.terminal_summary(&mut out).unwrap();
        assert!(out.is_empty());
        assert!(!tmp.path().join(COMBINED_PROFILE_NAME).exists());
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut first = plugin_in(tmp.path());
        first.run_test("test_one", || ()).unwrap();
        let second = plugin_in(tmp.path());
        assert_eq!(first.profiles().len(), 1);
        assert!(second.profiles().is_empty());
    }
}

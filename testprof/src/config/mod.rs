//! Profiling configuration
//!
//! [`OptionResolver`] answers "what is the value of setting X" from the
//! command line, the persisted `testprof.toml` and the compiled-in defaults.
//! [`ProfilingConfig`] is the typed snapshot the session works from.

pub mod persisted;
pub mod resolver;
pub mod settings;

pub use persisted::{PersistedConfig, CONFIG_FILE_NAME};
pub use resolver::{OptionResolver, Origin, Overrides, Resolved};
pub use settings::{SettingKind, SettingValue};

use crate::domain::{parse_choice, ColorMap, ConfigError, ProfilingMode, Restriction, SortKey};
use std::path::PathBuf;
use std::time::Duration;

/// Typed view of every profiling setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilingConfig {
    /// Per-test profiling is on (`profile` or `profile_svg`)
    pub enabled: bool,
    /// Render the combined profile as an SVG call graph
    pub svg: bool,
    pub dir: PathBuf,
    pub element_number: usize,
    pub strip_dirs: bool,
    pub mode: ProfilingMode,
    /// Empty means natural (file, line, name) order
    pub sort_keys: Vec<SortKey>,
    pub rev_order: bool,
    pub restrictions: Vec<Restriction>,
    pub gprof2dot_options: Vec<String>,
    /// `None` waits for the render pipeline indefinitely
    pub render_timeout: Option<Duration>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            svg: false,
            dir: PathBuf::from(settings::DEFAULT_PSTATS_DIR),
            element_number: usize::try_from(settings::DEFAULT_ELEMENT_NUMBER).unwrap_or(20),
            strip_dirs: false,
            mode: ProfilingMode::default(),
            sort_keys: vec![SortKey::Cumulative],
            rev_order: false,
            restrictions: Vec::new(),
            gprof2dot_options: Vec::new(),
            render_timeout: Some(Duration::from_secs_f64(settings::DEFAULT_RENDER_TIMEOUT_SECS)),
        }
    }
}

impl ProfilingConfig {
    /// Resolve every setting.
    ///
    /// # Errors
    /// Fails when a value does not fit its setting, e.g. an unknown sort key
    /// or a negative element count in the config file.
    pub fn resolve(resolver: &OptionResolver) -> Result<Self, ConfigError> {
        let svg = resolver.bool(settings::PROFILE_SVG)?;
        let enabled = svg || resolver.bool(settings::PROFILE)?;

        let dir = resolver
            .string(settings::PSTATS_DIR)?
            .filter(|d| !d.trim().is_empty())
            .map_or_else(|| PathBuf::from(settings::DEFAULT_PSTATS_DIR), PathBuf::from);

        let element_number = resolver.int(settings::ELEMENT_NUMBER)?.unwrap_or(settings::DEFAULT_ELEMENT_NUMBER);
        let element_number = usize::try_from(element_number).map_err(|_| ConfigError::TypeMismatch {
            name: settings::ELEMENT_NUMBER.to_string(),
            expected: "a non-negative integer",
            found: element_number.to_string(),
        })?;

        let mode = match resolver.string(settings::PROFILING_MODE)? {
            Some(mode) => parse_choice(settings::PROFILING_MODE, &mode)?,
            None => ProfilingMode::default(),
        };

        let sort_keys = resolver
            .list(settings::PROFILING_SORT_KEY)?
            .iter()
            .map(|key| parse_choice(settings::PROFILING_SORT_KEY, key))
            .collect::<Result<Vec<SortKey>, _>>()?;

        let restrictions =
            resolver.list(settings::PROFILING_FILTER)?.iter().map(|r| Restriction::parse(r)).collect();

        if let Some(colormap) = resolver.string(settings::GPROF2DOT_COLORMAP)? {
            parse_choice::<ColorMap>(settings::GPROF2DOT_COLORMAP, &colormap)?;
        }

        let render_timeout = resolver
            .float(settings::RENDER_TIMEOUT)?
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        Ok(Self {
            enabled,
            svg,
            dir,
            element_number,
            strip_dirs: resolver.bool(settings::STRIP_DIRS)?,
            mode,
            sort_keys,
            rev_order: resolver.bool(settings::PROFILING_REV_ORDER)?,
            restrictions,
            gprof2dot_options: resolver.passthrough_flags(),
            render_timeout,
        })
    }

    /// Restrictions for the listing: the configured ones, or the element
    /// count when none are configured.
    #[must_use]
    pub fn effective_restrictions(&self) -> Vec<Restriction> {
        if self.restrictions.is_empty() {
            vec![Restriction::Count(i64::try_from(self.element_number).unwrap_or(i64::MAX))]
        } else {
            self.restrictions.clone()
        }
    }
}

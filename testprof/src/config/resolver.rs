//! Option resolution
//!
//! Every setting is resolved from three layers, first hit wins:
//!
//! 1. a run-time override (command-line flag actually given)
//! 2. the persisted configuration file
//! 3. the compiled-in default of the setting schema
//!
//! List settings are never merged across layers; the winning layer supplies
//! the whole list.

use crate::cli::{ProfilingArgs, PASSTHROUGH_FLAG_PREFIX};
use crate::config::persisted::PersistedConfig;
use crate::config::settings::{self, SettingKind, SettingValue, PASSTHROUGH_PREFIX, SETTINGS};
use crate::domain::ConfigError;
use clap::parser::ValueSource;
use clap::ArgMatches;
use std::collections::BTreeMap;

/// Layer a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Override,
    Persisted,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// `None` when the winning layer holds no value (e.g. `gprof2dot_root`)
    pub value: Option<SettingValue>,
    pub origin: Origin,
}

/// Run-time overrides keyed by setting name.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    values: BTreeMap<String, SettingValue>,
}

impl Overrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an override, checking it against the schema.
    ///
    /// # Errors
    /// Fails for unknown settings and values of the wrong kind.
    pub fn insert(&mut self, name: &str, value: SettingValue) -> Result<(), ConfigError> {
        let setting = settings::lookup(name).ok_or_else(|| ConfigError::UnknownSetting(name.to_string()))?;
        let value = match (setting.kind, value) {
            #[allow(clippy::cast_precision_loss)]
            (SettingKind::Float, SettingValue::Int(i)) => SettingValue::Float(i as f64),
            (kind, value) if value.kind() == kind => value,
            (kind, value) => {
                return Err(ConfigError::TypeMismatch {
                    name: name.to_string(),
                    expected: kind.describe(),
                    found: value.to_string(),
                })
            }
        };
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Builder form of [`Overrides::insert`].
    ///
    /// # Errors
    /// See [`Overrides::insert`].
    pub fn with(mut self, name: &str, value: SettingValue) -> Result<Self, ConfigError> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Overrides for every flag clap saw on the command line.
    ///
    /// Values clap filled in from defaults are not overrides.
    ///
    /// # Errors
    /// Fails if a parsed value does not fit its setting.
    pub fn from_cli(args: &ProfilingArgs, matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut overrides = Self::new();
        for setting in SETTINGS {
            if matches.value_source(setting.name) != Some(ValueSource::CommandLine) {
                continue;
            }
            if let Some(value) = args.setting_value(setting.name) {
                overrides.insert(setting.name, value)?;
            }
        }
        Ok(overrides)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }
}

/// Resolves settings across overrides, persisted config and defaults.
#[derive(Debug, Clone, Default)]
pub struct OptionResolver {
    overrides: Overrides,
    persisted: PersistedConfig,
    raw_args: Vec<String>,
}

impl OptionResolver {
    /// `raw_args` is the invocation argument list as given, before any
    /// passthrough stripping; it is only read by [`passthrough_flags`].
    ///
    /// [`passthrough_flags`]: OptionResolver::passthrough_flags
    #[must_use]
    pub fn new(overrides: Overrides, persisted: PersistedConfig, raw_args: Vec<String>) -> Self {
        Self { overrides, persisted, raw_args }
    }

    /// Resolver for a parsed command line.
    ///
    /// # Errors
    /// See [`Overrides::from_cli`].
    pub fn from_cli(
        args: &ProfilingArgs,
        matches: &ArgMatches,
        persisted: PersistedConfig,
        raw_args: Vec<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(Overrides::from_cli(args, matches)?, persisted, raw_args))
    }

    /// Resolve a setting of the schema.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownSetting`] for names outside the schema.
    pub fn resolve(&self, name: &str) -> Result<Resolved, ConfigError> {
        let setting = settings::lookup(name).ok_or_else(|| ConfigError::UnknownSetting(name.to_string()))?;

        if let Some(value) = self.overrides.get(name) {
            return Ok(Resolved { value: Some(value.clone()), origin: Origin::Override });
        }
        if let Some(value) = self.persisted.get(name) {
            return Ok(Resolved { value: Some(value.clone()), origin: Origin::Persisted });
        }
        Ok(Resolved { value: setting.default.to_value(), origin: Origin::Default })
    }

    /// # Errors
    /// Fails for unknown settings and settings of another kind.
    pub fn bool(&self, name: &str) -> Result<bool, ConfigError> {
        match self.resolve(name)?.value {
            Some(SettingValue::Bool(b)) => Ok(b),
            None => Ok(false),
            Some(other) => Err(mismatch(name, SettingKind::Bool, &other)),
        }
    }

    /// # Errors
    /// Fails for unknown settings and settings of another kind.
    pub fn int(&self, name: &str) -> Result<Option<i64>, ConfigError> {
        match self.resolve(name)?.value {
            Some(SettingValue::Int(i)) => Ok(Some(i)),
            None => Ok(None),
            Some(other) => Err(mismatch(name, SettingKind::Int, &other)),
        }
    }

    /// # Errors
    /// Fails for unknown settings and settings of another kind.
    pub fn float(&self, name: &str) -> Result<Option<f64>, ConfigError> {
        match self.resolve(name)?.value {
            Some(SettingValue::Float(x)) => Ok(Some(x)),
            None => Ok(None),
            Some(other) => Err(mismatch(name, SettingKind::Float, &other)),
        }
    }

    /// # Errors
    /// Fails for unknown settings and settings of another kind.
    pub fn string(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.resolve(name)?.value {
            Some(SettingValue::Str(s)) => Ok(Some(s)),
            None => Ok(None),
            Some(other) => Err(mismatch(name, SettingKind::Str, &other)),
        }
    }

    /// # Errors
    /// Fails for unknown settings and settings of another kind.
    pub fn list(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        match self.resolve(name)?.value {
            Some(SettingValue::List(items)) => Ok(items),
            None => Ok(Vec::new()),
            Some(other) => Err(mismatch(name, SettingKind::List, &other)),
        }
    }

    /// Extra flags for gprof2dot.
    ///
    /// Persisted `gprof2dot_*` entries come first, in file order. The raw
    /// argument list is then scanned for `--gprof2dot-<name>[=<value>]`
    /// tokens; each one replaces an earlier entry of the same name or is
    /// appended. A declared flag takes its value from the parsed command
    /// line (so the `--flag value` form works too); anything else uses the
    /// text after `=`, or no value at all.
    ///
    /// Entries render as `--<name>` or `--<name>=<value>`, with underscores
    /// turned into hyphens.
    #[must_use]
    pub fn passthrough_flags(&self) -> Vec<String> {
        let mut entries: Vec<(String, Option<String>)> = Vec::new();
        let mut upsert = |name: String, value: Option<String>| {
            if let Some(slot) = entries.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value;
            } else {
                entries.push((name, value));
            }
        };

        for (name, value) in self.persisted.iter() {
            if let Some(flag) = name.strip_prefix(PASSTHROUGH_PREFIX) {
                upsert(flag.to_string(), non_empty(value.to_string()));
            }
        }

        for token in self.raw_args.iter().take_while(|t| t.as_str() != "--") {
            let Some(rest) = token.strip_prefix(PASSTHROUGH_FLAG_PREFIX) else {
                continue;
            };
            let (flag, inline) = match rest.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (rest, None),
            };
            let flag = flag.replace('-', "_");
            let setting_name = format!("{PASSTHROUGH_PREFIX}{flag}");
            let value = match self.overrides.get(&setting_name) {
                Some(value) => non_empty(value.to_string()),
                None => inline.and_then(|v| non_empty(v.trim().to_string())),
            };
            upsert(flag, value);
        }

        entries
            .into_iter()
            .map(|(name, value)| {
                let flag = name.replace('_', "-");
                match value {
                    Some(value) => format!("--{flag}={value}"),
                    None => format!("--{flag}"),
                }
            })
            .collect()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn mismatch(name: &str, expected: SettingKind, found: &SettingValue) -> ConfigError {
    ConfigError::TypeMismatch { name: name.to_string(), expected: expected.describe(), found: found.to_string() }
}

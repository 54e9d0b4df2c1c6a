//! Persisted project configuration
//!
//! Settings live in the `[profiling]` table of a `testprof.toml` file. The
//! file is looked up from the current directory upward, like other project
//! configuration files. Entries keep their file order, which matters for
//! the gprof2dot passthrough flags.
//!
//! ```toml
//! [profiling]
//! profile_svg = true
//! profiling_sort_key = ["tottime", "calls"]
//! gprof2dot_root = "the_root_func"
//! ```

use crate::config::settings::{self, SettingKind, SettingValue, PASSTHROUGH_PREFIX};
use crate::domain::ConfigError;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// File name searched for by [`PersistedConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "testprof.toml";

const SECTION: &str = "profiling";

/// Settings read from a configuration file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedConfig {
    values: Vec<(String, SettingValue)>,
    source: Option<PathBuf>,
}

impl PersistedConfig {
    /// Load settings from an explicit file.
    ///
    /// # Errors
    /// Fails when the file cannot be read, is not valid TOML, or holds a
    /// value of the wrong type for a known setting.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content, path)?;
        config.source = Some(path.to_path_buf());
        debug!("Loaded {} setting(s) from {}", config.values.len(), path.display());
        Ok(config)
    }

    /// Walk up from the current directory looking for `testprof.toml`.
    ///
    /// # Errors
    /// Fails when a config file is found but cannot be loaded.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd)
    }

    /// Walk up from `start` looking for `testprof.toml`.
    ///
    /// # Errors
    /// Fails when a config file is found but cannot be loaded.
    pub fn discover_from(start: &Path) -> Result<Option<Self>, ConfigError> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                return Self::load(&config_path).map(Some);
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    /// Settings from `explicit` if given, else from a discovered file, else
    /// none at all.
    ///
    /// # Errors
    /// Fails when the chosen file cannot be loaded.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::discover()?.unwrap_or_default()),
        }
    }

    /// Parse file content. `path` is only used in error messages.
    ///
    /// # Errors
    /// See [`PersistedConfig::load`].
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let table: toml::Table = content
            .parse()
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        let Some(section) = table.get(SECTION) else {
            return Ok(Self::default());
        };
        let section =
            section.as_table().ok_or_else(|| ConfigError::SectionNotATable(path.to_path_buf()))?;

        let mut values = Vec::with_capacity(section.len());
        for (name, raw) in section {
            let kind = match settings::lookup(name) {
                Some(setting) => setting.kind,
                // Unknown gprof2dot options are forwarded verbatim
                None if name.starts_with(PASSTHROUGH_PREFIX) => SettingKind::Str,
                None => {
                    warn!("Ignoring unknown setting {name} in {}", path.display());
                    continue;
                }
            };
            values.push((name.clone(), coerce(name, kind, raw)?));
        }
        Ok(Self { values, source: None })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Settings in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// File the settings came from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl FromIterator<(String, SettingValue)> for PersistedConfig {
    fn from_iter<I: IntoIterator<Item = (String, SettingValue)>>(iter: I) -> Self {
        let mut config = Self::default();
        for (name, value) in iter {
            if let Some(slot) = config.values.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value;
            } else {
                config.values.push((name, value));
            }
        }
        config
    }
}

fn coerce(name: &str, kind: SettingKind, raw: &toml::Value) -> Result<SettingValue, ConfigError> {
    let mismatch = || ConfigError::TypeMismatch {
        name: name.to_string(),
        expected: kind.describe(),
        found: raw.to_string(),
    };

    match (kind, raw) {
        (SettingKind::Bool, toml::Value::Boolean(b)) => Ok(SettingValue::Bool(*b)),
        (SettingKind::Bool, toml::Value::String(s)) => parse_bool(s).map(SettingValue::Bool).ok_or_else(mismatch),
        (SettingKind::Int, toml::Value::Integer(i)) => Ok(SettingValue::Int(*i)),
        (SettingKind::Int, toml::Value::String(s)) => {
            s.trim().parse().map(SettingValue::Int).map_err(|_| mismatch())
        }
        #[allow(clippy::cast_precision_loss)]
        (SettingKind::Float, toml::Value::Integer(i)) => Ok(SettingValue::Float(*i as f64)),
        (SettingKind::Float, toml::Value::Float(x)) => Ok(SettingValue::Float(*x)),
        (SettingKind::Float, toml::Value::String(s)) => {
            s.trim().parse().map(SettingValue::Float).map_err(|_| mismatch())
        }
        (SettingKind::Str, toml::Value::String(s)) => Ok(SettingValue::Str(s.clone())),
        (SettingKind::Str, toml::Value::Integer(_) | toml::Value::Float(_) | toml::Value::Boolean(_)) => {
            Ok(SettingValue::Str(raw.to_string()))
        }
        (SettingKind::List, toml::Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.clone()),
                toml::Value::Integer(_) | toml::Value::Float(_) => Ok(item.to_string()),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SettingValue::List),
        // Newline-separated lists, the way ini-style values are written
        (SettingKind::List, toml::Value::String(s)) => Ok(SettingValue::List(
            s.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect(),
        )),
        _ => Err(mismatch()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<PersistedConfig, ConfigError> {
        PersistedConfig::parse(content, Path::new("testprof.toml"))
    }

    #[test]
    fn test_missing_section_is_empty() {
        let config = parse("[other]\nkey = 1\n").unwrap();
        assert_eq!(config.iter().count(), 0);
    }

    #[test]
    fn test_values_are_coerced_to_declared_kind() {
        let config = parse(
            r#"
            [profiling]
            profile = "yes"
            element_number = "5"
            gprof2dot_skew = 2
            profiling_filter = "test_\n  0.5\n"
            "#,
        )
        .unwrap();

        assert_eq!(config.get("profile"), Some(&SettingValue::Bool(true)));
        assert_eq!(config.get("element_number"), Some(&SettingValue::Int(5)));
        assert_eq!(config.get("gprof2dot_skew"), Some(&SettingValue::Float(2.0)));
        assert_eq!(
            config.get("profiling_filter"),
            Some(&SettingValue::List(vec!["test_".into(), "0.5".into()]))
        );
    }

    #[test]
    fn test_passthrough_keys_keep_file_order() {
        let config = parse(
            r#"
            [profiling]
            gprof2dot_root = "the_root_func"
            unknown_key = 3
            gprof2dot_use_it = ""
            "#,
        )
        .unwrap();

        let names: Vec<&str> = config.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["gprof2dot_root", "gprof2dot_use_it"]);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = parse("[profiling]\nelement_number = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_section_must_be_table() {
        let err = parse("profiling = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::SectionNotATable(_)));
    }

    #[test]
    fn test_discover_walks_up() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE_NAME), "[profiling]\nprofile = true\n").unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = PersistedConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.get("profile"), Some(&SettingValue::Bool(true)));
        assert_eq!(config.source(), Some(root.path().join(CONFIG_FILE_NAME).as_path()));
    }
}

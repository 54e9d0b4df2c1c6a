//! Setting schema: every configurable name with its kind and default.

use std::fmt;

pub const PROFILE: &str = "profile";
pub const PROFILE_SVG: &str = "profile_svg";
pub const PSTATS_DIR: &str = "pstats_dir";
pub const ELEMENT_NUMBER: &str = "element_number";
pub const STRIP_DIRS: &str = "strip_dirs";
pub const PROFILING_MODE: &str = "profiling_mode";
pub const PROFILING_SORT_KEY: &str = "profiling_sort_key";
pub const PROFILING_REV_ORDER: &str = "profiling_rev_order";
pub const PROFILING_FILTER: &str = "profiling_filter";
pub const GPROF2DOT_NODE_THRES: &str = "gprof2dot_node_thres";
pub const GPROF2DOT_EDGE_THRES: &str = "gprof2dot_edge_thres";
pub const GPROF2DOT_SKEW: &str = "gprof2dot_skew";
pub const GPROF2DOT_COLORMAP: &str = "gprof2dot_colormap";
pub const GPROF2DOT_ROOT: &str = "gprof2dot_root";
pub const GPROF2DOT_LEAF: &str = "gprof2dot_leaf";
pub const RENDER_TIMEOUT: &str = "render_timeout";

/// Settings with this prefix are forwarded to gprof2dot.
pub const PASSTHROUGH_PREFIX: &str = "gprof2dot_";

pub const DEFAULT_PSTATS_DIR: &str = "prof";
pub const DEFAULT_ELEMENT_NUMBER: i64 = 20;
pub const DEFAULT_SORT_KEY: &str = "cumulative";
pub const DEFAULT_RENDER_TIMEOUT_SECS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Int,
    Float,
    Str,
    List,
}

impl SettingKind {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            SettingKind::Bool => "a boolean",
            SettingKind::Int => "an integer",
            SettingKind::Float => "a number",
            SettingKind::Str => "a string",
            SettingKind::List => "a list of strings",
        }
    }
}

/// A resolved setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl SettingValue {
    #[must_use]
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingValue::Bool(_) => SettingKind::Bool,
            SettingValue::Int(_) => SettingKind::Int,
            SettingValue::Float(_) => SettingKind::Float,
            SettingValue::Str(_) => SettingKind::Str,
            SettingValue::List(_) => SettingKind::List,
        }
    }
}

/// Renders the value the way it is handed to external tools.
impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{b}"),
            SettingValue::Int(i) => write!(f, "{i}"),
            SettingValue::Float(x) => write!(f, "{x:?}"),
            SettingValue::Str(s) => f.write_str(s.trim()),
            SettingValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Compiled-in default of a setting.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
    List(&'static [&'static str]),
}

impl DefaultValue {
    #[must_use]
    pub fn to_value(self) -> Option<SettingValue> {
        match self {
            DefaultValue::None => None,
            DefaultValue::Bool(b) => Some(SettingValue::Bool(b)),
            DefaultValue::Int(i) => Some(SettingValue::Int(i)),
            DefaultValue::Float(x) => Some(SettingValue::Float(x)),
            DefaultValue::Str(s) => Some(SettingValue::Str(s.to_string())),
            DefaultValue::List(items) => {
                Some(SettingValue::List(items.iter().map(ToString::to_string).collect()))
            }
        }
    }
}

#[derive(Debug)]
pub struct Setting {
    pub name: &'static str,
    pub kind: SettingKind,
    pub default: DefaultValue,
}

const fn setting(name: &'static str, kind: SettingKind, default: DefaultValue) -> Setting {
    Setting { name, kind, default }
}

/// Every known setting. Names match the `ProfilingArgs` field ids.
pub const SETTINGS: &[Setting] = &[
    setting(PROFILE, SettingKind::Bool, DefaultValue::Bool(false)),
    setting(PROFILE_SVG, SettingKind::Bool, DefaultValue::Bool(false)),
    setting(PSTATS_DIR, SettingKind::Str, DefaultValue::Str(DEFAULT_PSTATS_DIR)),
    setting(ELEMENT_NUMBER, SettingKind::Int, DefaultValue::Int(DEFAULT_ELEMENT_NUMBER)),
    setting(STRIP_DIRS, SettingKind::Bool, DefaultValue::Bool(false)),
    setting(PROFILING_MODE, SettingKind::Str, DefaultValue::Str("stats")),
    setting(PROFILING_SORT_KEY, SettingKind::List, DefaultValue::List(&[DEFAULT_SORT_KEY])),
    setting(PROFILING_REV_ORDER, SettingKind::Bool, DefaultValue::Bool(false)),
    setting(PROFILING_FILTER, SettingKind::List, DefaultValue::List(&[])),
    setting(GPROF2DOT_NODE_THRES, SettingKind::Float, DefaultValue::Float(0.5)),
    setting(GPROF2DOT_EDGE_THRES, SettingKind::Float, DefaultValue::Float(0.1)),
    setting(GPROF2DOT_SKEW, SettingKind::Float, DefaultValue::Float(1.0)),
    setting(GPROF2DOT_COLORMAP, SettingKind::Str, DefaultValue::Str("color")),
    setting(GPROF2DOT_ROOT, SettingKind::Str, DefaultValue::None),
    setting(GPROF2DOT_LEAF, SettingKind::Str, DefaultValue::None),
    setting(RENDER_TIMEOUT, SettingKind::Float, DefaultValue::Float(DEFAULT_RENDER_TIMEOUT_SECS)),
];

/// Look up a setting by name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static Setting> {
    SETTINGS.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_declared_kind() {
        for setting in SETTINGS {
            if let Some(value) = setting.default.to_value() {
                assert_eq!(value.kind(), setting.kind, "default of {} has wrong kind", setting.name);
            }
        }
    }

    #[test]
    fn test_setting_value_display() {
        assert_eq!(SettingValue::Float(1.0).to_string(), "1.0");
        assert_eq!(SettingValue::Str("  root_func ".into()).to_string(), "root_func");
        assert_eq!(SettingValue::Int(7).to_string(), "7");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("pstats_dir").map(|s| s.kind), Some(SettingKind::Str));
        assert!(lookup("gprof2dot_use_it").is_none());
    }
}

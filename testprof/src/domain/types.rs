//! Domain types providing compile-time safety and self-documentation
//!
//! The enums double as clap value enums so invalid choices are rejected while
//! parsing the command line; persisted values go through [`parse_choice`].

use crate::domain::ConfigError;
use clap::ValueEnum;
use std::fmt;

/// Parse a persisted string into one of the value-enum choices.
///
/// # Errors
/// Returns [`ConfigError::InvalidChoice`] when `value` names no variant.
pub fn parse_choice<T: ValueEnum>(setting: &str, value: &str) -> Result<T, ConfigError> {
    T::from_str(value.trim(), false).map_err(|_| ConfigError::InvalidChoice {
        name: setting.to_string(),
        value: value.to_string(),
        choices: T::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value().map(|p| p.get_name().to_string()))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Sort criterion for profile listings.
///
/// Several names are aliases of one another (`cumulative`/`cumtime`,
/// `calls`/`ncalls`, `time`/`tottime`, `file`/`filename`/`module`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SortKey {
    Cumulative,
    Calls,
    Cumtime,
    File,
    Filename,
    Module,
    Ncalls,
    Pcalls,
    Line,
    Name,
    Nfl,
    Stdname,
    Time,
    Tottime,
}

impl SortKey {
    /// Human-readable description used in the "Ordered by" line.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            SortKey::Cumulative | SortKey::Cumtime => "cumulative time",
            SortKey::Calls | SortKey::Ncalls => "call count",
            SortKey::File | SortKey::Filename | SortKey::Module => "file name",
            SortKey::Pcalls => "primitive call count",
            SortKey::Line => "line number",
            SortKey::Name => "function name",
            SortKey::Nfl => "name/file/line",
            SortKey::Stdname => "standard name",
            SortKey::Time | SortKey::Tottime => "internal time",
        }
    }
}

/// Which listing the summary prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProfilingMode {
    /// Flat listing of every function
    #[default]
    Stats,
    /// For each function, the functions it called
    Callers,
    /// For each function, the functions that called it
    Callees,
}

/// Color map handed to gprof2dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMap {
    #[default]
    Color,
    Pink,
    Gray,
    Bw,
    Print,
}

impl fmt::Display for ColorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.to_possible_value().map(|p| p.get_name().to_string()).unwrap_or_default();
        f.write_str(&name)
    }
}

/// A restriction applied to a profile listing.
///
/// Free-form values are coerced in order: integer, then float, then text.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// Keep at most this many rows
    Count(i64),
    /// Keep this fraction of rows when in `[0.0, 1.0)`
    Fraction(f64),
    /// Keep rows whose `file:line(name)` matches this regular expression
    Pattern(String),
}

impl Restriction {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if let Ok(count) = value.parse::<i64>() {
            Restriction::Count(count)
        } else if let Ok(fraction) = value.parse::<f64>() {
            Restriction::Fraction(fraction)
        } else {
            Restriction::Pattern(value.to_string())
        }
    }
}

/// Renders the way the listing echoes it: `5`, `0.25`, `'name'`.
impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restriction::Count(n) => write!(f, "{n}"),
            Restriction::Fraction(x) => write!(f, "{x:?}"),
            Restriction::Pattern(p) => write!(f, "'{p}'"),
        }
    }
}

//! Textual profile listings.
//!
//! [`StatsView`] prints a profile the way Python's `pstats` does, so the
//! output reads the same as any other deterministic-profiler report:
//!
//! ```text
//!          7 function calls (5 primitive calls) in 0.004 seconds
//!
//!    Ordered by: cumulative time
//!    List reduced from 6 to 2 due to restriction <2>
//!
//!    ncalls  tottime  percall  cumtime  percall filename:lineno(function)
//!         1    0.001    0.001    0.004    0.004 tests/parse.rs:10(test_parse)
//!       3/1    0.002    0.001    0.003    0.003 src/lib.rs:42(parse_expr)
//! ```
//!
//! # Usage
//!
//! Strip directories first (it discards any ordering), then sort, then
//! reverse, then print with restrictions:
//!
//! ```
//! use testprof::analysis::StatsView;
//! use testprof::domain::{Restriction, SortKey};
//! use testprof_common::ProfileData;
//!
//! let mut view = StatsView::new(ProfileData::new());
//! view.strip_dirs().sort_stats(&[SortKey::Tottime]);
//! let mut out = Vec::new();
//! view.print_stats(&mut out, &[Restriction::Count(10)]).unwrap();
//! ```

use crate::domain::{Restriction, SortKey};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;
use testprof_common::{CallStats, FunctionKey, ProfileData, ProfileFormatError};

// =============================================================================
// SORT FIELDS
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Field {
    PrimitiveCalls,
    TotalCalls,
    InlineTime,
    CumulativeTime,
    File,
    Line,
    Name,
    StdName,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Ascending,
    Descending,
}

fn sort_fields(key: SortKey) -> &'static [(Field, Direction)] {
    use Direction::{Ascending, Descending};
    match key {
        SortKey::Calls | SortKey::Ncalls => &[(Field::TotalCalls, Descending)],
        SortKey::Cumulative | SortKey::Cumtime => &[(Field::CumulativeTime, Descending)],
        SortKey::File | SortKey::Filename | SortKey::Module => &[(Field::File, Ascending)],
        SortKey::Line => &[(Field::Line, Ascending)],
        SortKey::Name => &[(Field::Name, Ascending)],
        SortKey::Nfl => &[(Field::Name, Ascending), (Field::File, Ascending), (Field::Line, Ascending)],
        SortKey::Pcalls => &[(Field::PrimitiveCalls, Descending)],
        SortKey::Stdname => &[(Field::StdName, Ascending)],
        SortKey::Time | SortKey::Tottime => &[(Field::InlineTime, Descending)],
    }
}

fn compare_field(field: Field, a: (&FunctionKey, &CallStats), b: (&FunctionKey, &CallStats)) -> Ordering {
    match field {
        Field::PrimitiveCalls => a.1.primitive_calls.cmp(&b.1.primitive_calls),
        Field::TotalCalls => a.1.total_calls.cmp(&b.1.total_calls),
        Field::InlineTime => a.1.inline_time.total_cmp(&b.1.inline_time),
        Field::CumulativeTime => a.1.cumulative_time.total_cmp(&b.1.cumulative_time),
        Field::File => a.0.file.cmp(&b.0.file),
        Field::Line => a.0.line.cmp(&b.0.line),
        Field::Name => a.0.name.cmp(&b.0.name),
        Field::StdName => a.0.to_string().cmp(&b.0.to_string()),
    }
}

// =============================================================================
// STATS VIEW
// =============================================================================

/// A profile plus the ordering used to list it.
#[derive(Debug, Clone)]
pub struct StatsView {
    /// Source files, echoed at the top of flat listings
    files: Vec<String>,
    data: ProfileData,
    /// `None` lists functions in natural (file, line, name) order
    order: Option<Vec<FunctionKey>>,
    sort_description: String,
}

impl StatsView {
    #[must_use]
    pub fn new(data: ProfileData) -> Self {
        Self { files: Vec::new(), data, order: None, sort_description: String::new() }
    }

    /// View of a profile that was read from (or written to) `path`.
    #[must_use]
    pub fn with_source(data: ProfileData, path: &Path) -> Self {
        let mut view = Self::new(data);
        view.files.push(path.display().to_string());
        view
    }

    /// # Errors
    /// Fails when the file cannot be read or is not a profile.
    pub fn load(path: &Path) -> Result<Self, ProfileFormatError> {
        Ok(Self::with_source(ProfileData::load(path)?, path))
    }

    #[must_use]
    pub fn data(&self) -> &ProfileData {
        &self.data
    }

    /// Drop leading directories from every file name, merging functions that
    /// become indistinguishable. Any sort order is discarded.
    pub fn strip_dirs(&mut self) -> &mut Self {
        self.data = self.data.map_keys(FunctionKey::stripped);
        self.order = None;
        self.sort_description.clear();
        self
    }

    /// Sort by `keys`, the first key being the most significant. An empty
    /// slice restores natural order.
    pub fn sort_stats(&mut self, keys: &[SortKey]) -> &mut Self {
        if keys.is_empty() {
            self.order = None;
            self.sort_description.clear();
            return self;
        }

        let fields: Vec<(Field, Direction)> = keys.iter().flat_map(|k| sort_fields(*k).iter().copied()).collect();
        let mut order: Vec<(&FunctionKey, &CallStats)> =
            self.data.functions().iter().map(|(k, p)| (k, &p.stats)).collect();
        order.sort_by(|a, b| {
            for (field, direction) in &fields {
                let ord = compare_field(*field, *a, *b);
                let ord = match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        self.order = Some(order.into_iter().map(|(k, _)| k.clone()).collect());
        self.sort_description = keys.iter().map(|k| k.description()).collect::<Vec<_>>().join(", ");
        self
    }

    /// Reverse the current sort order. No effect on natural order.
    pub fn reverse_order(&mut self) -> &mut Self {
        if let Some(order) = self.order.as_mut() {
            order.reverse();
        }
        self
    }

    /// Flat listing of every selected function.
    ///
    /// # Errors
    /// Write failures.
    pub fn print_stats<W: Write>(&self, out: &mut W, restrictions: &[Restriction]) -> io::Result<()> {
        for file in &self.files {
            writeln!(out, "{file}")?;
        }
        if !self.files.is_empty() {
            writeln!(out)?;
        }

        let total = self.data.total_calls();
        let primitive = self.data.primitive_calls();
        write!(out, "         {total} function calls")?;
        if total != primitive {
            write!(out, " ({primitive} primitive calls)")?;
        }
        writeln!(out, " in {:.3} seconds", self.data.total_time())?;
        writeln!(out)?;

        let Some((_, list)) = self.print_list(out, restrictions)? else {
            return Ok(());
        };
        writeln!(out, "   ncalls  tottime  percall  cumtime  percall filename:lineno(function)")?;
        for key in list {
            if let Some(profile) = self.data.get(key) {
                writeln!(out, "{}", format_line(key, &profile.stats))?;
            }
        }
        writeln!(out)?;
        writeln!(out)
    }

    /// For each selected function, the functions it called.
    ///
    /// # Errors
    /// Write failures.
    pub fn print_callees<W: Write>(&self, out: &mut W, restrictions: &[Restriction]) -> io::Result<()> {
        let Some((width, list)) = self.print_list(out, restrictions)? else {
            return Ok(());
        };
        let callees = self.data.callees();
        self.print_call_heading(out, width, "called...")?;
        for key in list {
            let calls: Vec<(&FunctionKey, &CallStats)> =
                callees.get(key).map(|c| c.iter().map(|(k, s)| (*k, s)).collect()).unwrap_or_default();
            print_call_line(out, width, key, &calls)?;
        }
        writeln!(out)?;
        writeln!(out)
    }

    /// For each selected function, the functions that called it.
    ///
    /// # Errors
    /// Write failures.
    pub fn print_callers<W: Write>(&self, out: &mut W, restrictions: &[Restriction]) -> io::Result<()> {
        let Some((width, list)) = self.print_list(out, restrictions)? else {
            return Ok(());
        };
        self.print_call_heading(out, width, "was called by...")?;
        for key in list {
            let calls: Vec<(&FunctionKey, &CallStats)> =
                self.data.get(key).map(|p| p.callers.iter().collect()).unwrap_or_default();
            print_call_line(out, width, key, &calls)?;
        }
        writeln!(out)?;
        writeln!(out)
    }

    /// Apply restrictions and print the ordering header.
    ///
    /// Returns the name column width and the selected functions, or `None`
    /// when nothing is selected (in which case nothing is printed).
    fn print_list<W: Write>(
        &self,
        out: &mut W,
        restrictions: &[Restriction],
    ) -> io::Result<Option<(usize, Vec<&FunctionKey>)>> {
        let (mut list, mut msg): (Vec<&FunctionKey>, String) = match &self.order {
            Some(order) => (order.iter().collect(), format!("   Ordered by: {}\n", self.sort_description)),
            None => (self.data.functions().keys().collect(), "   Listed in natural (file, line, name) order\n".to_string()),
        };

        for restriction in restrictions {
            list = apply_restriction(restriction, list, &mut msg);
        }
        if list.is_empty() {
            return Ok(None);
        }

        writeln!(out, "{msg}")?;
        let width = list.iter().map(|k| k.to_string().chars().count()).max().unwrap_or(0) + 2;
        Ok(Some((width, list)))
    }

    fn print_call_heading<W: Write>(&self, out: &mut W, width: usize, title: &str) -> io::Result<()> {
        writeln!(out, "{:<width$}{title}", "Function ")?;
        // Edge statistics exist once any function has a caller
        if self.data.functions().values().any(|p| !p.callers.is_empty()) {
            writeln!(out, "{}    ncalls  tottime  cumtime", " ".repeat(width))?;
        }
        Ok(())
    }
}

/// Narrow `list` by one restriction, noting any reduction in `msg`.
fn apply_restriction<'a>(restriction: &Restriction, list: Vec<&'a FunctionKey>, msg: &mut String) -> Vec<&'a FunctionKey> {
    let before = list.len();
    let reduced: Vec<&FunctionKey> = match restriction {
        Restriction::Pattern(pattern) => match Regex::new(pattern) {
            Ok(regex) => list.into_iter().filter(|k| regex.is_match(&k.to_string())).collect(),
            Err(_) => {
                let _ = writeln!(msg, "   <Invalid regular expression {restriction}>");
                return list;
            }
        },
        Restriction::Fraction(fraction) if (0.0..1.0).contains(fraction) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let count = (before as f64 * fraction + 0.5) as usize;
            list.into_iter().take(count).collect()
        }
        Restriction::Count(count) if *count >= 0 && usize::try_from(*count).is_ok_and(|c| c < before) => {
            list.into_iter().take(usize::try_from(*count).unwrap_or(before)).collect()
        }
        Restriction::Fraction(_) | Restriction::Count(_) => list,
    };
    if reduced.len() != before {
        let _ = writeln!(msg, "   List reduced from {before} to {} due to restriction <{restriction}>", reduced.len());
    }
    reduced
}

fn f8(value: f64) -> String {
    format!("{value:8.3}")
}

/// `ncalls tottime percall cumtime percall filename:lineno(function)` row.
#[allow(clippy::cast_precision_loss)]
fn format_line(key: &FunctionKey, stats: &CallStats) -> String {
    let mut calls = stats.total_calls.to_string();
    if stats.has_recursion() {
        let _ = write!(calls, "/{}", stats.primitive_calls);
    }
    let blank = " ".repeat(8);
    let inline_per_call =
        if stats.total_calls == 0 { blank.clone() } else { f8(stats.inline_time / stats.total_calls as f64) };
    let cumulative_per_call =
        if stats.primitive_calls == 0 { blank } else { f8(stats.cumulative_time / stats.primitive_calls as f64) };
    format!(
        "{calls:>9} {} {inline_per_call} {} {cumulative_per_call} {key}",
        f8(stats.inline_time),
        f8(stats.cumulative_time)
    )
}

/// One function followed by its call edges, one per line, in key order.
fn print_call_line<W: Write>(
    out: &mut W,
    width: usize,
    source: &FunctionKey,
    calls: &[(&FunctionKey, &CallStats)],
) -> io::Result<()> {
    write!(out, "{:<width$} ", source.to_string())?;
    if calls.is_empty() {
        return writeln!(out);
    }

    let mut calls = calls.to_vec();
    calls.sort_by(|a, b| a.0.cmp(b.0));
    for (i, (key, edge)) in calls.iter().enumerate() {
        let mut substats = edge.total_calls.to_string();
        if edge.has_recursion() {
            let _ = write!(substats, "/{}", edge.primitive_calls);
        }
        let (prefix, pad) = if i == 0 { (String::new(), 7) } else { (" ".repeat(width + 1), 9) };
        writeln!(
            out,
            "{prefix}{substats:>pad$} {} {}  {key}",
            f8(edge.inline_time),
            f8(edge.cumulative_time)
        )?;
    }
    Ok(())
}

//! CLI argument definitions

use crate::config::settings::{self, SettingValue};
use crate::domain::{ColorMap, ProfilingMode, SortKey};
use clap::{Args as ClapArgs, Command, Parser, ValueEnum};
use log::debug;
use std::path::PathBuf;

/// Profiling flags, shared by the report binary and the test harness.
///
/// Field names double as setting names, so the resolver can ask clap where
/// each value came from.
#[derive(ClapArgs, Debug, Clone)]
#[command(next_help_heading = "Profiling")]
pub struct ProfilingArgs {
    /// Generate profiling information
    #[arg(long)]
    pub profile: bool,

    /// Generate profiling graph (using gprof2dot and dot -Tsvg)
    #[arg(long)]
    pub profile_svg: bool,

    /// Directory for the profile data files
    #[arg(long, value_name = "DIR")]
    pub pstats_dir: Option<PathBuf>,

    /// How many elements to display in a result
    #[arg(long, value_name = "N", default_value_t = settings::DEFAULT_ELEMENT_NUMBER)]
    pub element_number: i64,

    /// Hide the leading path information of file names
    #[arg(long)]
    pub strip_dirs: bool,

    /// Which listing to print
    #[arg(long, value_enum, value_name = "MODE")]
    pub profiling_mode: Option<ProfilingMode>,

    /// Sort key for the listing (repeatable, applied in order)
    #[arg(long, value_enum, value_name = "KEY")]
    pub profiling_sort_key: Vec<SortKey>,

    /// Reverse the listing order
    #[arg(long)]
    pub profiling_rev_order: bool,

    /// Restriction applied to the listing: a count, a fraction or a regex (repeatable)
    #[arg(long, value_name = "VALUE")]
    pub profiling_filter: Vec<String>,

    /// Eliminate nodes below this threshold
    #[arg(long, value_name = "PERCENT")]
    pub gprof2dot_node_thres: Option<f64>,

    /// Eliminate edges below this threshold
    #[arg(long, value_name = "PERCENT")]
    pub gprof2dot_edge_thres: Option<f64>,

    /// Skew the colorization curve (< 1.0 more variety at low percentages)
    #[arg(long, value_name = "THETA")]
    pub gprof2dot_skew: Option<f64>,

    /// Color map of the graph
    #[arg(long, value_enum, value_name = "MAP")]
    pub gprof2dot_colormap: Option<ColorMap>,

    /// Prune the graph to descendants of this function
    #[arg(long, value_name = "FUNCTION")]
    pub gprof2dot_root: Option<String>,

    /// Prune the graph to ancestors of this function
    #[arg(long, value_name = "FUNCTION")]
    pub gprof2dot_leaf: Option<String>,

    /// Seconds to wait for the graph rendering (0 = unlimited)
    #[arg(long, value_name = "SECS")]
    pub render_timeout: Option<f64>,
}

impl Default for ProfilingArgs {
    fn default() -> Self {
        Self {
            profile: false,
            profile_svg: false,
            pstats_dir: None,
            element_number: settings::DEFAULT_ELEMENT_NUMBER,
            strip_dirs: false,
            profiling_mode: None,
            profiling_sort_key: Vec::new(),
            profiling_rev_order: false,
            profiling_filter: Vec::new(),
            gprof2dot_node_thres: None,
            gprof2dot_edge_thres: None,
            gprof2dot_skew: None,
            gprof2dot_colormap: None,
            gprof2dot_root: None,
            gprof2dot_leaf: None,
            render_timeout: None,
        }
    }
}

impl ProfilingArgs {
    /// Value parsed for a setting, or `None` when the flag holds no value.
    #[must_use]
    pub fn setting_value(&self, name: &str) -> Option<SettingValue> {
        match name {
            settings::PROFILE => Some(SettingValue::Bool(self.profile)),
            settings::PROFILE_SVG => Some(SettingValue::Bool(self.profile_svg)),
            settings::PSTATS_DIR => {
                self.pstats_dir.as_ref().map(|d| SettingValue::Str(d.to_string_lossy().into_owned()))
            }
            settings::ELEMENT_NUMBER => Some(SettingValue::Int(self.element_number)),
            settings::STRIP_DIRS => Some(SettingValue::Bool(self.strip_dirs)),
            settings::PROFILING_MODE => self.profiling_mode.map(|m| SettingValue::Str(choice_name(&m))),
            settings::PROFILING_SORT_KEY => {
                Some(SettingValue::List(self.profiling_sort_key.iter().map(choice_name).collect()))
            }
            settings::PROFILING_REV_ORDER => Some(SettingValue::Bool(self.profiling_rev_order)),
            settings::PROFILING_FILTER => Some(SettingValue::List(self.profiling_filter.clone())),
            settings::GPROF2DOT_NODE_THRES => self.gprof2dot_node_thres.map(SettingValue::Float),
            settings::GPROF2DOT_EDGE_THRES => self.gprof2dot_edge_thres.map(SettingValue::Float),
            settings::GPROF2DOT_SKEW => self.gprof2dot_skew.map(SettingValue::Float),
            settings::GPROF2DOT_COLORMAP => {
                self.gprof2dot_colormap.map(|c| SettingValue::Str(choice_name(&c)))
            }
            settings::GPROF2DOT_ROOT => self.gprof2dot_root.clone().map(SettingValue::Str),
            settings::GPROF2DOT_LEAF => self.gprof2dot_leaf.clone().map(SettingValue::Str),
            settings::RENDER_TIMEOUT => self.render_timeout.map(SettingValue::Float),
            _ => None,
        }
    }
}

fn choice_name<T: ValueEnum>(value: &T) -> String {
    value.to_possible_value().map(|p| p.get_name().to_string()).unwrap_or_default()
}

/// Arguments of the `testprof` report binary.
#[derive(Parser, Debug)]
#[command(
    name = "testprof",
    about = "Merge per-test profiles and print a profiling summary",
    after_help = "\
EXAMPLES:
    testprof                                   Summarize every profile in ./prof
    testprof prof/test_a.prof prof/test_b.prof Merge the given profiles
    testprof --profiling-mode callees prof     Show who called each function
    testprof --profile-svg --gprof2dot-root=run prof
                                               Also render prof/combined.svg"
)]
pub struct Args {
    /// Profile files or directories holding `*.prof` files (default: the pstats dir)
    #[arg(value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Configuration file (default: testprof.toml found from the current directory up)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    #[command(flatten)]
    pub profiling: ProfilingArgs,
}

/// Arguments accepted by a [`Harness`](crate::harness::Harness) test binary.
///
/// Mirrors the subset of libtest flags that `cargo test` passes through.
#[derive(Parser, Debug, Default)]
#[command(name = "testprof-harness", about = "Run tests with per-test profiling")]
pub struct HarnessArgs {
    /// Only run tests whose name contains this string
    #[arg(value_name = "FILTER")]
    pub filter: Option<String>,

    /// Match the filter exactly
    #[arg(long)]
    pub exact: bool,

    /// Configuration file (default: testprof.toml found from the current directory up)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only print failures and the final result
    #[arg(short, long)]
    pub quiet: bool,

    /// Skip tests whose name contains this string (repeatable)
    #[arg(long, value_name = "FILTER")]
    pub skip: Vec<String>,

    /// List the tests instead of running them
    #[arg(long)]
    pub list: bool,

    /// Run only ignored tests
    #[arg(long)]
    pub ignored: bool,

    /// Run ignored and not ignored tests
    #[arg(long)]
    pub include_ignored: bool,

    /// Output format; `terse` lists bare test names
    #[arg(long, hide = true, value_name = "FORMAT")]
    pub format: Option<String>,

    // Accepted for libtest compatibility, no effect
    #[arg(long, hide = true)]
    pub nocapture: bool,

    #[arg(long, hide = true)]
    pub show_output: bool,

    #[arg(long, hide = true, value_name = "N")]
    pub test_threads: Option<usize>,

    #[arg(long, hide = true, value_name = "WHEN")]
    pub color: Option<String>,

    #[arg(long, hide = true, value_name = "PATH")]
    pub logfile: Option<PathBuf>,

    #[arg(long, hide = true)]
    pub test: bool,

    #[arg(long, hide = true)]
    pub bench: bool,

    #[arg(long, hide = true)]
    pub exclude_should_panic: bool,

    #[arg(long, hide = true)]
    pub force_run_in_process: bool,

    #[arg(long, hide = true)]
    pub report_time: bool,

    #[arg(long, hide = true)]
    pub ensure_time: bool,

    #[arg(long, hide = true)]
    pub shuffle: bool,

    #[arg(long, hide = true, value_name = "SEED")]
    pub shuffle_seed: Option<u64>,

    #[arg(short = 'Z', hide = true, value_name = "FLAG")]
    pub unstable_flags: Vec<String>,

    #[command(flatten)]
    pub profiling: ProfilingArgs,
}

/// Long-form prefix of gprof2dot passthrough flags.
pub const PASSTHROUGH_FLAG_PREFIX: &str = "--gprof2dot-";

/// Drop long flags that `command` does not declare.
///
/// Undeclared `--gprof2dot-*` options are forwarded as-is (see
/// [`OptionResolver::passthrough_flags`](crate::config::OptionResolver::passthrough_flags)),
/// and any other undeclared flag belongs to whatever else shares the command
/// line, so both are removed before clap sees them. Such flags must use the
/// `--name[=value]` form; a separate value token would be read as a
/// positional argument. Tokens after `--` are left alone.
#[must_use]
pub fn strip_passthrough<I, S>(command: &Command, raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = command.clone();
    command.build();
    let declared: Vec<String> = command
        .get_arguments()
        .filter_map(|arg| arg.get_long().map(|long| format!("--{long}")))
        .collect();

    let mut out = Vec::new();
    let mut after_separator = false;
    for token in raw {
        let token = token.into();
        if token == "--" {
            after_separator = true;
        }
        if !after_separator && token.starts_with("--") && token.len() > 2 {
            let flag = token.split_once('=').map_or(token.as_str(), |(flag, _)| flag);
            if !declared.iter().any(|d| d == flag) {
                if !token.starts_with(PASSTHROUGH_FLAG_PREFIX) {
                    debug!("Ignoring unknown flag {token}");
                }
                continue;
            }
        }
        out.push(token);
    }
    out
}

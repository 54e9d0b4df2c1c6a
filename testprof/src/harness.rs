//! Test runner with per-test profiling
//!
//! A `harness = false` test target builds a [`Harness`], registers its tests
//! and runs them. Each test runs inside a [`ProfilingLayer`] subscriber, so
//! every `#[tracing::instrument]`ed function it reaches shows up in its
//! profile.
//!
//! ```no_run
//! use testprof::harness::Harness;
//!
//! fn parses_header() -> anyhow::Result<()> {
//!     Ok(())
//! }
//!
//! fn main() {
//!     let conclusion = Harness::from_env()
//!         .test("parses_header", parses_header)
//!         .run()
//!         .unwrap_or_else(|e| {
//!             eprintln!("error: {e:#}");
//!             std::process::exit(1);
//!         });
//!     std::process::exit(conclusion.exit_code());
//! }
//! ```

use crate::cli::{strip_passthrough, HarnessArgs};
use crate::config::{OptionResolver, PersistedConfig, ProfilingConfig};
use crate::profiling::{scope, ProfilingLayer};
use crate::session::ProfilingPlugin;
use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use log::debug;
use std::any::Any;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe, Location};
use testprof_common::FunctionKey;
use tracing_subscriber::layer::SubscriberExt;

/// Exit code of a run with failed tests, as libtest uses.
pub const EXIT_TESTS_FAILED: i32 = 101;

type TestFn = Box<dyn FnOnce() -> Result<()>>;

struct TestCase {
    name: String,
    /// Root frame of the test's profile, located at the registration call
    frame: FunctionKey,
    body: TestFn,
}

/// Counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Conclusion {
    pub passed: usize,
    pub failed: usize,
    pub filtered_out: usize,
}

impl Conclusion {
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed > 0
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.has_failed() {
            EXIT_TESTS_FAILED
        } else {
            0
        }
    }
}

pub struct Harness {
    args: HarnessArgs,
    matches: ArgMatches,
    raw_args: Vec<String>,
    tests: Vec<TestCase>,
}

impl Harness {
    /// Harness for the current process arguments.
    ///
    /// Invalid arguments print clap's usage message and exit.
    #[must_use]
    pub fn from_env() -> Self {
        let raw_args: Vec<String> = std::env::args().collect();
        let matches =
            HarnessArgs::command().get_matches_from(strip_passthrough(&HarnessArgs::command(), raw_args.clone()));
        let args = HarnessArgs::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        Self { args, matches, raw_args, tests: Vec::new() }
    }

    /// Harness for an explicit argument list; the first item is the binary name.
    ///
    /// # Errors
    /// Fails when the arguments do not parse.
    pub fn from_args<I, S>(raw: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw_args: Vec<String> = raw.into_iter().map(Into::into).collect();
        let matches = HarnessArgs::command()
            .try_get_matches_from(strip_passthrough(&HarnessArgs::command(), raw_args.clone()))?;
        let args = HarnessArgs::from_arg_matches(&matches)?;
        Ok(Self { args, matches, raw_args, tests: Vec::new() })
    }

    /// Register a test. Tests run in registration order.
    ///
    /// The test's profile gets a root frame named after the test, located
    /// where it was registered.
    #[must_use]
    #[track_caller]
    pub fn test(mut self, name: impl Into<String>, body: impl FnOnce() -> Result<()> + 'static) -> Self {
        let name = name.into();
        let location = Location::caller();
        let frame = FunctionKey::new(location.file(), location.line(), name.as_str());
        self.tests.push(TestCase { name, frame, body: Box::new(body) });
        self
    }

    /// Run the tests, reporting on stdout.
    ///
    /// # Errors
    /// See [`Harness::run_with_output`].
    pub fn run(self) -> Result<Conclusion> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_with_output(&mut out)
    }

    /// Run the tests, reporting to `out`.
    ///
    /// Test failures are counted in the [`Conclusion`], not returned.
    ///
    /// # Errors
    /// Fails on invalid profiling configuration, when profiles cannot be
    /// written or merged, and on write failures.
    pub fn run_with_output<W: Write>(self, out: &mut W) -> Result<Conclusion> {
        // A test binary may have set up its own logger already
        let _ = env_logger::try_init();

        let Self { args, matches, raw_args, tests } = self;
        if args.list {
            return list_tests(&args, &tests, out);
        }

        let persisted = PersistedConfig::locate(args.config.as_deref()).context("Failed to load configuration")?;
        let resolver = OptionResolver::from_cli(&args.profiling, &matches, persisted, raw_args)?;
        let config = ProfilingConfig::resolve(&resolver)?;

        let mut plugin = if config.enabled {
            let mut plugin = ProfilingPlugin::new(config)?;
            plugin.session_start()?;
            Some(plugin)
        } else {
            debug!("Profiling disabled");
            None
        };

        let total = tests.len();
        let selected: Vec<TestCase> = tests.into_iter().filter(|t| selects(&args, &t.name)).collect();
        let mut conclusion = Conclusion { filtered_out: total - selected.len(), ..Conclusion::default() };

        writeln!(out)?;
        writeln!(out, "running {} test{}", selected.len(), plural(selected.len()))?;

        let subscriber = tracing_subscriber::registry().with(ProfilingLayer::new());
        let failures = tracing::subscriber::with_default(subscriber, || -> Result<Vec<(String, String)>> {
            let mut failures = Vec::new();
            for TestCase { name, frame, body } in selected {
                let outcome = match plugin.as_mut() {
                    Some(plugin) => plugin
                        .run_test(&name, || {
                            let _frame = scope(frame);
                            run_isolated(body)
                        })
                        .with_context(|| format!("Failed to profile {name}"))?,
                    None => run_isolated(body),
                };

                match outcome {
                    Ok(()) => {
                        conclusion.passed += 1;
                        if !args.quiet {
                            writeln!(out, "test {name} ... ok")?;
                        }
                    }
                    Err(message) => {
                        conclusion.failed += 1;
                        writeln!(out, "test {name} ... FAILED")?;
                        failures.push((name, message));
                    }
                }
            }
            Ok(failures)
        })?;

        if !failures.is_empty() {
            writeln!(out)?;
            writeln!(out, "failures:")?;
            for (name, message) in &failures {
                writeln!(out)?;
                writeln!(out, "---- {name} ----")?;
                writeln!(out, "{message}")?;
            }
            writeln!(out)?;
            writeln!(out, "failures:")?;
            for (name, _) in &failures {
                writeln!(out, "    {name}")?;
            }
        }

        writeln!(out)?;
        writeln!(
            out,
            "test result: {}. {} passed; {} failed; 0 ignored; 0 measured; {} filtered out",
            if conclusion.has_failed() { "FAILED" } else { "ok" },
            conclusion.passed,
            conclusion.failed,
            conclusion.filtered_out,
        )?;

        if let Some(mut plugin) = plugin {
            plugin.session_finish()?;
            writeln!(out)?;
            plugin.terminal_summary(out)?;
        }

        Ok(conclusion)
    }
}

fn selects(args: &HarnessArgs, name: &str) -> bool {
    let matches = |pattern: &str| if args.exact { name == pattern } else { name.contains(pattern) };
    // No registered test is ignored
    if args.ignored && !args.include_ignored {
        return false;
    }
    args.filter.as_deref().is_none_or(matches) && !args.skip.iter().any(|s| matches(s))
}

/// `--list` output: one `name: test` line per selected test.
fn list_tests<W: Write>(args: &HarnessArgs, tests: &[TestCase], out: &mut W) -> Result<Conclusion> {
    let mut listed = 0;
    for test in tests.iter().filter(|t| selects(args, &t.name)) {
        writeln!(out, "{}: test", test.name)?;
        listed += 1;
    }
    if args.format.as_deref() != Some("terse") {
        writeln!(out)?;
        writeln!(out, "{listed} test{}, 0 benchmarks", plural(listed))?;
    }
    Ok(Conclusion::default())
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Run a test body, turning errors and panics into a failure message.
fn run_isolated(body: TestFn) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("Error: {e:?}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "Box<dyn Any>"
    }
}

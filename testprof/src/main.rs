//! # testprof - Main Entry Point
//!
//! Merges per-test profiles written by a profiled test run and prints the
//! same end-of-session summary the harness prints:
//! - **Directories** contribute every `*.prof` file they hold
//! - **Files** are merged as given
//! - With `--profile-svg` the combined profile is also rendered to SVG

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches};
use log::info;
use std::io::{self, Write};
use std::path::PathBuf;

use testprof::cli::{strip_passthrough, Args};
use testprof::config::{OptionResolver, PersistedConfig, ProfilingConfig};
use testprof::domain::ConfigError;
use testprof::session::{collect_profiles, ProfilingPlugin};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some()) {
        return EXIT_USAGE;
    }
    let msg = err.to_string().to_lowercase();
    if msg.contains("no profiles found") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().collect();
    let command = Args::command();
    let matches = command.clone().get_matches_from(strip_passthrough(&command, raw_args.clone()));
    let args = Args::from_arg_matches(&matches)?;

    let persisted = PersistedConfig::locate(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(source) = persisted.source() {
        info!("Using settings from {}", source.display());
    }
    let resolver = OptionResolver::from_cli(&args.profiling, &matches, persisted, raw_args)?;
    let mut config = ProfilingConfig::resolve(&resolver)?;
    // Summarizing is the whole point of this binary
    config.enabled = true;

    let inputs: Vec<PathBuf> = if args.inputs.is_empty() { vec![config.dir.clone()] } else { args.inputs.clone() };
    let profiles = collect_profiles(&inputs).context("Failed to collect profiles")?;
    if profiles.is_empty() {
        anyhow::bail!(
            "No profiles found in {}.\n\n\
             Run the tests with --profile first, or pass profile files:\n  \
             testprof prof/test_a.prof prof/test_b.prof",
            inputs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
        );
    }
    if !args.quiet {
        eprintln!("Merging {} profile(s)", profiles.len());
    }

    let mut plugin = ProfilingPlugin::new(config)?;
    plugin.extend_profiles(profiles);
    plugin.session_finish()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    plugin.terminal_summary(&mut out)?;
    out.flush()?;
    Ok(())
}

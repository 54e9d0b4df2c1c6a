//! # testprof - Per-test Profiling for Rust Test Suites
//!
//! testprof records a deterministic call profile for every test of a
//! session, merges them into one combined profile, prints a pstats-style
//! listing at the end of the run and can render the combined profile as an
//! SVG call graph through `gprof2dot` and Graphviz `dot`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Test Binary (harness = false)                   │
//! │           #[tracing::instrument] code under test                │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ span enter / exit
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     testprof (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │  Profiling   │──▶│   Session    │──▶│    Report    │        │
//! │  │ (recorder)   │   │ (merge/keep) │   │  (listing)   │        │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘        │
//! │         │                  │                                    │
//! │         ▼                  ▼                                    │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │  <test>.prof │   │    Export    │──▶│    Render    │        │
//! │  │ combined.prof│   │ (callgrind)  │   │ gprof2dot|dot│        │
//! │  └──────────────┘   └──────────────┘   └──────────────┘        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: Call recorder, the `tracing` layer feeding it and the
//!   per-test profile files
//! - [`session`]: Session lifecycle and the combined profile
//! - [`analysis`]: Sorted, restricted listings of a profile
//! - [`export`]: Callgrind export consumed by `gprof2dot`
//! - [`render`]: The `gprof2dot | dot` pipeline
//! - [`report`]: End-of-session terminal summary
//! - [`config`]: Setting schema, `testprof.toml` and precedence resolution
//! - [`cli`]: Command-line flags
//! - [`harness`]: libtest-style runner for `harness = false` test targets
//! - [`domain`]: Choices, restrictions and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Profile every test of a harness = false target
//! cargo test --test bench -- --profile
//!
//! # Also render prof/combined.svg, pruned to one subtree
//! cargo test --test bench -- --profile-svg --gprof2dot-root=parse
//!
//! # Summarize profiles written earlier
//! testprof --profiling-mode callees prof
//! ```
//!
//! ## Key Concepts
//!
//! - **Primitive call**: A call that was not reached through recursion
//! - **Inline time**: Time spent in a function excluding its callees
//! - **Cumulative time**: Time spent in a function including its callees
//! - **Restriction**: Count, fraction or name regex limiting a listing

pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod harness;
pub mod profiling;
pub mod render;
pub mod report;
pub mod session;

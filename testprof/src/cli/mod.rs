//! Command-line interface

pub mod args;

pub use args::{strip_passthrough, Args, HarnessArgs, ProfilingArgs, PASSTHROUGH_FLAG_PREFIX};

//! Test session lifecycle
//!
//! - `plugin`: per-session state driving the profiling hooks
//! - `aggregator`: merge of per-test profiles into `combined.prof`

pub mod aggregator;
pub mod plugin;

pub use aggregator::{collect_profiles, combine, CombinedProfile};
pub use plugin::ProfilingPlugin;

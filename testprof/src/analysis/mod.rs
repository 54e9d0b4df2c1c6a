//! Analysis of recorded profiles
//!
//! Pure listing logic, separate from the session and terminal plumbing.

pub mod stats_view;

pub use stats_view::StatsView;

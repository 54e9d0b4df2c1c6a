//! Domain model for testprof
//!
//! This module contains core domain types and errors that provide:
//! - Typed choices for sort keys, presentation modes and color maps
//! - Restriction values coerced from free-form strings
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{parse_choice, ColorMap, ProfilingMode, Restriction, SortKey};

pub use errors::{ConfigError, ProfilingError};

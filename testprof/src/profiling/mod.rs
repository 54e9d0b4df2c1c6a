//! Per-test profiling
//!
//! - `recorder`: thread-local deterministic call recorder
//! - `layer`: tracing layer feeding span activity into the recorder
//! - `hook`: sanitized file naming and profile persistence

pub mod hook;
pub mod layer;
pub mod recorder;

pub use hook::{clean_filename, ensure_dir, hashed_filename, persist_profile, LARGE_FILENAME_HASH_LEN};
pub use layer::ProfilingLayer;
pub use recorder::{enter, exit, is_recording, scope, Profiler, Recorder, ScopeGuard};

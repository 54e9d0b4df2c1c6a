//! Profile export functionality
//!
//! Currently supports the callgrind format, which gprof2dot turns into a
//! call graph for the SVG render.

pub mod callgrind;

pub use callgrind::CallgrindExporter;

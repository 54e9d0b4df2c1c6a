//! SVG call-graph rendering
//!
//! The combined profile is exported as callgrind, fed to gprof2dot and the
//! resulting graph description piped into Graphviz `dot`. Failures never
//! abort the session; they are recorded as a [`RenderOutcome`] and reported
//! in the summary.

pub mod pipeline;

pub use pipeline::{run_pipeline, run_pipeline_blocking, PipelineOutcome, RenderCommand, RenderPrograms};

use crate::export::CallgrindExporter;
use log::{debug, info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use testprof_common::ProfileData;

/// Callgrind export of the combined profile, input of stage 1.
pub const CALLGRIND_FILE_NAME: &str = "combined.callgrind";

/// Rendered call graph.
pub const SVG_FILE_NAME: &str = "combined.svg";

/// What happened to the SVG render.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenderOutcome {
    #[default]
    NotRequested,
    Succeeded {
        svg: PathBuf,
    },
    Stage1Failed {
        svg: PathBuf,
        stage1: RenderCommand,
        reason: String,
    },
    Stage2Failed {
        svg: PathBuf,
        stage1: RenderCommand,
        stage2: RenderCommand,
        reason: String,
    },
}

impl RenderOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RenderOutcome::Stage1Failed { .. } | RenderOutcome::Stage2Failed { .. })
    }
}

/// Options of one render.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// Directory receiving `combined.callgrind` and `combined.svg`
    pub dir: &'a Path,
    /// Extra gprof2dot flags
    pub options: &'a [String],
    pub programs: &'a RenderPrograms,
    pub timeout: Option<Duration>,
}

/// Render `data` to `<dir>/combined.svg`.
#[must_use]
pub fn render_svg(data: &ProfileData, request: &RenderRequest<'_>) -> RenderOutcome {
    let callgrind = request.dir.join(CALLGRIND_FILE_NAME);
    let svg = request.dir.join(SVG_FILE_NAME);
    let stage1 = RenderCommand::gprof2dot(&request.programs.gprof2dot, request.options, &callgrind);
    let stage2 = RenderCommand::dot(&request.programs.dot, &svg);

    if let Err(e) = write_callgrind(data, &callgrind) {
        warn!("Failed to write {}: {e}", callgrind.display());
        return RenderOutcome::Stage1Failed { svg, stage1, reason: e.to_string() };
    }

    debug!("Rendering: {stage1} | {stage2}");
    match run_pipeline_blocking(&stage1, &stage2, request.timeout) {
        PipelineOutcome::Succeeded => {
            info!("SVG profile written to {}", svg.display());
            RenderOutcome::Succeeded { svg }
        }
        PipelineOutcome::Stage1Failed { reason } => {
            warn!("{stage1} failed: {reason}");
            RenderOutcome::Stage1Failed { svg, stage1, reason }
        }
        PipelineOutcome::Stage2Failed { reason } => {
            warn!("{stage2} failed: {reason}");
            RenderOutcome::Stage2Failed { svg, stage1, stage2, reason }
        }
    }
}

fn write_callgrind(data: &ProfileData, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    CallgrindExporter::new(data).export(BufWriter::new(file))
}

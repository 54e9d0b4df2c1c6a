//! End-of-session terminal summary
//!
//! Prints the combined profile listing in the configured mode, then the
//! outcome of the SVG render if one was requested.

use crate::analysis::StatsView;
use crate::config::ProfilingConfig;
use crate::domain::ProfilingMode;
use crate::render::RenderOutcome;
use crate::session::CombinedProfile;
use std::io::{self, Write};

/// Write the profiling section of the summary.
///
/// Nothing is written when no combined profile exists.
///
/// # Errors
/// Write failures.
pub fn write_summary<W: Write>(
    out: &mut W,
    config: &ProfilingConfig,
    combined: Option<&CombinedProfile>,
    render: &RenderOutcome,
) -> io::Result<()> {
    if let Some(combined) = combined {
        writeln!(out, "Profiling (from {}):", combined.path.display())?;

        let mut view = StatsView::with_source(combined.data.clone(), &combined.path);
        if config.strip_dirs {
            view.strip_dirs();
        }
        view.sort_stats(&config.sort_keys);
        // Reverses the sorted order, so it must follow sort_stats
        if config.rev_order {
            view.reverse_order();
        }

        let restrictions = config.effective_restrictions();
        match config.mode {
            ProfilingMode::Stats => view.print_stats(out, &restrictions)?,
            // "callers" lists what each function called
            ProfilingMode::Callers => view.print_callees(out, &restrictions)?,
            ProfilingMode::Callees => view.print_callers(out, &restrictions)?,
        }
    }

    write_render_outcome(out, render)
}

/// Write the SVG render line(s).
///
/// # Errors
/// Write failures.
pub fn write_render_outcome<W: Write>(out: &mut W, render: &RenderOutcome) -> io::Result<()> {
    match render {
        RenderOutcome::NotRequested => Ok(()),
        RenderOutcome::Succeeded { svg } => writeln!(out, "SVG profile created in {}.", svg.display()),
        RenderOutcome::Stage1Failed { svg, stage1, .. } => {
            writeln!(out, "Error creating SVG profile in {}.", svg.display())?;
            writeln!(out, "Command failed: {stage1}")
        }
        RenderOutcome::Stage2Failed { svg, stage1, stage2, .. } => {
            writeln!(out, "Error creating SVG profile in {}.", svg.display())?;
            writeln!(out, "Command succeeded: {stage1} ")?;
            writeln!(out, "Command failed: {stage2}")
        }
    }
}

//! Two-stage render pipeline
//!
//! `gprof2dot ... | dot -Tsvg -o <svg>`: stage 1's stdout is handed to
//! stage 2 as its stdin, so the graph description only ever lives in the OS
//! pipe. Every other captured stream is drained by its own task so neither
//! child can block on a full pipe while we wait for exit statuses.

use log::{debug, warn};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl RenderCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// `gprof2dot -f callgrind <options...> <input>`
    #[must_use]
    pub fn gprof2dot(program: &Path, options: &[String], input: &Path) -> Self {
        let mut args = vec!["-f".to_string(), "callgrind".to_string()];
        args.extend(options.iter().cloned());
        args.push(input.to_string_lossy().into_owned());
        Self::new(program, args)
    }

    /// `dot -Tsvg -o <output>`
    #[must_use]
    pub fn dot(program: &Path, output: &Path) -> Self {
        Self::new(program, vec!["-Tsvg".to_string(), "-o".to_string(), output.to_string_lossy().into_owned()])
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }
}

/// Space-joined, the way it is echoed in the summary.
impl fmt::Display for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Programs used by the render stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPrograms {
    pub gprof2dot: PathBuf,
    pub dot: PathBuf,
}

impl RenderPrograms {
    pub fn new(gprof2dot: impl Into<PathBuf>, dot: impl Into<PathBuf>) -> Self {
        Self { gprof2dot: gprof2dot.into(), dot: dot.into() }
    }

    /// `gprof2dot` installed next to the running executable if there is
    /// one, otherwise whatever `PATH` provides; `dot` from `PATH`.
    #[must_use]
    pub fn discover() -> Self {
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("gprof2dot")))
            .filter(|candidate| candidate.is_file());
        Self::new(sibling.unwrap_or_else(|| PathBuf::from("gprof2dot")), "dot")
    }
}

impl Default for RenderPrograms {
    fn default() -> Self {
        Self::discover()
    }
}

/// Result of running both stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    /// Stage 1 could not be spawned, exited unsuccessfully or wrote to stderr
    Stage1Failed { reason: String },
    /// Stage 1 succeeded, stage 2 did not
    Stage2Failed { reason: String },
}

impl PipelineOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded)
    }
}

type Drain = JoinHandle<io::Result<Vec<u8>>>;

fn drain<R>(reader: Option<R>) -> Drain
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            reader.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(handle: Drain) -> Vec<u8> {
    match handle.await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            debug!("Failed to drain child stream: {e}");
            Vec::new()
        }
        Err(e) => {
            debug!("Drain task failed: {e}");
            Vec::new()
        }
    }
}

async fn wait_both(first: &mut Child, second: &mut Child) -> (io::Result<ExitStatus>, io::Result<ExitStatus>) {
    tokio::join!(first.wait(), second.wait())
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to kill render process: {e}");
    }
    let _ = child.wait().await;
}

/// Failure reason for a finished stage, if it failed.
fn judge(status: &io::Result<ExitStatus>, stderr: &[u8]) -> Option<String> {
    match status {
        Err(e) => Some(format!("wait failed: {e}")),
        Ok(status) if !status.success() => Some(format!("exited with {status}")),
        Ok(_) if !stderr.is_empty() => {
            Some(format!("wrote to stderr: {}", String::from_utf8_lossy(stderr).trim_end()))
        }
        Ok(_) => None,
    }
}

/// Run `first | second`.
///
/// With a `timeout`, both children are killed once it expires and the
/// stage still running is reported as failed.
pub async fn run_pipeline(first: &RenderCommand, second: &RenderCommand, timeout: Option<Duration>) -> PipelineOutcome {
    let mut first_child = {
        let mut cmd = first.command();
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return PipelineOutcome::Stage1Failed { reason: format!("failed to spawn: {e}") },
        }
    };

    let pipe = first_child.stdout.take().map(|stdout| -> io::Result<Stdio> { stdout.try_into() });
    let pipe = match pipe {
        Some(Ok(stdio)) => stdio,
        Some(Err(e)) => {
            reap(&mut first_child).await;
            return PipelineOutcome::Stage1Failed { reason: format!("failed to connect pipe: {e}") };
        }
        None => {
            reap(&mut first_child).await;
            return PipelineOutcome::Stage1Failed { reason: "stdout was not captured".to_string() };
        }
    };

    // The command is dropped right after spawning so that the parent holds
    // no copy of the pipe's read end.
    let mut second_child = {
        let mut cmd = second.command();
        cmd.stdin(pipe).stdout(Stdio::piped()).stderr(Stdio::piped());
        match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                reap(&mut first_child).await;
                return PipelineOutcome::Stage2Failed { reason: format!("failed to spawn: {e}") };
            }
        }
    };

    let first_stderr = drain(first_child.stderr.take());
    let second_stdout = drain(second_child.stdout.take());
    let second_stderr = drain(second_child.stderr.take());

    let waited = match timeout {
        Some(limit) => tokio::time::timeout(limit, wait_both(&mut first_child, &mut second_child)).await.ok(),
        None => Some(wait_both(&mut first_child, &mut second_child).await),
    };

    let Some((first_status, second_status)) = waited else {
        let first_running = matches!(first_child.try_wait(), Ok(None));
        warn!("Render pipeline timed out, killing {first} | {second}");
        reap(&mut first_child).await;
        reap(&mut second_child).await;
        // A grandchild may still hold the streams open
        first_stderr.abort();
        second_stdout.abort();
        second_stderr.abort();
        let reason = format!("timed out after {:.1}s", timeout.unwrap_or_default().as_secs_f64());
        return if first_running {
            PipelineOutcome::Stage1Failed { reason }
        } else {
            PipelineOutcome::Stage2Failed { reason }
        };
    };

    let first_stderr = collect(first_stderr).await;
    let _ = collect(second_stdout).await;
    let second_stderr = collect(second_stderr).await;

    if let Some(reason) = judge(&first_status, &first_stderr) {
        return PipelineOutcome::Stage1Failed { reason };
    }
    if let Some(reason) = judge(&second_status, &second_stderr) {
        return PipelineOutcome::Stage2Failed { reason };
    }
    PipelineOutcome::Succeeded
}

/// Run the pipeline from synchronous code on a private runtime.
///
/// Inside an existing tokio runtime the private runtime is driven from a
/// scoped thread, since a runtime cannot block inside another.
#[must_use]
pub fn run_pipeline_blocking(
    first: &RenderCommand,
    second: &RenderCommand,
    timeout: Option<Duration>,
) -> PipelineOutcome {
    if tokio::runtime::Handle::try_current().is_ok() {
        return std::thread::scope(|scope| {
            scope.spawn(|| block_on_private(first, second, timeout)).join().unwrap_or_else(|_| {
                PipelineOutcome::Stage1Failed { reason: "render thread panicked".to_string() }
            })
        });
    }
    block_on_private(first, second, timeout)
}

fn block_on_private(first: &RenderCommand, second: &RenderCommand, timeout: Option<Duration>) -> PipelineOutcome {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(run_pipeline(first, second, timeout)),
        Err(e) => PipelineOutcome::Stage1Failed { reason: format!("failed to start runtime: {e}") },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        let cmd = RenderCommand::gprof2dot(
            Path::new("gprof2dot"),
            &["--root=run".to_string()],
            Path::new("/tmp/prof/combined.callgrind"),
        );
        assert_eq!(cmd.to_string(), "gprof2dot -f callgrind --root=run /tmp/prof/combined.callgrind");
        let dot = RenderCommand::dot(Path::new("dot"), Path::new("/tmp/prof/combined.svg"));
        assert_eq!(dot.to_string(), "dot -Tsvg -o /tmp/prof/combined.svg");
    }

    #[test]
    fn test_missing_first_program() {
        let first = RenderCommand::new("/nonexistent/gprof2dot", vec![]);
        let second = RenderCommand::new("/nonexistent/dot", vec![]);
        let outcome = run_pipeline_blocking(&first, &second, None);
        assert!(matches!(outcome, PipelineOutcome::Stage1Failed { .. }));
    }

    #[test]
    fn test_judge() {
        let lost: io::Result<ExitStatus> = Err(io::Error::other("gone"));
        assert!(judge(&lost, b"").is_some());
    }
}

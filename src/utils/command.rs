/// Stage descriptors and the process launcher that runs them

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{self, Stream};
use log::{debug, warn};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;

use crate::config::defs::{PipelineError, Stage, NICE_TAG, RULES_EXT, SNAKEMAKE_TAG, STAGE_NICENESS};

/// A program plus its arguments, run at a lowered scheduling priority.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
    pub niceness: i32,
}

impl StageCommand {
    /// `snakemake -s <workflow_dir>/<tag>.rules`
    pub fn snakemake(stage: Stage, workflow_dir: &Path) -> StageCommand {
        let rules = workflow_dir.join(format!("{}.{}", stage.tag(), RULES_EXT));
        StageCommand {
            program: SNAKEMAKE_TAG.to_string(),
            args: vec!["-s".to_string(), rules.to_string_lossy().into_owned()],
            niceness: STAGE_NICENESS,
        }
    }

    /// Full argv. A non-zero niceness puts the `nice` wrapper in front.
    pub fn argv(&self) -> Vec<String> {
        let mut argv: Vec<String> = Vec::new();
        if self.niceness != 0 {
            argv.push(NICE_TAG.to_string());
            argv.push("-n".to_string());
            argv.push(self.niceness.to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

#[derive(Debug, Clone)]
pub struct StageInvocation {
    pub stage: Stage,
    pub command: StageCommand,
    pub log_path: PathBuf,
}

impl StageInvocation {
    pub fn new(stage: Stage, workflow_dir: &Path, stage_log_dir: &Path) -> StageInvocation {
        StageInvocation {
            stage,
            command: StageCommand::snakemake(stage, workflow_dir),
            log_path: stage_log_dir.join(format!("log_{}.txt", stage.tag())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageResult {
    pub elapsed: Duration,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub succeeded: bool,
}

/// Launches one stage and waits for it to terminate, returning its exit code.
pub trait StageLauncher {
    fn launch<'a>(&'a self, invocation: &'a StageInvocation) -> BoxFuture<'a, Result<Option<i32>, PipelineError>>;
}

/// Runs stages as child processes, duplicating their combined stdout/stderr to
/// the console and to the stage log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl StageLauncher for ProcessLauncher {
    fn launch<'a>(&'a self, invocation: &'a StageInvocation) -> BoxFuture<'a, Result<Option<i32>, PipelineError>> {
        Box::pin(tee_command(invocation))
    }
}

async fn tee_command(invocation: &StageInvocation) -> Result<Option<i32>, PipelineError> {
    let stage = invocation.stage;
    let launch_err = |reason: String| PipelineError::StageLaunch { stage, reason };

    if let Some(parent) = invocation.log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let mut log_file = fs::File::create(&invocation.log_path).await?;

    let argv = invocation.command.argv();
    debug!("Launching {}: {}", stage, argv.join(" "));

    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| launch_err(format!("failed to spawn {}: {}", invocation.command.program, e)))?;

    let stdout = child.stdout.take().ok_or_else(|| launch_err("failed to get stdout".to_string()))?;
    let stderr = child.stderr.take().ok_or_else(|| launch_err("failed to get stderr".to_string()))?;

    let mut combined = byte_lines(stdout).merge(byte_lines(stderr));
    let tee_result = tee_lines(&mut combined, &mut log_file).await;
    // Closing our ends of the pipes keeps a child from blocking on a full pipe
    drop(combined);

    let status = child.wait().await?;
    if let Err(e) = tee_result {
        warn!("Output of stage {} was not fully copied to {}: {}", stage, invocation.log_path.display(), e);
        return Err(e.into());
    }
    Ok(status.code())
}

type ByteLines = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// Splits a pipe into raw lines, newline included. Bytes are passed through
/// untouched, so output that is not UTF-8 still reaches the log intact.
fn byte_lines<R: AsyncRead + Unpin + Send + 'static>(reader: R) -> ByteLines {
    Box::pin(stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let mut reader = state?;
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(line), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    }))
}

async fn tee_lines<S>(lines: &mut S, log_file: &mut fs::File) -> io::Result<()>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = line?;
        print!("{}", String::from_utf8_lossy(&line));
        log_file.write_all(&line).await?;
    }
    log_file.flush().await
}

/// Runs a single stage and times it from launch until its process terminates,
/// whatever the exit status.
///
/// # Arguments
///
/// * `launcher` - Process launch abstraction.
/// * `invocation` - The stage to run.
///
/// # Returns
/// StageResult with elapsed wall-clock time and exit status.
pub async fn run_stage<L: StageLauncher + ?Sized>(
    launcher: &L,
    invocation: &StageInvocation,
) -> Result<StageResult, PipelineError> {
    let start = Instant::now();
    let exit_code = launcher.launch(invocation).await?;
    let elapsed = start.elapsed();

    Ok(StageResult {
        elapsed,
        exit_code,
        succeeded: exit_code == Some(0),
    })
}

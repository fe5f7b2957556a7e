//! External tool invocation.
//!
//! Every ffmpeg/ffprobe call goes through [`ToolRunner`], so the pipeline
//! can be driven by a scripted runner in tests. [`SystemToolRunner`] spawns
//! real processes with cancellation and timeout support.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use reelsmith_common::error::{ReelError, ReelResult};

/// A fully specified tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program name, resolved on `PATH`.
    pub program: String,
    pub args: Vec<String>,
    /// File the run produces; removed when the run is interrupted.
    pub output: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Whether `arg` appears verbatim among the arguments.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value following `flag`, e.g. `value_of("-t")`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') || arg.contains(';') || arg.is_empty() {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools.
///
/// A run that exits non-zero returns [`ReelError::Render`] carrying the
/// tool's stderr untouched.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `invocation`, handing each stdout line to `on_stdout_line` as it
    /// arrives.
    async fn run_streaming(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancelSignal,
        on_stdout_line: &(dyn for<'l> Fn(&'l str) + Send + Sync),
    ) -> ReelResult<ToolOutput>;

    async fn run(&self, invocation: &ToolInvocation, cancel: &CancelSignal) -> ReelResult<ToolOutput> {
        self.run_streaming(invocation, cancel, &|_: &str| {}).await
    }
}

/// Receiving side of a job's cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side of a job's cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    /// A connected handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle {
                tx: std::sync::Arc::new(tx),
            },
            CancelSignal { rx },
        )
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pending forever if the
    /// handle is gone without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// A narrower scope: the returned signal fires when `self` fires or when
    /// the returned handle cancels it. Cancelling the child leaves `self`
    /// untouched. Must be called inside a tokio runtime.
    pub fn child(&self) -> (CancelHandle, CancelSignal) {
        let (handle, signal) = Self::pair();
        if self.is_cancelled() {
            handle.cancel();
            return (handle, signal);
        }
        let parent = self.clone();
        let forward = handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => forward.cancel(),
                _ = forward.tx.closed() => {}
            }
        });
        (handle, signal)
    }

    /// `Err(Cancelled)` when cancellation was requested.
    pub fn check(&self) -> ReelResult<()> {
        if self.is_cancelled() {
            Err(ReelError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner {
    timeout: Option<Duration>,
}

impl SystemToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single run that exceeds `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }
}

enum RunEnd {
    Exited(std::io::Result<(ExitStatus, String)>),
    Cancelled,
    TimedOut(u64),
}

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run_streaming(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancelSignal,
        on_stdout_line: &(dyn for<'l> Fn(&'l str) + Send + Sync),
    ) -> ReelResult<ToolOutput> {
        cancel.check()?;
        let program = which::which(&invocation.program)
            .map_err(|_| ReelError::tool_not_found(&invocation.program))?;

        tracing::debug!(command = %invocation.command_line(), "Running tool");
        let started = std::time::Instant::now();

        let mut child = Command::new(&program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReelError::render(format!("Failed to start {}: {e}", invocation.program)))?;
        // Dropping this future mid-run kills the child; the guard removes
        // what it wrote so far.
        let partial = PartialOutput::new(invocation.output.as_deref());

        tracing::debug!(
            pid = child.id(),
            program = %invocation.program,
            "Tool process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::render("Failed to capture tool stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::render("Failed to capture tool stderr"))?;

        // Drained on its own task so a chatty tool never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read stderr: {err}>"),
            }
        });

        let end = {
            let run = async {
                let mut lines = BufReader::new(stdout).lines();
                let mut collected = String::new();
                while let Some(line) = lines.next_line().await? {
                    on_stdout_line(&line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
                let status = child.wait().await?;
                Ok::<_, std::io::Error>((status, collected))
            };
            let deadline = async {
                match self.timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                result = run => RunEnd::Exited(result),
                _ = cancel.cancelled() => RunEnd::Cancelled,
                _ = deadline => RunEnd::TimedOut(self.timeout.map(|t| t.as_secs()).unwrap_or_default()),
            }
        };

        match end {
            RunEnd::Exited(result) => {
                partial.disarm();
                let (status, stdout) =
                    result.map_err(|e| ReelError::render(format!("{} I/O failed: {e}", invocation.program)))?;
                let stderr = stderr_task
                    .await
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

                tracing::debug!(
                    program = %invocation.program,
                    status = %status,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Tool process finished"
                );

                if status.success() {
                    Ok(ToolOutput { stdout, stderr })
                } else {
                    Err(ReelError::tool_failed(
                        format!("{} failed (status {status})", invocation.program),
                        stderr,
                        status.code(),
                    ))
                }
            }
            RunEnd::Cancelled => {
                tracing::info!(program = %invocation.program, "Cancelled, killing tool process");
                stop(&mut child, invocation, stderr_task).await;
                partial.disarm();
                Err(ReelError::Cancelled)
            }
            RunEnd::TimedOut(secs) => {
                tracing::warn!(
                    program = %invocation.program,
                    timeout_secs = secs,
                    "Tool timed out, killing process"
                );
                stop(&mut child, invocation, stderr_task).await;
                partial.disarm();
                Err(ReelError::Timeout(secs))
            }
        }
    }
}

async fn stop(
    child: &mut tokio::process::Child,
    invocation: &ToolInvocation,
    stderr_task: tokio::task::JoinHandle<String>,
) {
    if let Err(err) = child.kill().await {
        tracing::warn!(error = %err, "Failed to kill tool process");
    }
    stderr_task.abort();
    if let Some(output) = &invocation.output {
        remove_partial(output).await;
    }
}

/// Removes a run's output file unless disarmed before drop.
struct PartialOutput {
    path: Option<PathBuf>,
}

impl PartialOutput {
    fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
        }
    }

    fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed output of abandoned run"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial output"),
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial output"),
    }
}

/// Builder for ffmpeg invocations with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Per input: options placed before its `-i`, then the input itself.
    inputs: Vec<(Vec<String>, String)>,
    output_args: Vec<String>,
    output: Option<PathBuf>,
    log_level: String,
    progress: bool,
}

impl FfmpegCommand {
    /// A command writing `output` (overwritten).
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: Some(output.as_ref().to_path_buf()),
            log_level: "error".to_string(),
            progress: false,
        }
    }

    /// A command that only analyzes its input (`-f null -`). Analysis
    /// filters report at info level, so that is the log level used.
    pub fn analysis() -> Self {
        Self {
            output: None,
            log_level: "info".to_string(),
            ..Self::new("-")
        }
    }

    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with(Vec::<String>::new(), path)
    }

    /// Add an input preceded by `options` (e.g. `-loop 1`).
    pub fn input_with<I, S>(mut self, options: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push((
            options.into_iter().map(Into::into).collect(),
            path.as_ref().to_string_lossy().into_owned(),
        ));
        self
    }

    /// Add a lavfi source such as `anullsrc=r=48000:cl=stereo`.
    pub fn lavfi(mut self, source: impl Into<String>) -> Self {
        self.inputs
            .push((vec!["-f".to_string(), "lavfi".to_string()], source.into()));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Output duration limit.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{seconds:.3}"))
    }

    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Emit `-progress` key/value lines on stdout.
    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];

        if self.progress {
            args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
        }

        for (options, input) in &self.inputs {
            args.extend(options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.clone());
        }

        args.extend(self.output_args.iter().cloned());

        match &self.output {
            Some(path) => args.push(path.to_string_lossy().into_owned()),
            None => args.extend(["-f", "null", "-"].map(String::from)),
        }
        args
    }

    pub fn into_invocation(self) -> ToolInvocation {
        let invocation = ToolInvocation::new("ffmpeg", self.build_args());
        match self.output {
            Some(path) => invocation.with_output(path),
            None => invocation,
        }
    }
}

/// `ffprobe` call returning stream and format info as JSON.
pub fn ffprobe_json(path: &Path) -> ToolInvocation {
    ToolInvocation::new(
        "ffprobe",
        vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().into_owned(),
        ],
    )
}

/// Availability of one external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: &'static str,
    pub path: Option<PathBuf>,
}

/// Tools a render needs.
pub const REQUIRED_TOOLS: [&str; 2] = ["ffmpeg", "ffprobe"];

/// Locate every required tool on `PATH`.
pub fn check_tools() -> Vec<ToolStatus> {
    REQUIRED_TOOLS
        .iter()
        .map(|&name| ToolStatus {
            name,
            path: which::which(name).ok(),
        })
        .collect()
}

/// Fail with `ToolNotFound` for the first missing required tool.
pub fn require_tools() -> ReelResult<()> {
    match check_tools().into_iter().find(|t| t.path.is_none()) {
        Some(missing) => Err(ReelError::tool_not_found(missing.name)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs_and_output() {
        let inv = FfmpegCommand::new("/tmp/out.mp4")
            .input_with(["-loop", "1"], "/tmp/a.png")
            .lavfi("anullsrc=r=48000:cl=stereo")
            .video_codec("libx264")
            .duration(2.5)
            .into_invocation();

        assert_eq!(inv.program, "ffmpeg");
        assert_eq!(inv.output, Some(PathBuf::from("/tmp/out.mp4")));
        assert_eq!(
            inv.args,
            [
                "-y", "-hide_banner", "-v", "error", "-loop", "1", "-i", "/tmp/a.png", "-f",
                "lavfi", "-i", "anullsrc=r=48000:cl=stereo", "-c:v", "libx264", "-t", "2.500",
                "/tmp/out.mp4"
            ]
        );
        assert_eq!(inv.value_of("-c:v"), Some("libx264"));
    }

    #[test]
    fn test_analysis_writes_to_null_sink() {
        let inv = FfmpegCommand::analysis()
            .input("/tmp/n.wav")
            .audio_filter("volumedetect")
            .into_invocation();
        assert_eq!(inv.output, None);
        assert!(inv.args.ends_with(&["-f".to_string(), "null".to_string(), "-".to_string()]));
        assert_eq!(inv.value_of("-v"), Some("info"));
    }

    #[test]
    fn test_progress_flag() {
        let args = FfmpegCommand::new("o.mp4").with_progress().build_args();
        assert!(args.windows(2).any(|w| w[0] == "-progress" && w[1] == "pipe:1"));
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let inv = ToolInvocation::new("ffmpeg", vec!["-vf".into(), "a=1;b".into()]);
        assert_eq!(inv.command_line(), "ffmpeg -vf \"a=1;b\"");
    }

    #[tokio::test]
    async fn test_cancel_signal() {
        let (handle, signal) = CancelSignal::pair();
        assert!(signal.check().is_ok());
        handle.cancel();
        signal.cancelled().await;
        assert!(matches!(signal.check(), Err(ReelError::Cancelled)));
        assert!(!CancelSignal::never().is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_process_and_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("partial.mp4");
        std::fs::write(&partial, b"half").unwrap();

        let inv = ToolInvocation::new("sh", vec!["-c".into(), "sleep 30".into()])
            .with_output(&partial);
        let (handle, signal) = CancelSignal::pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let started = std::time::Instant::now();
        let result = SystemToolRunner::new().run(&inv, &signal).await;
        assert!(matches!(result, Err(ReelError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!partial.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_run_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("partial.mp4");

        let script = format!("echo half > '{}'; sleep 30", partial.display());
        let inv = ToolInvocation::new("sh", vec!["-c".into(), script]).with_output(&partial);
        let task = tokio::spawn(async move {
            SystemToolRunner::new().run(&inv, &CancelSignal::never()).await
        });

        for _ in 0..100 {
            if partial.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(partial.exists());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_child_signal_follows_parent_only_downward() {
        let (parent_handle, parent) = CancelSignal::pair();
        let (child_handle, child) = parent.child();
        child_handle.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let (_other_handle, other) = parent.child();
        parent_handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), other.cancelled())
            .await
            .unwrap();

        let (_late_handle, late) = parent.child();
        assert!(late.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_keeps_stderr_verbatim() {
        let inv = ToolInvocation::new(
            "sh",
            vec!["-c".into(), "echo 'Invalid data found' >&2; exit 3".into()],
        );
        let err = SystemToolRunner::new()
            .run(&inv, &CancelSignal::never())
            .await
            .unwrap_err();
        match err {
            ReelError::Render {
                diagnostic,
                exit_code,
                ..
            } => {
                assert_eq!(diagnostic.as_deref(), Some("Invalid data found\n"));
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let inv = ToolInvocation::new("reelsmith-no-such-tool", Vec::new());
        let err = SystemToolRunner::new()
            .run(&inv, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::ToolNotFound { .. }));
    }
}

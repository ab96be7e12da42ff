//! The create/attach/start/drive/commit-adjacent lifecycle of a single hook
//! container: attach-before-start, a bounded stderr record buffer, and a
//! two-consumer-tasks-plus-forwarding-prefix pattern adapted from
//! child-process pipes to a single multiplexed container attach stream.

use std::{
    collections::VecDeque,
    sync::Arc,
};

use bstr::ByteSlice;
use futures::future::BoxFuture;
use owo_colors::OwoColorize;
use stacked_errors::{Result, StackableErr};
use tokio::{
    io::AsyncWriteExt,
    sync::{mpsc, oneshot, Mutex},
};

use crate::{
    docker_client::{CreateContainerOpts, DockerClient, LogChunk, StreamKind},
    hooks::HookName,
    request::CgroupLimits,
};

/// Bound on the accumulated stderr tail used for post-mortem classification.
const STDERR_RECORD_LIMIT: usize = 1024;

/// A container exited non-zero. `container_runner::run` never returns this as
/// an error itself — it's left for the caller to classify: the orchestrator
/// turns a non-zero `assemble` exit into either a layered-builder retry or
/// `FailureReason::AssembleFailed`; the incremental decider downgrades a
/// non-zero `save-artifacts` exit to a non-fatal clean-build fallback.
#[derive(Debug, thiserror::Error)]
#[error("container for image {image} exited with code {exit_code}: {stderr}")]
pub struct ContainerError {
    pub image: String,
    pub exit_code: i64,
    pub stderr: String,
}

impl ContainerError {
    pub fn from_result(image: &str, result: &ContainerRunResult) -> Option<Self> {
        (result.exit_code != 0).then(|| Self {
            image: image.to_string(),
            exit_code: result.exit_code,
            stderr: String::from_utf8_lossy(&result.stderr_tail).into_owned(),
        })
    }
}

/// A line of container output, tagged by stream, handed to the caller's
/// logging callback as it arrives.
pub type OutputCallback = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;
pub type OnStart = Box<dyn for<'a> Fn(&'a str) -> BoxFuture<'a, Result<()>> + Send + Sync>;
pub type PostExec = Box<dyn for<'a> Fn(&'a str) -> BoxFuture<'a, Result<()>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ContainerRunOpts {
    pub image: String,
    pub hook: HookName,
    /// The in-container absolute path to the hook's executable.
    pub hook_path: String,
    /// In-container directory the source tar is extracted to, for
    /// `assemble`/`usage`.
    pub destination: String,
    pub user: Option<String>,
    pub env: Vec<String>,
    pub binds: Vec<(String, String)>,
    pub network_mode: Option<String>,
    pub cgroup_limits: CgroupLimits,
    pub drop_capabilities: Vec<String>,
    /// Source tarball streamed into the container's stdin, for hooks that
    /// `receives_source_on_stdin`.
    pub stdin_tar: Option<Vec<u8>>,
    /// Replaces the part of the command after `&&` for `assemble`/`usage`
    /// (used by [`crate::inject::upload`]).
    pub command_override: Option<String>,
    /// Skips the usual unconditional removal on success, for the extended
    /// build: `runtime_stage::run` still needs to read the builder
    /// intermediate's filesystem and removes it itself once done.
    pub keep_container_on_success: bool,
    /// Accumulates the raw, unsplit stdout bytes into
    /// [`ContainerRunResult::stdout_raw`], for hooks like `save-artifacts`
    /// that stream a tarball on stdout rather than line-oriented log output.
    pub capture_raw_stdout: bool,
}

pub struct ContainerRunResult {
    pub container_id: String,
    pub exit_code: i64,
    pub stderr_tail: Vec<u8>,
    pub stdout_lines: Vec<String>,
    /// Populated only when `ContainerRunOpts::capture_raw_stdout` was set.
    pub stdout_raw: Option<Vec<u8>>,
}

/// Builds the in-container command: `assemble`/`usage` extract the source
/// tar from stdin first; other hooks invoke the path directly.
pub fn build_command(opts: &ContainerRunOpts) -> Vec<String> {
    if opts.hook.receives_source_on_stdin() {
        let tail = opts
            .command_override
            .clone()
            .unwrap_or_else(|| opts.hook_path.clone());
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("tar -C {} -xf - && {}", opts.destination, tail),
        ]
    } else {
        vec![opts.hook_path.clone()]
    }
}

/// Runs one hook container to completion, enforcing a strict ordering: attach
/// before start, start before `on_start`, wait completion before `post_exec`,
/// `post_exec` before removal; removal always happens, on every exit path,
/// unless `opts.keep_container_on_success` asked to keep a successfully-exited
/// container alive for a later stage.
#[tracing::instrument(skip_all, fields(image = %opts.image, hook = %opts.hook))]
pub async fn run(
    docker: &dyn DockerClient,
    opts: ContainerRunOpts,
    on_output: Option<OutputCallback>,
    on_start: Option<OnStart>,
    post_exec: Option<PostExec>,
) -> Result<ContainerRunResult> {
    let cmd = build_command(&opts);
    let attach_stdin = opts.stdin_tar.is_some();

    let create_opts = CreateContainerOpts {
        name: format!("s2i-{}-{}", opts.hook.as_str(), uuid::Uuid::new_v4()),
        image: opts.image.clone(),
        cmd,
        env: opts.env.clone(),
        user: opts.user.clone(),
        network_mode: opts.network_mode.clone(),
        binds: opts.binds.clone(),
        cgroup_limits: opts.cgroup_limits.clone(),
        cap_drop: opts.drop_capabilities.clone(),
        attach_stdin,
    };

    let id = docker
        .create_container(create_opts)
        .await
        .stack_err(|| "ContainerRunner::run -> create_container")?;

    let keep_on_success = opts.keep_container_on_success;
    let outcome = run_attached(docker, &id, opts, on_output, on_start, post_exec).await;

    let keep = keep_on_success && matches!(&outcome, Ok(result) if result.exit_code == 0);
    if !keep {
        if let Err(remove_err) = docker.remove_container(&id).await {
            tracing::warn!(container = %id, error = ?remove_err, "failed to remove container");
        }
    }

    outcome
}

async fn run_attached(
    docker: &dyn DockerClient,
    id: &str,
    opts: ContainerRunOpts,
    on_output: Option<OutputCallback>,
    on_start: Option<OnStart>,
    post_exec: Option<PostExec>,
) -> Result<ContainerRunResult> {
    // Attach strictly happens-before start.
    let attached = docker.attach(id).await.stack_err(|| "ContainerRunner::run -> attach")?;
    let mut stdin = attached.stdin;
    let mut output = attached.output;

    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (stderr_tx, stderr_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let dispatcher = tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(chunk) = output.next().await {
            let Ok(LogChunk { stream, data }) = chunk else {
                break;
            };
            let sent = match stream {
                StreamKind::Stdout => stdout_tx.send(data),
                StreamKind::Stderr => stderr_tx.send(data),
            };
            if sent.is_err() {
                break;
            }
        }
    });

    let stdout_color = owo_colors::AnsiColors::Cyan;
    let stdout_callback = on_output.clone();
    let capture_raw_stdout = opts.capture_raw_stdout;
    let stdout_task = tokio::spawn(async move {
        let mut lines = Vec::new();
        let mut raw = capture_raw_stdout.then(Vec::new);
        let mut rx = stdout_rx;
        while let Some(chunk) = rx.recv().await {
            if let Some(raw) = &mut raw {
                raw.extend_from_slice(&chunk);
                continue;
            }
            for line in chunk.lines() {
                let line = String::from_utf8_lossy(line).into_owned();
                if let Some(cb) = &stdout_callback {
                    cb(StreamKind::Stdout, &line);
                }
                tracing::debug!(target: "s2i_core::container", "{}", line.color(stdout_color));
                lines.push(line);
            }
        }
        (lines, raw)
    });

    let (stderr_done_tx, stderr_done_rx) = oneshot::channel::<()>();
    let stderr_buffer: Arc<Mutex<VecDeque<u8>>> = Arc::new(Mutex::new(VecDeque::new()));
    let stderr_buffer_clone = Arc::clone(&stderr_buffer);
    let stderr_callback = on_output.clone();
    let stderr_task = tokio::spawn(async move {
        let mut rx = stderr_rx;
        while let Some(chunk) = rx.recv().await {
            for line in chunk.lines() {
                let line_owned = String::from_utf8_lossy(line).into_owned();
                if let Some(cb) = &stderr_callback {
                    cb(StreamKind::Stderr, &line_owned);
                }
                tracing::debug!(target: "s2i_core::container", "{}", line_owned.red());
            }
            let mut buf = stderr_buffer_clone.lock().await;
            for &byte in &chunk {
                if buf.len() >= STDERR_RECORD_LIMIT {
                    buf.pop_front();
                }
                buf.push_back(byte);
            }
        }
        // Signal completion only after the sender side (the dispatcher) has
        // closed the channel, i.e. the stream is fully drained.
        let _ = stderr_done_tx.send(());
    });

    docker.start_container(id).await.stack_err(|| "ContainerRunner::run -> start_container")?;

    // OnStart strictly happens-before source streaming into stdin: injection
    // (secret files, truncate script, result sentinel) must land before any
    // source work begins.
    if let Some(on_start) = on_start {
        on_start(id).await.stack_err(|| "ContainerRunner::run -> on_start callback")?;
    }

    if let Some(stdin_tar) = opts.stdin_tar {
        if let Some(mut stdin) = stdin.take() {
            stdin
                .write_all(&stdin_tar)
                .await
                .stack_err(|| "ContainerRunner::run -> write stdin")?;
            stdin.shutdown().await.stack_err(|| "ContainerRunner::run -> shutdown stdin")?;
        }
    }

    let exit_code = docker.wait_container(id).await.stack_err(|| "ContainerRunner::run -> wait_container")?;

    // Wait completion strictly happens-before reading the stderr buffer: we
    // join the dispatcher and both consumers, then the completion channel,
    // before touching the shared buffer.
    let _ = dispatcher.await;
    let (stdout_lines, stdout_raw) = stdout_task.await.unwrap_or_default();
    let _ = stderr_task.await;
    let _ = stderr_done_rx.await;

    let stderr_tail: Vec<u8> = stderr_buffer.lock().await.iter().copied().collect();

    if let Some(post_exec) = post_exec {
        post_exec(id).await.stack_err(|| "ContainerRunner::run -> post_exec callback")?;
    }

    // A non-zero exit is reported through the result rather than `Err`:
    // classifying the failure (layered-builder retry, fatal
    // `AssembleFailed`, or a non-fatal save-artifacts downgrade) is the
    // caller's job, not this function's.
    Ok(ContainerRunResult {
        container_id: id.to_string(),
        exit_code,
        stderr_tail,
        stdout_lines,
        stdout_raw,
    })
}

/// Matches the two "missing basic requirements" patterns that trigger the
/// layered-builder fallback.
pub fn is_missing_requirements(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    (lower.contains("tar") && lower.contains("not found"))
        || (lower.contains("/bin/sh") && lower.contains("no such file or directory"))
}

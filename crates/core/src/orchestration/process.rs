//! Single-process execution: spawn, stream merged output, cancel, reap.
//!
//! [`ProcessRunner`] runs exactly one module at a time. While a process is
//! alive its [`ProcessHandle`] sits in [`RunState`]; the slot is released
//! when the [`RunningProcess`] is consumed by [`ProcessRunner::wait`] or
//! dropped, so every exit path clears it.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::command::{anchor, CommandContext};
use super::state::{ActiveSlot, RunState, SlotRefused};
use crate::module::ModuleSpec;

/// Grace period between the terminate signal and a forced kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Longest line forwarded in one piece. Longer lines are forwarded as
/// several consecutive lines, cut on a UTF-8 character boundary.
const MAX_LINE_BYTES: u64 = 64 * 1024;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Errors raised while running a single module process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The executable could not be launched.
    #[error("Failed to launch module '{module}': {source}")]
    Spawn {
        module: String,
        #[source]
        source: io::Error,
    },

    /// The run was stopped before the module's process was spawned.
    #[error("Module '{module}' was not started: the run was stopped")]
    Cancelled { module: String },

    /// Another process already occupies the run's process slot.
    #[error("Module '{module}' cannot start while '{active}' is still running")]
    AlreadyActive { module: String, active: String },

    /// Waiting on the process failed.
    #[error("Failed waiting for module '{module}': {source}")]
    Wait {
        module: String,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// ProcessHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable reference to a running module process.
///
/// Cancelling a handle only raises a flag; the task that owns the
/// [`RunningProcess`] performs the actual terminate/kill in
/// [`ProcessRunner::wait`], so the pid is never signalled after it has been
/// reaped.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: u64,
    module: String,
    pid: Option<u32>,
    cancel: CancellationToken,
}

impl ProcessHandle {
    pub(crate) fn new(module: &str, pid: Option<u32>, cancel: CancellationToken) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            module: module.to_string(),
            pid,
            cancel,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Name of the module this process belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// OS process id at spawn time. `None` until the process is spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// OutputStream
// ---------------------------------------------------------------------------

/// Merged stdout/stderr of one process, one line per item.
///
/// Each underlying pipe keeps program order. The stream ends when both
/// pipes are closed and cannot be restarted.
pub struct OutputStream {
    lines: BoxStream<'static, String>,
}

impl OutputStream {
    fn merged<O, E>(stdout: Option<O>, stderr: Option<E>) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let out = stdout.map_or_else(|| stream::empty().boxed(), line_stream);
        let err = stderr.map_or_else(|| stream::empty().boxed(), line_stream);
        Self {
            lines: stream::select(out, err).boxed(),
        }
    }

    fn empty() -> Self {
        Self {
            lines: stream::empty().boxed(),
        }
    }

    /// Wait for the next line, or `None` once the process closed its output.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.next().await
    }
}

impl Stream for OutputStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.lines.poll_next_unpin(cx)
    }
}

fn line_stream<R>(reader: R) -> BoxStream<'static, String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // `carry` holds the bytes of a character cut in half by the length cap.
    stream::unfold(
        (BufReader::new(reader), Vec::new()),
        |(mut reader, carry)| async move {
            let mut buf = carry;
            let limit = MAX_LINE_BYTES.saturating_sub(buf.len() as u64);
            match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
                Ok(0) if buf.is_empty() => None,
                Ok(_) => {
                    let mut carry = Vec::new();
                    if !buf.ends_with(b"\n") && buf.len() as u64 >= MAX_LINE_BYTES {
                        carry = buf.split_off(char_boundary(&buf));
                    }
                    Some((decode_line(&buf), (reader, carry)))
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Output pipe read failed");
                    None
                }
            }
        },
    )
    .boxed()
}

/// Length of `buf` without a trailing, incomplete UTF-8 sequence.
fn char_boundary(buf: &[u8]) -> usize {
    let len = buf.len();
    for back in 1..=len.min(3) {
        let byte = buf[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}

fn decode_line(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

// ---------------------------------------------------------------------------
// RunningProcess / ProcessExit
// ---------------------------------------------------------------------------

/// A spawned module process owned by the sequencing task.
pub struct RunningProcess {
    child: Child,
    handle: ProcessHandle,
    output: Option<OutputStream>,
    started: Instant,
    slot: ActiveSlot,
}

impl RunningProcess {
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }
}

impl fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningProcess")
            .field("handle", &self.handle)
            .field("output_taken", &self.output.is_none())
            .field("elapsed", &self.started.elapsed())
            .finish_non_exhaustive()
    }
}

/// How a module process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` if the process died from a signal.
    pub code: Option<i32>,
    /// Whether the process was terminated because its handle was cancelled.
    pub terminated: bool,
    pub duration: Duration,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// ---------------------------------------------------------------------------
// ProcessRunner
// ---------------------------------------------------------------------------

/// Launches module processes and manages their lifecycle.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    state: Arc<RunState>,
    stop_grace: Duration,
    working_directory: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(state: Arc<RunState>) -> Self {
        Self {
            state,
            stop_grace: DEFAULT_STOP_GRACE,
            working_directory: None,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Spawn `spec` and install its handle as the run's active process.
    ///
    /// The slot is reserved before spawning: a run that has already been
    /// stopped gets [`ProcessError::Cancelled`] and nothing is launched.
    /// The handle's cancel token is a child of `run_cancel`, so a stop that
    /// lands after the reservation still reaches the process.
    pub fn start(
        &self,
        spec: &ModuleSpec,
        ctx: &CommandContext,
        run_cancel: &CancellationToken,
    ) -> Result<RunningProcess, ProcessError> {
        let argv = ctx.render(spec);
        let (program, args) = argv.split_first().ok_or_else(|| ProcessError::Spawn {
            module: spec.name().to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        })?;

        let program = if program.contains('/') {
            anchor(Path::new(program), self.working_directory())
        } else {
            PathBuf::from(program)
        };

        let mut cmd = Command::new(&program);
        // `kill_on_drop(true)` ensures the child dies if the runner is dropped mid-flight.
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in ctx.env_vars(spec) {
            cmd.env(key, value);
        }

        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }

        let mut handle = ProcessHandle::new(spec.name(), None, run_cancel.child_token());
        let slot = self
            .state
            .reserve_process(handle.clone(), run_cancel)
            .map_err(|refused| match refused {
                SlotRefused::Cancelled => ProcessError::Cancelled {
                    module: spec.name().to_string(),
                },
                SlotRefused::Occupied(active) => ProcessError::AlreadyActive {
                    module: spec.name().to_string(),
                    active: active.module().to_string(),
                },
            })?;

        // A stop that found the reserved slot has already answered
        // "stopped"; honour it without launching anything.
        if handle.is_cancelled() {
            return Err(ProcessError::Cancelled {
                module: spec.name().to_string(),
            });
        }

        // On failure `slot` is dropped and the reservation released.
        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            module: spec.name().to_string(),
            source,
        })?;
        handle.set_pid(child.id());
        slot.record_pid(handle.pid());

        let output = OutputStream::merged(child.stdout.take(), child.stderr.take());

        tracing::debug!(
            module = spec.name(),
            pid = ?handle.pid(),
            program = %program.display(),
            "Spawned module process",
        );

        Ok(RunningProcess {
            child,
            handle,
            output: Some(output),
            started: Instant::now(),
            slot,
        })
    }

    /// Take the process's merged output stream.
    ///
    /// The stream can be taken once; later calls get an empty stream.
    pub fn stream_output(&self, process: &mut RunningProcess) -> OutputStream {
        process.output.take().unwrap_or_else(OutputStream::empty)
    }

    /// Request termination of the process behind `handle`.
    ///
    /// Idempotent, and a no-op for a process that has already exited.
    pub fn cancel(&self, handle: &ProcessHandle) {
        handle.cancel.cancel();
    }

    /// Wait for the process to exit, terminating it if its handle is (or
    /// becomes) cancelled. Clears the run's active-process slot on every
    /// path.
    pub async fn wait(&self, process: RunningProcess) -> Result<ProcessExit, ProcessError> {
        let RunningProcess {
            mut child,
            handle,
            output,
            started,
            slot,
        } = process;
        drop(output);

        enum Waited {
            Exited(io::Result<ExitStatus>),
            Cancelled,
        }

        let waited = tokio::select! {
            biased;
            status = child.wait() => Waited::Exited(status),
            () = handle.cancel.cancelled() => Waited::Cancelled,
        };

        let (status, terminated) = match waited {
            Waited::Exited(status) => (status, false),
            Waited::Cancelled => (
                terminate(&mut child, handle.module(), self.stop_grace).await,
                true,
            ),
        };

        drop(slot);

        let status = status.map_err(|source| ProcessError::Wait {
            module: handle.module().to_string(),
            source,
        })?;

        let exit = ProcessExit {
            code: status.code(),
            terminated,
            duration: started.elapsed(),
        };

        tracing::debug!(
            module = handle.module(),
            exit_code = ?exit.code,
            terminated,
            elapsed_ms = exit.duration.as_millis() as u64,
            "Module process exited",
        );

        Ok(exit)
    }
}

/// Terminate gracefully, escalating to a kill after `grace`.
async fn terminate(child: &mut Child, module: &str, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    request_graceful_exit(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_elapsed) => {
            tracing::warn!(
                module,
                grace_ms = grace.as_millis() as u64,
                "Process ignored terminate signal, killing",
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_graceful_exit(child: &mut Child) {
    if let Some(pid) = child.id() {
        // Safety: `pid` belongs to a child that has not been reaped yet, so
        // it cannot have been recycled for another process.
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret != 0 {
            tracing::debug!(pid, error = %io::Error::last_os_error(), "SIGTERM delivery failed");
        }
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(child: &mut Child) {
    let _ = child.start_kill();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

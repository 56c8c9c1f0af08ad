//! Worker process management for cell execution.
//!
//! Provides the [`WorkerChannel`] transaction interface, [`ChildWorker`] which
//! implements it over a long-lived child process, and [`WorkerKillHandle`] for
//! tearing the process down from another thread.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{MAIN_SEPARATOR, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

use super::protocol::{ExecutionRequest, ExecutionResponse, read_message, write_message};

/// How long a clean shutdown waits for the worker's stderr to drain.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Request/response interface to an execution worker.
///
/// Strictly paired: every `send` is followed by exactly one `receive` before
/// the next `send`. `terminate` is called once, after the last transaction.
pub trait WorkerChannel {
    /// Write one request.
    fn send(&mut self, request: &ExecutionRequest) -> Result<()>;

    /// Block until the response to the last request arrives.
    fn receive(&mut self) -> Result<ExecutionResponse>;

    /// Send the exit sentinel, close the request stream and wait for the worker.
    fn terminate(&mut self) -> Result<()>;

    /// One send/receive round trip.
    fn transact(&mut self, request: &ExecutionRequest) -> Result<ExecutionResponse> {
        self.send(request)?;
        self.receive()
    }
}

/// Sink for the worker's diagnostic stream.
pub type DiagnosticSink = Box<dyn Write + Send>;

/// How to launch a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Bound on each `receive`. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl WorkerSpec {
    /// Launch `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Build from a command line: first element is the program.
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("worker command is empty".to_string()))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the worker.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Bound each `receive`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the program to an executable path.
    ///
    /// Looks in the following order:
    /// 1. The program as given, if it names a path
    /// 2. System PATH
    /// 3. Same directory as the current executable
    pub fn resolve_program(&self) -> Result<PathBuf> {
        let given = PathBuf::from(&self.program);
        if self.program.contains(MAIN_SEPARATOR) || self.program.contains('/') {
            return Ok(given);
        }

        if let Ok(path) = which::which(&self.program) {
            return Ok(path);
        }

        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let sibling = exe_dir.join(&self.program);
            if sibling.exists() {
                return Ok(sibling);
            }
        }

        Err(Error::WorkerSpawn {
            program: self.program.clone(),
            message: "not found on PATH".to_string(),
        })
    }
}

/// A worker running as a child process.
///
/// Requests go to the child's stdin; a reader thread turns stdout lines into
/// responses; a second thread forwards stderr to the diagnostic sink.
pub struct ChildWorker {
    /// The child process.
    child: Child,
    /// Buffered stdin writer. `None` once closed.
    stdin: Option<BufWriter<ChildStdin>>,
    /// Responses decoded by the stdout reader thread.
    responses: Receiver<Result<ExecutionResponse>>,
    /// Bound on each receive.
    timeout: Option<Duration>,
    /// Set once the process is gone or being killed. Shared with kill handles.
    closed: Arc<AtomicBool>,
    /// Whether the exit status has been collected.
    reaped: bool,
    /// Whether `terminate` has run.
    terminated: bool,
    /// Stderr forwarding thread.
    stderr_forwarder: Option<StderrForwarder>,
}

impl ChildWorker {
    /// Spawn a worker, forwarding its stderr to this process's stderr.
    pub fn spawn(spec: &WorkerSpec) -> Result<Self> {
        Self::spawn_with_diagnostics(spec, Box::new(io::stderr()))
    }

    /// Spawn a worker, forwarding its stderr to `sink`.
    pub fn spawn_with_diagnostics(spec: &WorkerSpec, sink: DiagnosticSink) -> Result<Self> {
        let program = spec.resolve_program()?;
        let spawn_error = |message: String| Error::WorkerSpawn {
            program: program.display().to_string(),
            message,
        };

        let mut child = Command::new(&program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_error("failed to capture worker pipes".to_string()));
        };

        let responses = match spawn_response_reader(stdout) {
            Ok(rx) => rx,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_error(e.to_string()));
            }
        };
        let stderr_forwarder = match spawn_stderr_forwarder(stderr, sink) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_error(e.to_string()));
            }
        };

        tracing::debug!("Spawned worker {} (pid {})", program.display(), child.id());

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            responses,
            timeout: spec.timeout,
            closed: Arc::new(AtomicBool::new(false)),
            reaped: false,
            terminated: false,
            stderr_forwarder: Some(stderr_forwarder),
        })
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// A handle that can kill this worker from another thread.
    pub fn kill_handle(&self) -> WorkerKillHandle {
        WorkerKillHandle {
            pid: self.pid(),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => {
                self.closed.store(true, Ordering::SeqCst);
                false
            }
            Err(_) => false,
        }
    }

    /// Exit status if the worker has already exited.
    ///
    /// `try_wait` reaps the process, so its pid may be reused from here on;
    /// kill handles must stop signalling it.
    fn exited(&mut self) -> Option<ExitStatus> {
        let status = self.child.try_wait().ok().flatten()?;
        self.closed.store(true, Ordering::SeqCst);
        Some(status)
    }

    /// Kill the worker process immediately and reap it.
    pub fn kill(&mut self) {
        self.stdin = None;

        if !self.closed.swap(true, Ordering::SeqCst)
            && let Err(e) = self.child.kill()
        {
            tracing::debug!("Failed to kill worker: {}", e);
        }

        // Descendants of a killed worker may hold stderr open; detach the forwarder.
        self.stderr_forwarder = None;
        self.reap();
    }

    fn reap(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;

        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!("Worker exited with status: {}", status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to wait for worker: {}", e),
        }
        self.closed.store(true, Ordering::SeqCst);

        if let Some(forwarder) = self.stderr_forwarder.take() {
            forwarder.join_within(STDERR_DRAIN_TIMEOUT);
        }
    }
}

impl WorkerChannel for ChildWorker {
    fn send(&mut self, request: &ExecutionRequest) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::WorkerWrite("worker has been killed".to_string()));
        }
        if let Some(status) = self.exited() {
            return Err(Error::WorkerWrite(format!("worker exited with status: {}", status)));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::WorkerWrite("request stream is closed".to_string()))?;

        write_message(stdin, request)
    }

    fn receive(&mut self) -> Result<ExecutionResponse> {
        match self.timeout {
            Some(timeout) => match self.responses.recv_timeout(timeout) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::error!(
                        "Worker did not respond within {:.1}s, killing it",
                        timeout.as_secs_f64()
                    );
                    self.kill();
                    Err(Error::WorkerTimeout(timeout))
                }
                Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerEof),
            },
            None => self.responses.recv().unwrap_or(Err(Error::WorkerEof)),
        }
    }

    fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        if let Some(mut stdin) = self.stdin.take()
            && !self.closed.load(Ordering::SeqCst)
            && let Err(e) = write_message(&mut stdin, &ExecutionRequest::exit())
        {
            tracing::debug!("Worker gone before exit request: {}", e);
        }

        self.reap();
        Ok(())
    }
}

impl Drop for ChildWorker {
    fn drop(&mut self) {
        // Never leave the worker running unattended.
        if !self.reaped {
            self.kill();
        }
    }
}

/// Decode stdout lines on a background thread.
///
/// Stops after end of stream or an IO error; a malformed line is passed on
/// and reading continues with the next one.
fn spawn_response_reader(stdout: ChildStdout) -> io::Result<Receiver<Result<ExecutionResponse>>> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("nbexec-worker-stdout".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let message = read_message::<_, ExecutionResponse>(&mut reader);
                let finished = matches!(message, Err(Error::WorkerEof) | Err(Error::Io(_)));
                if tx.send(message).is_err() || finished {
                    break;
                }
            }
        })?;

    Ok(rx)
}

/// The stderr forwarding thread and its completion signal.
struct StderrForwarder {
    handle: JoinHandle<()>,
    /// Disconnects when the thread finishes.
    done: Receiver<()>,
}

impl StderrForwarder {
    /// Join if the stream drains within `timeout`, otherwise detach.
    ///
    /// Processes started by the worker inherit its stderr and can keep the
    /// pipe open long after the worker itself exited.
    fn join_within(self, timeout: Duration) {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("Worker stderr still open after exit; detaching forwarder");
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    tracing::warn!("Worker stderr forwarder panicked");
                }
            }
        }
    }
}

/// Forward stderr lines to `sink` until the stream closes.
fn spawn_stderr_forwarder(stderr: ChildStderr, mut sink: DiagnosticSink) -> io::Result<StderrForwarder> {
    let (done_tx, done) = mpsc::channel::<()>();

    let handle = thread::Builder::new()
        .name("nbexec-worker-stderr".to_string())
        .spawn(move || {
            let _done = done_tx;
            let reader = BufReader::new(stderr);
            for line in reader.split(b'\n') {
                let Ok(line) = line else { break };
                if sink
                    .write_all(&line)
                    .and_then(|_| sink.write_all(b"\n"))
                    .and_then(|_| sink.flush())
                    .is_err()
                {
                    break;
                }
            }
        })?;

    Ok(StderrForwarder { handle, done })
}

/// Thread-safe handle for killing a worker from another thread.
///
/// Used for interrupt handling: the driver thread stays blocked in `receive`
/// and observes end of stream once the process is gone.
#[derive(Clone)]
pub struct WorkerKillHandle {
    /// Process ID of the worker.
    pid: u32,
    /// Shared with the owning [`ChildWorker`].
    closed: Arc<AtomicBool>,
}

impl WorkerKillHandle {
    /// Kill the worker process.
    ///
    /// A no-op if the worker already exited or was killed.
    pub fn kill(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        #[cfg(unix)]
        {
            // SAFETY: plain syscall on a pid we spawned and have not reaped.
            unsafe {
                libc::kill(self.pid as i32, libc::SIGKILL);
            }
        }

        #[cfg(not(unix))]
        {
            tracing::warn!(
                "Killing worker {} from another thread is not supported on this platform",
                self.pid
            );
        }
    }

    /// Check if the worker is known to be gone.
    pub fn is_killed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

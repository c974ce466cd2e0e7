//! External process producer
//!
//! Spawns a long-running program, tails its stdout as JSON lines and
//! broadcasts every decoded record. Stopping sends a termination signal,
//! waits out a grace period and then kills.
//!
//! Spawning and tailing are separate steps ([`ProcessSupervisor::spawn`] then
//! [`PendingProcess::start`]) so a caller can confirm the program launched
//! before retiring whatever producer was running. Output written in between
//! waits in the pipe.
//!
//! A producer counts as finished once its stdout closes and the process is
//! reaped. A launcher that exits while a background child still holds stdout
//! stays active until that child closes the pipe too.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, RecordError, Result};
use crate::hub::TelemetryHub;
use crate::sample::RecordDecoder;

use super::command::ExternalCommand;
use super::ProducerTask;

/// Called once from the tail task when the process exits on its own
pub type ExitCallback = Box<dyn FnOnce(&ExitReport) + Send + 'static>;

/// How an external process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit status, if the process could be reaped
    pub status: Option<ExitStatus>,
    /// Whether the exit was asked for through `stop`
    pub requested: bool,
    /// Whether the process had to be killed after the grace period
    pub forced: bool,
    /// Records decoded and broadcast
    pub forwarded: u64,
    /// Non-blank lines that failed to decode
    pub rejected: u64,
}

/// Launches external producers wired to a hub
#[derive(Clone)]
pub struct ProcessSupervisor {
    hub: Arc<TelemetryHub>,
    decoder: RecordDecoder,
    stop_timeout: Duration,
}

impl ProcessSupervisor {
    pub fn new(hub: Arc<TelemetryHub>, decoder: RecordDecoder, stop_timeout: Duration) -> Self {
        Self {
            hub,
            decoder,
            stop_timeout,
        }
    }

    /// Spawn the process with piped stdout/stderr
    ///
    /// Nothing is read from the process until [`PendingProcess::start`].
    pub fn spawn(&self, command: &ExternalCommand) -> Result<PendingProcess> {
        let mut cmd = command.build()?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| HubError::Spawn {
            program: command.program().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(HubError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take();
        let pid = child.id();

        tracing::debug!(pid = ?pid, command = %command, "External process spawned");

        Ok(PendingProcess {
            child,
            stdout,
            stderr,
            pid,
            program: command.program().to_string(),
            supervisor: self.clone(),
        })
    }
}

/// A spawned process whose output is not being read yet
///
/// Dropping it kills the process.
pub struct PendingProcess {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    pid: Option<u32>,
    program: String,
    supervisor: ProcessSupervisor,
}

impl PendingProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Start tailing the process output into the hub
    ///
    /// `on_exit` runs only if the process ends without `stop` being called.
    pub fn start<F>(self, on_exit: F) -> ExternalProducer
    where
        F: FnOnce(&ExitReport) + Send + 'static,
    {
        let PendingProcess {
            child,
            stdout,
            stderr,
            pid,
            program,
            supervisor,
        } = self;

        let tail = Tail {
            hub: supervisor.hub,
            decoder: supervisor.decoder,
            stop_timeout: supervisor.stop_timeout,
            pid,
        };
        let on_exit: ExitCallback = Box::new(on_exit);
        let task = ProducerTask::spawn("external", move |token| {
            tail.run(child, stdout, stderr, token, on_exit)
        });

        ExternalProducer { pid, program, task }
    }
}

/// A running external producer
pub struct ExternalProducer {
    pid: Option<u32>,
    program: String,
    task: ProducerTask<ExitReport>,
}

impl ExternalProducer {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has exited and been reaped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Terminate the process (if still running) and wait until it is reaped
    ///
    /// Bounded by the stop timeout plus the time a kill takes.
    pub async fn stop(self) -> Option<ExitReport> {
        self.task.stop().await
    }
}

impl std::fmt::Debug for ExternalProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalProducer")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

struct Tail {
    hub: Arc<TelemetryHub>,
    decoder: RecordDecoder,
    stop_timeout: Duration,
    pid: Option<u32>,
}

enum ReadEvent {
    Cancelled,
    Read(std::io::Result<usize>),
}

enum WaitEvent {
    Cancelled,
    Exited(std::io::Result<ExitStatus>),
}

impl Tail {
    async fn run(
        self,
        mut child: Child,
        stdout: ChildStdout,
        stderr: Option<ChildStderr>,
        token: CancellationToken,
        on_exit: ExitCallback,
    ) -> ExitReport {
        let pid = self.pid;
        let stderr_task = stderr.map(|stderr| tokio::spawn(drain_stderr(stderr, pid)));

        let mut reader = BufReader::new(stdout);
        let mut line = Vec::with_capacity(256);
        let mut forwarded = 0u64;
        let mut rejected = 0u64;

        let mut requested = loop {
            line.clear();
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => ReadEvent::Cancelled,
                read = reader.read_until(b'\n', &mut line) => ReadEvent::Read(read),
            };

            match event {
                ReadEvent::Cancelled => break true,
                ReadEvent::Read(Ok(0)) => break false,
                ReadEvent::Read(Ok(_)) => match self.decoder.decode_bytes(&line) {
                    Ok(sample) => {
                        self.hub.broadcast(&sample);
                        self.hub.metrics().incr_records_forwarded();
                        forwarded += 1;
                    }
                    Err(RecordError::Empty) => {}
                    Err(e) => {
                        self.hub.metrics().incr_records_rejected();
                        rejected += 1;
                        tracing::trace!(pid = ?pid, kind = e.kind(), error = %e, "Dropped record");
                    }
                },
                ReadEvent::Read(Err(e)) => {
                    tracing::warn!(pid = ?pid, error = %e, "Failed to read process output");
                    break false;
                }
            }
        };

        // Output closed; the process may still be running
        if !requested {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => WaitEvent::Cancelled,
                status = child.wait() => WaitEvent::Exited(status),
            };
            match event {
                WaitEvent::Cancelled => requested = true,
                WaitEvent::Exited(status) => {
                    if let Some(task) = stderr_task {
                        task.abort();
                    }
                    let report = ExitReport {
                        status: status.ok(),
                        requested: false,
                        forced: false,
                        forwarded,
                        rejected,
                    };
                    tracing::info!(
                        pid = ?pid,
                        status = ?report.status,
                        forwarded,
                        rejected,
                        "External process exited"
                    );
                    on_exit(&report);
                    return report;
                }
            }
        }

        let (status, forced) = self.terminate(&mut child).await;
        if forced {
            self.hub.metrics().incr_forced_kills();
        }
        if let Some(task) = stderr_task {
            task.abort();
        }

        tracing::info!(
            pid = ?pid,
            status = ?status,
            forced,
            forwarded,
            rejected,
            "External process stopped"
        );

        ExitReport {
            status,
            requested,
            forced,
            forwarded,
            rejected,
        }
    }

    /// Graceful termination, then kill once the grace period runs out
    async fn terminate(&self, child: &mut Child) -> (Option<ExitStatus>, bool) {
        match child.try_wait() {
            Ok(Some(status)) => return (Some(status), false),
            Ok(None) => {}
            Err(e) => tracing::debug!(pid = ?self.pid, error = %e, "try_wait failed"),
        }

        request_termination(child);

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to wait for process");
                (None, false)
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Process ignored termination request, killing"
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(pid = ?self.pid, error = %e, "Failed to kill process");
                }
                (child.try_wait().ok().flatten(), true)
            }
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "Failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Failed to request termination");
    }
}

/// Log stderr so the child never blocks on a full pipe
async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(pid = ?pid, "stderr: {}", line),
            Ok(None) => break,
            // Non UTF-8 output; keep draining raw bytes
            Err(_) => {
                let mut rest = lines.into_inner();
                let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::oneshot;

    use super::*;
    use crate::sample::{RecordPolicy, Sample};

    fn supervisor(hub: &Arc<TelemetryHub>) -> ProcessSupervisor {
        ProcessSupervisor::new(
            Arc::clone(hub),
            RecordDecoder::new(6, RecordPolicy::Permissive),
            Duration::from_millis(500),
        )
    }

    fn sh(script: &str) -> ExternalCommand {
        ExternalCommand::new("sh").arg("-c").arg(script)
    }

    async fn next_sample(sub: &crate::hub::Subscription) -> Sample {
        tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for sample")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let hub = Arc::new(TelemetryHub::new(10));
        let result = supervisor(&hub).spawn(&ExternalCommand::new("/nonexistent/robot-telemetry"));

        match result {
            Err(HubError::Spawn { program, .. }) => {
                assert_eq!(program, "/nonexistent/robot-telemetry")
            }
            other => panic!("expected spawn error, got {:?}", other.map(|p| p.pid())),
        }
    }

    #[tokio::test]
    async fn test_tail_forwards_records_and_reports_exit() {
        let hub = Arc::new(TelemetryHub::new(10));
        let sub = hub.subscribe();

        let script = r#"
            echo '{"t": 1.0, "motors": [1, 2, 3, 4, 5, 6]}'
            echo 'motor controller warming up'
            echo ''
            echo '{"t": 2.0, "motors": [1, 2, 3, 4, 5, 6]}'
        "#;
        let pending = supervisor(&hub).spawn(&sh(script)).unwrap();
        assert!(pending.pid().is_some());

        let (tx, rx) = oneshot::channel();
        let producer = pending.start(move |report| {
            let _ = tx.send(report.clone());
        });

        let report = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(!report.requested);
        assert!(!report.forced);
        assert_eq!(report.forwarded, 2);
        assert_eq!(report.rejected, 1);
        assert!(report.status.map(|s| s.success()).unwrap_or(false));

        assert_eq!(next_sample(&sub).await.timestamp(), Some(1.0));
        assert_eq!(next_sample(&sub).await.timestamp(), Some(2.0));
        assert_eq!(hub.metrics().records_forwarded(), 2);
        assert_eq!(hub.metrics().records_rejected(), 1);

        assert_eq!(producer.stop().await, Some(report));
    }

    #[tokio::test]
    async fn test_nothing_read_before_start() {
        let hub = Arc::new(TelemetryHub::new(10));
        let sub = hub.subscribe();

        let pending = supervisor(&hub)
            .spawn(&sh(r#"echo '{"t": 1.0, "motors": [1, 1, 1, 1, 1, 1]}'; sleep 1"#))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sub.try_recv().is_none());

        let producer = pending.start(|_| {});
        assert_eq!(next_sample(&sub).await.timestamp(), Some(1.0));
        producer.stop().await;
    }

    #[tokio::test]
    async fn test_background_child_keeps_producer_active() {
        let hub = Arc::new(TelemetryHub::new(10));
        let sub = hub.subscribe();

        let script = r#"echo '{"t": 1.0, "motors": [1, 1, 1, 1, 1, 1]}'; sleep 1 & exit 0"#;
        let (tx, rx) = oneshot::channel();
        let producer = supervisor(&hub)
            .spawn(&sh(script))
            .unwrap()
            .start(move |report| {
                let _ = tx.send(report.clone());
            });

        assert_eq!(next_sample(&sub).await.timestamp(), Some(1.0));

        // The shell is gone but `sleep` still holds stdout
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!producer.is_finished());

        let report = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(!report.requested);
        assert!(report.status.map(|s| s.success()).unwrap_or(false));
        assert_eq!(producer.stop().await, Some(report));
    }

    #[tokio::test]
    async fn test_requested_stop_skips_callback() {
        let hub = Arc::new(TelemetryHub::new(10));
        let called = Arc::new(AtomicBool::new(false));

        let pending = supervisor(&hub).spawn(&sh("exec sleep 5")).unwrap();
        let producer = {
            let called = Arc::clone(&called);
            pending.start(move |_| called.store(true, Ordering::SeqCst))
        };

        let started = std::time::Instant::now();
        let report = producer.stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.requested);
        assert!(!report.forced);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_kills_after_grace_period() {
        let hub = Arc::new(TelemetryHub::new(10));
        let sub = hub.subscribe();

        let script = r#"
            trap '' TERM
            echo '{"t": 5.0, "motors": [1, 1, 1, 1, 1, 1]}'
            while :; do sleep 0.05; done
        "#;
        let producer = ProcessSupervisor::new(
            Arc::clone(&hub),
            RecordDecoder::strict(6),
            Duration::from_millis(200),
        )
        .spawn(&sh(script))
        .unwrap()
        .start(|_| {});

        // The trap is installed once the record shows up
        assert_eq!(next_sample(&sub).await.timestamp(), Some(5.0));

        let started = std::time::Instant::now();
        let report = producer.stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.forced);
        assert!(report.requested);
        assert_eq!(hub.metrics().forced_kills(), 1);
    }

    #[tokio::test]
    async fn test_working_directory() {
        let hub = Arc::new(TelemetryHub::new(10));
        let sub = hub.subscribe();
        let dir = std::env::temp_dir();

        let producer = supervisor(&hub)
            .spawn(&sh(r#"printf '{"cwd": "%s"}\n' "$(pwd -P)""#).current_dir(&dir))
            .unwrap()
            .start(|_| {});

        let sample = next_sample(&sub).await;
        let cwd = match sample {
            Sample::Record(fields) => fields["cwd"].as_str().unwrap().to_string(),
            other => panic!("expected opaque record, got {:?}", other),
        };
        assert_eq!(
            std::path::Path::new(&cwd).canonicalize().unwrap(),
            dir.canonicalize().unwrap()
        );

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_noisy_stderr_does_not_block() {
        let hub = Arc::new(TelemetryHub::new(10));
        let sub = hub.subscribe();

        let script = r#"
            i=0
            while [ $i -lt 5000 ]; do
                echo "diagnostic line with some padding $i" >&2
                i=$((i + 1))
            done
            echo '{"t": 9.0, "motors": [1, 1, 1, 1, 1, 1]}'
        "#;
        let producer = supervisor(&hub).spawn(&sh(script)).unwrap().start(|_| {});

        assert_eq!(next_sample(&sub).await.timestamp(), Some(9.0));
        producer.stop().await;
    }
}

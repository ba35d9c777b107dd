//! Bounded pool that runs synthesis jobs away from the HTTP front end.
//!
//! At most `size` jobs execute at once; further submissions wait for a
//! permit. Every submission gets a oneshot that always resolves, with a
//! failure result when the job errors or overruns its timeout.
//!
//! A job's permit is handed to its executor and only released once the
//! work has actually stopped, not when the client stops waiting for it.

use crate::error::SynthError;
use crate::job::{Job, JobResult, JobRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, warn};

#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs `job`. `slot` must stay alive until no process or thread is
    /// still working on the job, even if this future is dropped early.
    async fn execute(&self, job: Job, slot: OwnedSemaphorePermit)
        -> Result<JobResult, SynthError>;
}

/// Runs jobs on the blocking thread pool of the current runtime. A timed
/// out job cannot be interrupted; it keeps its slot until the runner returns.
pub struct InlineExecutor {
    runner: JobRunner,
}

impl InlineExecutor {
    pub fn new(runner: JobRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl JobExecutor for InlineExecutor {
    async fn execute(
        &self,
        job: Job,
        slot: OwnedSemaphorePermit,
    ) -> Result<JobResult, SynthError> {
        let runner = self.runner.clone();
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            runner.run(&job)
        })
        .await
        .map_err(|e| SynthError::Worker(e.to_string()))
    }
}

/// Kills a worker's whole process group when dropped, taking any engine
/// the worker started down with it.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe {
        libc::kill(-(pgid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Runs each job in a fresh child process: the job goes in as JSON on
/// stdin, the result comes back as JSON on stdout. The child leads its own
/// process group; a job that is cancelled or times out kills that group.
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessExecutor {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    async fn execute(
        &self,
        job: Job,
        slot: OwnedSemaphorePermit,
    ) -> Result<JobResult, SynthError> {
        // Dropped after `group`, so the slot frees only once the group is dead.
        let _slot = slot;

        let payload =
            serde_json::to_vec(&job).map_err(|e| SynthError::Worker(e.to_string()))?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| SynthError::Worker(format!("failed to spawn worker: {}", e)))?;
        let mut group = GroupKill { pgid: child.id() };

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| SynthError::Worker(format!("could not send job: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SynthError::Worker(e.to_string()))?;
        if !output.status.success() {
            return Err(SynthError::Worker(format!("exited with {}", output.status)));
        }
        group.disarm();

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SynthError::Worker(format!("unreadable result: {}", e)))
    }
}

pub struct WorkerPool {
    executor: Arc<dyn JobExecutor>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    submitted: AtomicUsize,
}

impl WorkerPool {
    pub fn new(executor: Arc<dyn JobExecutor>, size: usize, timeout: Duration) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(size)),
            timeout,
            submitted: AtomicUsize::new(0),
        }
    }

    /// Queues `job` and returns immediately. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, job: Job) -> oneshot::Receiver<JobResult> {
        let (tx, rx) = oneshot::channel();
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed);
        let executor = self.executor.clone();
        let permits = self.permits.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(slot) => {
                    debug!(job = seq, engine = %job.engine, "job started");
                    match tokio::time::timeout(timeout, executor.execute(job, slot)).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(e)) => {
                            error!(job = seq, error = %e, "job execution failed");
                            JobResult::failure(e.to_string())
                        }
                        Err(_) => {
                            warn!(job = seq, timeout_secs = timeout.as_secs(), "job timed out");
                            JobResult::failure(SynthError::Timeout.to_string())
                        }
                    }
                }
                Err(_) => JobResult::failure("worker pool is shut down"),
            };
            let _ = tx.send(result);
        });

        rx
    }

    /// Jobs accepted since the pool was created.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }
}

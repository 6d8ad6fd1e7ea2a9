//! Background job runner for set materialization.
//!
//! Materialization tasks are closures over the shared stores, dispatched to
//! a fixed pool of workers through a bounded channel. The runner never
//! retries and never reports back to the submitter: a task owns its own
//! outcome and records it on the entity-set/analysis record it was created
//! for. Shutdown cancels idle workers and drains running jobs with a
//! timeout.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedJob {
    id: Uuid,
    name: &'static str,
    future: BoxedJob,
}

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Capacity of the submission queue; submissions fail once it is full.
    pub queue_depth: usize,
    /// How long shutdown waits for running jobs to finish.
    pub drain_timeout: Duration,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 64,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// A bounded worker pool executing fire-and-forget materialization jobs.
pub struct JobRunner {
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
    running: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl JobRunner {
    /// Start the worker pool.
    pub fn start(config: JobRunnerConfig) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(config.queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();
        let running = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(config.workers.max(1));
        for worker_index in 0..config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let shutdown = shutdown.clone();
            let running = Arc::clone(&running);
            workers.push(tokio::spawn(async move {
                worker_loop(worker_index, rx, shutdown, running).await;
            }));
        }

        info!(workers = config.workers.max(1), "job runner started");
        Self {
            tx,
            shutdown,
            running,
            workers: Mutex::new(workers),
            drain_timeout: config.drain_timeout,
        }
    }

    /// Enqueue a job. Fails when the queue is full or the runner stopped;
    /// callers decide whether that is fatal for their submission.
    pub fn submit<F>(&self, name: &'static str, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = QueuedJob {
            id: Uuid::new_v4(),
            name,
            future: Box::pin(future),
        };
        debug!(job_id = %job.id, job = name, "submitting job");
        self.tx
            .try_send(job)
            .map_err(|e| anyhow!("job queue rejected '{name}': {e}"))
    }

    /// Jobs currently executing (queued jobs excluded).
    pub fn running_jobs(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop accepting work and wait for running jobs to drain.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let start = std::time::Instant::now();
        while self.running.load(Ordering::Relaxed) > 0 && start.elapsed() < self.drain_timeout {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let leftover = self.running.load(Ordering::Relaxed);
        if leftover > 0 {
            warn!(count = leftover, "jobs still running after drain timeout");
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.iter() {
            handle.abort();
        }
        workers.clear();
        info!("job runner stopped");
    }
}

async fn worker_loop(
    worker_index: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    shutdown: CancellationToken,
    running: Arc<AtomicUsize>,
) {
    loop {
        let job = {
            let mut receiver = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                job = receiver.recv() => job,
            }
        };

        let Some(job) = job else {
            // All senders dropped.
            break;
        };

        running.fetch_add(1, Ordering::Relaxed);
        debug!(worker = worker_index, job_id = %job.id, job = job.name, "job starting");
        let started = std::time::Instant::now();

        // Jobs record their own failures on the store; a panic here is a bug,
        // but it must not take the worker down with it.
        let result = tokio::spawn(job.future).await;
        if let Err(e) = result {
            error!(worker = worker_index, job_id = %job.id, job = job.name, error = %e, "job panicked");
        } else {
            debug!(
                worker = worker_index,
                job_id = %job.id,
                job = job.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job finished"
            );
        }
        running.fetch_sub(1, Ordering::Relaxed);
    }
}

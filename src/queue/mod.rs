//! Named in-memory job queues
//!
//! Five queues (events, routing, sync, scheduled, notifications) with
//! producer-side jobId deduplication, per-queue concurrency caps, token
//! bucket rate limiting and retry with exponential backoff. Jobs that
//! exhaust their attempts land in the durable failed set for manual
//! inspection.

mod job;
mod limiter;

pub use job::{Job, JobOutcome, JobPayload, QueueName, RoutingTrigger, ScheduledJob};
pub use limiter::TokenBucket;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{LeadflowError, Result};
use crate::outbound::backoff_delay;

/// Handles jobs popped from one queue
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<JobOutcome>;
}

/// Sink for jobs that exhausted their retry budget
#[async_trait]
pub trait FailedJobSink: Send + Sync + 'static {
    async fn record_failure(
        &self,
        queue: &str,
        job_id: &str,
        payload: &serde_json::Value,
        error_code: &str,
        error_message: &str,
        attempts: i32,
    ) -> Result<()>;
}

#[async_trait]
impl FailedJobSink for crate::store::PostgresStore {
    async fn record_failure(
        &self,
        queue: &str,
        job_id: &str,
        payload: &serde_json::Value,
        error_code: &str,
        error_message: &str,
        attempts: i32,
    ) -> Result<()> {
        self.insert_failed_job(queue, job_id, payload, error_code, error_message, attempts)
            .await?;
        Ok(())
    }
}

/// Per-queue counters exposed through the system surface
#[derive(Default)]
pub struct QueueStats {
    pub enqueued: AtomicU64,
    pub deduplicated: AtomicU64,
    pub processed: AtomicU64,
    pub skipped: AtomicU64,
    pub retried: AtomicU64,
    pub failed: AtomicU64,
    pub depth: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatsSnapshot {
    pub queue: &'static str,
    pub enqueued: u64,
    pub deduplicated: u64,
    pub processed: u64,
    pub skipped: u64,
    pub retried: u64,
    pub failed: u64,
    pub depth: i64,
}

impl QueueStats {
    fn snapshot(&self, queue: QueueName) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            queue: queue.as_str(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            depth: self.depth.load(Ordering::Relaxed),
        }
    }
}

struct QueueInner {
    name: QueueName,
    tx: mpsc::UnboundedSender<Job>,
    /// jobIds currently waiting in the channel (producer-side dedup)
    pending: DashMap<String, ()>,
    stats: QueueStats,
}

/// Producer handle over all five queues. Cheap to clone.
#[derive(Clone)]
pub struct JobQueues {
    inner: Arc<HashMap<QueueName, Arc<QueueInner>>>,
    receivers: Arc<Mutex<HashMap<QueueName, mpsc::UnboundedReceiver<Job>>>>,
}

impl JobQueues {
    pub fn new() -> Self {
        let mut inner = HashMap::new();
        let mut receivers = HashMap::new();
        for name in QueueName::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            inner.insert(
                name,
                Arc::new(QueueInner {
                    name,
                    tx,
                    pending: DashMap::new(),
                    stats: QueueStats::default(),
                }),
            );
            receivers.insert(name, rx);
        }
        Self {
            inner: Arc::new(inner),
            receivers: Arc::new(Mutex::new(receivers)),
        }
    }

    fn queue(&self, name: QueueName) -> &Arc<QueueInner> {
        self.inner
            .get(&name)
            .expect("all queues are constructed up front")
    }

    /// Enqueue a job; returns false when a job with the same id is already
    /// waiting (deduplicated). In-flight jobs do not block re-enqueue.
    pub fn enqueue(&self, name: QueueName, job_id: String, payload: JobPayload) -> Result<bool> {
        let queue = self.queue(name);
        if queue.pending.insert(job_id.clone(), ()).is_some() {
            queue.stats.deduplicated.fetch_add(1, Ordering::Relaxed);
            debug!(queue = name.as_str(), job = %job_id, "job deduplicated");
            return Ok(false);
        }

        let job = Job::new(name, job_id, payload);
        self.push(queue, job)?;
        queue.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn push(&self, queue: &Arc<QueueInner>, job: Job) -> Result<()> {
        queue.tx.send(job).map_err(|e| {
            LeadflowError::QueueClosed(format!("{} queue closed: {e}", queue.name.as_str()))
        })?;
        queue.stats.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Re-submit a retry attempt, bypassing producer dedup
    fn requeue(&self, mut job: Job) -> Result<()> {
        job.attempts += 1;
        let queue = self.queue(job.queue).clone();
        queue.pending.insert(job.id.clone(), ());
        let count = job.attempts;
        queue.stats.retried.fetch_add(1, Ordering::Relaxed);
        debug!(queue = queue.name.as_str(), job = %job.id, attempt = count, "job requeued");
        self.push(&queue, job)
    }

    /// Take the single receiver for one queue (called once per worker pool)
    pub async fn take_receiver(&self, name: QueueName) -> Option<mpsc::UnboundedReceiver<Job>> {
        self.receivers.lock().await.remove(&name)
    }

    pub fn stats(&self) -> Vec<QueueStatsSnapshot> {
        QueueName::ALL
            .iter()
            .map(|name| self.queue(*name).stats.snapshot(*name))
            .collect()
    }

    pub fn depth(&self, name: QueueName) -> i64 {
        self.queue(name).stats.depth.load(Ordering::Relaxed)
    }
}

impl Default for JobQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer loop for one named queue. Owns the receiver; spawns up to
/// `concurrency` concurrent handler invocations, each bounded by the
/// per-job deadline.
pub struct QueueConsumer {
    queues: JobQueues,
    name: QueueName,
    rx: mpsc::UnboundedReceiver<Job>,
    concurrency: u32,
    limiter: Option<Arc<TokenBucket>>,
    job_timeout: Duration,
    max_attempts: u32,
    failed_sink: Arc<dyn FailedJobSink>,
    shutdown: watch::Receiver<bool>,
}

impl QueueConsumer {
    pub async fn new(
        queues: JobQueues,
        name: QueueName,
        worker: &WorkerConfig,
        max_attempts: u32,
        failed_sink: Arc<dyn FailedJobSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let rx = queues.take_receiver(name).await.ok_or_else(|| {
            LeadflowError::Internal(format!(
                "receiver for {} queue already taken",
                name.as_str()
            ))
        })?;
        let limiter = if worker.jobs_per_sec > 0 {
            Some(Arc::new(TokenBucket::new(worker.jobs_per_sec as f64)))
        } else {
            None
        };
        Ok(Self {
            queues,
            name,
            rx,
            concurrency: worker.concurrency.max(1),
            limiter,
            job_timeout: Duration::from_secs(worker.job_timeout_secs),
            max_attempts,
            failed_sink,
            shutdown,
        })
    }

    /// Consume until shutdown, then drain in-flight work within the grace
    /// period. Aborted jobs stay retryable through the failed path.
    pub async fn run<H: JobHandler>(mut self, handler: Arc<H>, grace: Duration) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency as usize));
        info!(
            queue = self.name.as_str(),
            concurrency = self.concurrency,
            "queue consumer started"
        );

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                job = self.rx.recv() => {
                    let Some(job) = job else { break };
                    self.dispatch(job, &semaphore, &handler).await;
                }
            }
        }

        // Drain: reclaim every permit, bounded by the grace period
        let deadline = tokio::time::timeout(
            grace,
            semaphore.clone().acquire_many_owned(self.concurrency),
        );
        match deadline.await {
            Ok(_) => info!(queue = self.name.as_str(), "queue consumer drained"),
            Err(_) => warn!(
                queue = self.name.as_str(),
                "grace period elapsed with jobs in flight"
            ),
        }
    }

    async fn dispatch<H: JobHandler>(
        &mut self,
        job: Job,
        semaphore: &Arc<Semaphore>,
        handler: &Arc<H>,
    ) {
        let queue = self.queues.queue(self.name).clone();
        // Popped: clear the dedup key so a fresh job can be scheduled
        queue.pending.remove(&job.id);
        queue.stats.depth.fetch_sub(1, Ordering::Relaxed);

        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return;
        };
        let handler = handler.clone();
        let queues = self.queues.clone();
        let failed_sink = self.failed_sink.clone();
        let job_timeout = self.job_timeout;
        let max_attempts = self.max_attempts;

        tokio::spawn(async move {
            let _permit = permit;
            let started = std::time::Instant::now();
            let result = match tokio::time::timeout(job_timeout, handler.handle(&job)).await {
                Ok(result) => result,
                Err(_) => Err(LeadflowError::JobTimeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }),
            };

            match result {
                Ok(JobOutcome::Done) => {
                    queue.stats.processed.fetch_add(1, Ordering::Relaxed);
                    debug!(queue = queue.name.as_str(), job = %job.id, "job done");
                }
                Ok(JobOutcome::Skipped(reason)) => {
                    queue.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!(queue = queue.name.as_str(), job = %job.id, reason, "job skipped");
                }
                Err(err) if err.retryable() && job.attempts + 1 < max_attempts => {
                    let delay = backoff_delay(job.attempts);
                    warn!(
                        queue = queue.name.as_str(),
                        job = %job.id,
                        attempt = job.attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "job failed, scheduling retry"
                    );
                    tokio::time::sleep(delay).await;
                    if let Err(send_err) = queues.requeue(job) {
                        error!(error = %send_err, "failed to requeue job");
                    }
                }
                Err(err) => {
                    queue.stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        queue = queue.name.as_str(),
                        job = %job.id,
                        attempts = job.attempts + 1,
                        code = err.code(),
                        error = %err,
                        "job moved to failed set"
                    );
                    let payload =
                        serde_json::to_value(&job.payload).unwrap_or(serde_json::Value::Null);
                    if let Err(sink_err) = failed_sink
                        .record_failure(
                            queue.name.as_str(),
                            &job.id,
                            &payload,
                            err.code(),
                            &err.to_string(),
                            (job.attempts + 1) as i32,
                        )
                        .await
                    {
                        error!(error = %sink_err, "failed to persist failed job");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use uuid::Uuid;

    struct MemorySink {
        failures: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FailedJobSink for MemorySink {
        async fn record_failure(
            &self,
            queue: &str,
            job_id: &str,
            _payload: &serde_json::Value,
            error_code: &str,
            _error_message: &str,
            _attempts: i32,
        ) -> Result<()> {
            self.failures
                .lock()
                .await
                .push((format!("{queue}:{job_id}"), error_code.to_string()));
            Ok(())
        }
    }

    struct CountingHandler {
        calls: AtomicU32,
        fail_first: u32,
        permanent: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<JobOutcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(LeadflowError::Validation("bad payload".to_string()));
            }
            if n < self.fail_first {
                return Err(LeadflowError::TransientIo("flaky".to_string()));
            }
            Ok(JobOutcome::Done)
        }
    }

    fn routing_payload() -> JobPayload {
        JobPayload::EvaluateRouting {
            lead_id: Uuid::new_v4(),
            trigger: RoutingTrigger::EventProcessed,
        }
    }

    fn worker() -> WorkerConfig {
        WorkerConfig {
            concurrency: 2,
            jobs_per_sec: 0,
            job_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_enqueue_deduplicates_pending_jobs() {
        let queues = JobQueues::new();
        let id = Job::routing_job_id(Uuid::nil());
        assert!(queues
            .enqueue(QueueName::Routing, id.clone(), routing_payload())
            .unwrap());
        assert!(!queues
            .enqueue(QueueName::Routing, id.clone(), routing_payload())
            .unwrap());
        assert_eq!(queues.depth(QueueName::Routing), 1);

        let stats = queues.stats();
        let routing = stats.iter().find(|s| s.queue == "routing").unwrap();
        assert_eq!(routing.enqueued, 1);
        assert_eq!(routing.deduplicated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_retries_transient_failures() {
        let queues = JobQueues::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = Arc::new(MemorySink {
            failures: Mutex::new(Vec::new()),
        });
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 1,
            permanent: false,
        });

        let consumer = QueueConsumer::new(
            queues.clone(),
            QueueName::Routing,
            &worker(),
            3,
            sink.clone(),
            shutdown_rx,
        )
        .await
        .unwrap();

        queues
            .enqueue(QueueName::Routing, "job-1".to_string(), routing_payload())
            .unwrap();

        let run = tokio::spawn(consumer.run(handler.clone(), Duration::from_secs(5)));
        // First attempt fails, backoff elapses under paused time, retry wins
        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown_tx.send(true).unwrap();
        run.await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert!(sink.failures.lock().await.is_empty());
        let stats = queues.stats();
        let routing = stats.iter().find(|s| s.queue == "routing").unwrap();
        assert_eq!(routing.processed, 1);
        assert_eq!(routing.retried, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_goes_to_failed_set_without_retry() {
        let queues = JobQueues::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = Arc::new(MemorySink {
            failures: Mutex::new(Vec::new()),
        });
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            fail_first: 0,
            permanent: true,
        });

        let consumer = QueueConsumer::new(
            queues.clone(),
            QueueName::Events,
            &worker(),
            3,
            sink.clone(),
            shutdown_rx,
        )
        .await
        .unwrap();

        queues
            .enqueue(QueueName::Events, "evt-1".to_string(), routing_payload())
            .unwrap();

        let run = tokio::spawn(consumer.run(handler.clone(), Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        shutdown_tx.send(true).unwrap();
        run.await.unwrap();

        // Validation errors are never retried
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let failures = sink.failures.lock().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, "validation");
    }

    #[tokio::test]
    async fn test_receiver_taken_once() {
        let queues = JobQueues::new();
        assert!(queues.take_receiver(QueueName::Sync).await.is_some());
        assert!(queues.take_receiver(QueueName::Sync).await.is_none());
    }
}

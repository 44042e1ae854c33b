//! Bounded worker pool for concurrent candidate verification.
//!
//! The pool never runs more than its configured number of oracle processes
//! at once; excess submissions queue on a semaphore. Results arrive on a
//! single channel in completion order — ordinal-based arbitration is the
//! caller's job. Every job carries the generation of the state its
//! candidate was derived from, so results outliving a commit are
//! recognizably stale and dropped by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use whittle_core::{ReductionState, Verdict};
use whittle_oracle::{Oracle, OracleError};

/// Identifier of one submitted verification job.
pub type JobId = u64;

/// One completed verification.
#[derive(Debug)]
pub struct VerifyResult {
    pub job: JobId,
    /// Ordinal of the candidate within its pass's enumeration.
    pub ordinal: usize,
    /// Generation of the state the candidate was derived from.
    pub base_generation: u64,
    /// The classification, or a fatal resource error.
    pub verdict: Result<Verdict, OracleError>,
}

/// Dispatches oracle invocations, at most `workers` at a time.
pub struct WorkerPool {
    workers: usize,
    permits: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<VerifyResult>,
    rx: mpsc::UnboundedReceiver<VerifyResult>,
    in_flight: HashMap<JobId, JoinHandle<()>>,
    next_job: JobId,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            workers,
            permits: Arc::new(Semaphore::new(workers)),
            tx,
            rx,
            in_flight: HashMap::new(),
            next_job: 0,
        }
    }

    /// Maximum number of concurrently-running verifications.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of jobs submitted and not yet delivered or cancelled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Submit one candidate for verification.
    pub fn submit(
        &mut self,
        oracle: Arc<dyn Oracle>,
        candidate: Arc<ReductionState>,
        ordinal: usize,
        base_generation: u64,
    ) -> JobId {
        let job = self.next_job;
        self.next_job += 1;

        let permits = Arc::clone(&self.permits);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            // Closed only on pool drop; abort tears the task down anyway.
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let verdict = oracle.verify(&candidate).await;
            let _ = tx.send(VerifyResult {
                job,
                ordinal,
                base_generation,
                verdict,
            });
        });

        self.in_flight.insert(job, handle);
        job
    }

    /// Wait for the next completed verification, in completion order.
    ///
    /// Returns `None` when nothing is in flight and no result is queued.
    pub async fn next_result(&mut self) -> Option<VerifyResult> {
        match self.rx.try_recv() {
            Ok(result) => {
                self.in_flight.remove(&result.job);
                Some(result)
            }
            Err(TryRecvError::Empty) => {
                if self.in_flight.is_empty() {
                    return None;
                }
                let result = self.rx.recv().await?;
                self.in_flight.remove(&result.job);
                Some(result)
            }
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Cancel one job. Not-yet-started jobs never run; in-flight jobs are
    /// aborted and their oracle process is killed on drop, best-effort. A
    /// cancelled job produces no result.
    pub fn cancel(&mut self, job: JobId) {
        if let Some(handle) = self.in_flight.remove(&job) {
            handle.abort();
        }
    }

    /// Cancel every outstanding job.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

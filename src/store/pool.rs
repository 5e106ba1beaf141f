//! Fixed-size pool of write workers.
//!
//! Each worker owns its own queue. Jobs carry a shard key and all jobs with
//! the same key land on the same worker, so they run one at a time and in
//! submission order.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 16;

pub(crate) struct WritePool {
    queues: Vec<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WritePool {
    pub(crate) fn new(workers: usize) -> Result<Self> {
        let workers = workers.clamp(1, MAX_WORKERS);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = crossbeam_channel::unbounded::<Job>();
            let handle = std::thread::Builder::new()
                .name(format!("aquafeed-writer-{index}"))
                .spawn(move || {
                    debug!(worker = index, "write worker started");
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                    debug!(worker = index, "write worker stopped");
                })
                .map_err(|e| Error::Persistence(format!("failed to spawn write worker: {e}")))?;
            queues.push(tx);
            handles.push(handle);
        }
        Ok(Self { queues, handles })
    }

    pub(crate) fn workers(&self) -> usize {
        self.queues.len()
    }

    pub(crate) fn submit(&self, shard: i64, job: Job) -> Result<()> {
        if self.queues.is_empty() {
            return Err(Error::WorkerUnavailable);
        }
        let index = shard.rem_euclid(self.queues.len() as i64) as usize;
        self.queues[index]
            .send(job)
            .map_err(|_| Error::WorkerUnavailable)
    }

    /// Stop accepting jobs, let queued jobs finish and join every worker.
    pub(crate) fn shutdown(&mut self) {
        self.queues.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("write worker panicked");
            }
        }
    }
}

impl Drop for WritePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One-shot result of work handed to the write pool.
#[must_use = "a pending result reports whether the write succeeded"]
pub struct PendingResult<T> {
    rx: Receiver<Result<T>>,
}

impl<T> PendingResult<T> {
    pub(crate) fn channel() -> (Sender<Result<T>>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (tx, Self { rx })
    }

    /// A result that is already known, e.g. a rejection before dispatch.
    pub fn ready(value: Result<T>) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(value);
        pending
    }

    /// Block until the job has run.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(Error::WorkerUnavailable))
    }

    /// Block for at most `timeout`; `None` when the job has not finished yet.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::WorkerUnavailable)),
        }
    }

    /// Poll without blocking.
    pub fn try_take(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::WorkerUnavailable)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn same_shard_runs_in_submission_order() {
        let pool = WritePool::new(4).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pending = Vec::new();
        for i in 0..50 {
            let seen = Arc::clone(&seen);
            let (tx, result) = PendingResult::<()>::channel();
            pool.submit(
                7,
                Box::new(move || {
                    seen.lock().unwrap().push(i);
                    let _ = tx.send(Ok(()));
                }),
            )
            .unwrap();
            pending.push(result);
        }
        for p in pending {
            p.wait().unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn negative_shards_are_accepted() {
        let pool = WritePool::new(3).unwrap();
        let (tx, result) = PendingResult::channel();
        pool.submit(-1, Box::new(move || drop(tx.send(Ok(5))))).unwrap();
        assert_eq!(result.wait().unwrap(), 5);
    }

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(WritePool::new(0).unwrap().workers(), 1);
        assert_eq!(WritePool::new(500).unwrap().workers(), MAX_WORKERS);
    }

    #[test]
    fn shutdown_drains_queue_then_rejects() {
        let mut pool = WritePool::new(1).unwrap();
        let (tx, result) = PendingResult::channel();
        pool.submit(
            0,
            Box::new(move || {
                std::thread::sleep(Duration::from_millis(20));
                let _ = tx.send(Ok("done"));
            }),
        )
        .unwrap();
        pool.shutdown();
        assert_eq!(result.wait().unwrap(), "done");
        assert!(matches!(
            pool.submit(0, Box::new(|| {})),
            Err(Error::WorkerUnavailable)
        ));
    }

    #[test]
    fn dropped_job_resolves_as_unavailable() {
        let (tx, result) = PendingResult::<u8>::channel();
        drop(tx);
        assert!(matches!(result.wait(), Err(Error::WorkerUnavailable)));
    }

    #[test]
    fn try_take_before_and_after() {
        let (tx, result) = PendingResult::channel();
        assert!(result.try_take().is_none());
        tx.send(Ok(1)).unwrap();
        assert_eq!(result.try_take().unwrap().unwrap(), 1);
    }
}

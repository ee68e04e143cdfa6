//! Microtask (job) queue
//!
//! The ordered FIFO collection of deferred jobs produced by the promise
//! engine and the async generator engine. It is the single piece of
//! mutable state every component touches: enqueues are append-only, and
//! the host's drain loop consumes each job exactly once.

use marten_vm_core::job::{Job, JobScheduler};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// FIFO queue of jobs
pub struct JobQueue {
    queue: Mutex<VecDeque<Job>>,
    len: AtomicUsize,
}

impl JobQueue {
    /// Create new empty queue
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        })
    }

    /// Append a job to the tail
    pub fn enqueue_job(&self, job: Job) {
        self.queue.lock().push_back(job);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the head job
    pub fn dequeue(&self) -> Option<Job> {
        let job = self.queue.lock().pop_front();
        if job.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        job
    }

    /// Number of pending jobs
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Clear all pending jobs
    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        let len = queue.len();
        queue.clear();
        self.len.fetch_sub(len, Ordering::Relaxed);
    }
}

impl JobScheduler for JobQueue {
    fn enqueue(&self, job: Job) {
        self.enqueue_job(job);
    }
}

//! The job-scheduling seam
//!
//! The promise engine and the async generator engine never run their
//! callbacks synchronously; they hand zero-argument jobs to a scheduler
//! and the host's drain loop runs them in FIFO order. The concrete queue
//! lives in the runtime crate; this trait is the seam between them.

use crate::error::VmResult;

/// A deferred zero-argument unit of work, consumed exactly once.
///
/// A job returning `Err` is reported to the host's unhandled-failure
/// hook by the drain loop; it never halts the drain of later jobs.
pub type Job = Box<dyn FnOnce() -> VmResult<()> + Send>;

/// FIFO scheduler for deferred jobs.
pub trait JobScheduler: Send + Sync {
    /// Append a job to the queue tail.
    fn enqueue(&self, job: Job);
}

#[cfg(test)]
pub(crate) mod testing {
    //! A tiny in-process queue for core unit tests. The real queue lives
    //! in the runtime crate.

    use super::{Job, JobScheduler};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    pub struct TestQueue {
        jobs: Mutex<VecDeque<Job>>,
    }

    impl TestQueue {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Drain to completion, including jobs enqueued mid-drain.
        /// Returns the number of jobs run.
        pub fn run_all(&self) -> usize {
            let mut ran = 0;
            loop {
                let job = self.jobs.lock().pop_front();
                let Some(job) = job else { break };
                let _ = job();
                ran += 1;
            }
            ran
        }

    }

    impl JobScheduler for TestQueue {
        fn enqueue(&self, job: Job) {
            self.jobs.lock().push_back(job);
        }
    }
}

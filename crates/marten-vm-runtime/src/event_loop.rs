//! Event loop: the host's outer drain driver
//!
//! Drains the job queue to completion between turns, including jobs
//! enqueued by jobs already running, reproducing microtask ordering. A
//! failure escaping a job is reported to the unhandled-failure hook and
//! never halts the drain of subsequent jobs. The loop is inspectable
//! for idle detection, so embedding code can tell whether pending
//! asynchronous work remains before tearing down.

use crate::microtask::JobQueue;
use marten_vm_core::error::{VmError, VmResult};
use marten_vm_core::job::JobScheduler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

/// Hook invoked with a failure that escaped a job
pub type UnhandledFailureHook = Box<dyn Fn(&VmError) + Send + Sync>;

/// Event loop driving the job queue
pub struct EventLoop {
    jobs: Arc<JobQueue>,
    drain_budget: usize,
    unhandled: Mutex<Option<UnhandledFailureHook>>,
    draining: AtomicBool,
}

impl EventLoop {
    /// Create a new event loop with an unbounded drain pass
    pub fn new() -> Arc<Self> {
        EventLoop::with_config(0, None)
    }

    /// Create a new event loop.
    ///
    /// `drain_budget` bounds how many jobs one [`drain_pass`] runs
    /// (0 = unbounded).
    ///
    /// [`drain_pass`]: EventLoop::drain_pass
    pub fn with_config(drain_budget: usize, unhandled: Option<UnhandledFailureHook>) -> Arc<Self> {
        Arc::new(Self {
            jobs: JobQueue::new(),
            drain_budget,
            unhandled: Mutex::new(unhandled),
            draining: AtomicBool::new(false),
        })
    }

    /// The underlying job queue
    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.jobs
    }

    /// The queue as a scheduler, for wiring promises and async
    /// generators
    pub fn scheduler(&self) -> Arc<dyn JobScheduler> {
        self.jobs.clone()
    }

    /// Enqueue a host job
    pub fn queue_microtask<F>(&self, job: F)
    where
        F: FnOnce() -> VmResult<()> + Send + 'static,
    {
        self.jobs.enqueue_job(Box::new(job));
    }

    /// Whether pending jobs remain
    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Replace the unhandled-failure hook
    pub fn set_unhandled_hook(&self, hook: UnhandledFailureHook) {
        *self.unhandled.lock() = Some(hook);
    }

    /// Drain the queue to completion, including jobs enqueued
    /// mid-drain. Returns the number of jobs run.
    pub fn run_until_idle(&self) -> usize {
        self.drain(0)
    }

    /// Run one bounded drain pass (bounded by the configured budget).
    /// Returns the number of jobs run.
    pub fn drain_pass(&self) -> usize {
        self.drain(self.drain_budget)
    }

    fn drain(&self, budget: usize) -> usize {
        // A drain started from inside a running job is a no-op; the
        // outer drain picks the new jobs up.
        if self.draining.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut ran = 0;
        while let Some(job) = self.jobs.dequeue() {
            if let Err(error) = job() {
                self.report_failure(&error);
            }
            ran += 1;
            if budget != 0 && ran >= budget {
                break;
            }
        }

        self.draining.store(false, Ordering::Release);
        if ran > 0 {
            trace!(jobs = ran, "drained job queue");
        }
        ran
    }

    fn report_failure(&self, error: &VmError) {
        let hook = self.unhandled.lock();
        match &*hook {
            Some(hook) => hook(error),
            None => warn!(%error, "unhandled job failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_run_until_idle_includes_mid_drain_jobs() {
        let event_loop = EventLoop::new();
        let ran = Arc::new(AtomicU32::new(0));

        let queue = event_loop.job_queue().clone();
        let observed = ran.clone();
        event_loop.queue_microtask(move || {
            observed.fetch_add(1, Ordering::Relaxed);
            let observed = observed.clone();
            queue.enqueue_job(Box::new(move || {
                observed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }));
            Ok(())
        });

        let drained = event_loop.run_until_idle();
        assert_eq!(drained, 2);
        assert_eq!(ran.load(Ordering::Relaxed), 2);
        assert!(!event_loop.has_pending_jobs());
    }

    #[test]
    fn test_failure_does_not_halt_drain() {
        let failures = Arc::new(AtomicU32::new(0));
        let observed = failures.clone();
        let event_loop = EventLoop::with_config(
            0,
            Some(Box::new(move |_error| {
                observed.fetch_add(1, Ordering::Relaxed);
            })),
        );

        let ran = Arc::new(AtomicBool::new(false));
        event_loop.queue_microtask(|| Err(VmError::type_error("job failed")));
        let observed = ran.clone();
        event_loop.queue_microtask(move || {
            observed.store(true, Ordering::Relaxed);
            Ok(())
        });

        assert_eq!(event_loop.run_until_idle(), 2);
        assert_eq!(failures.load(Ordering::Relaxed), 1);
        assert!(ran.load(Ordering::Relaxed));
    }

    #[test]
    fn test_drain_budget_bounds_one_pass() {
        let event_loop = EventLoop::with_config(1, None);
        for _ in 0..3 {
            event_loop.queue_microtask(|| Ok(()));
        }
        assert_eq!(event_loop.drain_pass(), 1);
        assert!(event_loop.has_pending_jobs());
        assert_eq!(event_loop.run_until_idle(), 2);
        assert!(!event_loop.has_pending_jobs());
    }
}

//! Embedder facade
//!
//! Bundles an event loop with constructors pre-wired to its job queue,
//! so embedding code can create promises and async generators without
//! threading the scheduler by hand.

use crate::event_loop::{EventLoop, UnhandledFailureHook};
use marten_vm_core::async_generator::{self, IterationDecision, JsAsyncGenerator};
use marten_vm_core::combinators;
use marten_vm_core::error::VmResult;
use marten_vm_core::generator::{GeneratorFrame, JsGenerator};
use marten_vm_core::iterator::IteratorResult;
use marten_vm_core::job::JobScheduler;
use marten_vm_core::promise::{JsPromise, PromiseWithResolvers, ResolveFn};
use marten_vm_core::value::Value;
use std::sync::Arc;

/// The Marten engine runtime
pub struct Marten {
    event_loop: Arc<EventLoop>,
}

impl Marten {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        Marten::builder().build()
    }

    /// Start configuring a runtime
    pub fn builder() -> MartenBuilder {
        MartenBuilder::default()
    }

    /// The event loop
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.event_loop
    }

    /// The runtime's job scheduler
    pub fn scheduler(&self) -> Arc<dyn JobScheduler> {
        self.event_loop.scheduler()
    }

    /// Create a pending promise with resolve/reject capabilities
    pub fn promise(&self) -> PromiseWithResolvers {
        JsPromise::with_resolvers(self.scheduler())
    }

    /// Create a promise from an executor invoked synchronously with the
    /// resolve/reject capabilities
    pub fn promise_with<F>(&self, executor: F) -> Arc<JsPromise>
    where
        F: FnOnce(ResolveFn, ResolveFn) -> VmResult<()>,
    {
        JsPromise::new(self.scheduler(), executor)
    }

    /// A promise resolved with the value (identity on engine promises)
    pub fn resolved(&self, value: Value) -> Arc<JsPromise> {
        JsPromise::resolve_value(&self.scheduler(), value)
    }

    /// A promise rejected with the reason
    pub fn rejected(&self, reason: Value) -> Arc<JsPromise> {
        JsPromise::reject_value(&self.scheduler(), reason)
    }

    /// Call `f` synchronously, funneling its return value or thrown
    /// error into a fresh promise
    pub fn try_<F>(&self, f: F) -> Arc<JsPromise>
    where
        F: FnOnce() -> VmResult<Value>,
    {
        JsPromise::try_(&self.scheduler(), f)
    }

    /// `all` combinator over any iterable of values
    pub fn all<I>(&self, values: I) -> Arc<JsPromise>
    where
        I: IntoIterator<Item = Value>,
    {
        combinators::all(&self.scheduler(), values)
    }

    /// `race` combinator over any iterable of values
    pub fn race<I>(&self, values: I) -> Arc<JsPromise>
    where
        I: IntoIterator<Item = Value>,
    {
        combinators::race(&self.scheduler(), values)
    }

    /// `allSettled` combinator over any iterable of values
    pub fn all_settled<I>(&self, values: I) -> Arc<JsPromise>
    where
        I: IntoIterator<Item = Value>,
    {
        combinators::all_settled(&self.scheduler(), values)
    }

    /// `any` combinator over any iterable of values
    pub fn any<I>(&self, values: I) -> Arc<JsPromise>
    where
        I: IntoIterator<Item = Value>,
    {
        combinators::any(&self.scheduler(), values)
    }

    /// Create an async generator over an explicit frame
    pub fn async_generator(&self, frame: Box<dyn GeneratorFrame>) -> Arc<JsAsyncGenerator> {
        JsAsyncGenerator::new(frame, self.scheduler())
    }

    /// Create an async generator over a sequence
    pub fn async_generator_from_sequence(&self, values: Vec<Value>) -> Arc<JsAsyncGenerator> {
        JsAsyncGenerator::from_sequence(values, self.scheduler())
    }

    /// Create an async generator from a produce-next-result closure
    pub fn async_generator_from_fn<F>(&self, produce: F) -> Arc<JsAsyncGenerator>
    where
        F: FnMut(Value) -> VmResult<IteratorResult> + Send + 'static,
    {
        JsAsyncGenerator::from_fn(produce, self.scheduler())
    }

    /// Drive an async generator with an await-style loop
    pub fn for_each<F>(&self, generator: &Arc<JsAsyncGenerator>, callback: F) -> Arc<JsPromise>
    where
        F: FnMut(Value) -> VmResult<IterationDecision> + Send + 'static,
    {
        async_generator::for_each(generator, callback)
    }

    /// Create a synchronous generator over a sequence
    pub fn generator_from_sequence(&self, values: Vec<Value>) -> Arc<JsGenerator> {
        JsGenerator::from_sequence(values)
    }

    /// Create a synchronous generator from a produce-next-result closure
    pub fn generator_from_fn<F>(&self, produce: F) -> Arc<JsGenerator>
    where
        F: FnMut(Value) -> VmResult<IteratorResult> + Send + 'static,
    {
        JsGenerator::from_fn(produce)
    }

    /// Drain the job queue to completion; returns the number of jobs run
    pub fn run_until_idle(&self) -> usize {
        self.event_loop.run_until_idle()
    }

    /// Whether pending asynchronous work remains
    pub fn pending_jobs(&self) -> bool {
        self.event_loop.has_pending_jobs()
    }
}

impl Default for Marten {
    fn default() -> Self {
        Marten::new()
    }
}

/// Builder for [`Marten`]
#[derive(Default)]
pub struct MartenBuilder {
    drain_budget: usize,
    unhandled: Option<UnhandledFailureHook>,
}

impl MartenBuilder {
    /// Bound how many jobs one `drain_pass` runs (0 = unbounded)
    pub fn drain_budget(mut self, budget: usize) -> Self {
        self.drain_budget = budget;
        self
    }

    /// Install a hook for failures escaping jobs
    pub fn on_unhandled_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&marten_vm_core::error::VmError) + Send + Sync + 'static,
    {
        self.unhandled = Some(Box::new(hook));
        self
    }

    /// Build the runtime
    pub fn build(self) -> Marten {
        Marten {
            event_loop: EventLoop::with_config(self.drain_budget, self.unhandled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_promise_round_trip() {
        let marten = Marten::new();
        let capability = marten.promise();
        let derived = capability
            .promise
            .then_fulfilled(|v| Ok(Value::number(v.as_number().unwrap() + 1.0)));
        (capability.resolve)(Value::number(1.0));
        marten.run_until_idle();
        assert_eq!(derived.result(), Some(Value::number(2.0)));
        assert!(!marten.pending_jobs());
    }

    #[test]
    fn test_builder_hook() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let failures = Arc::new(AtomicU32::new(0));
        let observed = failures.clone();
        let marten = Marten::builder()
            .on_unhandled_failure(move |_| {
                observed.fetch_add(1, Ordering::Relaxed);
            })
            .build();
        marten
            .event_loop()
            .queue_microtask(|| Err(marten_vm_core::error::VmError::internal("whoops")));
        marten.run_until_idle();
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }
}

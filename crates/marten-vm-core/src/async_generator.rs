//! Async generator engine
//!
//! An async generator layers a per-generator request queue and the
//! promise engine on top of the synchronous frame model. Every public
//! method call appends a `{completion, result promise}` request; the
//! queue is served strictly in arrival order with at most one request
//! in flight against the frame. When the frame suspends on an awaited
//! expression the in-flight request parks, the expression is resolved
//! through the promise engine, and resumption arrives as a reaction
//! job.

use crate::error::{VmError, VmResult};
use crate::generator::{Completion, FrameOutcome, GeneratorFrame, closure_frame, sequence_frame};
use crate::iterator::IteratorResult;
use crate::job::JobScheduler;
use crate::promise::JsPromise;
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Async generator execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncGeneratorState {
    /// Created but never resumed
    SuspendedStart,
    /// Suspended at a yield point
    SuspendedYield,
    /// Currently executing
    Executing,
    /// Parked on an awaited expression
    AwaitingInner,
    /// Completed; terminal
    Completed,
}

/// A queued `next`/`return`/`throw` call awaiting its turn
struct AsyncGeneratorRequest {
    completion: Completion,
    promise: Arc<JsPromise>,
}

/// An async generator object
pub struct JsAsyncGenerator {
    state: Mutex<AsyncGeneratorState>,
    frame: Mutex<Box<dyn GeneratorFrame>>,
    requests: Mutex<VecDeque<AsyncGeneratorRequest>>,
    current: Mutex<Option<AsyncGeneratorRequest>>,
    in_flight: AtomicBool,
    jobs: Arc<dyn JobScheduler>,
}

impl std::fmt::Debug for JsAsyncGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncGenerator")
            .field("state", &*self.state.lock())
            .field("queued", &self.requests.lock().len())
            .finish()
    }
}

impl JsAsyncGenerator {
    /// Create an async generator over an explicit frame.
    ///
    /// The frame may emit [`FrameOutcome::Await`] in addition to the
    /// synchronous outcomes.
    pub fn new(frame: Box<dyn GeneratorFrame>, jobs: Arc<dyn JobScheduler>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AsyncGeneratorState::SuspendedStart),
            frame: Mutex::new(frame),
            requests: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            jobs,
        })
    }

    /// Create an async generator yielding the elements of a sequence
    pub fn from_sequence(values: Vec<Value>, jobs: Arc<dyn JobScheduler>) -> Arc<Self> {
        JsAsyncGenerator::new(sequence_frame(values), jobs)
    }

    /// Create an async generator from a produce-next-result closure
    pub fn from_fn<F>(produce: F, jobs: Arc<dyn JobScheduler>) -> Arc<Self>
    where
        F: FnMut(Value) -> VmResult<IteratorResult> + Send + 'static,
    {
        JsAsyncGenerator::new(closure_frame(produce), jobs)
    }

    /// Get the current state
    pub fn state(&self) -> AsyncGeneratorState {
        *self.state.lock()
    }

    /// Check if the generator is completed.
    ///
    /// A completed generator with an empty request queue holds no
    /// further work.
    pub fn is_completed(&self) -> bool {
        *self.state.lock() == AsyncGeneratorState::Completed
    }

    /// Number of requests waiting to be served
    pub fn pending_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Queue a resumption; the promise settles with a `{value, done}`
    /// record once the request is served.
    pub fn next(self: &Arc<Self>, value: Value) -> Arc<JsPromise> {
        self.enqueue_request(Completion::Next(value))
    }

    /// Queue an early return; served in submission order like `next`.
    pub fn return_(self: &Arc<Self>, value: Value) -> Arc<JsPromise> {
        self.enqueue_request(Completion::Return(value))
    }

    /// Queue an exception injection; served in submission order.
    pub fn throw(self: &Arc<Self>, error: Value) -> Arc<JsPromise> {
        self.enqueue_request(Completion::Throw(error))
    }

    fn enqueue_request(self: &Arc<Self>, completion: Completion) -> Arc<JsPromise> {
        let promise = JsPromise::pending(self.jobs.clone());
        self.requests.lock().push_back(AsyncGeneratorRequest {
            completion,
            promise: promise.clone(),
        });
        if !self.in_flight.swap(true, Ordering::AcqRel) {
            self.pump();
        }
        promise
    }

    /// Serve queued requests until the queue drains or a request parks
    /// on an await.
    fn pump(self: &Arc<Self>) {
        loop {
            let request = self.requests.lock().pop_front();
            let Some(request) = request else {
                self.in_flight.store(false, Ordering::Release);
                return;
            };
            let completion = request.completion.clone();
            *self.current.lock() = Some(request);
            if !self.step(completion) {
                return;
            }
        }
    }

    /// Serve one request head. Returns false when the frame parked on
    /// an await and the request stays in flight.
    fn step(self: &Arc<Self>, completion: Completion) -> bool {
        let state = self.state();
        match completion {
            Completion::Next(value) => match state {
                AsyncGeneratorState::Completed => {
                    self.fulfill_current(IteratorResult::done_undefined());
                    true
                }
                _ => self.drive(Completion::Next(value)),
            },
            Completion::Return(value) => match state {
                AsyncGeneratorState::Completed => {
                    self.fulfill_current(IteratorResult::done(value));
                    true
                }
                _ => {
                    let has_cleanup = self.frame.lock().has_cleanup();
                    if has_cleanup {
                        self.drive(Completion::Return(value))
                    } else {
                        self.set_state(AsyncGeneratorState::Completed);
                        self.fulfill_current(IteratorResult::done(value));
                        true
                    }
                }
            },
            Completion::Throw(error) => match state {
                AsyncGeneratorState::Completed => {
                    self.fulfill_current(IteratorResult::done_undefined());
                    true
                }
                AsyncGeneratorState::SuspendedStart => {
                    self.set_state(AsyncGeneratorState::Completed);
                    self.reject_current(VmError::exception(error));
                    true
                }
                _ => self.drive(Completion::Throw(error)),
            },
        }
    }

    /// Resume the frame with a completion and dispatch its outcome.
    fn drive(self: &Arc<Self>, completion: Completion) -> bool {
        self.set_state(AsyncGeneratorState::Executing);
        let outcome = self.frame.lock().resume(completion);
        match outcome {
            FrameOutcome::Yield(value) => {
                self.set_state(AsyncGeneratorState::SuspendedYield);
                self.fulfill_current(IteratorResult::yielded(value));
                true
            }
            FrameOutcome::Return(value) => {
                self.set_state(AsyncGeneratorState::Completed);
                self.fulfill_current(IteratorResult::done(value));
                true
            }
            FrameOutcome::Throw(error) => {
                self.set_state(AsyncGeneratorState::Completed);
                self.reject_current(error);
                true
            }
            FrameOutcome::Delegate(_) => {
                self.set_state(AsyncGeneratorState::Completed);
                self.reject_current(VmError::internal(
                    "delegation is not supported in async generator frames",
                ));
                true
            }
            FrameOutcome::Await(value) => {
                self.set_state(AsyncGeneratorState::AwaitingInner);
                let inner = JsPromise::resolve_value(&self.jobs, value);
                let me = self.clone();
                let me_reject = self.clone();
                inner.on_settled(
                    move |resolved| me.resume_after_await(Completion::Next(resolved)),
                    move |reason| me_reject.resume_after_await(Completion::Throw(reason)),
                );
                false
            }
        }
    }

    /// Reaction-job continuation after an awaited expression settles.
    fn resume_after_await(self: &Arc<Self>, completion: Completion) {
        if self.drive(completion) {
            self.pump();
        }
    }

    fn set_state(&self, state: AsyncGeneratorState) {
        *self.state.lock() = state;
    }

    fn fulfill_current(&self, result: IteratorResult) {
        if let Some(request) = self.current.lock().take() {
            request.promise.resolve(result.to_record());
        }
    }

    fn reject_current(&self, error: VmError) {
        if let Some(request) = self.current.lock().take() {
            request.promise.reject(error.to_value());
        }
    }
}

/// What an iteration callback wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationDecision {
    /// Keep iterating
    Continue,
    /// Stop early; the generator is closed through `return_`
    Break,
}

type SharedCallback = Arc<Mutex<Box<dyn FnMut(Value) -> VmResult<IterationDecision> + Send>>>;

/// Drive an async generator the way an await-based loop does: call
/// `next` repeatedly, awaiting each result promise as a reaction, and
/// close the generator through `return_` on early exit so cleanup is
/// guaranteed.
///
/// The returned promise fulfills with the generator's final value on
/// exhaustion (or undefined on early exit) and rejects if the generator
/// or the callback raises.
pub fn for_each<F>(generator: &Arc<JsAsyncGenerator>, callback: F) -> Arc<JsPromise>
where
    F: FnMut(Value) -> VmResult<IterationDecision> + Send + 'static,
{
    let done = JsPromise::pending(generator.jobs.clone());
    let callback: SharedCallback = Arc::new(Mutex::new(Box::new(callback)));
    for_each_step(generator.clone(), callback, done.clone());
    done
}

fn for_each_step(generator: Arc<JsAsyncGenerator>, callback: SharedCallback, done: Arc<JsPromise>) {
    let step = generator.next(Value::undefined());
    let done_reject = done.clone();
    step.on_settled(
        move |record| {
            let result = match IteratorResult::from_record(&record) {
                Ok(result) => result,
                Err(error) => {
                    done.reject(error.to_value());
                    return;
                }
            };
            if result.done {
                done.resolve(result.value);
                return;
            }
            let decision = (*callback.lock())(result.value);
            match decision {
                Ok(IterationDecision::Continue) => for_each_step(generator, callback, done),
                Ok(IterationDecision::Break) => close_early(generator, done, None),
                Err(error) => close_early(generator, done, Some(error)),
            }
        },
        move |reason| done_reject.reject(reason),
    );
}

fn close_early(generator: Arc<JsAsyncGenerator>, done: Arc<JsPromise>, error: Option<VmError>) {
    let closed = generator.return_(Value::undefined());
    let done_reject = done.clone();
    closed.on_settled(
        move |_| match error {
            None => done.resolve(Value::Undefined),
            Some(error) => done.reject(error.to_value()),
        },
        move |reason| done_reject.reject(reason),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::testing::TestQueue;

    fn scheduler(queue: &Arc<TestQueue>) -> Arc<dyn JobScheduler> {
        queue.clone()
    }

    fn record_of(promise: &Arc<JsPromise>) -> IteratorResult {
        IteratorResult::from_record(&promise.result().expect("promise not settled")).unwrap()
    }

    #[test]
    fn test_sequence_requests_in_order() {
        let queue = TestQueue::new();
        let generator = JsAsyncGenerator::from_sequence(
            vec![Value::number(1.0), Value::number(2.0)],
            scheduler(&queue),
        );

        let first = generator.next(Value::undefined());
        let second = generator.next(Value::undefined());
        let third = generator.next(Value::undefined());
        queue.run_all();

        let first = record_of(&first);
        assert!(!first.done);
        assert_eq!(first.value.as_number(), Some(1.0));

        let second = record_of(&second);
        assert_eq!(second.value.as_number(), Some(2.0));

        let third = record_of(&third);
        assert!(third.done);
        assert!(third.value.is_undefined());
        assert!(generator.is_completed());
    }

    #[test]
    fn test_next_then_immediate_return_not_reordered() {
        let queue = TestQueue::new();
        let generator = JsAsyncGenerator::from_sequence(
            vec![Value::number(1.0), Value::number(2.0)],
            scheduler(&queue),
        );

        let first = generator.next(Value::undefined());
        let second = generator.return_(Value::number(9.0));
        queue.run_all();

        let first = record_of(&first);
        assert!(!first.done);
        assert_eq!(first.value.as_number(), Some(1.0));

        let second = record_of(&second);
        assert!(second.done);
        assert_eq!(second.value.as_number(), Some(9.0));

        let after = generator.next(Value::undefined());
        queue.run_all();
        assert!(record_of(&after).done);
    }

    #[test]
    fn test_throw_rejects_result_promise() {
        let queue = TestQueue::new();
        let generator = JsAsyncGenerator::from_sequence(
            vec![Value::number(1.0)],
            scheduler(&queue),
        );

        let first = generator.next(Value::undefined());
        let thrown = generator.throw(Value::string("boom"));
        queue.run_all();

        assert!(!record_of(&first).done);
        assert!(thrown.is_rejected());
        assert_eq!(thrown.result(), Some(Value::string("boom")));
        assert!(generator.is_completed());
    }

    #[test]
    fn test_pending_requests_inspection() {
        let queue = TestQueue::new();
        let generator =
            JsAsyncGenerator::from_sequence(vec![Value::number(1.0)], scheduler(&queue));
        assert_eq!(generator.pending_requests(), 0);
        let _first = generator.next(Value::undefined());
        // Served synchronously: nothing awaited, queue drains in the call
        assert_eq!(generator.pending_requests(), 0);
    }
}

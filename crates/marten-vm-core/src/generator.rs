//! Synchronous generator engine
//!
//! Generators are resumable frames driven through `next`/`return`/`throw`.
//! There is no host coroutine support: a generator body is a state
//! machine over its suspension points, captured by a [`GeneratorFrame`]
//! that the driver re-enters with an injected [`Completion`]. Embedded
//! native generators (sequences, closures) implement the same frame
//! trait, so calling code cannot tell them apart from frame-compiled
//! bodies.
//!
//! ## Usage
//!
//! ```ignore
//! let gen = JsGenerator::from_sequence(vec![Value::number(1.0), Value::number(2.0)]);
//! gen.next(Value::undefined()); // { value: 1, done: false }
//! gen.next(Value::undefined()); // { value: 2, done: false }
//! gen.next(Value::undefined()); // { value: undefined, done: true }
//! ```

use crate::error::{VmError, VmResult};
use crate::iterator::{IterTarget, IteratorResult, MethodLookup};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// Generator execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created but never resumed
    SuspendedStart,
    /// Suspended at a yield point
    SuspendedYield,
    /// Currently executing
    Executing,
    /// Completed (returned or thrown); terminal
    Completed,
}

/// The completion injected into a frame on resumption
#[derive(Debug, Clone)]
pub enum Completion {
    /// Resume normally; the value becomes the result of the suspended
    /// yield expression
    Next(Value),
    /// Inject an early return at the suspension point
    Return(Value),
    /// Inject an exception at the suspension point
    Throw(Value),
}

/// What a frame did with its resumption
pub enum FrameOutcome {
    /// Suspended at a yield point with a value
    Yield(Value),
    /// Began delegating iteration to the given iterable
    Delegate(Value),
    /// Ran to completion with a value
    Return(Value),
    /// Completed abruptly with an exception
    Throw(VmError),
    /// Suspended on an awaited expression (async frames only)
    Await(Value),
}

/// A resumable execution frame.
///
/// The frame owns its locals and saved position; `resume` re-enters the
/// evaluator at that position with the injected completion. A `Return`
/// completion reaches the frame only when [`has_cleanup`] reported an
/// enclosing cleanup region, so plain frames never see one.
///
/// [`has_cleanup`]: GeneratorFrame::has_cleanup
pub trait GeneratorFrame: Send {
    /// Re-enter the frame at its saved suspension point.
    fn resume(&mut self, input: Completion) -> FrameOutcome;

    /// Whether an enclosing cleanup region is active at the current
    /// suspension point. Governs whether an injected return resumes the
    /// frame at all.
    fn has_cleanup(&self) -> bool {
        false
    }
}

struct GeneratorInner {
    frame: Box<dyn GeneratorFrame>,
    delegate: Option<IterTarget>,
}

/// A synchronous generator object
pub struct JsGenerator {
    state: Mutex<GeneratorState>,
    inner: Mutex<GeneratorInner>,
}

impl std::fmt::Debug for JsGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl JsGenerator {
    /// Create a generator over an explicit frame
    pub fn new(frame: Box<dyn GeneratorFrame>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GeneratorState::SuspendedStart),
            inner: Mutex::new(GeneratorInner {
                frame,
                delegate: None,
            }),
        })
    }

    /// Create a generator yielding the elements of a sequence
    pub fn from_sequence(values: Vec<Value>) -> Arc<Self> {
        JsGenerator::new(sequence_frame(values))
    }

    /// Create a generator from a produce-next-result closure.
    ///
    /// The closure receives the sent value and yields until it reports a
    /// done result, which completes the generator with that value.
    pub fn from_fn<F>(produce: F) -> Arc<Self>
    where
        F: FnMut(Value) -> VmResult<IteratorResult> + Send + 'static,
    {
        JsGenerator::new(closure_frame(produce))
    }

    /// Get the current state
    pub fn state(&self) -> GeneratorState {
        *self.state.lock()
    }

    /// Check if the generator is completed
    pub fn is_completed(&self) -> bool {
        *self.state.lock() == GeneratorState::Completed
    }

    /// Check if the generator is suspended (start or yield)
    pub fn is_suspended(&self) -> bool {
        matches!(
            *self.state.lock(),
            GeneratorState::SuspendedStart | GeneratorState::SuspendedYield
        )
    }

    fn set_state(&self, state: GeneratorState) {
        *self.state.lock() = state;
    }

    fn reentrancy_error() -> VmError {
        VmError::type_error("generator is already running")
    }

    /// Resume the generator with a sent value.
    pub fn next(&self, arg: Value) -> VmResult<IteratorResult> {
        match self.state() {
            GeneratorState::Completed => Ok(IteratorResult::done_undefined()),
            GeneratorState::Executing => Err(Self::reentrancy_error()),
            _ => self.dispatch(Completion::Next(arg)),
        }
    }

    /// Inject an early return.
    ///
    /// Completes the generator without resuming the frame unless an
    /// enclosing cleanup region must run first.
    pub fn return_(&self, arg: Value) -> VmResult<IteratorResult> {
        match self.state() {
            GeneratorState::Completed => Ok(IteratorResult::done(arg)),
            GeneratorState::Executing => Err(Self::reentrancy_error()),
            _ => self.dispatch(Completion::Return(arg)),
        }
    }

    /// Inject an exception at the suspension point.
    ///
    /// On a never-started generator the frame is closed and the
    /// exception propagates without resuming.
    pub fn throw(&self, error: Value) -> VmResult<IteratorResult> {
        match self.state() {
            GeneratorState::Completed => Ok(IteratorResult::done_undefined()),
            GeneratorState::Executing => Err(Self::reentrancy_error()),
            GeneratorState::SuspendedStart => {
                self.set_state(GeneratorState::Completed);
                Err(VmError::exception(error))
            }
            GeneratorState::SuspendedYield => self.dispatch(Completion::Throw(error)),
        }
    }

    /// Bridge to Rust iteration, yielding values until done.
    pub fn iter(self: &Arc<Self>) -> GeneratorIter {
        GeneratorIter {
            generator: self.clone(),
        }
    }

    fn dispatch(&self, completion: Completion) -> VmResult<IteratorResult> {
        let mut inner = self.inner.lock();
        self.set_state(GeneratorState::Executing);

        if inner.delegate.is_some() {
            return self.run_delegated(&mut inner, completion);
        }

        match completion {
            Completion::Next(value) => {
                let outcome = inner.frame.resume(Completion::Next(value));
                self.handle_outcome(&mut inner, outcome)
            }
            Completion::Return(value) => self.inject_return(&mut inner, value),
            Completion::Throw(error) => {
                let outcome = inner.frame.resume(Completion::Throw(error));
                self.handle_outcome(&mut inner, outcome)
            }
        }
    }

    /// Apply a return completion to the outer frame: complete directly,
    /// or resume just long enough to run an enclosing cleanup region.
    fn inject_return(
        &self,
        inner: &mut GeneratorInner,
        value: Value,
    ) -> VmResult<IteratorResult> {
        if inner.frame.has_cleanup() {
            let outcome = inner.frame.resume(Completion::Return(value));
            self.handle_outcome(inner, outcome)
        } else {
            self.set_state(GeneratorState::Completed);
            Ok(IteratorResult::done(value))
        }
    }

    fn handle_outcome(
        &self,
        inner: &mut GeneratorInner,
        mut outcome: FrameOutcome,
    ) -> VmResult<IteratorResult> {
        loop {
            match outcome {
                FrameOutcome::Yield(value) => {
                    self.set_state(GeneratorState::SuspendedYield);
                    return Ok(IteratorResult::yielded(value));
                }
                FrameOutcome::Return(value) => {
                    self.set_state(GeneratorState::Completed);
                    return Ok(IteratorResult::done(value));
                }
                FrameOutcome::Throw(error) => {
                    self.set_state(GeneratorState::Completed);
                    return Err(error);
                }
                FrameOutcome::Await(_) => {
                    self.set_state(GeneratorState::Completed);
                    return Err(VmError::internal(
                        "await is only legal in async generator frames",
                    ));
                }
                FrameOutcome::Delegate(source) => {
                    let target = match IterTarget::from_value(&source) {
                        Ok(target) => target,
                        Err(error) => {
                            outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                            continue;
                        }
                    };
                    match target.next(Value::undefined()) {
                        Ok(result) if result.done => {
                            outcome = inner.frame.resume(Completion::Next(result.value));
                        }
                        Ok(result) => {
                            inner.delegate = Some(target);
                            self.set_state(GeneratorState::SuspendedYield);
                            return Ok(result);
                        }
                        Err(error) => {
                            outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                        }
                    }
                }
            }
        }
    }

    fn run_delegated(
        &self,
        inner: &mut GeneratorInner,
        completion: Completion,
    ) -> VmResult<IteratorResult> {
        let target = match &inner.delegate {
            Some(target) => target.clone(),
            None => return Err(VmError::internal("delegation target missing")),
        };

        match completion {
            Completion::Next(value) => match target.next(value) {
                Ok(result) if result.done => {
                    // Delegation finished; its final value becomes the
                    // value of the yield* expression.
                    inner.delegate = None;
                    let outcome = inner.frame.resume(Completion::Next(result.value));
                    self.handle_outcome(inner, outcome)
                }
                Ok(result) => {
                    self.set_state(GeneratorState::SuspendedYield);
                    Ok(result)
                }
                Err(error) => {
                    inner.delegate = None;
                    let outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                    self.handle_outcome(inner, outcome)
                }
            },
            Completion::Return(value) => match target.lookup_return() {
                MethodLookup::Absent => {
                    // No inner cleanup method: close without touching the
                    // inner iterator.
                    inner.delegate = None;
                    self.inject_return(inner, value)
                }
                MethodLookup::NotCallable => {
                    inner.delegate = None;
                    let error = VmError::type_error("iterator 'return' method is not callable");
                    let outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                    self.handle_outcome(inner, outcome)
                }
                MethodLookup::Callable => match target.call_return(value) {
                    Ok(result) if result.done => {
                        inner.delegate = None;
                        self.inject_return(inner, result.value)
                    }
                    Ok(result) => {
                        // The inner iterator yielded from its cleanup;
                        // stay delegated.
                        self.set_state(GeneratorState::SuspendedYield);
                        Ok(result)
                    }
                    Err(error) => {
                        inner.delegate = None;
                        let outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                        self.handle_outcome(inner, outcome)
                    }
                },
            },
            Completion::Throw(error) => match target.lookup_throw() {
                MethodLookup::Callable => match target.call_throw(error) {
                    Ok(result) if result.done => {
                        inner.delegate = None;
                        let outcome = inner.frame.resume(Completion::Next(result.value));
                        self.handle_outcome(inner, outcome)
                    }
                    Ok(result) => {
                        self.set_state(GeneratorState::SuspendedYield);
                        Ok(result)
                    }
                    Err(inner_error) => {
                        inner.delegate = None;
                        let outcome =
                            inner.frame.resume(Completion::Throw(inner_error.to_value()));
                        self.handle_outcome(inner, outcome)
                    }
                },
                MethodLookup::Absent => {
                    // Close the inner iterator, then raise at the
                    // delegation point without resuming it with a throw.
                    if target.lookup_return() == MethodLookup::Callable {
                        let _ = target.call_return(Value::undefined());
                    }
                    inner.delegate = None;
                    let error = VmError::type_error("iterator does not provide a 'throw' method");
                    let outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                    self.handle_outcome(inner, outcome)
                }
                MethodLookup::NotCallable => {
                    inner.delegate = None;
                    let error = VmError::type_error("iterator 'throw' method is not callable");
                    let outcome = inner.frame.resume(Completion::Throw(error.to_value()));
                    self.handle_outcome(inner, outcome)
                }
            },
        }
    }
}

/// Rust iterator over a generator's yielded values
pub struct GeneratorIter {
    generator: Arc<JsGenerator>,
}

impl Iterator for GeneratorIter {
    type Item = VmResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.generator.is_completed() {
            return None;
        }
        match self.generator.next(Value::undefined()) {
            Ok(result) if result.done => None,
            Ok(result) => Some(Ok(result.value)),
            Err(error) => Some(Err(error)),
        }
    }
}

/// Build a frame yielding the elements of a fixed sequence
pub(crate) fn sequence_frame(values: Vec<Value>) -> Box<dyn GeneratorFrame> {
    Box::new(SequenceFrame {
        values: values.into_iter(),
    })
}

/// Build a frame driven by a produce-next-result closure
pub(crate) fn closure_frame<F>(produce: F) -> Box<dyn GeneratorFrame>
where
    F: FnMut(Value) -> VmResult<IteratorResult> + Send + 'static,
{
    Box::new(ClosureFrame { produce })
}

/// Frame yielding the elements of a fixed sequence
struct SequenceFrame {
    values: std::vec::IntoIter<Value>,
}

impl GeneratorFrame for SequenceFrame {
    fn resume(&mut self, input: Completion) -> FrameOutcome {
        match input {
            Completion::Next(_) => match self.values.next() {
                Some(value) => FrameOutcome::Yield(value),
                None => FrameOutcome::Return(Value::undefined()),
            },
            Completion::Return(value) => FrameOutcome::Return(value),
            Completion::Throw(error) => FrameOutcome::Throw(VmError::exception(error)),
        }
    }
}

/// Frame driven by a produce-next-result closure
struct ClosureFrame<F> {
    produce: F,
}

impl<F> GeneratorFrame for ClosureFrame<F>
where
    F: FnMut(Value) -> VmResult<IteratorResult> + Send,
{
    fn resume(&mut self, input: Completion) -> FrameOutcome {
        match input {
            Completion::Next(value) => match (self.produce)(value) {
                Ok(result) if result.done => FrameOutcome::Return(result.value),
                Ok(result) => FrameOutcome::Yield(result.value),
                Err(error) => FrameOutcome::Throw(error),
            },
            Completion::Return(value) => FrameOutcome::Return(value),
            Completion::Throw(error) => FrameOutcome::Throw(VmError::exception(error)),
        }
    }
}

//! Promise engine
//!
//! Implements the settlement state machine, the resolution procedure
//! (self-resolution guard, thenable assimilation), and reaction
//! scheduling. Handlers never run synchronously inside the call that
//! attached them or inside `resolve`/`reject`; settlement converts
//! reactions into queued jobs, and reactions attached to an
//! already-settled promise are enqueued immediately.
//!
//! ## Rust API
//!
//! Create promises from embedding code using `with_resolvers()`:
//!
//! ```ignore
//! let capability = JsPromise::with_resolvers(scheduler);
//! // Later, settle the promise
//! (capability.resolve)(Value::number(42.0));
//! // Hand the promise to consuming code
//! Value::promise(capability.promise)
//! ```

use crate::error::{VmError, VmResult};
use crate::job::{Job, JobScheduler};
use crate::value::Value;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Promise state
#[derive(Debug, Clone)]
pub enum PromiseState {
    /// Not yet settled
    Pending,
    /// Resolving a thenable (still pending; further resolves are no-ops)
    PendingThenable(Value),
    /// Fulfilled with a value
    Fulfilled(Value),
    /// Rejected with a reason
    Rejected(Value),
}

impl PromiseState {
    /// Check if settled (fulfilled or rejected)
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            PromiseState::Pending | PromiseState::PendingThenable(_)
        )
    }
}

/// A fulfillment or rejection handler.
///
/// The handler's return value resolves the derived promise; an `Err`
/// rejects it with the error's script value.
pub type ReactionHandler = Box<dyn FnOnce(Value) -> VmResult<Value> + Send>;

/// A resolve or reject capability
pub type ResolveFn = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone, Copy)]
enum ReactionKind {
    Fulfill,
    Reject,
}

/// A registered reaction: handler plus the derived promise its result
/// settles. Absent handlers pass the settlement through.
struct Reaction {
    kind: ReactionKind,
    handler: Option<ReactionHandler>,
    derived: Option<Arc<JsPromise>>,
}

type ReactionList = SmallVec<[Reaction; 2]>;

/// A promise
pub struct JsPromise {
    state: Mutex<PromiseState>,
    fulfill_reactions: Mutex<ReactionList>,
    reject_reactions: Mutex<ReactionList>,
    jobs: Arc<dyn JobScheduler>,
}

impl std::fmt::Debug for JsPromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        match &*state {
            PromiseState::Pending | PromiseState::PendingThenable(_) => {
                write!(f, "Promise {{ <pending> }}")
            }
            PromiseState::Fulfilled(v) => write!(f, "Promise {{ <fulfilled>: {:?} }}", v),
            PromiseState::Rejected(v) => write!(f, "Promise {{ <rejected>: {:?} }}", v),
        }
    }
}

/// Result of [`JsPromise::with_resolvers`]: a promise along with its
/// resolve and reject capabilities for manual control.
pub struct PromiseWithResolvers {
    /// The promise
    pub promise: Arc<JsPromise>,
    /// Function to resolve the promise
    pub resolve: ResolveFn,
    /// Function to reject the promise
    pub reject: ResolveFn,
}

impl JsPromise {
    /// Create a new pending promise bound to a job scheduler
    pub fn pending(jobs: Arc<dyn JobScheduler>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PromiseState::Pending),
            fulfill_reactions: Mutex::new(SmallVec::new()),
            reject_reactions: Mutex::new(SmallVec::new()),
            jobs,
        })
    }

    /// Create a promise from an executor, invoked synchronously with the
    /// resolve/reject capabilities. A throwing executor rejects the
    /// promise (unless a capability already fired).
    pub fn new<F>(jobs: Arc<dyn JobScheduler>, executor: F) -> Arc<Self>
    where
        F: FnOnce(ResolveFn, ResolveFn) -> VmResult<()>,
    {
        let promise = JsPromise::pending(jobs);
        let (resolve, reject) = promise.resolving_functions();
        if let Err(error) = executor(resolve, reject.clone()) {
            reject(error.to_value());
        }
        promise
    }

    /// Create a promise with resolve/reject capabilities
    pub fn with_resolvers(jobs: Arc<dyn JobScheduler>) -> PromiseWithResolvers {
        let promise = JsPromise::pending(jobs);
        let (resolve, reject) = promise.resolving_functions();
        PromiseWithResolvers {
            promise,
            resolve,
            reject,
        }
    }

    /// Resolve a value to a promise: an engine promise is returned as
    /// is, anything else seeds a fresh promise through the resolution
    /// procedure.
    pub fn resolve_value(jobs: &Arc<dyn JobScheduler>, value: Value) -> Arc<Self> {
        if let Value::Promise(promise) = &value {
            return promise.clone();
        }
        let promise = JsPromise::pending(jobs.clone());
        promise.resolve(value);
        promise
    }

    /// Create a promise rejected with the given reason
    pub fn reject_value(jobs: &Arc<dyn JobScheduler>, reason: Value) -> Arc<Self> {
        let promise = JsPromise::pending(jobs.clone());
        promise.reject(reason);
        promise
    }

    /// Call `f` synchronously and funnel its return value or thrown
    /// error into a fresh promise's settlement.
    pub fn try_<F>(jobs: &Arc<dyn JobScheduler>, f: F) -> Arc<Self>
    where
        F: FnOnce() -> VmResult<Value>,
    {
        let promise = JsPromise::pending(jobs.clone());
        match f() {
            Ok(value) => promise.resolve(value),
            Err(error) => promise.reject(error.to_value()),
        }
        promise
    }

    /// The scheduler this promise delivers its reactions through
    pub fn scheduler(&self) -> Arc<dyn JobScheduler> {
        self.jobs.clone()
    }

    /// Get current state
    pub fn state(&self) -> PromiseState {
        self.state.lock().clone()
    }

    /// Check if promise is pending
    pub fn is_pending(&self) -> bool {
        !self.state.lock().is_settled()
    }

    /// Check if promise is fulfilled
    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.state.lock(), PromiseState::Fulfilled(_))
    }

    /// Check if promise is rejected
    pub fn is_rejected(&self) -> bool {
        matches!(*self.state.lock(), PromiseState::Rejected(_))
    }

    /// Check if promise is settled
    pub fn is_settled(&self) -> bool {
        self.state.lock().is_settled()
    }

    /// The settled value or rejection reason, if settled
    pub fn result(&self) -> Option<Value> {
        match &*self.state.lock() {
            PromiseState::Fulfilled(v) | PromiseState::Rejected(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Build a guarded resolve/reject capability pair. The shared
    /// `alreadyResolved` guard makes whichever fires second a no-op.
    pub fn resolving_functions(self: &Arc<Self>) -> (ResolveFn, ResolveFn) {
        let already_resolved = Arc::new(AtomicBool::new(false));

        let resolve = {
            let promise = self.clone();
            let already_resolved = already_resolved.clone();
            Arc::new(move |value: Value| {
                if !already_resolved.swap(true, Ordering::AcqRel) {
                    promise.resolve(value);
                }
            }) as ResolveFn
        };

        let reject = {
            let promise = self.clone();
            Arc::new(move |reason: Value| {
                if !already_resolved.swap(true, Ordering::AcqRel) {
                    promise.reject(reason);
                }
            }) as ResolveFn
        };

        (resolve, reject)
    }

    /// Resolve the promise through the resolution procedure.
    ///
    /// No-op once the promise has left `Pending`.
    pub fn resolve(self: &Arc<Self>, value: Value) {
        self.resolve_with(value, false);
    }

    /// Reject the promise with a reason.
    ///
    /// No-op once the promise has left `Pending`.
    pub fn reject(self: &Arc<Self>, reason: Value) {
        self.reject_with(reason, false);
    }

    fn resolve_with(self: &Arc<Self>, value: Value, from_thenable: bool) {
        let mut state = self.state.lock();
        match &*state {
            PromiseState::Pending => {}
            PromiseState::PendingThenable(_) if from_thenable => {}
            _ => return,
        }

        // Self-resolution is a chaining cycle
        if let Value::Promise(inner) = &value
            && Arc::ptr_eq(inner, self)
        {
            drop(state);
            let error = VmError::type_error("promise cannot resolve itself");
            self.reject_with(error.to_value(), from_thenable);
            return;
        }

        // Thenable assimilation: a callable `then` defers settlement to
        // the thenable, through a queued job.
        let then_action = match &value {
            Value::Promise(_) => Some(None),
            Value::Object(object) => match object.get("then") {
                Some(then) if then.is_callable() => Some(Some(then)),
                _ => None,
            },
            _ => None,
        };

        if let Some(then) = then_action {
            *state = PromiseState::PendingThenable(value.clone());
            drop(state);
            let target = self.clone();
            self.jobs.enqueue(Box::new(move || {
                target.run_thenable_job(value, then);
                Ok(())
            }));
            return;
        }

        *state = PromiseState::Fulfilled(value.clone());
        drop(state);

        let reactions = std::mem::take(&mut *self.fulfill_reactions.lock());
        self.reject_reactions.lock().clear();
        for reaction in reactions {
            self.jobs.enqueue(reaction_job(reaction, value.clone()));
        }
    }

    fn reject_with(self: &Arc<Self>, reason: Value, from_thenable: bool) {
        let mut state = self.state.lock();
        match &*state {
            PromiseState::Pending => {}
            PromiseState::PendingThenable(_) if from_thenable => {}
            _ => return,
        }

        *state = PromiseState::Rejected(reason.clone());
        drop(state);

        let reactions = std::mem::take(&mut *self.reject_reactions.lock());
        self.fulfill_reactions.lock().clear();
        for reaction in reactions {
            self.jobs.enqueue(reaction_job(reaction, reason.clone()));
        }
    }

    /// The queued half of thenable assimilation: adopt an engine
    /// promise's settlement, or call a script thenable's `then` with a
    /// guarded capability pair.
    fn run_thenable_job(self: &Arc<Self>, thenable: Value, then: Option<Value>) {
        match then {
            None => {
                let Some(inner) = thenable.as_promise().cloned() else {
                    return;
                };
                let target = self.clone();
                let target_reject = self.clone();
                inner.on_settled(
                    move |value| target.resolve_with(value, true),
                    move |reason| target_reject.reject_with(reason, true),
                );
            }
            Some(then_fn) => {
                let called = Arc::new(AtomicBool::new(false));

                let resolve_capability = {
                    let target = self.clone();
                    let called = called.clone();
                    Value::function(move |_this, args| {
                        if !called.swap(true, Ordering::AcqRel) {
                            let value = args.first().cloned().unwrap_or(Value::Undefined);
                            target.resolve_with(value, true);
                        }
                        Ok(Value::Undefined)
                    })
                };
                let reject_capability = {
                    let target = self.clone();
                    let called = called.clone();
                    Value::function(move |_this, args| {
                        if !called.swap(true, Ordering::AcqRel) {
                            let reason = args.first().cloned().unwrap_or(Value::Undefined);
                            target.reject_with(reason, true);
                        }
                        Ok(Value::Undefined)
                    })
                };

                if let Err(error) =
                    then_fn.call(&thenable, &[resolve_capability, reject_capability])
                    && !called.swap(true, Ordering::AcqRel)
                {
                    self.reject_with(error.to_value(), true);
                }
            }
        }
    }

    /// Register handlers and return the derived promise they settle.
    ///
    /// Either handler may be absent, in which case the settlement passes
    /// through to the derived promise unchanged.
    pub fn then(
        self: &Arc<Self>,
        on_fulfilled: Option<ReactionHandler>,
        on_rejected: Option<ReactionHandler>,
    ) -> Arc<JsPromise> {
        let derived = JsPromise::pending(self.jobs.clone());
        self.register(
            Reaction {
                kind: ReactionKind::Fulfill,
                handler: on_fulfilled,
                derived: Some(derived.clone()),
            },
            Reaction {
                kind: ReactionKind::Reject,
                handler: on_rejected,
                derived: Some(derived.clone()),
            },
        );
        derived
    }

    /// Register a fulfillment handler
    pub fn then_fulfilled<F>(self: &Arc<Self>, on_fulfilled: F) -> Arc<JsPromise>
    where
        F: FnOnce(Value) -> VmResult<Value> + Send + 'static,
    {
        self.then(Some(Box::new(on_fulfilled)), None)
    }

    /// Register a rejection handler
    pub fn catch<F>(self: &Arc<Self>, on_rejected: F) -> Arc<JsPromise>
    where
        F: FnOnce(Value) -> VmResult<Value> + Send + 'static,
    {
        self.then(None, Some(Box::new(on_rejected)))
    }

    /// Register a callback for either settlement.
    ///
    /// The settlement passes through unchanged; a throwing callback
    /// rejects the derived promise instead.
    pub fn finally<F>(self: &Arc<Self>, on_finally: F) -> Arc<JsPromise>
    where
        F: FnOnce() -> VmResult<()> + Send + 'static,
    {
        let callback = Arc::new(Mutex::new(Some(on_finally)));
        let callback_reject = callback.clone();
        self.then(
            Some(Box::new(move |value| {
                if let Some(f) = callback.lock().take() {
                    f()?;
                }
                Ok(value)
            })),
            Some(Box::new(move |reason| {
                if let Some(f) = callback_reject.lock().take() {
                    f()?;
                }
                Err(VmError::exception(reason))
            })),
        )
    }

    /// Register engine-internal settlement callbacks (no derived
    /// promise). Delivery still goes through the job queue.
    pub fn on_settled<F, R>(self: &Arc<Self>, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(Value) + Send + 'static,
        R: FnOnce(Value) + Send + 'static,
    {
        self.register(
            Reaction {
                kind: ReactionKind::Fulfill,
                handler: Some(Box::new(move |value| {
                    on_fulfilled(value);
                    Ok(Value::Undefined)
                })),
                derived: None,
            },
            Reaction {
                kind: ReactionKind::Reject,
                handler: Some(Box::new(move |reason| {
                    on_rejected(reason);
                    Ok(Value::Undefined)
                })),
                derived: None,
            },
        );
    }

    fn register(self: &Arc<Self>, fulfill: Reaction, reject: Reaction) {
        let state = self.state.lock().clone();
        match state {
            PromiseState::Pending | PromiseState::PendingThenable(_) => {
                self.fulfill_reactions.lock().push(fulfill);
                self.reject_reactions.lock().push(reject);
            }
            PromiseState::Fulfilled(value) => {
                self.jobs.enqueue(reaction_job(fulfill, value));
            }
            PromiseState::Rejected(reason) => {
                self.jobs.enqueue(reaction_job(reject, reason));
            }
        }
    }
}

/// Package a reaction into a queued job.
///
/// Handler throws become derived-promise rejections; with no derived
/// promise the error escapes to the drain loop's unhandled hook.
fn reaction_job(reaction: Reaction, value: Value) -> Job {
    Box::new(move || {
        let Reaction {
            kind,
            handler,
            derived,
        } = reaction;
        match handler {
            Some(handler) => match handler(value) {
                Ok(out) => {
                    if let Some(derived) = derived {
                        derived.resolve(out);
                    }
                    Ok(())
                }
                Err(error) => match derived {
                    Some(derived) => {
                        derived.reject(error.to_value());
                        Ok(())
                    }
                    None => Err(error),
                },
            },
            None => {
                if let Some(derived) = derived {
                    match kind {
                        ReactionKind::Fulfill => derived.resolve(value),
                        ReactionKind::Reject => derived.reject(value),
                    }
                }
                Ok(())
            }
        }
    })
}

//! # Marten VM Core
//!
//! The asynchronous-control-flow core of the Marten engine: generators,
//! async generators, and promises, together with the job-scheduling
//! seam the host's drain loop implements.
//!
//! ## Design Principles
//!
//! - **No host coroutines**: generator bodies are explicit resumable
//!   frames re-entered at their saved suspension points
//! - **Single-threaded cooperative**: concurrency is simulated entirely
//!   through suspension points and the job queue
//! - **Jobs, never sync callbacks**: promise reactions and
//!   async-generator completions are always delivered as queued jobs

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod async_generator;
pub mod combinators;
pub mod error;
pub mod generator;
pub mod iterator;
pub mod job;
pub mod object;
pub mod promise;
pub mod string;
pub mod value;

pub use async_generator::{AsyncGeneratorState, IterationDecision, JsAsyncGenerator, for_each};
pub use error::{ThrownValue, VmError, VmResult};
pub use generator::{
    Completion, FrameOutcome, GeneratorFrame, GeneratorIter, GeneratorState, JsGenerator,
};
pub use iterator::{IterTarget, IteratorResult, MethodLookup};
pub use job::{Job, JobScheduler};
pub use object::{JsArray, JsObject};
pub use promise::{JsPromise, PromiseState, PromiseWithResolvers, ReactionHandler, ResolveFn};
pub use string::JsString;
pub use value::{NativeFn, Value};

//! Promise combinators
//!
//! All combinators consume their input iterable synchronously and
//! coerce non-promise elements through the resolution procedure, so an
//! input of plain values behaves like an input of already-fulfilled
//! promises.

use crate::job::JobScheduler;
use crate::object::JsObject;
use crate::promise::JsPromise;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Build the aggregate error record `any` rejects with when every input
/// rejects. The `errors` array preserves input order.
pub fn aggregate_error(reasons: Vec<Value>) -> Value {
    Value::object(JsObject::with_properties([
        ("name", Value::string("AggregateError")),
        ("message", Value::string("All promises were rejected")),
        ("errors", Value::array(reasons)),
    ]))
}

/// Fulfill with an order-preserving array once every input fulfills;
/// reject with the first observed rejection reason.
pub fn all<I>(jobs: &Arc<dyn JobScheduler>, values: I) -> Arc<JsPromise>
where
    I: IntoIterator<Item = Value>,
{
    let items: Vec<Value> = values.into_iter().collect();
    let result = JsPromise::pending(jobs.clone());

    if items.is_empty() {
        result.resolve(Value::array(Vec::new()));
        return result;
    }

    let count = items.len();
    let remaining = Arc::new(AtomicUsize::new(count));
    let slots: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(vec![None; count]));
    let rejected = Arc::new(AtomicBool::new(false));

    for (index, item) in items.into_iter().enumerate() {
        let source = JsPromise::resolve_value(jobs, item);
        let result_fulfill = result.clone();
        let result_reject = result.clone();
        let remaining = remaining.clone();
        let slots = slots.clone();
        let rejected_check = rejected.clone();
        let rejected_latch = rejected.clone();

        source.on_settled(
            move |value| {
                if rejected_check.load(Ordering::Acquire) {
                    return;
                }
                slots.lock()[index] = Some(value);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values = slots
                        .lock()
                        .iter()
                        .map(|slot| slot.clone().unwrap_or(Value::Undefined))
                        .collect();
                    result_fulfill.resolve(Value::array(values));
                }
            },
            move |reason| {
                if !rejected_latch.swap(true, Ordering::AcqRel) {
                    result_reject.reject(reason);
                }
            },
        );
    }

    result
}

/// Settle with whichever input settles first. An empty input never
/// settles.
pub fn race<I>(jobs: &Arc<dyn JobScheduler>, values: I) -> Arc<JsPromise>
where
    I: IntoIterator<Item = Value>,
{
    let result = JsPromise::pending(jobs.clone());

    for item in values {
        let source = JsPromise::resolve_value(jobs, item);
        let result_fulfill = result.clone();
        let result_reject = result.clone();
        source.on_settled(
            move |value| result_fulfill.resolve(value),
            move |reason| result_reject.reject(reason),
        );
    }

    result
}

/// Fulfill with status descriptors once every input settles; never
/// rejects.
pub fn all_settled<I>(jobs: &Arc<dyn JobScheduler>, values: I) -> Arc<JsPromise>
where
    I: IntoIterator<Item = Value>,
{
    let items: Vec<Value> = values.into_iter().collect();
    let result = JsPromise::pending(jobs.clone());

    if items.is_empty() {
        result.resolve(Value::array(Vec::new()));
        return result;
    }

    let count = items.len();
    let remaining = Arc::new(AtomicUsize::new(count));
    let slots: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(vec![None; count]));

    for (index, item) in items.into_iter().enumerate() {
        let source = JsPromise::resolve_value(jobs, item);

        let settle = {
            let result = result.clone();
            let remaining = remaining.clone();
            let slots = slots.clone();
            move |descriptor: Value| {
                slots.lock()[index] = Some(descriptor);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let values = slots
                        .lock()
                        .iter()
                        .map(|slot| slot.clone().unwrap_or(Value::Undefined))
                        .collect();
                    result.resolve(Value::array(values));
                }
            }
        };
        let settle_rejected = settle.clone();

        source.on_settled(
            move |value| {
                settle(Value::object(JsObject::with_properties([
                    ("status", Value::string("fulfilled")),
                    ("value", value),
                ])))
            },
            move |reason| {
                settle_rejected(Value::object(JsObject::with_properties([
                    ("status", Value::string("rejected")),
                    ("reason", reason),
                ])))
            },
        );
    }

    result
}

/// Fulfill with the first fulfillment; if every input rejects, reject
/// with an aggregate error preserving input order.
pub fn any<I>(jobs: &Arc<dyn JobScheduler>, values: I) -> Arc<JsPromise>
where
    I: IntoIterator<Item = Value>,
{
    let items: Vec<Value> = values.into_iter().collect();
    let result = JsPromise::pending(jobs.clone());

    if items.is_empty() {
        result.reject(aggregate_error(Vec::new()));
        return result;
    }

    let count = items.len();
    let remaining = Arc::new(AtomicUsize::new(count));
    let reasons: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(vec![None; count]));

    for (index, item) in items.into_iter().enumerate() {
        let source = JsPromise::resolve_value(jobs, item);
        let result_fulfill = result.clone();
        let result_reject = result.clone();
        let remaining = remaining.clone();
        let reasons = reasons.clone();

        source.on_settled(
            move |value| result_fulfill.resolve(value),
            move |reason| {
                reasons.lock()[index] = Some(reason);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let collected = reasons
                        .lock()
                        .iter()
                        .map(|slot| slot.clone().unwrap_or(Value::Undefined))
                        .collect();
                    result_reject.reject(aggregate_error(collected));
                }
            },
        );
    }

    result
}

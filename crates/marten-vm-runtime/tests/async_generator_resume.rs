//! Async generator resumption and request-queue ordering.

use marten_vm_runtime::Marten;
use marten_vm_runtime::core::async_generator::IterationDecision;
use marten_vm_runtime::core::error::VmError;
use marten_vm_runtime::core::generator::{Completion, FrameOutcome, GeneratorFrame};
use marten_vm_runtime::core::iterator::IteratorResult;
use marten_vm_runtime::core::promise::JsPromise;
use marten_vm_runtime::core::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn record_of(promise: &Arc<JsPromise>) -> IteratorResult {
    IteratorResult::from_record(&promise.result().expect("promise not settled")).unwrap()
}

/// Frame equivalent to
/// `async function* () { const a = await p; log; yield a + 1;
///  const b = await 10; log; return b + 2; }`
struct AwaitingFrame {
    stage: u8,
    awaited: Value,
    log: Log,
}

impl GeneratorFrame for AwaitingFrame {
    fn resume(&mut self, input: Completion) -> FrameOutcome {
        match (self.stage, input) {
            (0, Completion::Next(_)) => {
                self.stage = 1;
                FrameOutcome::Await(self.awaited.clone())
            }
            (1, Completion::Next(a)) => {
                self.stage = 2;
                self.log.lock().push("after-await-1".into());
                FrameOutcome::Yield(Value::number(a.as_number().unwrap() + 1.0))
            }
            (2, Completion::Next(_)) => {
                self.stage = 3;
                FrameOutcome::Await(Value::number(10.0))
            }
            (3, Completion::Next(b)) => {
                self.log.lock().push("after-await-2".into());
                FrameOutcome::Return(Value::number(b.as_number().unwrap() + 2.0))
            }
            (_, Completion::Return(value)) => FrameOutcome::Return(value),
            (_, Completion::Throw(error)) => FrameOutcome::Throw(VmError::exception(error)),
            _ => FrameOutcome::Throw(VmError::internal("unexpected resumption")),
        }
    }
}

/// Frame equivalent to
/// `async function* () { try { await rejected; yield "unreachable"; }
///  catch (e) { yield "caught:" + e; } return 2; }`
struct CatchingFrame {
    stage: u8,
    awaited: Value,
}

impl GeneratorFrame for CatchingFrame {
    fn resume(&mut self, input: Completion) -> FrameOutcome {
        match (self.stage, input) {
            (0, Completion::Next(_)) => {
                self.stage = 1;
                FrameOutcome::Await(self.awaited.clone())
            }
            (1, Completion::Next(_)) => {
                self.stage = 2;
                FrameOutcome::Yield(Value::string("unreachable"))
            }
            (1, Completion::Throw(error)) => {
                self.stage = 2;
                let caught = format!(
                    "caught:{}",
                    error.as_string().map(|s| s.as_str()).unwrap_or("?")
                );
                FrameOutcome::Yield(Value::string(&caught))
            }
            (2, Completion::Next(_)) => FrameOutcome::Return(Value::number(2.0)),
            (_, Completion::Return(value)) => FrameOutcome::Return(value),
            (_, Completion::Throw(error)) => FrameOutcome::Throw(VmError::exception(error)),
            _ => FrameOutcome::Throw(VmError::internal("unexpected resumption")),
        }
    }
}

#[test]
fn async_generator_resumes_after_await_fulfillment() {
    let marten = Marten::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let generator = marten.async_generator(Box::new(AwaitingFrame {
        stage: 0,
        awaited: Value::promise(marten.resolved(Value::number(7.0))),
        log: log.clone(),
    }));

    let gen_next = generator.clone();
    let log_first = log.clone();
    let log_second = log.clone();
    generator
        .next(Value::undefined())
        .then_fulfilled(move |record| {
            let result = IteratorResult::from_record(&record)?;
            log_first.lock().push(format!(
                "first:{}:{}",
                result.value.as_number().unwrap(),
                result.done
            ));
            Ok(Value::promise(gen_next.next(Value::undefined())))
        })
        .then_fulfilled(move |record| {
            let result = IteratorResult::from_record(&record)?;
            log_second.lock().push(format!(
                "second:{}:{}",
                result.value.as_number().unwrap(),
                result.done
            ));
            Ok(Value::undefined())
        });

    marten.run_until_idle();
    let got = log.lock().join("|");
    assert_eq!(
        got,
        "after-await-1|first:8:false|after-await-2|second:12:true"
    );
}

#[test]
fn async_generator_resumes_after_await_rejection() {
    let marten = Marten::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let generator = marten.async_generator(Box::new(CatchingFrame {
        stage: 0,
        awaited: Value::promise(marten.rejected(Value::string("boom"))),
    }));

    let gen_next = generator.clone();
    let log_first = log.clone();
    let log_second = log.clone();
    generator
        .next(Value::undefined())
        .then_fulfilled(move |record| {
            let result = IteratorResult::from_record(&record)?;
            log_first.lock().push(format!(
                "first:{}:{}",
                result.value.as_string().unwrap(),
                result.done
            ));
            Ok(Value::promise(gen_next.next(Value::undefined())))
        })
        .then_fulfilled(move |record| {
            let result = IteratorResult::from_record(&record)?;
            log_second.lock().push(format!(
                "second:{}:{}",
                result.value.as_number().unwrap(),
                result.done
            ));
            Ok(Value::undefined())
        });

    marten.run_until_idle();
    let got = log.lock().join("|");
    assert_eq!(got, "first:caught:boom:false|second:2:true");
}

#[test]
fn next_then_immediate_return_is_served_in_submission_order() {
    let marten = Marten::new();
    let generator = marten.async_generator_from_sequence(vec![
        Value::number(1.0),
        Value::number(2.0),
        Value::number(3.0),
    ]);

    // No awaiting between the calls: the first request still settles
    // with the pending pair, the second with the return value.
    let first = generator.next(Value::undefined());
    let second = generator.return_(Value::number(9.0));
    marten.run_until_idle();

    let first = record_of(&first);
    assert!(!first.done);
    assert_eq!(first.value.as_number(), Some(1.0));

    let second = record_of(&second);
    assert!(second.done);
    assert_eq!(second.value.as_number(), Some(9.0));

    let after = generator.next(Value::undefined());
    marten.run_until_idle();
    let after = record_of(&after);
    assert!(after.done);
    assert!(after.value.is_undefined());
}

#[test]
fn requests_queued_while_awaiting_are_not_reordered() {
    let marten = Marten::new();
    let gate = marten.promise();

    let generator = marten.async_generator(Box::new(AwaitingFrame {
        stage: 0,
        awaited: Value::promise(gate.promise.clone()),
        log: Arc::new(Mutex::new(Vec::new())),
    }));

    let first = generator.next(Value::undefined());
    let second = generator.return_(Value::number(9.0));
    marten.run_until_idle();

    // The first request is parked on the await; the second waits its
    // turn behind it.
    assert!(first.is_pending());
    assert!(second.is_pending());
    assert_eq!(generator.pending_requests(), 1);

    (gate.resolve)(Value::number(7.0));
    marten.run_until_idle();

    let first = record_of(&first);
    assert!(!first.done);
    assert_eq!(first.value.as_number(), Some(8.0));

    let second = record_of(&second);
    assert!(second.done);
    assert_eq!(second.value.as_number(), Some(9.0));
}

#[test]
fn round_trip_await_loop_and_manual_drive_agree() {
    let marten = Marten::new();
    let sequence = vec![Value::number(1.0), Value::number(2.0), Value::number(3.0)];

    // Await-based loop.
    let generator = marten.async_generator_from_sequence(sequence.clone());
    let sum = Arc::new(Mutex::new(0.0));
    let observed = sum.clone();
    let finished = marten.for_each(&generator, move |value| {
        *observed.lock() += value.as_number().unwrap();
        Ok(IterationDecision::Continue)
    });
    marten.run_until_idle();
    assert!(finished.is_fulfilled());
    assert_eq!(*sum.lock(), 6.0);

    // Manual drive: three next calls plus one exhausting call produce
    // the identical value/done sequence.
    let generator = marten.async_generator_from_sequence(sequence);
    let promises: Vec<_> = (0..4).map(|_| generator.next(Value::undefined())).collect();
    marten.run_until_idle();

    let results: Vec<IteratorResult> = promises.iter().map(record_of).collect();
    assert_eq!(results[0].value.as_number(), Some(1.0));
    assert!(!results[0].done);
    assert_eq!(results[1].value.as_number(), Some(2.0));
    assert!(!results[1].done);
    assert_eq!(results[2].value.as_number(), Some(3.0));
    assert!(!results[2].done);
    assert!(results[3].done);
    assert!(results[3].value.is_undefined());
}

#[test]
fn for_each_break_closes_the_generator() {
    let marten = Marten::new();
    let generator = marten.async_generator_from_sequence(vec![
        Value::number(1.0),
        Value::number(2.0),
        Value::number(3.0),
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();
    let finished = marten.for_each(&generator, move |value| {
        observed.lock().push(value.as_number().unwrap());
        Ok(IterationDecision::Break)
    });
    marten.run_until_idle();

    assert!(finished.is_fulfilled());
    assert_eq!(&*seen.lock(), &[1.0]);
    assert!(generator.is_completed());
}

#[test]
fn for_each_callback_error_closes_and_rejects() {
    let marten = Marten::new();
    let generator =
        marten.async_generator_from_sequence(vec![Value::number(1.0), Value::number(2.0)]);

    let finished = marten.for_each(&generator, move |_value| {
        Err(VmError::type_error("consumer failed"))
    });
    marten.run_until_idle();

    assert!(finished.is_rejected());
    assert!(generator.is_completed());
}

#[test]
fn throw_request_rejects_its_result_promise() {
    let marten = Marten::new();
    let generator =
        marten.async_generator_from_sequence(vec![Value::number(1.0), Value::number(2.0)]);

    let first = generator.next(Value::undefined());
    let thrown = generator.throw(Value::string("stop"));
    marten.run_until_idle();

    assert!(!record_of(&first).done);
    assert!(thrown.is_rejected());
    assert_eq!(thrown.result(), Some(Value::string("stop")));
    assert!(generator.is_completed());
}

#[test]
fn completed_generator_keeps_answering() {
    let marten = Marten::new();
    let generator = marten.async_generator_from_sequence(vec![Value::number(1.0)]);

    let drained: Vec<_> = (0..2).map(|_| generator.next(Value::undefined())).collect();
    marten.run_until_idle();
    assert!(record_of(&drained[1]).done);

    let next_after = generator.next(Value::undefined());
    let return_after = generator.return_(Value::number(5.0));
    marten.run_until_idle();

    let next_after = record_of(&next_after);
    assert!(next_after.done);
    assert!(next_after.value.is_undefined());

    let return_after = record_of(&return_after);
    assert!(return_after.done);
    assert_eq!(return_after.value.as_number(), Some(5.0));
}

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskflow::prelude::*;

/// Registers `count` tasks where task `i` sleeps longer than task `i + 1`,
/// so they finish in reverse order. Each records its index when done.
fn staggered(runtime: &mut Runtime, count: u64, finished: Arc<Mutex<Vec<u64>>>) -> Vec<Task> {
    (0..count)
        .map(|index| {
            let finished = finished.clone();
            runtime
                .register(Task::builder(format!("step-{index}")).handler(move || {
                    std::thread::sleep(Duration::from_millis(40 * (count - index)));
                    finished.lock().unwrap().push(index);
                    Ok::<_, BoxError>(index)
                }))
                .unwrap()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_keeps_input_order_whatever_the_finish_order() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = Runtime::default();
    let tasks = staggered(&mut runtime, 4, finished.clone());

    let outcomes = Tasks::new(tasks).execute(&runtime).await;

    let values: Vec<_> = outcomes.into_iter().map(|o| o.unwrap().unwrap()).collect();
    assert_eq!(values, vec![json!(0), json!(1), json!(2), json!(3)]);
    assert_eq!(*finished.lock().unwrap(), vec![3, 2, 1, 0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_returns_one_channel_per_job_in_order() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let mut runtime = Runtime::default();
    let tasks = staggered(&mut runtime, 3, finished.clone());

    let receivers = Tasks::new(tasks).dispatch(&runtime);
    assert_eq!(receivers.len(), 3);

    for (index, receiver) in receivers.into_iter().enumerate() {
        let outcome = receiver.await.unwrap();
        assert_eq!(outcome.unwrap(), Some(json!(index)));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn a_panicking_handler_only_fails_its_own_slot() {
    let mut runtime = Runtime::default();
    let before = runtime
        .register(Task::builder("before").handler(|| Ok::<_, BoxError>("before")))
        .unwrap();
    let boom = runtime
        .register(Task::builder("boom").handler(|| -> Result<(), BoxError> { panic!("kaboom") }))
        .unwrap();
    let after = runtime
        .register(Task::builder("after").handler(|| Ok::<_, BoxError>("after")))
        .unwrap();
    let batch = Tasks::new(vec![before, boom, after]);

    let outcomes = batch.execute(&runtime).await;
    assert_eq!(outcomes[0].as_ref().unwrap(), &Some(json!("before")));
    match &outcomes[1] {
        Err(JobError::Panicked { job, message }) => {
            assert_eq!(job, "boom");
            assert_eq!(message, "kaboom");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(outcomes[2].as_ref().unwrap(), &Some(json!("after")));

    let receivers = batch.dispatch(&runtime);
    let mut dispatched = Vec::new();
    for receiver in receivers {
        dispatched.push(receiver.await.unwrap());
    }
    assert!(dispatched[0].is_ok());
    assert!(matches!(dispatched[1], Err(JobError::Panicked { .. })));
    assert!(dispatched[2].is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_errors_fill_the_error_slot() {
    let mut runtime = Runtime::default();
    let task = runtime
        .register(
            Task::builder("divide")
                .handler_with(|(a, b): (i64, i64)| {
                    if b == 0 {
                        return Err(anyhow::anyhow!("division by zero"));
                    }
                    Ok(a / b)
                })
                .data((1i64, 0i64)),
        )
        .unwrap();

    match task.execute(&runtime).await {
        Err(JobError::Failed { job, source }) => {
            assert_eq!(job, "divide");
            assert_eq!(source.to_string(), "division by zero");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let rehydrated = runtime.task("divide", "[9, 3]").unwrap();
    assert_eq!(rehydrated.execute(&runtime).await.unwrap(), Some(json!(3)));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_batches_produce_nothing() {
    let runtime = Runtime::default();
    assert!(Tasks::default().execute(&runtime).await.is_empty());
    assert!(Tasks::default().dispatch(&runtime).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn events_report_panics() {
    let mut runtime = Runtime::default();
    let boom = runtime
        .register(Task::builder("boom").handler(|| -> Result<(), BoxError> { panic!("kaboom") }))
        .unwrap();
    let mut events = runtime.subscribe_events();

    assert!(boom.execute(&runtime).await.is_err());

    let mut saw_panic = false;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::JobPanicked { name, message, .. } = event {
            assert_eq!(name, "boom");
            assert_eq!(message, "kaboom");
            saw_panic = true;
        }
    }
    assert!(saw_panic);
}

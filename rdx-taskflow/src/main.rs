use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use taskflow::prelude::*;
use taskflow::{ENGINE_NAME, VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
    info!("Starting {} v{}", ENGINE_NAME.cyan(), VERSION);

    // 2. Load the configuration, optionally from the file given as first argument.
    let path = std::env::args().nth(1);
    let config = RuntimeConfig::load(path.as_deref().map(Path::new))?;

    // 3. Create the runtime and register the sample tasks.
    let mut runtime = Runtime::new(config);
    register_sample_tasks(&mut runtime)?;

    // 4. Spawn a listener on the engine's event stream.
    spawn_event_listener(&runtime);

    // 5. Share the runtime and run every sample workflow locally.
    let runtime = Arc::new(runtime);
    for workflow in sample_workflows() {
        workflow.run(runtime.clone()).await?;
    }

    let events = event_workflow();
    events.run(runtime.clone()).await?;
    events
        .handle_event(runtime, "MyEvent", serde_json::json!({"source": "flowdev"}))
        .await?;

    Ok(())
}

/// Spawns a task printing every `EngineEvent`.
fn spawn_event_listener(runtime: &Runtime) {
    let mut engine_rx = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = engine_rx.recv().await {
            info!("[ENGINE] => {:?}", event);
        }
    });
}

/// Registers three tasks that simulate work of different lengths.
fn register_sample_tasks(runtime: &mut Runtime) -> Result<()> {
    runtime.register(Task::builder("TaskA").handler(|| {
        std::thread::sleep(Duration::from_secs(2));
        info!("[TASK A] Done.");
        Ok::<_, BoxError>("Task A")
    }))?;

    runtime.register(Task::builder("TaskB").handler(|| {
        std::thread::sleep(Duration::from_secs(1));
        info!("[TASK B] Done.");
        Ok::<_, BoxError>("Task B")
    }))?;

    runtime.register(Task::builder("TaskC").handler_with(|label: Option<String>| {
        std::thread::sleep(Duration::from_millis(500));
        let label = label.unwrap_or_else(|| "Task C".to_string());
        info!("[TASK C] Done as {}.", label);
        Ok::<_, BoxError>(label)
    }))?;

    Ok(())
}

/// The workflows run by this demo, in order.
fn sample_workflows() -> Vec<Workflow> {
    vec![
        Workflow::builder("SequentialWorkflow", |runtime: Arc<Runtime>| async move {
            runtime.task("TaskA", "")?.execute(&runtime).await?;
            runtime.task("TaskB", "")?.execute(&runtime).await?;
            anyhow::Ok(())
        })
        .build(),
        Workflow::builder("AsynchronousWorkflow", |runtime: Arc<Runtime>| async move {
            let pending = runtime.task("TaskA", "")?.dispatch(&runtime);
            runtime.task("TaskB", "")?.execute(&runtime).await?;
            info!("[ASYNC] TaskA finished later with {:?}", pending.await?);
            anyhow::Ok(())
        })
        .build(),
        Workflow::builder("ParallelWorkflow", |runtime: Arc<Runtime>| async move {
            let mut batch = vec![runtime.task("TaskA", "")?];
            for _ in 0..4 {
                batch.push(runtime.task("TaskB", "")?);
            }
            let outcomes = Tasks::new(batch).execute(&runtime).await;
            info!("[PARALLEL] outcomes: {:?}", outcomes);
            runtime.task("TaskC", "")?.execute(&runtime).await?;
            anyhow::Ok(())
        })
        .build(),
        Workflow::builder("WaitWorkflow", |runtime: Arc<Runtime>| async move {
            runtime.task("TaskA", "")?.execute(&runtime).await?;
            let target = runtime.wait().seconds(2).timestamp_or_duration()?;
            if let WaitTarget::Duration(seconds) = target {
                info!("[WAIT] Sleeping for {} seconds.", seconds);
                tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            }
            runtime.task("TaskB", "")?.execute(&runtime).await?;
            anyhow::Ok(())
        })
        .build(),
    ]
}

/// A workflow reacting to `MyEvent` by running `TaskC`.
fn event_workflow() -> Workflow {
    Workflow::builder("EventWorkflow", |runtime: Arc<Runtime>| async move {
        runtime.task("TaskA", "")?.execute(&runtime).await?;
        runtime.task("TaskB", "")?.execute(&runtime).await?;
        anyhow::Ok(())
    })
    .on_event(|runtime: Arc<Runtime>, name: String, input: Value| async move {
        if name == "MyEvent" {
            let task = runtime.task("TaskC", &serde_json::to_string(&name)?)?;
            let outcome = task.execute(&runtime).await?;
            info!("[EVENT] {} with {} produced {:?}", name, input, outcome);
        }
        anyhow::Ok(())
    })
    .id(|| "MyId".to_string())
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn event_workflow_passes_the_event_name_to_task_c() {
        let mut runtime = Runtime::default();
        register_sample_tasks(&mut runtime).unwrap();
        let runtime = Arc::new(runtime);

        event_workflow()
            .handle_event(runtime.clone(), "MyEvent", serde_json::json!({}))
            .await
            .unwrap();

        let task = runtime.task("TaskC", &serde_json::to_string("My \"quoted\" Event").unwrap());
        let outcome = task.unwrap().execute(&runtime).await.unwrap();
        assert_eq!(outcome, Some(Value::String("My \"quoted\" Event".to_string())));
    }
}

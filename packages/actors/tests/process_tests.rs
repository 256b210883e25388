#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{ProcessorFactory, QueueProcess};
use common::{
    FailingProcessor, HookCounter, HookedProcessor, StepProcessor, StubbornProcessor, factory,
    scan, setup, wait_for_status,
};
use queue_core::{ItemType, QueueError, QueueItem, Status};

#[tokio::test]
async fn test_missing_processor_is_not_found() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let factory = ProcessorFactory::new();

    let result = factory.get_processor(scan("grid"), setup.publisher.clone(), true);
    assert!(matches!(result, Err(QueueError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_registration_is_idempotent() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let built = Arc::new(AtomicUsize::new(0));

    let mut factory = factory(1, 1);
    for _ in 0..2 {
        let built = Arc::clone(&built);
        factory.register_processor(ItemType::Task, move || {
            built.fetch_add(1, Ordering::SeqCst);
            StepProcessor::new(1, 1)
        });
    }
    assert_eq!(
        factory.item_types(),
        [ItemType::Task, ItemType::Move, ItemType::Scan, ItemType::Monitor]
    );
    assert!(!factory.has_processor(ItemType::SubTask));

    // A fresh processor is built for every process.
    factory.get_processor(QueueItem::task("a"), setup.publisher.clone(), true)?;
    factory.get_processor(QueueItem::task("b"), setup.publisher.clone(), true)?;
    assert_eq!(built.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_execute_completes_at_100_percent() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let process = factory(3, 5).get_processor(scan("grid"), setup.publisher.clone(), true)?;

    assert!(process.is_blocking());
    let settled = process.execute().await?;
    assert_eq!(settled.status, Status::Complete);
    assert_eq!(settled.previous_status, Status::Running);
    assert_eq!(settled.percent_complete, 100.0);
    assert!(process.is_complete());
    assert!(!process.is_terminated());

    let status_set = setup.fabric.snapshot(&setup.names.status_set)?;
    assert_eq!(status_set.len(), 1);
    assert_eq!(status_set[0].status, Status::Complete);
    assert_eq!(status_set[0].percent_complete, 100.0);
    Ok(())
}

#[tokio::test]
async fn test_status_topic_sees_every_transition() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let mut updates = setup.fabric.subscribe(&setup.names.status_topic)?;
    let process = factory(2, 5).get_processor(scan("grid"), setup.publisher.clone(), true)?;
    process.execute().await?;

    let mut seen = Vec::new();
    while let Ok(message) = updates.try_recv() {
        if let queue_core::FabricMessage::Item(item) = message {
            seen.push((item.status, item.percent_complete));
        }
    }
    assert_eq!(seen.first().map(|(status, _)| *status), Some(Status::Running));
    assert_eq!(seen.last(), Some(&(Status::Complete, 100.0)));
    assert!(
        seen.iter()
            .filter(|(status, _)| *status == Status::Running)
            .all(|(_, percent)| *percent < 100.0)
    );
    Ok(())
}

#[tokio::test]
async fn test_failing_processor_leaves_item_failed() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let factory = ProcessorFactory::new().with_processor(ItemType::Scan, || FailingProcessor);
    let process = factory.get_processor(scan("grid"), setup.publisher.clone(), true)?;

    let result = process.execute().await;
    assert!(matches!(result, Err(QueueError::Process(_))));

    let item = process.item();
    assert_eq!(item.status, Status::Failed);
    assert!(item.status.is_final());
    assert_eq!(item.message.as_deref(), Some("process failed: detector offline"));
    Ok(())
}

#[tokio::test]
async fn test_terminate_mid_execution() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let process = factory(50, 20).get_processor(scan("grid"), setup.publisher.clone(), false)?;

    process.execute().await?;
    wait_for_status(
        setup.fabric.as_ref(),
        &setup.names.status_set,
        process.item_id(),
        Duration::from_secs(2),
        |_| true,
    )
    .await
    .ok_or("item never published")?;
    tokio::time::sleep(Duration::from_millis(60)).await;

    process.terminate()?;
    assert!(matches!(process.terminate(), Err(QueueError::IllegalState(_))));

    let settled = process.wait().await?;
    assert_eq!(settled.status, Status::Terminated);
    assert_ne!(settled.percent_complete, 100.0);
    assert!(process.is_terminated());
    assert!(!process.is_complete());
    Ok(())
}

#[tokio::test]
async fn test_progress_keeps_pending_request() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let process = factory(40, 20).get_processor(scan("grid"), setup.publisher.clone(), false)?;
    assert!(!process.is_blocking());
    assert_eq!(process.publisher().status_set(), setup.names.status_set);

    process.execute().await?;
    let running = wait_for_status(
        setup.fabric.as_ref(),
        &setup.names.status_set,
        process.item_id(),
        Duration::from_secs(2),
        |s| s == Status::Running,
    )
    .await
    .ok_or("item never started")?;

    // A client records a pause request that the process has not seen yet.
    let mut requested = running.clone();
    requested.set_status(Status::RequestPause);
    setup.publisher.broadcast(&requested)?;
    assert_eq!(
        setup.publisher.pending_request(process.item_id())?,
        Some(Status::RequestPause)
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let recorded = setup
        .fabric
        .find(&setup.names.status_set, process.item_id())?
        .ok_or("item left the status set")?;
    assert_eq!(recorded.status, Status::RequestPause);
    assert!(recorded.percent_complete > running.percent_complete);

    // An explicit status still replaces the request.
    process.terminate()?;
    let settled = process.wait().await?;
    assert_eq!(settled.status, Status::Terminated);
    assert_eq!(setup.publisher.pending_request(process.item_id())?, None);
    Ok(())
}

#[tokio::test]
async fn test_pause_and_resume() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let counter = HookCounter::default();
    let hooks = counter.clone();
    let factory = ProcessorFactory::new().with_processor(ItemType::Scan, move || HookedProcessor {
        inner: StepProcessor::new(10, 10),
        counter: hooks.clone(),
    });
    let process = factory.get_processor(scan("grid"), setup.publisher.clone(), false)?;
    let item_id = process.item_id();

    process.execute().await?;
    process.pause()?;
    assert!(matches!(process.pause(), Err(QueueError::IllegalState(_))));

    let paused = wait_for_status(
        setup.fabric.as_ref(),
        &setup.names.status_set,
        item_id,
        Duration::from_secs(2),
        |status| status == Status::Paused,
    )
    .await
    .ok_or("item never paused")?;
    assert!(paused.percent_complete < 100.0);

    process.resume()?;
    assert!(matches!(process.resume(), Err(QueueError::IllegalState(_))));

    let settled = process.wait().await?;
    assert_eq!(settled.status, Status::Complete);
    assert_eq!(counter.pauses.load(Ordering::SeqCst), 1);
    assert_eq!(counter.resumes.load(Ordering::SeqCst), 1);
    assert_eq!(counter.terminates.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_terminate_while_paused() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let process = factory(10, 10).get_processor(scan("grid"), setup.publisher.clone(), false)?;

    process.execute().await?;
    process.pause()?;
    wait_for_status(
        setup.fabric.as_ref(),
        &setup.names.status_set,
        process.item_id(),
        Duration::from_secs(2),
        |status| status == Status::Paused,
    )
    .await
    .ok_or("item never paused")?;

    process.terminate()?;
    let settled = process.wait().await?;
    assert_eq!(settled.status, Status::Terminated);
    Ok(())
}

#[tokio::test]
async fn test_unresponsive_processor_is_aborted() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let factory = ProcessorFactory::new().with_processor(ItemType::Scan, || StubbornProcessor);
    let process = factory
        .get_processor(scan("grid"), setup.publisher.clone(), false)?
        .with_terminate_grace(Duration::from_millis(50));

    process.execute().await?;
    process.terminate()?;

    let settled = tokio::time::timeout(Duration::from_secs(2), process.wait()).await??;
    assert_eq!(settled.status, Status::Terminated);
    Ok(())
}

#[tokio::test]
async fn test_control_requires_a_running_item() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let process: QueueProcess =
        factory(1, 1).get_processor(scan("grid"), setup.publisher.clone(), true)?;

    assert!(matches!(process.pause(), Err(QueueError::IllegalState(_))));
    assert!(matches!(process.resume(), Err(QueueError::IllegalState(_))));

    process.execute().await?;
    assert!(matches!(process.execute().await, Err(QueueError::IllegalState(_))));
    assert!(matches!(process.pause(), Err(QueueError::IllegalState(_))));
    assert!(matches!(process.terminate(), Err(QueueError::IllegalState(_))));
    Ok(())
}

#[tokio::test]
async fn test_terminate_before_execute() -> Result<(), Box<dyn Error>> {
    let setup = setup()?;
    let process = factory(5, 10).get_processor(scan("grid"), setup.publisher.clone(), true)?;

    process.terminate()?;
    let settled = process.execute().await?;
    assert_eq!(settled.status, Status::Terminated);
    assert_eq!(settled.percent_complete, 0.0);
    Ok(())
}

#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use common::{active_processors, config, job_processors, memory_fabric, scan, wait_for_status};
use queue_core::{QueueError, QueueItem, QueueRequest, QueueRequestType, Status};
use queue_service::{
    LocalResolver, MetadataResolver, QueueController, QueueSystem, RemoteResolver, answer,
    init_queue_system,
};

async fn system(steps: u32, step_ms: u64) -> Result<QueueSystem, Box<dyn Error>> {
    Ok(init_queue_system(
        config(common::ROOT),
        job_processors(steps, step_ms),
        active_processors(steps, step_ms),
    )
    .await?)
}

#[tokio::test]
async fn test_remote_matches_local_for_every_request() -> Result<(), Box<dyn Error>> {
    let system = system(1, 5).await?;
    let local = system.local_controller();
    let remote = system.remote_controller();
    let (lr, rr) = (local.resolver(), remote.resolver());

    assert_eq!(rr.job_queue_id().await?, lr.job_queue_id().await?);
    assert_eq!(rr.command_set_name().await?, lr.command_set_name().await?);
    assert_eq!(rr.command_topic_name().await?, lr.command_topic_name().await?);
    assert_eq!(rr.heartbeat_topic_name().await?, lr.heartbeat_topic_name().await?);

    let job_queue_id = lr.job_queue_id().await?;
    let active_id = system.service.register_new_active_queue().await?;
    for queue_id in [&job_queue_id, &active_id] {
        assert_eq!(rr.queue(queue_id).await?, lr.queue(queue_id).await?);
    }

    let item = scan("pending");
    local.submit(&item, &active_id).await?;
    assert_eq!(
        rr.bean_status(item.id, &active_id).await?,
        lr.bean_status(item.id, &active_id).await?
    );
    assert_eq!(rr.bean_status(item.id, &active_id).await?, Status::Submitted);

    // SERVICE_START_STOP
    remote.stop(false).await?;
    assert!(!system.service.is_active().await?);
    remote.start().await?;
    assert!(system.service.is_active().await?);

    system.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_errors_carry_their_kind() -> Result<(), Box<dyn Error>> {
    let system = system(1, 5).await?;
    let remote = system.remote_controller();
    let resolver = remote.resolver();

    assert!(matches!(
        resolver.queue("r.aq-99.active-queue").await,
        Err(QueueError::NotFound(_))
    ));
    let job_queue_id = resolver.job_queue_id().await?;
    assert!(matches!(
        resolver.bean_status(scan("ghost").id, &job_queue_id).await,
        Err(QueueError::NotFound(_))
    ));
    assert!(matches!(
        remote.submit(&scan("atom"), &job_queue_id).await,
        Err(QueueError::Validation(_))
    ));

    // Requests missing their fields are rejected by the responder.
    let bare = QueueRequest::new(QueueRequestType::BeanStatus);
    assert!(matches!(resolver.send(bare).await, Err(QueueError::Validation(_))));
    let neither = QueueRequest::new(QueueRequestType::ServiceStartStop);
    assert!(matches!(resolver.send(neither).await, Err(QueueError::Validation(_))));

    system.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_controller_runs_and_terminates_items() -> Result<(), Box<dyn Error>> {
    let system = system(40, 50).await?;
    let remote = system.remote_controller();
    let job_queue_id = remote.job_queue_id().await?;
    let status_set = remote.queue(&job_queue_id).await?.names.status_set;

    let item = QueueItem::task("remote");
    remote.submit(&item, &job_queue_id).await?;
    wait_for_status(
        system.fabric().as_ref(),
        &status_set,
        item.id,
        Duration::from_secs(2),
        |s| s == Status::Running,
    )
    .await
    .ok_or("item never started")?;

    remote.terminate(&item, &job_queue_id).await?;
    let settled = wait_for_status(
        system.fabric().as_ref(),
        &status_set,
        item.id,
        Duration::from_secs(2),
        Status::is_final,
    )
    .await
    .ok_or("item never settled")?;
    assert_eq!(settled.status, Status::Terminated);
    assert_eq!(remote.bean_status(&item, &job_queue_id).await?, Status::Terminated);

    system.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_answer_fills_matching_field() -> Result<(), Box<dyn Error>> {
    let system = system(1, 5).await?;
    let resolver = LocalResolver::new(system.service.clone());

    let reply = answer(&resolver, QueueRequest::new(QueueRequestType::JobQueueId)).await;
    assert_eq!(reply.job_queue_id.as_deref(), Some("r.job-queue"));
    assert!(reply.error.is_none());
    assert!(reply.command_topic_name.is_none());

    let reply = answer(&resolver, QueueRequest::queue("r.job-queue")).await;
    let descriptor = reply.queue.ok_or("no descriptor in reply")?;
    assert_eq!(descriptor.names.submission_queue, "r.job-queue.submission.queue");

    let reply = answer(&resolver, QueueRequest::new(QueueRequestType::Queue)).await;
    assert!(matches!(reply.error, Some(QueueError::Validation(_))));

    system.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_request_without_responder_fails() -> Result<(), Box<dyn Error>> {
    let fabric = memory_fabric()?;

    let unserved = QueueController::remote(fabric.clone(), "nobody", Duration::from_millis(100));
    let err = unserved
        .job_queue_id()
        .await
        .err()
        .ok_or("request without responder succeeded")?;
    assert!(err.is_transport());

    // A responder that never answers times out instead of blocking.
    let _silent = fabric.serve("silent")?;
    let resolver = RemoteResolver::new(fabric.clone(), "silent", Duration::from_millis(100));
    let started = tokio::time::Instant::now();
    assert!(matches!(resolver.job_queue_id().await, Err(QueueError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(1));

    Ok(())
}

#[tokio::test]
async fn test_stopped_responder_stops_answering() -> Result<(), Box<dyn Error>> {
    let system = system(1, 5).await?;
    let remote = system.remote_controller();
    remote.job_queue_id().await?;

    system.responder.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = remote
        .job_queue_id()
        .await
        .err()
        .ok_or("stopped responder still answered")?;
    assert!(err.is_transport());

    system.shutdown().await?;
    Ok(())
}

#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use common::{BEAT, active_processors, job_processors, started_service};
use queue_core::{ConsumerId, QueueError, QueueStatus};
use queue_service::HeartbeatMonitor;

#[tokio::test]
async fn test_heartbeats_stop_after_kill() -> Result<(), Box<dyn Error>> {
    let service = started_service(job_processors(1, 5), active_processors(1, 5)).await?;
    let job_queue = service.get_job_queue().await?;

    tokio::time::sleep(BEAT * 3).await;
    let beats = job_queue.get_latest_heartbeats();
    assert!(beats.len() >= 2, "expected at least two heartbeats, got {}", beats.len());
    assert!(beats.iter().all(|beat| beat.consumer_id == job_queue.consumer_id()));
    assert!(beats.windows(2).all(|pair| pair[0].beat < pair[1].beat));
    let last = job_queue.get_last_heartbeat().ok_or("no last heartbeat")?;
    assert_eq!(Some(&last), beats.last());
    assert!(job_queue
        .heartbeat_monitor()
        .last_heartbeat_age()
        .is_some_and(|age| age < chrono::Duration::seconds(1)));

    let job_queue_id = service.get_job_queue_id().await?;
    service.kill_queue(&job_queue_id, false, false).await?;
    assert_eq!(job_queue.status(), QueueStatus::Killed);

    // Let beats already in flight land before counting.
    tokio::time::sleep(BEAT).await;
    let recorded = job_queue.get_latest_heartbeats().len();
    tokio::time::sleep(BEAT * 4).await;
    assert_eq!(job_queue.get_latest_heartbeats().len(), recorded);

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_queue_monitor_is_locked() -> Result<(), Box<dyn Error>> {
    let service = started_service(job_processors(1, 5), active_processors(1, 5)).await?;
    let job_queue = service.get_job_queue().await?;
    let monitor = job_queue.heartbeat_monitor();
    assert!(monitor.is_locked());

    assert!(matches!(
        monitor.set_consumer_id(ConsumerId::new()),
        Err(QueueError::IllegalState(_))
    ));
    let job_queue_id = service.get_job_queue_id().await?;
    assert!(matches!(
        monitor.set_queue_id(&job_queue_id, &service).await,
        Err(QueueError::IllegalState(_))
    ));
    assert_eq!(monitor.consumer_id(), job_queue.consumer_id());

    let locked = HeartbeatMonitor::for_queue(&job_queue, true)?;
    assert!(matches!(locked.set_queue(&job_queue), Err(QueueError::IllegalState(_))));

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unlocked_monitor_follows_another_queue() -> Result<(), Box<dyn Error>> {
    let service = started_service(job_processors(1, 5), active_processors(1, 5)).await?;
    let topic = service.get_heartbeat_topic_name().await?;
    let active_id = service.register_new_active_queue().await?;
    let active_queue = service.get_active_queue(&active_id).await?;

    let monitor = HeartbeatMonitor::for_queue_id(
        service.fabric(),
        topic.clone(),
        &active_id,
        &service,
        false,
    )
    .await?;
    assert_eq!(monitor.queue_id().as_deref(), Some(active_id.as_str()));
    assert_eq!(monitor.heartbeat_topic(), topic);

    // The job queue beats on the same topic but is filtered out.
    tokio::time::sleep(BEAT * 3).await;
    assert!(monitor.get_last_heartbeat().is_none());

    service.start_active_queue(&active_id).await?;
    tokio::time::sleep(BEAT * 3).await;
    let beats = monitor.get_latest_heartbeats();
    assert!(beats.len() >= 2);
    assert!(beats.iter().all(|beat| beat.consumer_id == active_queue.consumer_id()));

    let job_queue_id = service.get_job_queue_id().await?;
    let job_queue = service.get_job_queue().await?;
    monitor.set_queue_id(&job_queue_id, &service).await?;
    assert_eq!(monitor.consumer_id(), job_queue.consumer_id());
    tokio::time::sleep(BEAT * 3).await;
    let beats = monitor.get_latest_heartbeats();
    assert!(!beats.is_empty());
    assert!(beats.iter().all(|beat| beat.consumer_id == job_queue.consumer_id()));

    assert!(matches!(
        monitor.set_queue_id("r.aq-99.active-queue", &service).await,
        Err(QueueError::NotFound(_))
    ));

    monitor.stop();
    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_monitor_by_consumer_id_and_capacity() -> Result<(), Box<dyn Error>> {
    let service = started_service(job_processors(1, 5), active_processors(1, 5)).await?;
    let topic = service.get_heartbeat_topic_name().await?;
    let job_queue = service.get_job_queue().await?;

    let monitor = HeartbeatMonitor::new(
        service.fabric(),
        topic,
        job_queue.consumer_id(),
        false,
    )?;
    assert!(monitor.queue_id().is_none());
    monitor.set_recorder_capacity(2);
    assert_eq!(monitor.recorder_capacity(), 2);

    tokio::time::sleep(BEAT * 5).await;
    let beats = monitor.get_latest_heartbeats();
    assert_eq!(beats.len(), 2);
    // Reading is not draining.
    assert_eq!(monitor.get_latest_heartbeats(), beats);

    monitor.set_consumer_id(ConsumerId::new())?;
    assert!(monitor.get_latest_heartbeats().is_empty());

    service.shutdown().await;
    Ok(())
}

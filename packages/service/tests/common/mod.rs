#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use actors::{Flow, ProcessContext, Processor, ProcessorFactory, ProcessorFuture};
use fabric::{EventFabric, FabricConfig};
use queue_core::{ItemId, ItemType, QueueItem, Status};
use queue_service::{QueueService, ServiceConfig};

pub const ROOT: &str = "r";

/// Heartbeat interval used by test services.
pub const BEAT: Duration = Duration::from_millis(50);

pub fn config(root: &str) -> ServiceConfig {
    ServiceConfig::new(root, "mem://test")
        .with_heartbeat_interval_ms(BEAT.as_millis() as u64)
        .with_poll_interval_ms(10)
        .with_terminate_grace_ms(300)
        .with_stop_timeout_ms(2000)
        .with_request_timeout_ms(1000)
        .with_request_channel(format!("{root}.request"))
}

pub fn memory_fabric() -> Result<Arc<dyn EventFabric>, Box<dyn Error>> {
    Ok(fabric::connect(FabricConfig::memory())?)
}

/// Runs `steps` steps of `step` each, checkpointing between them.
#[derive(Clone)]
pub struct StepProcessor {
    pub steps: u32,
    pub step: Duration,
}

impl StepProcessor {
    pub fn new(steps: u32, step_ms: u64) -> Self {
        Self {
            steps,
            step: Duration::from_millis(step_ms),
        }
    }
}

impl Processor for StepProcessor {
    fn run(&self, mut ctx: ProcessContext) -> ProcessorFuture {
        let steps = self.steps;
        let step = self.step;
        Box::pin(async move {
            for i in 1..=steps {
                if ctx.sleep(step).await? == Flow::Terminate {
                    return Ok(());
                }
                let percent = 100.0 * f64::from(i) / f64::from(steps);
                ctx.report_progress(percent, &format!("step {i} of {steps}"))?;
            }
            Ok(())
        })
    }
}

pub fn job_processors(steps: u32, step_ms: u64) -> ProcessorFactory {
    ProcessorFactory::new().with_processor(ItemType::Task, move || StepProcessor::new(steps, step_ms))
}

pub fn active_processors(steps: u32, step_ms: u64) -> ProcessorFactory {
    let mut factory = ProcessorFactory::new();
    factory.register_processors(
        &[ItemType::SubTask, ItemType::Move, ItemType::Scan, ItemType::Monitor],
        move || StepProcessor::new(steps, step_ms),
    );
    factory
}

/// Spawn, initialise and start a service on a fresh in-memory fabric.
pub async fn started_service(
    job: ProcessorFactory,
    active: ProcessorFactory,
) -> Result<QueueService, Box<dyn Error>> {
    queue_service::init_logging(tracing::Level::WARN);
    let service = QueueService::spawn(memory_fabric()?, config(ROOT)).await?;
    service.set_job_queue_processor(job).await?;
    service.set_active_queue_processor(active).await?;
    service.init().await?;
    service.start().await?;
    Ok(service)
}

pub fn scan(name: &str) -> QueueItem {
    QueueItem::new(ItemType::Scan, name)
}

/// Poll the status set until the item satisfies `predicate`.
pub async fn wait_for_status(
    fabric: &dyn EventFabric,
    status_set: &str,
    item_id: ItemId,
    timeout: Duration,
    predicate: impl Fn(Status) -> bool,
) -> Option<QueueItem> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(Some(item)) = fabric.find(status_set, item_id) {
            if predicate(item.status) {
                return Some(item);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

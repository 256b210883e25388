#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{Flow, ProcessContext, Processor, ProcessorFactory, ProcessorFuture, StatusPublisher};
use fabric::{EventFabric, FabricConfig, FabricError};
use queue_core::{ItemId, ItemType, QueueError, QueueItem, QueueNames, Status};

pub const ROOT: &str = "test.aq-1.active-queue";

pub struct Setup {
    pub fabric: Arc<dyn EventFabric>,
    pub names: QueueNames,
    pub publisher: StatusPublisher,
}

pub fn setup() -> Result<Setup, FabricError> {
    let fabric = fabric::connect(FabricConfig::memory())?;
    let names = QueueNames::derive(ROOT);
    let publisher = StatusPublisher::for_queue(Arc::clone(&fabric), &names);
    Ok(Setup {
        fabric,
        names,
        publisher,
    })
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

/// Fails immediately.
pub struct FailingProcessor;

impl Processor for FailingProcessor {
    fn run(&self, _ctx: ProcessContext) -> ProcessorFuture {
        Box::pin(async { Err(QueueError::Process("detector offline".to_string())) })
    }
}

/// Never checkpoints; only the forced abort stops it.
pub struct StubbornProcessor;

impl Processor for StubbornProcessor {
    fn run(&self, _ctx: ProcessContext) -> ProcessorFuture {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
    }
}

/// Counts hook invocations.
#[derive(Clone, Default)]
pub struct HookCounter {
    pub pauses: Arc<AtomicUsize>,
    pub resumes: Arc<AtomicUsize>,
    pub terminates: Arc<AtomicUsize>,
}

pub struct HookedProcessor {
    pub inner: StepProcessor,
    pub counter: HookCounter,
}

impl Processor for HookedProcessor {
    fn run(&self, ctx: ProcessContext) -> ProcessorFuture {
        self.inner.run(ctx)
    }

    fn pause(&self) {
        self.counter.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.counter.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn terminate(&self) {
        self.counter.terminates.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn factory(steps: u32, step_ms: u64) -> ProcessorFactory {
    let mut factory = ProcessorFactory::new();
    factory.register_processors(
        &[ItemType::Move, ItemType::Scan, ItemType::Monitor],
        move || StepProcessor::new(steps, step_ms),
    );
    factory
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

//! One controllable execution of a queue item.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use queue_core::{ItemId, QueueError, QueueItem, QueueResult, Status};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinHandle};

use crate::processor::Processor;
use crate::publisher::StatusPublisher;

/// How long a terminated processor may keep running before it is aborted.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Progress is capped below 100 until the item completes.
const MAX_RUNNING_PERCENT: f64 = 99.9;

/// Signal delivered from the controlling side to a running processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Run,
    Pause,
    Terminate,
}

/// What a processor should do after a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle given to a processor for reading its item, reporting progress and
/// observing control signals.
pub struct ProcessContext {
    item: Arc<Mutex<QueueItem>>,
    publisher: StatusPublisher,
    signals: watch::Receiver<ControlSignal>,
}

impl ProcessContext {
    pub(crate) fn new(
        item: Arc<Mutex<QueueItem>>,
        publisher: StatusPublisher,
        signals: watch::Receiver<ControlSignal>,
    ) -> Self {
        Self {
            item,
            publisher,
            signals,
        }
    }

    pub fn item(&self) -> QueueItem {
        lock(&self.item).clone()
    }

    pub fn item_id(&self) -> ItemId {
        lock(&self.item).id
    }

    pub fn status(&self) -> Status {
        lock(&self.item).status
    }

    pub fn payload(&self) -> serde_json::Value {
        lock(&self.item).payload.clone()
    }

    /// Update any of status, percent and message, then publish the item.
    ///
    /// Without a new status, a control request already recorded for the
    /// item is published in place of the local status so it is not lost.
    pub fn broadcast(
        &self,
        status: Option<Status>,
        percent: Option<f64>,
        message: Option<&str>,
    ) -> QueueResult<()> {
        let mut snapshot = {
            let mut item = lock(&self.item);
            if let Some(status) = status {
                if !item.status.can_transition_to(status) {
                    tracing::warn!(
                        "Unexpected transition {} -> {} for item {}",
                        item.status,
                        status,
                        item.id
                    );
                }
                item.set_status(status);
            }
            if let Some(percent) = percent {
                item.set_percent_complete(percent);
            }
            if let Some(message) = message {
                item.set_message(message);
            }
            item.clone()
        };
        if status.is_none() && !snapshot.status.is_request() && !snapshot.status.is_final() {
            if let Some(pending) = self.publisher.pending_request(snapshot.id)? {
                snapshot.set_status(pending);
            }
        }
        self.publisher.broadcast(&snapshot)
    }

    /// Publish progress without changing status.
    pub fn report_progress(&self, percent: f64, message: &str) -> QueueResult<()> {
        self.broadcast(None, Some(percent.min(MAX_RUNNING_PERCENT)), Some(message))
    }

    pub fn is_pause_requested(&self) -> bool {
        *self.signals.borrow() == ControlSignal::Pause
    }

    pub fn is_terminate_requested(&self) -> bool {
        *self.signals.borrow() == ControlSignal::Terminate
    }

    /// Honour pending control signals.
    ///
    /// While paused this waits, publishing `PAUSED` once and `RUNNING`
    /// again on resume. Returns [`Flow::Terminate`] when the processor
    /// should stop early.
    pub async fn checkpoint(&mut self) -> QueueResult<Flow> {
        loop {
            let signal = *self.signals.borrow_and_update();
            match signal {
                ControlSignal::Terminate => return Ok(Flow::Terminate),
                ControlSignal::Run => {
                    let status = self.status();
                    if status.is_paused() || status.is_resumed() {
                        self.broadcast(Some(Status::Running), None, Some("Resumed"))?;
                    }
                    return Ok(Flow::Continue);
                }
                ControlSignal::Pause => {
                    if self.status() != Status::Paused {
                        self.broadcast(Some(Status::Paused), None, Some("Paused"))?;
                    }
                    if self.signals.changed().await.is_err() {
                        return Ok(Flow::Terminate);
                    }
                }
            }
        }
    }

    /// Sleep, waking early on termination, then checkpoint.
    pub async fn sleep(&mut self, duration: Duration) -> QueueResult<Flow> {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            let woke = tokio::select! {
                () = &mut deadline => None,
                changed = self.signals.changed() => Some(changed.is_ok()),
            };
            match woke {
                None => return self.checkpoint().await,
                Some(false) => return Ok(Flow::Terminate),
                Some(true) if self.is_terminate_requested() => return Ok(Flow::Terminate),
                Some(true) => {}
            }
        }
    }
}

/// One item bound to one processor instance.
///
/// `pause`, `resume` and `terminate` may be called from any task while the
/// item executes.
pub struct QueueProcess {
    item: Arc<Mutex<QueueItem>>,
    publisher: StatusPublisher,
    processor: Arc<dyn Processor>,
    control: watch::Sender<ControlSignal>,
    blocking: bool,
    terminate_grace: Duration,
    started: AtomicBool,
    finished: AtomicBool,
    terminate_requested: AtomicBool,
    task: Mutex<Option<JoinHandle<QueueResult<()>>>>,
    abort: Arc<Mutex<Option<AbortHandle>>>,
}

impl QueueProcess {
    pub fn new(
        item: QueueItem,
        publisher: StatusPublisher,
        processor: Arc<dyn Processor>,
        blocking: bool,
    ) -> Self {
        let (control, _) = watch::channel(ControlSignal::Run);
        Self {
            item: Arc::new(Mutex::new(item)),
            publisher,
            processor,
            control,
            blocking,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            terminate_requested: AtomicBool::new(false),
            task: Mutex::new(None),
            abort: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn item(&self) -> QueueItem {
        lock(&self.item).clone()
    }

    pub fn item_id(&self) -> ItemId {
        lock(&self.item).id
    }

    /// The bound processor instance.
    pub fn processor(&self) -> Arc<dyn Processor> {
        Arc::clone(&self.processor)
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.item).status == Status::Complete
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.item).status == Status::Terminated
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Run the item. A blocking process returns once the item has settled;
    /// otherwise it returns after starting and [`wait`](Self::wait) settles it.
    pub async fn execute(&self) -> QueueResult<QueueItem> {
        self.start()?;
        if self.blocking {
            self.wait().await
        } else {
            Ok(self.item())
        }
    }

    fn start(&self) -> QueueResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::IllegalState(format!(
                "item {} has already been executed",
                self.item_id()
            )));
        }
        if self.terminate_requested.load(Ordering::SeqCst) {
            self.settle(Status::Terminated, None, "Terminated before execution")?;
            return Ok(());
        }

        let running = {
            let mut item = lock(&self.item);
            item.set_status(Status::Running);
            item.set_message("Running");
            item.clone()
        };
        tracing::info!("Executing item {} ({})", running.id, running.name);
        self.publisher.broadcast(&running)?;

        let ctx = ProcessContext::new(
            Arc::clone(&self.item),
            self.publisher.clone(),
            self.control.subscribe(),
        );
        let handle = tokio::spawn(self.processor.run(ctx));
        *lock(&self.abort) = Some(handle.abort_handle());
        *lock(&self.task) = Some(handle);
        Ok(())
    }

    /// Wait for the processor to return and settle the item's final status.
    pub async fn wait(&self) -> QueueResult<QueueItem> {
        let handle = lock(&self.task).take();
        match handle {
            Some(handle) => {
                let outcome = handle.await;
                self.finish(outcome)
            }
            None => Ok(self.item()),
        }
    }

    fn finish(&self, outcome: Result<QueueResult<()>, JoinError>) -> QueueResult<QueueItem> {
        self.finished.store(true, Ordering::SeqCst);

        if self.terminate_requested.load(Ordering::SeqCst) {
            tracing::info!("Item {} terminated", self.item_id());
            return self.settle(Status::Terminated, None, "Terminated on request");
        }

        match outcome {
            Ok(Ok(())) => {
                tracing::info!("Item {} complete", self.item_id());
                self.settle(Status::Complete, Some(100.0), "Complete")
            }
            Ok(Err(err)) => {
                tracing::error!("Item {} failed: {}", self.item_id(), err);
                self.settle(Status::Failed, None, &err.to_string())?;
                Err(err)
            }
            Err(join) if join.is_cancelled() => {
                self.settle(Status::Terminated, None, "Terminated on request")
            }
            Err(join) => {
                tracing::error!("Processor for item {} panicked: {}", self.item_id(), join);
                self.settle(Status::Failed, None, "Processor panicked")?;
                Err(QueueError::Process(format!(
                    "processor for item {} panicked",
                    self.item_id()
                )))
            }
        }
    }

    /// Move to a final status unless already final, then publish.
    fn settle(&self, status: Status, percent: Option<f64>, message: &str) -> QueueResult<QueueItem> {
        let settled = {
            let mut item = lock(&self.item);
            if !item.status.is_final() {
                item.set_status(status);
                if let Some(percent) = percent {
                    item.set_percent_complete(percent);
                }
                item.set_message(message);
            }
            item.clone()
        };
        self.publisher.broadcast(&settled)?;
        Ok(settled)
    }

    fn ensure_running(&self, action: &str) -> QueueResult<()> {
        if !self.started.load(Ordering::SeqCst) || self.is_finished() {
            return Err(QueueError::IllegalState(format!(
                "cannot {} item {}: it is not running",
                action,
                self.item_id()
            )));
        }
        Ok(())
    }

    fn mark(&self, status: Status) {
        lock(&self.item).set_status(status);
    }

    /// Ask the processor to suspend at its next checkpoint.
    pub fn pause(&self) -> QueueResult<()> {
        self.ensure_running("pause")?;
        let mut current = ControlSignal::Run;
        let changed = self.control.send_if_modified(|signal| {
            current = *signal;
            if *signal == ControlSignal::Run {
                *signal = ControlSignal::Pause;
                true
            } else {
                false
            }
        });
        if !changed {
            return Err(QueueError::IllegalState(format!(
                "cannot pause item {}: {:?} already requested",
                self.item_id(),
                current
            )));
        }
        tracing::info!("Pausing item {}", self.item_id());
        self.mark(Status::RequestPause);
        self.processor.pause();
        Ok(())
    }

    /// Let a paused processor continue.
    pub fn resume(&self) -> QueueResult<()> {
        self.ensure_running("resume")?;
        let changed = self.control.send_if_modified(|signal| {
            if *signal == ControlSignal::Pause {
                *signal = ControlSignal::Run;
                true
            } else {
                false
            }
        });
        if !changed {
            return Err(QueueError::IllegalState(format!(
                "cannot resume item {}: it is not paused",
                self.item_id()
            )));
        }
        tracing::info!("Resuming item {}", self.item_id());
        self.mark(Status::RequestResume);
        self.processor.resume();
        Ok(())
    }

    /// Stop the processor early. The item ends `TERMINATED`.
    ///
    /// A processor that has not returned once the grace period expires is
    /// aborted.
    pub fn terminate(&self) -> QueueResult<()> {
        if self.is_finished() {
            return Err(QueueError::IllegalState(format!(
                "cannot terminate item {}: it has already finished",
                self.item_id()
            )));
        }
        if self.terminate_requested.swap(true, Ordering::SeqCst) {
            return Err(QueueError::IllegalState(format!(
                "termination of item {} already requested",
                self.item_id()
            )));
        }
        tracing::info!("Terminating item {}", self.item_id());
        self.control.send_replace(ControlSignal::Terminate);
        self.processor.terminate();

        if !self.started.load(Ordering::SeqCst) {
            self.finished.store(true, Ordering::SeqCst);
            self.settle(Status::Terminated, None, "Terminated before execution")?;
            return Ok(());
        }

        self.mark(Status::RequestTerminate);
        let abort = Arc::clone(&self.abort);
        let grace = self.terminate_grace;
        let item_id = self.item_id();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(handle) = lock(&abort).as_ref() {
                if !handle.is_finished() {
                    tracing::warn!(
                        "Processor for item {} ignored termination for {:?}, aborting",
                        item_id,
                        grace
                    );
                    handle.abort();
                }
            }
        });
        Ok(())
    }
}

impl std::fmt::Debug for QueueProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcess")
            .field("item", &self.item())
            .field("blocking", &self.blocking)
            .field("signal", &*self.control.borrow())
            .finish_non_exhaustive()
    }
}

//! Start-up for a single-process queue system.

use std::sync::Arc;

use actors::ProcessorFactory;
use fabric::{EventFabric, FabricConfig};
use queue_core::{QueueError, QueueResult};

use crate::config::ServiceConfig;
use crate::controller::{LocalQueueController, QueueController, RemoteQueueController};
use crate::resolver::RemoteResolver;
use crate::responder::QueueResponder;
use crate::service::QueueService;

/// A started service together with the responder serving its request channel.
#[derive(Debug)]
pub struct QueueSystem {
    pub service: QueueService,
    pub responder: QueueResponder,
}

impl QueueSystem {
    pub fn fabric(&self) -> Arc<dyn EventFabric> {
        self.service.fabric()
    }

    /// Controller calling the service directly.
    pub fn local_controller(&self) -> LocalQueueController {
        QueueController::local(self.service.clone())
    }

    /// Controller going through the request channel, as a separate
    /// process sharing the fabric would.
    pub fn remote_controller(&self) -> RemoteQueueController {
        let resolver = RemoteResolver::from_config(self.fabric(), self.service.config());
        QueueController::new(resolver, self.fabric())
    }

    /// Stop all queues, dispose the service and stop answering requests.
    pub async fn shutdown(self) -> QueueResult<()> {
        self.responder.stop();
        let disposed = self.service.dispose_service().await;
        self.service.shutdown().await;
        disposed
    }
}

/// Connect to the fabric named by `config.uri`, then initialise and start
/// a queue service with the given processors.
///
/// This should be called once at start-up, before any controller is used.
pub async fn init_queue_system(
    config: ServiceConfig,
    job_processors: ProcessorFactory,
    active_processors: ProcessorFactory,
) -> QueueResult<QueueSystem> {
    tracing::info!("Initializing queue system...");

    let Some(uri) = config.uri.clone() else {
        return Err(QueueError::IllegalState(
            "a URI is required to connect to the messaging fabric".to_string(),
        ));
    };
    let fabric = fabric::connect(FabricConfig::default().with_uri(uri))?;

    let channel = config.request_channel.clone();
    let service = QueueService::spawn(fabric, config).await?;
    service.set_job_queue_processor(job_processors).await?;
    service.set_active_queue_processor(active_processors).await?;
    service.init().await?;
    service.start().await?;

    let responder = QueueResponder::spawn(service.clone(), channel)?;
    tracing::info!("Queue system started");
    Ok(QueueSystem { service, responder })
}

use std::sync::Arc;

use fabric::{EventFabric, FabricConfig, FabricError};
use queue_core::{ItemType, QueueItem};

pub fn setup_fabric() -> Result<Arc<dyn EventFabric>, FabricError> {
    fabric::connect(FabricConfig::memory().with_uri("mem://fabric-tests"))
}

pub fn scan(name: &str) -> QueueItem {
    QueueItem::new(ItemType::Scan, name)
}

pub fn names(fabric: &dyn EventFabric, list: &str) -> Vec<String> {
    fabric
        .snapshot(list)
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect()
}

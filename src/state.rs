// Latest published resource snapshot plus a broadcast of every new one.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::models::ResourceSnapshot;

pub struct ResourceRegistry {
    current: RwLock<Arc<ResourceSnapshot>>,
    tx: broadcast::Sender<Arc<ResourceSnapshot>>,
}

impl ResourceRegistry {
    pub fn new(broadcast_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            current: RwLock::new(Arc::new(ResourceSnapshot::default())),
            tx,
        }
    }

    /// Replace the current snapshot and notify subscribers. Returns the number of receivers.
    pub fn publish(&self, snapshot: ResourceSnapshot) -> usize {
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        self.tx.send(snapshot).unwrap_or(0)
    }

    pub fn snapshot(&self) -> Arc<ResourceSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ResourceSnapshot>> {
        self.tx.subscribe()
    }
}

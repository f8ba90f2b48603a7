//! Registry of running flows

use super::Flow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct FlowRegistry {
    next_id: AtomicU64,
    flows: RwLock<BTreeMap<u64, Arc<dyn Flow>>>,
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            flows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow and return its id
    pub async fn add(&self, flow: Arc<dyn Flow>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.flows.write().await.insert(id, flow);
        id
    }

    pub async fn remove(&self, id: u64) -> Option<Arc<dyn Flow>> {
        self.flows.write().await.remove(&id)
    }

    /// Ids of all registered flows, ascending
    pub async fn ids(&self) -> Vec<u64> {
        self.flows.read().await.keys().copied().collect()
    }

    pub async fn get(&self, id: u64) -> Option<Arc<dyn Flow>> {
        self.flows.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }
}

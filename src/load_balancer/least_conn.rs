//! Least Connections load balancing strategy.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::load_balancer::{ServerPool, backend::Backend};

/// Least connections pool.
/// Selects the alive backend with the minimum number of in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnectionsPool {
    backends: RwLock<Vec<Arc<Backend>>>,
}

impl LeastConnectionsPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerPool for LeastConnectionsPool {
    fn add_backend(&self, backend: Arc<Backend>) {
        self.backends.write().push(backend);
    }

    fn backends(&self) -> Vec<Arc<Backend>> {
        self.backends.read().clone()
    }

    fn pool_size(&self) -> usize {
        self.backends.read().len()
    }

    fn next_valid_peer(&self) -> Option<Arc<Backend>> {
        // Exclusive for the whole scan-and-select.
        let backends = self.backends.write();

        // In case of tie, the first one is selected (stability)
        backends
            .iter()
            .filter(|b| b.is_alive())
            .min_by_key(|b| b.connections())
            .cloned()
    }
}

//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::load_balancer::{ServerPool, backend::Backend};

/// Round-robin pool.
/// Stores an internal cursor to rotate through backends.
#[derive(Debug, Default)]
pub struct RoundRobinPool {
    backends: RwLock<Vec<Arc<Backend>>>,
    cursor: AtomicUsize,
}

impl RoundRobinPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerPool for RoundRobinPool {
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
        let backends = self.backends.read();
        let len = backends.len();
        if len == 0 {
            return None;
        }

        // At most one full wrap, so an all-dead pool terminates.
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let backend = &backends[index];
            if backend.is_alive() {
                if offset != 0 {
                    // Resume after the backend we landed on, not the dead one we skipped.
                    self.cursor.store(index + 1, Ordering::Relaxed);
                }
                return Some(backend.clone());
            }
        }
        None
    }
}

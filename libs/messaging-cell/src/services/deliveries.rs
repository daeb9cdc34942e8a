// libs/messaging-cell/src/services/deliveries.rs
use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;

pub const DEFAULT_RECENT_DELIVERIES: usize = 4096;

/// Provider message identity: ids are only unique within one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    pub instance: String,
    pub message_id: String,
}

#[derive(Default)]
struct Recent {
    seen: HashSet<DeliveryKey>,
    order: VecDeque<DeliveryKey>,
}

/// Bounded record of provider message ids already taken for processing.
/// The oldest id is forgotten once `capacity` is reached.
pub struct RecentDeliveries {
    capacity: usize,
    recent: Mutex<Recent>,
}

impl RecentDeliveries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: Mutex::new(Recent::default()),
        }
    }

    /// Returns false when `key` was claimed before and not released.
    pub async fn claim(&self, key: &DeliveryKey) -> bool {
        let mut recent = self.recent.lock().await;
        if recent.seen.contains(key) {
            return false;
        }

        while recent.order.len() >= self.capacity {
            match recent.order.pop_front() {
                Some(oldest) => {
                    recent.seen.remove(&oldest);
                }
                None => break,
            }
        }

        recent.seen.insert(key.clone());
        recent.order.push_back(key.clone());
        true
    }

    /// Forgets a claim so the provider's retry of the same message is processed.
    pub async fn release(&self, key: &DeliveryKey) {
        let mut recent = self.recent.lock().await;
        if recent.seen.remove(key) {
            recent.order.retain(|claimed| claimed != key);
        }
    }
}

impl Default for RecentDeliveries {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_DELIVERIES)
    }
}

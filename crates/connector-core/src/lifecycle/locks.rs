use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::template::StackIdentity;

type Slot = Arc<AsyncMutex<()>>;

/// One async mutex per stack identity. Entries exist only while someone
/// holds or waits for them.
#[derive(Debug, Clone, Default)]
pub struct StackLocks {
    slots: Arc<Mutex<HashMap<StackIdentity, Slot>>>,
}

impl StackLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other lifecycle operation holds `identity`.
    pub async fn acquire(&self, identity: &StackIdentity) -> StackGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(identity.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        StackGuard {
            guard: Some(guard),
            identity: identity.clone(),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of identities currently held or awaited.
    pub fn active(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

pub struct StackGuard {
    guard: Option<OwnedMutexGuard<()>>,
    identity: StackIdentity,
    slots: Arc<Mutex<HashMap<StackIdentity, Slot>>>,
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Release first so the count below only sees the map and any waiters.
        self.guard.take();
        if let Some(slot) = slots.get(&self.identity) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.identity);
            }
        }
    }
}

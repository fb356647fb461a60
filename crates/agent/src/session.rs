//! Per-session mutual exclusion.
//!
//! At most one executor runs per session id. Different sessions never
//! contend. Slots are created on demand and pruned once nobody holds or
//! waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepvault_core::error::EngineError;
use stepvault_core::message::SessionId;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// What happens to a request for a session that is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    Reject,
    Queue { timeout: Duration },
}

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug)]
struct Inner {
    policy: BusyPolicy,
    slots: Mutex<HashMap<SessionId, Slot>>,
}

/// Registry of per-session locks.
#[derive(Clone, Debug)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new(policy: BusyPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> BusyPolicy {
        self.inner.policy
    }

    fn slot(&self, session_id: &SessionId) -> Slot {
        let mut slots = self.inner.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(session_id.clone()).or_default().clone()
    }

    /// Take the lock for `session_id`, honouring the busy policy.
    pub async fn acquire(&self, session_id: &SessionId) -> Result<SessionGuard, EngineError> {
        let slot = self.slot(session_id);
        let busy = || EngineError::ConcurrentAccessRejected(session_id.to_string());

        let guard = match self.inner.policy {
            BusyPolicy::Reject => slot.try_lock_owned().map_err(|_| busy())?,
            BusyPolicy::Queue { timeout } => tokio::time::timeout(timeout, slot.lock_owned())
                .await
                .map_err(|_| busy())?,
        };

        debug!(session_id = %session_id, "Session lock acquired");
        Ok(SessionGuard {
            registry: self.clone(),
            session_id: session_id.clone(),
            guard: Some(guard),
        })
    }

    /// Release early. Dropping the guard does the same.
    pub fn release(guard: SessionGuard) {
        drop(guard);
    }

    pub fn is_active(&self, session_id: &SessionId) -> bool {
        let slots = self.inner.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(session_id)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Sessions currently executing.
    pub fn active_count(&self) -> usize {
        let slots = self.inner.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.try_lock().is_err()).count()
    }

    fn prune(&self, session_id: &SessionId) {
        let mut slots = self.inner.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots
            .get(session_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(session_id);
        }
    }
}

/// Exclusive right to execute one session. Released on drop.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    session_id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.registry.prune(&self.session_id);
        debug!(session_id = %self.session_id, "Session lock released");
    }
}

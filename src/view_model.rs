use crate::models::{Device, EntityId, IntruderAlert, JoinRequest};
use crate::render::Badges;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Pending forced removal of one intruder alert.
#[derive(Debug)]
pub struct ExpiryTimer {
    pub token: u64,
    pub deadline: Instant,
    abort: Option<AbortHandle>,
}

impl ExpiryTimer {
    fn cancel(self) {
        if let Some(handle) = self.abort {
            handle.abort();
        }
    }
}

/// Timer the driver has to arm for a freshly rendered intruder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedExpiry {
    pub id: EntityId,
    pub token: u64,
    pub deadline: Instant,
}

/// Id-keyed record of everything currently rendered.
///
/// A node or row for id `k` is on screen iff `k` is in the matching map.
#[derive(Debug, Default)]
pub struct ViewModel {
    pub(crate) devices: HashMap<EntityId, Device>,
    pub(crate) requests: HashMap<EntityId, JoinRequest>,
    pub(crate) intruders: HashMap<EntityId, IntruderAlert>,
    expiry: HashMap<EntityId, ExpiryTimer>,
    intruders_read: bool,
    next_token: u64,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, id: EntityId) -> Option<&Device> {
        self.devices.get(&id)
    }

    #[cfg(test)]
    pub fn has_request(&self, id: EntityId) -> bool {
        self.requests.contains_key(&id)
    }

    #[cfg(test)]
    pub fn has_intruder(&self, id: EntityId) -> bool {
        self.intruders.contains_key(&id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn intruder_count(&self) -> usize {
        self.intruders.len()
    }

    #[cfg(test)]
    pub fn expiry(&self, id: EntityId) -> Option<&ExpiryTimer> {
        self.expiry.get(&id)
    }

    pub fn badges(&self) -> Badges {
        Badges {
            requests: self.requests.len(),
            intruders: self.intruders.len(),
            intruder_badge_visible: !self.intruders.is_empty() && !self.intruders_read,
        }
    }

    /// Presentation-only acknowledgment; the counts are untouched.
    pub fn mark_intruders_read(&mut self) {
        self.intruders_read = true;
    }

    pub(crate) fn mark_intruders_unread(&mut self) {
        self.intruders_read = false;
    }

    pub(crate) fn arm_expiry(&mut self, id: EntityId, now: Instant, ttl: Duration) -> ArmedExpiry {
        self.next_token += 1;
        let timer = ExpiryTimer {
            token: self.next_token,
            deadline: now + ttl,
            abort: None,
        };
        let armed = ArmedExpiry {
            id,
            token: timer.token,
            deadline: timer.deadline,
        };
        if let Some(previous) = self.expiry.insert(id, timer) {
            previous.cancel();
        }
        armed
    }

    /// Binds the task behind an armed timer. If the timer was cancelled in the
    /// meantime the task is aborted right away.
    pub fn attach_abort(&mut self, id: EntityId, token: u64, handle: AbortHandle) -> bool {
        match self.expiry.get_mut(&id) {
            Some(timer) if timer.token == token => {
                timer.abort = Some(handle);
                true
            }
            _ => {
                handle.abort();
                false
            }
        }
    }

    pub(crate) fn disarm(&mut self, id: EntityId) {
        if let Some(timer) = self.expiry.remove(&id) {
            timer.cancel();
        }
    }

    /// Consumes the timer record if `token` is still the live one.
    pub(crate) fn take_fired(&mut self, id: EntityId, token: u64) -> bool {
        match self.expiry.get(&id) {
            Some(timer) if timer.token == token => {
                self.expiry.remove(&id);
                true
            }
            _ => false,
        }
    }
}

use crate::api::Decision;
use crate::error::SyncError;
use crate::models::{EntityId, Snapshot};
use crate::reconcile::{self, DeviceDiff, IntruderDiff, RequestDiff};
use crate::render::{Level, NodeRef, Notification, Renderer};
use crate::view_model::{ArmedExpiry, ViewModel};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Identifies the session generation a fetch was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
}

/// What one applied snapshot changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub devices: DeviceDiff,
    pub requests: RequestDiff,
    pub intruders: IntruderDiff,
}

impl SnapshotReport {
    pub fn armed(&self) -> &[ArmedExpiry] {
        &self.intruders.armed
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Applied(SnapshotReport),
    Failed,
    /// The session was stopped or restarted while the fetch was in flight.
    Discarded,
}

/// Reconciliation core: owns the view model and pushes every change to its
/// renderer. Driven by [`crate::session`], but usable on its own.
pub struct StateSync<R: Renderer> {
    vm: ViewModel,
    renderer: R,
    intruder_ttl: Duration,
    active: bool,
    generation: u64,
}

impl<R: Renderer> StateSync<R> {
    pub fn new(mut renderer: R, intruder_ttl: Duration) -> Self {
        renderer.set_session_active(false);
        Self {
            vm: ViewModel::new(),
            renderer,
            intruder_ttl,
            active: false,
            generation: 0,
        }
    }

    #[cfg(test)]
    pub fn view_model(&self) -> &ViewModel {
        &self.vm
    }

    #[cfg(test)]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[cfg(test)]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Opens a new generation. Calling it on a running session is allowed and
    /// only invalidates fetches still in flight.
    pub fn start(&mut self) -> FetchTicket {
        self.generation += 1;
        if !self.active {
            info!(generation = self.generation, "session started");
        }
        self.active = true;
        self.renderer.set_session_active(true);
        self.ticket()
    }

    pub fn stop(&mut self) {
        self.generation += 1;
        if self.active {
            info!(generation = self.generation, "session stopped");
        }
        self.active = false;
        self.renderer.set_session_active(false);
    }

    pub fn ticket(&self) -> FetchTicket {
        FetchTicket {
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.generation == self.generation
    }

    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Snapshot, SyncError>,
        now: Instant,
    ) -> FetchOutcome {
        if !self.is_current(ticket) {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale fetch result"
            );
            return FetchOutcome::Discarded;
        }
        match result {
            Ok(snapshot) => FetchOutcome::Applied(self.apply_snapshot(&snapshot, now)),
            Err(err) => {
                warn!(error = %err, "status fetch failed");
                self.renderer.notify(Notification::new(
                    "Connection Error",
                    "Failed to fetch updates",
                    Level::Danger,
                ));
                FetchOutcome::Failed
            }
        }
    }

    /// Applies all three diffs as one batch, then lays out and recounts once.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot, now: Instant) -> SnapshotReport {
        let vm = &mut self.vm;
        let ttl = self.intruder_ttl;
        let report = self.renderer.batch(|r| {
            let report = SnapshotReport {
                devices: reconcile::reconcile_devices(vm, r, &snapshot.devices),
                requests: reconcile::reconcile_requests(vm, r, &snapshot.pending_requests),
                intruders: reconcile::reconcile_intruders(vm, r, snapshot.intruders(), now, ttl),
            };

            r.relayout();
            r.set_badges(vm.badges());
            r.set_network_info(&snapshot.network);

            if let Some(message) = snapshot.flash_message.as_deref().filter(|m| !m.is_empty()) {
                r.notify(
                    Notification::new("Alert", message, Level::Danger).lasting(Notification::LONG),
                );
            }
            report
        });

        debug!(
            devices = self.vm.device_count(),
            created = report.devices.created.len(),
            updated = report.devices.updated.len(),
            restyled = report.devices.restyled.len(),
            removed = report.devices.removed.len(),
            new_requests = report.requests.created.len(),
            new_intruders = report.intruders.created.len(),
            requests = self.vm.request_count(),
            intruders = self.vm.intruder_count(),
            "snapshot applied"
        );
        report
    }

    pub fn attach_expiry(&mut self, armed: ArmedExpiry, handle: AbortHandle) -> bool {
        self.vm.attach_abort(armed.id, armed.token, handle)
    }

    /// Forced removal from an expiry timer. A timer that lost the race against
    /// a snapshot removal, or belongs to an earlier incarnation of the id, is
    /// ignored.
    pub fn expire_intruder(&mut self, id: EntityId, token: u64) -> bool {
        if !self.vm.take_fired(id, token) {
            return false;
        }
        let vm = &mut self.vm;
        let removed = self.renderer.batch(|r| {
            let removed = reconcile::remove_intruder(vm, r, id);
            if removed {
                r.set_badges(vm.badges());
            }
            removed
        });
        if removed {
            debug!(%id, "intruder alert expired");
        }
        removed
    }

    /// Optimistic removal once the server accepted the decision.
    pub fn decision_succeeded(&mut self, id: EntityId, decision: Decision) -> bool {
        let removed = self.vm.requests.remove(&id).is_some();
        let notification = match decision {
            Decision::Approve => {
                Notification::new("Request Approved", "Join request approved", Level::Success)
            }
            Decision::Reject => {
                Notification::new("Request Rejected", "Join request rejected", Level::Warning)
            }
        };
        let badges = self.vm.badges();
        self.renderer.batch(|r| {
            if removed {
                r.remove_request(id);
                r.set_badges(badges);
            }
            r.notify(notification);
        });
        info!(%id, decision = decision.as_str(), "join request decided");
        removed
    }

    pub fn decision_failed(&mut self, id: EntityId, decision: Decision, err: &SyncError) {
        warn!(%id, decision = decision.as_str(), error = %err, "join request decision failed");
        self.renderer.notify(Notification::new(
            "Error",
            format!("Failed to {} request", decision.as_str()),
            Level::Danger,
        ));
    }

    pub fn acknowledge_intruders(&mut self) {
        self.vm.mark_intruders_read();
        self.renderer.set_badges(self.vm.badges());
    }

    /// Shows the record behind a device node. Router and intruder nodes carry
    /// no device record and are ignored.
    pub fn select(&mut self, node: NodeRef) -> bool {
        let NodeRef::Device(id) = node else {
            return false;
        };
        let Some(device) = self.vm.device(id) else {
            return false;
        };
        let name = device
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Unnamed Device");
        let body = format!(
            "{}\nMAC: {}\nIP: {}\nStatus: {}",
            name,
            device.mac_address,
            device.ip_address.as_deref().unwrap_or("N/A"),
            device.status,
        );
        self.renderer.notify(
            Notification::new("Device Details", body, Level::Info).lasting(Notification::LONG),
        );
        true
    }
}

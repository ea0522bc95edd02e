use crate::models::{Device, EntityId, IntruderAlert, JoinRequest, NetworkSummary};
use crate::render::{Badges, Level, NodeRef, Notification, Renderer, Transition};
use tracing::{debug, error, info, warn};

/// Headless projection: every console change becomes one log event.
#[derive(Debug, Default)]
pub struct LogRenderer {
    badges: Badges,
    member_count: Option<u64>,
}

impl Renderer for LogRenderer {
    fn set_session_active(&mut self, active: bool) {
        if active {
            info!("session active, polling");
        } else {
            info!("session not started");
        }
    }

    fn create_device(&mut self, device: &Device) {
        info!(
            id = %device.id,
            label = device.label(),
            mac = %device.mac_address,
            ip = device.ip_address.as_deref().unwrap_or("N/A"),
            status = %device.status,
            "device joined graph"
        );
    }

    fn update_device(&mut self, device: &Device) {
        info!(id = %device.id, label = device.label(), status = %device.status, "device updated");
    }

    fn remove_device(&mut self, id: EntityId) {
        info!(%id, "device left graph");
    }

    fn start_transition(&mut self, node: NodeRef, transition: Transition) {
        debug!(?node, ?transition, "transition started");
    }

    fn stop_transition(&mut self, node: NodeRef) {
        debug!(?node, "transition stopped");
    }

    fn relayout(&mut self) {}

    fn insert_request(&mut self, request: &JoinRequest) {
        info!(
            id = %request.id,
            user = %request.user_email,
            device = request.device_label(),
            ip = %request.ip_address,
            "join request pending"
        );
    }

    fn remove_request(&mut self, id: EntityId) {
        info!(%id, "join request resolved");
    }

    fn append_alert(&mut self, alert: &IntruderAlert) {
        warn!(
            id = %alert.id,
            ip = alert.ip_label(),
            mac = alert.mac_label(),
            note = alert.note_label(),
            "intruder detected"
        );
    }

    fn remove_alert(&mut self, id: EntityId) {
        info!(%id, "intruder alert cleared");
    }

    fn set_badges(&mut self, badges: Badges) {
        if badges != self.badges {
            info!(
                requests = badges.requests,
                intruders = badges.intruders,
                total = badges.total(),
                "alert counts changed"
            );
            self.badges = badges;
        }
    }

    fn set_network_info(&mut self, summary: &NetworkSummary) {
        if self.member_count != Some(summary.member_count) {
            info!(members = summary.member_count, "network membership");
            self.member_count = Some(summary.member_count);
        }
    }

    fn notify(&mut self, notification: Notification) {
        let Notification { title, body, level, .. } = notification;
        match level {
            Level::Danger => error!(%title, %body),
            Level::Warning => warn!(%title, %body),
            Level::Info | Level::Success => info!(%title, %body),
        }
    }
}

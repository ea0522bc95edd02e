use crate::models::{Device, DeviceStatus, EntityId, IntruderAlert, JoinRequest, NetworkSummary};
use crate::render::{Badges, Level, NodeRef, Notification, Renderer, Transition};
use eframe::egui::{pos2, Pos2};
use std::collections::{BTreeMap, VecDeque};
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

const DEVICE_RING: f32 = 0.62;
const INTRUDER_RING: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub label: String,
    pub status: DeviceStatus,
    /// Normalized position, router at the origin, ring radius below 1.0.
    pub pos: Pos2,
    pub transition: Option<(Transition, Instant)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub id: EntityId,
    pub user_email: String,
    pub device: String,
    pub ip_address: String,
    pub requested_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRow {
    pub id: EntityId,
    pub ip_address: String,
    pub mac_address: String,
    pub note: String,
    pub detected_at: String,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub title: String,
    pub body: String,
    pub level: Level,
    pub expires_at: Instant,
}

/// Everything the console window draws. Written by the session through
/// [`SharedView`], read by the egui thread.
#[derive(Debug)]
pub struct ConsoleView {
    pub network_name: String,
    pub session_active: bool,
    pub member_count: u64,
    pub nodes: BTreeMap<NodeRef, GraphNode>,
    pub requests: VecDeque<RequestRow>,
    pub alerts: Vec<AlertRow>,
    pub badges: Badges,
    pub toasts: Vec<Toast>,
}

impl ConsoleView {
    pub fn new(network_name: impl Into<String>) -> Self {
        let network_name = network_name.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeRef::Router,
            GraphNode {
                label: network_name.clone(),
                status: DeviceStatus::Online,
                pos: Pos2::ZERO,
                transition: None,
            },
        );
        Self {
            network_name,
            session_active: false,
            member_count: 0,
            nodes,
            requests: VecDeque::new(),
            alerts: Vec::new(),
            badges: Badges::default(),
            toasts: Vec::new(),
        }
    }

    pub fn prune_toasts(&mut self, now: Instant) {
        self.toasts.retain(|t| t.expires_at > now);
    }

    /// Places devices on an inner ring and intruders on an outer ring, both
    /// in id order so repeated layouts are stable.
    fn place_rings(&mut self) {
        let devices = self
            .nodes
            .keys()
            .filter(|n| matches!(n, NodeRef::Device(_)))
            .count();
        let intruders = self
            .nodes
            .keys()
            .filter(|n| matches!(n, NodeRef::Intruder(_)))
            .count();

        let (mut d, mut i) = (0usize, 0usize);
        for (node, entry) in self.nodes.iter_mut() {
            entry.pos = match node {
                NodeRef::Router => Pos2::ZERO,
                NodeRef::Device(_) => {
                    d += 1;
                    ring_point(d - 1, devices, DEVICE_RING)
                }
                NodeRef::Intruder(_) => {
                    i += 1;
                    ring_point(i - 1, intruders, INTRUDER_RING)
                }
            };
        }
    }
}

fn ring_point(index: usize, count: usize, radius: f32) -> Pos2 {
    let angle = TAU * index as f32 / count.max(1) as f32;
    pos2(radius * angle.cos(), radius * angle.sin())
}

fn local_time(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string()
}

impl Renderer for ConsoleView {
    fn set_session_active(&mut self, active: bool) {
        self.session_active = active;
    }

    fn create_device(&mut self, device: &Device) {
        self.nodes.insert(
            NodeRef::Device(device.id),
            GraphNode {
                label: device.label().to_string(),
                status: device.status,
                pos: Pos2::ZERO,
                transition: None,
            },
        );
    }

    fn update_device(&mut self, device: &Device) {
        if let Some(node) = self.nodes.get_mut(&NodeRef::Device(device.id)) {
            node.label = device.label().to_string();
            node.status = device.status;
        }
    }

    fn remove_device(&mut self, id: EntityId) {
        self.nodes.remove(&NodeRef::Device(id));
    }

    fn start_transition(&mut self, node: NodeRef, transition: Transition) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.transition = Some((transition, Instant::now()));
        }
    }

    fn stop_transition(&mut self, node: NodeRef) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.transition = None;
        }
    }

    fn relayout(&mut self) {
        self.place_rings();
    }

    fn insert_request(&mut self, request: &JoinRequest) {
        self.requests.push_front(RequestRow {
            id: request.id,
            user_email: request.user_email.clone(),
            device: request.device_label().to_string(),
            ip_address: request.ip_address.clone(),
            requested_at: local_time(&request.created_at),
        });
    }

    fn remove_request(&mut self, id: EntityId) {
        self.requests.retain(|row| row.id != id);
    }

    fn append_alert(&mut self, alert: &IntruderAlert) {
        self.alerts.push(AlertRow {
            id: alert.id,
            ip_address: alert.ip_label().to_string(),
            mac_address: alert.mac_label().to_string(),
            note: alert.note_label().to_string(),
            detected_at: local_time(&alert.detected_at),
        });
        self.nodes.insert(
            NodeRef::Intruder(alert.id),
            GraphNode {
                label: alert.ip_label().to_string(),
                status: DeviceStatus::Intruder,
                pos: Pos2::ZERO,
                transition: None,
            },
        );
    }

    fn remove_alert(&mut self, id: EntityId) {
        self.alerts.retain(|row| row.id != id);
        self.nodes.remove(&NodeRef::Intruder(id));
    }

    fn set_badges(&mut self, badges: Badges) {
        self.badges = badges;
    }

    fn set_network_info(&mut self, summary: &NetworkSummary) {
        self.member_count = summary.member_count;
        if let Some(name) = summary.name.as_deref().filter(|n| !n.is_empty()) {
            self.network_name = name.to_string();
            if let Some(router) = self.nodes.get_mut(&NodeRef::Router) {
                router.label = self.network_name.clone();
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.toasts.push(Toast {
            title: notification.title,
            body: notification.body,
            level: notification.level,
            expires_at: Instant::now() + notification.duration,
        });
    }
}

/// Handle shared between the session task and the window.
#[derive(Debug, Clone)]
pub struct SharedView(Arc<Mutex<ConsoleView>>);

impl SharedView {
    pub fn new(view: ConsoleView) -> Self {
        Self(Arc::new(Mutex::new(view)))
    }

    /// A panic on the other side must not take the window down with it.
    pub fn lock(&self) -> MutexGuard<'_, ConsoleView> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Renderer for SharedView {
    fn batch<T>(&mut self, f: impl FnOnce(&mut dyn Renderer) -> T) -> T {
        let mut view = self.lock();
        f(&mut *view)
    }
    fn set_session_active(&mut self, active: bool) {
        self.lock().set_session_active(active);
    }
    fn create_device(&mut self, device: &Device) {
        self.lock().create_device(device);
    }
    fn update_device(&mut self, device: &Device) {
        self.lock().update_device(device);
    }
    fn remove_device(&mut self, id: EntityId) {
        self.lock().remove_device(id);
    }
    fn start_transition(&mut self, node: NodeRef, transition: Transition) {
        self.lock().start_transition(node, transition);
    }
    fn stop_transition(&mut self, node: NodeRef) {
        self.lock().stop_transition(node);
    }
    fn relayout(&mut self) {
        self.lock().relayout();
    }
    fn insert_request(&mut self, request: &JoinRequest) {
        self.lock().insert_request(request);
    }
    fn remove_request(&mut self, id: EntityId) {
        self.lock().remove_request(id);
    }
    fn append_alert(&mut self, alert: &IntruderAlert) {
        self.lock().append_alert(alert);
    }
    fn remove_alert(&mut self, id: EntityId) {
        self.lock().remove_alert(id);
    }
    fn set_badges(&mut self, badges: Badges) {
        self.lock().set_badges(badges);
    }
    fn set_network_info(&mut self, summary: &NetworkSummary) {
        self.lock().set_network_info(summary);
    }
    fn notify(&mut self, notification: Notification) {
        self.lock().notify(notification);
    }
}

//! Capability interface between the sync core and whatever draws the console.
//!
//! The core only ever talks to a [`Renderer`]; the egui window and the headless
//! log output are two strategies for the same calls.

use crate::models::{Device, DeviceStatus, EntityId, IntruderAlert, JoinRequest, NetworkSummary};
use std::time::Duration;

/// A node of the topology graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    /// The fixed anchor every device links to.
    Router,
    Device(EntityId),
    Intruder(EntityId),
}

/// Looping status animation attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    OnlineGlow,
    PendingPulse,
    IntruderFlash,
}

impl Transition {
    /// Offline devices are drawn dimmed and carry no animation.
    pub fn for_status(status: DeviceStatus) -> Option<Self> {
        match status {
            DeviceStatus::Online => Some(Transition::OnlineGlow),
            DeviceStatus::Pending => Some(Transition::PendingPulse),
            DeviceStatus::Intruder => Some(Transition::IntruderFlash),
            DeviceStatus::Offline => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Danger,
}

/// Transient, auto-dismissing message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub level: Level,
    pub duration: Duration,
}

impl Notification {
    pub const SHORT: Duration = Duration::from_secs(3);
    pub const LONG: Duration = Duration::from_secs(5);

    pub fn new(title: impl Into<String>, body: impl Into<String>, level: Level) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            level,
            duration: Self::SHORT,
        }
    }

    pub fn lasting(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Badge state pushed after every mutation of the request or intruder sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Badges {
    pub requests: usize,
    pub intruders: usize,
    /// Cleared by acknowledging the alert list, raised again by a new intruder.
    pub intruder_badge_visible: bool,
}

impl Badges {
    pub fn total(&self) -> usize {
        self.requests + self.intruders
    }
}

pub trait Renderer {
    /// Runs a group of calls that must reach the screen together. Renderers
    /// shared with a drawing thread hold their lock for the whole group.
    fn batch<T>(&mut self, f: impl FnOnce(&mut dyn Renderer) -> T) -> T
    where
        Self: Sized,
    {
        f(self)
    }

    /// Session indicator; also drives start/stop control mutual exclusion.
    fn set_session_active(&mut self, active: bool);

    /// New graph node linked to the router anchor.
    fn create_device(&mut self, device: &Device);
    fn update_device(&mut self, device: &Device);
    fn remove_device(&mut self, id: EntityId);

    fn start_transition(&mut self, node: NodeRef, transition: Transition);
    fn stop_transition(&mut self, node: NodeRef);

    /// Called once per applied snapshot, after all graph mutations.
    fn relayout(&mut self);

    /// Sidebar row, prepended so the newest request is on top.
    fn insert_request(&mut self, request: &JoinRequest);
    fn remove_request(&mut self, id: EntityId);

    /// Alert row plus intruder node linked to the router.
    fn append_alert(&mut self, alert: &IntruderAlert);
    fn remove_alert(&mut self, id: EntityId);

    fn set_badges(&mut self, badges: Badges);
    fn set_network_info(&mut self, summary: &NetworkSummary);
    fn notify(&mut self, notification: Notification);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Session(bool),
        CreateDevice(EntityId, DeviceStatus),
        UpdateDevice(EntityId, DeviceStatus),
        RemoveDevice(EntityId),
        StartTransition(NodeRef, Transition),
        StopTransition(NodeRef),
        Relayout,
        InsertRequest(EntityId),
        RemoveRequest(EntityId),
        AppendAlert(EntityId),
        RemoveAlert(EntityId),
        Badges(Badges),
        NetworkInfo(u64),
        Notify(String, Level),
    }

    /// Keeps every call in order so tests can assert on exact operation sets.
    #[derive(Debug, Default)]
    pub struct RecordingRenderer {
        pub ops: Vec<Op>,
    }

    impl RecordingRenderer {
        pub fn take(&mut self) -> Vec<Op> {
            std::mem::take(&mut self.ops)
        }

        pub fn last_badges(&self) -> Option<Badges> {
            self.ops.iter().rev().find_map(|op| match op {
                Op::Badges(b) => Some(*b),
                _ => None,
            })
        }
    }

    impl Renderer for RecordingRenderer {
        fn set_session_active(&mut self, active: bool) {
            self.ops.push(Op::Session(active));
        }
        fn create_device(&mut self, device: &Device) {
            self.ops.push(Op::CreateDevice(device.id, device.status));
        }
        fn update_device(&mut self, device: &Device) {
            self.ops.push(Op::UpdateDevice(device.id, device.status));
        }
        fn remove_device(&mut self, id: EntityId) {
            self.ops.push(Op::RemoveDevice(id));
        }
        fn start_transition(&mut self, node: NodeRef, transition: Transition) {
            self.ops.push(Op::StartTransition(node, transition));
        }
        fn stop_transition(&mut self, node: NodeRef) {
            self.ops.push(Op::StopTransition(node));
        }
        fn relayout(&mut self) {
            self.ops.push(Op::Relayout);
        }
        fn insert_request(&mut self, request: &JoinRequest) {
            self.ops.push(Op::InsertRequest(request.id));
        }
        fn remove_request(&mut self, id: EntityId) {
            self.ops.push(Op::RemoveRequest(id));
        }
        fn append_alert(&mut self, alert: &IntruderAlert) {
            self.ops.push(Op::AppendAlert(alert.id));
        }
        fn remove_alert(&mut self, id: EntityId) {
            self.ops.push(Op::RemoveAlert(id));
        }
        fn set_badges(&mut self, badges: Badges) {
            self.ops.push(Op::Badges(badges));
        }
        fn set_network_info(&mut self, summary: &NetworkSummary) {
            self.ops.push(Op::NetworkInfo(summary.member_count));
        }
        fn notify(&mut self, notification: Notification) {
            self.ops.push(Op::Notify(notification.title, notification.level));
        }
    }
}

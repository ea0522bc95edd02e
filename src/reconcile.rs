use crate::models::{Device, EntityId, IntruderAlert, JoinRequest};
use crate::render::{NodeRef, Renderer, Transition};
use crate::view_model::{ArmedExpiry, ViewModel};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceDiff {
    pub created: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    /// Devices whose status changed, so their transition was swapped.
    pub restyled: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestDiff {
    pub created: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntruderDiff {
    pub created: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    pub armed: Vec<ArmedExpiry>,
}

/// Ids present in `rendered` but not in `incoming`, in ascending order so
/// removal output is deterministic.
fn vanished<'a>(
    rendered: impl Iterator<Item = &'a EntityId>,
    incoming: &HashSet<EntityId>,
) -> Vec<EntityId> {
    let mut gone: Vec<EntityId> = rendered.filter(|id| !incoming.contains(id)).copied().collect();
    gone.sort();
    gone
}

pub fn reconcile_devices<R: Renderer + ?Sized>(
    vm: &mut ViewModel,
    renderer: &mut R,
    incoming: &[Device],
) -> DeviceDiff {
    let mut diff = DeviceDiff::default();

    for device in incoming {
        let node = NodeRef::Device(device.id);
        match vm.devices.get_mut(&device.id) {
            None => {
                renderer.create_device(device);
                if let Some(transition) = Transition::for_status(device.status) {
                    renderer.start_transition(node, transition);
                }
                vm.devices.insert(device.id, device.clone());
                diff.created.push(device.id);
            }
            Some(current) if current != device => {
                let status_changed = current.status != device.status;
                *current = device.clone();
                renderer.update_device(device);
                if status_changed {
                    // old animation goes first so a node never runs two
                    renderer.stop_transition(node);
                    if let Some(transition) = Transition::for_status(device.status) {
                        renderer.start_transition(node, transition);
                    }
                    diff.restyled.push(device.id);
                }
                diff.updated.push(device.id);
            }
            Some(_) => {}
        }
    }

    let incoming_ids: HashSet<EntityId> = incoming.iter().map(|d| d.id).collect();
    for id in vanished(vm.devices.keys(), &incoming_ids) {
        renderer.stop_transition(NodeRef::Device(id));
        renderer.remove_device(id);
        vm.devices.remove(&id);
        diff.removed.push(id);
    }

    diff
}

pub fn reconcile_requests<R: Renderer + ?Sized>(
    vm: &mut ViewModel,
    renderer: &mut R,
    incoming: &[JoinRequest],
) -> RequestDiff {
    let mut diff = RequestDiff::default();

    let incoming_ids: HashSet<EntityId> = incoming.iter().map(|r| r.id).collect();
    for id in vanished(vm.requests.keys(), &incoming_ids) {
        renderer.remove_request(id);
        vm.requests.remove(&id);
        diff.removed.push(id);
    }

    for request in incoming {
        if let Some(known) = vm.requests.get_mut(&request.id) {
            *known = request.clone();
            continue;
        }
        renderer.insert_request(request);
        vm.requests.insert(request.id, request.clone());
        diff.created.push(request.id);
    }

    diff
}

/// Intruders leave either when the server stops listing them or when their
/// expiry fires; both paths go through [`remove_intruder`].
pub fn reconcile_intruders<R: Renderer + ?Sized>(
    vm: &mut ViewModel,
    renderer: &mut R,
    incoming: &[IntruderAlert],
    now: Instant,
    ttl: Duration,
) -> IntruderDiff {
    let mut diff = IntruderDiff::default();

    let incoming_ids: HashSet<EntityId> = incoming.iter().map(|i| i.id).collect();
    for id in vanished(vm.intruders.keys(), &incoming_ids) {
        if remove_intruder(vm, renderer, id) {
            diff.removed.push(id);
        }
    }

    for alert in incoming {
        if let Some(known) = vm.intruders.get_mut(&alert.id) {
            *known = alert.clone();
            continue;
        }
        renderer.append_alert(alert);
        renderer.start_transition(NodeRef::Intruder(alert.id), Transition::IntruderFlash);
        vm.intruders.insert(alert.id, alert.clone());
        vm.mark_intruders_unread();
        diff.armed.push(vm.arm_expiry(alert.id, now, ttl));
        diff.created.push(alert.id);
    }

    diff
}

/// Removes an intruder and cancels its timer. Returns false if it was
/// already gone.
pub fn remove_intruder<R: Renderer + ?Sized>(vm: &mut ViewModel, renderer: &mut R, id: EntityId) -> bool {
    vm.disarm(id);
    if vm.intruders.remove(&id).is_none() {
        return false;
    }
    renderer.stop_transition(NodeRef::Intruder(id));
    renderer.remove_alert(id);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;
    use crate::render::testing::{Op, RecordingRenderer};

    fn device(id: u64, status: DeviceStatus) -> Device {
        Device {
            id: EntityId(id),
            name: Some(format!("dev-{id}")),
            mac_address: format!("aa:bb:cc:dd:ee:{id:02x}"),
            ip_address: None,
            status,
            user_email: None,
        }
    }

    #[test]
    fn new_devices_are_created_once() {
        let mut vm = ViewModel::new();
        let mut renderer = RecordingRenderer::default();
        let snapshot = vec![device(1, DeviceStatus::Online), device(2, DeviceStatus::Offline)];

        let diff = reconcile_devices(&mut vm, &mut renderer, &snapshot);
        assert_eq!(diff.created, vec![EntityId(1), EntityId(2)]);
        assert_eq!(
            renderer.take(),
            vec![
                Op::CreateDevice(EntityId(1), DeviceStatus::Online),
                Op::StartTransition(NodeRef::Device(EntityId(1)), Transition::OnlineGlow),
                Op::CreateDevice(EntityId(2), DeviceStatus::Offline),
            ]
        );

        let again = reconcile_devices(&mut vm, &mut renderer, &snapshot);
        assert_eq!(again, DeviceDiff::default());
        assert!(renderer.take().is_empty());
    }

    #[test]
    fn metadata_change_keeps_transition() {
        let mut vm = ViewModel::new();
        let mut renderer = RecordingRenderer::default();
        reconcile_devices(&mut vm, &mut renderer, &[device(1, DeviceStatus::Online)]);
        renderer.take();

        let mut renamed = device(1, DeviceStatus::Online);
        renamed.name = Some("renamed".to_string());
        let diff = reconcile_devices(&mut vm, &mut renderer, &[renamed]);
        assert_eq!(diff.updated, vec![EntityId(1)]);
        assert!(diff.restyled.is_empty());
        assert_eq!(renderer.take(), vec![Op::UpdateDevice(EntityId(1), DeviceStatus::Online)]);
        assert_eq!(vm.device(EntityId(1)).unwrap().label(), "renamed");
    }

    #[test]
    fn status_change_replaces_transition() {
        let mut vm = ViewModel::new();
        let mut renderer = RecordingRenderer::default();
        reconcile_devices(&mut vm, &mut renderer, &[device(1, DeviceStatus::Pending)]);
        renderer.take();

        let diff = reconcile_devices(&mut vm, &mut renderer, &[device(1, DeviceStatus::Online)]);
        assert_eq!(diff.restyled, vec![EntityId(1)]);
        let node = NodeRef::Device(EntityId(1));
        assert_eq!(
            renderer.take(),
            vec![
                Op::UpdateDevice(EntityId(1), DeviceStatus::Online),
                Op::StopTransition(node),
                Op::StartTransition(node, Transition::OnlineGlow),
            ]
        );
    }

    #[test]
    fn absent_devices_are_removed_with_transition() {
        let mut vm = ViewModel::new();
        let mut renderer = RecordingRenderer::default();
        reconcile_devices(
            &mut vm,
            &mut renderer,
            &[device(1, DeviceStatus::Online), device(2, DeviceStatus::Online)],
        );
        renderer.take();

        let diff = reconcile_devices(&mut vm, &mut renderer, &[device(2, DeviceStatus::Online)]);
        assert_eq!(diff.removed, vec![EntityId(1)]);
        assert_eq!(
            renderer.take(),
            vec![
                Op::StopTransition(NodeRef::Device(EntityId(1))),
                Op::RemoveDevice(EntityId(1)),
            ]
        );
        assert_eq!(vm.device_count(), 1);
    }

    #[test]
    fn vanished_intruder_cancels_its_timer() {
        let mut vm = ViewModel::new();
        let mut renderer = RecordingRenderer::default();
        let t0 = Instant::now();
        let alert = IntruderAlert {
            id: EntityId(9),
            ip_address: Some("10.0.0.9".to_string()),
            mac_address: None,
            note: None,
            detected_at: chrono::Utc::now(),
        };

        let diff = reconcile_intruders(&mut vm, &mut renderer, &[alert], t0, Duration::from_secs(60));
        assert_eq!(diff.armed.len(), 1);
        assert_eq!(diff.armed[0].deadline, t0 + Duration::from_secs(60));
        let token = diff.armed[0].token;

        let diff = reconcile_intruders(&mut vm, &mut renderer, &[], t0, Duration::from_secs(60));
        assert_eq!(diff.removed, vec![EntityId(9)]);
        assert!(vm.expiry(EntityId(9)).is_none());
        // a late firing of the cancelled timer is a no-op
        assert!(!vm.take_fired(EntityId(9), token));
    }
}

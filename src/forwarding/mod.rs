//! Device forwarding logic.
//!
//! One handler per event kind, and for frame arrivals one behaviour per
//! [`DeviceKind`](crate::device::DeviceKind). Handlers mutate device tables in
//! place and describe everything else they want to happen in an [`Outcome`]:
//! events for the back of the queue, replays for the front, log lines, drops
//! and task completion. The scheduler applies the outcome.
//!
//! - [`host`] - origination, delivery and acknowledgement
//! - [`switch`] - MAC learning, unicast and path-suppressed flooding
//! - [`router`] - first-match routing, ARP buffering, TTL
//! - [`arp`] - emission of ARP requests and replies

pub mod arp;
pub mod host;
pub mod router;
pub mod switch;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::{DeviceKind, PendingPacket};
use crate::event::{Event, Path};
use crate::frame::Frame;
use crate::simulation::Task;
use crate::topology::Topology;
use crate::types::DeviceId;

/// Why a frame or event went nowhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Destination MAC or IP belongs to somebody else.
    NotAddressed,
    /// No routing-table entry contains the destination.
    NoRoute,
    /// The selected port has nothing plugged in.
    InterfaceDown,
    /// Hop budget exhausted.
    TtlExpired,
    /// A learned MAC points at a neighbour that is gone.
    StaleMacEntry,
    /// Forwarding would revisit a device already on the path.
    Loop,
    /// The neighbour an ARP reply must go back through is gone.
    BrokenAdjacency,
    /// The path is too short to find the previous hop.
    InvalidPath,
    /// A router has no route or address to ARP from.
    ArpUnroutable,
    /// Off-subnet send without a gateway.
    NoGateway,
    /// The sender has no link.
    NoConnection,
    /// A needed IP address is not configured.
    NoAddress,
    /// The event names a device that no longer exists.
    UnknownDevice,
    /// The event does not make sense for the device it names.
    InvalidEvent,
}

impl DropReason {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NotAddressed => "not_addressed",
            DropReason::NoRoute => "no_route",
            DropReason::InterfaceDown => "interface_down",
            DropReason::TtlExpired => "ttl_expired",
            DropReason::StaleMacEntry => "stale_mac_entry",
            DropReason::Loop => "loop",
            DropReason::BrokenAdjacency => "broken_adjacency",
            DropReason::InvalidPath => "invalid_path",
            DropReason::ArpUnroutable => "arp_unroutable",
            DropReason::NoGateway => "no_gateway",
            DropReason::NoConnection => "no_connection",
            DropReason::NoAddress => "no_address",
            DropReason::UnknownDevice => "unknown_device",
            DropReason::InvalidEvent => "invalid_event",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one dispatched event produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Follow-on events for the back of the queue, in emission order.
    pub enqueued: Vec<Event>,
    /// ARP-resolved replays for the front of the queue, in buffer order.
    pub replayed: Vec<Event>,
    /// The origin host received the acknowledgement for the active task.
    pub completed: bool,
    /// Human-readable trace of the step.
    pub logs: Vec<String>,
    pub drops: Vec<DropReason>,
}

impl Outcome {
    pub(crate) fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "pdusim::forwarding", "{}", message);
        self.logs.push(message);
    }

    pub(crate) fn drop_with(&mut self, reason: DropReason, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "pdusim::forwarding", reason = reason.as_str(), "{}", message);
        self.logs.push(message);
        self.drops.push(reason);
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.enqueued.push(event);
    }

    pub(crate) fn replay(&mut self, event: Event) {
        self.replayed.push(event);
    }

    pub(crate) fn complete(&mut self) {
        tracing::info!(target: "pdusim::forwarding", "task acknowledged by its origin");
        self.completed = true;
    }
}

/// Mutable view handed to every handler for the duration of one event.
pub(crate) struct Dispatcher<'a> {
    pub(crate) topology: &'a mut Topology,
    pub(crate) task: Option<Task>,
    pub(crate) out: Outcome,
}

impl<'a> Dispatcher<'a> {
    fn new(topology: &'a mut Topology, task: Option<Task>) -> Self {
        Self {
            topology,
            task,
            out: Outcome::default(),
        }
    }

    /// Logs and records an event that names a device that no longer exists.
    pub(crate) fn missing(&mut self, id: DeviceId) {
        self.out.drop_with(
            DropReason::UnknownDevice,
            format!("Device {id} no longer exists, dropping event"),
        );
    }

    /// Name of a device for log lines, tolerating removed devices.
    pub(crate) fn name_of(&self, id: DeviceId) -> String {
        self.topology
            .device(id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// Runs the handler for `event` against `topology`.
pub fn dispatch(topology: &mut Topology, task: Option<Task>, event: Event) -> Outcome {
    let mut d = Dispatcher::new(topology, task);
    match event {
        Event::Send {
            src,
            dst,
            payload,
            path,
        } => host::send(&mut d, src, dst, payload, path),
        Event::Forward {
            device,
            frame,
            path,
        } => on_frame_arrival(&mut d, device, frame, path),
        Event::ArpRequest {
            requester,
            target_ip,
            path,
        } => arp::request(&mut d, requester, target_ip, path),
        Event::ArpResponse {
            target,
            requester_ip,
            requester_mac,
            path,
        } => arp::respond(&mut d, target, requester_ip, requester_mac, path),
    }
    d.out
}

/// Hands an arriving frame to the behaviour of the receiving device's kind.
fn on_frame_arrival(d: &mut Dispatcher<'_>, device: DeviceId, frame: Frame, path: Path) {
    let Some(dev) = d.topology.device(device) else {
        d.missing(device);
        return;
    };
    let kind = dev.kind;
    let header = format!("{} {} processing frame", dev.tag(), dev.mac);
    d.out.note(header);
    d.out.note(format!("From: {} ({})", frame.src_mac, frame.src_ip));
    d.out.note(format!("To: {} ({})", frame.dst_mac, frame.dst_ip));
    match kind {
        DeviceKind::Host => host::receive(d, device, frame, path),
        DeviceKind::Switch => switch::receive(d, device, frame, path),
        DeviceKind::Router => router::receive(d, device, frame, path),
    }
}

/// Turns a parked packet back into the event that produced it.
pub(crate) fn replay_event(owner: DeviceId, packet: PendingPacket) -> Event {
    match packet {
        PendingPacket::Send { dst, payload, path } => Event::Send {
            src: owner,
            dst,
            payload,
            path,
        },
        PendingPacket::Forward { frame, path } => Event::Forward {
            device: owner,
            frame,
            path,
        },
    }
}

/// Device immediately before the last entry of `path`.
pub(crate) fn previous_hop(path: &[DeviceId]) -> Option<DeviceId> {
    path.len().checked_sub(2).map(|i| path[i])
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Payload;

    #[test]
    fn test_previous_hop() {
        assert_eq!(previous_hop(&[]), None);
        assert_eq!(previous_hop(&[DeviceId(1)]), None);
        assert_eq!(previous_hop(&[DeviceId(1), DeviceId(2)]), Some(DeviceId(1)));
        assert_eq!(
            previous_hop(&[DeviceId(1), DeviceId(2), DeviceId(3)]),
            Some(DeviceId(2))
        );
    }

    #[test]
    fn test_replay_event_keeps_kind() {
        let send = replay_event(
            DeviceId(3),
            PendingPacket::Send {
                dst: DeviceId(7),
                payload: Payload::data("Hello"),
                path: vec![DeviceId(3)],
            },
        );
        assert_eq!(send, Event::send(DeviceId(3), DeviceId(7), Payload::data("Hello")));
    }

    #[test]
    fn test_outcome_records_drops() {
        let mut out = Outcome::default();
        out.note("hello");
        out.drop_with(DropReason::NoRoute, "no route");
        assert_eq!(out.logs, vec!["hello".to_string(), "no route".to_string()]);
        assert_eq!(out.drops, vec![DropReason::NoRoute]);
        assert!(!out.completed);
    }

    #[test]
    fn test_dispatch_unknown_device() {
        let mut topo = Topology::new();
        let out = dispatch(
            &mut topo,
            None,
            Event::send(DeviceId(1), DeviceId(2), Payload::data("Hello")),
        );
        assert_eq!(out.drops, vec![DropReason::UnknownDevice]);
        assert!(out.enqueued.is_empty());
    }
}

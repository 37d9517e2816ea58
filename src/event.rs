//! Event definitions for the simulation.
//!
//! Events are the only thing the scheduler moves around. Each variant names
//! the device it concerns and carries the path of devices the logical
//! exchange has visited so far.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::frame::{Frame, Payload};
use crate::types::{DeviceId, MacAddr};

/// Ordered trace of devices visited by one logical exchange.
pub type Path = Vec<DeviceId>;

/// A unit of work for the scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A host originates `payload` towards `dst`.
    Send {
        src: DeviceId,
        dst: DeviceId,
        payload: Payload,
        path: Path,
    },
    /// `frame` arrives at `device`.
    Forward {
        device: DeviceId,
        frame: Frame,
        path: Path,
    },
    /// `requester` asks its link(s) who owns `target_ip`.
    ArpRequest {
        requester: DeviceId,
        target_ip: Ipv4Addr,
        path: Path,
    },
    /// `target` answers an ARP request received along `path`.
    ArpResponse {
        target: DeviceId,
        requester_ip: Ipv4Addr,
        requester_mac: MacAddr,
        path: Path,
    },
}

/// Discriminant of an [`Event`], handy for statistics and assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Send,
    Forward,
    ArpRequest,
    ArpResponse,
}

impl EventKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Send => "send",
            EventKind::Forward => "forward",
            EventKind::ArpRequest => "arp_request",
            EventKind::ArpResponse => "arp_response",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Creates the event that starts a task.
    pub fn send(src: DeviceId, dst: DeviceId, payload: Payload) -> Self {
        Event::Send {
            src,
            dst,
            payload,
            path: vec![src],
        }
    }

    /// Creates a frame delivery to `device`, appending it to `path`.
    pub fn forward(device: DeviceId, frame: Frame, path: &[DeviceId]) -> Self {
        let mut path = path.to_vec();
        path.push(device);
        Event::Forward {
            device,
            frame,
            path,
        }
    }

    /// Returns the discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Send { .. } => EventKind::Send,
            Event::Forward { .. } => EventKind::Forward,
            Event::ArpRequest { .. } => EventKind::ArpRequest,
            Event::ArpResponse { .. } => EventKind::ArpResponse,
        }
    }

    /// Returns the device that acts on this event.
    pub fn device(&self) -> DeviceId {
        match self {
            Event::Send { src, .. } => *src,
            Event::Forward { device, .. } => *device,
            Event::ArpRequest { requester, .. } => *requester,
            Event::ArpResponse { target, .. } => *target,
        }
    }

    /// Returns the path carried by this event.
    pub fn path(&self) -> &[DeviceId] {
        match self {
            Event::Send { path, .. }
            | Event::Forward { path, .. }
            | Event::ArpRequest { path, .. }
            | Event::ArpResponse { path, .. } => path,
        }
    }

    /// Returns the frame if this is a delivery.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Event::Forward { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Send {
                src, dst, payload, ..
            } => write!(f, "send {src} -> {dst} [{payload}]"),
            Event::Forward { device, frame, .. } => write!(f, "forward to {device}: {frame}"),
            Event::ArpRequest {
                requester,
                target_ip,
                ..
            } => write!(f, "arp request from {requester} for {target_ip}"),
            Event::ArpResponse {
                target,
                requester_ip,
                ..
            } => write!(f, "arp response from {target} to {requester_ip}"),
        }
    }
}

//! Topology store.
//!
//! Owns every device and wire of one simulation and is the only place where
//! adjacency changes. A device's `connections` and `ports` are always updated
//! together so the two views never disagree.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::device::{Device, DeviceKind, Interface, Route};
use crate::types::{DeviceId, MacAddr, PortIndex, WireId, MAX_PORTS};

/// Errors raised by the mutation API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("cannot connect device {0} to itself")]
    SelfLink(DeviceId),

    #[error("devices {0} and {1} are already connected")]
    AlreadyConnected(DeviceId, DeviceId),

    #[error("devices {0} and {1} are not connected")]
    NotConnected(DeviceId, DeviceId),

    #[error("device {0} has no free port")]
    NoFreePort(DeviceId),

    #[error("port {port} is out of range")]
    PortOutOfRange { port: PortIndex },

    #[error("{field} cannot be configured on a {kind}")]
    FieldNotApplicable { field: &'static str, kind: DeviceKind },

    #[error("device name {0:?} is already taken")]
    DuplicateName(String),
}

/// Result type for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// A cable between two devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub id: WireId,
    pub a: DeviceId,
    pub b: DeviceId,
    /// Port used on `a`, `None` for port-less devices.
    pub port_a: Option<PortIndex>,
    /// Port used on `b`, `None` for port-less devices.
    pub port_b: Option<PortIndex>,
}

impl Wire {
    /// True if the wire joins `x` and `y`, in either order.
    pub fn joins(&self, x: DeviceId, y: DeviceId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    /// True if `id` is one of the two ends.
    pub fn touches(&self, id: DeviceId) -> bool {
        self.a == id || self.b == id
    }
}

/// Partial configuration applied to a device.
///
/// Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: Option<String>,
    pub ip: Option<Ipv4Addr>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub interfaces: Option<BTreeMap<PortIndex, Interface>>,
    pub routing_table: Option<Vec<Route>>,
    pub static_arp: Option<BTreeMap<Ipv4Addr, MacAddr>>,
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets address and mask in one go.
    pub fn address(mut self, ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.ip = Some(ip);
        self.subnet_mask = Some(mask);
        self
    }

    pub fn gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn interface(mut self, port: PortIndex, ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.interfaces
            .get_or_insert_with(BTreeMap::new)
            .insert(port, Interface::new(ip, mask));
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routing_table.get_or_insert_with(Vec::new).push(route);
        self
    }

    pub fn static_arp(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.static_arp
            .get_or_insert_with(BTreeMap::new)
            .insert(ip, mac);
        self
    }

    fn validate_for(&self, kind: DeviceKind) -> TopologyResult<()> {
        if self.gateway.is_some() && kind != DeviceKind::Host {
            return Err(TopologyError::FieldNotApplicable {
                field: "gateway",
                kind,
            });
        }
        if let Some(interfaces) = &self.interfaces {
            if kind != DeviceKind::Router {
                return Err(TopologyError::FieldNotApplicable {
                    field: "interfaces",
                    kind,
                });
            }
            if let Some(&port) = interfaces.keys().find(|p| **p >= MAX_PORTS) {
                return Err(TopologyError::PortOutOfRange { port });
            }
        }
        if let Some(routes) = &self.routing_table {
            if kind != DeviceKind::Router {
                return Err(TopologyError::FieldNotApplicable {
                    field: "routing_table",
                    kind,
                });
            }
            if let Some(route) = routes.iter().find(|r| r.interface >= MAX_PORTS) {
                return Err(TopologyError::PortOutOfRange {
                    port: route.interface,
                });
            }
        }
        if self.static_arp.is_some() && kind == DeviceKind::Switch {
            return Err(TopologyError::FieldNotApplicable {
                field: "static_arp",
                kind,
            });
        }
        Ok(())
    }
}

/// Devices, wires and adjacency of one simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    devices: BTreeMap<DeviceId, Device>,
    wires: Vec<Wire>,
    next_device_id: u64,
    next_wire_id: u64,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device with the given hardware address.
    ///
    /// Unnamed devices are called `<kind>-<id>`.
    pub fn add_device(
        &mut self,
        kind: DeviceKind,
        mac: MacAddr,
        name: Option<String>,
    ) -> TopologyResult<DeviceId> {
        let id = DeviceId(self.next_device_id + 1);
        let name = name.unwrap_or_else(|| format!("{}-{}", kind, id.0));
        if self.device_by_name(&name).is_some() {
            return Err(TopologyError::DuplicateName(name));
        }
        self.next_device_id = id.0;
        self.devices.insert(id, Device::new(id, name, kind, mac));
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    /// Looks a device up, failing with [`TopologyError::UnknownDevice`].
    pub fn get(&self, id: DeviceId) -> TopologyResult<&Device> {
        self.device(id).ok_or(TopologyError::UnknownDevice(id))
    }

    /// Iterates devices in id order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Wires with `id` at one end.
    pub fn wires_of(&self, id: DeviceId) -> impl Iterator<Item = &Wire> {
        self.wires.iter().filter(move |w| w.touches(id))
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.name == name)
    }

    pub fn device_by_mac(&self, mac: MacAddr) -> Option<&Device> {
        self.devices.values().find(|d| d.mac == mac)
    }

    /// Host configured with `ip`.
    pub fn device_by_ip(&self, ip: Ipv4Addr) -> Option<&Device> {
        self.devices.values().find(|d| d.ip == Some(ip))
    }

    pub fn wire_between(&self, a: DeviceId, b: DeviceId) -> Option<&Wire> {
        self.wires.iter().find(|w| w.joins(a, b))
    }

    /// Connects two devices, taking the lowest free port on ported devices.
    pub fn connect(&mut self, a: DeviceId, b: DeviceId) -> TopologyResult<WireId> {
        if a == b {
            return Err(TopologyError::SelfLink(a));
        }
        let dev_a = self.get(a)?;
        let dev_b = self.get(b)?;
        if dev_a.is_connected_to(b) {
            return Err(TopologyError::AlreadyConnected(a, b));
        }
        let port_a = free_port_for(dev_a)?;
        let port_b = free_port_for(dev_b)?;

        for (id, port, peer) in [(a, port_a, b), (b, port_b, a)] {
            let dev = self.devices.get_mut(&id).ok_or(TopologyError::UnknownDevice(id))?;
            if let Some(port) = port {
                dev.ports[port] = Some(peer);
            }
            dev.connections.push(peer);
        }

        self.next_wire_id += 1;
        let id = WireId(self.next_wire_id);
        self.wires.push(Wire {
            id,
            a,
            b,
            port_a,
            port_b,
        });
        Ok(id)
    }

    /// Removes the wire between two devices, clearing both ends.
    pub fn disconnect(&mut self, a: DeviceId, b: DeviceId) -> TopologyResult<()> {
        self.get(a)?;
        self.get(b)?;
        if self.wire_between(a, b).is_none() {
            return Err(TopologyError::NotConnected(a, b));
        }
        for (id, peer) in [(a, b), (b, a)] {
            if let Some(dev) = self.devices.get_mut(&id) {
                dev.connections.retain(|c| *c != peer);
                for port in dev.ports.iter_mut().filter(|p| **p == Some(peer)) {
                    *port = None;
                }
            }
        }
        self.wires.retain(|w| !w.joins(a, b));
        Ok(())
    }

    /// Removes a device after disconnecting all of its wires.
    pub fn remove_device(&mut self, id: DeviceId) -> TopologyResult<Device> {
        let neighbors = self.get(id)?.connections.clone();
        for peer in neighbors {
            self.disconnect(id, peer)?;
        }
        self.devices
            .remove(&id)
            .ok_or(TopologyError::UnknownDevice(id))
    }

    /// Applies `config` to a device. Nothing changes if validation fails.
    pub fn configure(&mut self, id: DeviceId, config: &DeviceConfig) -> TopologyResult<()> {
        let kind = self.get(id)?.kind;
        config.validate_for(kind)?;
        if let Some(name) = &config.name {
            if self.devices.values().any(|d| d.id != id && &d.name == name) {
                return Err(TopologyError::DuplicateName(name.clone()));
            }
        }

        let dev = self.devices.get_mut(&id).ok_or(TopologyError::UnknownDevice(id))?;
        if let Some(name) = &config.name {
            dev.name = name.clone();
        }
        if let Some(ip) = config.ip {
            dev.ip = Some(ip);
        }
        if let Some(mask) = config.subnet_mask {
            dev.subnet_mask = Some(mask);
        }
        if let Some(gateway) = config.gateway {
            dev.gateway = Some(gateway);
        }
        if let Some(interfaces) = &config.interfaces {
            dev.interfaces.extend(interfaces.iter().map(|(p, i)| (*p, *i)));
        }
        if let Some(routes) = &config.routing_table {
            dev.routing_table = routes.clone();
        }
        if let Some(entries) = &config.static_arp {
            dev.arp_table.extend(entries.iter().map(|(ip, mac)| (*ip, *mac)));
        }
        Ok(())
    }

    /// True if `to` can be reached from `from` over wires.
    pub fn is_reachable(&self, from: DeviceId, to: DeviceId) -> bool {
        if !self.devices.contains_key(&from) || !self.devices.contains_key(&to) {
            return false;
        }
        let mut seen = HashSet::from([from]);
        let mut frontier = VecDeque::from([from]);
        while let Some(id) = frontier.pop_front() {
            if id == to {
                return true;
            }
            if let Some(dev) = self.devices.get(&id) {
                for &next in &dev.connections {
                    if seen.insert(next) {
                        frontier.push_back(next);
                    }
                }
            }
        }
        false
    }
}

fn free_port_for(dev: &Device) -> TopologyResult<Option<PortIndex>> {
    if !dev.kind.has_ports() {
        return Ok(None);
    }
    dev.free_port()
        .map(Some)
        .ok_or(TopologyError::NoFreePort(dev.id))
}

//! Device definitions.
//!
//! A device is a host, a switch or a router. All three share one record: the
//! forwarding behaviour is selected by [`DeviceKind`] and the fields a kind
//! does not use simply stay empty.

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::event::Path;
use crate::frame::{Frame, Payload};
use crate::types::{DeviceId, MacAddr, PortIndex, MAX_PORTS};

/// The kind of a device, which decides how it treats an arriving frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Host,
    Switch,
    Router,
}

impl DeviceKind {
    /// Switches and routers have a fixed set of numbered ports; hosts do not.
    pub fn has_ports(&self) -> bool {
        matches!(self, DeviceKind::Switch | DeviceKind::Router)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Host => "host",
            DeviceKind::Switch => "switch",
            DeviceKind::Router => "router",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address configuration of one router port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Interface {
    pub fn new(ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { ip, mask }
    }
}

/// One routing-table entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination network, e.g. `10.0.0.0/24`.
    pub network: Ipv4Network,
    /// Egress port.
    pub interface: PortIndex,
    /// Parsed from configuration but not consulted: ARP always resolves the
    /// packet's destination address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<Ipv4Addr>,
}

impl Route {
    pub fn new(network: Ipv4Network, interface: PortIndex) -> Self {
        Self {
            network,
            interface,
            next_hop: None,
        }
    }

    pub fn with_next_hop(mut self, next_hop: Ipv4Addr) -> Self {
        self.next_hop = Some(next_hop);
        self
    }
}

/// Traffic parked on a device until an ARP answer arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingPacket {
    /// A host send that could not be addressed yet.
    Send {
        dst: DeviceId,
        payload: Payload,
        path: Path,
    },
    /// A frame a router could not put on the wire yet.
    Forward { frame: Frame, path: Path },
}

/// A network device and all of its tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    /// Router port configuration.
    pub interfaces: BTreeMap<PortIndex, Interface>,
    /// Neighbour on each port; empty for hosts.
    pub ports: Vec<Option<DeviceId>>,
    /// Neighbours in connection order.
    pub connections: Vec<DeviceId>,
    pub arp_table: BTreeMap<Ipv4Addr, MacAddr>,
    pub mac_table: BTreeMap<MacAddr, DeviceId>,
    pub routing_table: Vec<Route>,
    pub pending_packets: BTreeMap<Ipv4Addr, Vec<PendingPacket>>,
}

impl Device {
    /// Creates an unconfigured, unconnected device.
    pub fn new(id: DeviceId, name: impl Into<String>, kind: DeviceKind, mac: MacAddr) -> Self {
        let ports = if kind.has_ports() {
            vec![None; MAX_PORTS]
        } else {
            Vec::new()
        };
        Self {
            id,
            name: name.into(),
            kind,
            mac,
            ip: None,
            subnet_mask: None,
            gateway: None,
            interfaces: BTreeMap::new(),
            ports,
            connections: Vec::new(),
            arp_table: BTreeMap::new(),
            mac_table: BTreeMap::new(),
            routing_table: Vec::new(),
            pending_packets: BTreeMap::new(),
        }
    }

    /// Returns true if `other` is a direct neighbour.
    pub fn is_connected_to(&self, other: DeviceId) -> bool {
        self.connections.contains(&other)
    }

    /// Lowest unused port, if the device has ports and one is free.
    pub fn free_port(&self) -> Option<PortIndex> {
        self.ports.iter().position(Option::is_none)
    }

    /// Port on which `neighbor` is attached.
    pub fn port_of(&self, neighbor: DeviceId) -> Option<PortIndex> {
        self.ports.iter().position(|p| *p == Some(neighbor))
    }

    /// Neighbour attached to `port`.
    pub fn neighbor_on(&self, port: PortIndex) -> Option<DeviceId> {
        self.ports.get(port).copied().flatten()
    }

    /// First routing-table entry whose network contains `ip`.
    ///
    /// Entries are scanned in configured order; no longest-prefix selection.
    pub fn route_for(&self, ip: Ipv4Addr) -> Option<&Route> {
        self.routing_table.iter().find(|r| r.network.contains(ip))
    }

    /// Address this device uses as the source when talking to `dst`.
    ///
    /// Routers pick the interface their routing table selects for `dst`,
    /// falling back to their lowest configured interface; everything else
    /// uses its own address.
    pub fn source_ip_for(&self, dst: Ipv4Addr) -> Option<Ipv4Addr> {
        if !self.routing_table.is_empty() && !self.interfaces.is_empty() {
            let routed = self
                .route_for(dst)
                .and_then(|r| self.interfaces.get(&r.interface));
            return routed
                .or_else(|| self.interfaces.values().next())
                .map(|intf| intf.ip);
        }
        self.ip
    }

    /// True if `ip` lies in this host's own subnet.
    ///
    /// Without an address or mask nothing is local.
    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        match (self.ip, self.subnet_mask) {
            (Some(own), Some(mask)) => same_subnet(own, ip, mask),
            _ => false,
        }
    }

    /// True if one of the router's interfaces is configured with `ip`.
    pub fn owns_interface_ip(&self, ip: Ipv4Addr) -> bool {
        self.interfaces.values().any(|intf| intf.ip == ip)
    }

    /// Parks a packet until `ip` is resolved.
    pub fn buffer(&mut self, ip: Ipv4Addr, packet: PendingPacket) {
        self.pending_packets.entry(ip).or_default().push(packet);
    }

    /// Removes and returns everything parked for `ip`, in arrival order.
    pub fn drain_pending(&mut self, ip: Ipv4Addr) -> Vec<PendingPacket> {
        self.pending_packets.remove(&ip).unwrap_or_default()
    }

    /// Short tag used as the prefix of log lines, e.g. `[HOST 192.168.1.10]`.
    pub fn tag(&self) -> String {
        match (self.kind, self.ip) {
            (DeviceKind::Host, Some(ip)) => format!("[HOST {ip}]"),
            (DeviceKind::Host, None) => format!("[HOST {}]", self.name),
            (DeviceKind::Switch, _) => format!("[SWITCH {}]", self.name),
            (DeviceKind::Router, _) => format!("[ROUTER {}]", self.name),
        }
    }
}

/// True if `a` and `b` agree on every bit set in `mask`.
pub fn same_subnet(a: Ipv4Addr, b: Ipv4Addr, mask: Ipv4Addr) -> bool {
    let mask = u32::from(mask);
    u32::from(a) & mask == u32::from(b) & mask
}

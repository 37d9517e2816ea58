//! Frame model.
//!
//! A frame is the unit a device receives. No bytes are modelled: only the
//! addressing fields the forwarding logic inspects and a symbolic payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::types::{MacAddr, DEFAULT_TTL};

/// What a frame carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Application data, e.g. `"Hello"`.
    Data(String),
    /// Broadcast query for the hardware address owning `dst_ip`.
    ArpRequest,
    /// Unicast answer to an [`Payload::ArpRequest`].
    ArpResponse,
    /// Acknowledgement of received application data.
    Ack,
}

impl Payload {
    /// Builds an application payload.
    pub fn data(text: impl Into<String>) -> Self {
        Payload::Data(text.into())
    }

    /// Returns true for ARP control payloads.
    pub fn is_arp(&self) -> bool {
        matches!(self, Payload::ArpRequest | Payload::ArpResponse)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Data(text) => write!(f, "{text}"),
            Payload::ArpRequest => write!(f, "ARP_REQUEST"),
            Payload::ArpResponse => write!(f, "ARP_RESPONSE"),
            Payload::Ack => write!(f, "ACK"),
        }
    }
}

/// A link-layer frame with its IP addressing.
///
/// Frames are treated as immutable; a router hop produces a new frame via
/// [`Frame::rewrite_for_hop`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub payload: Payload,
    pub ttl: u8,
}

impl Frame {
    /// Creates a frame with the default TTL.
    pub fn new(
        src_mac: MacAddr,
        dst_mac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        payload: Payload,
    ) -> Self {
        Self {
            src_mac,
            dst_mac,
            src_ip,
            dst_ip,
            payload,
            ttl: DEFAULT_TTL,
        }
    }

    /// Creates a broadcast ARP request asking who owns `target_ip`.
    pub fn arp_request(src_mac: MacAddr, src_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self::new(src_mac, MacAddr::BROADCAST, src_ip, target_ip, Payload::ArpRequest)
    }

    /// Returns a copy with a different TTL.
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builds the frame a router emits on its egress interface: new link-layer
    /// addresses, unchanged IP addresses and payload, one hop consumed.
    ///
    /// Returns `None` when the hop budget is exhausted.
    pub fn rewrite_for_hop(&self, src_mac: MacAddr, dst_mac: MacAddr) -> Option<Frame> {
        let ttl = self.ttl.checked_sub(1).filter(|ttl| *ttl > 0)?;
        Some(Frame {
            src_mac,
            dst_mac,
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            payload: self.payload.clone(),
            ttl,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({}) [{}] ttl={}",
            self.src_mac, self.src_ip, self.dst_mac, self.dst_ip, self.payload, self.ttl
        )
    }
}

//! Address resolution.
//!
//! Routers send a request only out of the interface their routing table picks
//! for the target and source it from that interface's address. Everything
//! else broadcasts on every link. Replies travel back strictly through the
//! neighbour the request came in from; nothing is retried or re-routed.

use std::net::Ipv4Addr;

use super::{previous_hop, Dispatcher, DropReason};
use crate::device::DeviceKind;
use crate::event::{Event, Path};
use crate::frame::{Frame, Payload};
use crate::types::{DeviceId, MacAddr};

/// Handles [`Event::ArpRequest`].
pub(crate) fn request(d: &mut Dispatcher<'_>, requester: DeviceId, target_ip: Ipv4Addr, path: Path) {
    let Some(dev) = d.topology.device(requester) else {
        d.missing(requester);
        return;
    };
    d.out
        .note(format!("[ARP] Request from {} for {target_ip}", dev.tag()));

    if dev.kind == DeviceKind::Router {
        let Some(route) = dev.route_for(target_ip) else {
            d.out.drop_with(
                DropReason::ArpUnroutable,
                format!("[ARP] No route to {target_ip}, dropping request"),
            );
            return;
        };
        let Some(source_ip) = dev.interfaces.get(&route.interface).map(|i| i.ip) else {
            d.out.drop_with(
                DropReason::ArpUnroutable,
                format!(
                    "[ARP] Interface {} has no address, dropping request",
                    route.interface
                ),
            );
            return;
        };
        let Some(egress) = dev.neighbor_on(route.interface) else {
            d.out.drop_with(
                DropReason::InterfaceDown,
                format!("[ARP] Interface {} not connected", route.interface),
            );
            return;
        };
        let frame = Frame::arp_request(dev.mac, source_ip, target_ip);
        d.out.emit(Event::forward(egress, frame, &path));
        return;
    }

    let Some(source_ip) = dev.ip else {
        d.out.drop_with(
            DropReason::NoAddress,
            format!("[ARP] {} has no IP address to ask from", dev.tag()),
        );
        return;
    };
    if dev.connections.is_empty() {
        d.out.drop_with(
            DropReason::NoConnection,
            format!("[ARP] {} has no connection to broadcast on", dev.tag()),
        );
        return;
    }
    let frame = Frame::arp_request(dev.mac, source_ip, target_ip);
    let links = dev.connections.clone();
    d.out
        .note("[ARP] Broadcasting request through connected devices");
    for link in links {
        d.out.emit(Event::forward(link, frame.clone(), &path));
    }
}

/// Handles [`Event::ArpResponse`].
pub(crate) fn respond(
    d: &mut Dispatcher<'_>,
    target: DeviceId,
    requester_ip: Ipv4Addr,
    requester_mac: MacAddr,
    path: Path,
) {
    let Some(dev) = d.topology.device(target) else {
        d.missing(target);
        return;
    };
    let tag = dev.tag();
    d.out
        .note(format!("[ARP] {tag} responding to {requester_ip}"));

    let Some(last_hop) = previous_hop(&path) else {
        d.out.drop_with(
            DropReason::InvalidPath,
            "[ARP] Invalid path for response",
        );
        return;
    };
    if !dev.is_connected_to(last_hop) {
        let message = format!(
            "[ARP] {tag} has no connection to {}, dropping response",
            d.name_of(last_hop)
        );
        d.out.drop_with(DropReason::BrokenAdjacency, message);
        return;
    }
    let Some(source_ip) = dev.source_ip_for(requester_ip) else {
        d.out.drop_with(
            DropReason::NoAddress,
            format!("[ARP] {tag} has no address to answer from"),
        );
        return;
    };

    let frame = Frame::new(
        dev.mac,
        requester_mac,
        source_ip,
        requester_ip,
        Payload::ArpResponse,
    );
    let message = format!("[ARP] Sending response through {}", d.name_of(last_hop));
    d.out.note(message);
    d.out.emit(Event::forward(last_hop, frame, &[target]));
}

//! Router behaviour.
//!
//! Answers ARP for its interface addresses, routes frames addressed to its
//! own MAC by first-match over the routing table, parks frames whose next hop
//! is unresolved, and rewrites link-layer addresses and TTL on egress.

use super::{replay_event, Dispatcher, DropReason};
use crate::device::PendingPacket;
use crate::event::{Event, Path};
use crate::frame::{Frame, Payload};
use crate::types::DeviceId;

pub(crate) fn receive(d: &mut Dispatcher<'_>, id: DeviceId, frame: Frame, path: Path) {
    let Some(router) = d.topology.device_mut(id) else {
        d.missing(id);
        return;
    };
    let tag = router.tag();

    match frame.payload {
        Payload::ArpResponse => {
            if frame.dst_mac != router.mac && !frame.dst_mac.is_broadcast() {
                d.out.drop_with(
                    DropReason::NotAddressed,
                    format!("{tag} ARP response not addressed to us, dropping"),
                );
                return;
            }
            d.out
                .note(format!("{tag} Received ARP response for {}", frame.src_ip));
            router.arp_table.insert(frame.src_ip, frame.src_mac);
            let parked = router.drain_pending(frame.src_ip);
            if !parked.is_empty() {
                d.out.note(format!(
                    "{tag} Re-forwarding {} buffered frame(s) for {}",
                    parked.len(),
                    frame.src_ip
                ));
            }
            for packet in parked {
                d.out.replay(replay_event(id, packet));
            }
            return;
        }
        Payload::ArpRequest => {
            if !frame.dst_mac.is_broadcast() {
                d.out.drop_with(
                    DropReason::NotAddressed,
                    format!("{tag} Unicast ARP request ignored"),
                );
                return;
            }
            // learn the requester even when the question is not for us
            router.arp_table.insert(frame.src_ip, frame.src_mac);
            if router.owns_interface_ip(frame.dst_ip) {
                d.out
                    .note(format!("{tag} {} responding to ARP", frame.dst_ip));
                d.out.emit(Event::ArpResponse {
                    target: id,
                    requester_ip: frame.src_ip,
                    requester_mac: frame.src_mac,
                    path,
                });
            } else {
                d.out.drop_with(
                    DropReason::NotAddressed,
                    format!("{tag} ARP request for {} is not for us", frame.dst_ip),
                );
            }
            return;
        }
        Payload::Ack | Payload::Data(_) => {}
    }

    if frame.dst_mac != router.mac {
        d.out.drop_with(
            DropReason::NotAddressed,
            format!("{tag} Frame not addressed to us, dropping"),
        );
        return;
    }
    if frame.ttl <= 1 {
        d.out.drop_with(
            DropReason::TtlExpired,
            format!("{tag} Packet TTL expired, dropping"),
        );
        return;
    }

    d.out.note(format!("{tag} Processing IP packet"));
    let Some(route) = router.route_for(frame.dst_ip) else {
        d.out.drop_with(
            DropReason::NoRoute,
            format!("{tag} No route found for {}, dropping packet", frame.dst_ip),
        );
        return;
    };
    let interface = route.interface;
    d.out.note(format!("{tag} Routing to interface {interface}"));

    let Some(egress) = router.neighbor_on(interface) else {
        d.out.drop_with(
            DropReason::InterfaceDown,
            format!("{tag} Interface {interface} not connected, dropping"),
        );
        return;
    };

    // The route's next hop is never consulted; ARP resolves the final
    // destination address directly.
    let next_hop_ip = frame.dst_ip;

    let Some(next_mac) = router.arp_table.get(&next_hop_ip).copied() else {
        d.out
            .note(format!("{tag} ARP lookup needed for {next_hop_ip}"));
        d.out.note(format!("{tag} Buffering packet and sending ARP"));
        router.buffer(
            next_hop_ip,
            PendingPacket::Forward {
                frame,
                path: path.clone(),
            },
        );
        d.out.emit(Event::ArpRequest {
            requester: id,
            target_ip: next_hop_ip,
            path,
        });
        return;
    };

    match frame.rewrite_for_hop(router.mac, next_mac) {
        Some(next) => {
            d.out.note(format!(
                "{tag} Forwarding on interface {interface} with ttl {}",
                next.ttl
            ));
            d.out.emit(Event::forward(egress, next, &path));
        }
        None => d.out.drop_with(
            DropReason::TtlExpired,
            format!("{tag} Packet TTL expired, dropping"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::dispatch;
    use super::super::fixtures::*;
    use super::*;
    use crate::device::Route;
    use crate::topology::{DeviceConfig, Topology};
    use crate::types::{MacAddr, DEFAULT_TTL};

    /// r(1) with 192.168.1.1 on port 0 towards s(2) and 10.0.0.1 on port 1
    /// towards c(3).
    fn two_port_router(topo: &mut Topology) -> (DeviceId, DeviceId, DeviceId) {
        let r = router(topo, 1);
        let s = switch(topo, 2);
        let c = host(topo, 3, "10.0.0.10");
        topo.connect(r, s).unwrap();
        topo.connect(r, c).unwrap();
        let config = DeviceConfig::new()
            .interface(0, ip("192.168.1.1"), ip("255.255.255.0"))
            .interface(1, ip("10.0.0.1"), ip("255.255.255.0"))
            .route(Route::new("192.168.1.0/24".parse().unwrap(), 0))
            .route(Route::new("10.0.0.0/24".parse().unwrap(), 1));
        topo.configure(r, &config).unwrap();
        (r, s, c)
    }

    fn to_router(dst_ip: &str) -> Frame {
        Frame::new(
            mac(9),
            mac(1),
            ip("192.168.1.10"),
            ip(dst_ip),
            Payload::data("Hello"),
        )
    }

    #[test]
    fn test_answers_arp_for_own_interface() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);
        let req = Frame::arp_request(mac(9), ip("192.168.1.10"), ip("192.168.1.1"));

        let out = dispatch(&mut topo, None, Event::forward(r, req, &[DeviceId(9), s]));
        assert!(matches!(&out.enqueued[..], [Event::ArpResponse { target, .. }] if *target == r));
        assert_eq!(
            topo.device(r).unwrap().arp_table.get(&ip("192.168.1.10")),
            Some(&mac(9))
        );
    }

    #[test]
    fn test_ignores_arp_for_other_addresses() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);
        let req = Frame::arp_request(mac(9), ip("192.168.1.10"), ip("192.168.1.11"));

        let out = dispatch(&mut topo, None, Event::forward(r, req, &[DeviceId(9), s]));
        assert!(out.enqueued.is_empty());
        assert_eq!(out.drops, vec![DropReason::NotAddressed]);
    }

    #[test]
    fn test_drops_frames_for_other_macs() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);
        let mut frame = to_router("10.0.0.10");
        frame.dst_mac = mac(42);

        let out = dispatch(&mut topo, None, Event::forward(r, frame, &[s]));
        assert_eq!(out.drops, vec![DropReason::NotAddressed]);
    }

    #[test]
    fn test_unresolved_next_hop_buffers_and_requests() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);

        let out = dispatch(&mut topo, None, Event::forward(r, to_router("10.0.0.10"), &[s]));
        assert_eq!(
            out.enqueued,
            vec![Event::ArpRequest {
                requester: r,
                target_ip: ip("10.0.0.10"),
                path: vec![s, r],
            }]
        );
        let parked = &topo.device(r).unwrap().pending_packets[&ip("10.0.0.10")];
        assert!(matches!(&parked[..], [PendingPacket::Forward { .. }]));
    }

    #[test]
    fn test_resolved_next_hop_rewrites_frame() {
        let mut topo = Topology::new();
        let (r, s, c) = two_port_router(&mut topo);
        topo.device_mut(r)
            .unwrap()
            .arp_table
            .insert(ip("10.0.0.10"), mac(3));

        let out = dispatch(&mut topo, None, Event::forward(r, to_router("10.0.0.10"), &[s]));
        let [Event::Forward { device, frame, path }] = &out.enqueued[..] else {
            panic!("expected a forward, got {:?}", out.enqueued);
        };
        assert_eq!(*device, c);
        assert_eq!(path, &vec![s, r, c]);
        assert_eq!(frame.src_mac, mac(1));
        assert_eq!(frame.dst_mac, mac(3));
        assert_eq!(frame.src_ip, ip("192.168.1.10"));
        assert_eq!(frame.dst_ip, ip("10.0.0.10"));
        assert_eq!(frame.ttl, DEFAULT_TTL - 1);
    }

    #[test]
    fn test_arp_response_replays_buffered_frames() {
        let mut topo = Topology::new();
        let (r, s, c) = two_port_router(&mut topo);
        dispatch(&mut topo, None, Event::forward(r, to_router("10.0.0.10"), &[s]));

        let reply = Frame::new(
            mac(3),
            mac(1),
            ip("10.0.0.10"),
            ip("10.0.0.1"),
            Payload::ArpResponse,
        );
        let out = dispatch(&mut topo, None, Event::forward(r, reply, &[c]));
        assert_eq!(
            out.replayed,
            vec![Event::Forward {
                device: r,
                frame: to_router("10.0.0.10"),
                path: vec![s, r],
            }]
        );
        assert!(topo.device(r).unwrap().pending_packets.is_empty());
    }

    #[test]
    fn test_no_route_drops() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);
        let out = dispatch(&mut topo, None, Event::forward(r, to_router("172.16.0.1"), &[s]));
        assert_eq!(out.drops, vec![DropReason::NoRoute]);
        assert!(out.logs.iter().any(|l| l.contains("No route")));
    }

    #[test]
    fn test_disconnected_interface_drops() {
        let mut topo = Topology::new();
        let (r, s, c) = two_port_router(&mut topo);
        topo.disconnect(r, c).unwrap();
        let out = dispatch(&mut topo, None, Event::forward(r, to_router("10.0.0.10"), &[s]));
        assert_eq!(out.drops, vec![DropReason::InterfaceDown]);
    }

    #[test]
    fn test_last_hop_of_ttl_is_dropped() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);
        topo.device_mut(r)
            .unwrap()
            .arp_table
            .insert(ip("10.0.0.10"), mac(3));

        let out = dispatch(
            &mut topo,
            None,
            Event::forward(r, to_router("10.0.0.10").with_ttl(1), &[s]),
        );
        assert_eq!(out.drops, vec![DropReason::TtlExpired]);
        assert!(out.enqueued.is_empty());

        let out = dispatch(
            &mut topo,
            None,
            Event::forward(r, to_router("10.0.0.10").with_ttl(2), &[s]),
        );
        assert_eq!(out.enqueued[0].frame().map(|f| f.ttl), Some(1));
    }

    #[test]
    fn test_arp_resolves_destination_not_next_hop() {
        let mut topo = Topology::new();
        let (r, s, _) = two_port_router(&mut topo);
        let routes = DeviceConfig::new().route(
            Route::new("10.0.0.0/24".parse().unwrap(), 1).with_next_hop(ip("10.0.0.254")),
        );
        topo.configure(r, &routes).unwrap();

        let out = dispatch(&mut topo, None, Event::forward(r, to_router("10.0.0.10"), &[s]));
        assert!(matches!(
            &out.enqueued[..],
            [Event::ArpRequest { target_ip, .. }] if *target_ip == ip("10.0.0.10")
        ));
    }

    #[test]
    fn test_unaddressed_arp_response_is_ignored() {
        let mut topo = Topology::new();
        let (r, _, c) = two_port_router(&mut topo);
        let reply = Frame::new(
            mac(3),
            MacAddr([2, 0, 0, 0, 0, 77]),
            ip("10.0.0.10"),
            ip("10.0.0.99"),
            Payload::ArpResponse,
        );
        let out = dispatch(&mut topo, None, Event::forward(r, reply, &[c]));
        assert_eq!(out.drops, vec![DropReason::NotAddressed]);
        assert!(topo.device(r).unwrap().arp_table.is_empty());
    }
}

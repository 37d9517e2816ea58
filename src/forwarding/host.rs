//! Host behaviour.
//!
//! Hosts originate the task payload, answer ARP for their own address,
//! acknowledge data addressed to them and end the task when the
//! acknowledgement reaches the origin. Hosts always transmit on their first
//! connection.

use std::net::Ipv4Addr;

use super::{replay_event, Dispatcher, DropReason};
use crate::device::{DeviceKind, PendingPacket};
use crate::event::{Event, Path};
use crate::frame::{Frame, Payload};
use crate::types::DeviceId;

/// Handles [`Event::Send`]: address the payload or park it behind ARP.
pub(crate) fn send(d: &mut Dispatcher<'_>, src: DeviceId, dst: DeviceId, payload: Payload, path: Path) {
    let Some(dst_ip) = destination_ip(d, dst) else {
        return;
    };
    let Some(host) = d.topology.device_mut(src) else {
        d.missing(src);
        return;
    };
    let tag = host.tag();
    if host.kind != DeviceKind::Host {
        d.out.drop_with(
            DropReason::InvalidEvent,
            format!("{tag} Only hosts originate traffic"),
        );
        return;
    }
    let Some(&next) = host.connections.first() else {
        d.out.drop_with(
            DropReason::NoConnection,
            format!("{tag} Cannot send - no network connection!"),
        );
        return;
    };
    let Some(src_ip) = host.ip else {
        d.out.drop_with(
            DropReason::NoAddress,
            format!("{tag} Cannot send - no IP address configured"),
        );
        return;
    };

    d.out.note(format!("{tag} Initiating send to {dst_ip}"));

    let next_ip = if host.is_local(dst_ip) {
        dst_ip
    } else {
        match host.gateway {
            Some(gateway) => {
                d.out.note(format!(
                    "{tag} Destination not local, using gateway {gateway}"
                ));
                gateway
            }
            None => {
                d.out.drop_with(
                    DropReason::NoGateway,
                    format!("{tag} Destination not local and no gateway configured!"),
                );
                return;
            }
        }
    };

    match host.arp_table.get(&next_ip).copied() {
        Some(next_mac) => {
            let frame = Frame::new(host.mac, next_mac, src_ip, dst_ip, payload);
            let via = d.name_of(next);
            d.out.note(format!("{tag} Sending frame via {via}"));
            d.out.emit(Event::forward(next, frame, &path));
        }
        None => {
            d.out.note(format!("{tag} ARP lookup failed for {next_ip}"));
            d.out.note(format!("{tag} Buffering packet while ARP resolves"));
            host.buffer(
                next_ip,
                PendingPacket::Send {
                    dst,
                    payload,
                    path: path.clone(),
                },
            );
            d.out.emit(Event::ArpRequest {
                requester: src,
                target_ip: next_ip,
                path,
            });
        }
    }
}

/// Handles a frame arriving at a host.
pub(crate) fn receive(d: &mut Dispatcher<'_>, id: DeviceId, frame: Frame, path: Path) {
    let task = d.task;
    let Some(host) = d.topology.device_mut(id) else {
        d.missing(id);
        return;
    };
    let tag = host.tag();

    if frame.dst_mac != host.mac && !frame.dst_mac.is_broadcast() {
        d.out.drop_with(
            DropReason::NotAddressed,
            format!("{tag} Ignoring frame not addressed to us"),
        );
        return;
    }

    match frame.payload {
        Payload::ArpResponse => {
            d.out.note(format!("{tag} Received ARP response for {}", frame.src_ip));
            host.arp_table.insert(frame.src_ip, frame.src_mac);
            let parked = host.drain_pending(frame.src_ip);
            if !parked.is_empty() {
                d.out.note(format!(
                    "{tag} Resending {} buffered packet(s) for {}",
                    parked.len(),
                    frame.src_ip
                ));
            }
            for packet in parked {
                d.out.replay(replay_event(id, packet));
            }
        }
        Payload::ArpRequest => {
            // learn the requester even when the question is not for us
            host.arp_table.insert(frame.src_ip, frame.src_mac);
            if host.ip == Some(frame.dst_ip) {
                d.out.note(format!("{tag} Responding to ARP"));
                d.out.emit(Event::ArpResponse {
                    target: id,
                    requester_ip: frame.src_ip,
                    requester_mac: frame.src_mac,
                    path,
                });
            } else {
                d.out.drop_with(
                    DropReason::NotAddressed,
                    format!("{tag} Ignoring ARP frame not addressed to us"),
                );
            }
        }
        Payload::Ack | Payload::Data(_) => {
            if host.ip != Some(frame.dst_ip) {
                d.out.drop_with(
                    DropReason::NotAddressed,
                    format!("{tag} Ignoring packet not meant for us"),
                );
                return;
            }
            d.out.note(format!("{tag} Received payload: {}", frame.payload));

            if frame.payload == Payload::Ack {
                if task.is_some_and(|t| t.source == id) {
                    d.out.note("=== SIMULATION BEHAVED AS EXPECTED | SUCCESS ===");
                    d.out.note(format!(
                        "Original sender {} received ACK from {}",
                        frame.dst_ip, frame.src_ip
                    ));
                    d.out.complete();
                }
                return;
            }

            let Some(&next) = host.connections.first() else {
                d.out.drop_with(
                    DropReason::NoConnection,
                    format!("{tag} Cannot acknowledge - no network connection!"),
                );
                return;
            };
            let ack = Frame::new(
                host.mac,
                frame.src_mac,
                frame.dst_ip,
                frame.src_ip,
                Payload::Ack,
            );
            d.out.note(format!("{tag} Acknowledging {}", frame.src_ip));
            d.out.emit(Event::forward(next, ack, &[id]));
        }
    }
}

fn destination_ip(d: &mut Dispatcher<'_>, dst: DeviceId) -> Option<Ipv4Addr> {
    let Some(dev) = d.topology.device(dst) else {
        d.missing(dst);
        return None;
    };
    if dev.ip.is_none() {
        let message = format!("Destination {} has no IP address, cannot send", dev.name);
        d.out.drop_with(DropReason::NoAddress, message);
    }
    dev.ip
}

//! Switch behaviour.
//!
//! Learns which neighbour each source MAC sits behind, forwards to a known
//! destination and floods otherwise. Flooding skips the previous hop and
//! every device already on the path, which is the only loop protection: there
//! is no spanning tree and learned entries never age.

use super::{previous_hop, Dispatcher, DropReason};
use crate::event::{Event, Path};
use crate::frame::Frame;
use crate::types::DeviceId;

pub(crate) fn receive(d: &mut Dispatcher<'_>, id: DeviceId, frame: Frame, path: Path) {
    let Some(switch) = d.topology.device_mut(id) else {
        d.missing(id);
        return;
    };
    let tag = switch.tag();
    let incoming = previous_hop(&path);

    if let Some(prev) = incoming {
        if switch.mac_table.insert(frame.src_mac, prev) != Some(prev) {
            let port = port_label(switch.port_of(prev));
            d.out
                .note(format!("{tag} Learned {} on port {port}", frame.src_mac));
        }
    }

    match switch.mac_table.get(&frame.dst_mac).copied() {
        Some(target) if !switch.is_connected_to(target) => {
            d.out.drop_with(
                DropReason::StaleMacEntry,
                format!("{tag} Known MAC but no connection, dropping"),
            );
        }
        Some(target) if path.contains(&target) => {
            d.out.drop_with(
                DropReason::Loop,
                format!("{tag} Port for {} leads back along the path, dropping", frame.dst_mac),
            );
        }
        Some(target) => {
            let port = port_label(switch.port_of(target));
            d.out.note(format!("{tag} Forwarding to port {port}"));
            d.out.emit(Event::forward(target, frame, &path));
        }
        None => {
            let targets: Vec<DeviceId> = switch
                .connections
                .iter()
                .copied()
                .filter(|c| Some(*c) != incoming && !path.contains(c))
                .collect();
            if targets.is_empty() {
                d.out.note(format!("{tag} Nowhere left to flood, frame ends here"));
                return;
            }
            d.out.note(format!("{tag} Flooding to all connected ports"));
            for target in targets {
                d.out.emit(Event::forward(target, frame.clone(), &path));
            }
        }
    }
}

fn port_label(port: Option<usize>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
}

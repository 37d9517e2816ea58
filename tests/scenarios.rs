//! End-to-end scenarios.
//!
//! - Direct delivery across one switch
//! - Delivery across a router between two subnets
//! - Unroutable destination
//! - Topology changes while a run is in flight

use std::net::Ipv4Addr;
use std::time::Duration;

use pdusim::{
    DeviceConfig, DeviceId, DeviceKind, DropReason, Event, EventKind, NetworkConfig, Payload,
    Route, Simulation,
};

// ============================================================================
// Helpers
// ============================================================================

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn host(sim: &mut Simulation, name: &str, addr: &str, gateway: &str) -> DeviceId {
    let config = DeviceConfig::new()
        .name(name)
        .address(ip(addr), ip("255.255.255.0"))
        .gateway(ip(gateway));
    sim.create_device(DeviceKind::Host, &config).unwrap()
}

/// Runs to the end, returning every dispatched event in order.
fn trace(sim: &mut Simulation) -> Vec<Event> {
    let mut events = Vec::new();
    while !sim.pending_events().is_empty() {
        sim.step();
        events.extend(sim.last_event().cloned());
    }
    events
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(Event::kind).collect()
}

// ============================================================================
// Direct delivery
// ============================================================================

#[test]
fn test_direct_delivery_event_sequence() {
    let mut sim = Simulation::with_seed(11);
    let a = host(&mut sim, "pc-a", "192.168.1.10", "192.168.1.1");
    let b = host(&mut sim, "pc-b", "192.168.1.11", "192.168.1.1");
    let sw = sim
        .create_device(DeviceKind::Switch, &DeviceConfig::new().name("sw"))
        .unwrap();
    sim.connect_devices(a, sw).unwrap();
    sim.connect_devices(b, sw).unwrap();
    sim.set_task(a, b).unwrap();
    sim.start_simulation().unwrap();

    let events = trace(&mut sim);
    use EventKind::*;
    assert_eq!(
        kinds(&events),
        vec![
            Send, ArpRequest, Forward, Forward, ArpResponse, Forward, Forward, Send, Forward,
            Forward, Forward, Forward,
        ]
    );
    let devices: Vec<DeviceId> = events.iter().map(Event::device).collect();
    assert_eq!(devices, vec![a, a, sw, b, b, sw, a, a, sw, b, sw, a]);

    // B received the payload before the ACK went back
    let hello = events[9].frame().unwrap();
    assert_eq!(hello.payload, Payload::data("Hello"));
    let ack = events[11].frame().unwrap();
    assert_eq!(ack.payload, Payload::Ack);

    assert!(sim.is_complete());
    assert!(!sim.is_running());
    assert!(sim.logs().iter().any(|l| l.contains("SUCCESS")));

    // both hosts learned each other, the switch learned both
    let a_dev = sim.device(a).unwrap();
    let b_dev = sim.device(b).unwrap();
    assert_eq!(a_dev.arp_table.get(&ip("192.168.1.11")), Some(&b_dev.mac));
    assert_eq!(b_dev.arp_table.get(&ip("192.168.1.10")), Some(&a_dev.mac));
    let sw_dev = sim.device(sw).unwrap();
    assert_eq!(sw_dev.mac_table.get(&a_dev.mac), Some(&a));
    assert_eq!(sw_dev.mac_table.get(&b_dev.mac), Some(&b));
    assert!(a_dev.pending_packets.is_empty());
}

#[test]
fn test_switch_never_changes_ttl() {
    let mut sim = Simulation::with_seed(2);
    let a = host(&mut sim, "pc-a", "192.168.1.10", "192.168.1.1");
    let b = host(&mut sim, "pc-b", "192.168.1.11", "192.168.1.1");
    let sw = sim.create_device(DeviceKind::Switch, &DeviceConfig::new()).unwrap();
    sim.connect_devices(a, sw).unwrap();
    sim.connect_devices(b, sw).unwrap();
    sim.set_task(a, b).unwrap();
    sim.start_simulation().unwrap();

    let events = trace(&mut sim);
    assert!(events.iter().filter_map(Event::frame).all(|f| f.ttl == 64));
}

// ============================================================================
// Across a router
// ============================================================================

#[test]
fn test_cross_subnet_delivery() {
    let mut sim = NetworkConfig::two_subnet_demo().build().unwrap();
    let a = sim.device_by_name("pc-a").unwrap().id;
    let c = sim.device_by_name("pc-c").unwrap().id;
    let r1 = sim.device_by_name("r1").unwrap().id;
    sim.start_simulation().unwrap();

    let events = trace(&mut sim);
    assert_eq!(events.len(), 24);
    assert!(sim.is_complete());

    // gateway ARP is answered by the router before any data leaves A
    let first_data_from_a = events
        .iter()
        .position(|e| matches!(e, Event::Forward { frame, .. } if frame.payload == Payload::data("Hello")))
        .unwrap();
    let router_answer = events
        .iter()
        .position(|e| matches!(e, Event::ArpResponse { target, .. } if *target == r1))
        .unwrap();
    assert!(router_answer < first_data_from_a);

    // router-side ARP for C resolves before the payload reaches C
    let c_answer = events
        .iter()
        .position(|e| matches!(e, Event::ArpResponse { target, .. } if *target == c))
        .unwrap();
    let payload_at_c = events
        .iter()
        .position(|e| {
            matches!(e, Event::Forward { device, frame, .. }
                if *device == c && frame.payload == Payload::data("Hello"))
        })
        .unwrap();
    assert!(c_answer < payload_at_c);

    // one router hop each way
    assert_eq!(events[payload_at_c].frame().unwrap().ttl, 63);
    let ack_at_a = events.last().unwrap();
    assert_eq!(ack_at_a.device(), a);
    assert_eq!(ack_at_a.frame().unwrap().payload, Payload::Ack);
    assert_eq!(ack_at_a.frame().unwrap().ttl, 63);

    let stats = sim.stats();
    assert_eq!(stats.events.send, 2);
    assert_eq!(stats.events.arp_request, 2);
    assert_eq!(stats.events.arp_response, 2);
    assert_eq!(stats.replays, 2);
    assert_eq!(stats.drops_for(DropReason::NotAddressed), 1);
    assert!(stats.completed);
}

#[test]
fn test_router_rewrites_link_addresses() {
    let mut sim = NetworkConfig::two_subnet_demo().build().unwrap();
    let r1 = sim.device_by_name("r1").unwrap().clone();
    let c = sim.device_by_name("pc-c").unwrap().clone();
    sim.start_simulation().unwrap();

    let events = trace(&mut sim);
    let at_c = events
        .iter()
        .find_map(|e| match e {
            Event::Forward { device, frame, .. }
                if *device == c.id && frame.payload == Payload::data("Hello") =>
            {
                Some(frame.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(at_c.src_mac, r1.mac);
    assert_eq!(at_c.dst_mac, c.mac);
    assert_eq!(at_c.src_ip, ip("192.168.1.10"));
    assert_eq!(at_c.dst_ip, ip("10.0.0.10"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unroutable_destination_drops_at_router() {
    let mut config = NetworkConfig::two_subnet_demo();
    let router = config.devices.iter_mut().find(|d| d.name == "r1").unwrap();
    router.routes.retain(|r| r.interface == 0);
    let mut sim = config.build().unwrap();
    sim.start_simulation().unwrap();

    let mut saw_no_route = false;
    while sim.step() {
        saw_no_route |= sim.logs().iter().any(|l| l.contains("No route"));
    }
    saw_no_route |= sim.logs().iter().any(|l| l.contains("No route"));

    assert!(saw_no_route);
    assert!(!sim.is_complete());
    assert!(!sim.is_running());
    assert!(sim.pending_events().is_empty());
    assert_eq!(sim.stats().drops_for(DropReason::NoRoute), 1);
}

#[test]
fn test_missing_gateway_aborts_send() {
    let mut sim = Simulation::with_seed(5);
    let a = sim
        .create_device(
            DeviceKind::Host,
            &DeviceConfig::new().address(ip("192.168.1.10"), ip("255.255.255.0")),
        )
        .unwrap();
    let c = host(&mut sim, "pc-c", "10.0.0.10", "10.0.0.1");
    let sw = sim.create_device(DeviceKind::Switch, &DeviceConfig::new()).unwrap();
    sim.connect_devices(a, sw).unwrap();
    sim.connect_devices(c, sw).unwrap();
    sim.set_task(a, c).unwrap();
    sim.start_simulation().unwrap();

    assert!(!sim.step());
    assert!(sim.logs().iter().any(|l| l.contains("no gateway")));
    assert!(!sim.is_complete());
    assert!(sim.device(a).unwrap().pending_packets.is_empty());
}

#[test]
fn test_disconnect_mid_run_drops_arp_reply() {
    let mut sim = Simulation::with_seed(8);
    let a = host(&mut sim, "pc-a", "192.168.1.10", "192.168.1.1");
    let b = host(&mut sim, "pc-b", "192.168.1.11", "192.168.1.1");
    let sw = sim.create_device(DeviceKind::Switch, &DeviceConfig::new()).unwrap();
    sim.connect_devices(a, sw).unwrap();
    sim.connect_devices(b, sw).unwrap();
    sim.set_task(a, b).unwrap();
    sim.start_simulation().unwrap();

    // Send, ArpRequest, switch flood, B answers
    for _ in 0..4 {
        sim.step();
    }
    assert!(matches!(
        sim.pending_events().front(),
        Some(Event::ArpResponse { .. })
    ));
    sim.disconnect_devices(b, sw).unwrap();

    sim.run(Duration::ZERO);
    assert!(!sim.is_complete());
    assert_eq!(sim.stats().drops_for(DropReason::BrokenAdjacency), 1);
}

#[test]
fn test_router_next_hop_is_not_consulted() {
    let mut config = NetworkConfig::two_subnet_demo();
    let router = config.devices.iter_mut().find(|d| d.name == "r1").unwrap();
    router.routes = vec![
        Route::new("192.168.1.0/24".parse().unwrap(), 0),
        Route::new("10.0.0.0/24".parse().unwrap(), 1).with_next_hop(ip("10.0.0.254")),
    ];
    let mut sim = config.build().unwrap();
    sim.start_simulation().unwrap();

    let events = trace(&mut sim);
    assert!(sim.is_complete());
    // nothing ever asks for the configured next hop
    assert!(!events.iter().any(|e| matches!(
        e,
        Event::ArpRequest { target_ip, .. } if *target_ip == ip("10.0.0.254")
    )));
}

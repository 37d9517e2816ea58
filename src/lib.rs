//! # pdusim
//!
//! A step-wise, reversible simulator of frames moving through a small
//! Ethernet/IPv4 network of hosts, switches and routers.
//!
//! ## Model
//!
//! - **Topology**: devices joined by wires. Switches and routers have four
//!   ports; hosts take any number of links and always transmit on the first.
//! - **Events**: a single queue of [`Event`]s. Each [`Simulation::step`]
//!   dispatches exactly one, to the behaviour of the device it names.
//! - **Forwarding**: hosts resolve addresses with ARP and acknowledge data,
//!   switches learn MAC addresses and flood, routers route on a first-match
//!   table and decrement TTL.
//! - **Undo**: every step stores a deep copy of the state first, so
//!   [`Simulation::step_back`] can return to it.
//!
//! ## Quick Start
//!
//! ```rust
//! use pdusim::{NetworkConfig, Simulation};
//!
//! let config = NetworkConfig::two_subnet_demo();
//! let mut sim = Simulation::from_config(&config).unwrap();
//! sim.start_simulation().unwrap();
//!
//! while sim.step() {
//!     for line in sim.logs() {
//!         println!("{line}");
//!     }
//! }
//! assert!(sim.is_complete());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use pdusim::NetworkConfig;
//!
//! let config = NetworkConfig::from_file("network.yaml")?;
//! let mut sim = config.build()?;
//! ```

pub mod config;
pub mod device;
pub mod event;
pub mod forwarding;
pub mod frame;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod stats;
pub mod topology;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigError, DeviceSpec, NetworkConfig, NetworkConfigBuilder};
pub use device::{Device, DeviceKind, Interface, PendingPacket, Route};
pub use event::{Event, EventKind, Path};
pub use forwarding::{DropReason, Outcome};
pub use frame::{Frame, Payload};
pub use scheduler::EventQueue;
pub use simulation::{SimError, SimResult, Simulation, Status, Task};
pub use snapshot::{Snapshot, SnapshotHistory};
pub use stats::SimulationStats;
pub use topology::{DeviceConfig, Topology, TopologyError};
pub use types::{DeviceId, MacAddr, PortIndex, WireId};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// pdusim::init_logging("pdusim=debug");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // a second call (e.g. from several tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

//! Configuration system for network simulations.
//!
//! Networks can be described in YAML or JSON and turned into a ready
//! [`Simulation`]. Links are connected in file order, so router port numbers
//! follow the order the router's links are listed in.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   pacing_ms: 500
//!   seed: 42
//!
//! devices:
//!   - name: r1
//!     kind: router
//!     interfaces:
//!       - port: 0
//!         ip: 192.168.1.1
//!         mask: 255.255.255.0
//!     routes:
//!       - network: 192.168.1.0/24
//!         interface: 0
//!   - name: sw1
//!     kind: switch
//!   - name: pc-a
//!     kind: host
//!     ip: 192.168.1.10
//!     subnet_mask: 255.255.255.0
//!     gateway: 192.168.1.1
//!
//! links:
//!   - [r1, sw1]
//!   - [pc-a, sw1]
//!
//! task:
//!   source: pc-a
//!   destination: pc-b
//! ```

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::device::{DeviceKind, Interface, Route};
use crate::simulation::{SimError, Simulation};
use crate::topology::DeviceConfig;
use crate::types::{DeviceId, MacAddr, PortIndex};

/// Errors that can occur while loading or applying a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Delay between steps when running paced.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seed for MAC assignment; random when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Maximum number of undo snapshots kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,

    /// Step cap for a single run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
}

fn default_pacing_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            log_level: default_log_level(),
            seed: None,
            history_limit: None,
            max_steps: None,
        }
    }
}

impl SimulationParams {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Address of one router port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub port: PortIndex,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// A pre-populated ARP entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

/// One device of a network description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,

    pub kind: DeviceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<Ipv4Addr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceSpec>,

    /// Checked in order, first match wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_arp: Vec<StaticArpEntry>,
}

impl DeviceSpec {
    fn bare(name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ip: None,
            subnet_mask: None,
            gateway: None,
            interfaces: Vec::new(),
            routes: Vec::new(),
            static_arp: Vec::new(),
        }
    }

    pub fn host(name: impl Into<String>, ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self {
            ip: Some(ip),
            subnet_mask: Some(mask),
            ..Self::bare(name, DeviceKind::Host)
        }
    }

    pub fn switch(name: impl Into<String>) -> Self {
        Self::bare(name, DeviceKind::Switch)
    }

    pub fn router(name: impl Into<String>) -> Self {
        Self::bare(name, DeviceKind::Router)
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_interface(mut self, port: PortIndex, ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.interfaces.push(InterfaceSpec { port, ip, mask });
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_static_arp(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.static_arp.push(StaticArpEntry { ip, mac });
        self
    }

    /// The configuration applied when the device is created.
    pub fn device_config(&self) -> DeviceConfig {
        let mut config = DeviceConfig::new().name(self.name.clone());
        config.ip = self.ip;
        config.subnet_mask = self.subnet_mask;
        config.gateway = self.gateway;
        if !self.interfaces.is_empty() {
            config.interfaces = Some(
                self.interfaces
                    .iter()
                    .map(|i| (i.port, Interface::new(i.ip, i.mask)))
                    .collect(),
            );
        }
        if !self.routes.is_empty() {
            config.routing_table = Some(self.routes.clone());
        }
        if !self.static_arp.is_empty() {
            config.static_arp = Some(self.static_arp.iter().map(|e| (e.ip, e.mac)).collect());
        }
        config
    }
}

/// A cable between two named devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec(pub String, pub String);

/// The hosts a run delivers between, by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub source: String,
    pub destination: String,
}

/// Complete network description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub devices: Vec<DeviceSpec>,

    #[serde(default)]
    pub links: Vec<LinkSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskSpec>,
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: NetworkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: NetworkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, picking the format by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Checks names and references. Per-kind field rules are enforced when
    /// the devices are created.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = BTreeSet::new();
        for device in &self.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation("Device with empty name".to_string()));
            }
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device name: {}",
                    device.name
                )));
            }
        }

        for LinkSpec(a, b) in &self.links {
            for end in [a, b] {
                if !names.contains(end.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Link references unknown device: {}",
                        end
                    )));
                }
            }
            if a == b {
                return Err(ConfigError::Validation(format!(
                    "Link connects {} to itself",
                    a
                )));
            }
        }

        if let Some(task) = &self.task {
            for end in [&task.source, &task.destination] {
                if !names.contains(end.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Task references unknown device: {}",
                        end
                    )));
                }
            }
        }

        if self.simulation.history_limit == Some(0) {
            return Err(ConfigError::Validation(
                "history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Creates the devices, links and task in a fresh simulation.
    pub fn build(&self) -> ConfigResult<Simulation> {
        self.validate()?;
        let params = &self.simulation;
        let mut sim = match params.seed {
            Some(seed) => Simulation::with_seed(seed),
            None => Simulation::new(),
        };
        if let Some(limit) = params.history_limit {
            sim = sim.with_history_limit(limit);
        }
        if let Some(max_steps) = params.max_steps {
            sim = sim.with_max_steps(max_steps);
        }

        let mut ids: BTreeMap<&str, DeviceId> = BTreeMap::new();
        for device in &self.devices {
            let id = sim.create_device(device.kind, &device.device_config())?;
            ids.insert(device.name.as_str(), id);
        }
        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| ConfigError::Validation(format!("Unknown device: {}", name)))
        };
        for LinkSpec(a, b) in &self.links {
            sim.connect_devices(lookup(a)?, lookup(b)?)?;
        }
        if let Some(task) = &self.task {
            sim.set_task(lookup(&task.source)?, lookup(&task.destination)?)?;
        }

        tracing::info!(
            devices = self.devices.len(),
            links = self.links.len(),
            "network built from configuration"
        );
        Ok(sim)
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn find_device(&self, name: &str) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Two /24 subnets joined by one router, one switch per subnet.
    ///
    /// `pc-a` and `pc-b` sit on 192.168.1.0/24 behind `sw1`, `pc-c` on
    /// 10.0.0.0/24 behind `sw2`. The task sends from `pc-a` to `pc-c`.
    pub fn two_subnet_demo() -> Self {
        let mask = Ipv4Addr::new(255, 255, 255, 0);
        let lan_a = Ipv4Addr::new(192, 168, 1, 1);
        let lan_c = Ipv4Addr::new(10, 0, 0, 1);
        let router = DeviceSpec::router("r1")
            .with_interface(0, lan_a, mask)
            .with_interface(1, lan_c, mask)
            .with_route(Route::new(slash24(lan_a), 0))
            .with_route(Route::new(slash24(lan_c), 1));

        NetworkConfig {
            simulation: SimulationParams {
                seed: Some(42),
                ..SimulationParams::default()
            },
            devices: vec![
                router,
                DeviceSpec::switch("sw1"),
                DeviceSpec::switch("sw2"),
                DeviceSpec::host("pc-a", Ipv4Addr::new(192, 168, 1, 10), mask).with_gateway(lan_a),
                DeviceSpec::host("pc-b", Ipv4Addr::new(192, 168, 1, 11), mask).with_gateway(lan_a),
                DeviceSpec::host("pc-c", Ipv4Addr::new(10, 0, 0, 10), mask).with_gateway(lan_c),
            ],
            links: vec![
                LinkSpec("r1".into(), "sw1".into()),
                LinkSpec("r1".into(), "sw2".into()),
                LinkSpec("pc-a".into(), "sw1".into()),
                LinkSpec("pc-b".into(), "sw1".into()),
                LinkSpec("pc-c".into(), "sw2".into()),
            ],
            task: Some(TaskSpec {
                source: "pc-a".into(),
                destination: "pc-c".into(),
            }),
        }
    }
}

fn slash24(addr: Ipv4Addr) -> Ipv4Network {
    let [a, b, c, _] = addr.octets();
    // a /24 prefix is always in range
    Ipv4Network::new(Ipv4Addr::new(a, b, c, 0), 24).unwrap_or_else(|_| Ipv4Network::from(addr))
}

/// Builder for creating a [`NetworkConfig`] programmatically.
#[derive(Default)]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
}

impl NetworkConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = Some(seed);
        self
    }

    pub fn pacing_ms(mut self, pacing_ms: u64) -> Self {
        self.config.simulation.pacing_ms = pacing_ms;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.simulation.history_limit = Some(limit);
        self
    }

    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.config.simulation.max_steps = Some(max_steps);
        self
    }

    pub fn device(mut self, device: DeviceSpec) -> Self {
        self.config.devices.push(device);
        self
    }

    pub fn link(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.config.links.push(LinkSpec(a.into(), b.into()));
        self
    }

    pub fn task(mut self, source: impl Into<String>, destination: impl Into<String>) -> Self {
        self.config.task = Some(TaskSpec {
            source: source.into(),
            destination: destination.into(),
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<NetworkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

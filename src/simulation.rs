//! The simulation driver.
//!
//! [`Simulation`] owns one topology, its event queue and the snapshot history,
//! and exposes the mutation and stepping surface a front end drives. Exactly
//! one event is dispatched per [`Simulation::step`]; forwarding problems are
//! reported through the per-step log, never as errors.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, NetworkConfig};
use crate::device::{Device, DeviceKind};
use crate::event::{Event, EventKind};
use crate::forwarding::{self, Outcome};
use crate::frame::Payload;
use crate::scheduler::EventQueue;
use crate::snapshot::{Snapshot, SnapshotHistory};
use crate::stats::{SimulationStats, Timer};
use crate::topology::{DeviceConfig, Topology, TopologyError};
use crate::types::{DeviceId, MacAddr, WireId};

/// Payload carried by the task's first frame.
pub const TASK_PAYLOAD: &str = "Hello";

/// Errors surfaced to the caller by the simulation API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("no task set")]
    NoTask,

    #[error("task source {0} is not a host")]
    SourceNotHost(DeviceId),

    #[error("task destination {0} is not a host")]
    DestinationNotHost(DeviceId),

    #[error("task source and destination are both {0}")]
    SameEndpoints(DeviceId),

    #[error("device {0} has no IP address")]
    MissingAddress(DeviceId),

    #[error("no path between {0} and {1}")]
    NoPath(DeviceId, DeviceId),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

pub type SimResult<T> = Result<T, SimError>;

/// The pair of hosts a run tries to deliver a payload between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub source: DeviceId,
    pub destination: DeviceId,
}

/// Run state saved with every snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub running: bool,
    /// The task's acknowledgement reached its origin.
    pub complete: bool,
}

/// A single network simulation.
#[derive(Debug)]
pub struct Simulation {
    topology: Topology,
    queue: EventQueue,
    task: Option<Task>,
    status: Status,
    logs: Vec<String>,
    history: SnapshotHistory,
    stats: SimulationStats,
    rng: StdRng,
    last_event: Option<Event>,
    max_steps: Option<u64>,
    steps: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    /// Creates an empty simulation with randomly seeded MAC assignment.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), SimulationStats::new())
    }

    /// Creates an empty simulation whose MAC addresses depend only on `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(
            StdRng::seed_from_u64(seed),
            SimulationStats::new().with_seed(seed),
        )
    }

    fn with_rng(rng: StdRng, stats: SimulationStats) -> Self {
        Self {
            topology: Topology::new(),
            queue: EventQueue::new(),
            task: None,
            status: Status::default(),
            logs: Vec::new(),
            history: SnapshotHistory::new(),
            stats,
            rng,
            last_event: None,
            max_steps: None,
            steps: 0,
        }
    }

    /// Keeps at most `limit` snapshots.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = SnapshotHistory::bounded(limit);
        self
    }

    /// Caps the number of steps a single [`run`](Self::run) may take.
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Builds a simulation from a parsed configuration.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, ConfigError> {
        config.build()
    }

    // ----- topology mutation -----

    /// Adds a device of `kind`, applying `config` to it.
    pub fn create_device(&mut self, kind: DeviceKind, config: &DeviceConfig) -> SimResult<DeviceId> {
        let mac = self.fresh_mac();
        let id = self.topology.add_device(kind, mac, config.name.clone())?;
        if let Err(e) = self.topology.configure(id, config) {
            self.topology.remove_device(id)?;
            return Err(e.into());
        }
        tracing::debug!(device = %id, kind = kind.as_str(), %mac, "device created");
        Ok(id)
    }

    pub fn connect_devices(&mut self, a: DeviceId, b: DeviceId) -> SimResult<WireId> {
        Ok(self.topology.connect(a, b)?)
    }

    pub fn disconnect_devices(&mut self, a: DeviceId, b: DeviceId) -> SimResult<()> {
        Ok(self.topology.disconnect(a, b)?)
    }

    /// Removes a device and its wires. A task naming it is cleared.
    pub fn delete_device(&mut self, id: DeviceId) -> SimResult<Device> {
        let device = self.topology.remove_device(id)?;
        if self
            .task
            .is_some_and(|t| t.source == id || t.destination == id)
        {
            self.task = None;
        }
        Ok(device)
    }

    pub fn configure_device(&mut self, id: DeviceId, config: &DeviceConfig) -> SimResult<()> {
        Ok(self.topology.configure(id, config)?)
    }

    fn fresh_mac(&mut self) -> MacAddr {
        loop {
            let mac = MacAddr::random(&mut self.rng);
            if self.topology.device_by_mac(mac).is_none() {
                return mac;
            }
        }
    }

    // ----- task and stepping -----

    /// Chooses the hosts the next run delivers between.
    pub fn set_task(&mut self, source: DeviceId, destination: DeviceId) -> SimResult<()> {
        let task = Task {
            source,
            destination,
        };
        self.check_task(task)?;
        self.task = Some(task);
        Ok(())
    }

    fn check_task(&self, task: Task) -> SimResult<()> {
        let src = self.topology.get(task.source)?;
        let dst = self.topology.get(task.destination)?;
        if src.kind != DeviceKind::Host {
            return Err(SimError::SourceNotHost(src.id));
        }
        if dst.kind != DeviceKind::Host {
            return Err(SimError::DestinationNotHost(dst.id));
        }
        if src.id == dst.id {
            return Err(SimError::SameEndpoints(src.id));
        }
        for dev in [src, dst] {
            if dev.ip.is_none() {
                return Err(SimError::MissingAddress(dev.id));
            }
        }
        if !self.topology.is_reachable(src.id, dst.id) {
            return Err(SimError::NoPath(src.id, dst.id));
        }
        Ok(())
    }

    /// Resets the queue and history and queues the task's first send.
    pub fn start_simulation(&mut self) -> SimResult<()> {
        let task = self.task.ok_or(SimError::NoTask)?;
        self.check_task(task)?;

        self.queue.clear();
        self.history.clear();
        self.logs.clear();
        self.last_event = None;
        self.steps = 0;
        self.status = Status {
            running: true,
            complete: false,
        };
        self.queue.push_back(Event::send(
            task.source,
            task.destination,
            Payload::data(TASK_PAYLOAD),
        ));
        self.stats.observe_queue(self.queue.len());
        tracing::info!(source = %task.source, destination = %task.destination, "simulation started");
        Ok(())
    }

    /// Dispatches the event at the head of the queue.
    ///
    /// Returns whether more events are pending afterwards.
    pub fn step(&mut self) -> bool {
        self.logs.clear();
        if self.queue.is_empty() {
            self.logs.push("No more events in the queue.".to_string());
            self.status.running = false;
            return false;
        }

        let snapshot = self.capture();
        self.history.record(snapshot);
        self.stats.record_snapshot();

        let Some(event) = self.queue.pop_front() else {
            return false;
        };
        self.steps += 1;
        let kind = event.kind();
        let span = tracing::debug_span!(
            "step",
            index = self.steps,
            kind = kind.as_str(),
            device = %event.device()
        );
        let _enter = span.enter();

        self.last_event = Some(event.clone());
        let outcome = forwarding::dispatch(&mut self.topology, self.task, event);
        self.apply(kind, outcome);
        !self.queue.is_empty()
    }

    fn apply(&mut self, kind: EventKind, outcome: Outcome) {
        let depth = if outcome.completed {
            0
        } else {
            self.queue.len() + outcome.enqueued.len() + outcome.replayed.len()
        };
        self.stats.record_step(kind, &outcome, depth);

        let Outcome {
            enqueued,
            replayed,
            completed,
            logs,
            ..
        } = outcome;
        self.logs = logs;
        self.queue.replay_front(replayed);
        self.queue.extend(enqueued);

        if completed {
            self.queue.clear();
            self.status = Status {
                running: false,
                complete: true,
            };
        } else if self.queue.is_empty() && self.status.running {
            self.status.running = false;
            tracing::info!("event queue drained without completing the task");
        }
    }

    /// Restores the state from before the most recent step.
    pub fn step_back(&mut self) -> bool {
        self.logs.clear();
        match self.history.back() {
            Some(snapshot) => {
                self.restore(snapshot);
                self.stats.record_step_back();
                self.logs
                    .push("Reverted to previous event snapshot.".to_string());
                true
            }
            None => {
                self.logs.push("No previous event to revert to.".to_string());
                false
            }
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.topology = snapshot.topology;
        self.queue = snapshot.queue;
        self.status = snapshot.status;
        self.last_event = None;
        self.steps = self.steps.saturating_sub(1);
    }

    /// Steps until the task completes or the queue empties, sleeping `pacing`
    /// between steps. Returns the number of steps taken.
    pub fn run(&mut self, pacing: Duration) -> u64 {
        let timer = Timer::start();
        let mut taken = 0;
        while !self.status.complete && !self.queue.is_empty() {
            if self.max_steps.is_some_and(|max| taken >= max) {
                tracing::warn!(steps = taken, "step limit reached, stopping run");
                break;
            }
            self.step();
            taken += 1;
            if !pacing.is_zero() && !self.queue.is_empty() {
                std::thread::sleep(pacing);
            }
        }
        self.stats.compute_timing(timer.elapsed_ms());
        taken
    }

    /// Queues an arbitrary event at the back of the queue.
    pub fn inject_event(&mut self, event: Event) {
        self.queue.push_back(event);
        self.stats.observe_queue(self.queue.len());
    }

    // ----- queries -----

    /// Messages produced by the most recent step or step-back.
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn is_complete(&self) -> bool {
        self.status.complete
    }

    pub fn is_running(&self) -> bool {
        self.status.running
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn task(&self) -> Option<Task> {
        self.task
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.topology.device(id)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.topology.device_by_name(name)
    }

    pub fn pending_events(&self) -> &EventQueue {
        &self.queue
    }

    /// The event dispatched by the most recent step.
    pub fn last_event(&self) -> Option<&Event> {
        self.last_event.as_ref()
    }

    /// The device the most recent step acted on.
    pub fn active_device(&self) -> Option<DeviceId> {
        self.last_event.as_ref().map(Event::device)
    }

    /// Independent copy of the current state.
    pub fn capture(&self) -> Snapshot {
        Snapshot {
            topology: self.topology.clone(),
            queue: self.queue.clone(),
            status: self.status,
        }
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }
}

//! Statistics collection and export.
//!
//! Counters are telemetry about what the simulation did, not simulation
//! state: they are not captured in snapshots and `step_back` never rewinds
//! them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::event::{Event, EventKind};
use crate::forwarding::{DropReason, Outcome};

/// Aggregate statistics for one simulation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub metadata: SimulationMetadata,

    /// Events dispatched, per kind.
    pub events: EventCounts,

    /// `Forward` events produced by handlers, replays included.
    pub frames_forwarded: u64,

    /// `ArpRequest` events produced by handlers.
    pub arp_requests: u64,

    /// Events put back at the head of the queue after ARP resolution.
    pub replays: u64,

    pub drops: BTreeMap<DropReason, u64>,

    pub snapshots_taken: u64,

    pub step_backs: u64,

    /// Largest queue length observed after a step.
    pub peak_queue_depth: usize,

    pub completed: bool,

    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub name: String,

    /// RNG seed used for MAC assignment, if the run is reproducible.
    pub seed: Option<u64>,

    pub version: String,
}

/// Dispatched events per [`EventKind`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub send: u64,
    pub forward: u64,
    pub arp_request: u64,
    pub arp_response: u64,
}

impl EventCounts {
    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Send => self.send += 1,
            EventKind::Forward => self.forward += 1,
            EventKind::ArpRequest => self.arp_request += 1,
            EventKind::ArpResponse => self.arp_response += 1,
        }
    }

    pub fn get(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Send => self.send,
            EventKind::Forward => self.forward,
            EventKind::ArpRequest => self.arp_request,
            EventKind::ArpResponse => self.arp_response,
        }
    }

    pub fn total(&self) -> u64 {
        self.send + self.forward + self.arp_request + self.arp_response
    }
}

/// Wall-clock figures for paced runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time spent in `run`, in milliseconds.
    pub total_wall_time_ms: f64,

    pub steps_per_second: f64,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..SimulationMetadata::default()
            },
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.metadata.seed = Some(seed);
        self
    }

    /// Accounts for one dispatched event and what it produced.
    pub fn record_step(&mut self, kind: EventKind, outcome: &Outcome, queue_depth: usize) {
        self.events.record(kind);
        for event in outcome.enqueued.iter().chain(&outcome.replayed) {
            match event {
                Event::Forward { .. } => self.frames_forwarded += 1,
                Event::ArpRequest { .. } => self.arp_requests += 1,
                _ => {}
            }
        }
        self.replays += outcome.replayed.len() as u64;
        for reason in &outcome.drops {
            *self.drops.entry(*reason).or_default() += 1;
        }
        self.peak_queue_depth = self.peak_queue_depth.max(queue_depth);
        self.completed |= outcome.completed;
    }

    pub fn record_snapshot(&mut self) {
        self.snapshots_taken += 1;
    }

    pub fn record_step_back(&mut self) {
        self.step_backs += 1;
    }

    /// Records the queue length when work is added outside of a step.
    pub fn observe_queue(&mut self, queue_depth: usize) {
        self.peak_queue_depth = self.peak_queue_depth.max(queue_depth);
    }

    pub fn total_drops(&self) -> u64 {
        self.drops.values().sum()
    }

    pub fn drops_for(&self, reason: DropReason) -> u64 {
        self.drops.get(&reason).copied().unwrap_or(0)
    }

    /// Updates timing statistics from the wall-clock duration of a run.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;
        if wall_time_ms > 0.0 {
            self.timing.steps_per_second = self.events.total() as f64 / (wall_time_ms / 1000.0);
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports counters as `metric,value` rows.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        for kind in [
            EventKind::Send,
            EventKind::Forward,
            EventKind::ArpRequest,
            EventKind::ArpResponse,
        ] {
            csv.push_str(&format!("events_{},{}\n", kind, self.events.get(kind)));
        }
        csv.push_str(&format!("frames_forwarded,{}\n", self.frames_forwarded));
        csv.push_str(&format!("arp_requests,{}\n", self.arp_requests));
        csv.push_str(&format!("replays,{}\n", self.replays));
        for (reason, count) in &self.drops {
            csv.push_str(&format!("drops_{},{}\n", reason, count));
        }
        csv.push_str(&format!("snapshots_taken,{}\n", self.snapshots_taken));
        csv.push_str(&format!("step_backs,{}\n", self.step_backs));
        csv.push_str(&format!("peak_queue_depth,{}\n", self.peak_queue_depth));
        csv.push_str(&format!("completed,{}\n", self.completed));
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(seed) = self.metadata.seed {
            writeln!(w, "Seed: {}", seed)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Events ---")?;
        writeln!(w, "Send: {}", self.events.send)?;
        writeln!(w, "Forward: {}", self.events.forward)?;
        writeln!(w, "ARP request: {}", self.events.arp_request)?;
        writeln!(w, "ARP response: {}", self.events.arp_response)?;
        writeln!(w, "Frames forwarded: {}", self.frames_forwarded)?;
        writeln!(w, "Replays: {}", self.replays)?;
        writeln!(w, "Peak queue depth: {}", self.peak_queue_depth)?;
        writeln!(w)?;

        writeln!(w, "--- Drops ---")?;
        if self.drops.is_empty() {
            writeln!(w, "none")?;
        }
        for (reason, count) in &self.drops {
            writeln!(w, "{}: {}", reason, count)?;
        }
        writeln!(w)?;

        writeln!(w, "Snapshots: {}, step-backs: {}", self.snapshots_taken, self.step_backs)?;
        writeln!(w, "Completed: {}", if self.completed { "yes" } else { "no" })?;
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Wall-clock timer for paced runs.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, Payload};
    use crate::types::{DeviceId, MacAddr};

    fn forward() -> Event {
        let frame = Frame::new(
            MacAddr([2, 0, 0, 0, 0, 1]),
            MacAddr::BROADCAST,
            "192.168.1.10".parse().unwrap(),
            "192.168.1.11".parse().unwrap(),
            Payload::ArpRequest,
        );
        Event::forward(DeviceId(2), frame, &[DeviceId(1)])
    }

    #[test]
    fn test_record_step_counts() {
        let mut stats = SimulationStats::new();
        let outcome = Outcome {
            enqueued: vec![forward(), forward()],
            replayed: vec![forward()],
            drops: vec![DropReason::NoRoute, DropReason::NoRoute],
            ..Outcome::default()
        };
        stats.record_step(EventKind::ArpRequest, &outcome, 3);

        assert_eq!(stats.events.arp_request, 1);
        assert_eq!(stats.frames_forwarded, 3);
        assert_eq!(stats.replays, 1);
        assert_eq!(stats.drops_for(DropReason::NoRoute), 2);
        assert_eq!(stats.peak_queue_depth, 3);
        assert!(!stats.completed);

        stats.record_step(EventKind::Forward, &Outcome::default(), 1);
        assert_eq!(stats.peak_queue_depth, 3);
        assert_eq!(stats.events.total(), 2);
    }

    #[test]
    fn test_stats_json_export() {
        let mut stats = SimulationStats::new().with_name("json").with_seed(7);
        stats.drops.insert(DropReason::TtlExpired, 4);
        let json = stats.to_json().unwrap();
        assert!(json.contains("\"ttl_expired\": 4"));
        assert!(json.contains("\"seed\": 7"));

        let back: SimulationStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_stats_csv_export() {
        let mut stats = SimulationStats::new();
        stats.events.forward = 12;
        stats.drops.insert(DropReason::Loop, 2);
        let csv = stats.to_csv();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("events_forward,12"));
        assert!(csv.contains("drops_loop,2"));
        assert!(csv.contains("completed,false"));
    }

    #[test]
    fn test_summary_output() {
        let mut stats = SimulationStats::new().with_name("Summary Test");
        stats.completed = true;
        let summary = stats.summary();
        assert!(summary.contains("Summary Test"));
        assert!(summary.contains("Completed: yes"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5.0);
    }
}

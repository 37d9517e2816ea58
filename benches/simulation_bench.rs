//! Performance benchmarks for pdusim.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench simulation_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use pdusim::{DeviceConfig, DeviceId, DeviceKind, NetworkConfig, Simulation};

// ============================================================================
// Fixtures
// ============================================================================

/// A chain of `switches` switches with one host at each end.
fn switch_chain(switches: usize) -> (Simulation, DeviceId, DeviceId) {
    let mut sim = Simulation::with_seed(7);
    let mask = "255.255.255.0".parse().unwrap();
    let a = sim
        .create_device(
            DeviceKind::Host,
            &DeviceConfig::new().address("192.168.1.10".parse().unwrap(), mask),
        )
        .unwrap();
    let b = sim
        .create_device(
            DeviceKind::Host,
            &DeviceConfig::new().address("192.168.1.11".parse().unwrap(), mask),
        )
        .unwrap();

    let mut previous = a;
    for _ in 0..switches {
        let sw = sim
            .create_device(DeviceKind::Switch, &DeviceConfig::new())
            .unwrap();
        sim.connect_devices(previous, sw).unwrap();
        previous = sw;
    }
    sim.connect_devices(previous, b).unwrap();
    sim.set_task(a, b).unwrap();
    (sim, a, b)
}

// ============================================================================
// Runs
// ============================================================================

fn bench_two_subnet_run(c: &mut Criterion) {
    let config = NetworkConfig::two_subnet_demo();
    c.bench_function("two_subnet_run", |b| {
        b.iter(|| {
            let mut sim = config.build().unwrap();
            sim.start_simulation().unwrap();
            let steps = sim.run(Duration::ZERO);
            black_box((steps, sim.is_complete()))
        });
    });
}

fn bench_switch_chain_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("switch_chain_run");

    for switches in [1usize, 4, 16, 64].iter() {
        group.throughput(Throughput::Elements(*switches as u64));
        group.bench_with_input(
            BenchmarkId::new("switches", switches),
            switches,
            |b, &switches| {
                b.iter_batched(
                    || switch_chain(switches).0,
                    |mut sim| {
                        sim.start_simulation().unwrap();
                        black_box(sim.run(Duration::ZERO))
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

// ============================================================================
// Snapshots
// ============================================================================

fn bench_snapshot_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_capture");

    for switches in [4usize, 64].iter() {
        let (mut sim, _, _) = switch_chain(*switches);
        sim.start_simulation().unwrap();
        // populate tables and the queue a little
        for _ in 0..*switches {
            sim.step();
        }
        group.bench_with_input(BenchmarkId::new("switches", switches), &sim, |b, sim| {
            b.iter(|| black_box(sim.capture()));
        });
    }

    group.finish();
}

fn bench_step_back(c: &mut Criterion) {
    c.bench_function("step_back_and_redo", |b| {
        b.iter_batched(
            || {
                let mut sim = NetworkConfig::two_subnet_demo().build().unwrap();
                sim.start_simulation().unwrap();
                for _ in 0..12 {
                    sim.step();
                }
                sim
            },
            |mut sim| {
                for _ in 0..6 {
                    sim.step_back();
                }
                for _ in 0..6 {
                    sim.step();
                }
                black_box(sim.capture())
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_two_subnet_run,
    bench_switch_chain_run,
    bench_snapshot_capture,
    bench_step_back,
);

criterion_main!(benches);

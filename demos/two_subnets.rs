//! Walks the two-subnet preset step by step, printing each step's log.
//!
//! Run with: `cargo run --example two_subnets [config.yaml]`
//! Set `RUST_LOG=pdusim=debug` to see the structured trace as well.

use std::time::Duration;

use pdusim::{NetworkConfig, Simulation};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::two_subnet_demo(),
    };
    pdusim::init_logging(&config.simulation.log_level);

    let mut sim = Simulation::from_config(&config)?;
    sim.start_simulation()?;

    let pacing: Duration = config.simulation.pacing();
    let mut step = 0;
    while !sim.pending_events().is_empty() {
        sim.step();
        step += 1;
        let event = sim
            .last_event()
            .map(|e| e.to_string())
            .unwrap_or_default();
        println!("--- step {step}: {event}");
        for line in sim.logs() {
            println!("    {line}");
        }
        if config.simulation.max_steps.is_some_and(|max| step >= max) {
            println!("step limit reached");
            break;
        }
        std::thread::sleep(pacing);
    }

    // show that the last step can be undone
    if sim.step_back() {
        println!("--- undo: {}", sim.logs().join(" "));
        sim.step();
    }

    println!();
    println!(
        "Task {}",
        if sim.is_complete() { "completed" } else { "did not complete" }
    );
    print!("{}", sim.stats().summary());
    Ok(())
}

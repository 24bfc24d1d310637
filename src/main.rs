//! Lumen - transactional ECS simulation demo
//!
//! Usage: `lumen [settings.toml]`. Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod demo;
mod settings;

use settings::DemoSettings;

/// `RUST_LOG` when set and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = DemoSettings::load(path.as_deref());
    let simulation = &settings.simulation;

    info!(
        frames = simulation.frames,
        parallel = simulation.parallel,
        "Starting Lumen simulation..."
    );

    let world = demo::build_world(&settings.world).context("Failed to build world")?;
    let mut schedule = demo::setup(&world, simulation).context("Failed to seed world")?;

    let started = Instant::now();
    let mut failures = 0;
    for frame in 0..simulation.frames {
        let failed = if simulation.parallel {
            schedule.run_parallel(&world)
        } else {
            schedule.run_all(&world)
        };
        if failed > 0 {
            warn!(frame, failed, "Frame had failing systems");
            failures += failed;
        }
    }

    info!(
        entities = world.entity_count(),
        failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Simulation finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_honours_directives() {
        assert_eq!(log_filter(Some("debug")).to_string(), "debug");
        assert_eq!(
            log_filter(Some("lumen_ecs=trace")).to_string(),
            "lumen_ecs=trace"
        );
    }

    #[test]
    fn log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).to_string(), "info");
    }
}

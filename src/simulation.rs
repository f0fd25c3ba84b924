//! Wall-clock driver for running the scheduler outside of a host world.

use std::{cell::Cell, time::Instant};

use tracing::debug;

use crate::{
    config::SimulationConfig,
    context::{ComputeProbe, Environment, SharedState},
    error::ConfigError,
    scheduler::{CycleReport, Scheduler},
};

const BUCKET_CAP: f64 = 10_000.0;

/// Measures usage as milliseconds elapsed since the current cycle started.
///
/// Unspent limit is banked into the bucket at the end of each cycle and
/// overspend is drawn from it.
#[derive(Debug)]
pub struct WallClockProbe {
    started: Cell<Instant>,
    limit_ms: f64,
    bucket: Cell<f64>,
}

impl WallClockProbe {
    pub fn new(limit_ms: f64, bucket: f64) -> Self {
        Self {
            started: Cell::new(Instant::now()),
            limit_ms,
            bucket: Cell::new(bucket.clamp(0.0, BUCKET_CAP)),
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.cpu_limit_ms, config.bucket)
    }

    pub fn start_cycle(&self) {
        self.started.set(Instant::now());
    }

    /// Closes the cycle and returns the usage it was charged.
    pub fn end_cycle(&self) -> f64 {
        let used = self.current_usage();
        let bucket = self.bucket.get() + self.limit_ms - used;
        self.bucket.set(bucket.clamp(0.0, BUCKET_CAP));
        used
    }
}

impl ComputeProbe for WallClockProbe {
    fn current_usage(&self) -> f64 {
        self.started.get().elapsed().as_secs_f64() * 1000.0
    }

    fn limit(&self) -> f64 {
        self.limit_ms
    }

    fn bucket(&self) -> f64 {
        self.bucket.get()
    }
}

/// Runs `config.cycles` cycles, one per interval tick, starting at tick 1.
///
/// Reports are only handed to `on_cycle`, in order, and not kept. Returns the
/// number of cycles run.
pub async fn drive<F>(
    scheduler: &mut Scheduler,
    probe: &WallClockProbe,
    shared: &mut SharedState,
    config: &SimulationConfig,
    mut on_cycle: F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&CycleReport),
{
    config.validate()?;
    let mut interval = tokio::time::interval(config.tick_interval);
    let mut completed = 0;

    for tick in 1..=config.cycles {
        interval.tick().await;
        probe.start_cycle();
        let env = Environment::new(tick, probe);
        let report = scheduler.run(&env, shared);
        let used = probe.end_cycle();
        debug!(
            "Tick {} used {:.3}ms, bucket {:.1}",
            tick,
            used,
            probe.bucket()
        );
        on_cycle(&report);
        completed += 1;
    }

    Ok(completed)
}

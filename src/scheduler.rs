//! The per-cycle run loop.
//!
//! One call to [`Scheduler::run`] is one cycle:
//!
//! ```text
//! run(env, shared)
//!  ├── processes.all_sorted_by_priority()    (empty -> warn, return)
//!  ├── protocols.compose_all()                (first non-empty cycle only, cached)
//!  ├── assembler.assemble(env, shared, surface)
//!  └── for each descriptor, highest priority first
//!       ├── usage >= limit * emergency_threshold ?  -> skip the rest, warn
//!       ├── resolve instance (singleton: cached, per-cycle: fresh)
//!       ├── run under catch_unwind, bracketed by metrics
//!       └── Ok -> run += 1 | Err / panic -> failed += 1, log, continue
//! ```
//!
//! The budget is only checked between units. A unit that overspends inside
//! its own `run` cannot be interrupted; the overspend is only seen before the
//! next unit.

use std::{
    any::Any,
    error::Error as _,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use serde::Serialize;

use crate::{
    config::SchedulerConfig,
    context::{ContextAssembler, Environment, SharedState},
    diagnostics::{metrics::MetricsSink, Logger},
    error::{ConfigError, ProcessError, RegistrationResult},
    process::{process_table::ProcessTable, Process, ProcessConfig, ProcessDescriptor},
    protocol::{
        protocol_table::{ProtocolDescriptor, ProtocolTable},
        surface::CapabilitySurface,
        Protocol, ProtocolConfig,
    },
};

/// Outcome counts for one cycle. Observational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub tick: u64,
    /// Units that ran to completion.
    pub run: usize,
    /// Units that returned an error or panicked.
    pub failed: usize,
    /// Units not started because the budget threshold was reached.
    pub skipped: usize,
}

impl CycleReport {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.run + self.failed + self.skipped
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

pub struct Scheduler {
    processes: ProcessTable,
    protocols: ProtocolTable,
    config: SchedulerConfig,
    assembler: ContextAssembler,
    surface: Option<CapabilitySurface>,
}

impl Scheduler {
    pub fn new(
        processes: ProcessTable,
        protocols: ProtocolTable,
        config: SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            processes,
            protocols,
            config,
            assembler: ContextAssembler::default(),
            surface: None,
        })
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.assembler = self.assembler.with_logger(logger);
        self
    }

    pub fn with_metrics(mut self, metrics: Rc<dyn MetricsSink>) -> Self {
        self.assembler = self.assembler.with_metrics(metrics);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn processes_mut(&mut self) -> &mut ProcessTable {
        &mut self.processes
    }

    pub fn protocols(&self) -> &ProtocolTable {
        &self.protocols
    }

    /// Protocols registered after the first composed cycle never reach the
    /// cached surface.
    pub fn protocols_mut(&mut self) -> &mut ProtocolTable {
        &mut self.protocols
    }

    /// The composed surface, once a non-empty cycle has run.
    pub fn surface(&self) -> Option<&CapabilitySurface> {
        self.surface.as_ref()
    }

    pub fn registered_unit_count(&self) -> usize {
        self.processes.len()
    }

    pub fn registered_unit_names_in_priority_order(&self) -> Vec<String> {
        self.processes
            .all_sorted_by_priority()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Runs one cycle. Unit failures are contained here and never returned.
    pub fn run(&mut self, env: &Environment<'_>, shared: &mut SharedState) -> CycleReport {
        let mut report = CycleReport::new(env.tick());

        if self.processes.is_empty() {
            self.assembler
                .logger()
                .warn("No processes registered; nothing to run this cycle");
            return report;
        }

        let protocols = &mut self.protocols;
        let surface = self
            .surface
            .get_or_insert_with(|| protocols.compose_all());

        let sorted = self.processes.all_sorted_by_priority();
        let total = sorted.len();
        let threshold = self.config.emergency_threshold;
        let compute = env.compute();
        let logger = self.assembler.logger();
        let metrics = self.assembler.metrics();
        let mut ctx = self.assembler.assemble(env, shared, surface);

        for (index, descriptor) in sorted.into_iter().enumerate() {
            let usage_before = compute.current_usage();
            let limit = compute.limit();
            if usage_before >= limit * threshold {
                report.skipped = total - index;
                logger.warn(&format!(
                    "Compute usage {:.2} reached emergency threshold {} of limit {:.2}; skipping {} remaining process(es) starting at {}",
                    usage_before,
                    threshold,
                    limit,
                    report.skipped,
                    descriptor.name()
                ));
                break;
            }

            let name = descriptor.name();
            let bracket = format!("process.{}", name);
            metrics.begin(&bracket);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                descriptor.with_instance(|process| process.run(&mut ctx))
            }));
            metrics.end(&bracket);
            metrics.record(
                &format!("process.{}.cpu", name),
                compute.current_usage() - usage_before,
            );

            match outcome {
                Ok(Ok(())) => report.run += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    logger.error(&describe_failure(name, &error));
                }
                Err(payload) => {
                    report.failed += 1;
                    logger.error(&format!(
                        "Process {} panicked: {}",
                        name,
                        panic_message(payload.as_ref())
                    ));
                }
            }
        }

        metrics.record("cycle.run", report.run as f64);
        metrics.record("cycle.failed", report.failed as f64);
        metrics.record("cycle.skipped", report.skipped as f64);

        let summary = format!(
            "Cycle {} finished: run={}, failed={}, skipped={}",
            report.tick, report.run, report.failed, report.skipped
        );
        if report.is_clean() {
            logger.info(&summary);
        } else {
            logger.warn(&summary);
        }

        report
    }
}

/// Error message followed by its `source()` chain.
fn describe_failure(name: &str, error: &ProcessError) -> String {
    let mut message = format!("Process {} failed: {}", name, error);
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    message
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Startup manifest: registers every unit and protocol before the first cycle.
#[derive(Default)]
pub struct SchedulerBuilder {
    processes: ProcessTable,
    protocols: ProtocolTable,
    config: SchedulerConfig,
    logger: Option<Rc<dyn Logger>>,
    metrics: Option<Rc<dyn MetricsSink>>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: Rc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn process(mut self, descriptor: ProcessDescriptor) -> RegistrationResult<Self> {
        self.processes.register(descriptor)?;
        Ok(self)
    }

    pub fn process_default<P: Process + Default + 'static>(
        mut self,
        config: ProcessConfig,
    ) -> RegistrationResult<Self> {
        self.processes.register_default::<P>(config)?;
        Ok(self)
    }

    pub fn protocol(mut self, descriptor: ProtocolDescriptor) -> RegistrationResult<Self> {
        self.protocols.register(descriptor)?;
        Ok(self)
    }

    pub fn protocol_default<P: Protocol + Default>(
        mut self,
        config: ProtocolConfig,
    ) -> RegistrationResult<Self> {
        self.protocols.register_default::<P>(config)?;
        Ok(self)
    }

    pub fn build(self) -> Result<Scheduler, ConfigError> {
        let mut scheduler = Scheduler::new(self.processes, self.protocols, self.config)?;
        if let Some(logger) = self.logger {
            scheduler = scheduler.with_logger(logger);
        }
        if let Some(metrics) = self.metrics {
            scheduler = scheduler.with_metrics(metrics);
        }
        Ok(scheduler)
    }
}

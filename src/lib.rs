//! # tickcore: tick-based process scheduling
//!
//! tickcore runs a set of registered behavior units ("processes") once per
//! discrete time step ("tick"). Units run in priority order, each sees the same
//! per-cycle execution context, and all share one capability surface composed
//! from registered protocol objects.
//!
//! ## Layers
//!
//! - Registration: [`process::process_table`] and [`protocol::protocol_table`]
//!   hold named descriptors and reject duplicate names at registration time.
//! - Composition: [`protocol::protocol_table::ProtocolTable::compose_all`]
//!   merges every protocol's members into one
//!   [`protocol::surface::CapabilitySurface`].
//! - Context: [`context::ContextAssembler`] bundles the host environment, the
//!   shared state, the diagnostics sinks and the surface into an
//!   [`context::ExecutionContext`].
//! - Execution: [`scheduler::Scheduler::run`] drives one cycle under a compute
//!   budget and contains unit failures.
//!
//! ## Cycle
//!
//! ```text
//! host tick ─► Scheduler::run(env, shared)
//!                 ├─ sort units by priority (desc, stable)
//!                 ├─ compose surface (first cycle only)
//!                 ├─ assemble context
//!                 └─ for each unit: budget check ─► run ─► count
//!              ◄─ CycleReport { run, failed, skipped }
//! ```
//!
//! Everything runs on one thread. Hosts that want a timer can use
//! [`simulation::drive`], which feeds the scheduler from a tokio interval.

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod process;
pub mod protocol;
pub mod scheduler;
pub mod simulation;

// Re-exports
pub use context::{ComputeProbe, ContextAssembler, Environment, ExecutionContext, SharedState};
pub use error::*;
pub use process::{process_table::ProcessTable, Lifecycle, Process, ProcessConfig, ProcessDescriptor};
pub use protocol::{
    protocol_table::{ProtocolDescriptor, ProtocolTable},
    surface::CapabilitySurface,
    Member, Members, Protocol, ProtocolConfig,
};
pub use scheduler::{CycleReport, Scheduler, SchedulerBuilder};

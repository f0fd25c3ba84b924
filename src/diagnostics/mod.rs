//! Diagnostics collaborators handed to the scheduler.
//!
//! Both sinks are injectable. When nothing is configured the scheduler uses
//! [`NoopLogger`] and [`metrics::NoopMetrics`], so it runs without any setup.

pub mod metrics;

use mockall::automock;

pub const LOG_TARGET: &str = "tickcore";

/// Line-oriented log sink.
#[automock]
pub trait Logger {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Forwards every line to `tracing` under the `tickcore` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: LOG_TARGET, "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: LOG_TARGET, "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: LOG_TARGET, "{}", message);
    }
}

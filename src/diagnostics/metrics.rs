use std::{sync::Arc, time::Instant};

use dashmap::DashMap;
use mockall::automock;

/// Named numeric samples plus begin/end duration brackets.
#[automock]
pub trait MetricsSink {
    fn begin(&self, name: &str);
    fn end(&self, name: &str);
    fn record(&self, name: &str, value: f64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn begin(&self, _name: &str) {}
    fn end(&self, _name: &str) {}
    fn record(&self, _name: &str, _value: f64) {}
}

/// Keeps every sample in memory.
///
/// `end` turns an open bracket into a sample of elapsed milliseconds recorded
/// under the bracket's name. An `end` without a matching `begin` is ignored.
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    open: Arc<DashMap<String, Instant>>,
    samples: Arc<DashMap<String, Vec<f64>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self, name: &str) -> Vec<f64> {
        self.samples
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.samples.get(name).map(|entry| entry.len()).unwrap_or(0)
    }

    pub fn sum(&self, name: &str) -> f64 {
        self.samples
            .get(name)
            .map(|entry| entry.iter().sum())
            .unwrap_or(0.0)
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        let count = self.count(name);
        if count == 0 {
            return None;
        }
        Some(self.sum(name) / count as f64)
    }

    /// Sample names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.open.clear();
        self.samples.clear();
    }
}

impl MetricsSink for InMemoryMetrics {
    fn begin(&self, name: &str) {
        self.open.insert(name.to_string(), Instant::now());
    }

    fn end(&self, name: &str) {
        if let Some((_, started)) = self.open.remove(name) {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            self.record(name, elapsed_ms);
        }
    }

    fn record(&self, name: &str, value: f64) {
        self.samples
            .entry(name.to_string())
            .or_default()
            .push(value);
    }
}

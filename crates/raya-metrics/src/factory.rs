//! Metric primitives and the factory seam to a metrics registry

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A started timing operation
pub trait TimerContext: Send {
    /// Stop timing and record the elapsed time
    fn stop(&mut self);
}

/// Monotonic counter
pub trait Counter: Send + Sync {
    /// Increment by one
    fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment by `n`
    fn inc_by(&self, n: i64);

    /// Decrement by one
    fn dec(&self) {
        self.inc_by(-1);
    }
}

/// Rate meter
pub trait Meter: Send + Sync {
    /// Record one event
    fn mark(&self);
}

/// Value distribution
pub trait Histogram: Send + Sync {
    /// Record a sample
    fn update(&self, value: i64);
}

/// Source of named metrics, implemented by a metrics registry
pub trait MetricsFactory: Send + Sync {
    /// Start a timer for `name`
    fn timer_context(&self, name: &str) -> Box<dyn TimerContext>;

    /// Counter registered under `name`
    fn counter(&self, name: &str) -> Arc<dyn Counter>;

    /// Meter registered under `name`
    fn meter(&self, name: &str) -> Arc<dyn Meter>;

    /// Histogram registered under `name`
    fn histogram(&self, name: &str) -> Arc<dyn Histogram>;
}

struct Noop;

impl TimerContext for Noop {
    fn stop(&mut self) {}
}

impl Counter for Noop {
    fn inc_by(&self, _n: i64) {}
}

impl Meter for Noop {
    fn mark(&self) {}
}

impl Histogram for Noop {
    fn update(&self, _value: i64) {}
}

/// Factory whose metrics discard everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFactory;

impl MetricsFactory for NoopFactory {
    fn timer_context(&self, _name: &str) -> Box<dyn TimerContext> {
        Box::new(Noop)
    }

    fn counter(&self, _name: &str) -> Arc<dyn Counter> {
        Arc::new(Noop)
    }

    fn meter(&self, _name: &str) -> Arc<dyn Meter> {
        Arc::new(Noop)
    }

    fn histogram(&self, _name: &str) -> Arc<dyn Histogram> {
        Arc::new(Noop)
    }
}

/// Point-in-time copy of an [`InMemoryFactory`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Counter values by name
    pub counters: FxHashMap<String, i64>,
    /// Meter event counts by name
    pub meters: FxHashMap<String, u64>,
    /// Number of completed timings by name
    pub timers: FxHashMap<String, u64>,
    /// Total recorded time by name
    pub timer_totals: FxHashMap<String, Duration>,
    /// Histogram samples by name
    pub histograms: FxHashMap<String, Vec<i64>>,
}

impl Snapshot {
    /// Counter value, zero when never touched
    pub fn counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Meter count, zero when never marked
    pub fn meter(&self, name: &str) -> u64 {
        self.meters.get(name).copied().unwrap_or(0)
    }

    /// Completed timings, zero when never stopped
    pub fn timer(&self, name: &str) -> u64 {
        self.timers.get(name).copied().unwrap_or(0)
    }
}

/// Factory keeping every metric in process memory
///
/// Useful for embedding hosts without a registry and for tests.
#[derive(Clone, Default)]
pub struct InMemoryFactory {
    state: Arc<Mutex<Snapshot>>,
}

impl InMemoryFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current values
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().clone()
    }
}

struct MemoryMetric {
    name: String,
    state: Arc<Mutex<Snapshot>>,
}

struct MemoryTimer {
    metric: MemoryMetric,
    started: Instant,
    stopped: bool,
}

impl TimerContext for MemoryTimer {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let elapsed = self.started.elapsed();
        let mut state = self.metric.state.lock();
        *state.timers.entry(self.metric.name.clone()).or_insert(0) += 1;
        *state
            .timer_totals
            .entry(self.metric.name.clone())
            .or_insert(Duration::ZERO) += elapsed;
    }
}

impl Counter for MemoryMetric {
    fn inc_by(&self, n: i64) {
        *self.state.lock().counters.entry(self.name.clone()).or_insert(0) += n;
    }
}

impl Meter for MemoryMetric {
    fn mark(&self) {
        *self.state.lock().meters.entry(self.name.clone()).or_insert(0) += 1;
    }
}

impl Histogram for MemoryMetric {
    fn update(&self, value: i64) {
        self.state
            .lock()
            .histograms
            .entry(self.name.clone())
            .or_default()
            .push(value);
    }
}

impl InMemoryFactory {
    fn metric(&self, name: &str) -> MemoryMetric {
        MemoryMetric {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }
    }
}

impl MetricsFactory for InMemoryFactory {
    fn timer_context(&self, name: &str) -> Box<dyn TimerContext> {
        Box::new(MemoryTimer {
            metric: self.metric(name),
            started: Instant::now(),
            stopped: false,
        })
    }

    fn counter(&self, name: &str) -> Arc<dyn Counter> {
        Arc::new(self.metric(name))
    }

    fn meter(&self, name: &str) -> Arc<dyn Meter> {
        Arc::new(self.metric(name))
    }

    fn histogram(&self, name: &str) -> Arc<dyn Histogram> {
        Arc::new(self.metric(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_factory_accepts_everything() {
        let factory = NoopFactory;
        factory.counter("a").inc();
        factory.meter("a").mark();
        factory.histogram("a").update(3);
        factory.timer_context("a").stop();
    }

    #[test]
    fn test_in_memory_factory_records() {
        let factory = InMemoryFactory::new();
        factory.counter("calls").inc();
        factory.counter("calls").inc_by(2);
        factory.counter("calls").dec();
        factory.meter("hits").mark();
        factory.histogram("sizes").update(7);

        let mut timer = factory.timer_context("work");
        timer.stop();
        timer.stop();

        let snap = factory.snapshot();
        assert_eq!(snap.counter("calls"), 2);
        assert_eq!(snap.meter("hits"), 1);
        assert_eq!(snap.timer("work"), 1);
        assert_eq!(snap.histograms["sizes"], vec![7]);
        assert_eq!(snap.counter("missing"), 0);
    }
}

//! Entry points called by woven code
//!
//! [`MetricsFacade`] dispatches to a [`MetricsFactory`]. The process-wide
//! [`Metrics`] handle is what `raya/metrics/Metrics` resolves to at runtime;
//! it starts out with a [`NoopFactory`] until a registry is installed.

use crate::factory::{MetricsFactory, NoopFactory, TimerContext};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Re-entrancy depth of guarded counts on the current thread, by metric name.
    static GUARD_DEPTH: RefCell<FxHashMap<String, u32>> = RefCell::new(FxHashMap::default());
}

/// Dispatches facade calls to a metrics factory
#[derive(Clone)]
pub struct MetricsFacade {
    factory: Arc<dyn MetricsFactory>,
}

impl Default for MetricsFacade {
    fn default() -> Self {
        Self::new(Arc::new(NoopFactory))
    }
}

impl MetricsFacade {
    /// Create a facade over `factory`
    pub fn new(factory: Arc<dyn MetricsFactory>) -> Self {
        Self { factory }
    }

    /// The backing factory
    pub fn factory(&self) -> &Arc<dyn MetricsFactory> {
        &self.factory
    }

    /// Start a timer; the caller stops it on every exit
    pub fn start_timer(&self, name: &str) -> Box<dyn TimerContext> {
        self.factory.timer_context(name)
    }

    /// Increment the counter `name`
    pub fn count(&self, name: &str) {
        self.factory.counter(name).inc();
    }

    /// Mark the meter `name`
    pub fn mark(&self, name: &str) {
        self.factory.meter(name).mark();
    }

    /// Enter a guarded count
    ///
    /// The counter is incremented only when the calling thread is not
    /// already inside a guarded count for `name`, so recursive and nested
    /// calls count as one logical invocation.
    pub fn start_api_count(&self, name: &str) {
        let outermost = GUARD_DEPTH.with(|depths| {
            let mut depths = depths.borrow_mut();
            let depth = depths.entry(name.to_string()).or_insert(0);
            *depth += 1;
            *depth == 1
        });
        if outermost {
            self.count(name);
        }
    }

    /// Leave a guarded count; a no-op when not inside one
    pub fn end_api_count(&self, name: &str) {
        GUARD_DEPTH.with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(name) {
                *depth -= 1;
                if *depth == 0 {
                    depths.remove(name);
                }
            }
        });
    }

    /// Current guarded-count depth of `name` on this thread
    pub fn api_depth(name: &str) -> u32 {
        GUARD_DEPTH.with(|depths| depths.borrow().get(name).copied().unwrap_or(0))
    }
}

static GLOBAL: Lazy<RwLock<MetricsFacade>> = Lazy::new(|| RwLock::new(MetricsFacade::default()));

/// Process-wide facade used by woven code
pub struct Metrics;

impl Metrics {
    /// Install `factory` as the process-wide backend
    pub fn set_factory(factory: Arc<dyn MetricsFactory>) {
        *GLOBAL.write() = MetricsFacade::new(factory);
        tracing::debug!("metrics factory installed");
    }

    /// Restore the no-op backend
    pub fn reset() {
        *GLOBAL.write() = MetricsFacade::default();
    }

    /// Clone of the current process-wide facade
    pub fn facade() -> MetricsFacade {
        GLOBAL.read().clone()
    }

    /// `Metrics.startTimer`
    pub fn start_timer(name: &str) -> Box<dyn TimerContext> {
        GLOBAL.read().start_timer(name)
    }

    /// `Metrics.count`
    pub fn count(name: &str) {
        GLOBAL.read().count(name);
    }

    /// `Metrics.mark`
    pub fn mark(name: &str) {
        GLOBAL.read().mark(name);
    }

    /// `Metrics.startAPICount`
    pub fn start_api_count(name: &str) {
        GLOBAL.read().start_api_count(name);
    }

    /// `Metrics.endAPICount`
    pub fn end_api_count(name: &str) {
        GLOBAL.read().end_api_count(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::InMemoryFactory;

    #[test]
    fn test_guarded_count_counts_outermost_only() {
        let factory = InMemoryFactory::new();
        let facade = MetricsFacade::new(Arc::new(factory.clone()));

        facade.start_api_count("api.call");
        facade.start_api_count("api.call");
        assert_eq!(MetricsFacade::api_depth("api.call"), 2);
        facade.end_api_count("api.call");
        facade.end_api_count("api.call");
        assert_eq!(MetricsFacade::api_depth("api.call"), 0);

        facade.start_api_count("api.call");
        facade.end_api_count("api.call");

        assert_eq!(factory.snapshot().counter("api.call"), 2);
    }

    #[test]
    fn test_end_without_start_is_noop() {
        let factory = InMemoryFactory::new();
        let facade = MetricsFacade::new(Arc::new(factory.clone()));
        facade.end_api_count("orphan");
        assert_eq!(MetricsFacade::api_depth("orphan"), 0);
        facade.start_api_count("orphan");
        assert_eq!(factory.snapshot().counter("orphan"), 1);
        facade.end_api_count("orphan");
    }

    #[test]
    fn test_guard_depth_is_per_thread() {
        let factory = InMemoryFactory::new();
        let facade = MetricsFacade::new(Arc::new(factory.clone()));
        facade.start_api_count("shared");

        let other = facade.clone();
        std::thread::spawn(move || {
            other.start_api_count("shared");
            other.end_api_count("shared");
        })
        .join()
        .unwrap();

        facade.end_api_count("shared");
        assert_eq!(factory.snapshot().counter("shared"), 2);
    }

    #[test]
    fn test_timer_count_mark() {
        let factory = InMemoryFactory::new();
        let facade = MetricsFacade::new(Arc::new(factory.clone()));
        let mut timer = facade.start_timer("svc.compute");
        facade.count("svc.calls");
        facade.mark("svc.rate");
        timer.stop();

        let snap = factory.snapshot();
        assert_eq!(snap.timer("svc.compute"), 1);
        assert_eq!(snap.counter("svc.calls"), 1);
        assert_eq!(snap.meter("svc.rate"), 1);
    }
}

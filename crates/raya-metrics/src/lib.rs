//! Raya metrics runtime
//!
//! The runtime half of metrics weaving: the facade woven code calls into,
//! the factory seam to a metrics registry, re-entrancy guarded counts and
//! return-value capture.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod capture;
pub mod facade;
pub mod factory;
pub mod symbols;
pub mod value;

pub use capture::{AccessorExtractor, CaptureError, ExtractorRegistry, ReturnCapture, ReturnKey, ReturnKeyExtractor};
pub use facade::{Metrics, MetricsFacade};
pub use factory::{Counter, Histogram, InMemoryFactory, Meter, MetricsFactory, NoopFactory, Snapshot, TimerContext};
pub use value::{Introspect, Value};

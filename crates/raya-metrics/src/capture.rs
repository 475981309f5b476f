//! Return-value capture
//!
//! A capture call derives a metric-name suffix from a method's return value
//! and counts or marks the derived metric. Suffixes come from the value's
//! display form, from an accessor on the value, or from a named helper
//! registered in an [`ExtractorRegistry`]. Failures never reach the
//! instrumented call site; they become `_error_<code>` suffixes.

use crate::facade::{Metrics, MetricsFacade};
use crate::value::Value;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Suffix used when the returned value is absent
pub const NULL_RETURN_SUFFIX: &str = "_nullreturn";

/// Failure while deriving a suffix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The value has no accessor with that name
    #[error("{type_name} has no accessor {accessor}")]
    NoSuchAccessor {
        /// Runtime type of the value
        type_name: String,
        /// Requested accessor
        accessor: String,
    },

    /// The accessor ran and failed
    #[error("accessor failed: {0}")]
    AccessorFailed(String),

    /// Accessor requested on a primitive value
    #[error("value is not an object")]
    NotAnObject,

    /// No helper registered under the name
    #[error("no helper registered as {0}")]
    UnknownHelper(String),

    /// The helper ran and failed
    #[error("helper failed: {0}")]
    HelperFailed(String),

    /// The extractor panicked
    #[error("extractor panicked")]
    Panicked,
}

impl CaptureError {
    /// Stable code used in error-marker suffixes
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::NoSuchAccessor { .. } => "no_such_accessor",
            CaptureError::AccessorFailed(_) => "accessor_failed",
            CaptureError::NotAnObject => "not_an_object",
            CaptureError::UnknownHelper(_) => "invalid_helper",
            CaptureError::HelperFailed(_) => "helper_failed",
            CaptureError::Panicked => "panicked",
        }
    }
}

/// How the suffix is derived when not from the value's display form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnKey {
    /// Invoke the named no-argument accessor on the value
    Accessor(String),
    /// Pass the value to the named registered helper
    Helper(String),
}

/// Derives a metric-name suffix from a returned value
///
/// A panicking extractor is reported as [`CaptureError::Panicked`]. This
/// needs `panic = "unwind"`; under `panic = "abort"` the process aborts.
pub trait ReturnKeyExtractor: Send + Sync {
    /// Suffix for `value`; never called with [`Value::Null`]
    fn extract(&self, value: &Value) -> Result<String, CaptureError>;
}

/// Extractor invoking an accessor on the value itself
#[derive(Debug, Clone)]
pub struct AccessorExtractor {
    accessor: String,
}

impl AccessorExtractor {
    /// Extractor calling `accessor`
    pub fn new(accessor: impl Into<String>) -> Self {
        Self {
            accessor: accessor.into(),
        }
    }
}

impl ReturnKeyExtractor for AccessorExtractor {
    fn extract(&self, value: &Value) -> Result<String, CaptureError> {
        match value {
            Value::Object(obj) => obj.invoke(&self.accessor).map(|v| v.to_string()),
            _ => Err(CaptureError::NotAnObject),
        }
    }
}

impl<F> ReturnKeyExtractor for F
where
    F: Fn(&Value) -> Result<String, CaptureError> + Send + Sync,
{
    fn extract(&self, value: &Value) -> Result<String, CaptureError> {
        self(value)
    }
}

/// Helpers by name, built at startup and read-only afterwards
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    helpers: FxHashMap<String, Arc<dyn ReturnKeyExtractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `helper` under `name` (builder style)
    pub fn with_helper(mut self, name: impl Into<String>, helper: impl ReturnKeyExtractor + 'static) -> Self {
        self.register(name, helper);
        self
    }

    /// Register `helper` under `name`, replacing any previous helper
    pub fn register(&mut self, name: impl Into<String>, helper: impl ReturnKeyExtractor + 'static) {
        self.helpers.insert(name.into(), Arc::new(helper));
    }

    /// Look up a helper
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ReturnKeyExtractor>> {
        self.helpers.get(name)
    }

    /// Number of helpers
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Whether no helper is registered
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

static REGISTRY: Lazy<RwLock<Arc<ExtractorRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(ExtractorRegistry::new())));

/// Capture entry points bound to a facade and a helper registry
#[derive(Clone)]
pub struct ReturnCapture {
    facade: MetricsFacade,
    registry: Arc<ExtractorRegistry>,
}

impl ReturnCapture {
    /// Bind to `facade` and `registry`
    pub fn new(facade: MetricsFacade, registry: Arc<ExtractorRegistry>) -> Self {
        Self { facade, registry }
    }

    /// Process-wide instance: the global facade and the installed registry
    pub fn global() -> Self {
        Self::new(Metrics::facade(), Arc::clone(&REGISTRY.read()))
    }

    /// Install the process-wide helper registry
    pub fn install_registry(registry: ExtractorRegistry) {
        *REGISTRY.write() = Arc::new(registry);
        tracing::debug!("return capture registry installed");
    }

    /// Metric name for a returned value
    pub fn metric_name(&self, value: &Value, name: &str, key: Option<&ReturnKey>) -> String {
        if value.is_null() {
            return format!("{}{}", name, NULL_RETURN_SUFFIX);
        }
        let suffix = match key {
            None => Ok(value.to_string()),
            Some(ReturnKey::Accessor(accessor)) => guarded(&AccessorExtractor::new(accessor.as_str()), value),
            Some(ReturnKey::Helper(helper)) => match self.registry.get(helper) {
                Some(extractor) => guarded(extractor.as_ref(), value),
                None => Err(CaptureError::UnknownHelper(helper.clone())),
            },
        };
        match suffix {
            Ok(suffix) => format!("{}.{}", name, suffix),
            Err(err) => {
                tracing::debug!(metric = name, error = %err, "return capture failed");
                format!("{}_error_{}", name, err.code())
            }
        }
    }

    /// `ReturnCapture.countCapture` / `countCaptureUsingHelper`
    pub fn count_capture(&self, value: &Value, name: &str, key: Option<&ReturnKey>) {
        let metric = self.metric_name(value, name, key);
        self.facade.count(&metric);
    }

    /// `ReturnCapture.markCapture` / `markCaptureUsingHelper`
    pub fn mark_capture(&self, value: &Value, name: &str, key: Option<&ReturnKey>) {
        let metric = self.metric_name(value, name, key);
        self.facade.mark(&metric);
    }
}

fn guarded(extractor: &dyn ReturnKeyExtractor, value: &Value) -> Result<String, CaptureError> {
    catch_unwind(AssertUnwindSafe(|| extractor.extract(value))).unwrap_or(Err(CaptureError::Panicked))
}

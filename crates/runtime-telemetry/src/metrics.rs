//! Prometheus metrics for the module runtime.
//!
//! All metrics follow the naming convention: `txr_<area>_<metric>_<unit>`
//!
//! Collectors are process-global and can be updated before (or without)
//! `register_metrics`; registration only makes them visible to `gather`.

use lazy_static::lazy_static;
use prometheus::{exponential_buckets, CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // COMMIT METRICS
    // =========================================================================

    /// Transactions seen by the before-commit hook
    pub static ref COMMITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("txr_commits_total", "Transactions seen before commit"),
        &["runtime", "outcome"]  // outcome: dispatched/skipped/illegal/rejected/rolled_back
    ).expect("metric creation failed");

    /// Time spent in one module's before-commit
    pub static ref MODULE_DISPATCH_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "txr_module_dispatch_duration_seconds",
            "Time spent in a module handling one transaction"
        ).buckets(exponential_buckets(0.00001, 2.0, 16).expect("valid buckets")),
        &["module"]
    ).expect("metric creation failed");

    // =========================================================================
    // MODULE METRICS
    // =========================================================================

    /// Module failures by phase
    pub static ref MODULE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("txr_module_failures_total", "Module failures by phase"),
        &["module", "phase"]  // phase: initialize/before_commit/shutdown
    ).expect("metric creation failed");

    /// Stale module bookkeeping removed at startup
    pub static ref MODULES_PURGED: CounterVec = CounterVec::new(
        Opts::new("txr_modules_purged_total", "Metadata entries of unregistered modules removed"),
        &["runtime"]
    ).expect("metric creation failed");

    // =========================================================================
    // LIFECYCLE METRICS
    // =========================================================================

    /// Start attempts by outcome
    pub static ref STARTUP_ATTEMPTS: CounterVec = CounterVec::new(
        Opts::new("txr_startup_attempts_total", "Runtime start attempts"),
        &["outcome"]  // outcome: success/failure/panic
    ).expect("metric creation failed");
}

/// Handle returned once the collectors are registered.
#[derive(Debug)]
pub struct MetricsHandle {
    collectors: usize,
}

impl MetricsHandle {
    /// Number of collectors registered.
    pub fn collectors(&self) -> usize {
        self.collectors
    }
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Commits
        Box::new(COMMITS_TOTAL.clone()),
        Box::new(MODULE_DISPATCH_DURATION.clone()),
        // Modules
        Box::new(MODULE_FAILURES.clone()),
        Box::new(MODULES_PURGED.clone()),
        // Lifecycle
        Box::new(STARTUP_ATTEMPTS.clone()),
    ];

    let collectors = metrics.len();
    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle { collectors })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &prometheus::Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }

    /// Start a timer for one module's dispatch.
    pub fn for_module(module: &str) -> Self {
        Self::new(&MODULE_DISPATCH_DURATION.with_label_values(&[module]))
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Request lifecycle counters
    pub requests_total: IntCounter,
    pub attempts_total: IntCounter,
    pub confirmed_total: IntCounter,
    pub failed_on_chain_total: IntCounter,
    pub expired_total: IntCounter,
    pub timed_out_total: IntCounter,
    pub terminal_failures: IntCounterVec,

    // Ledger interaction counters
    pub windows_fetched: IntCounter,
    pub dependency_creations: IntCounter,

    // Gauges
    pub in_flight_requests: IntGauge,

    // Histograms
    pub rpc_latency: Histogram,
    pub submit_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "tx_requests_total",
            "Total number of transaction requests submitted to the engine",
        ))?;

        let attempts_total = IntCounter::with_opts(Opts::new(
            "tx_attempts_total",
            "Total number of submission attempts started",
        ))?;

        let confirmed_total =
            IntCounter::with_opts(Opts::new("tx_confirmed_total", "Requests confirmed"))?;

        let failed_on_chain_total = IntCounter::with_opts(Opts::new(
            "tx_failed_on_chain_total",
            "Requests that landed with an execution error",
        ))?;

        let expired_total = IntCounter::with_opts(Opts::new(
            "tx_attempts_expired_total",
            "Attempts whose validity window lapsed before confirmation",
        ))?;

        let timed_out_total = IntCounter::with_opts(Opts::new(
            "tx_attempts_timed_out_total",
            "Attempts whose confirmation was not observed in time",
        ))?;

        let terminal_failures = IntCounterVec::new(
            Opts::new("tx_terminal_failures_total", "Requests ending in a terminal failure"),
            &["cause"],
        )?;

        let windows_fetched = IntCounter::with_opts(Opts::new(
            "tx_validity_windows_fetched_total",
            "Validity windows fetched from the ledger",
        ))?;

        let dependency_creations = IntCounter::with_opts(Opts::new(
            "tx_dependency_creations_total",
            "Creation instructions produced for missing dependencies",
        ))?;

        let in_flight_requests = IntGauge::with_opts(Opts::new(
            "tx_in_flight_requests",
            "Requests currently being driven by the engine",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        let submit_latency = Histogram::with_opts(
            HistogramOpts::new("tx_submit_latency_seconds", "End-to-end request latency")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 180.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "tx_confirmation_latency_seconds",
                "Time from submission to a definitive status",
            )
            .buckets(vec![0.4, 1.0, 2.0, 5.0, 10.0, 20.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(confirmed_total.clone()))?;
        registry.register(Box::new(failed_on_chain_total.clone()))?;
        registry.register(Box::new(expired_total.clone()))?;
        registry.register(Box::new(timed_out_total.clone()))?;
        registry.register(Box::new(terminal_failures.clone()))?;
        registry.register(Box::new(windows_fetched.clone()))?;
        registry.register(Box::new(dependency_creations.clone()))?;
        registry.register(Box::new(in_flight_requests.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(submit_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            attempts_total,
            confirmed_total,
            failed_on_chain_total,
            expired_total,
            timed_out_total,
            terminal_failures,
            windows_fetched,
            dependency_creations,
            in_flight_requests,
            rpc_latency,
            submit_latency,
            confirmation_latency,
        })
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Record a terminal failure under its cause category
    pub fn record_terminal_failure(&self, category: &str) {
        self.terminal_failures.with_label_values(&[category]).inc();
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let m = Metrics::new().unwrap();
        m.requests_total.inc();
        m.record_terminal_failure("insufficient_resources");

        let text = m.render().unwrap();
        assert!(text.contains("tx_requests_total 1"));
        assert!(text.contains("cause=\"insufficient_resources\""));
    }

    #[test]
    fn test_global_metrics_is_shared() {
        let before = metrics().windows_fetched.get();
        metrics().windows_fetched.inc();
        assert!(metrics().windows_fetched.get() > before);
    }
}

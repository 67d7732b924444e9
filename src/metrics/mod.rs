// Pipeline Prometheus metrics
//
// Collectors live in a dedicated registry rather than the prometheus default
// one, so embedding processes can expose them separately.
//
// - Invocation outcomes (processed, skipped, rejected, failed)
// - Per-stage durations
// - Watermark asset lookups by source (memory, staged, fetched)

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Invocation outcome label values
pub const OUTCOME_PROCESSED: &str = "processed";
pub const OUTCOME_SKIPPED: &str = "skipped";
pub const OUTCOME_REJECTED: &str = "rejected";
pub const OUTCOME_FAILED: &str = "failed";

/// Global metrics for the transformation pipeline
pub struct PipelineMetrics {
    registry: Registry,

    /// Invocations by outcome
    pub invocations: IntCounterVec,

    /// Stage duration histogram (in seconds)
    pub stage_duration: HistogramVec,

    /// Watermark asset lookups by where the asset was found
    pub watermark_assets: IntCounterVec,
}

static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

impl PipelineMetrics {
    /// Return the global metrics instance, registering collectors on first use.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let registry = Registry::new();

            let invocations = register_int_counter_vec_with_registry!(
                "imgpipe_invocations_total",
                "Total number of pipeline invocations by outcome",
                &["outcome"], // processed, skipped, rejected, failed
                registry
            )
            .expect("Failed to register imgpipe_invocations_total metric");

            let stage_duration = register_histogram_vec_with_registry!(
                "imgpipe_stage_duration_seconds",
                "Duration of pipeline stages in seconds",
                &["stage"], // load, resize, watermark, quality, encode, upload
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0], // 1ms to 10s
                registry
            )
            .expect("Failed to register imgpipe_stage_duration_seconds metric");

            let watermark_assets = register_int_counter_vec_with_registry!(
                "imgpipe_watermark_assets_total",
                "Watermark asset lookups by source",
                &["source"], // memory, staged, fetched
                registry
            )
            .expect("Failed to register imgpipe_watermark_assets_total metric");

            Self {
                registry,
                invocations,
                stage_duration,
                watermark_assets,
            }
        })
    }

    pub fn record_invocation(&self, outcome: &str) {
        self.invocations.with_label_values(&[outcome]).inc();
    }

    pub fn observe_stage(&self, stage: &str, duration_secs: f64) {
        self.stage_duration
            .with_label_values(&[stage])
            .observe(duration_secs);
    }

    pub fn record_asset(&self, source: &str) {
        self.watermark_assets.with_label_values(&[source]).inc();
    }

    pub fn invocation_count(&self, outcome: &str) -> u64 {
        self.invocations.with_label_values(&[outcome]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode every collector in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

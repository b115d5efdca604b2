//! Prometheus counters for the render/update pipeline.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::fmt;

const PREFIX: &str = "stunner_gateway_operator";

/// Outcome label of an applied update request
pub const RESULT_SUCCESS: &str = "success";
/// Update abandoned after persistent conflicts
pub const RESULT_CONFLICT: &str = "conflict";
/// Target vanished
pub const RESULT_NOT_FOUND: &str = "not_found";
/// Any other client error
pub const RESULT_ERROR: &str = "error";
/// Still queued at shutdown
pub const RESULT_ABANDONED: &str = "abandoned";

/// Pipeline metrics; clones share the same counters
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    render_passes: IntCounter,
    render_triggers_dropped: IntCounter,
    update_requests_emitted: IntCounter,
    updates_applied: IntCounterVec,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("render_passes", &self.render_passes.get())
            .field("render_triggers_dropped", &self.render_triggers_dropped.get())
            .field("update_requests_emitted", &self.update_requests_emitted.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register all counters in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let render_passes = IntCounter::new(
            format!("{PREFIX}_render_passes_total"),
            "Total number of render passes",
        )?;
        let render_triggers_dropped = IntCounter::new(
            format!("{PREFIX}_render_triggers_dropped_total"),
            "Render triggers coalesced into an already pending render",
        )?;
        let update_requests_emitted = IntCounter::new(
            format!("{PREFIX}_update_requests_emitted_total"),
            "Update requests emitted by the renderer",
        )?;
        let updates_applied = IntCounterVec::new(
            Opts::new(
                format!("{PREFIX}_updates_applied_total"),
                "Update requests processed by the updater, by result",
            ),
            &["kind", "result"],
        )?;

        registry.register(Box::new(render_passes.clone()))?;
        registry.register(Box::new(render_triggers_dropped.clone()))?;
        registry.register(Box::new(update_requests_emitted.clone()))?;
        registry.register(Box::new(updates_applied.clone()))?;

        Ok(Self {
            registry,
            render_passes,
            render_triggers_dropped,
            update_requests_emitted,
            updates_applied,
        })
    }

    /// Record a render pass
    pub fn record_render_pass(&self) {
        self.render_passes.inc();
    }

    /// Record a coalesced render trigger
    pub fn record_trigger_dropped(&self) {
        self.render_triggers_dropped.inc();
    }

    /// Record emitted update requests
    pub fn record_updates_emitted(&self, count: usize) {
        self.update_requests_emitted.inc_by(count as u64);
    }

    /// Record the outcome of one update request
    pub fn record_update_applied(&self, kind: &str, result: &str) {
        self.updates_applied.with_label_values(&[kind, result]).inc();
    }

    /// Number of render passes so far
    pub fn render_passes(&self) -> u64 {
        self.render_passes.get()
    }

    /// Number of coalesced render triggers so far
    pub fn render_triggers_dropped(&self) -> u64 {
        self.render_triggers_dropped.get()
    }

    /// Number of updates with the given outcome so far
    pub fn updates_applied(&self, kind: &str, result: &str) -> u64 {
        self.updates_applied.with_label_values(&[kind, result]).get()
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

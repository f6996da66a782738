//! Prometheus metrics for the partition coordinator.
//!
//! Metrics cover:
//! - Refresh cycles and their outcome (reconciled, deferred, failed)
//! - Ownership churn (partitions added/removed)
//! - Currently managed partitions per topic
//! - Metadata fetch latency and connection attempts
//! - Manager close failures
//!
//! All metrics are registered to a custom registry with the "partwise" prefix
//! to avoid name collisions with other libraries using the default Prometheus
//! registry. Registration errors are logged and the unregistered metric is
//! used instead of panicking.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Registry, TextEncoder,
    opts,
};
use tracing::warn;

/// Custom Prometheus registry for coordinator metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("partwise".to_string()), None).unwrap_or_else(|_| Registry::new())
});

// =============================================================================
// Metric Declaration Macros
// =============================================================================

/// Declare an IntGaugeVec metric with labels.
macro_rules! define_gauge_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<IntGaugeVec> = Lazy::new(|| {
            register_int_gauge_vec_safe(&REGISTRY, $metric_name, $help, &[$($label),+])
        });
    };
}

/// Declare an IntCounterVec metric with labels.
macro_rules! define_counter_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounterVec> = Lazy::new(|| {
            register_int_counter_vec_safe(&REGISTRY, $metric_name, $help, &[$($label),+])
        });
    };
}

/// Declare a HistogramVec metric with labels and buckets.
macro_rules! define_histogram_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?], [$($bucket:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<HistogramVec> = Lazy::new(|| {
            register_histogram_vec_safe(&REGISTRY, $metric_name, $help, &[$($label),+], vec![$($bucket),+])
        });
    };
}

// =============================================================================
// Refresh metrics
// =============================================================================

define_counter_vec!(
    REFRESHES,
    "refreshes_total",
    "Total refresh cycles by outcome",
    ["topic", "outcome"]
);
define_histogram_vec!(
    METADATA_FETCH_DURATION,
    "metadata_fetch_duration_seconds",
    "Metadata fetch duration in seconds",
    ["outcome"],
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
);
define_counter_vec!(
    METADATA_CONNECTS,
    "metadata_connects_total",
    "Metadata source connection attempts",
    ["status"]
);

// =============================================================================
// Ownership metrics
// =============================================================================

define_gauge_vec!(
    MANAGED_PARTITIONS,
    "managed_partitions",
    "Number of partitions with an open manager",
    ["topic"]
);
define_counter_vec!(
    PARTITION_CHANGES,
    "partition_changes_total",
    "Ownership changes applied by refreshes",
    ["topic", "change"]
);
define_counter_vec!(
    MANAGER_CLOSE_FAILURES,
    "manager_close_failures_total",
    "Partition managers that failed to close",
    ["topic"]
);

// =============================================================================
// Safe Registration
// =============================================================================

fn register_int_gauge_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntGaugeVec {
    let gauge = IntGaugeVec::new(opts!(name, help), labels).expect("metric opts should be valid");
    match registry.register(Box::new(gauge.clone())) {
        Ok(()) => gauge,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntGaugeVec metric, using unregistered fallback");
            gauge
        }
    }
}

fn register_int_counter_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntCounterVec {
    let counter =
        IntCounterVec::new(opts!(name, help), labels).expect("metric opts should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntCounterVec metric, using unregistered fallback");
            counter
        }
    }
}

fn register_histogram_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> HistogramVec {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
        .expect("metric opts should be valid");
    match registry.register(Box::new(histogram.clone())) {
        Ok(()) => histogram,
        Err(e) => {
            warn!(name, error = %e, "Failed to register HistogramVec metric, using unregistered fallback");
            histogram
        }
    }
}

/// Force registration of every metric so they show up before first use.
///
/// Idempotent.
pub fn init_metrics() {
    let _ = &*REFRESHES;
    let _ = &*METADATA_FETCH_DURATION;
    let _ = &*METADATA_CONNECTS;
    let _ = &*MANAGED_PARTITIONS;
    let _ = &*PARTITION_CHANGES;
    let _ = &*MANAGER_CLOSE_FAILURES;
}

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// =============================================================================
// Recording helpers
// =============================================================================

/// Record the outcome of one refresh cycle ("reconciled", "deferred", "failed").
pub fn record_refresh(topic: &str, outcome: &str) {
    REFRESHES.with_label_values(&[topic, outcome]).inc();
}

pub fn record_metadata_fetch(outcome: &str, duration_secs: f64) {
    METADATA_FETCH_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

pub fn record_connect(status: &str) {
    METADATA_CONNECTS.with_label_values(&[status]).inc();
}

pub fn record_partition_changes(topic: &str, added: usize, removed: usize) {
    if added > 0 {
        PARTITION_CHANGES
            .with_label_values(&[topic, "added"])
            .inc_by(added as u64);
    }
    if removed > 0 {
        PARTITION_CHANGES
            .with_label_values(&[topic, "removed"])
            .inc_by(removed as u64);
    }
}

pub fn set_managed_partitions(topic: &str, count: usize) {
    MANAGED_PARTITIONS
        .with_label_values(&[topic])
        .set(count as i64);
}

pub fn record_close_failure(topic: &str) {
    MANAGER_CLOSE_FAILURES.with_label_values(&[topic]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_encode_contains_prefix() {
        record_refresh("metrics-test-topic", "reconciled");
        let text = encode_metrics().unwrap();
        assert!(text.contains("partwise_refreshes_total"));
        assert!(text.contains("metrics-test-topic"));
    }

    #[test]
    fn test_partition_changes_skip_zero() {
        let topic = "metrics-changes-topic";
        record_partition_changes(topic, 2, 0);
        assert_eq!(
            PARTITION_CHANGES.with_label_values(&[topic, "added"]).get(),
            2
        );
        assert_eq!(
            PARTITION_CHANGES.with_label_values(&[topic, "removed"]).get(),
            0
        );
    }

    #[test]
    fn test_managed_partitions_gauge() {
        set_managed_partitions("metrics-gauge-topic", 4);
        assert_eq!(
            MANAGED_PARTITIONS
                .with_label_values(&["metrics-gauge-topic"])
                .get(),
            4
        );
    }
}

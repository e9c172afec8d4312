//! Settlement and ledger metrics, exported in the Prometheus text format

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct ShopMetrics {
    registry: Registry,
    pub rewards_queued: IntCounter,
    pub rewards_rejected: IntCounter,
    pub flush_cycles: IntCounter,
    pub identities_settled: IntCounter,
    pub mutation_failures: IntCounter,
    pub ledger_entries_written: IntCounter,
    pub ledger_write_errors: IntCounter,
    pub direct_records: IntCounter,
    pub pending_identities: IntGauge,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rewards_queued: u64,
    pub rewards_rejected: u64,
    pub flush_cycles: u64,
    pub identities_settled: u64,
    pub mutation_failures: u64,
    pub ledger_entries_written: u64,
    pub ledger_write_errors: u64,
    pub direct_records: u64,
    pub pending_identities: i64,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric names are static and valid");
    if let Err(e) = registry.register(Box::new(counter.clone())) {
        tracing::warn!(metric = name, error = %e, "Failed to register metric");
    }
    counter
}

impl ShopMetrics {
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("shopcore".to_string()), None)
            .unwrap_or_else(|_| Registry::new());

        let pending_identities = IntGauge::new(
            "pending_reward_identities",
            "Identities holding unflushed rewards",
        )
        .expect("metric names are static and valid");
        if let Err(e) = registry.register(Box::new(pending_identities.clone())) {
            tracing::warn!(error = %e, "Failed to register pending identities gauge");
        }

        Self {
            rewards_queued: counter(&registry, "rewards_queued_total", "Reward causes accepted into a bucket"),
            rewards_rejected: counter(&registry, "rewards_rejected_total", "Reward causes rejected at the queue boundary"),
            flush_cycles: counter(&registry, "flush_cycles_total", "Non-empty flush cycles executed"),
            identities_settled: counter(&registry, "identities_settled_total", "Buckets paid out successfully"),
            mutation_failures: counter(&registry, "mutation_failures_total", "Buckets dropped after the economy refused the mutation"),
            ledger_entries_written: counter(&registry, "ledger_entries_written_total", "Ledger entries appended"),
            ledger_write_errors: counter(&registry, "ledger_write_errors_total", "Ledger appends lost to backend errors"),
            direct_records: counter(&registry, "direct_records_total", "Immediate balance changes recorded"),
            pending_identities,
            registry,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rewards_queued: self.rewards_queued.get(),
            rewards_rejected: self.rewards_rejected.get(),
            flush_cycles: self.flush_cycles.get(),
            identities_settled: self.identities_settled.get(),
            mutation_failures: self.mutation_failures.get(),
            ledger_entries_written: self.ledger_entries_written.get(),
            ledger_write_errors: self.ledger_write_errors.get(),
            direct_records: self.direct_records.get(),
            pending_identities: self.pending_identities.get(),
        }
    }

    /// Prometheus text exposition of all registered metrics
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ShopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = ShopMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_render_contains_namespaced_counters() {
        let metrics = ShopMetrics::new();
        metrics.rewards_queued.inc_by(3);

        let text = metrics.render();
        assert!(text.contains("shopcore_rewards_queued_total 3"));
        assert!(text.contains("shopcore_pending_reward_identities"));
    }
}

//! Metrics sink (C8 collaborator): observability without a global registry.
//!
//! Per the design notes, the core never installs a Prometheus-style global
//! registry itself. Callers (`cli`, `rpc`) pass an implementation of
//! [`MetricsSink`] into [`crate::chain::Chain::new`] /
//! [`crate::mempool::Mempool::new`]-adjacent constructors; [`NoopMetrics`] is
//! the default used by tests and by collaborators that don't care.

/// Observation points a [`crate::chain::Chain`] reports to.
pub trait MetricsSink: Send + Sync {
    fn block_applied(&self, height: u64, tx_count: usize) {
        let _ = (height, tx_count);
    }
    fn transaction_admitted(&self, tx_hash: &str) {
        let _ = tx_hash;
    }
    fn transaction_rejected(&self, tx_hash: &str, reason: &str) {
        let _ = (tx_hash, reason);
    }
    fn double_spend_attempt(&self, sender: &str) {
        let _ = sender;
    }
    fn fork_resolved(&self, new_height: u64, reverted_blocks: usize) {
        let _ = (new_height, reverted_blocks);
    }
    fn mempool_size(&self, entries: usize, bytes: u64) {
        let _ = (entries, bytes);
    }
}

/// The default sink: observes nothing, used by tests and standalone use of
/// the crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Reassembly counters. All values only ever increase.
#[derive(Debug, Default)]
pub struct ReassStats {
    ooo_segments: AtomicU64,
    ooo_bytes: AtomicU64,
    dup_segments: AtomicU64,
    dup_bytes: AtomicU64,
    partial_dup_segments: AtomicU64,
    partial_dup_bytes: AtomicU64,
    quota_drops: AtomicU64,
    alloc_drops: AtomicU64,
    delivered_segments: AtomicU64,
    delivered_bytes: AtomicU64,
    discarded_bytes: AtomicU64,
}

/// Point-in-time copy of [`ReassStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassStatsSnapshot {
    /// Segments queued out of order.
    pub ooo_segments: u64,
    pub ooo_bytes: u64,
    /// Segments carrying no new bytes.
    pub dup_segments: u64,
    pub dup_bytes: u64,
    /// Segments trimmed because part of them was already known.
    pub partial_dup_segments: u64,
    pub partial_dup_bytes: u64,
    /// Drops because a segment quota was full.
    pub quota_drops: u64,
    /// Drops because entry bookkeeping could not be allocated.
    pub alloc_drops: u64,
    pub delivered_segments: u64,
    pub delivered_bytes: u64,
    /// Bytes delivered after the receiver stopped reading.
    pub discarded_bytes: u64,
}

macro_rules! bump {
    ($field:expr, $n:expr) => {
        $field.fetch_add($n as u64, Ordering::Relaxed)
    };
}

impl ReassStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn out_of_order(&self, bytes: usize) {
        bump!(self.ooo_segments, 1);
        bump!(self.ooo_bytes, bytes);
    }

    pub(crate) fn duplicate(&self, bytes: usize) {
        bump!(self.dup_segments, 1);
        bump!(self.dup_bytes, bytes);
    }

    pub(crate) fn partial_duplicate(&self, bytes: usize) {
        bump!(self.partial_dup_segments, 1);
        bump!(self.partial_dup_bytes, bytes);
    }

    pub(crate) fn quota_drop(&self) {
        bump!(self.quota_drops, 1);
    }

    pub(crate) fn alloc_drop(&self) {
        bump!(self.alloc_drops, 1);
    }

    pub(crate) fn delivered(&self, bytes: usize) {
        bump!(self.delivered_segments, 1);
        bump!(self.delivered_bytes, bytes);
    }

    pub(crate) fn discarded(&self, bytes: usize) {
        bump!(self.discarded_bytes, bytes);
    }

    /// Total segments dropped for either reason.
    pub fn drops(&self) -> u64 {
        self.quota_drops.load(Ordering::Relaxed) + self.alloc_drops.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ReassStatsSnapshot {
        ReassStatsSnapshot {
            ooo_segments: self.ooo_segments.load(Ordering::Relaxed),
            ooo_bytes: self.ooo_bytes.load(Ordering::Relaxed),
            dup_segments: self.dup_segments.load(Ordering::Relaxed),
            dup_bytes: self.dup_bytes.load(Ordering::Relaxed),
            partial_dup_segments: self.partial_dup_segments.load(Ordering::Relaxed),
            partial_dup_bytes: self.partial_dup_bytes.load(Ordering::Relaxed),
            quota_drops: self.quota_drops.load(Ordering::Relaxed),
            alloc_drops: self.alloc_drops.load(Ordering::Relaxed),
            delivered_segments: self.delivered_segments.load(Ordering::Relaxed),
            delivered_bytes: self.delivered_bytes.load(Ordering::Relaxed),
            discarded_bytes: self.discarded_bytes.load(Ordering::Relaxed),
        }
    }
}

static GLOBAL_STATS: Lazy<Arc<ReassStats>> = Lazy::new(|| Arc::new(ReassStats::new()));

/// Counters shared by queues that were not given their own.
pub fn global_stats() -> Arc<ReassStats> {
    GLOBAL_STATS.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let stats = ReassStats::new();
        stats.out_of_order(10);
        stats.out_of_order(5);
        stats.quota_drop();
        stats.alloc_drop();
        let snap = stats.snapshot();
        assert_eq!(snap.ooo_segments, 2);
        assert_eq!(snap.ooo_bytes, 15);
        assert_eq!(stats.drops(), 2);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = ReassStats::new();
        stats.delivered(7);
        let cbor = serde_cbor::to_vec(&stats.snapshot()).unwrap();
        let back: ReassStatsSnapshot = serde_cbor::from_slice(&cbor).unwrap();
        assert_eq!(back.delivered_bytes, 7);
    }
}

//! Process-wide accounting of queued reassembly segments.
#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use reass_core::config::CLUSTERS_PER_SEGMENT;
use tracing::{info, warn};

/// Shared budget of segment slots, contended by every reassembly queue.
///
/// Implementations must be safe to call from many connections at once; the queue itself holds no
/// lock around these calls.
pub trait SegmentQuota: Send + Sync {
    /// Take one slot. Returns `false` when the budget is exhausted.
    fn try_reserve(&self) -> bool;

    /// Give back one slot taken with [`try_reserve`](Self::try_reserve).
    fn release(&self);

    /// Slots currently taken.
    fn in_use(&self) -> usize;

    /// Total slots available.
    fn limit(&self) -> usize;
}

/// Atomic [`SegmentQuota`] whose limit follows the size of the buffer pool.
#[derive(Debug)]
pub struct SegmentZone {
    in_use: AtomicUsize,
    limit: AtomicUsize,
}

impl SegmentZone {
    /// Zone with a fixed limit.
    pub fn with_limit(limit: usize) -> Self {
        Self { in_use: AtomicUsize::new(0), limit: AtomicUsize::new(limit) }
    }

    /// Zone sized for a buffer pool of `nmbclusters` clusters.
    pub fn for_clusters(nmbclusters: usize) -> Self {
        Self::with_limit(nmbclusters / CLUSTERS_PER_SEGMENT)
    }

    /// Recompute the limit after the buffer pool was resized.
    pub fn resize(&self, nmbclusters: usize) {
        self.set_limit(nmbclusters / CLUSTERS_PER_SEGMENT);
    }

    /// Override the limit.
    ///
    /// Entries already above a shrunk limit stay queued; reservations fail until usage drains.
    pub fn set_limit(&self, limit: usize) {
        let old = self.limit.swap(limit, Ordering::AcqRel);
        let in_use = self.in_use.load(Ordering::Acquire);
        if limit < in_use {
            warn!(limit, in_use, "segment limit shrunk below current usage");
        }
        if old != limit {
            info!(old, new = limit, "segment zone resized");
        }
    }
}

impl SegmentQuota for SegmentZone {
    fn try_reserve(&self) -> bool {
        let limit = self.limit.load(Ordering::Acquire);
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if cur < limit { Some(cur + 1) } else { None }
            })
            .is_ok()
    }

    fn release(&self) {
        let res = self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| cur.checked_sub(1));
        if res.is_err() {
            warn!("segment zone release without matching reservation");
        }
    }

    fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    fn limit(&self) -> usize {
        self.limit.load(Ordering::Acquire)
    }
}

static GLOBAL_ZONE: Lazy<Arc<SegmentZone>> = Lazy::new(|| {
    Arc::new(SegmentZone::for_clusters(reass_core::ReassConfig::default().nmbclusters))
});

/// The zone shared by every queue created with [`ReassemblyQueue::new`](crate::ReassemblyQueue::new).
pub fn global_zone() -> Arc<SegmentZone> {
    GLOBAL_ZONE.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_stops_at_limit() {
        let zone = SegmentZone::with_limit(2);
        assert!(zone.try_reserve());
        assert!(zone.try_reserve());
        assert!(!zone.try_reserve());
        assert_eq!(zone.in_use(), 2);
        zone.release();
        assert!(zone.try_reserve());
    }

    #[test]
    fn release_never_underflows() {
        let zone = SegmentZone::with_limit(4);
        zone.release();
        assert_eq!(zone.in_use(), 0);
    }

    #[test]
    fn resize_derives_from_clusters() {
        let zone = SegmentZone::for_clusters(1600);
        assert_eq!(zone.limit(), 100);
        zone.resize(320);
        assert_eq!(zone.limit(), 20);
    }

    #[test]
    fn shrink_below_usage_blocks_new_reservations() {
        let zone = SegmentZone::with_limit(3);
        for _ in 0..3 { assert!(zone.try_reserve()); }
        zone.set_limit(1);
        assert!(!zone.try_reserve());
        zone.release();
        zone.release();
        assert!(!zone.try_reserve());
        zone.release();
        assert!(zone.try_reserve());
    }

    #[test]
    fn concurrent_reservations_respect_limit() {
        let zone = Arc::new(SegmentZone::with_limit(100));
        let handles: Vec<_> = (0..8).map(|_| {
            let zone = zone.clone();
            std::thread::spawn(move || (0..50).filter(|_| zone.try_reserve()).count())
        }).collect();
        let taken: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(taken, 100);
        assert_eq!(zone.in_use(), 100);
    }
}

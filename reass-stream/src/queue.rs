//! TCP out-of-order segment reassembly queue.
//!
//! Segments arriving ahead of `rcv_nxt` are held in sequence order until the gap before them is
//! filled. Overlap is resolved on insertion: the new segment is trimmed against its predecessor
//! and swallows or trims the successors it covers, so queued entries never overlap. After every
//! insertion the contiguous prefix starting at `rcv_nxt` is handed to the receive buffer.
//!
//! Queued entries are accounted against two budgets: the per-queue `max_len` and a
//! [`SegmentQuota`] shared with every other queue in the process. The last slot of each budget is
//! kept for the segment at `rcv_nxt`, so an out-of-order flood can never lock out the segment
//! that unblocks the connection.
#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use reass_core::seq::{seq_gt, seq_lt, SeqNum};
use tracing::{debug, trace};

use crate::sockbuf::ReceiveBuffer;
use crate::stats::{global_stats, ReassStats};
use crate::zone::{global_zone, SegmentQuota};

/// Why a segment was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReassDrop {
    /// A per-queue or global segment quota is full.
    #[error("reassembly quota exhausted")]
    ResourceExhausted,
    /// Bookkeeping for a new queue entry could not be allocated.
    #[error("reassembly entry allocation failed")]
    AllocationFailure,
}

/// A contiguous run of bytes starting at `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: SeqNum,
    pub payload: Bytes,
    /// The peer's FIN follows the last byte.
    pub fin: bool,
}

impl Segment {
    pub fn new(seq: SeqNum, payload: impl Into<Bytes>, fin: bool) -> Self {
        let payload = payload.into();
        debug_assert!(payload.len() <= i32::MAX as usize);
        Self { seq, payload, fin }
    }

    /// Request that only runs the delivery scan.
    pub fn flush(rcv_nxt: SeqNum) -> Self {
        Self { seq: rcv_nxt, payload: Bytes::new(), fin: false }
    }

    pub fn len(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First sequence number after this segment.
    pub fn end(&self) -> SeqNum {
        self.seq + self.len()
    }

    fn trim_front(&mut self, n: u32) {
        self.payload = self.payload.slice(n as usize..);
        self.seq += n;
    }
}

/// Result of one [`ReassemblyQueue::reassemble`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassembled {
    /// Updated next expected sequence number.
    pub rcv_nxt: SeqNum,
    /// The last delivered segment carried FIN.
    pub fin: bool,
    /// Bytes handed to the receive buffer (or discarded for a closed reader) by this call.
    pub delivered: usize,
    pub dropped: Option<ReassDrop>,
}

impl Reassembled {
    fn unchanged(rcv_nxt: SeqNum) -> Self {
        Self { rcv_nxt, fin: false, delivered: 0, dropped: None }
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.is_some()
    }
}

/// Per-connection queue of segments waiting for the gap before them to fill.
pub struct ReassemblyQueue {
    segs: VecDeque<Segment>,
    max_len: usize,
    zone: Arc<dyn SegmentQuota>,
    stats: Arc<ReassStats>,
}

impl std::fmt::Debug for ReassemblyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReassemblyQueue")
            .field("len", &self.segs.len())
            .field("max_len", &self.max_len)
            .field("zone_in_use", &self.zone.in_use())
            .field("zone_limit", &self.zone.limit())
            .finish()
    }
}

impl ReassemblyQueue {
    /// Queue accounted against the process-wide zone and counters.
    pub fn new(max_len: usize) -> Self {
        Self::with_zone(max_len, global_zone(), global_stats())
    }

    pub fn with_zone(max_len: usize, zone: Arc<dyn SegmentQuota>, stats: Arc<ReassStats>) -> Self {
        Self { segs: VecDeque::new(), max_len, zone, stats }
    }

    /// Number of queued segments.
    pub fn len(&self) -> usize {
        self.segs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// Bytes held across all queued segments.
    pub fn queued_bytes(&self) -> usize {
        self.segs.iter().map(|s| s.payload.len()).sum()
    }

    /// Queued segments in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segs.iter()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Change the per-queue limit. Entries above a lowered limit stay queued.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    pub fn stats(&self) -> &Arc<ReassStats> {
        &self.stats
    }

    /// Run the delivery scan without new data, e.g. once the connection became established.
    pub fn flush<B: ReceiveBuffer + ?Sized>(&mut self, rcv_nxt: SeqNum, established: bool, sb: &mut B) -> Reassembled {
        self.reassemble(rcv_nxt, established, Segment::flush(rcv_nxt), sb)
    }

    /// Merge `seg` into the queue and deliver whatever became contiguous with `rcv_nxt`.
    ///
    /// Nothing is delivered while `established` is false; queued data waits for a later
    /// [`flush`](Self::flush). A segment of length zero without FIN is treated as a flush.
    pub fn reassemble<B: ReceiveBuffer + ?Sized>(
        &mut self,
        rcv_nxt: SeqNum,
        established: bool,
        seg: Segment,
        sb: &mut B,
    ) -> Reassembled {
        let mut out = Reassembled::unchanged(rcv_nxt);
        if seg.is_empty() && !seg.fin {
            self.present(established, sb, &mut out);
            return out;
        }
        let mut seg = seg;

        // Bytes before rcv_nxt have been delivered already.
        if seq_lt(seg.seq, rcv_nxt) {
            let stale = (rcv_nxt - seg.seq) as u32;
            if stale > seg.len() || (stale == seg.len() && !seg.fin) {
                trace!(seq = %seg.seq, len = seg.len(), %rcv_nxt, "segment entirely before rcv_nxt");
                self.stats.duplicate(seg.payload.len());
                self.present(established, sb, &mut out);
                return out;
            }
            self.stats.partial_duplicate(stale as usize);
            seg.trim_front(stale);
        }
        let in_order = seg.seq == rcv_nxt;

        if !in_order
            && (self.segs.len() + 1 >= self.max_len || self.zone.in_use() + 1 >= self.zone.limit())
        {
            return self.drop_segment(rcv_nxt, &seg, ReassDrop::ResourceExhausted);
        }

        // A bare FIN entry at the new segment's start is a successor, not a predecessor.
        let idx = self.segs.iter()
            .position(|q| seq_gt(q.seq, seg.seq) || (q.seq == seg.seq && q.is_empty() && !seg.is_empty()))
            .unwrap_or(self.segs.len());

        if idx > 0 {
            let p = &mut self.segs[idx - 1];
            let p_end = p.end();
            if seg.is_empty() && p_end == seg.seq {
                // Bare FIN right behind queued data or an earlier bare FIN.
                p.fin = true;
                debug!(seq = %seg.seq, "duplicate FIN");
                self.stats.duplicate(0);
                self.present(established, sb, &mut out);
                return out;
            }
            if seq_gt(p_end, seg.seq) {
                let overlap = (p_end - seg.seq) as u32;
                if overlap >= seg.len() {
                    // Nothing new, but a retry after the handshake may still unblock delivery.
                    if seg.fin && p_end == seg.end() {
                        p.fin = true;
                    }
                    debug!(seq = %seg.seq, len = seg.len(), "duplicate segment");
                    self.stats.duplicate(seg.payload.len());
                    self.present(established, sb, &mut out);
                    return out;
                }
                self.stats.partial_duplicate(overlap as usize);
                seg.trim_front(overlap);
            }
        }

        // Whatever is left may already be queued as a single successor.
        if let Some(q) = self.segs.get_mut(idx) {
            if q.seq == seg.seq && !seq_lt(q.end(), seg.end()) {
                if seg.fin && q.end() == seg.end() {
                    q.fin = true;
                }
                debug!(seq = %seg.seq, len = seg.len(), "duplicate segment");
                self.stats.duplicate(seg.payload.len());
                self.present(established, sb, &mut out);
                return out;
            }
        }

        let direct = established && idx == 0 && seg.seq == rcv_nxt;
        if !direct {
            if self.segs.len() >= self.max_len {
                return self.drop_segment(rcv_nxt, &seg, ReassDrop::ResourceExhausted);
            }
            if self.segs.try_reserve(1).is_err() || !self.zone.try_reserve() {
                return self.drop_segment(rcv_nxt, &seg, ReassDrop::AllocationFailure);
            }
        }

        let end = seg.end();
        while idx < self.segs.len() {
            let q = &mut self.segs[idx];
            let covered = end - q.seq;
            if covered <= 0 {
                break;
            }
            let covered = covered as u32;
            if covered < q.len() {
                self.stats.partial_duplicate(covered as usize);
                q.trim_front(covered);
                break;
            }
            if let Some(q) = self.segs.remove(idx) {
                trace!(seq = %q.seq, len = q.len(), "queued segment subsumed");
                if q.fin && q.end() == end {
                    seg.fin = true;
                }
                self.zone.release();
            }
        }

        if direct {
            self.deliver(seg, sb, &mut out);
        } else {
            if !in_order {
                self.stats.out_of_order(seg.payload.len());
            }
            trace!(seq = %seg.seq, len = seg.len(), fin = seg.fin, "segment queued");
            self.segs.insert(idx, seg);
        }

        self.present(established, sb, &mut out);
        out
    }

    /// Pop every queued segment that starts at `out.rcv_nxt`.
    fn present<B: ReceiveBuffer + ?Sized>(&mut self, established: bool, sb: &mut B, out: &mut Reassembled) {
        if !established {
            return;
        }
        while self.segs.front().map_or(false, |q| q.seq == out.rcv_nxt) {
            if let Some(q) = self.segs.pop_front() {
                self.zone.release();
                self.deliver(q, sb, out);
            }
        }
    }

    fn deliver<B: ReceiveBuffer + ?Sized>(&self, seg: Segment, sb: &mut B, out: &mut Reassembled) {
        let len = seg.payload.len();
        out.rcv_nxt += seg.len();
        out.fin = seg.fin;
        out.delivered += len;
        self.stats.delivered(len);
        if sb.can_receive_more() {
            sb.append(seg.payload);
        } else {
            self.stats.discarded(len);
        }
        trace!(rcv_nxt = %out.rcv_nxt, len, fin = seg.fin, "delivered");
    }

    fn drop_segment(&self, rcv_nxt: SeqNum, seg: &Segment, reason: ReassDrop) -> Reassembled {
        match reason {
            ReassDrop::ResourceExhausted => self.stats.quota_drop(),
            ReassDrop::AllocationFailure => self.stats.alloc_drop(),
        }
        debug!(
            seq = %seg.seq,
            len = seg.len(),
            queued = self.segs.len(),
            zone_in_use = self.zone.in_use(),
            %reason,
            "segment dropped"
        );
        Reassembled { dropped: Some(reason), ..Reassembled::unchanged(rcv_nxt) }
    }

    /// Free every queued segment, as when the connection is torn down.
    pub fn flush_all(&mut self) {
        if !self.segs.is_empty() {
            debug!(count = self.segs.len(), "flushing reassembly queue");
        }
        for _ in self.segs.drain(..) {
            self.zone.release();
        }
    }
}

impl Drop for ReassemblyQueue {
    fn drop(&mut self) {
        self.flush_all();
    }
}

//! Structural checks on a reassembly queue between calls.

use std::fmt;

use reass_core::seq::{seq_gt, seq_leq};
use reass_stream::{ReassemblyQueue, SeqNum};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two neighbouring entries overlap or are out of order.
    Overlap { first: SeqNum, first_end: SeqNum, second: SeqNum },
    /// An entry that should already have been delivered is still queued.
    Deliverable { seq: SeqNum, rcv_nxt: SeqNum },
    /// More entries than the per-queue limit.
    QueueLimit { len: usize, max: usize },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::Overlap { first, first_end, second } =>
                write!(f, "entry [{}, {}) overlaps entry at {}", first, first_end, second),
            InvariantViolation::Deliverable { seq, rcv_nxt } =>
                write!(f, "entry at {} not after rcv_nxt {}", seq, rcv_nxt),
            InvariantViolation::QueueLimit { len, max } =>
                write!(f, "{} entries exceed limit {}", len, max),
        }
    }
}

/// Check ordering, non-overlap and the queue limit. When `established` the queue must also hold
/// nothing at or before `rcv_nxt`.
pub fn check_queue(q: &ReassemblyQueue, rcv_nxt: SeqNum, established: bool) -> Result<(), InvariantViolation> {
    if q.len() > q.max_len() {
        return Err(InvariantViolation::QueueLimit { len: q.len(), max: q.max_len() });
    }
    let mut prev: Option<(SeqNum, SeqNum)> = None;
    for seg in q.iter() {
        if established && !seq_gt(seg.seq, rcv_nxt) {
            return Err(InvariantViolation::Deliverable { seq: seg.seq, rcv_nxt });
        }
        if let Some((first, first_end)) = prev {
            if !seq_leq(first_end, seg.seq) || seg.seq == first {
                return Err(InvariantViolation::Overlap { first, first_end, second: seg.seq });
            }
        }
        prev = Some((seg.seq, seg.end()));
    }
    Ok(())
}

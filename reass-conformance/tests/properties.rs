use std::sync::Arc;

use proptest::prelude::*;
use reass_conformance::{check_queue, pattern_byte, segment_at};
use reass_core::seq::seq_geq;
use reass_stream::{ReassStats, ReassemblyQueue, SegmentQuota, SegmentZone, SeqNum, SockBuf};

const WINDOW: u32 = 512;

/// Segments as `(offset, len, fin)` inside the receive window. Zero lengths give bare FINs or
/// flushes.
fn segments() -> impl Strategy<Value = Vec<(u32, u32, bool)>> {
    proptest::collection::vec((0..WINDOW, 0u32..64, any::<bool>()), 1..60)
        .prop_map(|v| v.into_iter().map(|(off, len, fin)| (off, len.min(WINDOW - off), fin)).collect())
}

/// Bases close to the wrap point are as likely as arbitrary ones.
fn base() -> impl Strategy<Value = u32> {
    prop_oneof![any::<u32>(), (u32::MAX - 2 * WINDOW)..=u32::MAX]
}

fn roomy_queue() -> (ReassemblyQueue, Arc<SegmentZone>) {
    let zone = Arc::new(SegmentZone::with_limit(10_000));
    let q = ReassemblyQueue::with_zone(1_000, zone.clone(), Arc::new(ReassStats::new()));
    (q, zone)
}

/// Every queued byte with its sequence number, in order.
fn queued_bytes(q: &ReassemblyQueue) -> Vec<(SeqNum, u8)> {
    q.iter()
        .flat_map(|s| s.payload.iter().enumerate().map(move |(i, b)| (s.seq + i as u32, *b)))
        .collect()
}

proptest! {
    #[test]
    fn merged_stream_matches_submissions(base in base(), segs in segments()) {
        let isn = SeqNum(base);
        let (mut q, zone) = roomy_queue();
        let mut sb = SockBuf::new();
        let mut rcv_nxt = isn;
        let mut submitted = vec![false; WINDOW as usize];

        for (off, len, fin) in segs {
            let r = q.reassemble(rcv_nxt, true, segment_at(isn + off, len, fin), &mut sb);
            prop_assert!(!r.is_dropped());
            // rcv_nxt never moves backwards.
            prop_assert!(seq_geq(r.rcv_nxt, rcv_nxt));
            rcv_nxt = r.rcv_nxt;
            for i in off..off + len {
                submitted[i as usize] = true;
            }
            prop_assert_eq!(check_queue(&q, rcv_nxt, true), Ok(()));
        }

        // Delivered exactly the contiguous prefix of what was submitted.
        let prefix = submitted.iter().take_while(|b| **b).count() as u32;
        prop_assert_eq!(rcv_nxt, isn + prefix);
        let delivered = sb.read_to_vec();
        prop_assert_eq!(delivered.len() as u32, prefix);
        for (i, b) in delivered.iter().enumerate() {
            prop_assert_eq!(*b, pattern_byte(isn + i as u32));
        }

        // Every submitted byte is either delivered or queued, nothing else is.
        let mut queued = vec![false; WINDOW as usize];
        for seg in q.iter() {
            let start = (seg.seq - isn) as u32;
            for (i, b) in seg.payload.iter().enumerate() {
                prop_assert_eq!(*b, pattern_byte(seg.seq + i as u32));
                queued[(start + i as u32) as usize] = true;
            }
        }
        for i in 0..WINDOW as usize {
            prop_assert_eq!(submitted[i], (i as u32) < prefix || queued[i]);
        }
        prop_assert_eq!(zone.in_use(), q.len());
    }

    #[test]
    fn resubmitting_everything_changes_nothing(base in base(), segs in segments()) {
        let isn = SeqNum(base);
        let (mut q, zone) = roomy_queue();
        let mut sb = SockBuf::new();
        let mut rcv_nxt = isn;
        for &(off, len, fin) in &segs {
            rcv_nxt = q.reassemble(rcv_nxt, true, segment_at(isn + off, len, fin), &mut sb).rcv_nxt;
        }
        let delivered = sb.len();
        let queued = queued_bytes(&q);

        for &(off, len, fin) in &segs {
            let r = q.reassemble(rcv_nxt, true, segment_at(isn + off, len, fin), &mut sb);
            prop_assert_eq!(r.rcv_nxt, rcv_nxt);
            prop_assert_eq!(r.delivered, 0);
        }
        prop_assert_eq!(sb.len(), delivered);
        // Entry boundaries may shift, the queued bytes may not.
        prop_assert_eq!(queued_bytes(&q), queued);
        prop_assert_eq!(zone.in_use(), q.len());
    }

    #[test]
    fn resent_fin_takes_no_slot(base in base(), segs in segments()) {
        let isn = SeqNum(base);
        let (mut q, zone) = roomy_queue();
        let mut sb = SockBuf::new();
        let mut rcv_nxt = isn;
        for &(off, len, fin) in &segs {
            rcv_nxt = q.reassemble(rcv_nxt, true, segment_at(isn + off, len, fin), &mut sb).rcv_nxt;
        }
        let queued = queued_bytes(&q);

        for &(off, len, _) in segs.iter().filter(|s| s.2) {
            // The first resend may merge entries, it never adds one.
            let before = q.len();
            let r = q.reassemble(rcv_nxt, true, segment_at(isn + off, len, true), &mut sb);
            prop_assert_eq!(r.rcv_nxt, rcv_nxt);
            prop_assert!(q.len() <= before);
            let settled = q.len();
            for _ in 0..3 {
                q.reassemble(rcv_nxt, true, segment_at(isn + off, len, true), &mut sb);
                prop_assert_eq!(q.len(), settled);
                prop_assert_eq!(zone.in_use(), settled);
            }
            prop_assert_eq!(check_queue(&q, rcv_nxt, true), Ok(()));
        }
        prop_assert_eq!(queued_bytes(&q), queued);
    }

    #[test]
    fn quotas_never_exceeded(
        base in base(),
        segs in segments(),
        max_len in 2usize..8,
        limit in 2usize..12,
    ) {
        let isn = SeqNum(base);
        let zone = Arc::new(SegmentZone::with_limit(limit));
        let stats = Arc::new(ReassStats::new());
        let mut a = ReassemblyQueue::with_zone(max_len, zone.clone(), stats.clone());
        let mut b = ReassemblyQueue::with_zone(max_len, zone.clone(), stats.clone());
        let mut sb = SockBuf::new();
        let (mut nxt_a, mut nxt_b) = (isn, isn);

        for (i, &(off, len, fin)) in segs.iter().enumerate() {
            let established = i % 3 != 0;
            if i % 2 == 0 {
                nxt_a = a.reassemble(nxt_a, established, segment_at(isn + off, len, fin), &mut sb).rcv_nxt;
            } else {
                nxt_b = b.reassemble(nxt_b, established, segment_at(isn + off, len, fin), &mut sb).rcv_nxt;
            }
            prop_assert!(a.len() <= max_len);
            prop_assert!(b.len() <= max_len);
            prop_assert!(zone.in_use() <= limit);
            prop_assert_eq!(zone.in_use(), a.len() + b.len());
        }
        drop(a);
        drop(b);
        prop_assert_eq!(zone.in_use(), 0);
    }
}

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use reass_conformance::check_queue;
use reass_core::seq::seq_geq;
use reass_stream::{ReassStats, ReassemblyQueue, Segment, SegmentQuota, SegmentZone, SeqNum, SockBuf};

// Fuzz target: interpret the input as a list of (offset, len, flags) segment descriptors around
// a base sequence number and check the queue invariants after every call.
fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }
    let base = SeqNum(u32::from_le_bytes([data[0], data[1], data[2], data[3]]));
    let max_len = 2 + (data[4] % 16) as usize;
    let limit = 2 + (data[5] % 32) as usize;

    let zone = Arc::new(SegmentZone::with_limit(limit));
    let mut q = ReassemblyQueue::with_zone(max_len, zone.clone(), Arc::new(ReassStats::new()));
    let mut sb = SockBuf::new();
    let mut rcv_nxt = base;

    for chunk in data[6..].chunks_exact(4) {
        let off = u16::from_le_bytes([chunk[0], chunk[1]]) as u32 % 4096;
        let len = chunk[2] as u32;
        let flags = chunk[3];
        let established = flags & 1 != 0;
        let fin = flags & 2 != 0;
        // Occasionally reach back before rcv_nxt.
        let seq = if flags & 4 != 0 { rcv_nxt + off.wrapping_sub(2048) } else { rcv_nxt + off };

        let seg = Segment::new(seq, vec![0u8; len as usize], fin);
        let before = rcv_nxt;
        let r = q.reassemble(rcv_nxt, established, seg, &mut sb);
        assert!(seq_geq(r.rcv_nxt, before));
        if r.is_dropped() {
            assert_eq!(r.rcv_nxt, before);
        }
        rcv_nxt = r.rcv_nxt;

        assert!(q.len() <= max_len);
        assert!(zone.in_use() <= limit);
        assert_eq!(zone.in_use(), q.len());
        // A dropped segment skips the delivery scan.
        if let Err(violation) = check_queue(&q, rcv_nxt, established && !r.is_dropped()) {
            panic!("{}", violation);
        }
    }
    drop(q);
    assert_eq!(zone.in_use(), 0);
});

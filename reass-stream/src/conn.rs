//! Receive side of a TCP connection as seen by the reassembly queue.
#![forbid(unsafe_code)]

use std::sync::Arc;

use reass_core::SeqNum;
use tracing::{debug, info};

use crate::queue::{Reassembled, ReassemblyQueue, Segment};
use crate::settings::ReassSettings;
use crate::sockbuf::SockBuf;
use crate::stats::ReassStats;
use crate::zone::SegmentQuota;

/// Connection phases relevant to delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpPhase {
    /// Handshake not complete; data is queued but not delivered.
    SynReceived,
    Established,
    /// The peer's FIN has been delivered.
    CloseWait,
}

impl TcpPhase {
    pub fn have_established(self) -> bool {
        !matches!(self, TcpPhase::SynReceived)
    }
}

/// Receive state of one connection: `rcv_nxt`, its reassembly queue and socket buffer.
///
/// Callers serialize access (`&mut self`); different connections are independent.
#[derive(Debug)]
pub struct Connection {
    rcv_nxt: SeqNum,
    phase: TcpPhase,
    reass: ReassemblyQueue,
    rcv_buf: SockBuf,
}

impl Connection {
    /// Connection in `SynReceived`, expecting `irs + 1` next.
    pub fn new(irs: SeqNum, settings: &ReassSettings) -> Self {
        Self::with_queue(irs, ReassemblyQueue::new(settings.max_queue_len))
    }

    pub fn with_zone(irs: SeqNum, max_queue_len: usize, zone: Arc<dyn SegmentQuota>, stats: Arc<ReassStats>) -> Self {
        Self::with_queue(irs, ReassemblyQueue::with_zone(max_queue_len, zone, stats))
    }

    fn with_queue(irs: SeqNum, reass: ReassemblyQueue) -> Self {
        Self { rcv_nxt: irs + 1, phase: TcpPhase::SynReceived, reass, rcv_buf: SockBuf::new() }
    }

    pub fn rcv_nxt(&self) -> SeqNum {
        self.rcv_nxt
    }

    pub fn phase(&self) -> TcpPhase {
        self.phase
    }

    pub fn queue(&self) -> &ReassemblyQueue {
        &self.reass
    }

    pub fn recv_buffer(&mut self) -> &mut SockBuf {
        &mut self.rcv_buf
    }

    /// Feed one inbound segment.
    pub fn input(&mut self, seg: Segment) -> Reassembled {
        let out = self.reass.reassemble(self.rcv_nxt, self.phase.have_established(), seg, &mut self.rcv_buf);
        self.apply(out)
    }

    /// Complete the handshake and deliver anything queued meanwhile.
    pub fn establish(&mut self) -> Reassembled {
        if self.phase == TcpPhase::SynReceived {
            debug!(rcv_nxt = %self.rcv_nxt, queued = self.reass.len(), "connection established");
            self.phase = TcpPhase::Established;
        }
        let out = self.reass.flush(self.rcv_nxt, true, &mut self.rcv_buf);
        self.apply(out)
    }

    /// Stop delivering to the application; sequence space keeps advancing.
    pub fn shutdown_read(&mut self) {
        self.rcv_buf.shutdown_read();
    }

    /// Tear down, freeing every queued segment.
    pub fn close(mut self) {
        self.reass.flush_all();
    }

    fn apply(&mut self, out: Reassembled) -> Reassembled {
        self.rcv_nxt = out.rcv_nxt;
        if out.fin && self.phase == TcpPhase::Established {
            info!(rcv_nxt = %self.rcv_nxt, "peer closed its side");
            self.phase = TcpPhase::CloseWait;
        }
        out
    }
}

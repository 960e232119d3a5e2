//! Wire simulator producing the segments of a byte stream as a lossy, reordering network would
//! deliver them.
//!
//! The stream content is a deterministic function of the sequence number, so any delivered byte
//! can be checked without keeping the original around.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reass_stream::{Segment, SeqNum};
use serde::{Deserialize, Serialize};

/// Byte carried at sequence number `seq`.
pub fn pattern_byte(seq: SeqNum) -> u8 {
    (seq.0 ^ (seq.0 >> 8) ^ (seq.0 >> 16)) as u8
}

/// Segment covering `[seq, seq + len)` filled with the stream pattern.
pub fn segment_at(seq: SeqNum, len: u32, fin: bool) -> Segment {
    let data: Vec<u8> = (0..len).map(|i| pattern_byte(seq + i)).collect();
    Segment::new(seq, data, fin)
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Probability that a segment is lost on first transmission (0.0 to 1.0)
    pub loss_rate: f64,
    /// Probability that a segment is sent twice
    pub duplicate_rate: f64,
    /// Maximum distance a segment may be displaced from its send position
    pub reorder_depth: usize,
    /// Probability that a retransmission is repacketized with shifted boundaries
    pub repacketize_rate: f64,
    pub mss: u32,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.05,
            duplicate_rate: 0.05,
            reorder_depth: 8,
            repacketize_rate: 0.3,
            mss: 536,
            seed: 0x5eed,
        }
    }
}

/// Generates the arrival sequence of a stream of `total` bytes starting at `isn`.
pub struct WireSimulator {
    config: SimulationConfig,
    rng: StdRng,
}

impl WireSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Arrival order of segments. Every byte of the stream arrives at least once and the final
    /// segment carries FIN.
    pub fn arrivals(&mut self, isn: SeqNum, total: u32) -> Vec<Segment> {
        let mss = self.config.mss.max(1);
        let mut sent = Vec::new();
        let mut lost = Vec::new();
        let mut off = 0;
        while off < total {
            let len = mss.min(total - off);
            let fin = off + len == total;
            let seg = segment_at(isn + off, len, fin);
            if self.rng.gen_bool(self.config.loss_rate) {
                lost.push((off, len, fin));
            } else {
                if self.rng.gen_bool(self.config.duplicate_rate) {
                    sent.push(seg.clone());
                }
                sent.push(seg);
            }
            off += len;
        }

        let depth = self.config.reorder_depth.max(1);
        for chunk in sent.chunks_mut(depth) {
            chunk.shuffle(&mut self.rng);
        }

        for (off, len, fin) in lost {
            if len > 1 && self.rng.gen_bool(self.config.repacketize_rate) {
                // Retransmit as two overlapping pieces.
                let cut = self.rng.gen_range(1..len);
                let back = self.rng.gen_range(0..=cut.min(off));
                sent.push(segment_at(isn + off + cut, len - cut, fin));
                sent.push(segment_at(isn + (off - back), cut + back, false));
            } else {
                sent.push(segment_at(isn + off, len, fin));
            }
        }
        sent
    }

    /// In-order retransmission of everything from `from` to the end of the stream, as a sender
    /// recovering from a timeout would send it.
    pub fn resend_from(&self, isn: SeqNum, from: SeqNum, total: u32) -> Vec<Segment> {
        let mss = self.config.mss.max(1);
        let mut off = (from - isn) as u32;
        let mut out = Vec::new();
        while off < total {
            let len = mss.min(total - off);
            out.push(segment_at(isn + off, len, off + len == total));
            off += len;
        }
        out
    }
}

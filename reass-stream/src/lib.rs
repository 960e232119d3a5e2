#![forbid(unsafe_code)]
//! TCP out-of-order segment reassembly.
//!
//! [`ReassemblyQueue`] merges arbitrarily ordered, possibly overlapping segments and hands the
//! contiguous prefix to a [`ReceiveBuffer`]. Queued segments are accounted against a per-queue
//! limit and a [`SegmentQuota`] shared by every queue in the process.

pub mod queue;
pub mod zone;
pub mod stats;
pub mod sockbuf;
pub mod conn;
pub mod settings;

pub use queue::{ReassDrop, Reassembled, ReassemblyQueue, Segment};
pub use zone::{global_zone, SegmentQuota, SegmentZone};
pub use stats::{global_stats, ReassStats, ReassStatsSnapshot};
pub use sockbuf::{ReceiveBuffer, SockBuf};
pub use conn::{Connection, TcpPhase};
pub use settings::{ReassSettings, settings_watch, spawn_zone_resizer};

pub use reass_core::SeqNum;

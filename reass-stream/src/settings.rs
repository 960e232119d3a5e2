//! Runtime reassembly limits and config watcher.
#![forbid(unsafe_code)]

use std::sync::Arc;

use reass_core::ReassConfig;
use tokio::sync::{watch, watch::Receiver};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::zone::SegmentZone;

/// Limits applied to reassembly queues.
#[derive(Debug, Clone, PartialEq)]
pub struct ReassSettings {
    /// Global segment limit shared by all queues.
    pub max_segments: usize,
    /// Per-queue segment limit.
    pub max_queue_len: usize,
}

impl Default for ReassSettings {
    fn default() -> Self {
        Self::from_config(&ReassConfig::default())
    }
}

impl ReassSettings {
    pub fn from_config(cfg: &ReassConfig) -> Self {
        Self {
            max_segments: cfg.global_max_segments(),
            max_queue_len: cfg.max_queue_len,
        }
    }

    /// Push the global limit into `zone`.
    pub fn apply(&self, zone: &SegmentZone) {
        zone.set_limit(self.max_segments);
    }
}

/// Create a watch channel seeded with default settings.
pub fn settings_watch() -> (watch::Sender<ReassSettings>, Receiver<ReassSettings>) {
    watch::channel(ReassSettings::default())
}

/// Keep `zone` sized after the watched configuration.
///
/// The current value is applied immediately; the task ends when the sender side is dropped.
pub fn spawn_zone_resizer(zone: Arc<SegmentZone>, mut rx: Receiver<Arc<ReassConfig>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let settings = ReassSettings::from_config(&rx.borrow_and_update());
            debug!(max_segments = settings.max_segments, "applying reassembly settings");
            settings.apply(&zone);
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

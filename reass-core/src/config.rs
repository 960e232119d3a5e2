#![forbid(unsafe_code)]

//! Reassembly configuration handling. Parses a TOML file into a strongly-typed structure and
//! supports hot-reloading via the `notify` crate so that the global segment limit can follow a
//! resized buffer pool.

use serde::Deserialize;
use std::{fs, path::Path, sync::Arc};
use tokio::sync::watch;
use notify::{RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher, Event, EventKind};
use tracing::warn;

use crate::ReassError;

/// Buffer clusters per reassembly segment when deriving the global limit.
pub const CLUSTERS_PER_SEGMENT: usize = 16;

/// Configuration shared by every reassembly queue in the process.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReassConfig {
    /// Logging verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: Option<String>,

    /// Size of the network buffer pool. The global segment limit is derived from it.
    #[serde(default = "default_nmbclusters")]
    pub nmbclusters: usize,

    /// Explicit global segment limit, overriding the value derived from `nmbclusters`.
    pub max_segments: Option<usize>,

    /// Maximum number of segments queued on a single connection.
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
}

impl Default for ReassConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            nmbclusters: default_nmbclusters(),
            max_segments: None,
            max_queue_len: default_max_queue_len(),
        }
    }
}

fn default_nmbclusters() -> usize {
    25600
}

fn default_max_queue_len() -> usize {
    48
}

impl ReassConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(data: &str) -> crate::ReassResult<Self> {
        let cfg = toml::from_str::<ReassConfig>(data).map_err(ReassError::ConfigParse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::ReassResult<Self> {
        let data = fs::read_to_string(&path).map_err(ReassError::from)?;
        Self::from_toml_str(&data)
    }

    /// Load config alias version
    pub fn load<P: AsRef<Path>>(path: P) -> crate::ReassResult<Self> {
        Self::from_file(path)
    }

    /// Global segment limit in effect for this configuration.
    pub fn global_max_segments(&self) -> usize {
        self.max_segments
            .unwrap_or(self.nmbclusters / CLUSTERS_PER_SEGMENT)
    }

    /// Reject limits that leave no room besides the slot kept for the in-order segment.
    pub fn validate(&self) -> crate::ReassResult<()> {
        if self.max_queue_len < 2 {
            return Err(ReassError::InvalidConfig(format!(
                "max_queue_len must be at least 2, got {}", self.max_queue_len
            )));
        }
        let global = self.global_max_segments();
        if global < 2 {
            return Err(ReassError::InvalidConfig(format!(
                "global segment limit must be at least 2, got {}", global
            )));
        }
        Ok(())
    }

    /// Watch the configuration file for changes and receive updates through a watch channel.
    ///
    /// Returns the initial configuration and a [`watch::Receiver`] that yields a new
    /// [`ReassConfig`] wrapped in [`Arc`] every time the file is modified on disk. Modifications
    /// that fail to parse or validate are logged and skipped.
    pub fn watch_file<P: AsRef<Path>>(path: P) -> crate::ReassResult<(Arc<ReassConfig>, watch::Receiver<Arc<ReassConfig>>)> {
        let path_buf = path.as_ref().to_path_buf();
        let initial_cfg = Arc::new(Self::from_file(&path_buf)?);
        let path_in_closure = path_buf.clone();
        let (tx, rx) = watch::channel::<Arc<ReassConfig>>(initial_cfg.clone());

        // The watcher has to outlive this call; it is leaked and runs for the process lifetime.
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: NotifyResult<Event>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_)) {
                    match Self::from_file(&path_in_closure) {
                        Ok(updated) => {
                            let _ = tx.send(Arc::new(updated));
                        }
                        Err(e) => warn!(error = %e, "ignoring unusable config update"),
                    }
                }
            }
        })?;

        watcher.watch(&path_buf, RecursiveMode::NonRecursive)?;
        std::mem::forget(watcher);

        Ok((initial_cfg, rx))
    }
}

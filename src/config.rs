//! Node configuration.
//!
//! One `Config` is handed to [`crate::node::ReplicationNode`] at startup.
//! All fields have defaults that are fine for local development; production
//! deployments will want to at least override `listen_addr` and `peers`.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a single replicated node.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the local engine's persisted state file.
    pub engine_path: PathBuf,

    /// Directory holding the Raft log, vote record, and snapshots.
    pub raft_dir: PathBuf,

    /// Address this node's Raft transport listens on.
    pub listen_addr: String,

    /// Addresses of the initial peer set. Empty means "bootstrap a new
    /// single-node cluster"; non-empty means "join an existing cluster
    /// reachable through one of these addresses".
    pub peers: Vec<String>,

    /// How long a strong write or read waits for Raft to commit before
    /// returning [`crate::error::Error::Timeout`].
    pub apply_timeout: Duration,

    /// How long to wait, on startup, for a leader to be known before
    /// giving up and returning [`crate::error::Error::Timeout`] from
    /// operations that require one.
    pub leader_wait_timeout: Duration,

    /// Number of past snapshots to retain on disk; older ones are deleted
    /// once a newer snapshot and the log entries it covers are durable.
    pub snapshot_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine_path: PathBuf::from("hivestore-data/engine.db"),
            raft_dir: PathBuf::from("hivestore-data/raft"),
            listen_addr: "127.0.0.1:27001".to_string(),
            peers: Vec::new(),
            apply_timeout: Duration::from_secs(10),
            leader_wait_timeout: Duration::from_secs(10),
            snapshot_retention: 3,
        }
    }
}

impl Config {
    /// True when this configuration describes a fresh single-node cluster
    /// rather than a node joining an existing one.
    pub fn is_bootstrap(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_bootstrap() {
        assert!(Config::default().is_bootstrap());
    }

    #[test]
    fn peers_disable_bootstrap() {
        let mut cfg = Config::default();
        cfg.peers.push("127.0.0.1:27002".to_string());
        assert!(!cfg.is_bootstrap());
    }
}

//! Server configuration.

use deltasync_store::StoreConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Data directory; `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Maximum records and ids accepted in one push.
    pub max_push_records: usize,
    /// Committed transactions between automatic store checkpoints.
    pub checkpoint_every: usize,
    /// Whether to fsync the store journal on every commit.
    pub sync_on_commit: bool,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            data_dir: None,
            max_push_records: 10_000,
            checkpoint_every: 10_000,
            sync_on_commit: true,
        }
    }

    /// Persists data in the given directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the maximum records per push.
    pub fn with_max_push_records(mut self, max: usize) -> Self {
        self.max_push_records = max;
        self
    }

    /// Sets the number of commits between automatic checkpoints.
    pub fn with_checkpoint_every(mut self, commits: usize) -> Self {
        self.checkpoint_every = commits;
        self
    }

    /// Sets whether to fsync the journal on every commit.
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Returns the store configuration derived from this config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new()
            .checkpoint_every(self.checkpoint_every)
            .sync_on_commit(self.sync_on_commit)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_push_records, 10_000);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_data_dir("/var/lib/deltasync")
            .with_max_push_records(500)
            .with_checkpoint_every(64)
            .with_sync_on_commit(false);

        assert_eq!(config.max_push_records, 500);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/deltasync")));

        let store = config.store_config();
        assert_eq!(store.checkpoint_every, 64);
        assert!(!store.sync_on_commit);
    }
}

//! Store configuration.

/// Configuration for opening a durable store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Number of committed transactions between automatic checkpoints
    /// (0 = never checkpoint automatically).
    pub checkpoint_every: usize,

    /// Whether to fsync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Open without write access: no transactions, no checkpoints, and a
    /// shared directory lock instead of an exclusive one.
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            checkpoint_every: 10_000,
            sync_on_commit: true,
            read_only: false,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the number of commits between automatic checkpoints.
    #[must_use]
    pub const fn checkpoint_every(mut self, commits: usize) -> Self {
        self.checkpoint_every = commits;
        self
    }

    /// Sets whether to fsync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to open the store read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert!(!config.read_only);
        assert_eq!(config.checkpoint_every, 10_000);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .checkpoint_every(16)
            .read_only(true);

        assert!(!config.create_if_missing);
        assert!(config.read_only);
        assert!(!config.sync_on_commit);
        assert_eq!(config.checkpoint_every, 16);
    }
}

//! Database configuration.

use strandkv_storage::EngineConfig;

/// Default name of the thread that drains queued transactions.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "strandkv-drain";

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reject writes and collection creation.
    pub read_only: bool,

    /// Maximum number of collections the engine may open (`None` = unlimited).
    pub max_collections: Option<u32>,

    /// Name given to the drain worker thread.
    pub worker_thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_only: false,
            max_collections: None,
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the collection limit.
    #[must_use]
    pub const fn max_collections(mut self, max: u32) -> Self {
        self.max_collections = Some(max);
        self
    }

    /// Sets the drain worker thread name.
    #[must_use]
    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Returns the engine options derived from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::new().read_only(self.read_only);
        match self.max_collections {
            Some(max) => config.max_collections(max),
            None => config,
        }
    }
}

use std::path::{Path, PathBuf};
use tracing::warn;

/// Model descriptor stamped into every store the adapter creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    pub version: u32,
}

impl Schema {
    pub const DEFAULT_NAME: &str = "FeedStore";
    pub const DEFAULT_VERSION: u32 = 1;

    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME, Self::DEFAULT_VERSION)
    }
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub schema: Schema,
    pub flush_on_commit: bool,
}

impl StoreConfig {
    const DEFAULT_PATH: &str = "./data/feed-store.sled";

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema: Schema::default(),
            flush_on_commit: true,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_flush_on_commit(mut self, flush_on_commit: bool) -> Self {
        self.flush_on_commit = flush_on_commit;
        self
    }

    pub fn from_env() -> Self {
        let path = std::env::var("FEED_STORE_PATH").unwrap_or_else(|_| Self::DEFAULT_PATH.to_string());
        let flush_on_commit = match std::env::var("FEED_STORE_FLUSH_ON_COMMIT") {
            Ok(raw) => raw.trim().parse::<bool>().unwrap_or_else(|_| {
                warn!("FEED_STORE_FLUSH_ON_COMMIT={} is not a boolean, flushing on every commit", raw);
                true
            }),
            Err(_) => true,
        };

        Self::new(path).with_flush_on_commit(flush_on_commit)
    }
}

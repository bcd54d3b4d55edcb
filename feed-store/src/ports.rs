#![deny(clippy::all)]

use crate::domain::{CacheRecord, CacheState, ImageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::Result;

// Ports are the pluggable seams between the store and whatever keeps the record

/// Port for the durable engine holding the single cache record.
/// Only ever driven from the store's serial worker, hence synchronous and not `Sync`.
pub trait FeedPersistence: Send + 'static {
    /// Fully materialized current record, or `None` when the slot is empty
    fn current_record(&self) -> Result<Option<CacheRecord>>;

    /// Atomically drop any existing record and, when given, write `record` in its place.
    /// Fails only when nothing was committed.
    fn replace_record(&self, record: Option<&CacheRecord>) -> Result<()>;
}

/// Public cache API
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn delete_cached_feed(&self) -> Result<()>;
    async fn insert(&self, images: Vec<ImageRecord>, timestamp: DateTime<Utc>) -> Result<()>;
    async fn retrieve(&self) -> Result<CacheState>;
}

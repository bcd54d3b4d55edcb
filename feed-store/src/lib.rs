//! Persistent single-record cache for a feed of images.
//!
//! [`FeedCacheStore`] holds at most one [`CacheRecord`] and serializes every
//! operation onto a private worker thread. Durability comes from a
//! [`FeedPersistence`] adapter, sled-backed by default.

pub mod domain;
pub mod persistence;
pub mod ports;
pub mod store;

pub use domain::{CacheRecord, CacheState, ImageRecord};
pub use persistence::{InMemoryPersistence, SledPersistence};
pub use ports::{FeedPersistence, FeedStore};
pub use shared::config::{Schema, StoreConfig};
pub use shared::{Error, Result};
pub use store::FeedCacheStore;

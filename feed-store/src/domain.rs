use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of a cached feed. Owned by the [`CacheRecord`] holding it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: String,
}

impl ImageRecord {
    pub fn new(
        id: Uuid,
        description: Option<String>,
        location: Option<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            description,
            location,
            url: url.into(),
        }
    }
}

/// The single persisted unit: a feed snapshot and the moment it was taken.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub timestamp: DateTime<Utc>,
    pub images: Vec<ImageRecord>,
}

impl CacheRecord {
    pub fn new(images: Vec<ImageRecord>, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, images }
    }
}

/// Outcome of a successful retrieval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Found {
        images: Vec<ImageRecord>,
        timestamp: DateTime<Utc>,
    },
}

impl CacheState {
    pub fn is_empty(&self) -> bool {
        matches!(self, CacheState::Empty)
    }
}

impl From<Option<CacheRecord>> for CacheState {
    fn from(record: Option<CacheRecord>) -> Self {
        match record {
            Some(CacheRecord { timestamp, images }) => CacheState::Found { images, timestamp },
            None => CacheState::Empty,
        }
    }
}

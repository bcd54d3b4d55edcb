use crate::domain::{CacheRecord, ImageRecord};
use crate::ports::FeedPersistence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::config::{Schema, StoreConfig};
use shared::{Error, Result};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree, UnabortableTransactionError,
};
use sled::{Db, Transactional, Tree};
use tracing::{info, warn};

const CACHE_TREE: &str = "feed_cache";
const IMAGES_TREE: &str = "feed_images";
const SCHEMA_KEY: &[u8] = b"schema";
const HEADER_KEY: &[u8] = b"header";

#[derive(Serialize, Deserialize)]
struct StoredSchema {
    name: String,
    version: u32,
}

impl StoredSchema {
    fn matches(&self, schema: &Schema) -> bool {
        self.name == schema.name && self.version == schema.version
    }
}

/// Header of the cached record. Images live in their own tree, one per position.
#[derive(Serialize, Deserialize)]
struct StoredHeader {
    timestamp: DateTime<Utc>,
    image_count: u64,
}

/// Sled-based persistence for the cached feed
pub struct SledPersistence {
    db: Db,
    cache: Tree,
    images: Tree,
    flush_on_commit: bool,
}

impl SledPersistence {
    /// Open or create the store described by `config`
    /// Creates the parent directory if it doesn't exist
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if config.schema.name.trim().is_empty() {
            return Err(Error::StoreUnavailable("no schema name given".to_string()));
        }

        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreUnavailable(format!("Failed to create directory: {}", e))
            })?;
        }

        let db = sled::open(&config.path).map_err(|e| {
            Error::StoreUnavailable(format!(
                "Failed to open Sled database at {}: {}",
                config.path.display(),
                e
            ))
        })?;

        Self::stamp_schema(&db, &config.schema)?;

        let cache = db
            .open_tree(CACHE_TREE)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to open {}: {}", CACHE_TREE, e)))?;
        let images = db
            .open_tree(IMAGES_TREE)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to open {}: {}", IMAGES_TREE, e)))?;

        info!(
            "Opened feed store at {} (schema {} v{})",
            config.path.display(),
            config.schema.name,
            config.schema.version
        );

        Ok(Self {
            db,
            cache,
            images,
            flush_on_commit: config.flush_on_commit,
        })
    }

    /// Stamp a fresh database with `schema`, or verify the stamp of an existing one
    fn stamp_schema(db: &Db, schema: &Schema) -> Result<()> {
        let stored = db
            .get(SCHEMA_KEY)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to read schema: {}", e)))?;

        match stored {
            Some(bytes) => {
                let stored: StoredSchema = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::StoreUnavailable(format!("Failed to deserialize schema: {}", e))
                })?;

                if !stored.matches(schema) {
                    return Err(Error::StoreUnavailable(format!(
                        "schema mismatch: store holds {} v{}, expected {} v{}",
                        stored.name, stored.version, schema.name, schema.version
                    )));
                }
            }
            None => {
                let value = serde_json::to_vec(&StoredSchema {
                    name: schema.name.clone(),
                    version: schema.version,
                })
                .map_err(|e| Error::StoreUnavailable(format!("Failed to serialize schema: {}", e)))?;

                db.insert(SCHEMA_KEY, value)
                    .map_err(|e| Error::StoreUnavailable(format!("Failed to save schema: {}", e)))?;
                db.flush()
                    .map_err(|e| Error::StoreUnavailable(format!("Failed to flush database: {}", e)))?;
            }
        }

        Ok(())
    }

    fn encode(record: &CacheRecord) -> Result<(Vec<u8>, Vec<Vec<u8>>)> {
        let header = serde_json::to_vec(&StoredHeader {
            timestamp: record.timestamp,
            image_count: record.images.len() as u64,
        })
        .map_err(|e| Error::WriteFailure(format!("Failed to serialize cache header: {}", e)))?;

        let images = record
            .images
            .iter()
            .map(|image| {
                serde_json::to_vec(image)
                    .map_err(|e| Error::WriteFailure(format!("Failed to serialize image: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((header, images))
    }
}

fn position_key(position: u64) -> Vec<u8> {
    position.to_be_bytes().to_vec()
}

fn abort_read(message: String) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(Error::ReadFailure(message))
}

/// Remove every stored image. Positions named by a readable `header` go first,
/// then anything left is cleared by walking positions until the first gap.
fn clear_images(
    images: &TransactionalTree,
    header: Option<&[u8]>,
) -> std::result::Result<(), UnabortableTransactionError> {
    let recorded = header
        .and_then(|header| serde_json::from_slice::<StoredHeader>(header).ok())
        .map_or(0, |header| header.image_count);

    for position in 0..recorded {
        images.remove(position_key(position))?;
    }

    let mut position = recorded;
    while images.remove(position_key(position))?.is_some() {
        position += 1;
    }
    Ok(())
}

/// A committed write stays committed; a failed flush only delays durability
fn settle_flush(result: sled::Result<usize>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!("feed cache committed but not yet durable, flush failed: {}", e);
            false
        }
    }
}

impl FeedPersistence for SledPersistence {
    fn current_record(&self) -> Result<Option<CacheRecord>> {
        let result = (&self.cache, &self.images).transaction(
            |(cache, images)| -> ConflictableTransactionResult<Option<CacheRecord>, Error> {
                let Some(header) = cache.get(HEADER_KEY)? else {
                    return Ok(None);
                };

                let header: StoredHeader = serde_json::from_slice(&header)
                    .map_err(|e| abort_read(format!("Failed to deserialize cache header: {}", e)))?;

                let mut feed = Vec::new();
                for position in 0..header.image_count {
                    let bytes = images.get(position_key(position))?.ok_or_else(|| {
                        abort_read(format!(
                            "image {} of {} is missing",
                            position, header.image_count
                        ))
                    })?;
                    let image: ImageRecord = serde_json::from_slice(&bytes)
                        .map_err(|e| abort_read(format!("Failed to deserialize image: {}", e)))?;
                    feed.push(image);
                }

                if images.get(position_key(header.image_count))?.is_some() {
                    return Err(abort_read(format!(
                        "more images stored than the {} recorded",
                        header.image_count
                    )));
                }

                Ok(Some(CacheRecord::new(feed, header.timestamp)))
            },
        );

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => {
                Error::ReadFailure(format!("Failed to read cache: {}", e))
            }
        })
    }

    fn replace_record(&self, record: Option<&CacheRecord>) -> Result<()> {
        let staged = record.map(Self::encode).transpose()?;

        let result = (&self.cache, &self.images).transaction(
            |(cache, images)| -> ConflictableTransactionResult<(), Error> {
                let old = cache.remove(HEADER_KEY)?;
                clear_images(images, old.as_deref())?;

                if let Some((header, feed)) = &staged {
                    cache.insert(HEADER_KEY, header.clone())?;
                    for (position, image) in feed.iter().enumerate() {
                        images.insert(position_key(position as u64), image.clone())?;
                    }
                }

                Ok(())
            },
        );

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => {
                Error::WriteFailure(format!("Failed to commit cache: {}", e))
            }
        })?;

        if self.flush_on_commit {
            settle_flush(self.db.flush());
        }

        Ok(())
    }
}

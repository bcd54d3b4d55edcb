use crate::domain::{CacheRecord, CacheState, ImageRecord};
use crate::persistence::{InMemoryPersistence, SledPersistence};
use crate::ports::{FeedPersistence, FeedStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::config::StoreConfig;
use shared::{Error, Result};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const WORKER_NAME: &str = "feed-store-worker";

type Completion<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

enum Command {
    Delete(Completion<()>),
    Insert {
        record: CacheRecord,
        completion: Completion<()>,
    },
    Retrieve(Completion<CacheState>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Delete(_) => "delete",
            Command::Insert { .. } => "insert",
            Command::Retrieve(_) => "retrieve",
        }
    }

    /// Complete without touching storage
    fn fail(self, error: Error) {
        match self {
            Command::Delete(completion) => completion(Err(error)),
            Command::Insert { completion, .. } => completion(Err(error)),
            Command::Retrieve(completion) => completion(Err(error)),
        }
    }
}

/// Single-slot feed cache.
///
/// Every operation is queued onto one worker thread that owns the persistence
/// adapter, so operations never interleave and run in submission order. Each
/// completion fires exactly once, on that worker, after the storage work has
/// committed or failed.
pub struct FeedCacheStore {
    queue: mpsc::UnboundedSender<Command>,
    stopped: oneshot::Receiver<()>,
}

impl FeedCacheStore {
    /// Open (or create) a sled-backed store
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::with_persistence(SledPersistence::open(config)?)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(&StoreConfig::new(path))
    }

    /// Store that keeps its record in memory only
    pub fn in_memory() -> Result<Self> {
        Self::with_persistence(InMemoryPersistence::new())
    }

    pub fn with_persistence<P: FeedPersistence>(persistence: P) -> Result<Self> {
        let (queue, commands) = mpsc::unbounded_channel();
        let (stopped_tx, stopped) = oneshot::channel();

        thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(persistence, commands, stopped_tx))
            .map_err(|e| {
                error!("Failed to spawn {}: {}", WORKER_NAME, e);
                Error::StoreUnavailable(format!("Failed to spawn {}: {}", WORKER_NAME, e))
            })?;

        Ok(Self { queue, stopped })
    }

    pub fn delete_cached_feed_with(&self, completion: impl FnOnce(Result<()>) + Send + 'static) {
        self.submit(Command::Delete(Box::new(completion)));
    }

    pub fn insert_with(
        &self,
        images: Vec<ImageRecord>,
        timestamp: DateTime<Utc>,
        completion: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        self.submit(Command::Insert {
            record: CacheRecord::new(images, timestamp),
            completion: Box::new(completion),
        });
    }

    pub fn retrieve_with(&self, completion: impl FnOnce(Result<CacheState>) + Send + 'static) {
        self.submit(Command::Retrieve(Box::new(completion)));
    }

    /// Stop accepting work and wait until every queued operation has completed
    /// and the persistence adapter has been released.
    pub async fn close(self) {
        let Self { queue, stopped } = self;
        drop(queue);
        let _ = stopped.await;
    }

    fn submit(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.queue.send(command) {
            warn!("{} rejected: {} is not running", command.name(), WORKER_NAME);
            command.fail(worker_gone());
        }
    }
}

#[async_trait]
impl FeedStore for FeedCacheStore {
    async fn delete_cached_feed(&self) -> Result<()> {
        let (completion, result) = completion_channel();
        self.delete_cached_feed_with(completion);
        result.await.unwrap_or_else(|_| Err(worker_gone()))
    }

    async fn insert(&self, images: Vec<ImageRecord>, timestamp: DateTime<Utc>) -> Result<()> {
        let (completion, result) = completion_channel();
        self.insert_with(images, timestamp, completion);
        result.await.unwrap_or_else(|_| Err(worker_gone()))
    }

    async fn retrieve(&self) -> Result<CacheState> {
        let (completion, result) = completion_channel();
        self.retrieve_with(completion);
        result.await.unwrap_or_else(|_| Err(worker_gone()))
    }
}

impl std::fmt::Debug for FeedCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCacheStore")
            .field("running", &!self.queue.is_closed())
            .finish()
    }
}

fn worker_gone() -> Error {
    Error::Internal(format!("{} stopped before completing the operation", WORKER_NAME))
}

fn completion_channel<T: Send + 'static>() -> (
    impl FnOnce(Result<T>) + Send + 'static,
    oneshot::Receiver<Result<T>>,
) {
    let (tx, rx) = oneshot::channel();
    let completion = move |result: Result<T>| {
        if tx.send(result).is_err() {
            warn!("caller went away before its feed store operation completed");
        }
    };
    (completion, rx)
}

fn run_worker<P: FeedPersistence>(
    persistence: P,
    mut commands: mpsc::UnboundedReceiver<Command>,
    stopped: oneshot::Sender<()>,
) {
    info!("{} started", WORKER_NAME);

    while let Some(command) = commands.blocking_recv() {
        execute(&persistence, command);
    }

    drop(persistence);
    info!("{} stopped", WORKER_NAME);
    let _ = stopped.send(());
}

fn execute(persistence: &impl FeedPersistence, command: Command) {
    let name = command.name();
    match command {
        Command::Delete(completion) => {
            let result = guarded(name, || delete(persistence));
            report(name, &result);
            complete(name, completion, result);
        }
        Command::Insert { record, completion } => {
            debug!("insert: {} image(s) at {}", record.images.len(), record.timestamp);
            let result = guarded(name, || persistence.replace_record(Some(&record)));
            report(name, &result);
            complete(name, completion, result);
        }
        Command::Retrieve(completion) => {
            let result = guarded(name, || persistence.current_record().map(CacheState::from));
            if let Ok(state) = &result {
                debug!("retrieve: cache is {}", if state.is_empty() { "empty" } else { "populated" });
            }
            report(name, &result);
            complete(name, completion, result);
        }
    }
}

fn delete(persistence: &impl FeedPersistence) -> Result<()> {
    match persistence.current_record()? {
        Some(record) => {
            debug!("delete: removing {} image(s)", record.images.len());
            persistence.replace_record(None)
        }
        None => {
            debug!("delete: cache already empty");
            Ok(())
        }
    }
}

/// Run adapter work, turning a panic into an error so the worker keeps draining the queue
fn guarded<T>(name: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
        error!("{} panicked inside the persistence adapter", name);
        Err(Error::Internal(format!(
            "{} panicked inside the persistence adapter",
            name
        )))
    })
}

fn report<T>(name: &str, result: &Result<T>) {
    if let Err(e) = result {
        warn!("{} failed: {}", name, e);
    }
}

/// A panicking completion must not take the worker (and every queued operation) down with it
fn complete<T>(name: &str, completion: Completion<T>, result: Result<T>) {
    if panic::catch_unwind(AssertUnwindSafe(move || completion(result))).is_err() {
        error!("{} completion panicked", name);
    }
}

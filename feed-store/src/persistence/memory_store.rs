use crate::domain::CacheRecord;
use crate::ports::FeedPersistence;
use shared::Result;
use std::cell::RefCell;

/// Volatile persistence, gone with the process.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    record: RefCell<Option<CacheRecord>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeedPersistence for InMemoryPersistence {
    fn current_record(&self) -> Result<Option<CacheRecord>> {
        Ok(self.record.borrow().clone())
    }

    fn replace_record(&self, record: Option<&CacheRecord>) -> Result<()> {
        *self.record.borrow_mut() = record.cloned();
        Ok(())
    }
}

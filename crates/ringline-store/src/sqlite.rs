//! SQLite-backed implementation of the storage traits.
//!
//! `rusqlite::Connection` is not `Sync`, so the database handle sits
//! behind a `Mutex`. All callers are background persistence tasks; the
//! relay path never holds this lock.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use ringline_shared::types::{ChatId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::CallRecord;
use crate::{BlockStore, CallLogStore, PresenceStore};

pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_at(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory()?),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Database>> {
        self.db.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl CallLogStore for SqliteStore {
    fn append(&self, record: &CallRecord) -> Result<()> {
        self.lock()?.insert_call_record(record)
    }

    fn recent_for_chat(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<CallRecord>> {
        self.lock()?.get_calls_for_chat(chat_id, limit)
    }
}

impl BlockStore for SqliteStore {
    fn blocked_by(&self, user: &UserId) -> Result<HashSet<UserId>> {
        self.lock()?.blocks_of(user)
    }

    fn add(&self, user: &UserId, blocked: &UserId) -> Result<()> {
        self.lock()?.insert_block(user, blocked)
    }

    fn remove(&self, user: &UserId, blocked: &UserId) -> Result<()> {
        self.lock()?.delete_block(user, blocked)
    }
}

impl PresenceStore for SqliteStore {
    fn write(&self, user: &UserId, online: bool, last_active_at: DateTime<Utc>) -> Result<()> {
        self.lock()?.upsert_presence(user, online, last_active_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallOutcome;
    use ringline_shared::types::{CallType, ChatId, RoomId};

    #[test]
    fn traits_are_object_safe() {
        let store = SqliteStore::open_in_memory().unwrap();
        let call_log: &dyn CallLogStore = &store;
        let blocks: &dyn BlockStore = &store;
        let presence: &dyn PresenceStore = &store;

        call_log
            .append(&CallRecord::new(
                RoomId::new("r1"),
                ChatId("c1".to_string()),
                UserId::new("u-a"),
                UserId::new("u-b"),
                CallType::Audio,
                CallOutcome::Missed,
            ))
            .unwrap();

        blocks.add(&UserId::new("u-a"), &UserId::new("u-b")).unwrap();
        assert!(blocks
            .blocked_by(&UserId::new("u-a"))
            .unwrap()
            .contains(&UserId::new("u-b")));

        presence
            .write(&UserId::new("u-a"), true, Utc::now())
            .unwrap();
    }
}

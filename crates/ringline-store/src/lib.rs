//! # ringline-store
//!
//! Persistence collaborators consumed by the signaling server: the call
//! log, block relationships, and presence records.
//!
//! The server only ever talks to the [`CallLogStore`], [`BlockStore`] and
//! [`PresenceStore`] traits. The traits are synchronous; the relay path
//! never waits on them. Writes happen in supervised background tasks and
//! the only read (the lazy block-cache fill) is dispatched through
//! `spawn_blocking`.
//!
//! Two implementations ship here: [`SqliteStore`] (rusqlite, WAL,
//! versioned migrations) and [`MemoryStore`] for tests and ephemeral
//! deployments.

pub mod blocks;
pub mod calls;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod presence;
pub mod sqlite;

mod error;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use ringline_shared::types::{ChatId, UserId};

pub use database::Database;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::{CallOutcome, CallRecord};
pub use sqlite::SqliteStore;

/// Log of call outcomes (missed, declined, completed). Appended by the
/// call coordinator, read back for the conversation sidebar.
pub trait CallLogStore: Send + Sync {
    fn append(&self, record: &CallRecord) -> Result<()>;

    /// Most recent records for a chat, newest first.
    fn recent_for_chat(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<CallRecord>>;
}

/// Block relationships, read once per user into the server's cache and
/// written through on block/unblock.
pub trait BlockStore: Send + Sync {
    /// Every user `user` has blocked.
    fn blocked_by(&self, user: &UserId) -> Result<HashSet<UserId>>;

    fn add(&self, user: &UserId, blocked: &UserId) -> Result<()>;

    fn remove(&self, user: &UserId, blocked: &UserId) -> Result<()>;
}

/// Aggregate online/offline status per user.
pub trait PresenceStore: Send + Sync {
    fn write(&self, user: &UserId, online: bool, last_active_at: DateTime<Utc>) -> Result<()>;
}

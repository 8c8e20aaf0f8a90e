use std::collections::HashSet;

use chrono::Utc;
use rusqlite::params;

use ringline_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn insert_block(&self, user: &UserId, blocked: &UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO blocks (user_id, blocked_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user.0, blocked.0, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_block(&self, user: &UserId, blocked: &UserId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM blocks WHERE user_id = ?1 AND blocked_id = ?2",
            params![user.0, blocked.0],
        )?;
        Ok(())
    }

    pub fn blocks_of(&self, user: &UserId) -> Result<HashSet<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT blocked_id FROM blocks WHERE user_id = ?1")?;

        let rows = stmt.query_map(params![user.0], |row| {
            let id: String = row.get(0)?;
            Ok(UserId(id))
        })?;

        let mut set = HashSet::new();
        for row in rows {
            set.insert(row?);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_unblock_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        db.insert_block(&alice, &bob).unwrap();
        assert!(db.blocks_of(&alice).unwrap().contains(&bob));
        // The edge is directed.
        assert!(db.blocks_of(&bob).unwrap().is_empty());

        db.delete_block(&alice, &bob).unwrap();
        assert!(db.blocks_of(&alice).unwrap().is_empty());
    }

    #[test]
    fn duplicate_block_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        db.insert_block(&alice, &bob).unwrap();
        db.insert_block(&alice, &bob).unwrap();
        assert_eq!(db.blocks_of(&alice).unwrap().len(), 1);
    }
}

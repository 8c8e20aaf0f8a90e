use chrono::{DateTime, Utc};
use rusqlite::params;

use ringline_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn upsert_presence(
        &self,
        user: &UserId,
        online: bool,
        last_active_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO presence (user_id, is_online, last_active_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 is_online = excluded.is_online,
                 last_active_at = excluded.last_active_at",
            params![user.0, online as i64, last_active_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_presence(&self, user: &UserId) -> Result<Option<(bool, DateTime<Utc>)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT is_online, last_active_at FROM presence WHERE user_id = ?1")?;

        let mut rows = stmt.query_map(params![user.0], |row| {
            let online: i64 = row.get(0)?;
            let ts: String = row.get(1)?;
            Ok((online != 0, ts))
        })?;

        match rows.next() {
            Some(row) => {
                let (online, ts) = row?;
                let parsed = DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc);
                Ok(Some((online, parsed)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserId::new("u-alice");

        let t1 = Utc::now();
        db.upsert_presence(&alice, true, t1).unwrap();
        let (online, _) = db.get_presence(&alice).unwrap().unwrap();
        assert!(online);

        let t2 = Utc::now();
        db.upsert_presence(&alice, false, t2).unwrap();
        let (online, ts) = db.get_presence(&alice).unwrap().unwrap();
        assert!(!online);
        assert!(ts >= t1);
    }

    #[test]
    fn unknown_user_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_presence(&UserId::new("u-ghost")).unwrap().is_none());
    }
}

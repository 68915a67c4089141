//! CRUD operations for [`LoveNote`] records.
//!
//! The read-state pair (`is_read`, `read_at`) is monotonic: the UPDATE
//! statements are guarded on `is_read = 0`, so re-marking an
//! already-read note touches zero rows.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::{CoupleId, LoveNote, NoteId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::Result;

impl Database {
    /// Insert a new love note.
    pub fn insert_note(&self, note: &LoveNote) -> Result<()> {
        self.conn().execute(
            "INSERT INTO love_notes (id, couple_id, from_user_id, to_user_id, message,
                                     is_read, read_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                note.id.to_string(),
                note.couple_id.to_string(),
                note.from_user_id.to_string(),
                note.to_user_id.to_string(),
                note.message,
                note.is_read,
                note.read_at.map(|t| t.to_rfc3339()),
                note.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single note by id.
    pub fn get_note(&self, id: NoteId) -> Result<LoveNote> {
        self.conn()
            .query_row(
                &format!("{SELECT_NOTE} WHERE id = ?1"),
                params![id.to_string()],
                row_to_note,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All notes for a couple, oldest first (chat display order).
    pub fn list_notes_for_couple(&self, couple_id: CoupleId) -> Result<Vec<LoveNote>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_NOTE} WHERE couple_id = ?1 ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(params![couple_id.to_string()], row_to_note)?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Unread notes addressed to `to_user` within the couple, oldest
    /// first.
    pub fn list_unread_notes(&self, couple_id: CoupleId, to_user: UserId) -> Result<Vec<LoveNote>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_NOTE}
             WHERE couple_id = ?1 AND to_user_id = ?2 AND is_read = 0
             ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(
            params![couple_id.to_string(), to_user.to_string()],
            row_to_note,
        )?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Mark one note read.  Returns `true` if the row actually
    /// transitioned (it existed and was unread).
    pub fn mark_note_read(&self, id: NoteId, read_at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE love_notes SET is_read = 1, read_at = ?2
             WHERE id = ?1 AND is_read = 0",
            params![id.to_string(), read_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Mark every unread note addressed to `to_user` within the couple.
    /// Returns the number of rows that transitioned.
    pub fn mark_all_notes_read(
        &self,
        couple_id: CoupleId,
        to_user: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64> {
        let affected = self.conn().execute(
            "UPDATE love_notes SET is_read = 1, read_at = ?3
             WHERE couple_id = ?1 AND to_user_id = ?2 AND is_read = 0",
            params![
                couple_id.to_string(),
                to_user.to_string(),
                read_at.to_rfc3339()
            ],
        )?;
        Ok(affected as u64)
    }

    /// Delete a note by id.  Returns `true` if a row was deleted.
    pub fn delete_note(&self, id: NoteId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM love_notes WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SELECT_NOTE: &str = "SELECT id, couple_id, from_user_id, to_user_id, message,
                                  is_read, read_at, created_at
                           FROM love_notes";

/// Map a `rusqlite::Row` to a [`LoveNote`].
fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoveNote> {
    let id_str: String = row.get(0)?;
    let couple_id_str: String = row.get(1)?;
    let from_str: String = row.get(2)?;
    let to_str: String = row.get(3)?;
    let message: String = row.get(4)?;
    let is_read: bool = row.get(5)?;
    let read_at_str: Option<String> = row.get(6)?;
    let created_str: String = row.get(7)?;

    let id = parse_uuid(0, &id_str)?;
    let couple_id = parse_uuid(1, &couple_id_str)?;
    let from_user_id = parse_uuid(2, &from_str)?;
    let to_user_id = parse_uuid(3, &to_str)?;

    let read_at = read_at_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(LoveNote {
        id: NoteId(id),
        couple_id: CoupleId(couple_id),
        from_user_id: UserId(from_user_id),
        to_user_id: UserId(to_user_id),
        message,
        is_read,
        read_at,
        created_at,
    })
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_shared::{Couple, CoupleCode};

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn couple(db: &Database) -> CoupleId {
        let c = Couple {
            id: CoupleId::new(),
            couple_code: CoupleCode::generate(&mut rand::thread_rng()),
            anniversary_date: None,
            created_at: Utc::now(),
        };
        db.insert_couple(&c).unwrap();
        c.id
    }

    fn note(couple_id: CoupleId, from: UserId, to: UserId, text: &str) -> LoveNote {
        LoveNote {
            id: NoteId::new(),
            couple_id,
            from_user_id: from,
            to_user_id: to,
            message: text.into(),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mark_read_is_monotonic() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let (a, b) = (UserId::new(), UserId::new());
        let n = note(cid, a, b, "hi");
        db.insert_note(&n).unwrap();

        assert!(db.mark_note_read(n.id, Utc::now()).unwrap());
        // Second mark touches nothing.
        assert!(!db.mark_note_read(n.id, Utc::now()).unwrap());

        let stored = db.get_note(n.id).unwrap();
        assert!(stored.is_read);
        assert!(stored.read_at.is_some());
    }

    #[test]
    fn mark_all_counts_transitions() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let (a, b) = (UserId::new(), UserId::new());

        db.insert_note(&note(cid, a, b, "one")).unwrap();
        db.insert_note(&note(cid, a, b, "two")).unwrap();
        db.insert_note(&note(cid, b, a, "reply")).unwrap();

        assert_eq!(db.mark_all_notes_read(cid, b, Utc::now()).unwrap(), 2);
        assert_eq!(db.mark_all_notes_read(cid, b, Utc::now()).unwrap(), 0);
        assert_eq!(db.list_unread_notes(cid, a).unwrap().len(), 1);
    }

    #[test]
    fn chat_order_is_oldest_first() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let (a, b) = (UserId::new(), UserId::new());

        let mut first = note(cid, a, b, "first");
        first.created_at = "2026-01-01T10:00:00Z".parse().unwrap();
        let mut second = note(cid, b, a, "second");
        second.created_at = "2026-01-01T10:05:00Z".parse().unwrap();

        db.insert_note(&second).unwrap();
        db.insert_note(&first).unwrap();

        let messages: Vec<_> = db
            .list_notes_for_couple(cid)
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(messages, ["first", "second"]);
    }
}

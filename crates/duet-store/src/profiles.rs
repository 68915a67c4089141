//! CRUD operations for [`UserProfile`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use duet_shared::{CoupleId, UserId, UserProfile};

use crate::database::Database;
use crate::error::StoreError;
use crate::Result;

impl Database {
    /// Insert a new profile (one per auth identity).
    pub fn insert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO user_profiles (id, name, couple_id, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.id.to_string(),
                profile.name,
                profile.couple_id.map(|c| c.to_string()),
                profile.avatar_url,
                profile.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a profile by identity.
    pub fn get_profile(&self, id: UserId) -> Result<UserProfile> {
        self.conn()
            .query_row(
                "SELECT id, name, couple_id, avatar_url, created_at
                 FROM user_profiles WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The one other profile sharing `couple_id`, if a partner exists.
    pub fn get_partner(&self, couple_id: CoupleId, user_id: UserId) -> Result<Option<UserProfile>> {
        let partner = self
            .conn()
            .query_row(
                "SELECT id, name, couple_id, avatar_url, created_at
                 FROM user_profiles
                 WHERE couple_id = ?1 AND id != ?2",
                params![couple_id.to_string(), user_id.to_string()],
                row_to_profile,
            )
            .optional()?;
        Ok(partner)
    }

    /// All profiles linked to a couple, in join order.
    pub fn list_couple_members(&self, couple_id: CoupleId) -> Result<Vec<UserProfile>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, couple_id, avatar_url, created_at
             FROM user_profiles
             WHERE couple_id = ?1
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![couple_id.to_string()], row_to_profile)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Point a profile at a couple, or unlink it with `None`.
    pub fn set_profile_couple(&self, user_id: UserId, couple_id: Option<CoupleId>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE user_profiles SET couple_id = ?2 WHERE id = ?1",
            params![user_id.to_string(), couple_id.map(|c| c.to_string())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`UserProfile`].
fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let couple_id_str: Option<String> = row.get(2)?;
    let avatar_url: Option<String> = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let couple_id = couple_id_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(UserProfile {
        id: UserId(id),
        name,
        couple_id: couple_id.map(CoupleId),
        avatar_url,
        created_at,
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

    fn profile(name: &str, couple_id: Option<CoupleId>) -> UserProfile {
        UserProfile {
            id: UserId::new(),
            name: name.into(),
            couple_id,
            avatar_url: None,
            created_at: Utc::now(),
        }
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

    #[test]
    fn partner_lookup() {
        let (_dir, db) = test_db();
        let cid = couple(&db);

        let a = profile("Ana", Some(cid));
        let b = profile("Ben", Some(cid));
        db.insert_profile(&a).unwrap();
        db.insert_profile(&b).unwrap();

        let partner = db.get_partner(cid, a.id).unwrap().unwrap();
        assert_eq!(partner.id, b.id);

        assert_eq!(db.list_couple_members(cid).unwrap().len(), 2);
    }

    #[test]
    fn solo_profile_has_no_partner() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let a = profile("Ana", Some(cid));
        db.insert_profile(&a).unwrap();

        assert!(db.get_partner(cid, a.id).unwrap().is_none());
    }

    #[test]
    fn link_and_unlink() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let a = profile("Ana", None);
        db.insert_profile(&a).unwrap();

        db.set_profile_couple(a.id, Some(cid)).unwrap();
        assert_eq!(db.get_profile(a.id).unwrap().couple_id, Some(cid));

        db.set_profile_couple(a.id, None).unwrap();
        assert_eq!(db.get_profile(a.id).unwrap().couple_id, None);

        assert!(matches!(
            db.set_profile_couple(UserId::new(), None),
            Err(StoreError::NotFound)
        ));
    }
}

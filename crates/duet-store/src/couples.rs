//! CRUD operations for [`Couple`] records.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use duet_shared::{Couple, CoupleCode, CoupleId};

use crate::database::Database;
use crate::error::StoreError;
use crate::Result;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new couple.  Fails on a duplicate couple code (unique
    /// constraint).
    pub fn insert_couple(&self, couple: &Couple) -> Result<()> {
        self.conn().execute(
            "INSERT INTO couples (id, couple_code, anniversary_date, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                couple.id.to_string(),
                couple.couple_code.as_str(),
                couple.anniversary_date.map(|d| d.to_string()),
                couple.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single couple by id.
    pub fn get_couple(&self, id: CoupleId) -> Result<Couple> {
        self.conn()
            .query_row(
                "SELECT id, couple_code, anniversary_date, created_at
                 FROM couples WHERE id = ?1",
                params![id.to_string()],
                row_to_couple,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Look up a couple by its normalized invite code.
    pub fn get_couple_by_code(&self, code: &CoupleCode) -> Result<Option<Couple>> {
        let couple = self
            .conn()
            .query_row(
                "SELECT id, couple_code, anniversary_date, created_at
                 FROM couples WHERE couple_code = ?1",
                params![code.as_str()],
                row_to_couple,
            )
            .optional()?;
        Ok(couple)
    }

    /// Whether any couple already holds the given code.
    pub fn couple_code_exists(&self, code: &CoupleCode) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM couples WHERE couple_code = ?1",
            params![code.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Set (or clear) the anniversary date and return the fresh row.
    pub fn update_couple_anniversary(
        &self,
        id: CoupleId,
        anniversary_date: Option<NaiveDate>,
    ) -> Result<Couple> {
        let affected = self.conn().execute(
            "UPDATE couples SET anniversary_date = ?2 WHERE id = ?1",
            params![id.to_string(), anniversary_date.map(|d| d.to_string())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_couple(id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Couple`].
fn row_to_couple(row: &rusqlite::Row<'_>) -> rusqlite::Result<Couple> {
    let id_str: String = row.get(0)?;
    let code_str: String = row.get(1)?;
    let anniversary_str: Option<String> = row.get(2)?;
    let created_str: String = row.get(3)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let couple_code = CoupleCode::parse(&code_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let anniversary_date = anniversary_str
        .map(|s| s.parse::<NaiveDate>())
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Couple {
        id: CoupleId(id),
        couple_code,
        anniversary_date,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn sample_couple(code: &str) -> Couple {
        Couple {
            id: CoupleId::new(),
            couple_code: CoupleCode::parse(code).unwrap(),
            anniversary_date: Some("2023-06-15".parse().unwrap()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_get() {
        let (_dir, db) = test_db();
        let couple = sample_couple("AB12CD");
        db.insert_couple(&couple).unwrap();

        let got = db.get_couple(couple.id).unwrap();
        assert_eq!(got.couple_code.as_str(), "AB12CD");
        assert_eq!(got.anniversary_date, couple.anniversary_date);
    }

    #[test]
    fn lookup_by_code() {
        let (_dir, db) = test_db();
        let couple = sample_couple("QR45TU");
        db.insert_couple(&couple).unwrap();

        let got = db
            .get_couple_by_code(&CoupleCode::parse("qr45tu").unwrap())
            .unwrap();
        assert_eq!(got.map(|c| c.id), Some(couple.id));

        let missing = db
            .get_couple_by_code(&CoupleCode::parse("ZZ99ZZ").unwrap())
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn duplicate_code_rejected() {
        let (_dir, db) = test_db();
        db.insert_couple(&sample_couple("AB12CD")).unwrap();
        assert!(db.insert_couple(&sample_couple("AB12CD")).is_err());
    }

    #[test]
    fn anniversary_update() {
        let (_dir, db) = test_db();
        let couple = sample_couple("AB12CD");
        db.insert_couple(&couple).unwrap();

        let updated = db.update_couple_anniversary(couple.id, None).unwrap();
        assert_eq!(updated.anniversary_date, None);

        assert!(matches!(
            db.update_couple_anniversary(CoupleId::new(), None),
            Err(StoreError::NotFound)
        ));
    }
}

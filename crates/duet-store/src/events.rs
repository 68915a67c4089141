//! CRUD operations for [`Event`] records.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::{CoupleId, Event, EventId, EventKind, EventPatch, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::Result;

impl Database {
    /// Insert a new event.
    pub fn insert_event(&self, event: &Event) -> Result<()> {
        self.conn().execute(
            "INSERT INTO events (id, couple_id, title, description, event_date, event_time,
                                 event_type, color, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event.id.to_string(),
                event.couple_id.to_string(),
                event.title,
                event.description,
                event.event_date.to_string(),
                event.event_time.map(|t| t.format("%H:%M:%S").to_string()),
                event.event_type.as_str(),
                event.color,
                event.created_by.to_string(),
                event.created_at.to_rfc3339(),
                event.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single event by id.
    pub fn get_event(&self, id: EventId) -> Result<Event> {
        self.conn()
            .query_row(
                &format!("{SELECT_EVENT} WHERE id = ?1"),
                params![id.to_string()],
                row_to_event,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All events for a couple, ordered by date ascending (creation
    /// order breaks ties).
    pub fn list_events_for_couple(&self, couple_id: CoupleId) -> Result<Vec<Event>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_EVENT} WHERE couple_id = ?1
             ORDER BY event_date ASC, created_at ASC"
        ))?;

        let rows = stmt.query_map(params![couple_id.to_string()], row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Apply a partial update and return the fresh row.  Last write
    /// wins; fields absent from the patch keep their stored value.
    pub fn update_event(&self, id: EventId, patch: &EventPatch) -> Result<Event> {
        let mut event = self.get_event(id)?;

        if let Some(title) = &patch.title {
            event.title = title.clone();
        }
        if let Some(description) = &patch.description {
            event.description = description.clone();
        }
        if let Some(date) = patch.event_date {
            event.event_date = date;
        }
        if let Some(time) = patch.event_time {
            event.event_time = time;
        }
        if let Some(kind) = patch.event_type {
            event.event_type = kind;
        }
        if let Some(color) = &patch.color {
            event.color = color.clone();
        }
        event.updated_at = Utc::now();

        self.conn().execute(
            "UPDATE events
             SET title = ?2, description = ?3, event_date = ?4, event_time = ?5,
                 event_type = ?6, color = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id.to_string(),
                event.title,
                event.description,
                event.event_date.to_string(),
                event.event_time.map(|t| t.format("%H:%M:%S").to_string()),
                event.event_type.as_str(),
                event.color,
                event.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(event)
    }

    /// Delete an event by id.  Returns `true` if a row was deleted.
    pub fn delete_event(&self, id: EventId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM events WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SELECT_EVENT: &str = "SELECT id, couple_id, title, description, event_date, event_time,
                                   event_type, color, created_by, created_at, updated_at
                            FROM events";

/// Map a `rusqlite::Row` to an [`Event`].
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let id_str: String = row.get(0)?;
    let couple_id_str: String = row.get(1)?;
    let title: String = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let date_str: String = row.get(4)?;
    let time_str: Option<String> = row.get(5)?;
    let type_str: String = row.get(6)?;
    let color: String = row.get(7)?;
    let created_by_str: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    let id = parse_uuid(0, &id_str)?;
    let couple_id = parse_uuid(1, &couple_id_str)?;
    let created_by = parse_uuid(8, &created_by_str)?;

    let event_date: NaiveDate = date_str.parse().map_err(|e: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let event_time = time_str
        .map(|s| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let event_type = EventKind::from_str(&type_str).unwrap_or_default();

    let created_at = parse_timestamp(9, &created_str)?;
    let updated_at = parse_timestamp(10, &updated_str)?;

    Ok(Event {
        id: EventId(id),
        couple_id: CoupleId(couple_id),
        title,
        description,
        event_date,
        event_time,
        event_type,
        color,
        created_by: UserId(created_by),
        created_at,
        updated_at,
    })
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_shared::constants::DEFAULT_EVENT_COLOR;
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

    fn event(couple_id: CoupleId, title: &str, date: &str) -> Event {
        let now = Utc::now();
        Event {
            id: EventId::new(),
            couple_id,
            title: title.into(),
            description: None,
            event_date: date.parse().unwrap(),
            event_time: Some(NaiveTime::from_hms_opt(19, 30, 0).unwrap()),
            event_type: EventKind::Date,
            color: DEFAULT_EVENT_COLOR.into(),
            created_by: UserId::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn list_is_date_ordered() {
        let (_dir, db) = test_db();
        let cid = couple(&db);

        db.insert_event(&event(cid, "later", "2026-03-10")).unwrap();
        db.insert_event(&event(cid, "first", "2026-01-02")).unwrap();
        db.insert_event(&event(cid, "middle", "2026-02-14"))
            .unwrap();

        let titles: Vec<_> = db
            .list_events_for_couple(cid)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, ["first", "middle", "later"]);
    }

    #[test]
    fn patch_applies_partially() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let ev = event(cid, "Dinner", "2026-02-14");
        db.insert_event(&ev).unwrap();

        let patch = EventPatch {
            title: Some("Anniversary dinner".into()),
            event_type: Some(EventKind::Anniversary),
            ..Default::default()
        };
        let updated = db.update_event(ev.id, &patch).unwrap();

        assert_eq!(updated.title, "Anniversary dinner");
        assert_eq!(updated.event_type, EventKind::Anniversary);
        assert_eq!(updated.event_date, ev.event_date);
        assert_eq!(updated.event_time, ev.event_time);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let (_dir, db) = test_db();
        assert!(matches!(
            db.update_event(EventId::new(), &EventPatch::default()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_round_trip() {
        let (_dir, db) = test_db();
        let cid = couple(&db);
        let ev = event(cid, "Dinner", "2026-02-14");
        db.insert_event(&ev).unwrap();

        assert!(db.delete_event(ev.id).unwrap());
        assert!(!db.delete_event(ev.id).unwrap());
        assert!(db.list_events_for_couple(cid).unwrap().is_empty());
    }
}

//! CRUD operations for [`Memory`] records.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use uuid::Uuid;

use duet_shared::{CoupleId, Memory, MemoryId, MemoryPatch, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::Result;

impl Database {
    /// Insert a new memory.
    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        self.conn().execute(
            "INSERT INTO memories (id, couple_id, title, description, image_url,
                                   memory_date, category, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                memory.id.to_string(),
                memory.couple_id.to_string(),
                memory.title,
                memory.description,
                memory.image_url,
                memory.memory_date.to_string(),
                memory.category,
                memory.created_by.to_string(),
                memory.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single memory by id.
    pub fn get_memory(&self, id: MemoryId) -> Result<Memory> {
        self.conn()
            .query_row(
                &format!("{SELECT_MEMORY} WHERE id = ?1"),
                params![id.to_string()],
                row_to_memory,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All memories for a couple, newest memory date first (timeline
    /// display order).
    pub fn list_memories_for_couple(&self, couple_id: CoupleId) -> Result<Vec<Memory>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MEMORY} WHERE couple_id = ?1
             ORDER BY memory_date DESC, created_at DESC"
        ))?;

        let rows = stmt.query_map(params![couple_id.to_string()], row_to_memory)?;

        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    /// Apply a partial update and return the fresh row.
    pub fn update_memory(&self, id: MemoryId, patch: &MemoryPatch) -> Result<Memory> {
        let mut memory = self.get_memory(id)?;

        if let Some(title) = &patch.title {
            memory.title = title.clone();
        }
        if let Some(description) = &patch.description {
            memory.description = description.clone();
        }
        if let Some(image_url) = &patch.image_url {
            memory.image_url = image_url.clone();
        }
        if let Some(date) = patch.memory_date {
            memory.memory_date = date;
        }
        if let Some(category) = &patch.category {
            memory.category = category.clone();
        }

        self.conn().execute(
            "UPDATE memories
             SET title = ?2, description = ?3, image_url = ?4, memory_date = ?5, category = ?6
             WHERE id = ?1",
            params![
                id.to_string(),
                memory.title,
                memory.description,
                memory.image_url,
                memory.memory_date.to_string(),
                memory.category,
            ],
        )?;

        Ok(memory)
    }

    /// Delete a memory by id.  Returns `true` if a row was deleted.
    pub fn delete_memory(&self, id: MemoryId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM memories WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SELECT_MEMORY: &str = "SELECT id, couple_id, title, description, image_url,
                                    memory_date, category, created_by, created_at
                             FROM memories";

/// Map a `rusqlite::Row` to a [`Memory`].
fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let id_str: String = row.get(0)?;
    let couple_id_str: String = row.get(1)?;
    let title: String = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let image_url: Option<String> = row.get(4)?;
    let date_str: String = row.get(5)?;
    let category: Option<String> = row.get(6)?;
    let created_by_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;

    let id = parse_uuid(0, &id_str)?;
    let couple_id = parse_uuid(1, &couple_id_str)?;
    let created_by = parse_uuid(7, &created_by_str)?;

    let memory_date: NaiveDate = date_str.parse().map_err(|e: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Memory {
        id: MemoryId(id),
        couple_id: CoupleId(couple_id),
        title,
        description,
        image_url,
        memory_date,
        category,
        created_by: UserId(created_by),
        created_at,
    })
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

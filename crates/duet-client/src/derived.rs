//! Pure view helpers derived from cached rows.
//!
//! Nothing here touches a backend or a clock; callers pass `today` in,
//! which keeps every function trivially testable.

use chrono::{Datelike, NaiveDate};

use duet_shared::{Event, LoveNote, Memory};

/// Whole days since the anniversary, clamped to zero for future dates.
pub fn days_together(anniversary: NaiveDate, today: NaiveDate) -> i64 {
    (today - anniversary).num_days().max(0)
}

/// The next occurrence of the anniversary on or after `today`.
///
/// A February 29th anniversary falls back to February 28th in
/// non-leap years.
pub fn next_anniversary(anniversary: NaiveDate, today: NaiveDate) -> NaiveDate {
    let in_year = |year: i32| {
        NaiveDate::from_ymd_opt(year, anniversary.month(), anniversary.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
    };
    match in_year(today.year()) {
        Some(date) if date >= today => date,
        _ => in_year(today.year() + 1).unwrap_or(anniversary),
    }
}

/// Days from `today` until the next anniversary. Zero on the day.
pub fn days_until_anniversary(anniversary: NaiveDate, today: NaiveDate) -> i64 {
    (next_anniversary(anniversary, today) - today).num_days()
}

/// The first `limit` events on or after `today`, in date order.
/// Assumes `events` is already date-sorted, as the event cache keeps it.
pub fn upcoming_events(events: &[Event], today: NaiveDate, limit: usize) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.event_date >= today)
        .take(limit)
        .cloned()
        .collect()
}

/// Notes bucketed by calendar day, oldest day first, preserving the
/// cache's oldest-first order within each day.
pub fn notes_by_day(notes: &[LoveNote]) -> Vec<(NaiveDate, Vec<LoveNote>)> {
    let mut days: Vec<(NaiveDate, Vec<LoveNote>)> = Vec::new();
    for note in notes {
        let day = note.created_at.date_naive();
        match days.last_mut() {
            Some((last, bucket)) if *last == day => bucket.push(note.clone()),
            _ => days.push((day, vec![note.clone()])),
        }
    }
    days
}

/// Memories bucketed by `(year, month)`, newest month first, preserving
/// the cache's newest-first order within each month.
pub fn memories_by_month(memories: &[Memory]) -> Vec<((i32, u32), Vec<Memory>)> {
    let mut months: Vec<((i32, u32), Vec<Memory>)> = Vec::new();
    for memory in memories {
        let month = (memory.memory_date.year(), memory.memory_date.month());
        match months.last_mut() {
            Some((last, bucket)) if *last == month => bucket.push(memory.clone()),
            _ => months.push((month, vec![memory.clone()])),
        }
    }
    months
}

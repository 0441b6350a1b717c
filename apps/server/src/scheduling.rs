use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use sqlx::SqlitePool;

use crate::models::AvailabilityTemplate;

// ── Defaults ──

/// Providers who never configured their hours get this schedule: twelve
/// one-hour slots from 08:00 to 20:00.
pub const DEFAULT_START_HOUR: i64 = 8;
pub const DEFAULT_END_HOUR: i64 = 20;
pub const DEFAULT_SLOT_MINUTES: i64 = 60;

// ── Slots ──

/// A bookable window within a day, held as minutes of day. The display
/// label is formatted at the boundary only, so slot durations are not
/// restricted to half-hour multiples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    start_min: u32,
    end_min: u32,
}

impl Slot {
    pub fn new(start_min: u32, end_min: u32) -> Self {
        Self { start_min, end_min }
    }

    /// Canonical label, e.g. `"09:00–10:00"` (24-hour, en-dash separator).
    /// This string is what gets stored on bookings and matched against.
    pub fn label(&self) -> String {
        format!("{}–{}", fmt_time(self.start_min), fmt_time(self.end_min))
    }
}

fn fmt_time(min_of_day: u32) -> String {
    format!("{:02}:{:02}", min_of_day / 60, min_of_day % 60)
}

/// Consecutive, non-overlapping slots of exactly `duration_minutes`,
/// starting at `start_hour:00`, stopping once a slot would extend past
/// `end_hour`. Degenerate bounds never yield an empty day: they fall back
/// to the fixed default schedule so the provider stays bookable.
pub fn generate_slots(start_hour: i64, end_hour: i64, duration_minutes: i64) -> Vec<Slot> {
    let mut slots = Vec::new();
    if (1..=24 * 60).contains(&duration_minutes)
        && (0..=24).contains(&start_hour)
        && (0..=24).contains(&end_hour)
    {
        let duration = duration_minutes as u32;
        let end = end_hour as u32 * 60;
        let mut start = start_hour as u32 * 60;
        while start + duration <= end {
            slots.push(Slot::new(start, start + duration));
            start += duration;
        }
    }
    if slots.is_empty() {
        default_slots()
    } else {
        slots
    }
}

pub fn default_slots() -> Vec<Slot> {
    let hours = DEFAULT_START_HOUR as u32..DEFAULT_END_HOUR as u32;
    hours.map(|h| Slot::new(h * 60, (h + 1) * 60)).collect()
}

// ── Weekly template resolution ──

#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub available: bool,
    pub slots: Vec<Slot>,
}

impl DaySchedule {
    pub fn contains_label(&self, label: &str) -> bool {
        self.available && self.slots.iter().any(|s| s.label() == label)
    }
}

/// Resolve a weekday template into the day's slot set. No template means
/// the provider never customised that day: available, default slots.
pub fn day_schedule(template: Option<&AvailabilityTemplate>) -> DaySchedule {
    match template {
        None => DaySchedule {
            available: true,
            slots: default_slots(),
        },
        Some(t) if !t.is_available => DaySchedule {
            available: false,
            slots: Vec::new(),
        },
        Some(t) => DaySchedule {
            available: true,
            slots: generate_slots(t.start_hour, t.end_hour, t.slot_duration_minutes),
        },
    }
}

/// Look up the (service profile, weekday) template and resolve it.
/// Weekdays are numbered 0 = Sunday, matching the stored templates.
///
/// A failed lookup counts as "no template": most providers never customise
/// their hours, and a missing row must not make them unbookable.
pub async fn resolve_day(db: &SqlitePool, service_profile_id: &str, date: NaiveDate) -> DaySchedule {
    let day_of_week = date.weekday().num_days_from_sunday() as i64;
    let template = sqlx::query_as::<_, AvailabilityTemplate>(
        "SELECT service_profile_id, day_of_week, is_available, start_hour, end_hour, slot_duration_minutes
         FROM provider_availability
         WHERE service_profile_id = ? AND day_of_week = ?",
    )
    .bind(service_profile_id)
    .bind(day_of_week)
    .fetch_optional(db)
    .await
    .unwrap_or_else(|e| {
        tracing::warn!("availability lookup failed, using default schedule: {e}");
        None
    });

    day_schedule(template.as_ref())
}

// ── Occupancy ──

/// Slot labels already held by active bookings for (service profile, date).
/// Advisory only: the unique index on active bookings is the authority.
pub async fn occupied_slots(
    db: &SqlitePool,
    service_profile_id: &str,
    date: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let labels: Vec<String> = sqlx::query_scalar(
        "SELECT time_slot FROM bookings
         WHERE service_profile_id = ? AND booking_date = ?
           AND status IN ('pending', 'confirmed')",
    )
    .bind(service_profile_id)
    .bind(date)
    .fetch_all(db)
    .await?;

    Ok(labels.into_iter().collect())
}

/// Same as [`occupied_slots`] but ignoring one booking: when a booking is
/// being moved, its own slot does not count against it.
pub async fn occupied_slots_excluding(
    db: &SqlitePool,
    service_profile_id: &str,
    date: &str,
    exclude_booking_id: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let labels: Vec<String> = sqlx::query_scalar(
        "SELECT time_slot FROM bookings
         WHERE service_profile_id = ? AND booking_date = ? AND id != ?
           AND status IN ('pending', 'confirmed')",
    )
    .bind(service_profile_id)
    .bind(date)
    .bind(exclude_booking_id)
    .fetch_all(db)
    .await?;

    Ok(labels.into_iter().collect())
}

// ── Tests ──

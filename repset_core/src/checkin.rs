//! Daily check-ins and the views built on them.
//!
//! Calendar days are always computed in the time zone of the `now` value the
//! caller passes in.

use crate::store::{DataStore, Query, SortOrder};
use crate::streak::{unique_days, StreakSummary};
use crate::{CheckIn, Error, Result, WorkoutSession};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

const MAX_TITLE_CHARS: usize = 100;
const MAX_LOCATION_CHARS: usize = 200;

/// Optional fields for an explicitly registered check-in
#[derive(Clone, Debug, Default)]
pub struct CheckInDetails {
    pub title: Option<String>,
    pub exercise_type: Option<String>,
    pub calories: Option<u32>,
    pub location: Option<String>,
    pub notes: String,
    pub session_id: Option<Uuid>,
}

/// Check-in coverage of the current month
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthlyStats {
    /// Distinct days with a check-in this month
    pub days_checked_in: u32,
    pub days_in_month: u32,
}

impl MonthlyStats {
    pub fn percentage(&self) -> f64 {
        if self.days_in_month == 0 {
            return 0.0;
        }
        f64::from(self.days_checked_in) / f64::from(self.days_in_month) * 100.0
    }

    pub fn formatted_percentage(&self) -> String {
        format!("{:.0}%", self.percentage())
    }
}

/// One month of the calendar view: the latest check-in of each day
#[derive(Clone, Debug, PartialEq)]
pub struct MonthCalendar {
    /// First day of the month
    pub month: NaiveDate,
    pub days: BTreeMap<NaiveDate, CheckIn>,
}

/// Latest check-in on the calendar day of `now`
fn latest_on_day<'a, Tz: TimeZone + 'a>(now: &DateTime<Tz>) -> Query<'a, CheckIn> {
    let tz = now.timezone();
    let today = now.date_naive();
    Query::filter(move |c: &CheckIn| c.timestamp.with_timezone(&tz).date_naive() == today)
        .sort_by_key(|c| c.timestamp, SortOrder::Descending)
        .limit(1)
}

/// Today's check-in, if one exists
pub fn today_check_in<S, Tz>(store: &S, now: &DateTime<Tz>) -> Result<Option<CheckIn>>
where
    S: DataStore,
    Tz: TimeZone,
{
    Ok(store.fetch(&latest_on_day(now))?.into_iter().next())
}

/// Quick check-in for today.
///
/// Returns `None` without writing when today already has one.
pub fn check_in_today<S, Tz>(store: &mut S, now: &DateTime<Tz>) -> Result<Option<CheckIn>>
where
    S: DataStore,
    Tz: TimeZone,
{
    let check_in = CheckIn::at(now.with_timezone(&Utc));
    let to_insert = check_in.clone();
    let today = latest_on_day(now);

    let inserted = store.transaction(move |tx| {
        if let Some(existing) = tx.fetch(&today).pop() {
            tracing::debug!("Already checked in today at {}", existing.timestamp);
            return Ok(false);
        }
        tx.insert(to_insert)?;
        Ok(true)
    })?;
    if !inserted {
        return Ok(None);
    }
    tracing::info!("Checked in at {}", check_in.timestamp);
    Ok(Some(check_in))
}

/// Record a check-in at `at`, moved back to `now` if it lies in the future
pub fn register_check_in<S: DataStore>(
    store: &mut S,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
    details: CheckInDetails,
) -> Result<CheckIn> {
    let mut check_in = CheckIn::at(at.min(now));
    check_in.title = clean_text(details.title, MAX_TITLE_CHARS);
    check_in.exercise_type = clean_text(details.exercise_type, MAX_TITLE_CHARS);
    check_in.location = clean_text(details.location, MAX_LOCATION_CHARS);
    check_in.calories = details.calories;
    check_in.notes = details.notes.trim().to_string();
    check_in.session_id = details.session_id;

    let to_insert = check_in.clone();
    store.transaction(move |tx| {
        if let Some(session_id) = to_insert.session_id {
            if tx.get::<WorkoutSession>(session_id).is_none() {
                return Err(Error::NotFound(format!("session {}", session_id)));
            }
        }
        tx.insert(to_insert)
    })?;

    tracing::info!("Registered check-in {} at {}", check_in.id, check_in.timestamp);
    Ok(check_in)
}

/// Newest first
pub fn recent_check_ins<S: DataStore>(store: &S, limit: usize) -> Result<Vec<CheckIn>> {
    store.fetch(
        &Query::<CheckIn>::all()
            .sort_by_key(|c| c.timestamp, SortOrder::Descending)
            .limit(limit),
    )
}

/// Current and longest streak over the `window` most recent check-ins
pub fn streak_summary<S, Tz>(store: &S, now: &DateTime<Tz>, window: usize) -> Result<StreakSummary>
where
    S: DataStore,
    Tz: TimeZone,
{
    let recent = recent_check_ins(store, window)?;
    let days = unique_days(recent.iter().map(|c| &c.timestamp), &now.timezone());
    Ok(StreakSummary::from_days(&days, now.date_naive()))
}

pub fn monthly_stats<S, Tz>(store: &S, now: &DateTime<Tz>) -> Result<MonthlyStats>
where
    S: DataStore,
    Tz: TimeZone,
{
    let tz = now.timezone();
    let today = now.date_naive();
    let (year, month) = (today.year(), today.month());

    let all = store.fetch(&Query::<CheckIn>::all())?;
    let days = unique_days(all.iter().map(|c| &c.timestamp), &tz);
    let days_checked_in = days
        .iter()
        .filter(|d| d.year() == year && d.month() == month)
        .count() as u32;

    Ok(MonthlyStats {
        days_checked_in,
        days_in_month: days_in_month(today),
    })
}

/// Months that have check-ins, newest first
pub fn calendar_months<S, Tz>(store: &S, tz: &Tz) -> Result<Vec<MonthCalendar>>
where
    S: DataStore,
    Tz: TimeZone,
{
    let newest_first =
        store.fetch(&Query::<CheckIn>::all().sort_by_key(|c| c.timestamp, SortOrder::Descending))?;

    let mut months: BTreeMap<NaiveDate, BTreeMap<NaiveDate, CheckIn>> = BTreeMap::new();
    for check_in in newest_first {
        let day = check_in.timestamp.with_timezone(tz).date_naive();
        let Some(month) = day.with_day(1) else {
            continue;
        };
        // The first one seen for a day is the latest
        months
            .entry(month)
            .or_default()
            .entry(day)
            .or_insert(check_in);
    }

    Ok(months
        .into_iter()
        .rev()
        .map(|(month, days)| MonthCalendar { month, days })
        .collect())
}

fn days_in_month(day: NaiveDate) -> u32 {
    let (year, month) = (day.year(), day.month());
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (NaiveDate::from_ymd_opt(year, month, 1), next) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

fn clean_text(value: Option<String>, max_chars: usize) -> Option<String> {
    value
        .map(|v| v.trim().chars().take(max_chars).collect::<String>())
        .filter(|v| !v.is_empty())
}

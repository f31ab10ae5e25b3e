//! Consecutive-day check-in streaks.
//!
//! Timestamps are normalized to calendar days in the caller's time zone and
//! deduplicated, so several check-ins on one day count once and input order
//! does not matter.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;

/// Current and best streak for display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
}

impl StreakSummary {
    pub fn from_days(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> Self {
        Self {
            current: current_streak(days, today),
            longest: longest_streak(days),
        }
    }
}

/// Unique calendar days of `timestamps` as seen in `tz`
pub fn unique_days<'a, Tz, I>(timestamps: I, tz: &Tz) -> BTreeSet<NaiveDate>
where
    Tz: TimeZone,
    I: IntoIterator<Item = &'a DateTime<Utc>>,
{
    timestamps
        .into_iter()
        .map(|ts| ts.with_timezone(tz).date_naive())
        .collect()
}

/// Consecutive days ending at the most recent check-in.
///
/// A check-in today or yesterday keeps the streak alive; anything older breaks
/// it. Days after `today` never extend the streak.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(most_recent) = days.range(..=today).next_back().copied() else {
        return 0;
    };

    if today - most_recent > Duration::days(1) {
        return 0;
    }

    let mut streak = 0;
    let mut expected = most_recent;
    while days.contains(&expected) {
        streak += 1;
        match expected.pred_opt() {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    streak
}

/// Longest run of consecutive days anywhere in the history
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    // Descending scan: each day should be exactly one before the previous
    for &day in days.iter().rev() {
        run = match previous {
            Some(prev) if prev.pred_opt() == Some(day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    longest
}

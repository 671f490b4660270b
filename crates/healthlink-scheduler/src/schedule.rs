use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use healthlink_core::checkin::ScheduleType;
use tracing::warn;

use crate::error::{Result, SchedulerError};

/// Compute the next execution strictly after `now` (UTC reference clock).
///
/// DAILY fires tomorrow at `time_of_day`. WEEKLY scans the seven days after
/// today for the first ISO weekday in `days_of_week`. A WEEKLY schedule with
/// no valid day falls back to the DAILY rule.
pub fn next_execution(
    schedule_type: ScheduleType,
    time_of_day: NaiveTime,
    days_of_week: &[u8],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let today = now.date_naive();
    match weekly_days(schedule_type, days_of_week) {
        Some(days) => (1..=7)
            .map(|offset| today + Duration::days(offset))
            .find(|d| days.contains(&iso_weekday(*d)))
            .map(|d| at(d, time_of_day))
            // unreachable with at least one valid day in the set
            .unwrap_or_else(|| at(today + Duration::days(1), time_of_day)),
        None => at(today + Duration::days(1), time_of_day),
    }
}

/// First execution of a newly created (or re-timed) schedule: today at
/// `time_of_day` when that is still ahead of `now` and today matches the
/// cadence, else [`next_execution`].
pub fn first_execution(
    schedule_type: ScheduleType,
    time_of_day: NaiveTime,
    days_of_week: &[u8],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let today = now.date_naive();
    let candidate = at(today, time_of_day);
    let today_matches = match weekly_days(schedule_type, days_of_week) {
        Some(days) => days.contains(&iso_weekday(today)),
        None => true,
    };
    if candidate > now && today_matches {
        candidate
    } else {
        next_execution(schedule_type, time_of_day, days_of_week, now)
    }
}

/// Reject cadence input at the owner boundary. Past this point a bad day set
/// trips a debug assertion; release builds fall back to DAILY.
pub fn validate_cadence(days_of_week: &[u8], max_messages_per_day: u32) -> Result<()> {
    if let Some(bad) = days_of_week.iter().find(|d| !(1..=7).contains(*d)) {
        return Err(SchedulerError::InvalidSchedule(format!(
            "day of week {bad} is outside 1..=7"
        )));
    }
    if max_messages_per_day == 0 {
        return Err(SchedulerError::InvalidSchedule(
            "max_messages_per_day must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Sorted, deduplicated day set as stored.
pub fn normalize_days(days_of_week: &[u8]) -> Vec<u8> {
    let mut days = days_of_week.to_vec();
    days.sort_unstable();
    days.dedup();
    days
}

/// Valid WEEKLY day set, or `None` when the DAILY rule applies.
fn weekly_days(schedule_type: ScheduleType, days_of_week: &[u8]) -> Option<Vec<u8>> {
    if schedule_type != ScheduleType::Weekly {
        return None;
    }
    debug_assert!(
        days_of_week.iter().all(|d| (1..=7).contains(d)),
        "weekly day set {days_of_week:?} was not validated"
    );
    let valid: Vec<u8> = days_of_week
        .iter()
        .copied()
        .filter(|d| (1..=7).contains(d))
        .collect();
    if valid.len() != days_of_week.len() {
        warn!(?days_of_week, "weekly schedule has days outside 1..=7; ignoring them");
    }
    if valid.is_empty() {
        warn!("weekly schedule has no valid day; using daily cadence");
        return None;
    }
    Some(valid)
}

fn iso_weekday(d: NaiveDate) -> u8 {
    d.weekday().number_from_monday() as u8
}

fn at(d: NaiveDate, time_of_day: NaiveTime) -> DateTime<Utc> {
    d.and_time(time_of_day).and_utc()
}

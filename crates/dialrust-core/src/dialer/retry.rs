//! Retry planning
//!
//! Same-day retries are spaced by the campaign's retry interval. Once a day's
//! attempts are used up, the next try lands on the next active day at a random
//! time inside one third of the calling window, rotating morning, afternoon
//! and evening by attempt day.

use super::window::CallingWindow;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use dialrust_storage::models::{Campaign, DueContact};

/// Third of the calling window used for a day's retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySegment {
    Morning,
    Afternoon,
    Evening,
}

impl DaySegment {
    pub fn for_attempt_day(attempt_day: i32) -> Self {
        match attempt_day.rem_euclid(3) {
            0 => DaySegment::Morning,
            1 => DaySegment::Afternoon,
            _ => DaySegment::Evening,
        }
    }

    fn index(self) -> i64 {
        match self {
            DaySegment::Morning => 0,
            DaySegment::Afternoon => 1,
            DaySegment::Evening => 2,
        }
    }
}

/// Local `[start, end)` bounds of a segment of the calling window
pub fn segment_bounds(window: &CallingWindow, segment: DaySegment) -> (NaiveTime, NaiveTime) {
    let total = (window.end() - window.start()).num_seconds().max(0);
    let length = total / 3;
    let start = window.start() + Duration::seconds(length * segment.index());
    (start, start + Duration::seconds(length))
}

/// Random time on `date` inside the segment picked by `attempt_day`
pub fn smart_retry_time(
    window: &CallingWindow,
    attempt_day: i32,
    date: NaiveDate,
) -> Option<DateTime<Utc>> {
    let (start, end) = segment_bounds(window, DaySegment::for_attempt_day(attempt_day));
    let length = (end - start).num_seconds();
    let offset = if length > 0 { fastrand::i64(0..length) } else { 0 };

    window
        .local_datetime(date, start + Duration::seconds(offset))
        .map(|t| t.with_timezone(&Utc))
}

/// When the contact should next be tried after an attempt made at `now`
pub fn plan_next_retry(
    campaign: &Campaign,
    window: &CallingWindow,
    due: &DueContact,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let per_day = campaign.retry_attempts.max(1);
    let interval = Duration::minutes(campaign.retry_interval.max(1) as i64);

    if due.attempts_today + 1 < per_day {
        let candidate = now + interval;
        if window.contains(candidate) {
            return Some(candidate);
        }
    }

    let today = now.with_timezone(&window.timezone()).date_naive();
    let next_date = window.next_active_date(today)?;
    let next_day = due.attempt_day + (next_date - today).num_days() as i32;
    smart_retry_time(window, next_day, next_date)
}

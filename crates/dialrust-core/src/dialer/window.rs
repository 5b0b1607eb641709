//! Calling window evaluation
//!
//! A campaign may only dial on its active weekdays, between the start and end
//! of its calling hours (both minutes inclusive), in its own timezone. Bad
//! configuration never opens the window: an unknown timezone falls back to the
//! configured default, and unparsable hours or an empty day set keep the
//! campaign closed.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use dialrust_storage::models::Campaign;
use thiserror::Error;
use tracing::warn;

/// Calling window configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Invalid calling hours time: {0}")]
    InvalidTime(String),

    #[error("Calling hours end {end} is before start {start}")]
    InvertedRange { start: String, end: String },

    #[error("Campaign has no valid active days")]
    NoActiveDays,
}

/// A campaign's weekly calling window
#[derive(Debug, Clone)]
pub struct CallingWindow {
    timezone: Tz,
    /// Indexed by `Weekday::num_days_from_monday`
    days: [bool; 7],
    start: NaiveTime,
    end: NaiveTime,
}

impl CallingWindow {
    pub fn new<I, S>(
        timezone: Tz,
        active_days: I,
        start: &str,
        end: &str,
    ) -> Result<Self, WindowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start_time =
            parse_time_of_day(start).ok_or_else(|| WindowError::InvalidTime(start.to_string()))?;
        let end_time =
            parse_time_of_day(end).ok_or_else(|| WindowError::InvalidTime(end.to_string()))?;

        if end_time < start_time {
            return Err(WindowError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let mut days = [false; 7];
        for token in active_days {
            match parse_weekday(token.as_ref()) {
                Some(day) => days[day.num_days_from_monday() as usize] = true,
                None => warn!(token = token.as_ref(), "Ignoring unknown active day token"),
            }
        }

        if !days.iter().any(|d| *d) {
            return Err(WindowError::NoActiveDays);
        }

        Ok(Self {
            timezone,
            days,
            start: start_time,
            end: end_time,
        })
    }

    /// Build the window for a campaign, falling back to `fallback` for an unknown timezone
    pub fn for_campaign(campaign: &Campaign, fallback: Tz) -> Result<Self, WindowError> {
        let timezone = match campaign.timezone.trim().parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    campaign_id = %campaign.id,
                    timezone = %campaign.timezone,
                    fallback = %fallback,
                    "Invalid campaign timezone, using fallback"
                );
                fallback
            }
        };

        Self::new(
            timezone,
            &campaign.active_days.0,
            &campaign.calling_hours_start,
            &campaign.calling_hours_end,
        )
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn is_active_day(&self, day: Weekday) -> bool {
        self.days[day.num_days_from_monday() as usize]
    }

    /// Whether `now` falls inside the window (minute resolution, inclusive)
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if !self.is_active_day(local.weekday()) {
            return false;
        }

        let minute = minute_of_day(local.time());
        minute >= minute_of_day(self.start) && minute <= minute_of_day(self.end)
    }

    /// The next moment calls may be placed; `now` itself when inside the window
    pub fn next_start(&self, now: DateTime<Utc>) -> Option<DateTime<Tz>> {
        let local = now.with_timezone(&self.timezone);
        if self.contains(now) {
            return Some(local);
        }

        let today = local.date_naive();
        if self.is_active_day(local.weekday())
            && minute_of_day(local.time()) < minute_of_day(self.start)
        {
            return self.local_datetime(today, self.start);
        }

        (1..=7)
            .map(|offset| today + Duration::days(offset))
            .find(|date| self.is_active_day(date.weekday()))
            .and_then(|date| self.local_datetime(date, self.start))
    }

    /// [`Self::next_start`] rendered as "2024-03-11 09:00 EDT"
    pub fn next_calling_time(&self, now: DateTime<Utc>) -> Option<String> {
        self.next_start(now)
            .map(|t| t.format("%Y-%m-%d %H:%M %Z").to_string())
    }

    /// Local midnight of `now`'s day, as a UTC instant
    pub fn day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.timezone).date_naive();
        self.local_datetime(today, NaiveTime::MIN)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// The first active date strictly after `date`
    pub fn next_active_date(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=7)
            .map(|offset| date + Duration::days(offset))
            .find(|d| self.is_active_day(d.weekday()))
    }

    /// Resolve a local wall-clock time, stepping over DST gaps
    pub fn local_datetime(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
        let naive = date.and_time(time);
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Parse "HH:MM" or "HH:MM:SS"
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Parse a weekday token ("mon", "Monday", "TUE", ...)
pub fn parse_weekday(token: &str) -> Option<Weekday> {
    let token = token.trim().to_lowercase();
    let day = match token.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };

    // Reject tokens like "monkey" while allowing "mon", "monday", "tues", "thurs"
    let full = match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    };
    full.starts_with(token.as_str()).then_some(day)
}

/// Whether the campaign may dial at `now`; configuration errors count as closed
pub fn is_within_calling_hours(campaign: &Campaign, now: DateTime<Utc>, fallback: Tz) -> bool {
    match CallingWindow::for_campaign(campaign, fallback) {
        Ok(window) => window.contains(now),
        Err(e) => {
            warn!(campaign_id = %campaign.id, error = %e, "Invalid calling window, treating as closed");
            false
        }
    }
}

/// Next calling time as a localized timestamp string
pub fn next_calling_time(campaign: &Campaign, now: DateTime<Utc>, fallback: Tz) -> Option<String> {
    CallingWindow::for_campaign(campaign, fallback)
        .ok()?
        .next_calling_time(now)
}

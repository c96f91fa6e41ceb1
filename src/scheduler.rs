use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use tokio::time::{Duration, sleep};

/// A five-field cron expression: `minute hour day-of-month month day-of-week`.
///
/// Fields accept `*`, numbers, comma lists, `a-b` ranges and `/n` steps on
/// either. Day-of-week runs 0..=7 with both 0 and 7 meaning Sunday. When
/// day-of-month and day-of-week are both restricted a day matching either
/// one fires, as in classic cron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("expected 5 fields in {0:?}")]
    FieldCount(String),
    #[error("invalid {field} value {value:?}")]
    Invalid { field: &'static str, value: String },
    #[error("{field} value {value} is out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7 };

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let expanded = match trimmed {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            other => other,
        };
        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields[..] else {
            return Err(ScheduleError::FieldCount(trimmed.to_string()));
        };

        let mut days_of_week = parse_field(dow, &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }
        Ok(Self {
            source: trimmed.to_string(),
            minutes: parse_field(minute, &MINUTE)?,
            hours: parse_field(hour, &HOUR)?,
            days_of_month: parse_field(dom, &DAY_OF_MONTH)?,
            months: parse_field(month, &MONTH)?,
            days_of_week,
            dom_restricted: dom != "*",
            dow_restricted: dow != "*",
        })
    }

    /// Whether the minute containing `at` is a firing time.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let bit = |set: u64, v: u32| set & (1u64 << v) != 0;
        if !bit(self.minutes, at.minute())
            || !bit(self.hours, at.hour())
            || !bit(self.months, at.month())
        {
            return false;
        }
        let dom = bit(self.days_of_month, at.day());
        let dow = bit(self.days_of_week, at.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(field: &str, spec: &FieldSpec) -> Result<u64, ScheduleError> {
    let mut set = 0u64;
    for part in field.split(',') {
        let invalid = || ScheduleError::Invalid {
            field: spec.name,
            value: part.to_string(),
        };
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range, step)
            }
            None => (part, 1),
        };
        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let a = parse_value(a).ok_or_else(invalid)?;
            let b = parse_value(b).ok_or_else(invalid)?;
            if a > b {
                return Err(invalid());
            }
            (a, b)
        } else {
            let v = parse_value(range).ok_or_else(invalid)?;
            // `5/15` means "from 5 to the end, every 15".
            if step > 1 { (v, spec.max) } else { (v, v) }
        };
        for v in [start, end] {
            if v < spec.min || v > spec.max {
                return Err(ScheduleError::OutOfRange {
                    field: spec.name,
                    value: v,
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
        for v in (start..=end).step_by(step as usize) {
            set |= 1u64 << v;
        }
    }
    Ok(set)
}

// Range checks happen in the caller so errors carry the field bounds.
fn parse_value(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Time left until the start of the minute after `now`.
pub fn until_next_minute(now: &DateTime<Local>) -> Duration {
    let secs_into_minute = now.second() as u64;
    let nanos_into_second = now.nanosecond().min(999_999_999) as u64;
    Duration::from_secs(60 - secs_into_minute) - Duration::from_nanos(nanos_into_second)
}

/// Sleep until the next minute boundary and return the local time then.
pub async fn wait_next_minute() -> DateTime<Local> {
    sleep(until_next_minute(&Local::now())).await;
    Local::now()
}

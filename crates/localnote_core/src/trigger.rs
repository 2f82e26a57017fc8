use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NotifyError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" => Some(Self::Second),
            "minute" | "minutes" => Some(Self::Minute),
            "hour" | "hours" => Some(Self::Hour),
            "day" | "days" => Some(Self::Day),
            "week" | "weeks" => Some(Self::Week),
            "month" | "months" => Some(Self::Month),
            "quarter" | "quarters" => Some(Self::Quarter),
            "year" | "years" => Some(Self::Year),
            _ => None,
        }
    }

    /// Shift `from` by `amount` units. Calendar units respect month lengths.
    pub fn advance(self, from: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
        match self {
            Self::Second => from.checked_add_signed(Duration::try_seconds(amount)?),
            Self::Minute => from.checked_add_signed(Duration::try_minutes(amount)?),
            Self::Hour => from.checked_add_signed(Duration::try_hours(amount)?),
            Self::Day => from.checked_add_signed(Duration::try_days(amount)?),
            Self::Week => from.checked_add_signed(Duration::try_weeks(amount)?),
            Self::Month => shift_months(from, amount),
            Self::Quarter => shift_months(from, amount.checked_mul(3)?),
            Self::Year => shift_months(from, amount.checked_mul(12)?),
        }
    }
}

fn shift_months(from: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        from.checked_add_months(magnitude)
    } else {
        from.checked_sub_months(magnitude)
    }
}

/// When the OS scheduler should fire a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Trigger {
    /// Fire as soon as possible.
    Now,
    At(DateTime<Utc>),
    In { amount: i64, unit: TimeUnit },
    Every { unit: TimeUnit, count: Option<u32> },
}

impl Trigger {
    /// Parse the `trigger` option of a notification. A missing trigger means "now".
    pub fn from_option(value: Option<&Value>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Self::Now);
        };
        let spec = match value {
            Value::Null => return Ok(Self::Now),
            Value::Object(spec) => spec,
            other => {
                return Err(NotifyError::validation(format!(
                    "trigger must be an object, got {other}"
                )))
            }
        };

        if let Some(at) = spec.get("at") {
            return parse_at(at).map(Self::At);
        }

        if let Some(amount) = spec.get("in") {
            let amount = amount
                .as_i64()
                .ok_or_else(|| NotifyError::validation("trigger.in must be an integer"))?;
            let unit = parse_unit(spec.get("unit"))?.unwrap_or(TimeUnit::Second);
            return Ok(Self::In { amount, unit });
        }

        if let Some(every) = spec.get("every") {
            let unit = parse_unit(Some(every))?
                .ok_or_else(|| NotifyError::validation("trigger.every requires a unit"))?;
            let count = match spec.get("count") {
                Some(count) => Some(
                    count
                        .as_u64()
                        .and_then(|count| u32::try_from(count).ok())
                        .ok_or_else(|| NotifyError::validation("trigger.count must be positive"))?,
                ),
                None => None,
            };
            return Ok(Self::Every { unit, count });
        }

        Ok(Self::Now)
    }

    /// First time the trigger should fire, relative to `now`.
    pub fn first_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Now => Some(now),
            Self::At(at) => Some(*at),
            Self::In { amount, unit } => unit.advance(now, *amount),
            Self::Every { unit, count } => {
                if *count == Some(0) {
                    return None;
                }
                unit.advance(now, 1)
            }
        }
    }

    /// Next occurrence after the `occurrence`-th firing at `last`, for repeating triggers.
    pub fn next_fire(&self, last: DateTime<Utc>, occurrence: u32) -> Option<DateTime<Utc>> {
        match self {
            Self::Every { unit, count } => {
                if count.is_some_and(|limit| occurrence >= limit) {
                    return None;
                }
                unit.advance(last, 1)
            }
            Self::Now | Self::At(_) | Self::In { .. } => None,
        }
    }
}

fn parse_at(value: &Value) -> Result<DateTime<Utc>> {
    if let Some(millis) = value.as_i64() {
        return Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| NotifyError::validation(format!("trigger.at out of range: {millis}")));
    }
    if let Some(raw) = value.as_str() {
        return DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|err| NotifyError::validation(format!("trigger.at `{raw}`: {err}")));
    }
    Err(NotifyError::validation(
        "trigger.at must be epoch milliseconds or an RFC 3339 string",
    ))
}

fn parse_unit(value: Option<&Value>) -> Result<Option<TimeUnit>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => TimeUnit::parse(raw)
            .map(Some)
            .ok_or_else(|| NotifyError::validation(format!("unknown time unit `{raw}`"))),
        Some(other) => Err(NotifyError::validation(format!(
            "time unit must be a string, got {other}"
        ))),
    }
}

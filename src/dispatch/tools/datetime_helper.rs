//! `datetime_helper` adapter.
//!
//! Pure local date arithmetic in UTC; never contacts the worker and needs
//! no credential. ISO strings carry millisecond precision and a `Z` suffix.
//! Weeks start on Monday.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dispatch::contract::{parse_args, schema, OperationContract};
use crate::{AppError, Result};

/// Operation name.
pub const NAME: &str = "datetime_helper";

/// Supported actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DateTimeAction {
    /// Current instant.
    #[serde(rename = "getCurrentDateTimeISO")]
    CurrentDateTime,
    /// Unix seconds to ISO 8601.
    #[serde(rename = "convertTimestampToDateTimeISO")]
    ConvertTimestamp,
    /// Monday 00:00:00.000 to Sunday 23:59:59.999 around a date.
    #[serde(rename = "getStartAndEndOfWeekISO")]
    WeekBounds,
    /// First to last millisecond of the month around a date.
    #[serde(rename = "getStartAndEndOfMonthISO")]
    MonthBounds,
}

impl DateTimeAction {
    fn wire_name(self) -> &'static str {
        match self {
            Self::CurrentDateTime => "getCurrentDateTimeISO",
            Self::ConvertTimestamp => "convertTimestampToDateTimeISO",
            Self::WeekBounds => "getStartAndEndOfWeekISO",
            Self::MonthBounds => "getStartAndEndOfMonthISO",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DateTimeHelperInput {
    action: DateTimeAction,
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WeekBounds {
    start_of_week: String,
    end_of_week: String,
}

#[derive(Debug, Serialize)]
struct MonthBounds {
    start_of_month: String,
    end_of_month: String,
}

/// Contract advertised to the calling agent.
#[must_use]
pub fn contract() -> OperationContract {
    OperationContract {
        name: NAME,
        description: "Date and time utilities (UTC). Actions: getCurrentDateTimeISO (current \
                      date/time in ISO 8601), convertTimestampToDateTimeISO (Unix timestamp in \
                      seconds given in 'value' to ISO 8601), getStartAndEndOfWeekISO (Monday \
                      start and Sunday end of the week containing the ISO date in 'value', or \
                      of the current week), getStartAndEndOfMonthISO (start and end of the month \
                      containing the ISO date in 'value', or of the current month).",
        input_schema: schema(
            &json!({
                "action": {
                    "type": "string",
                    "enum": [
                        "getCurrentDateTimeISO",
                        "convertTimestampToDateTimeISO",
                        "getStartAndEndOfWeekISO",
                        "getStartAndEndOfMonthISO"
                    ],
                    "description": "Date/time action to perform."
                },
                "value": {
                    "type": ["string", "number", "null"],
                    "description": "Unix timestamp in seconds for conversion, or an ISO date for \
                                    week/month bounds. Not needed for getCurrentDateTimeISO."
                }
            }),
            &["action"],
        ),
        requires_credential: false,
    }
}

/// Handle a `datetime_helper` call against the current clock.
///
/// # Errors
///
/// Returns `AppError::Validation` for an unknown action or an unusable
/// `value`.
pub fn handle(args: Value) -> Result<String> {
    let input: DateTimeHelperInput = parse_args(NAME, args)?;
    run(input.action, input.value.as_ref(), Utc::now())
}

/// Evaluate `action` on `value` relative to `now`.
///
/// # Errors
///
/// Returns `AppError::Validation` when `value` is missing where required,
/// unparseable, or out of range.
pub fn run(action: DateTimeAction, value: Option<&Value>, now: DateTime<Utc>) -> Result<String> {
    let value = value.filter(|v| !v.is_null() && v.as_str().is_none_or(|s| !s.trim().is_empty()));

    match action {
        DateTimeAction::CurrentDateTime => Ok(iso(now)),
        DateTimeAction::ConvertTimestamp => {
            let value = value.ok_or_else(|| {
                invalid(action, "'value' must be a Unix timestamp in seconds")
            })?;
            Ok(iso(parse_timestamp(action, value)?))
        }
        DateTimeAction::WeekBounds => {
            let target = value.map_or(Ok(now), |v| parse_instant(action, v))?;
            let (start, end) = week_bounds(target).ok_or_else(|| invalid(action, "date out of range"))?;
            to_json(&WeekBounds {
                start_of_week: iso(start),
                end_of_week: iso(end),
            })
        }
        DateTimeAction::MonthBounds => {
            let target = value.map_or(Ok(now), |v| parse_instant(action, v))?;
            let (start, end) = month_bounds(target).ok_or_else(|| invalid(action, "date out of range"))?;
            to_json(&MonthBounds {
                start_of_month: iso(start),
                end_of_month: iso(end),
            })
        }
    }
}

/// Monday 00:00 and Sunday 23:59:59.999 of the week containing `target`.
#[must_use]
pub fn week_bounds(target: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let offset = u64::from(target.weekday().num_days_from_monday());
    let monday = target.date_naive().checked_sub_days(Days::new(offset))?;
    let start = monday.and_time(NaiveTime::MIN).and_utc();
    let end = start.checked_add_signed(TimeDelta::days(7) - TimeDelta::milliseconds(1))?;
    Some((start, end))
}

/// First and last millisecond of the month containing `target`.
#[must_use]
pub fn month_bounds(target: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(target.year(), target.month(), 1)?;
    let (next_year, next_month) = if target.month() == 12 {
        (target.year() + 1, 1)
    } else {
        (target.year(), target.month() + 1)
    };
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    let start = first.and_time(NaiveTime::MIN).and_utc();
    let end = next_first.and_time(NaiveTime::MIN).and_utc() - TimeDelta::milliseconds(1);
    Some((start, end))
}

fn iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(AppError::from)
}

fn invalid(action: DateTimeAction, detail: &str) -> AppError {
    AppError::Validation(format!("{NAME} ({}): {detail}", action.wire_name()))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_timestamp(action: DateTimeAction, value: &Value) -> Result<DateTime<Utc>> {
    let seconds: f64 = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| invalid(action, &format!("'value' must be a numeric timestamp in seconds, got {value}")))?;

    let millis = (seconds * 1000.0).round();
    if millis.abs() > 8.64e15 {
        return Err(invalid(action, &format!("timestamp {seconds} is out of range")));
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .ok_or_else(|| invalid(action, &format!("timestamp {seconds} is out of range")))
}

fn parse_instant(action: DateTimeAction, value: &Value) -> Result<DateTime<Utc>> {
    let raw = match value {
        Value::String(s) => s.trim(),
        Value::Number(_) => return parse_timestamp(action, value),
        other => return Err(invalid(action, &format!("'value' must be an ISO date, got {other}"))),
    };

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(invalid(action, &format!("'{raw}' is not a valid ISO date")))
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Exercise summary as returned by `GET {exercise-locator}`.
///
/// Only the columns the exercise table keeps are decoded; the provider sends
/// many more (device, heart rate, calories...), which are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExerciseRecord {
    pub id: i64,
    pub transaction_id: i64,
    /// Local wall-clock start, without offset.
    pub start_time: NaiveDateTime,
    /// Offset of `start_time` from UTC, in minutes.
    #[serde(rename = "start-time-utc-offset")]
    pub utc_offset: i32,
    #[serde(rename = "has-route", default)]
    pub has_trace: bool,
    #[serde(rename = "detailed-sport-info", default)]
    pub category: String,
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid time format: {0}")]
    InvalidFormat(String),
}

/// Minute-resolution time of day in `[00:00, 23:59]`, trip-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    /// Accepts `HH:MM` or `HH:MM:SS`; seconds are parsed and discarded.
    pub fn parse(value: &str) -> Result<Self, TimeError> {
        let invalid = || TimeError::InvalidFormat(value.to_string());
        let fields: Vec<&str> = value.trim().split(':').collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(invalid());
        }

        let hour: u16 = fields[0].parse().map_err(|_| invalid())?;
        let minute: u16 = fields[1].parse().map_err(|_| invalid())?;
        if let Some(second_field) = fields.get(2) {
            let second: u16 = second_field.parse().map_err(|_| invalid())?;
            if second > 59 {
                return Err(invalid());
            }
        }
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Ok(Self(hour * 60 + minute))
    }

    pub fn from_minutes(minutes: u16) -> Self {
        debug_assert!(minutes < MINUTES_PER_DAY);
        Self(minutes.min(MINUTES_PER_DAY - 1))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Shifts by `delta_minutes`, or `None` if the result would leave the
    /// day. Shifting never wraps midnight or changes the day number.
    pub fn shift(self, delta_minutes: i32) -> Option<Self> {
        let shifted = i32::from(self.0) + delta_minutes;
        if !(0..i32::from(MINUTES_PER_DAY)).contains(&shifted) {
            return None;
        }
        Some(Self(shifted as u16))
    }

    pub fn delta_from(self, earlier: Self) -> i32 {
        i32::from(self.0) - i32::from(earlier.0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFields {
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub end_day_offset: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSource {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDelta {
    pub delta_minutes: i32,
    pub source: DeltaSource,
}

/// Detects the actionable change between an original and an updated time
/// pair. An end-time change wins over a simultaneous start-time change; an
/// `end_day_offset` change makes the end-time comparison meaningless, so
/// only the start times are considered in that case.
pub fn compute_time_delta(original: &TimeFields, updated: &TimeFields) -> Option<TimeDelta> {
    if let (Some(original_end), Some(updated_end)) = (original.end_time, updated.end_time) {
        let offsets_match =
            original.end_day_offset.unwrap_or(0) == updated.end_day_offset.unwrap_or(0);
        if offsets_match && original_end != updated_end {
            return Some(TimeDelta {
                delta_minutes: updated_end.delta_from(original_end),
                source: DeltaSource::End,
            });
        }
    }

    if let (Some(original_start), Some(updated_start)) = (original.start_time, updated.start_time) {
        if original_start != updated_start {
            return Some(TimeDelta {
                delta_minutes: updated_start.delta_from(original_start),
                source: DeltaSource::Start,
            });
        }
    }

    None
}

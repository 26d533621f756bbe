use crate::domain::time::{TimeFields, TimeOfDay};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Planned,
    Active,
    Completed,
}

impl TripStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Lifecycle is monotonic; there is no transition out of `completed`.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Planned => Some(Self::Active),
            Self::Active => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Owner,
    Editor,
    Viewer,
}

impl UserRole {
    pub fn can_edit(self) -> bool {
        !matches!(self, Self::Viewer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleCategory {
    Sightseeing,
    Restaurant,
    Hotel,
    Transport,
    Activity,
    Other,
}

impl ScheduleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sightseeing => "sightseeing",
            Self::Restaurant => "restaurant",
            Self::Hotel => "hotel",
            Self::Transport => "transport",
            Self::Activity => "activity",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleItem {
    pub id: String,
    /// `None` marks a candidate: same shape, not yet placed on a pattern.
    pub day_pattern_id: Option<String>,
    pub name: String,
    pub category: ScheduleCategory,
    pub color: Option<String>,
    pub address: Option<String>,
    pub memo: Option<String>,
    pub urls: Vec<String>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    /// Effective end day is the anchor day number plus this offset. Only
    /// meaningful while `end_time` is set.
    pub end_day_offset: Option<u32>,
    pub departure_place: Option<String>,
    pub arrival_place: Option<String>,
    pub transport_method: Option<String>,
    pub sort_order: u32,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleItem {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "schedule.id")?;
        validate_non_empty(&self.name, "schedule.name")?;
        if self.end_day_offset.unwrap_or(0) > 0 && self.end_time.is_none() {
            return Err("schedule.end_day_offset requires schedule.end_time".to_string());
        }
        Ok(())
    }

    pub fn is_candidate(&self) -> bool {
        self.day_pattern_id.is_none()
    }

    pub fn time_fields(&self) -> TimeFields {
        TimeFields {
            start_time: self.start_time,
            end_time: self.end_time,
            end_day_offset: self.end_day_offset,
        }
    }

    pub fn spans_days(&self) -> bool {
        self.end_time.is_some() && self.end_day_offset.unwrap_or(0) > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pattern {
    pub id: String,
    pub day_id: String,
    pub label: String,
    pub is_default: bool,
    pub sort_order: u32,
    pub schedules: Vec<ScheduleItem>,
}

impl Pattern {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "pattern.id")?;
        validate_non_empty(&self.label, "pattern.label")?;
        for (index, schedule) in self.schedules.iter().enumerate() {
            schedule.validate()?;
            if schedule.sort_order != index as u32 {
                return Err(format!(
                    "pattern {} schedule sort order must be dense, found {} at index {}",
                    self.id, schedule.sort_order, index
                ));
            }
            if schedule.day_pattern_id.as_deref() != Some(self.id.as_str()) {
                return Err(format!(
                    "schedule {} does not reference pattern {}",
                    schedule.id, self.id
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Day {
    pub id: String,
    pub trip_id: String,
    /// 1-based, immutable once created, contiguous across the trip.
    pub day_number: u32,
    pub date: NaiveDate,
    pub memo: Option<String>,
    pub patterns: Vec<Pattern>,
}

impl Day {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "day.id")?;
        if self.day_number == 0 {
            return Err("day.day_number must be >= 1".to_string());
        }
        let default_count = self
            .patterns
            .iter()
            .filter(|pattern| pattern.is_default)
            .count();
        if default_count != 1 {
            return Err(format!(
                "day {} must have exactly one default pattern, found {}",
                self.id, default_count
            ));
        }
        for pattern in &self.patterns {
            pattern.validate()?;
            if pattern.day_id != self.id {
                return Err(format!(
                    "pattern {} does not reference day {}",
                    pattern.id, self.id
                ));
            }
        }
        Ok(())
    }

    pub fn default_pattern(&self) -> Option<&Pattern> {
        self.patterns.iter().find(|pattern| pattern.is_default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trip {
    pub id: String,
    pub title: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TripStatus,
    /// Role of the requesting user, resolved by the (external) session layer.
    pub role: UserRole,
    pub days: Vec<Day>,
    pub candidates: Vec<ScheduleItem>,
}

impl Trip {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "trip.id")?;
        validate_non_empty(&self.title, "trip.title")?;
        if self.end_date < self.start_date {
            return Err("trip.end_date must not precede trip.start_date".to_string());
        }

        for (index, day) in self.days.iter().enumerate() {
            day.validate()?;
            let expected_number = index as u32 + 1;
            if day.day_number != expected_number {
                return Err(format!(
                    "trip {} day numbers must be contiguous from 1, found {} at index {}",
                    self.id, day.day_number, index
                ));
            }
            let expected_date = self.start_date + Duration::days(index as i64);
            if day.date != expected_date {
                return Err(format!(
                    "day {} date {} does not match trip date range (expected {})",
                    day.id, day.date, expected_date
                ));
            }
            if day.trip_id != self.id {
                return Err(format!("day {} does not reference trip {}", day.id, self.id));
            }
        }

        for candidate in &self.candidates {
            candidate.validate()?;
            if !candidate.is_candidate() {
                return Err(format!(
                    "candidate {} must not reference a pattern",
                    candidate.id
                ));
            }
        }
        Ok(())
    }

    pub fn day_by_number(&self, day_number: u32) -> Option<&Day> {
        self.days.iter().find(|day| day.day_number == day_number)
    }

    pub fn pattern_by_id(&self, pattern_id: &str) -> Option<&Pattern> {
        self.days
            .iter()
            .flat_map(|day| day.patterns.iter())
            .find(|pattern| pattern.id == pattern_id)
    }

    pub fn schedule_by_id(&self, schedule_id: &str) -> Option<&ScheduleItem> {
        self.days
            .iter()
            .flat_map(|day| day.patterns.iter())
            .flat_map(|pattern| pattern.schedules.iter())
            .chain(self.candidates.iter())
            .find(|schedule| schedule.id == schedule_id)
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

use crate::domain::models::{Day, ScheduleCategory, ScheduleItem};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDayPosition {
    /// The item is still in progress on the target day.
    Intermediate,
    /// The target day is the last day the item is visible.
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossDayEntry {
    pub schedule: ScheduleItem,
    pub source_day_id: String,
    pub source_pattern_id: String,
    pub source_day_number: u32,
    pub position: CrossDayPosition,
}

/// Projects multi-day schedule items anchored on earlier days onto
/// `target_day_number`. Entries follow day order, then pattern order, then
/// schedule order; occurrences in different patterns of the same source day
/// are reported independently.
pub fn project_cross_day(
    days: &[Day],
    target_day_number: u32,
) -> Result<Vec<CrossDayEntry>, String> {
    ensure_contiguous(days)?;

    let mut entries = Vec::new();
    for day in days {
        // Items anchored on or after the target day never project onto it.
        if day.day_number >= target_day_number {
            break;
        }
        for pattern in &day.patterns {
            for schedule in &pattern.schedules {
                if !schedule.spans_days() {
                    continue;
                }
                let end_day_number = day.day_number + schedule.end_day_offset.unwrap_or(0);
                if end_day_number < target_day_number {
                    continue;
                }
                let position = if end_day_number == target_day_number {
                    CrossDayPosition::Final
                } else {
                    CrossDayPosition::Intermediate
                };
                entries.push(CrossDayEntry {
                    schedule: schedule.clone(),
                    source_day_id: day.id.clone(),
                    source_pattern_id: pattern.id.clone(),
                    source_day_number: day.day_number,
                    position,
                });
            }
        }
    }
    Ok(entries)
}

fn ensure_contiguous(days: &[Day]) -> Result<(), String> {
    for (index, day) in days.iter().enumerate() {
        let expected = index as u32 + 1;
        if day.day_number != expected {
            return Err(format!(
                "day numbers must be contiguous from 1, found {} at index {}",
                day.day_number, index
            ));
        }
    }
    Ok(())
}

/// Label shown on the anchor day. Transport legs are treated as same-day
/// only and carry no timeline label.
pub fn start_label(category: ScheduleCategory) -> Option<&'static str> {
    match category {
        ScheduleCategory::Hotel => Some("check-in"),
        ScheduleCategory::Transport => None,
        _ => Some("start"),
    }
}

/// Label shown on later days a multi-day item projects onto.
pub fn cross_day_label(
    category: ScheduleCategory,
    position: CrossDayPosition,
) -> Option<&'static str> {
    match (category, position) {
        (ScheduleCategory::Transport, _) => None,
        (ScheduleCategory::Hotel, CrossDayPosition::Intermediate) => Some("staying"),
        (ScheduleCategory::Hotel, CrossDayPosition::Final) => Some("check-out"),
        (_, CrossDayPosition::Intermediate) => Some("in progress"),
        (_, CrossDayPosition::Final) => Some("ended"),
    }
}
